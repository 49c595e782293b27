//! 脚本化 AI 客户端（用于测试，无需 API）
//!
//! 按预先排好的 AiTurn 队列依次吐出回应，并记录收到的输入供断言。

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::llm::{AiClient, AiTurn, LlmError};

/// 脚本化客户端：turns 取尽后返回空回合
#[derive(Debug, Default)]
pub struct ScriptedAiClient {
    turns: Mutex<VecDeque<Result<AiTurn, String>>>,
    received: Mutex<Vec<String>>,
    resets: Mutex<usize>,
}

impl ScriptedAiClient {
    pub fn new(turns: Vec<AiTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into_iter().map(Ok).collect()),
            ..Default::default()
        }
    }

    /// 下一次调用时返回错误
    pub async fn push_error(&self, message: impl Into<String>) {
        self.turns.lock().await.push_back(Err(message.into()));
    }

    /// 客户端收到过的所有输入（玩家消息与结果回传）
    pub async fn received(&self) -> Vec<String> {
        self.received.lock().await.clone()
    }

    pub async fn reset_count(&self) -> usize {
        *self.resets.lock().await
    }

    async fn next_turn(&self, input: String) -> Result<AiTurn, LlmError> {
        self.received.lock().await.push(input);
        match self.turns.lock().await.pop_front() {
            Some(Ok(turn)) => Ok(turn),
            Some(Err(message)) => Err(LlmError::Api(message)),
            None => Ok(AiTurn::default()),
        }
    }
}

#[async_trait]
impl AiClient for ScriptedAiClient {
    async fn process_user_message(&self, message: &str) -> Result<AiTurn, LlmError> {
        self.next_turn(format!("user:{}", message)).await
    }

    async fn process_command_results(&self, results: &[String]) -> Result<AiTurn, LlmError> {
        self.next_turn(format!("results:{}", results.join("|"))).await
    }

    async fn start_new_chat(&self) {
        *self.resets.lock().await += 1;
    }
}
