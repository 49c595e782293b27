//! AI 客户端 trait
//!
//! 回合编排器只依赖这两个入口：玩家消息进、指令结果回传。实现负责维护自己的
//! 会话历史；错误在编排边界转成玩家可见的文本回合，不会让整轮崩溃。

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::AiTurn;

/// AI 服务边界错误
#[derive(Error, Debug)]
pub enum LlmError {
    /// 后端 API 错误（配额、过载、网络）
    #[error("AI 服務錯誤: {0}")]
    Api(String),

    /// 请求构造失败
    #[error("請求建構失敗: {0}")]
    Request(String),

    /// 回应为空
    #[error("模型未返回任何內容")]
    EmptyResponse,
}

/// AI 客户端：处理玩家消息与指令批次结果
#[async_trait]
pub trait AiClient: Send + Sync {
    /// 处理一条玩家消息，得到 AI 的第一轮回应
    async fn process_user_message(&self, message: &str) -> Result<AiTurn, LlmError>;

    /// 把指令批次结果（到达顺序）回传给 AI，换取下一轮回应
    async fn process_command_results(&self, results: &[String]) -> Result<AiTurn, LlmError>;

    /// 清空会话历史，开始新对话
    async fn start_new_chat(&self);
}
