//! AI 回合循环
//!
//! 一个逻辑回合：玩家消息 -> AI 回应 -> 上屏文本 -> 执行指令批次 -> 结果回传 ->
//! 下一轮回应，直到某轮不再请求指令。循环带显式深度上限，杜绝"AI 永远在要
//! 指令"的失控递归；批次超时终止本回合且不自动重试。

use std::sync::Arc;
use std::time::Duration;

use crate::gateway::{CommandBatcher, CommandDispatcher, GatewayError};
use crate::llm::{AiClient, AiTurn};

/// 单个回合内 AI 连续请求指令批次的最大轮数
pub const MAX_TURN_DEPTH: usize = 8;

/// 回合编排器
pub struct TurnOrchestrator {
    ai: Arc<dyn AiClient>,
    dispatcher: Arc<CommandDispatcher>,
    batcher: Arc<CommandBatcher>,
    batch_timeout: Duration,
    max_depth: usize,
}

impl TurnOrchestrator {
    pub fn new(
        ai: Arc<dyn AiClient>,
        dispatcher: Arc<CommandDispatcher>,
        batcher: Arc<CommandBatcher>,
        batch_timeout: Duration,
        max_depth: usize,
    ) -> Self {
        Self {
            ai,
            dispatcher,
            batcher,
            batch_timeout,
            max_depth,
        }
    }

    /// 跑完一个玩家消息触发的完整回合
    ///
    /// AI 服务故障转成玩家可见的文本并正常结束，不向上冒泡。
    pub async fn run_turn(&self, sender: &str, message: &str) {
        let first = match self
            .ai
            .process_user_message(&format!("<{}> {}", sender, message))
            .await
        {
            Ok(turn) => turn,
            Err(err) => {
                tracing::error!(%err, "AI request failed");
                AiTurn::text_only(format!("§c發生錯誤: {}", err))
            }
        };

        match self.drive(first).await {
            Ok(()) => {}
            Err(GatewayError::BatchTimeout(timeout)) => {
                tracing::warn!(?timeout, "turn ended by batch timeout");
                self.dispatcher
                    .send_chat(&format!(
                        "§c執行指令批次時出錯: 指令批次執行超時 ({}ms)",
                        timeout.as_millis()
                    ))
                    .await;
            }
            Err(GatewayError::TurnLimitExceeded(limit)) => {
                tracing::warn!(limit, "turn depth limit exceeded");
                self.dispatcher
                    .send_chat("§cAI 連續執行指令輪數過多，本回合已中止")
                    .await;
            }
            Err(err) => {
                tracing::error!(%err, "turn failed");
                self.dispatcher
                    .send_chat(&format!("§c執行指令批次時出錯: {}", err))
                    .await;
            }
        }
    }

    /// 显式循环驱动多轮指令执行，深度上限兜底
    async fn drive(&self, mut turn: AiTurn) -> Result<(), GatewayError> {
        for depth in 0.. {
            if turn.new_session {
                self.ai.start_new_chat().await;
                self.dispatcher.send_chat("新對話已開始").await;
            }
            if let Some(text) = &turn.text {
                self.dispatcher.send_chat(&format!("§e<AI> §r{}", text)).await;
            }
            if turn.commands.is_empty() {
                return Ok(());
            }
            if depth >= self.max_depth {
                return Err(GatewayError::TurnLimitExceeded(self.max_depth));
            }

            tracing::info!(count = turn.commands.len(), "executing command batch");
            let results = self
                .batcher
                .dispatch_batch(&turn.commands, self.batch_timeout)
                .await?;
            tracing::info!(count = results.len(), "feeding batch results back to AI");

            turn = match self.ai.process_command_results(&results).await {
                Ok(next) => next,
                Err(err) => {
                    tracing::error!(%err, "AI request failed on result feedback");
                    AiTurn::text_only(format!("§c發生錯誤: {}", err))
                }
            };
        }
        unreachable!("loop exits via return");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{ClientHandle, ConnectionHolder};
    use crate::llm::ScriptedAiClient;
    use tokio::sync::mpsc;

    struct Fixture {
        ai: Arc<ScriptedAiClient>,
        orchestrator: TurnOrchestrator,
        batcher: Arc<CommandBatcher>,
        rx: mpsc::UnboundedReceiver<String>,
    }

    async fn fixture(turns: Vec<AiTurn>) -> Fixture {
        let holder = Arc::new(ConnectionHolder::new());
        let (tx, rx) = mpsc::unbounded_channel();
        holder.set(ClientHandle::new("fake:0".into(), tx)).await;
        let dispatcher = Arc::new(CommandDispatcher::new(holder));
        let batcher = Arc::new(CommandBatcher::new(Arc::clone(&dispatcher)));
        let ai = Arc::new(ScriptedAiClient::new(turns));
        let orchestrator = TurnOrchestrator::new(
            Arc::clone(&ai) as Arc<dyn AiClient>,
            dispatcher,
            Arc::clone(&batcher),
            Duration::from_millis(200),
            MAX_TURN_DEPTH,
        );
        Fixture {
            ai,
            orchestrator,
            batcher,
            rx,
        }
    }

    fn outbound_command_lines(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
            if let Some(line) = value["body"]["commandLine"].as_str() {
                lines.push(line.to_string());
            }
        }
        lines
    }

    #[tokio::test]
    async fn text_only_turn_ends_immediately() {
        let mut fx = fixture(vec![AiTurn::text_only("hello")]).await;
        fx.orchestrator.run_turn("Steve", "-ai? hi").await;

        let lines = outbound_command_lines(&mut fx.rx);
        assert!(lines.iter().any(|l| l.contains("<AI>") && l.contains("hello")));
        assert_eq!(fx.ai.received().await, vec!["user:<Steve> -ai? hi".to_string()]);
        assert_eq!(fx.batcher.pending_batches().await, 0);
    }

    #[tokio::test]
    async fn command_turn_feeds_results_back() {
        let mut fx = fixture(vec![
            AiTurn {
                text: Some("查询中".to_string()),
                commands: vec!["time query daytime".to_string()],
                new_session: false,
            },
            AiTurn::text_only("现在是白天"),
        ])
        .await;

        // 伪造远端：等指令出现后立刻应答
        let batcher = Arc::clone(&fx.batcher);
        let orchestration = fx.orchestrator.run_turn("Alex", "-ai? 现在几点");
        let responder = async {
            loop {
                tokio::time::sleep(Duration::from_millis(10)).await;
                let lines: Vec<(String, String)> = {
                    let mut pairs = Vec::new();
                    while let Ok(frame) = fx.rx.try_recv() {
                        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
                        if value["body"]["commandLine"] == "time query daytime" {
                            pairs.push((
                                value["header"]["requestId"].as_str().unwrap().to_string(),
                                "5000".to_string(),
                            ));
                        }
                    }
                    pairs
                };
                if let Some((id, result)) = lines.into_iter().next() {
                    batcher.on_response(&id, result).await;
                    break;
                }
            }
        };
        tokio::join!(orchestration, responder);

        let received = fx.ai.received().await;
        assert_eq!(received.len(), 2);
        assert_eq!(received[1], "results:5000");
        assert_eq!(fx.batcher.pending_batches().await, 0);
    }

    #[tokio::test]
    async fn batch_timeout_terminates_the_turn() {
        let mut fx = fixture(vec![AiTurn {
            text: None,
            commands: vec!["say never answered".to_string()],
            new_session: false,
        }])
        .await;

        fx.orchestrator.run_turn("Steve", "-ai? do it").await;

        // 只有第一次调用，超时后不再回传结果
        assert_eq!(fx.ai.received().await.len(), 1);
        let lines = outbound_command_lines(&mut fx.rx);
        assert!(lines.iter().any(|l| l.contains("執行指令批次時出錯")));
        assert_eq!(fx.batcher.pending_batches().await, 0);
    }

    #[tokio::test]
    async fn runaway_command_loop_hits_depth_limit() {
        // 每轮都要求更多指令的 AI
        let endless: Vec<AiTurn> = (0..MAX_TURN_DEPTH + 4)
            .map(|i| AiTurn {
                text: None,
                commands: vec![format!("say loop {}", i)],
                new_session: false,
            })
            .collect();
        let mut fx = fixture(endless).await;

        // 远端即时应答一切
        let batcher = Arc::clone(&fx.batcher);
        let responder = tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(5)).await;
                while let Ok(frame) = fx.rx.try_recv() {
                    let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
                    if let Some(line) = value["body"]["commandLine"].as_str() {
                        if line.starts_with("say loop") {
                            let id = value["header"]["requestId"].as_str().unwrap().to_string();
                            batcher.on_response(&id, "ok".to_string()).await;
                        }
                    }
                }
            }
        });

        fx.orchestrator.run_turn("Steve", "-ai? go").await;
        responder.abort();

        // 恰好跑满 max_depth 个批次后触发上限：首条玩家消息 + 每批一条结果回传
        let received = fx.ai.received().await;
        assert_eq!(received.len(), MAX_TURN_DEPTH + 1);
        let result_feedbacks = received
            .iter()
            .filter(|entry| entry.starts_with("results:"))
            .count();
        assert_eq!(result_feedbacks, MAX_TURN_DEPTH);
        assert_eq!(fx.batcher.pending_batches().await, 0);
    }

    #[tokio::test]
    async fn new_session_turn_resets_the_client() {
        let mut fx = fixture(vec![AiTurn {
            text: None,
            commands: Vec::new(),
            new_session: true,
        }])
        .await;

        fx.orchestrator.run_turn("Steve", "-ai? 重新開始").await;

        assert_eq!(fx.ai.reset_count().await, 1);
        let lines = outbound_command_lines(&mut fx.rx);
        assert!(lines.iter().any(|l| l.contains("新對話已開始")));
    }

    #[tokio::test]
    async fn ai_failure_becomes_a_visible_message() {
        let mut fx = fixture(vec![]).await;
        fx.ai.push_error("quota exceeded").await;

        fx.orchestrator.run_turn("Steve", "-ai? hi").await;

        let lines = outbound_command_lines(&mut fx.rx);
        assert!(lines.iter().any(|l| l.contains("發生錯誤")));
    }
}
