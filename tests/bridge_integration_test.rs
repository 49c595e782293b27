//! 端到端集成测试：AI 回合 -> 指令批次 -> 响应关联 -> 结果回传
//!
//! 不起真实 WebSocket，直接把假客户端的发送 channel 挂进连接持有者，
//! 从 channel 读出线协议帧并回灌 commandResponse。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use golem::gateway::{ClientHandle, CommandBatcher, CommandDispatcher, ConnectionHolder};
use golem::llm::{AiClient, ScriptedAiClient};
use golem::orchestrator::TurnOrchestrator;
use golem::AiTurn;

/// 连接好假客户端的网关三件套；rx 端吐出所有发往"游戏"的帧
async fn wire_gateway() -> (
    Arc<CommandDispatcher>,
    Arc<CommandBatcher>,
    mpsc::UnboundedReceiver<String>,
) {
    let holder = Arc::new(ConnectionHolder::new());
    let (tx, rx) = mpsc::unbounded_channel();
    holder.set(ClientHandle::new("test-client".to_string(), tx)).await;
    let dispatcher = Arc::new(CommandDispatcher::new(holder));
    let batcher = Arc::new(CommandBatcher::new(Arc::clone(&dispatcher)));
    (dispatcher, batcher, rx)
}

/// 从一条 commandRequest 帧取出 (requestId, commandLine)
fn parse_request(frame: &str) -> (String, String) {
    let value: serde_json::Value = serde_json::from_str(frame).unwrap();
    (
        value["header"]["requestId"].as_str().unwrap().to_string(),
        value["body"]["commandLine"].as_str().unwrap().to_string(),
    )
}

/// 收取帧直到凑够 `want` 条匹配前缀的指令帧（tellraw 回显等帧照单收下）
async fn collect_commands(
    rx: &mut mpsc::UnboundedReceiver<String>,
    prefix: &str,
    want: usize,
) -> (Vec<(String, String)>, Vec<String>) {
    let mut matched = Vec::new();
    let mut others = Vec::new();
    while matched.len() < want {
        let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("frame not produced in time")
            .expect("channel closed");
        let (id, command) = parse_request(&frame);
        if command.starts_with(prefix) {
            matched.push((id, command));
        } else {
            others.push(command);
        }
    }
    (matched, others)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
    let mut commands = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        commands.push(parse_request(&frame).1);
    }
    commands
}

#[tokio::test]
async fn full_turn_returns_results_in_arrival_order() {
    let (dispatcher, batcher, mut rx) = wire_gateway().await;

    let ai = Arc::new(ScriptedAiClient::new(vec![
        AiTurn {
            text: Some("我来处理".to_string()),
            commands: vec![
                "say one".to_string(),
                "say two".to_string(),
                "say three".to_string(),
            ],
            new_session: false,
        },
        AiTurn::text_only("都做完了"),
    ]));
    let orchestrator = TurnOrchestrator::new(
        Arc::clone(&ai) as Arc<dyn AiClient>,
        dispatcher,
        Arc::clone(&batcher),
        Duration::from_secs(5),
        8,
    );

    let responder = {
        let batcher = Arc::clone(&batcher);
        tokio::spawn(async move {
            let (requests, _) = collect_commands(&mut rx, "say ", 3).await;
            // 乱序回灌：结果按到达顺序聚合
            batcher.on_response(&requests[1].0, "r-two".to_string()).await;
            batcher.on_response(&requests[0].0, "r-one".to_string()).await;
            batcher.on_response(&requests[2].0, "r-three".to_string()).await;
            (requests, rx)
        })
    };

    orchestrator.run_turn("Steve", "帮我广播三句话").await;

    let (requests, mut rx) = responder.await.unwrap();
    // correlation id 互不相同
    assert_ne!(requests[0].0, requests[1].0);
    assert_ne!(requests[1].0, requests[2].0);

    let received = ai.received().await;
    assert_eq!(received.len(), 2);
    assert_eq!(received[0], "user:<Steve> 帮我广播三句话");
    assert_eq!(received[1], "results:r-two|r-one|r-three");

    // 收尾文本经 tellraw 上屏
    let tail = drain(&mut rx);
    assert!(tail.iter().any(|c| c.starts_with("tellraw") && c.contains("都做完了")));
}

#[tokio::test]
async fn partial_batch_times_out_and_reports_to_chat() {
    let (dispatcher, batcher, mut rx) = wire_gateway().await;

    let ai = Arc::new(ScriptedAiClient::new(vec![AiTurn {
        text: None,
        commands: vec!["testfor @a".to_string(), "testfor @e".to_string()],
        new_session: false,
    }]));
    let orchestrator = TurnOrchestrator::new(
        Arc::clone(&ai) as Arc<dyn AiClient>,
        dispatcher,
        Arc::clone(&batcher),
        Duration::from_millis(100),
        8,
    );

    let responder = {
        let batcher = Arc::clone(&batcher);
        tokio::spawn(async move {
            let (requests, _) = collect_commands(&mut rx, "testfor ", 2).await;
            // 只回一条，另一条等超时
            batcher.on_response(&requests[0].0, "ok".to_string()).await;
            rx
        })
    };

    orchestrator.run_turn("Steve", "查一下玩家").await;

    let mut rx = responder.await.unwrap();
    // 超时后批次被清除，迟到的结果不会再触发回传
    let received = ai.received().await;
    assert_eq!(received.len(), 1);
    assert!(received[0].starts_with("user:"));

    let tail = drain(&mut rx);
    assert!(tail.iter().any(|c| c.contains("執行指令批次時出錯")));
}

#[tokio::test]
async fn new_session_directive_resets_the_conversation() {
    let (dispatcher, batcher, mut rx) = wire_gateway().await;

    let ai = Arc::new(ScriptedAiClient::new(vec![AiTurn {
        text: None,
        commands: Vec::new(),
        new_session: true,
    }]));
    let orchestrator = TurnOrchestrator::new(
        Arc::clone(&ai) as Arc<dyn AiClient>,
        dispatcher,
        batcher,
        Duration::from_secs(5),
        8,
    );

    orchestrator.run_turn("Steve", "重新開始").await;

    assert_eq!(ai.reset_count().await, 1);
    let frames = drain(&mut rx);
    assert!(frames.iter().any(|c| c.contains("新對話已開始")));
}

#[tokio::test]
async fn long_reply_is_chunked_into_multiple_tellraw() {
    let (dispatcher, batcher, mut rx) = wire_gateway().await;

    // 远超单帧预算的回复文本
    let long_text = "基岩版指令系統說明。".repeat(60);
    let ai = Arc::new(ScriptedAiClient::new(vec![AiTurn::text_only(long_text)]));
    let orchestrator = TurnOrchestrator::new(
        Arc::clone(&ai) as Arc<dyn AiClient>,
        dispatcher,
        batcher,
        Duration::from_secs(5),
        8,
    );

    orchestrator.run_turn("Steve", "講解一下").await;

    let frames = drain(&mut rx);
    let tellraws: Vec<&String> = frames.iter().filter(|c| c.starts_with("tellraw")).collect();
    assert!(tellraws.len() > 1, "expected chunked output, got {} frames", tellraws.len());
    for command in &tellraws {
        let payload = golem::gateway::encode_command(&uuid::Uuid::new_v4(), command);
        assert!(payload.len() <= golem::gateway::WSS_MAXIMUM_BYTES);
    }
}
