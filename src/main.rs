//! Golem - Minecraft Bedrock WebSocket AI 桥接服务
//!
//! 入口：初始化日志、加载配置、装配网关与 AI 回合编排，运行 WebSocket 服务器
//! 直到 Ctrl-C。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use golem::config::load_config;
use golem::features::FeatureRouter;
use golem::gateway::{CommandBatcher, CommandDispatcher, ConnectionHolder, WsServer};
use golem::llm::{AiClient, OpenAiClient};
use golem::observability;
use golem::orchestrator::TurnOrchestrator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).context("Failed to load configuration")?;
    tracing::info!(port = cfg.server.port, model = %cfg.ai.model, "configuration loaded");

    let holder = Arc::new(ConnectionHolder::new());
    let dispatcher = Arc::new(CommandDispatcher::new(Arc::clone(&holder)));
    let batcher = Arc::new(CommandBatcher::new(Arc::clone(&dispatcher)));

    let ai: Arc<dyn AiClient> = Arc::new(OpenAiClient::new(
        cfg.ai.base_url.as_deref(),
        &cfg.ai.model,
        cfg.ai.api_key.as_deref(),
        cfg.ai.temperature,
        cfg.ai.max_output_tokens,
        &cfg.ai.prompt,
    ));

    let orchestrator = Arc::new(TurnOrchestrator::new(
        ai,
        Arc::clone(&dispatcher),
        Arc::clone(&batcher),
        Duration::from_secs(cfg.ai.batch_timeout_secs),
        cfg.ai.max_turn_depth,
    ));
    let router = Arc::new(FeatureRouter::new(&cfg, Arc::clone(&dispatcher), orchestrator));

    let shutdown = CancellationToken::new();
    let server = WsServer::new(
        cfg.server.port,
        holder,
        dispatcher,
        batcher,
        router,
        shutdown.clone(),
    );

    // Ctrl-C 触发优雅停机
    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            ctrlc_token.cancel();
        }
    });

    server.run().await.context("WebSocket server failed")?;
    Ok(())
}
