//! Golem - Minecraft Bedrock WebSocket AI 桥接服务
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **gateway**: Bedrock `/wsserver` 网关（连接持有、线协议编解码、消息分块、指令批次关联）
//! - **llm**: AI 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **orchestrator**: AI 回合循环（文本 -> 指令批次 -> 结果回传 -> 下一轮）
//! - **features**: 游戏内唤醒词功能（天气、计算、迷宫、像素画、数学考试、帮助）
//! - **observability**: tracing 日志初始化

pub mod config;
pub mod features;
pub mod gateway;
pub mod llm;
pub mod observability;
pub mod orchestrator;

pub use gateway::GatewayError;
pub use llm::AiTurn;
