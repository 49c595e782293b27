//! Bedrock `/wsserver` 网关
//!
//! Minecraft 基岩版客户端通过 `/wsserver localhost:<port>` 连入后，所有交互都走
//! 这条唯一的 WebSocket 连接：
//! - **connection**: 连接持有者（零或一个活跃连接，重连时原子替换）
//! - **message**: 线协议信封（commandRequest / commandResponse / PlayerMessage）
//! - **chunker**: 按编码后字节预算切分聊天消息
//! - **dispatch**: 单条指令下发（超长拒发、无连接时丢弃）
//! - **batch**: 指令批次关联（correlation id -> batch，全部到齐或超时）
//! - **server**: WebSocket 接入循环与入站帧路由

mod batch;
mod chunker;
mod connection;
mod dispatch;
mod message;
mod server;

use std::time::Duration;

use thiserror::Error;

pub use batch::{CommandBatcher, DEFAULT_BATCH_TIMEOUT};
pub use chunker::{chunk, estimate_payload_bytes};
pub use connection::{ClientHandle, ConnectionHolder};
pub use dispatch::CommandDispatcher;
pub use message::{
    encode_command, encoded_size, parse_client_frame, subscribe_payload, ClientBound,
    PROTOCOL_VERSION, WSS_MAXIMUM_BYTES,
};
pub use server::WsServer;

/// 网关层错误（本地错误，不会因远端行为 panic）
#[derive(Error, Debug)]
pub enum GatewayError {
    /// 单条指令编码后超出线协议预算，拒绝发送
    #[error("payload too large: {size} bytes exceeds the {budget}-byte wire budget")]
    PayloadTooLarge { size: usize, budget: usize },

    /// 批次内仍有指令未在时限内收到响应
    #[error("command batch timed out after {0:?}")]
    BatchTimeout(Duration),

    /// 预算小到连单个字符都放不下（避免分块死循环）
    #[error("byte budget {budget} too small to fit a single character")]
    BudgetTooSmall { budget: usize },

    /// AI 连续请求指令的轮数超过上限
    #[error("turn depth limit of {0} exceeded")]
    TurnLimitExceeded(usize),
}
