//! 指令下发
//!
//! 单条指令的出站路径：编码 -> 尺寸校验 -> 经连接持有者发送。
//! 超出线协议预算的指令在触碰连接前就被拒绝；聊天消息先分块再逐段下发。

use std::sync::Arc;

use uuid::Uuid;

use crate::gateway::chunker::chunk;
use crate::gateway::connection::ConnectionHolder;
use crate::gateway::message::{encode_command, WSS_MAXIMUM_BYTES};
use crate::gateway::GatewayError;

/// 单条指令下发器
pub struct CommandDispatcher {
    holder: Arc<ConnectionHolder>,
}

impl CommandDispatcher {
    pub fn new(holder: Arc<ConnectionHolder>) -> Self {
        Self { holder }
    }

    pub fn holder(&self) -> &Arc<ConnectionHolder> {
        &self.holder
    }

    /// 以指定 correlation id 下发一条指令
    ///
    /// 编码后超出预算返回 `PayloadTooLarge` 且不产生任何线上流量；
    /// 无连接时由持有者丢弃（尽力而为，不排队不重试）。
    pub async fn dispatch(&self, command: &str, request_id: &Uuid) -> Result<(), GatewayError> {
        let payload = encode_command(request_id, command);
        let size = payload.len();
        if size > WSS_MAXIMUM_BYTES {
            tracing::warn!(size, "oversized command payload rejected");
            return Err(GatewayError::PayloadTooLarge {
                size,
                budget: WSS_MAXIMUM_BYTES,
            });
        }
        self.holder.send_raw(payload).await;
        Ok(())
    }

    /// 下发一条不跟踪结果的指令；超长时向聊天栏报错
    pub async fn run_command(&self, command: &str) {
        if let Err(err) = self.dispatch(command, &Uuid::new_v4()).await {
            tracing::warn!(%err, "fire-and-forget command rejected");
            self.send_raw_chat("§c[runCommand] 指令太長無法執行").await;
        }
    }

    /// 向所有玩家发送聊天消息，超长自动分块
    pub async fn send_chat(&self, message: &str) {
        match chunk(message, WSS_MAXIMUM_BYTES) {
            Ok(pieces) => {
                for piece in pieces {
                    self.send_raw_chat(&piece).await;
                }
            }
            Err(err) => tracing::error!(%err, "failed to chunk chat message"),
        }
    }

    /// 向单个玩家发送私讯，超长自动分块
    pub async fn send_private(&self, player: &str, message: &str) {
        match chunk(message, WSS_MAXIMUM_BYTES) {
            Ok(pieces) => {
                for piece in pieces {
                    let escaped = serde_json::to_string(&piece).expect("string serializes");
                    self.run_command(&format!(
                        r#"tellraw "{}" {{"rawtext":[{{"text":{}}}]}}"#,
                        player, escaped
                    ))
                    .await;
                }
            }
            Err(err) => tracing::error!(%err, "failed to chunk private message"),
        }
    }

    async fn send_raw_chat(&self, piece: &str) {
        let escaped = serde_json::to_string(piece).expect("string serializes");
        let command = format!(r#"tellraw @a {{"rawtext":[{{"text":{}}}]}}"#, escaped);
        if let Err(err) = self.dispatch(&command, &Uuid::new_v4()).await {
            tracing::warn!(%err, "chat chunk rejected");
        }
    }
}
