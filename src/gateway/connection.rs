//! 连接持有者
//!
//! 同一时刻最多持有一个 Minecraft 客户端连接。新连接直接替换旧引用，断线或出错
//! 时清除；没有连接时发送按尽力而为处理：丢弃并记录，绝不阻塞等待。

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// 一条活跃连接的发送端句柄
#[derive(Debug, Clone)]
pub struct ClientHandle {
    /// 连接标识，用于断线时只清除自己
    pub connection_id: Uuid,
    /// 远端地址（仅日志用）
    pub remote_addr: String,
    tx: mpsc::UnboundedSender<String>,
}

impl ClientHandle {
    pub fn new(remote_addr: String, tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            remote_addr,
            tx,
        }
    }
}

/// 零或一个活跃连接
#[derive(Debug, Default)]
pub struct ConnectionHolder {
    inner: RwLock<Option<ClientHandle>>,
}

impl ConnectionHolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 替换当前连接（旧句柄直接丢弃，写端任务随 channel 关闭而结束）
    pub async fn set(&self, handle: ClientHandle) {
        let mut guard = self.inner.write().await;
        if let Some(old) = guard.replace(handle) {
            tracing::info!(remote = %old.remote_addr, "replaced previous client connection");
        }
    }

    /// 断线 / 出错时清除，但仅当仍持有同一条连接（避免误清新连接）
    pub async fn clear_if(&self, connection_id: Uuid) {
        let mut guard = self.inner.write().await;
        if guard
            .as_ref()
            .is_some_and(|h| h.connection_id == connection_id)
        {
            *guard = None;
        }
    }

    pub async fn is_open(&self) -> bool {
        self.inner.read().await.is_some()
    }

    /// 尽力发送：无连接或写端已关闭时丢弃并记录
    pub async fn send_raw(&self, payload: String) {
        let guard = self.inner.read().await;
        match guard.as_ref() {
            Some(handle) => {
                if handle.tx.send(payload).is_err() {
                    tracing::warn!(remote = %handle.remote_addr, "client writer closed, payload dropped");
                }
            }
            None => {
                tracing::debug!("no client connected, payload dropped");
            }
        }
    }
}
