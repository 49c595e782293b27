//! 指令批次关联
//!
//! 一次批次 = 一组同时下发的指令。每条指令分配独立的 correlation id（UUID），
//! 批次 id 单调递增。结果按到达顺序收集（远端完成顺序与提交顺序无关，这里不
//! 重排）；全部到齐时解析，超时则清空本批次全部残留状态并报错，迟到的结果只
//! 记录后丢弃。批次表与索引是仅有的共享可变状态，统一锁在一把 Mutex 里。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

use crate::gateway::dispatch::CommandDispatcher;
use crate::gateway::GatewayError;

/// 默认批次超时
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(60);

struct PendingBatch {
    expected: usize,
    /// 到达顺序，不是提交顺序
    results: Vec<String>,
    done: oneshot::Sender<Vec<String>>,
}

#[derive(Default)]
struct BatchTable {
    next_batch_id: u64,
    batches: HashMap<u64, PendingBatch>,
    /// correlation id -> batch id，多对一；每个 id 恰好被移除一次
    request_index: HashMap<Uuid, u64>,
}

/// 批次关联器：独占批次表，所有访问都经由它的方法
pub struct CommandBatcher {
    dispatcher: Arc<CommandDispatcher>,
    table: Mutex<BatchTable>,
}

impl CommandBatcher {
    pub fn new(dispatcher: Arc<CommandDispatcher>) -> Self {
        Self {
            dispatcher,
            table: Mutex::new(BatchTable::default()),
        }
    }

    pub fn dispatcher(&self) -> &Arc<CommandDispatcher> {
        &self.dispatcher
    }

    /// 下发一批指令并等待全部结果或超时
    ///
    /// 返回的结果序列按到达顺序排列。单条指令超长属于本地非致命错误：
    /// 上屏告知玩家、不产生线上流量，该 correlation id 只能等批次超时回收。
    pub async fn dispatch_batch(
        &self,
        commands: &[String],
        timeout: Duration,
    ) -> Result<Vec<String>, GatewayError> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }

        let (done_tx, mut done_rx) = oneshot::channel();
        let (batch_id, request_ids) = {
            let mut table = self.table.lock().await;
            let batch_id = table.next_batch_id;
            table.next_batch_id += 1;

            let request_ids: Vec<Uuid> = commands.iter().map(|_| Uuid::new_v4()).collect();
            for request_id in &request_ids {
                table.request_index.insert(*request_id, batch_id);
            }
            table.batches.insert(
                batch_id,
                PendingBatch {
                    expected: commands.len(),
                    results: Vec::new(),
                    done: done_tx,
                },
            );
            (batch_id, request_ids)
        };

        // 先登记后发送，避免响应先于登记到达
        for (command, request_id) in commands.iter().zip(&request_ids) {
            tracing::info!(batch_id, request_id = %request_id, command, "dispatching command");

            // 回显只对成功上线的指令发
            match self.dispatcher.dispatch(command, request_id).await {
                Ok(()) => {
                    self.dispatcher
                        .send_chat(&format!("§e[runCommand] §r: {}", command))
                        .await;
                }
                Err(GatewayError::PayloadTooLarge { size, .. }) => {
                    tracing::warn!(batch_id, size, "command in batch exceeds wire budget");
                    self.dispatcher
                        .send_chat("§c[runCommand] 指令太長無法執行")
                        .await;
                }
                Err(err) => tracing::warn!(batch_id, %err, "command dispatch failed"),
            }
        }

        let sleep = tokio::time::sleep(timeout);
        tokio::pin!(sleep);

        tokio::select! {
            res = &mut done_rx => match res {
                Ok(results) => Ok(results),
                // 发送端丢失按超时处理，正常路径不会走到
                Err(_) => {
                    self.purge(batch_id, timeout).await;
                    Err(GatewayError::BatchTimeout(timeout))
                }
            },
            _ = &mut sleep => {
                self.purge(batch_id, timeout).await;
                // 竞态：批次恰在超时瞬间完成时结果已在途，仍然交付
                match done_rx.try_recv() {
                    Ok(results) => Ok(results),
                    Err(_) => Err(GatewayError::BatchTimeout(timeout)),
                }
            }
        }
    }

    /// 超时清理：移除批次与它全部残留的 correlation id（批次已完成则无事发生）
    async fn purge(&self, batch_id: u64, timeout: Duration) {
        let mut table = self.table.lock().await;
        if table.batches.remove(&batch_id).is_some() {
            table.request_index.retain(|_, owner| *owner != batch_id);
            tracing::warn!(batch_id, ?timeout, "command batch timed out, pending ids purged");
        }
    }

    /// 入站 commandResponse 回调
    ///
    /// 未知 correlation id（从未登记或已随超时回收）直接丢弃。
    pub async fn on_response(&self, request_id: &str, status_message: String) {
        let Ok(request_id) = Uuid::parse_str(request_id) else {
            tracing::debug!(request_id, "response with non-uuid correlation id ignored");
            return;
        };

        let mut table = self.table.lock().await;
        let Some(batch_id) = table.request_index.remove(&request_id) else {
            tracing::debug!(%request_id, "late or unknown command response dropped");
            return;
        };

        let Some(batch) = table.batches.get_mut(&batch_id) else {
            // request_index 里的 id 必然指向表内批次；走到这里说明不变量被破坏
            tracing::error!(batch_id, "correlation index pointed at a missing batch");
            return;
        };

        batch.results.push(status_message);
        if batch.results.len() == batch.expected {
            let batch = table
                .batches
                .remove(&batch_id)
                .expect("batch present, just mutated");
            tracing::info!(batch_id, count = batch.expected, "command batch complete");
            let _ = batch.done.send(batch.results);
        }
    }

    /// 当前在途批次数（仅诊断用）
    pub async fn pending_batches(&self) -> usize {
        self.table.lock().await.batches.len()
    }
}
