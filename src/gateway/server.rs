//! WebSocket 接入循环
//!
//! 监听 `/wsserver` 接入，握手后把写端句柄交给连接持有者（新连接替换旧连接），
//! 订阅 PlayerMessage 并问候玩家；读循环把 commandResponse 派给批次关联器、
//! 把玩家聊天派给功能路由器，解析失败的帧记录后丢弃。

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;

use crate::features::FeatureRouter;
use crate::gateway::batch::CommandBatcher;
use crate::gateway::connection::{ClientHandle, ConnectionHolder};
use crate::gateway::dispatch::CommandDispatcher;
use crate::gateway::message::{parse_client_frame, subscribe_payload, ClientBound};

/// Bedrock 客户端网关服务器
pub struct WsServer {
    port: u16,
    holder: Arc<ConnectionHolder>,
    dispatcher: Arc<CommandDispatcher>,
    batcher: Arc<CommandBatcher>,
    router: Arc<FeatureRouter>,
    shutdown: CancellationToken,
}

impl WsServer {
    pub fn new(
        port: u16,
        holder: Arc<ConnectionHolder>,
        dispatcher: Arc<CommandDispatcher>,
        batcher: Arc<CommandBatcher>,
        router: Arc<FeatureRouter>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            port,
            holder,
            dispatcher,
            batcher,
            router,
            shutdown,
        }
    }

    /// 接入循环；shutdown 取消后返回
    pub async fn run(&self) -> anyhow::Result<()> {
        let addr: SocketAddr = format!("0.0.0.0:{}", self.port).parse()?;
        let listener = TcpListener::bind(&addr).await?;
        tracing::info!(
            "WebSocket server listening, connect with /wsserver localhost:{}",
            self.port
        );

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("WebSocket server stopped");
                    return Ok(());
                }
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let holder = Arc::clone(&self.holder);
                            let dispatcher = Arc::clone(&self.dispatcher);
                            let batcher = Arc::clone(&self.batcher);
                            let router = Arc::clone(&self.router);
                            tokio::spawn(async move {
                                if let Err(err) =
                                    handle_client(stream, peer, holder, dispatcher, batcher, router)
                                        .await
                                {
                                    tracing::warn!(%peer, %err, "client connection error");
                                }
                            });
                        }
                        Err(err) => tracing::error!(%err, "accept error"),
                    }
                }
            }
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    peer: SocketAddr,
    holder: Arc<ConnectionHolder>,
    dispatcher: Arc<CommandDispatcher>,
    batcher: Arc<CommandBatcher>,
    router: Arc<FeatureRouter>,
) -> anyhow::Result<()> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    tracing::info!(%peer, "Minecraft client connected");

    // 写端任务：channel -> WebSocket
    tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if ws_tx.send(WsMessage::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    let handle = ClientHandle::new(peer.to_string(), tx);
    let connection_id = handle.connection_id;
    holder.set(handle).await;

    holder.send_raw(subscribe_payload("PlayerMessage")).await;
    tracing::info!("subscribed to PlayerMessage");
    dispatcher.send_chat("§l§b- WebSocket連接成功!").await;

    while let Some(frame) = ws_rx.next().await {
        let frame = match frame {
            Ok(f) => f,
            Err(err) => {
                tracing::warn!(%peer, %err, "WebSocket receive error");
                break;
            }
        };

        let text = match frame {
            WsMessage::Text(text) => text,
            WsMessage::Close(_) => break,
            // ping/pong 由 tungstenite 处理，二进制帧不在协议内
            _ => continue,
        };

        match parse_client_frame(&text) {
            Ok(ClientBound::CommandResponse {
                request_id,
                status_message,
            }) => {
                batcher.on_response(&request_id, status_message).await;
            }
            Ok(ClientBound::PlayerChat { sender, message }) => {
                tracing::info!(%sender, %message, "player chat");
                // 聊天处理可能等待整个指令批次，放到独立任务避免卡住读循环
                let router = Arc::clone(&router);
                tokio::spawn(async move {
                    router.handle_chat(&sender, &message).await;
                });
            }
            Ok(ClientBound::Other) => {}
            Err(err) => {
                tracing::warn!(%err, "malformed frame dropped");
            }
        }
    }

    tracing::info!(%peer, "Minecraft client disconnected");
    holder.clear_if(connection_id).await;
    Ok(())
}
