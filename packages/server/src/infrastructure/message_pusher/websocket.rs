//! WebSocket を使った MessagePusher 実装
//!
//! ## 責務
//!
//! - 接続ごとのアウトバウンドチャンネル（`PusherChannel`）を管理
//! - 接続へのフレーム送信（push_to, broadcast）とクローズ依頼
//!
//! ## 設計ノート
//!
//! WebSocket の生成は UI 層（`ui/handler/websocket.rs`）で行われます。
//! この実装は生成された `PusherChannel` を受け取り、フレーム送信に使用します。
//! チャンネルは unbounded なので送信側が待たされることはありません。

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tayori_shared::protocol::ServerFrame;
use tokio::sync::Mutex;

use crate::domain::{ConnectionId, MessagePushError, MessagePusher, Outbound, PusherChannel};

/// WebSocket を使った MessagePusher 実装
pub struct WebSocketMessagePusher {
    /// Key: connection_id, Value: PusherChannel
    clients: Arc<Mutex<HashMap<ConnectionId, PusherChannel>>>,
}

impl WebSocketMessagePusher {
    pub fn new(clients: Arc<Mutex<HashMap<ConnectionId, PusherChannel>>>) -> Self {
        Self { clients }
    }

    pub async fn client_count(&self) -> usize {
        self.clients.lock().await.len()
    }
}

impl Default for WebSocketMessagePusher {
    fn default() -> Self {
        Self::new(Arc::new(Mutex::new(HashMap::new())))
    }
}

#[async_trait]
impl MessagePusher for WebSocketMessagePusher {
    async fn register_client(&self, connection_id: ConnectionId, sender: PusherChannel) {
        let mut clients = self.clients.lock().await;
        clients.insert(connection_id, sender);
        tracing::debug!("Connection {} registered to MessagePusher", connection_id);
    }

    async fn unregister_client(&self, connection_id: &ConnectionId) {
        let mut clients = self.clients.lock().await;
        clients.remove(connection_id);
        tracing::debug!("Connection {} unregistered from MessagePusher", connection_id);
    }

    async fn push_to(
        &self,
        connection_id: &ConnectionId,
        frame: &ServerFrame,
    ) -> Result<(), MessagePushError> {
        let clients = self.clients.lock().await;

        let sender = clients
            .get(connection_id)
            .ok_or(MessagePushError::ConnectionNotFound(*connection_id))?;
        sender
            .send(Outbound::Frame(frame.clone()))
            .map_err(|e| MessagePushError::PushFailed(e.to_string()))?;
        Ok(())
    }

    async fn broadcast(&self, targets: &[ConnectionId], frame: &ServerFrame) -> usize {
        let clients = self.clients.lock().await;

        let mut delivered = 0;
        for target in targets {
            match clients.get(target) {
                // ブロードキャストでは一部の送信失敗を許容
                Some(sender) => match sender.send(Outbound::Frame(frame.clone())) {
                    Ok(()) => delivered += 1,
                    Err(e) => tracing::warn!("Failed to push frame to {}: {}", target, e),
                },
                None => tracing::debug!("Connection {} not found during broadcast", target),
            }
        }
        delivered
    }

    async fn close(&self, connection_id: &ConnectionId, reason: &str) {
        let clients = self.clients.lock().await;
        if let Some(sender) = clients.get(connection_id) {
            let _ = sender.send(Outbound::Close {
                reason: reason.to_string(),
            });
        }
    }
}
