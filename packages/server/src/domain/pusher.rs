//! MessagePusher trait 定義
//!
//! 接続へのフレーム送信を抽象化します。WebSocket の生成は UI 層が行い、
//! ここでは生成済みのチャンネルへの送信だけを扱います。

use async_trait::async_trait;
use tayori_shared::protocol::ServerFrame;
use tokio::sync::mpsc;

use super::{ConnectionId, MessagePushError};

/// 接続のアウトバウンドキューに積む要素
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame(ServerFrame),
    /// トランスポートを閉じるよう接続タスクに依頼する
    Close { reason: String },
}

/// 接続ごとのアウトバウンドチャンネル
pub type PusherChannel = mpsc::UnboundedSender<Outbound>;

#[async_trait]
pub trait MessagePusher: Send + Sync {
    async fn register_client(&self, connection_id: ConnectionId, sender: PusherChannel);

    async fn unregister_client(&self, connection_id: &ConnectionId);

    async fn push_to(
        &self,
        connection_id: &ConnectionId,
        frame: &ServerFrame,
    ) -> Result<(), MessagePushError>;

    /// 複数の接続へ送信する。一部の失敗は許容し、送信できた数を返す
    async fn broadcast(&self, targets: &[ConnectionId], frame: &ServerFrame) -> usize;

    /// 接続タスクにクローズを依頼する
    async fn close(&self, connection_id: &ConnectionId, reason: &str);
}
