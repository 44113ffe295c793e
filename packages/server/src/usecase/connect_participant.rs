//! UseCase: 接続の認証・登録・有効化
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - ConnectParticipantUseCase::execute() と activate()
//! - 認証 → welcome 送信 → Registry への登録 → ACTIVE 化とスナップショット送信
//!
//! ### なぜこのテストが必要か
//! - 認証に失敗した接続は Registry に一切痕跡を残してはいけない
//! - welcome より先に他のフレームが届くとクライアントは接続を確立できない
//!
//! ### どのような状況を想定しているか
//! - 正常系：最初の接続（オンライン遷移あり）、2 つ目のタブ（遷移なし）
//! - 異常系：無効なトークン、タイムアウト

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tayori_shared::{protocol::ServerFrame, time::Clock};

use crate::domain::{
    Connection, ConnectionId, ConnectionRegistry, MessagePusher, Outbound, PusherChannel,
    RegistryError, Timestamp, UserId,
};

use super::{AuthenticateUseCase, PresenceBroadcaster, error::ConnectError};

/// 接続処理のユースケース
pub struct ConnectParticipantUseCase {
    authenticate: Arc<AuthenticateUseCase>,
    registry: Arc<dyn ConnectionRegistry>,
    message_pusher: Arc<dyn MessagePusher>,
    presence: Arc<PresenceBroadcaster>,
    clock: Arc<dyn Clock>,
    /// welcome でクライアントに通知するハートビート間隔
    heartbeat_interval: Duration,
}

impl ConnectParticipantUseCase {
    pub fn new(
        authenticate: Arc<AuthenticateUseCase>,
        registry: Arc<dyn ConnectionRegistry>,
        message_pusher: Arc<dyn MessagePusher>,
        presence: Arc<PresenceBroadcaster>,
        clock: Arc<dyn Clock>,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            authenticate,
            registry,
            message_pusher,
            presence,
            clock,
            heartbeat_interval,
        }
    }

    /// 接続を認証して Registry に登録する
    ///
    /// 待機が発生するのはトークン検証だけで、検証後の登録は中断されない。
    /// 失敗時は何も登録されないので、呼び出し側はトランスポートを閉じるだけでよい。
    ///
    /// # Arguments
    ///
    /// * `connection_id` - ハンドシェイク時に払い出した接続 ID
    /// * `token` - `hello` フレームで受け取った bearer トークン
    /// * `sender` - この接続へのフレーム送信チャンネル
    pub async fn execute(
        &self,
        connection_id: ConnectionId,
        token: &str,
        sender: PusherChannel,
    ) -> Result<UserId, ConnectError> {
        let user_id = self.authenticate.execute(token).await?;

        // welcome は他のどのフレームよりも先にキューに積む
        let welcome = ServerFrame::Welcome {
            connection_id: connection_id.to_string(),
            user_id: user_id.as_str().to_string(),
            heartbeat_interval_ms: self.heartbeat_interval.as_millis() as u64,
        };
        if sender.send(Outbound::Frame(welcome)).is_err() {
            tracing::debug!("Connection {} went away before welcome", connection_id);
        }
        self.message_pusher
            .register_client(connection_id, sender)
            .await;

        let mut connection = Connection::connecting(
            connection_id,
            Timestamp::new(self.clock.now_millis()),
            Instant::now(),
        );
        connection.authenticate(user_id.clone());
        let change = self.registry.commit(connection).await;

        tracing::info!(
            "Connection {} authenticated as '{}'{}",
            connection_id,
            user_id,
            if change.is_some() { " (now online)" } else { "" }
        );
        Ok(user_id)
    }

    /// AUTHENTICATED → ACTIVE にしてロスターのスナップショットを送る
    ///
    /// 先に ACTIVE にするので、スナップショット計算中の遷移は差分として届く。
    /// 差分とスナップショットの前後関係は version でクライアントが解決する。
    pub async fn activate(&self, connection_id: &ConnectionId) -> Result<(), RegistryError> {
        self.registry.activate(connection_id).await?;
        if let Err(e) = self.presence.push_snapshot(connection_id).await {
            tracing::warn!("Failed to push roster snapshot to {}: {}", connection_id, e);
        }
        Ok(())
    }
}
