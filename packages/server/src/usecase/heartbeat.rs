//! UseCase: ハートビートと無応答接続の掃除

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::task::JoinHandle;

use crate::domain::{ConnectionId, ConnectionRegistry, MessagePusher, RegistryError};

use super::DisconnectParticipantUseCase;

pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

pub struct HeartbeatUseCase {
    registry: Arc<dyn ConnectionRegistry>,
    message_pusher: Arc<dyn MessagePusher>,
    disconnect: Arc<DisconnectParticipantUseCase>,
    timeout: Duration,
}

impl HeartbeatUseCase {
    pub fn new(
        registry: Arc<dyn ConnectionRegistry>,
        message_pusher: Arc<dyn MessagePusher>,
        disconnect: Arc<DisconnectParticipantUseCase>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            message_pusher,
            disconnect,
            timeout,
        }
    }

    /// 接続の最終ハートビート時刻を更新する
    pub async fn beat(
        &self,
        connection_id: &ConnectionId,
        now: Instant,
    ) -> Result<(), RegistryError> {
        self.registry.heartbeat(connection_id, now).await
    }

    /// `timeout` より長く無応答の接続を切断し、切断した接続を返す
    ///
    /// 切断は通常の切断と同じ処理で、加えてトランスポートのタスクにクローズを依頼する。
    pub async fn sweep(&self, now: Instant) -> Vec<ConnectionId> {
        let expired = self.registry.expired(now, self.timeout).await;
        for connection_id in &expired {
            tracing::warn!(
                "Connection {} missed heartbeats for {:?}, evicting",
                connection_id,
                self.timeout
            );
            self.message_pusher
                .close(connection_id, "heartbeat timeout")
                .await;
            self.disconnect.execute(connection_id).await;
        }
        expired
    }

    /// 一定間隔で `sweep` を実行するタスクを起動する
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.sweep(Instant::now()).await;
            }
        })
    }
}
