//! UseCase: メッセージ送信（重複排除 → 永続化 → ファンアウト）
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - SendMessageUseCase::execute() メソッド
//! - 冪等キーによる重複排除、永続化の失敗とタイムアウト、受信者と送信者の他タブへの配送
//!
//! ### なぜこのテストが必要か
//! - 1 つの clientMessageId に対して配送 ID は 1 つだけでなければならない
//! - 永続化に失敗したメッセージが配送されたり、冪等キーとして記録されたりしてはいけない
//! - 受信者がオフラインでも送信は成功し、履歴から取得できなければならない
//!
//! ### どのような状況を想定しているか
//! - 正常系：オンラインの受信者、オフラインの受信者、送信者の複数タブ
//! - 異常系：永続化の失敗、永続化のタイムアウト
//! - エッジケース：同じ冪等キーでの再送、同じ冪等キーの同時送信

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use tayori_shared::protocol::ServerFrame;
use tokio::sync::Mutex;

use crate::{
    domain::{
        ConnectionId, ConnectionRegistry, DeliveryId, DeliveryResult, DeliveryStatus, Envelope,
        IdempotencyStore, MessagePusher, MessageRepository, PersistedRecord, UserId,
    },
    infrastructure::dto::conversion::delivered_message,
};

use super::error::SendMessageError;

pub const DEFAULT_PERSIST_TIMEOUT: Duration = Duration::from_secs(5);

/// メッセージ送信のユースケース
pub struct SendMessageUseCase {
    repository: Arc<dyn MessageRepository>,
    registry: Arc<dyn ConnectionRegistry>,
    message_pusher: Arc<dyn MessagePusher>,
    idempotency: Arc<dyn IdempotencyStore>,
    persist_timeout: Duration,
    /// 送信者ごとの直列化ロック
    sender_locks: DashMap<UserId, Arc<Mutex<()>>>,
}

impl SendMessageUseCase {
    pub fn new(
        repository: Arc<dyn MessageRepository>,
        registry: Arc<dyn ConnectionRegistry>,
        message_pusher: Arc<dyn MessagePusher>,
        idempotency: Arc<dyn IdempotencyStore>,
        persist_timeout: Duration,
    ) -> Self {
        Self {
            repository,
            registry,
            message_pusher,
            idempotency,
            persist_timeout,
            sender_locks: DashMap::new(),
        }
    }

    /// メッセージ送信を実行
    ///
    /// 同じ送信者の送信は直列化されるので、送信者 → 受信者の順序は送信順と一致する。
    /// 呼び出し側は接続タスクの中断に巻き込まれないよう、別タスクで実行すること。
    ///
    /// # Arguments
    ///
    /// * `origin` - 送信要求を受けた接続。ここには `message-new` ではなく受領通知が返る
    /// * `envelope` - 認証済みの送信者が入った Envelope
    ///
    /// # Returns
    ///
    /// * `Ok(DeliveryResult)` - `Delivered` / `StoredOffline` / `DuplicateSuppressed`
    /// * `Err(SendMessageError)` - 永続化の失敗またはタイムアウト（何も配送されていない）
    pub async fn execute(
        &self,
        origin: &ConnectionId,
        envelope: Envelope,
    ) -> Result<DeliveryResult, SendMessageError> {
        let lock = self.sender_lock(&envelope.sender_id);
        let result = {
            let _guard = lock.lock().await;
            self.deliver(origin, &envelope).await
        };
        drop(lock);
        self.sender_locks
            .remove_if(&envelope.sender_id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    fn sender_lock(&self, sender_id: &UserId) -> Arc<Mutex<()>> {
        self.sender_locks
            .entry(sender_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn deliver(
        &self,
        origin: &ConnectionId,
        envelope: &Envelope,
    ) -> Result<DeliveryResult, SendMessageError> {
        // 1. 重複排除
        if let Some(previous) = self.idempotency.lookup(
            &envelope.sender_id,
            &envelope.client_message_id,
            Instant::now(),
        ) {
            tracing::info!(
                "Duplicate send '{}' from '{}' suppressed (delivery {})",
                envelope.client_message_id,
                envelope.sender_id,
                previous.delivery_id.as_str()
            );
            return Ok(DeliveryResult {
                status: DeliveryStatus::DuplicateSuppressed,
                ..previous
            });
        }

        // 2. 永続化
        let record = self.persist(envelope).await?;

        // 3. 配送 ID の払い出しと宛先の決定
        let receiver_targets = self.targets_of(&envelope.receiver_id, origin).await;
        let sender_targets = if envelope.sender_id == envelope.receiver_id {
            Vec::new()
        } else {
            self.targets_of(&envelope.sender_id, origin).await
        };
        let result = DeliveryResult {
            client_message_id: envelope.client_message_id.clone(),
            delivery_id: DeliveryId::generate(),
            record_id: record.record_id,
            created_at: record.created_at,
            status: if receiver_targets.is_empty() {
                DeliveryStatus::StoredOffline
            } else {
                DeliveryStatus::Delivered
            },
        };
        self.idempotency
            .record(&envelope.sender_id, &result, Instant::now());

        // 4. ファンアウト（受信者の全接続と、送信者の他の接続）
        let frame = ServerFrame::MessageNew {
            message: delivered_message(envelope, &result),
        };
        let to_receiver = self.message_pusher.broadcast(&receiver_targets, &frame).await;
        let to_sender = self.message_pusher.broadcast(&sender_targets, &frame).await;

        tracing::info!(
            "Message '{}' from '{}' to '{}': {:?} (receiver connections {}, sender tabs {})",
            envelope.client_message_id,
            envelope.sender_id,
            envelope.receiver_id,
            result.status,
            to_receiver,
            to_sender
        );
        Ok(result)
    }

    async fn persist(&self, envelope: &Envelope) -> Result<PersistedRecord, SendMessageError> {
        let persist = self.repository.persist(
            &envelope.sender_id,
            &envelope.receiver_id,
            &envelope.content,
        );
        match tokio::time::timeout(self.persist_timeout, persist).await {
            Ok(Ok(record)) => Ok(record),
            Ok(Err(e)) => {
                tracing::warn!(
                    "Failed to persist '{}' from '{}': {}",
                    envelope.client_message_id,
                    envelope.sender_id,
                    e
                );
                Err(SendMessageError::PersistenceFailed(e.to_string()))
            }
            Err(_) => {
                tracing::warn!(
                    "Persisting '{}' from '{}' timed out after {:?}",
                    envelope.client_message_id,
                    envelope.sender_id,
                    self.persist_timeout
                );
                Err(SendMessageError::PersistenceTimeout(self.persist_timeout))
            }
        }
    }

    async fn targets_of(&self, user_id: &UserId, origin: &ConnectionId) -> Vec<ConnectionId> {
        self.registry
            .connections_of(user_id)
            .await
            .into_iter()
            .filter(|id| id != origin)
            .collect()
    }
}
