//! 冪等キーの重複排除キャッシュ
//!
//! `(送信者, clientMessageId)` をキーに、払い出した配送結果を保持する。
//! 保持期間（時間）と件数の両方で上限を持つ。
//!
//! 読み取りは `DashMap` のみを参照し、書き込みと追い出しは `order` の
//! `Mutex` で直列化される。

use std::{
    collections::VecDeque,
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};

use dashmap::DashMap;

use crate::domain::{ClientMessageId, DeliveryResult, IdempotencyStore, UserId};

pub const DEFAULT_RETENTION: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_CAPACITY: usize = 100_000;

type DedupKey = (UserId, ClientMessageId);

#[derive(Debug, Clone)]
struct DedupEntry {
    result: DeliveryResult,
    recorded_at: Instant,
}

pub struct DedupCache {
    entries: DashMap<DedupKey, DedupEntry>,
    order: Mutex<VecDeque<(DedupKey, Instant)>>,
    retention: Duration,
    capacity: usize,
}

impl DedupCache {
    pub fn new(retention: Duration, capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            retention,
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IdempotencyStore for DedupCache {
    /// 保持期間内に処理済みであれば、その時の配送結果を返す
    fn lookup(
        &self,
        sender_id: &UserId,
        client_message_id: &ClientMessageId,
        now: Instant,
    ) -> Option<DeliveryResult> {
        let key = (sender_id.clone(), client_message_id.clone());
        let entry = self.entries.get(&key)?;
        if now.saturating_duration_since(entry.recorded_at) > self.retention {
            return None;
        }
        Some(entry.result.clone())
    }

    /// 配送結果を記録し、期限切れ・件数超過のエントリを追い出す
    fn record(&self, sender_id: &UserId, result: &DeliveryResult, now: Instant) {
        let key = (sender_id.clone(), result.client_message_id.clone());
        let mut order = self.order.lock().unwrap_or_else(PoisonError::into_inner);

        self.entries.insert(
            key.clone(),
            DedupEntry {
                result: result.clone(),
                recorded_at: now,
            },
        );
        order.push_back((key, now));

        while let Some((_, recorded_at)) = order.front() {
            let expired = now.saturating_duration_since(*recorded_at) > self.retention;
            if !expired && order.len() <= self.capacity {
                break;
            }
            if let Some((key, recorded_at)) = order.pop_front() {
                // a key re-recorded after expiry has a newer entry that must survive
                self.entries
                    .remove_if(&key, |_, entry| entry.recorded_at == recorded_at);
            }
        }
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION, DEFAULT_CAPACITY)
    }
}
