//! InMemory Message Repository 実装
//!
//! ドメイン層が定義する MessageRepository trait の具体的な実装。
//! Vec をインメモリ DB として使用します。保存順がそのまま履歴の順序になります。

use std::sync::Arc;

use async_trait::async_trait;
use tayori_shared::time::{Clock, SystemClock};
use tokio::sync::Mutex;

use crate::domain::{
    MessageContent, MessageRepository, PersistedRecord, PersistenceError, RecordId,
    StoredMessage, Timestamp, UserId,
};

#[derive(Default)]
struct Store {
    messages: Vec<StoredMessage>,
    next_record: u64,
}

/// インメモリ Message Repository 実装
pub struct InMemoryMessageRepository {
    store: Mutex<Store>,
    clock: Arc<dyn Clock>,
}

impl InMemoryMessageRepository {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Mutex::new(Store::default()),
            clock,
        }
    }

    pub async fn count(&self) -> usize {
        self.store.lock().await.messages.len()
    }
}

impl Default for InMemoryMessageRepository {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn persist(
        &self,
        sender_id: &UserId,
        receiver_id: &UserId,
        content: &MessageContent,
    ) -> Result<PersistedRecord, PersistenceError> {
        let mut store = self.store.lock().await;
        store.next_record += 1;

        let record = PersistedRecord {
            record_id: RecordId::new(format!("msg-{:08}", store.next_record)),
            created_at: Timestamp::new(self.clock.now_millis()),
        };
        store.messages.push(StoredMessage {
            record_id: record.record_id.clone(),
            sender_id: sender_id.clone(),
            receiver_id: receiver_id.clone(),
            content: content.clone(),
            created_at: record.created_at,
        });
        Ok(record)
    }

    async fn history(
        &self,
        user_a: &UserId,
        user_b: &UserId,
    ) -> Result<Vec<StoredMessage>, PersistenceError> {
        let store = self.store.lock().await;
        Ok(store
            .messages
            .iter()
            .filter(|m| {
                (&m.sender_id == user_a && &m.receiver_id == user_b)
                    || (&m.sender_id == user_b && &m.receiver_id == user_a)
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tayori_shared::time::FixedClock;

    fn user(id: &str) -> UserId {
        UserId::new(id.to_string()).unwrap()
    }

    #[tokio::test]
    async fn test_persist_assigns_record_id_and_created_at() {
        // テスト項目: 保存時にレコード ID と作成時刻が払い出される
        // given (前提条件):
        let repo = InMemoryMessageRepository::new(Arc::new(FixedClock::new(1000)));

        // when (操作):
        let record = repo
            .persist(&user("alice"), &user("bob"), &MessageContent::text("hi").unwrap())
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(record.record_id.as_str(), "msg-00000001");
        assert_eq!(record.created_at, Timestamp::new(1000));
        assert_eq!(repo.count().await, 1);
    }

    #[tokio::test]
    async fn test_history_returns_both_directions_in_order() {
        // テスト項目: 2 人の間の両方向のメッセージが保存順で返され、他の会話は含まれない
        // given (前提条件):
        let clock = Arc::new(FixedClock::new(1000));
        let repo = InMemoryMessageRepository::new(clock.clone());
        let (alice, bob, carol) = (user("alice"), user("bob"), user("carol"));
        for (from, to, text) in [
            (&alice, &bob, "1"),
            (&bob, &alice, "2"),
            (&alice, &carol, "x"),
            (&alice, &bob, "3"),
        ] {
            repo.persist(from, to, &MessageContent::text(text).unwrap())
                .await
                .unwrap();
            clock.advance(10);
        }

        // when (操作):
        let history = repo.history(&bob, &alice).await.unwrap();

        // then (期待する結果):
        let texts: Vec<&str> = history
            .iter()
            .filter_map(|m| m.content.text_part())
            .collect();
        assert_eq!(texts, vec!["1", "2", "3"]);
        assert_eq!(history[2].created_at, Timestamp::new(1030));
    }
}
