//! UseCase: 2 人の間のメッセージ履歴取得
//!
//! オフライン中に届いたメッセージは、再接続後にここから取得される。

use std::{sync::Arc, time::Duration};

use crate::domain::{MessageRepository, StoredMessage, UserId};

use super::error::FetchHistoryError;

pub struct FetchHistoryUseCase {
    repository: Arc<dyn MessageRepository>,
    timeout: Duration,
}

impl FetchHistoryUseCase {
    pub fn new(repository: Arc<dyn MessageRepository>, timeout: Duration) -> Self {
        Self {
            repository,
            timeout,
        }
    }

    /// `user_id` と `peer_id` の間のメッセージを保存順に返す
    pub async fn execute(
        &self,
        user_id: &UserId,
        peer_id: &str,
    ) -> Result<Vec<StoredMessage>, FetchHistoryError> {
        let peer_id = UserId::new(peer_id.to_string())?;
        match tokio::time::timeout(self.timeout, self.repository.history(user_id, &peer_id)).await
        {
            Ok(Ok(messages)) => Ok(messages),
            Ok(Err(e)) => Err(FetchHistoryError::Unavailable(e.to_string())),
            Err(_) => Err(FetchHistoryError::Unavailable(format!(
                "timed out after {:?}",
                self.timeout
            ))),
        }
    }
}
