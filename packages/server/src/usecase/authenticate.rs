//! UseCase: トークン検証
//!
//! Token Validator の呼び出しを上限時間つきで行います。WebSocket のハンドシェイクと
//! HTTP API の Bearer 認証の両方がここを通ります。

use std::{sync::Arc, time::Duration};

use crate::domain::{AuthError, TokenValidator, UserId};

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct AuthenticateUseCase {
    validator: Arc<dyn TokenValidator>,
    timeout: Duration,
}

impl AuthenticateUseCase {
    pub fn new(validator: Arc<dyn TokenValidator>, timeout: Duration) -> Self {
        Self { validator, timeout }
    }

    /// トークンからユーザーを特定する
    ///
    /// 上限時間を超えた場合は `AuthError::Timeout`。
    pub async fn execute(&self, token: &str) -> Result<UserId, AuthError> {
        match tokio::time::timeout(self.timeout, self.validator.validate(token)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Token validation timed out after {:?}", self.timeout);
                Err(AuthError::Timeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::validator::MockTokenValidator;
    use async_trait::async_trait;

    struct SlowValidator;

    #[async_trait]
    impl TokenValidator for SlowValidator {
        async fn validate(&self, _token: &str) -> Result<UserId, AuthError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(AuthError::Unavailable("never".to_string()))
        }
    }

    #[tokio::test]
    async fn test_execute_returns_user_from_validator() {
        // テスト項目: Validator が返したユーザーがそのまま返る
        // given (前提条件):
        let mut validator = MockTokenValidator::new();
        validator
            .expect_validate()
            .withf(|token| token == "token-a")
            .returning(|_| Ok(UserId::new("alice".to_string()).unwrap()));
        let usecase = AuthenticateUseCase::new(Arc::new(validator), Duration::from_secs(1));

        // when (操作):
        let result = usecase.execute("token-a").await;

        // then (期待する結果):
        assert_eq!(result.unwrap().as_str(), "alice");
    }

    #[tokio::test]
    async fn test_execute_propagates_invalid_credential() {
        // テスト項目: 無効なトークンは AuthError としてそのまま返る
        // given (前提条件):
        let mut validator = MockTokenValidator::new();
        validator
            .expect_validate()
            .returning(|_| Err(AuthError::InvalidCredential));
        let usecase = AuthenticateUseCase::new(Arc::new(validator), Duration::from_secs(1));

        // when (操作):
        let result = usecase.execute("bogus").await;

        // then (期待する結果):
        assert_eq!(result, Err(AuthError::InvalidCredential));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_times_out_slow_validator() {
        // テスト項目: 応答しない Validator は上限時間で Timeout になる
        // given (前提条件):
        let usecase = AuthenticateUseCase::new(Arc::new(SlowValidator), Duration::from_secs(10));

        // when (操作):
        let result = usecase.execute("token-a").await;

        // then (期待する結果):
        assert_eq!(result, Err(AuthError::Timeout));
    }
}
