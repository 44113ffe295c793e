//! Token Validator trait 定義
//!
//! 認証サブシステムとの境界。トークンの発行やハッシュ化はこのシステムの責務ではない。

use async_trait::async_trait;

use super::{AuthError, UserId};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// bearer トークンを検証してユーザーを特定する
    async fn validate(&self, token: &str) -> Result<UserId, AuthError>;
}
