//! 静的なトークン表を使った TokenValidator 実装
//!
//! トークンの発行・失効はこのシステムの外で行われる前提で、起動時に渡された
//! `token → user_id` の表を引くだけの実装です。

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::{AuthError, TokenValidator, UserId};

pub struct StaticTokenValidator {
    tokens: HashMap<String, UserId>,
}

impl StaticTokenValidator {
    pub fn new(tokens: HashMap<String, UserId>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl TokenValidator for StaticTokenValidator {
    async fn validate(&self, token: &str) -> Result<UserId, AuthError> {
        let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
        if token.is_empty() {
            return Err(AuthError::MissingCredential);
        }
        self.tokens
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidCredential)
    }
}
