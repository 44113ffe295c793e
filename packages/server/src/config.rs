//! サーバー設定
//!
//! コマンドライン引数（`bin/server.rs`）から組み立てられ、`ui::Server` に渡されます。

use std::{str::FromStr, time::Duration};

use crate::{
    infrastructure::{
        DEFAULT_SHARD_COUNT,
        dedup::{DEFAULT_CAPACITY, DEFAULT_RETENTION},
    },
    usecase::{
        DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_HEARTBEAT_TIMEOUT, DEFAULT_PERSIST_TIMEOUT,
        DEFAULT_SWEEP_INTERVAL,
    },
};

/// 起動時に登録するユーザー（`user_id:token[:display_name]`）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedUser {
    pub user_id: String,
    pub token: String,
    pub display_name: String,
}

impl FromStr for SeedUser {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut parts = value.splitn(3, ':');
        let user_id = parts.next().unwrap_or_default().trim();
        let token = parts.next().unwrap_or_default().trim();
        if user_id.is_empty() || token.is_empty() {
            return Err(format!(
                "expected 'user_id:token[:display_name]', got '{}'",
                value
            ));
        }
        let display_name = parts
            .next()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(user_id);

        Ok(Self {
            user_id: user_id.to_string(),
            token: token.to_string(),
            display_name: display_name.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 無応答とみなして切断するまでの時間
    pub heartbeat_timeout: Duration,
    /// クライアントがハートビートを送る間隔（welcome で通知）
    pub heartbeat_interval: Duration,
    pub sweep_interval: Duration,
    pub handshake_timeout: Duration,
    pub persist_timeout: Duration,
    pub dedup_retention: Duration,
    pub dedup_capacity: usize,
    pub shard_count: usize,
    pub users: Vec<SeedUser>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_TIMEOUT / 3,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            persist_timeout: DEFAULT_PERSIST_TIMEOUT,
            dedup_retention: DEFAULT_RETENTION,
            dedup_capacity: DEFAULT_CAPACITY,
            shard_count: DEFAULT_SHARD_COUNT,
            users: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_user_parses_all_parts() {
        // テスト項目: user_id:token:display_name を分解できる
        // given (前提条件):
        let raw = "alice:token-a:Alice Liddell";

        // when (操作):
        let user: SeedUser = raw.parse().unwrap();

        // then (期待する結果):
        assert_eq!(
            user,
            SeedUser {
                user_id: "alice".to_string(),
                token: "token-a".to_string(),
                display_name: "Alice Liddell".to_string(),
            }
        );
    }

    #[test]
    fn test_seed_user_defaults_display_name_to_user_id() {
        // テスト項目: 表示名を省略するとユーザー ID が使われる
        // given (前提条件):
        let raw = "bob:token-b";

        // when (操作):
        let user: SeedUser = raw.parse().unwrap();

        // then (期待する結果):
        assert_eq!(user.display_name, "bob");
    }

    #[test]
    fn test_seed_user_without_token_is_rejected() {
        // テスト項目: トークンがない指定はエラーになる
        // given (前提条件):
        let raw = "carol";

        // when (操作):
        let result = raw.parse::<SeedUser>();

        // then (期待する結果):
        assert!(result.is_err());
    }

    #[test]
    fn test_default_heartbeat_interval_is_below_timeout() {
        // テスト項目: 既定のハートビート間隔はタイムアウトより十分短い
        // given (前提条件):
        let config = ServerConfig::default();

        // when (操作):
        let ratio = config.heartbeat_timeout.as_millis() / config.heartbeat_interval.as_millis();

        // then (期待する結果):
        assert_eq!(ratio, 3);
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(60));
    }
}
