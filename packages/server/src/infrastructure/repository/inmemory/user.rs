//! InMemory User Directory 実装

use async_trait::async_trait;

use crate::domain::{UserDirectory, UserId, UserProfile};

/// 起動時に与えられたプロフィール一覧を返すだけのディレクトリ
pub struct InMemoryUserDirectory {
    profiles: Vec<UserProfile>,
}

impl InMemoryUserDirectory {
    pub fn new(mut profiles: Vec<UserProfile>) -> Self {
        profiles.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Self { profiles }
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn list_other_users(&self, excluding: &UserId) -> Vec<UserProfile> {
        self.profiles
            .iter()
            .filter(|p| &p.user_id != excluding)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: &str) -> UserProfile {
        UserProfile {
            user_id: UserId::new(id.to_string()).unwrap(),
            display_name: id.to_uppercase(),
            avatar_ref: None,
        }
    }

    #[tokio::test]
    async fn test_list_other_users_excludes_caller() {
        // テスト項目: 呼び出したユーザー自身は一覧に含まれない
        // given (前提条件):
        let directory = InMemoryUserDirectory::new(vec![profile("bob"), profile("alice")]);

        // when (操作):
        let others = directory
            .list_other_users(&UserId::new("alice".to_string()).unwrap())
            .await;

        // then (期待する結果):
        assert_eq!(others, vec![profile("bob")]);
    }
}
