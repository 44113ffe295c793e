//! UseCase: 会話相手の一覧（自分以外のユーザー）

use std::sync::Arc;

use crate::domain::{UserDirectory, UserId, UserProfile};

pub struct ListUsersUseCase {
    directory: Arc<dyn UserDirectory>,
}

impl ListUsersUseCase {
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self { directory }
    }

    pub async fn execute(&self, user_id: &UserId) -> Vec<UserProfile> {
        self.directory.list_other_users(user_id).await
    }
}
