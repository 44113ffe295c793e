//! Server execution logic.

use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};

use axum::{Router, routing::get};
use tayori_shared::time::SystemClock;
use tokio::{net::TcpListener, sync::mpsc};
use tower_http::trace::TraceLayer;

use crate::{
    config::ServerConfig,
    domain::{PresenceChange, UserId, UserProfile},
    infrastructure::{
        DedupCache, InMemoryMessageRepository, InMemoryRoomRouter, InMemoryUserDirectory,
        ShardedConnectionRegistry, StaticTokenValidator, WebSocketMessagePusher,
    },
    usecase::{
        AuthenticateUseCase, ConnectParticipantUseCase, DisconnectParticipantUseCase,
        FetchHistoryUseCase, HeartbeatUseCase, ListUsersUseCase, PresenceBroadcaster, RoomUseCase,
        SendMessageUseCase,
    },
};

use super::{
    handler::{get_messages, get_roster, get_users, health_check, websocket_handler},
    signal::shutdown_signal,
    state::AppState,
};

/// Presence and message delivery server
///
/// # Example
///
/// ```ignore
/// let server = Server::new(ServerConfig::default())?;
/// server.run("127.0.0.1".to_string(), 8080).await?;
/// ```
pub struct Server {
    state: Arc<AppState>,
    /// Registry が積むプレゼンス遷移。`serve` で Presence Broadcaster に渡す
    presence_feed: mpsc::UnboundedReceiver<PresenceChange>,
    sweep_interval: Duration,
}

impl Server {
    /// 設定からインメモリ実装の依存関係を組み立てる
    ///
    /// # Errors
    ///
    /// シードユーザーの ID が不正な場合
    pub fn new(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        // Initialize dependencies in order:
        // 1. External collaborators (token validator, persistence, user directory)
        // 2. Registry / Router / MessagePusher / dedup cache
        // 3. UseCases
        // 4. AppState

        // 1. External collaborators
        let mut tokens = HashMap::new();
        let mut profiles = Vec::new();
        for seed in &config.users {
            let user_id = UserId::new(seed.user_id.clone())?;
            tokens.insert(seed.token.clone(), user_id.clone());
            profiles.push(UserProfile {
                user_id,
                display_name: seed.display_name.clone(),
                avatar_ref: None,
            });
        }
        let validator = Arc::new(StaticTokenValidator::new(tokens));
        let clock = Arc::new(SystemClock);
        let message_repository = Arc::new(InMemoryMessageRepository::new(clock.clone()));
        let user_directory = Arc::new(InMemoryUserDirectory::new(profiles));

        // 2. Registry / Router / MessagePusher / dedup cache
        let (feed_tx, presence_feed) = mpsc::unbounded_channel();
        let registry = Arc::new(ShardedConnectionRegistry::new(config.shard_count, feed_tx));
        let router = Arc::new(InMemoryRoomRouter::new(registry.clone()));
        let message_pusher = Arc::new(WebSocketMessagePusher::default());
        let dedup = Arc::new(DedupCache::new(
            config.dedup_retention,
            config.dedup_capacity,
        ));

        // 3. UseCases
        let authenticate_usecase = Arc::new(AuthenticateUseCase::new(
            validator,
            config.handshake_timeout,
        ));
        let presence_broadcaster = Arc::new(PresenceBroadcaster::new(
            registry.clone(),
            message_pusher.clone(),
        ));
        let connect_participant_usecase = Arc::new(ConnectParticipantUseCase::new(
            authenticate_usecase.clone(),
            registry.clone(),
            message_pusher.clone(),
            presence_broadcaster.clone(),
            clock,
            config.heartbeat_interval,
        ));
        let disconnect_participant_usecase = Arc::new(DisconnectParticipantUseCase::new(
            registry.clone(),
            router.clone(),
            message_pusher.clone(),
        ));
        let send_message_usecase = Arc::new(SendMessageUseCase::new(
            message_repository.clone(),
            registry.clone(),
            message_pusher.clone(),
            dedup,
            config.persist_timeout,
        ));
        let room_usecase = Arc::new(RoomUseCase::new(
            router,
            registry.clone(),
            message_pusher.clone(),
        ));
        let heartbeat_usecase = Arc::new(HeartbeatUseCase::new(
            registry,
            message_pusher.clone(),
            disconnect_participant_usecase.clone(),
            config.heartbeat_timeout,
        ));
        let fetch_history_usecase = Arc::new(FetchHistoryUseCase::new(
            message_repository,
            config.persist_timeout,
        ));
        let list_users_usecase = Arc::new(ListUsersUseCase::new(user_directory));

        // 4. AppState
        let state = Arc::new(AppState {
            authenticate_usecase,
            connect_participant_usecase,
            disconnect_participant_usecase,
            send_message_usecase,
            room_usecase,
            heartbeat_usecase,
            fetch_history_usecase,
            list_users_usecase,
            presence_broadcaster,
            message_pusher,
            handshake_timeout: config.handshake_timeout,
        });

        Ok(Self {
            state,
            presence_feed,
            sweep_interval: config.sweep_interval,
        })
    }

    fn router(&self) -> Router {
        Router::new()
            // WebSocket エンドポイント
            .route("/ws", get(websocket_handler))
            // HTTP エンドポイント
            .route("/api/health", get(health_check))
            .route("/api/roster", get(get_roster))
            .route("/api/users", get(get_users))
            .route("/api/messages/{peer_id}", get(get_messages))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Run the server until SIGINT / SIGTERM
    ///
    /// # Arguments
    ///
    /// * `host` - The host address to bind to (e.g., "127.0.0.1")
    /// * `port` - The port number to bind to (e.g., 8080)
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the specified address or
    /// if there's an error during server execution.
    pub async fn run(
        self,
        host: String,
        port: u16,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let bind_addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&bind_addr).await?;

        tracing::info!("Tayori server listening on {}", listener.local_addr()?);
        tracing::info!("Connect to: ws://{}/ws", bind_addr);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        self.serve(listener, shutdown_signal()).await
    }

    /// 既にバインド済みのリスナーで `shutdown` が完了するまでサーバーを動かす
    ///
    /// Presence Broadcaster とハートビートの掃除タスクもここで起動・停止する。
    pub async fn serve<F>(
        self,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let broadcaster = self
            .state
            .presence_broadcaster
            .clone()
            .spawn(self.presence_feed);
        let sweeper = self
            .state
            .heartbeat_usecase
            .clone()
            .spawn_sweeper(self.sweep_interval);

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await;

        sweeper.abort();
        broadcaster.abort();
        tracing::info!("Server shutdown complete");

        Ok(result?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_serve_runs_on_spawned_task_until_shutdown() {
        // テスト項目: serve を別タスクで動かし、シャットダウン通知で正常終了する
        // given (前提条件):
        let server = Server::new(ServerConfig::default()).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve(listener, async move {
            let _ = rx.await;
        }));

        // when (操作):
        tx.send(()).unwrap();
        let result = handle.await.unwrap();

        // then (期待する結果):
        assert!(result.is_ok());
    }
}
