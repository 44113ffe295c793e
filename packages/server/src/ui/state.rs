//! Shared application state.

use std::{sync::Arc, time::Duration};

use crate::{
    domain::MessagePusher,
    usecase::{
        AuthenticateUseCase, ConnectParticipantUseCase, DisconnectParticipantUseCase,
        FetchHistoryUseCase, HeartbeatUseCase, ListUsersUseCase, PresenceBroadcaster, RoomUseCase,
        SendMessageUseCase,
    },
};

/// Shared application state
pub struct AppState {
    /// AuthenticateUseCase（HTTP API の Bearer 認証）
    pub authenticate_usecase: Arc<AuthenticateUseCase>,
    /// ConnectParticipantUseCase（認証・登録・有効化）
    pub connect_participant_usecase: Arc<ConnectParticipantUseCase>,
    /// DisconnectParticipantUseCase（切断）
    pub disconnect_participant_usecase: Arc<DisconnectParticipantUseCase>,
    pub send_message_usecase: Arc<SendMessageUseCase>,
    pub room_usecase: Arc<RoomUseCase>,
    pub heartbeat_usecase: Arc<HeartbeatUseCase>,
    pub fetch_history_usecase: Arc<FetchHistoryUseCase>,
    pub list_users_usecase: Arc<ListUsersUseCase>,
    pub presence_broadcaster: Arc<PresenceBroadcaster>,
    /// MessagePusher（自分の接続への応答フレーム送信）
    pub message_pusher: Arc<dyn MessagePusher>,
    /// 最初の `hello` フレームを待つ時間
    pub handshake_timeout: Duration,
}
