//! WebSocket connection handlers.
//!
//! 1 接続につき、受信フレームを処理するタスクと、Pusher のチャンネルを
//! WebSocket に書き出すタスクの 2 つが動く。どちらかが終わればもう一方を止め、
//! 切断処理を行う。

use std::{sync::Arc, time::Instant};

use axum::{
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::IntoResponse,
};
use futures_util::{
    sink::SinkExt,
    stream::{SplitSink, SplitStream, StreamExt},
};
use tayori_shared::protocol::{ClientFrame, SendFailureReason, ServerFrame};
use tokio::sync::mpsc;

use crate::{
    domain::{ConnectionId, ConnectionIdFactory, Outbound, RoomId, UserId},
    infrastructure::dto::conversion::envelope_from_dto,
    ui::state::AppState,
    usecase::SendMessageError,
};

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Spawns a task that drains the pusher channel into the WebSocket sink.
///
/// `Outbound::Close` を受け取ったらクローズフレームを送って終了する。
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    mut sender: SplitSink<WebSocket, Message>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            match outbound {
                Outbound::Frame(frame) => {
                    let json = match frame.to_json() {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::error!("Failed to serialize frame: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close { reason } => {
                    let close = CloseFrame {
                        code: close_code::POLICY,
                        reason: reason.into(),
                    };
                    let _ = sender.send(Message::Close(Some(close))).await;
                    break;
                }
            }
        }
    })
}

/// 最初のフレームが `hello` であればトークンを返す
async fn read_hello(receiver: &mut SplitStream<WebSocket>) -> Option<String> {
    while let Some(msg) = receiver.next().await {
        match msg.ok()? {
            Message::Text(text) => {
                return match serde_json::from_str::<ClientFrame>(&text) {
                    Ok(ClientFrame::Hello { token }) => Some(token),
                    _ => None,
                };
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            _ => return None,
        }
    }
    None
}

/// 認証前に失敗を通知して接続を閉じる
async fn reject(mut sender: SplitSink<WebSocket, Message>, reason: String) {
    let frame = ServerFrame::AuthFailed {
        reason: reason.clone(),
    };
    if let Ok(json) = frame.to_json() {
        let _ = sender.send(Message::Text(json.into())).await;
    }
    let close = CloseFrame {
        code: close_code::POLICY,
        reason: reason.into(),
    };
    let _ = sender.send(Message::Close(Some(close))).await;
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id = ConnectionIdFactory::generate();
    let (sender, mut receiver) = socket.split();

    // 1. ハンドシェイク: 最初のフレームは hello でなければならない
    let hello = tokio::time::timeout(state.handshake_timeout, read_hello(&mut receiver));
    let token = match hello.await {
        Ok(Some(token)) => token,
        Ok(None) => {
            tracing::warn!("Connection {} did not start with hello", connection_id);
            reject(sender, "first frame must be hello".to_string()).await;
            return;
        }
        Err(_) => {
            tracing::warn!("Connection {} handshake timed out", connection_id);
            reject(sender, "handshake timed out".to_string()).await;
            return;
        }
    };

    // 2. 認証と登録（welcome はここで積まれる）
    let (tx, rx) = mpsc::unbounded_channel();
    let user_id = match state
        .connect_participant_usecase
        .execute(connection_id, &token, tx)
        .await
    {
        Ok(user_id) => user_id,
        Err(e) => {
            tracing::warn!("Connection {} rejected: {}", connection_id, e);
            reject(sender, e.to_string()).await;
            return;
        }
    };

    // 3. 送信タスクの起動と ACTIVE 化（スナップショット送信）
    let mut send_task = pusher_loop(rx, sender);
    if let Err(e) = state
        .connect_participant_usecase
        .activate(&connection_id)
        .await
    {
        tracing::warn!("Failed to activate connection {}: {}", connection_id, e);
    }

    // 4. 受信タスク
    let state_clone = state.clone();
    let user_id_clone = user_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::warn!("WebSocket error on {}: {}", connection_id, e);
                    break;
                }
            };

            // どのフレームでも生存確認とみなす
            let _ = state_clone
                .heartbeat_usecase
                .beat(&connection_id, Instant::now())
                .await;

            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientFrame>(&text) {
                    Ok(frame) => {
                        handle_frame(&state_clone, connection_id, &user_id_clone, frame).await
                    }
                    Err(e) => {
                        tracing::debug!("Unparseable frame from {}: {}", connection_id, e);
                        reply(
                            &state_clone,
                            &connection_id,
                            error_frame("bad-frame", e.to_string()),
                        )
                        .await;
                    }
                },
                Message::Close(_) => {
                    tracing::info!("Connection {} requested close", connection_id);
                    break;
                }
                _ => {}
            }
        }
    });

    // If any one of the tasks completes, abort the other
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };

    // 5. 切断処理
    state
        .disconnect_participant_usecase
        .execute(&connection_id)
        .await;
    tracing::info!("Connection {} of '{}' closed", connection_id, user_id);
}

async fn handle_frame(
    state: &Arc<AppState>,
    connection_id: ConnectionId,
    user_id: &UserId,
    frame: ClientFrame,
) {
    match frame {
        ClientFrame::Hello { .. } => {
            reply(
                state,
                &connection_id,
                error_frame("already-authenticated", "hello was already accepted"),
            )
            .await;
        }
        ClientFrame::Heartbeat => {
            reply(state, &connection_id, ServerFrame::HeartbeatAck).await;
        }
        ClientFrame::RequestRoster => {
            if let Err(e) = state
                .presence_broadcaster
                .push_snapshot(&connection_id)
                .await
            {
                tracing::warn!("Failed to push roster to {}: {}", connection_id, e);
            }
        }
        ClientFrame::JoinRoom { room_id } => {
            let room_id = match RoomId::new(room_id) {
                Ok(room_id) => room_id,
                Err(e) => {
                    let frame = error_frame("invalid-room", e.to_string());
                    reply(state, &connection_id, frame).await;
                    return;
                }
            };
            let frame = match state.room_usecase.join(connection_id, room_id.clone()).await {
                Ok(()) => ServerFrame::RoomJoined {
                    room_id: room_id.into_string(),
                },
                Err(e) => error_frame("not-connected", e.to_string()),
            };
            reply(state, &connection_id, frame).await;
        }
        ClientFrame::LeaveRoom { room_id } => {
            let frame = match RoomId::new(room_id) {
                Ok(room_id) => {
                    state.room_usecase.leave(&connection_id, &room_id).await;
                    ServerFrame::RoomLeft {
                        room_id: room_id.into_string(),
                    }
                }
                Err(e) => error_frame("invalid-room", e.to_string()),
            };
            reply(state, &connection_id, frame).await;
        }
        ClientFrame::SendMessage { envelope } => {
            let client_message_id = envelope.client_message_id.clone();
            let envelope = match envelope_from_dto(user_id.clone(), envelope) {
                Ok(envelope) => envelope,
                Err(e) => {
                    tracing::debug!("Invalid envelope from {}: {}", connection_id, e);
                    let frame = ServerFrame::SendFailed {
                        client_message_id,
                        reason: SendFailureReason::InvalidEnvelope,
                    };
                    reply(state, &connection_id, frame).await;
                    return;
                }
            };

            // 接続タスクが中断されても送信は最後まで進める
            let state = state.clone();
            let task = tokio::spawn(async move {
                let frame = match state
                    .send_message_usecase
                    .execute(&connection_id, envelope)
                    .await
                {
                    Ok(result) => ServerFrame::SendAck {
                        receipt: result.into(),
                    },
                    Err(e) => ServerFrame::SendFailed {
                        client_message_id,
                        reason: failure_reason(&e),
                    },
                };
                reply(&state, &connection_id, frame).await;
            });
            if let Err(e) = task.await {
                tracing::error!("Send task for {} panicked: {}", connection_id, e);
            }
        }
        ClientFrame::FetchHistory { peer_id } => {
            let frame = match state
                .fetch_history_usecase
                .execute(user_id, &peer_id)
                .await
            {
                Ok(messages) => ServerFrame::History {
                    peer_id,
                    messages: messages.into_iter().map(Into::into).collect(),
                },
                Err(e) => error_frame("history-unavailable", e.to_string()),
            };
            reply(state, &connection_id, frame).await;
        }
        ClientFrame::Typing { room_id } => {
            if let Ok(room_id) = RoomId::new(room_id) {
                state
                    .room_usecase
                    .relay_typing(&connection_id, &room_id)
                    .await;
            }
        }
    }
}

fn failure_reason(error: &SendMessageError) -> SendFailureReason {
    match error {
        SendMessageError::InvalidEnvelope(_) => SendFailureReason::InvalidEnvelope,
        SendMessageError::PersistenceFailed(_) => SendFailureReason::PersistenceFailed,
        SendMessageError::PersistenceTimeout(_) => SendFailureReason::PersistenceTimeout,
    }
}

fn error_frame(code: &str, message: impl Into<String>) -> ServerFrame {
    ServerFrame::Error {
        code: code.to_string(),
        message: message.into(),
    }
}

async fn reply(state: &AppState, connection_id: &ConnectionId, frame: ServerFrame) {
    if let Err(e) = state.message_pusher.push_to(connection_id, &frame).await {
        tracing::debug!("Failed to reply to {}: {}", connection_id, e);
    }
}
