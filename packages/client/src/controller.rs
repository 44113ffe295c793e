//! Reconnection controller.
//!
//! Owns the client's single logical connection on one task. Each session runs
//! connect -> hello/welcome -> replay -> serve. When a session drops, the
//! controller backs off and opens a new one. Meanwhile the application keeps
//! submitting commands: room changes are recorded, sends are queued in the
//! outbox, and everything is replayed once the next session is active.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use tayori_shared::protocol::{
    ClientFrame, OutboundEnvelope, ServerFrame, StoredMessageDto, direct_room_id,
};
use tokio::{
    sync::{mpsc, oneshot, watch},
    time::{Instant, MissedTickBehavior},
};

use crate::{
    domain::{ConnectionState, next_reconnect_delay, should_exit_immediately},
    error::ClientError,
    handle::ClientConfig,
    listener::Listeners,
    outbox::{Outbox, SendResponder},
    roster::Roster,
    transport::{Connector, FrameSink, FrameStream},
};

pub(crate) type HistoryResponder = oneshot::Sender<Result<Vec<StoredMessageDto>, ClientError>>;

/// Floor for the heartbeat period advertised in `welcome`
const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(50);

/// Requests from `ClientHandle` to the controller task
pub(crate) enum Command {
    JoinRoom(String),
    LeaveRoom(String),
    /// Join the one-to-one room shared with this peer
    JoinConversation(String),
    Send {
        envelope: OutboundEnvelope,
        responder: SendResponder,
    },
    FetchHistory {
        peer_id: String,
        responder: HistoryResponder,
    },
    Typing(String),
    RequestRoster,
    Disconnect,
}

/// Why a session ended
enum SessionEnd {
    /// The application asked to close (or dropped its handle)
    Closed,
    Lost(ClientError),
}

type Halves = (Box<dyn FrameSink>, Box<dyn FrameStream>);

pub(crate) struct Controller {
    connector: Arc<dyn Connector>,
    token: String,
    config: ClientConfig,
    commands: mpsc::UnboundedReceiver<Command>,
    listeners: Arc<RwLock<Listeners>>,
    state: watch::Sender<ConnectionState>,
    roster: Roster,
    outbox: Outbox,
    /// Rooms the client considers itself in; rejoined on every session
    rooms: BTreeSet<String>,
    /// Peers whose conversation room waits for the first `welcome` to learn our user id
    conversations: Vec<String>,
    /// Identity from the latest `welcome`
    user_id: Option<String>,
    history: HashMap<String, Vec<HistoryResponder>>,
    /// Retry counter, reset whenever a session becomes active
    attempt: u32,
    sessions: u32,
}

impl Controller {
    pub(crate) fn new(
        connector: Arc<dyn Connector>,
        token: String,
        config: ClientConfig,
        commands: mpsc::UnboundedReceiver<Command>,
        listeners: Arc<RwLock<Listeners>>,
        state: watch::Sender<ConnectionState>,
    ) -> Self {
        Self {
            connector,
            token,
            config,
            commands,
            listeners,
            state,
            roster: Roster::new(),
            outbox: Outbox::new(),
            rooms: BTreeSet::new(),
            conversations: Vec::new(),
            user_id: None,
            history: HashMap::new(),
            attempt: 0,
            sessions: 0,
        }
    }

    /// Drive sessions until the application closes or a terminal error occurs.
    pub(crate) async fn run(mut self) -> Result<(), ClientError> {
        let result = loop {
            self.transition(ConnectionState::Connecting);
            let error = match self.run_session().await {
                SessionEnd::Closed => break Ok(()),
                SessionEnd::Lost(error) => error,
            };

            self.attempt += 1;
            let Some(delay) = next_reconnect_delay(&error, self.attempt, &self.config.policy)
            else {
                if should_exit_immediately(&error) {
                    tracing::error!("Giving up: {}", error);
                    break Err(error);
                }
                tracing::error!(
                    "Failed to reconnect after {} attempts: {}",
                    self.config.policy.max_retries,
                    error
                );
                break Err(ClientError::RetriesExhausted(self.config.policy.max_retries));
            };

            tracing::warn!(
                "Connection lost: {}. Reconnecting in {:?} (attempt {}/{})",
                error,
                delay,
                self.attempt,
                self.config.policy.max_retries
            );
            self.transition(ConnectionState::Recovering);
            if let Some(SessionEnd::Closed) = self.wait_offline(delay).await {
                break Ok(());
            }
        };

        self.transition(ConnectionState::Closed);
        let error = result.clone().err().unwrap_or(ClientError::Closed);
        self.outbox.fail_all(&error);
        for (_, responders) in self.history.drain() {
            for responder in responders {
                let _ = responder.send(Err(error.clone()));
            }
        }
        result
    }

    async fn run_session(&mut self) -> SessionEnd {
        // 1. トランスポートを開く
        let (mut sink, mut stream) = match self.open().await {
            Ok(halves) => halves,
            Err(end) => return end,
        };

        // 2. hello / welcome
        self.transition(ConnectionState::Authenticating);
        let hello = ClientFrame::Hello {
            token: self.token.clone(),
        };
        if let Err(e) = sink.send(&hello).await {
            return SessionEnd::Lost(e);
        }
        let interval = match self.await_welcome(stream.as_mut()).await {
            Ok(interval) => interval,
            Err(end) => {
                sink.close().await;
                return end;
            }
        };

        // 3. ACTIVE 化と状態の再送
        self.attempt = 0;
        self.sessions += 1;
        self.roster.begin_session();
        self.transition(ConnectionState::Active);
        if let Err(e) = self.replay(sink.as_mut()).await {
            return SessionEnd::Lost(e);
        }

        // 4. 受信・コマンド・ハートビート
        let end = self.serve(sink.as_mut(), stream.as_mut(), interval).await;
        if let SessionEnd::Lost(_) = end {
            sink.close().await;
        }
        end
    }

    /// Open the transport while still accepting commands.
    async fn open(&mut self) -> Result<Halves, SessionEnd> {
        let connector = self.connector.clone();
        let connect = async move { connector.connect().await };
        tokio::pin!(connect);

        loop {
            tokio::select! {
                result = &mut connect => return result.map_err(SessionEnd::Lost),
                command = self.commands.recv() => {
                    if let Some(end) = self.handle_offline(command) {
                        return Err(end);
                    }
                }
            }
        }
    }

    /// Wait for `welcome` and return the heartbeat interval it advertises.
    async fn await_welcome(
        &mut self,
        stream: &mut dyn FrameStream,
    ) -> Result<Duration, SessionEnd> {
        let deadline = tokio::time::sleep(self.config.handshake_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    return Err(SessionEnd::Lost(ClientError::ConnectionLost(
                        "handshake timed out".to_string(),
                    )));
                }
                frame = stream.next_frame() => {
                    let frame = match frame {
                        Some(Ok(frame)) => frame,
                        Some(Err(e)) => return Err(SessionEnd::Lost(e)),
                        None => {
                            return Err(SessionEnd::Lost(ClientError::ConnectionLost(
                                "closed during handshake".to_string(),
                            )));
                        }
                    };
                    return match frame {
                        ServerFrame::Welcome {
                            connection_id,
                            user_id,
                            heartbeat_interval_ms,
                        } => {
                            tracing::info!(
                                "Authenticated as '{}' (connection {})",
                                user_id,
                                connection_id
                            );
                            for peer_id in std::mem::take(&mut self.conversations) {
                                self.rooms.insert(direct_room_id(&user_id, &peer_id));
                            }
                            self.user_id = Some(user_id);
                            let interval = Duration::from_millis(heartbeat_interval_ms);
                            Ok(interval.max(MIN_HEARTBEAT_INTERVAL))
                        }
                        ServerFrame::AuthFailed { reason } => {
                            Err(SessionEnd::Lost(ClientError::AuthFailed(reason)))
                        }
                        other => Err(SessionEnd::Lost(ClientError::Protocol(format!(
                            "expected welcome, got {:?}",
                            other
                        )))),
                    };
                }
                command = self.commands.recv() => {
                    if let Some(end) = self.handle_offline(command) {
                        return Err(end);
                    }
                }
            }
        }
    }

    /// Restore what the previous session had: roster, rooms, unacknowledged
    /// sends, and outstanding history requests.
    async fn replay(&mut self, sink: &mut dyn FrameSink) -> Result<(), ClientError> {
        // 初回は welcome の直後にサーバーがスナップショットを送ってくる
        if self.sessions > 1 {
            sink.send(&ClientFrame::RequestRoster).await?;
        }
        for room_id in &self.rooms {
            let frame = ClientFrame::JoinRoom {
                room_id: room_id.clone(),
            };
            sink.send(&frame).await?;
        }
        let unacknowledged = self.outbox.unacknowledged();
        if !unacknowledged.is_empty() {
            tracing::info!("Resending {} unacknowledged message(s)", unacknowledged.len());
        }
        for envelope in unacknowledged {
            sink.send(&ClientFrame::SendMessage { envelope }).await?;
        }
        for peer_id in self.history.keys() {
            let frame = ClientFrame::FetchHistory {
                peer_id: peer_id.clone(),
            };
            sink.send(&frame).await?;
        }
        Ok(())
    }

    async fn serve(
        &mut self,
        sink: &mut dyn FrameSink,
        stream: &mut dyn FrameStream,
        interval: Duration,
    ) -> SessionEnd {
        let silence_limit = interval * 2;
        let mut heartbeat = tokio::time::interval_at(Instant::now() + interval, interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_frame_at = Instant::now();

        loop {
            tokio::select! {
                frame = stream.next_frame() => match frame {
                    Some(Ok(frame)) => {
                        last_frame_at = Instant::now();
                        if let Some(end) = self.handle_frame(frame) {
                            return end;
                        }
                    }
                    Some(Err(e)) => return SessionEnd::Lost(e),
                    None => {
                        return SessionEnd::Lost(ClientError::ConnectionLost(
                            "server closed the connection".to_string(),
                        ));
                    }
                },
                command = self.commands.recv() => {
                    if let Some(end) = self.handle_online(command, sink).await {
                        return end;
                    }
                }
                _ = heartbeat.tick() => {
                    if last_frame_at.elapsed() >= silence_limit {
                        return SessionEnd::Lost(ClientError::HeartbeatTimeout(silence_limit));
                    }
                    if let Err(e) = sink.send(&ClientFrame::Heartbeat).await {
                        return SessionEnd::Lost(e);
                    }
                }
            }
        }
    }

    /// Sleep out the backoff delay while still accepting commands.
    async fn wait_offline(&mut self, delay: Duration) -> Option<SessionEnd> {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return None,
                command = self.commands.recv() => {
                    if let Some(end) = self.handle_offline(command) {
                        return Some(end);
                    }
                }
            }
        }
    }

    fn handle_frame(&mut self, frame: ServerFrame) -> Option<SessionEnd> {
        match frame {
            ServerFrame::RosterSnapshot { entries } => {
                self.roster.apply_snapshot(entries);
                let entries = self.roster.entries();
                self.notify(|listeners| listeners.roster_snapshot(&entries));
            }
            ServerFrame::RosterDelta { entry } => {
                if self.roster.apply_delta(entry.clone()) {
                    self.notify(|listeners| listeners.roster_delta(&entry));
                }
            }
            ServerFrame::MessageNew { message } => {
                self.notify(|listeners| listeners.message(&message));
            }
            ServerFrame::SendAck { receipt } => self.outbox.acknowledge(receipt),
            ServerFrame::SendFailed {
                client_message_id,
                reason,
            } => self.outbox.reject(&client_message_id, reason),
            ServerFrame::History { peer_id, messages } => {
                for responder in self.history.remove(&peer_id).unwrap_or_default() {
                    let _ = responder.send(Ok(messages.clone()));
                }
            }
            ServerFrame::Typing { room_id, user_id } => {
                self.notify(|listeners| listeners.typing(&room_id, &user_id));
            }
            ServerFrame::RoomJoined { room_id } => tracing::debug!("Joined room {}", room_id),
            ServerFrame::RoomLeft { room_id } => tracing::debug!("Left room {}", room_id),
            ServerFrame::HeartbeatAck => {}
            ServerFrame::Error { code, message } => {
                tracing::warn!("Server error {}: {}", code, message);
                if code == "history-unavailable" {
                    let error = ClientError::Server { code, message };
                    for (_, responders) in self.history.drain() {
                        for responder in responders {
                            let _ = responder.send(Err(error.clone()));
                        }
                    }
                }
            }
            ServerFrame::AuthFailed { reason } => {
                return Some(SessionEnd::Lost(ClientError::AuthFailed(reason)));
            }
            ServerFrame::Welcome { .. } => tracing::warn!("Ignoring unexpected welcome"),
        }
        None
    }

    async fn handle_online(
        &mut self,
        command: Option<Command>,
        sink: &mut dyn FrameSink,
    ) -> Option<SessionEnd> {
        let frame = match command? {
            Command::Disconnect => {
                sink.close().await;
                return Some(SessionEnd::Closed);
            }
            Command::JoinRoom(room_id) => {
                self.rooms.insert(room_id.clone());
                ClientFrame::JoinRoom { room_id }
            }
            Command::JoinConversation(peer_id) => {
                let Some(user_id) = &self.user_id else {
                    self.conversations.push(peer_id);
                    return None;
                };
                let room_id = direct_room_id(user_id, &peer_id);
                self.rooms.insert(room_id.clone());
                ClientFrame::JoinRoom { room_id }
            }
            Command::LeaveRoom(room_id) => {
                self.rooms.remove(&room_id);
                ClientFrame::LeaveRoom { room_id }
            }
            Command::Send {
                envelope,
                responder,
            } => {
                if !self.outbox.enqueue(envelope.clone(), responder) {
                    return None;
                }
                ClientFrame::SendMessage { envelope }
            }
            Command::FetchHistory { peer_id, responder } => {
                let waiters = self.history.entry(peer_id.clone()).or_default();
                waiters.push(responder);
                if waiters.len() > 1 {
                    return None;
                }
                ClientFrame::FetchHistory { peer_id }
            }
            Command::Typing(room_id) => ClientFrame::Typing { room_id },
            Command::RequestRoster => ClientFrame::RequestRoster,
        };

        // 書き込みに失敗しても送信は outbox に残り、次のセッションで再送される
        sink.send(&frame).await.err().map(SessionEnd::Lost)
    }

    fn handle_offline(&mut self, command: Option<Command>) -> Option<SessionEnd> {
        let Some(command) = command else {
            return Some(SessionEnd::Closed);
        };
        match command {
            Command::Disconnect => return Some(SessionEnd::Closed),
            Command::JoinRoom(room_id) => {
                self.rooms.insert(room_id);
            }
            Command::JoinConversation(peer_id) => match &self.user_id {
                Some(user_id) => {
                    self.rooms.insert(direct_room_id(user_id, &peer_id));
                }
                None => self.conversations.push(peer_id),
            },
            Command::LeaveRoom(room_id) => {
                self.rooms.remove(&room_id);
            }
            Command::Send {
                envelope,
                responder,
            } => {
                tracing::debug!("Queued '{}' until reconnected", envelope.client_message_id);
                self.outbox.enqueue(envelope, responder);
            }
            Command::FetchHistory { peer_id, responder } => {
                self.history.entry(peer_id).or_default().push(responder);
            }
            // 再接続時にスナップショットが届く
            Command::Typing(_) | Command::RequestRoster => {}
        }
        None
    }

    fn transition(&mut self, next: ConnectionState) {
        let current = *self.state.borrow();
        if current == next {
            return;
        }
        debug_assert!(
            current.can_transition_to(next),
            "illegal transition {} -> {}",
            current,
            next
        );

        self.state.send_replace(next);
        tracing::info!("Connection state: {} -> {}", current, next);
        self.notify(|listeners| listeners.state_change(next));
    }

    fn notify(&self, f: impl FnOnce(&Listeners)) {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        f(&listeners);
    }
}
