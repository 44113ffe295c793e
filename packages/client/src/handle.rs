//! Public entry point of the client library.

use std::{
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use tayori_shared::protocol::{
    DeliveredMessage, DeliveryReceipt, MessageContentDto, OutboundEnvelope, RosterEntry,
    StoredMessageDto,
};
use tokio::{
    sync::{Mutex, mpsc, oneshot, watch},
    task::JoinHandle,
};
use uuid::Uuid;

use crate::{
    controller::{Command, Controller},
    domain::{ConnectionState, ReconnectPolicy},
    error::ClientError,
    listener::Listeners,
    transport::Connector,
};

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    pub policy: ReconnectPolicy,
    /// How long to wait for `welcome` after sending `hello`
    pub handshake_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            policy: ReconnectPolicy::default(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

/// Handle to one logical connection.
///
/// Register listeners, then call [`ClientHandle::connect`]. Commands issued
/// before the connection is active (or while it is recovering) are kept and
/// applied once a session is up.
///
/// # Example
///
/// ```ignore
/// let client = ClientHandle::new(
///     Arc::new(WebSocketConnector::new("ws://127.0.0.1:8080/ws")),
///     ClientConfig::default(),
/// );
/// client.on_message(|message| println!("{:?}", message));
/// client.connect("token-a").await?;
/// let receipt = client
///     .send_message(ClientHandle::compose("bob", MessageContentDto::text("hi")))
///     .await?;
/// ```
pub struct ClientHandle {
    connector: Arc<dyn Connector>,
    config: ClientConfig,
    commands: mpsc::UnboundedSender<Command>,
    listeners: Arc<RwLock<Listeners>>,
    state: watch::Receiver<ConnectionState>,
    /// Controller inputs, taken by the first `connect`
    startup: Mutex<Option<(mpsc::UnboundedReceiver<Command>, watch::Sender<ConnectionState>)>>,
    task: Mutex<Option<JoinHandle<Result<(), ClientError>>>>,
}

impl ClientHandle {
    pub fn new(connector: Arc<dyn Connector>, config: ClientConfig) -> Self {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Idle);

        Self {
            connector,
            config,
            commands,
            listeners: Arc::new(RwLock::new(Listeners::default())),
            state,
            startup: Mutex::new(Some((commands_rx, state_tx))),
            task: Mutex::new(None),
        }
    }

    /// Build an envelope with a fresh client message id.
    ///
    /// Keep the envelope if you need to retry it yourself: the id is what
    /// makes a retry idempotent.
    pub fn compose(receiver_id: impl Into<String>, content: MessageContentDto) -> OutboundEnvelope {
        OutboundEnvelope {
            client_message_id: Uuid::new_v4().to_string(),
            receiver_id: receiver_id.into(),
            content,
        }
    }

    /// Start the controller and wait until the first session is active.
    ///
    /// Reconnection keeps running in the background afterwards.
    ///
    /// # Errors
    ///
    /// - `AlreadyConnected` on a second call
    /// - the terminal error if the client closed before becoming active
    ///   (`AuthFailed`, `RetriesExhausted`)
    pub async fn connect(&self, token: &str) -> Result<(), ClientError> {
        let (commands, state_tx) = self
            .startup
            .lock()
            .await
            .take()
            .ok_or(ClientError::AlreadyConnected)?;

        let controller = Controller::new(
            self.connector.clone(),
            token.to_string(),
            self.config,
            commands,
            self.listeners.clone(),
            state_tx,
        );
        *self.task.lock().await = Some(tokio::spawn(controller.run()));

        let mut state = self.state.clone();
        let reached = state
            .wait_for(|s| matches!(s, ConnectionState::Active | ConnectionState::Closed))
            .await
            .map(|s| *s);
        match reached {
            Ok(ConnectionState::Active) => Ok(()),
            _ => match self.join().await {
                Err(e) => Err(e),
                Ok(()) => Err(ClientError::Closed),
            },
        }
    }

    /// Close the connection for good and wait for the controller to stop.
    ///
    /// Sends still waiting for acknowledgment fail with `Closed`.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        let _ = self.commands.send(Command::Disconnect);
        self.join().await
    }

    async fn join(&self) -> Result<(), ClientError> {
        let Some(task) = self.task.lock().await.take() else {
            return Ok(());
        };
        match task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Controller task failed: {}", e);
                Err(ClientError::Closed)
            }
        }
    }

    pub fn join_room(&self, room_id: impl Into<String>) -> Result<(), ClientError> {
        self.command(Command::JoinRoom(room_id.into()))
    }

    /// Join the one-to-one room shared with `peer_id`.
    ///
    /// The room id is derived from our own user id once the server has told us
    /// who we are, so this may be called before `connect` returns.
    pub fn join_conversation(&self, peer_id: impl Into<String>) -> Result<(), ClientError> {
        self.command(Command::JoinConversation(peer_id.into()))
    }

    pub fn leave_room(&self, room_id: impl Into<String>) -> Result<(), ClientError> {
        self.command(Command::LeaveRoom(room_id.into()))
    }

    /// Tell the other members of `room_id` that we are typing (dropped while offline)
    pub fn send_typing(&self, room_id: impl Into<String>) -> Result<(), ClientError> {
        self.command(Command::Typing(room_id.into()))
    }

    /// Ask for a fresh roster snapshot; it arrives through `on_roster_snapshot`
    pub fn request_roster(&self) -> Result<(), ClientError> {
        self.command(Command::RequestRoster)
    }

    /// Send a message and wait for the server's acknowledgment.
    ///
    /// While disconnected the envelope is queued; it survives reconnects and is
    /// resent with the same `client_message_id` until acknowledged.
    pub async fn send_message(
        &self,
        envelope: OutboundEnvelope,
    ) -> Result<DeliveryReceipt, ClientError> {
        let (responder, receipt) = oneshot::channel();
        self.command(Command::Send {
            envelope,
            responder,
        })?;
        receipt.await.map_err(|_| ClientError::Closed)?
    }

    /// Conversation history with `peer_id`
    pub async fn request_history(
        &self,
        peer_id: impl Into<String>,
    ) -> Result<Vec<StoredMessageDto>, ClientError> {
        let (responder, messages) = oneshot::channel();
        self.command(Command::FetchHistory {
            peer_id: peer_id.into(),
            responder,
        })?;
        messages.await.map_err(|_| ClientError::Closed)?
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch channel following every state transition
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn on_roster_snapshot(&self, listener: impl Fn(&[RosterEntry]) + Send + Sync + 'static) {
        self.listeners().roster_snapshot.push(Box::new(listener));
    }

    pub fn on_roster_delta(&self, listener: impl Fn(&RosterEntry) + Send + Sync + 'static) {
        self.listeners().roster_delta.push(Box::new(listener));
    }

    pub fn on_message(&self, listener: impl Fn(&DeliveredMessage) + Send + Sync + 'static) {
        self.listeners().message.push(Box::new(listener));
    }

    pub fn on_state_change(&self, listener: impl Fn(ConnectionState) + Send + Sync + 'static) {
        self.listeners().state_change.push(Box::new(listener));
    }

    /// Called with `(room_id, user_id)`
    pub fn on_typing(&self, listener: impl Fn(&str, &str) + Send + Sync + 'static) {
        self.listeners().typing.push(Box::new(listener));
    }

    fn listeners(&self) -> std::sync::RwLockWriteGuard<'_, Listeners> {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn command(&self, command: Command) -> Result<(), ClientError> {
        self.commands.send(command).map_err(|_| ClientError::Closed)
    }
}
