//! Domain logic for the reconnection controller.
//!
//! Pure functions and value types without side effects: the connection state
//! machine and the bounded exponential backoff policy.

use std::{fmt, time::Duration};

use crate::error::ClientError;

/// Lifecycle of the client's single logical connection.
///
/// ```text
/// Idle -> Connecting -> Authenticating -> Active -> Recovering -> Connecting ...
///                                                             \-> Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Authenticating,
    Active,
    Recovering,
    Closed,
}

impl ConnectionState {
    /// Whether `self -> next` is a legal transition.
    ///
    /// Every non-terminal state may go to `Closed` (user disconnect or a
    /// terminal error). `Closed` is terminal.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Idle, Connecting) => true,
            (Connecting, Authenticating | Recovering) => true,
            (Authenticating, Active | Recovering) => true,
            (Active, Recovering) => true,
            (Recovering, Connecting) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == ConnectionState::Closed
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Active => "active",
            ConnectionState::Recovering => "recovering",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);
pub const DEFAULT_MULTIPLIER: u32 = 2;
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Bounded exponential backoff between reconnection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
    pub max_retries: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            max_delay: DEFAULT_MAX_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (1-based).
    ///
    /// # Returns
    ///
    /// `None` once `attempt` exceeds `max_retries`
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_retries {
            return None;
        }

        let factor = self
            .multiplier
            .checked_pow(attempt - 1)
            .unwrap_or(u32::MAX);
        let delay = self
            .initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay);
        Some(delay.min(self.max_delay))
    }
}

/// Check if the client should give up immediately based on the error type.
///
/// # Arguments
///
/// * `error` - The error that ended the last session
///
/// # Returns
///
/// `true` if the error is terminal (e.g., AuthFailed), `false` otherwise
pub fn should_exit_immediately(error: &ClientError) -> bool {
    matches!(error, ClientError::AuthFailed(_) | ClientError::Closed)
}

/// Check if the client should attempt to reconnect.
///
/// # Arguments
///
/// * `error` - The error that ended the last session
/// * `attempt` - The retry about to be made (1-based)
/// * `policy` - The backoff policy in effect
///
/// # Returns
///
/// The delay to wait before reconnecting, or `None` to give up
pub fn next_reconnect_delay(
    error: &ClientError,
    attempt: u32,
    policy: &ReconnectPolicy,
) -> Option<Duration> {
    if should_exit_immediately(error) {
        return None;
    }
    policy.delay_for(attempt)
}
