use std::future;

use serde::Serialize;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No session and none requested.
    #[default]
    Disconnected,
    /// A session start is waiting for its confirmation.
    Connecting,
    /// The device confirmed the session.
    Connected,
    /// The session was lost; a reconnect is scheduled.
    Reconnecting,
    /// Closed by the caller.
    Closed,
}

/// Snapshot of the session state published to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SessionStatus {
    pub phase: SessionPhase,
    /// The device confirmed the current session with OK.
    pub connected: bool,
    /// A reconnect attempt is scheduled.
    pub reconnect_armed: bool,
    /// The device resumed a previous session instead of starting fresh.
    pub resumed: bool,
}

/// The actor's one-shot deadlines. At most one of each kind is armed.
#[derive(Debug, Default)]
pub(crate) struct Timers {
    pub keepalive: Option<Instant>,
    pub reconnect: Option<Instant>,
    pub replay: Option<Instant>,
}

impl Timers {
    /// Arm the reconnect timer unless it is already armed.
    ///
    /// Returns whether a new deadline was set.
    pub fn arm_reconnect(&mut self, at: Instant) -> bool {
        if self.reconnect.is_some() {
            return false;
        }
        self.reconnect = Some(at);
        true
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Sleep until `deadline`, or forever when there is none.
pub(crate) async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => future::pending::<()>().await,
    }
}

/// Wait for `task` to finish, or forever when there is none.
pub(crate) async fn join_opt<T>(task: &mut Option<JoinHandle<T>>) -> Result<T, JoinError> {
    match task {
        Some(task) => task.await,
        None => future::pending().await,
    }
}
