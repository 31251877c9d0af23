use std::{fmt::Display, time::Duration};

use crate::scheduler::TimerSlot;

/// Lifecycle state of the gateway client
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// no connection, waiting to (re)connect
    Disconnected,
    /// opening the transport
    Connecting,
    /// transport open, waiting for the server hello
    AwaitingHello,
    /// identify sent, waiting for READY
    Identifying,
    /// resume sent, waiting for RESUMED
    Resuming,
    /// session established, events are flowing
    Ready,
    /// stopped on request, terminal
    Stopped,
}

impl Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AwaitingHello => "awaiting hello",
            Self::Identifying => "identifying",
            Self::Resuming => "resuming",
            Self::Ready => "ready",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Session bookkeeping, kept across reconnects
#[derive(Debug, Default)]
pub(crate) struct Session {
    /// increased on every new transport, heartbeat ticks carry it to detect stale timers
    pub connection: u64,
    pub session_id: Option<String>,
    pub sequence: Option<u64>,
    pub heartbeat_interval: Option<Duration>,
    pub heartbeat_in_flight: bool,
    pub heartbeat_timer: TimerSlot,
}

impl Session {
    /// Remember the greatest sequence number seen
    pub fn record_sequence(&mut self, seq: u64) {
        if self.sequence.map_or(true, |last| last < seq) {
            self.sequence = Some(seq);
        }
    }

    /// Both session id and sequence number are needed to resume
    pub fn resume_arguments(&self) -> Option<(&str, u64)> {
        Some((self.session_id.as_deref()?, self.sequence?))
    }

    /// Start bookkeeping for a fresh transport
    pub fn new_connection(&mut self) -> u64 {
        self.end_connection();
        self.connection += 1;
        self.connection
    }

    /// Forget everything tied to the current transport, keep resume arguments
    pub fn end_connection(&mut self) {
        self.heartbeat_timer.clear();
        self.heartbeat_interval = None;
        self.heartbeat_in_flight = false;
    }

    /// Server refuses to resume, next connection must identify
    pub fn invalidate(&mut self) {
        log::debug!(
            "Drop session {:?} at sequence {:?}",
            self.session_id,
            self.sequence
        );
        self.session_id = None;
        self.sequence = None;
    }
}
