use std::fmt;

/// Coarse progress of a transaction, after net/base/load_states.h.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Idle,
    /// Taking a pooled stream or dialing (DNS, connect, handshake).
    Connecting,
    /// Request sent, no response headers yet.
    WaitingForResponse,
    ReadingResponse,
    /// Finished, successfully or not.
    Complete,
}

impl LoadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadState::Idle => "idle",
            LoadState::Connecting => "connecting",
            LoadState::WaitingForResponse => "waiting_for_response",
            LoadState::ReadingResponse => "reading_response",
            LoadState::Complete => "complete",
        }
    }
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
