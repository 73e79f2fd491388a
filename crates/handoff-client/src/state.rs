use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a [`ProducerSession`](crate::ProducerSession).
///
/// ```text
/// Uninitialized ──initialize/resume──► Ready ──begin──► InTransaction
///                                        ▲                   │
///                                        └── Committing ◄────┤ commit
///                                        └── Aborting   ◄────┘ abort
///
/// close: any state ──► Closed (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Ready,
    InTransaction,
    Committing,
    Aborting,
    Closed,
}

impl SessionState {
    /// Whether a producer identity has been acquired (and the session is open).
    pub fn has_identity(self) -> bool {
        !matches!(self, SessionState::Uninitialized | SessionState::Closed)
    }

    pub fn is_closed(self) -> bool {
        self == SessionState::Closed
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Ready => "ready",
            SessionState::InTransaction => "in_transaction",
            SessionState::Committing => "committing",
            SessionState::Aborting => "aborting",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}
