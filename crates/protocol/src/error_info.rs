use serde::{Deserialize, Serialize};

/// Category of a failed fetch, as shown to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ErrorKind {
    /// Network unreachable, timeout, connection reset.
    Transport,
    /// The source answered with a non-success status.
    Server { status: u16 },
    /// The payload did not have the expected page shape.
    MalformedResponse,
}

/// A fetch failure recorded on a lane.
///
/// Serializable so a UI can render it as a dismissible message; the lane's
/// records stay untouched while this is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(flatten)]
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self.kind, ErrorKind::Transport)
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ErrorKind::Transport => write!(f, "network error: {}", self.message),
            ErrorKind::Server { status } => write!(f, "server error {status}: {}", self.message),
            ErrorKind::MalformedResponse => write!(f, "unexpected response: {}", self.message),
        }
    }
}
