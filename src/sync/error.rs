use crate::api::ApiError;
use std::fmt;

/// Which engine operation a failure belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOp {
    Open,
    Save,
    PollNote,
    PollIndex,
}

impl fmt::Display for SyncOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncOp::Open => "open note",
            SyncOp::Save => "save note",
            SyncOp::PollNote => "refresh note",
            SyncOp::PollIndex => "refresh note list",
        };
        f.write_str(s)
    }
}

/// A failed store call, reported to the UI. Never fatal to the engine.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("failed to {op}: {source}")]
pub struct SyncError {
    pub op: SyncOp,
    pub note_id: Option<String>,
    #[source]
    pub source: ApiError,
}

impl SyncError {
    pub fn new(op: SyncOp, note_id: Option<&str>, source: ApiError) -> Self {
        Self {
            op,
            note_id: note_id.map(str::to_string),
            source,
        }
    }

    /// Short text suitable for a status line.
    pub fn user_message(&self) -> String {
        match &self.source {
            e if e.is_unauthorized() => "Session expired, please sign in again.".to_string(),
            e if e.is_conflict() => {
                "The server rejected the change as conflicting; it will be rechecked.".to_string()
            }
            ApiError::Network(_) => format!("Could not {}: you appear to be offline.", self.op),
            ApiError::Http { status, .. } => format!("Could not {} (HTTP {status}).", self.op),
            ApiError::InvalidResponse(_) => {
                format!("Could not {}: unexpected server response.", self.op)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_by_status() {
        let expired = SyncError::new(
            SyncOp::Save,
            Some("n1"),
            ApiError::Http {
                status: 401,
                body: String::new(),
            },
        );
        assert!(expired.user_message().contains("Session expired"));

        let offline = SyncError::new(SyncOp::PollNote, None, ApiError::Network("x".into()));
        assert_eq!(
            offline.user_message(),
            "Could not refresh note: you appear to be offline."
        );

        let server = SyncError::new(
            SyncOp::PollIndex,
            None,
            ApiError::Http {
                status: 503,
                body: "busy".into(),
            },
        );
        assert_eq!(
            server.user_message(),
            "Could not refresh note list (HTTP 503)."
        );
    }

    #[test]
    fn test_display_includes_operation() {
        let e = SyncError::new(SyncOp::Open, Some("n1"), ApiError::InvalidResponse("eof".into()));
        assert_eq!(e.to_string(), "failed to open note: invalid response: eof");
    }
}
