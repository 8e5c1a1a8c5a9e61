use chrono::NaiveDate;
use ledger_feed_protocol::{ErrorInfo, ErrorKind, LaneId};
use thiserror::Error;

/// Failure reported by a record source for one page request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl SourceError {
    pub fn malformed(detail: impl Into<String>) -> Self {
        SourceError::MalformedResponse(detail.into())
    }
}

impl From<&SourceError> for ErrorInfo {
    fn from(err: &SourceError) -> Self {
        match err {
            SourceError::Transport(msg) => ErrorInfo::new(ErrorKind::Transport, msg.clone()),
            SourceError::Server { status, message } => {
                ErrorInfo::new(ErrorKind::Server { status: *status }, message.clone())
            }
            SourceError::MalformedResponse(msg) => {
                ErrorInfo::new(ErrorKind::MalformedResponse, msg.clone())
            }
        }
    }
}

/// Caller-supplied filter rejected before any fetch is issued.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("start date {start} is after end date {end}")]
    InvertedDateRange { start: NaiveDate, end: NaiveDate },
}

/// Errors returned by feed controller operations.
///
/// Fetch failures are not in here: they are recorded on the lane and never
/// escape the coordinator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeedError {
    #[error("unknown lane: {0}")]
    UnknownLane(LaneId),
    #[error("invalid filter: {0}")]
    Validation(#[from] ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_errors_map_to_error_info() {
        let info = ErrorInfo::from(&SourceError::Server {
            status: 502,
            message: "bad gateway".into(),
        });
        assert_eq!(info.kind, ErrorKind::Server { status: 502 });
        assert_eq!(info.message, "bad gateway");

        let info = ErrorInfo::from(&SourceError::Transport("timed out".into()));
        assert!(info.is_transport());

        let info = ErrorInfo::from(&SourceError::malformed("no records array"));
        assert_eq!(info.kind, ErrorKind::MalformedResponse);
    }

    #[test]
    fn validation_wraps_into_feed_error() {
        let start = NaiveDate::from_ymd_opt(2024, 2, 1).expect("valid date");
        let end = NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date");
        let err: FeedError = ValidationError::InvertedDateRange { start, end }.into();
        assert_eq!(
            err.to_string(),
            "invalid filter: start date 2024-02-01 is after end date 2024-01-01"
        );
    }
}
