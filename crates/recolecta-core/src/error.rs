use crate::model::{Assignee, RequestState};
use std::fmt;
use thiserror::Error;

/// Machine-readable error codes for client-side decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    RequestNotFound,
    InvalidStateTransition,
    ValidationFailed,
    StaleVersion,
    AlreadyAssigned,
    StorageFailed,
    NotifyFailed,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::RequestNotFound => "E2001",
            Self::InvalidStateTransition => "E2002",
            Self::ValidationFailed => "E2003",
            Self::StaleVersion => "E2101",
            Self::AlreadyAssigned => "E2102",
            Self::StorageFailed => "E5001",
            Self::NotifyFailed => "E6001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::RequestNotFound => "Pickup request not found",
            Self::InvalidStateTransition => "Invalid state transition",
            Self::ValidationFailed => "Required field missing",
            Self::StaleVersion => "Stale version",
            Self::AlreadyAssigned => "Request already assigned",
            Self::StorageFailed => "Request store failure",
            Self::NotifyFailed => "Notification delivery failed",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and clients.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in recolecta.toml and retry."),
            Self::RequestNotFound => None,
            Self::InvalidStateTransition => {
                Some("Follow valid transitions: pending -> assigned -> completed.")
            }
            Self::ValidationFailed => Some("Provide the named field and resubmit."),
            Self::StaleVersion => {
                Some("Re-read the request and retry with its current version.")
            }
            Self::AlreadyAssigned => {
                Some("Refresh the pool; another collector took this request.")
            }
            Self::StorageFailed => Some("Check disk space and database permissions."),
            Self::NotifyFailed => Some("The assignment stands; delivery will not be retried here."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

fn describe_occupied(id: &str, state: &RequestState, assignee: Option<&Assignee>) -> String {
    assignee.map_or_else(
        || format!("request {id} is {state}"),
        |a| format!("request {id} already assigned to {}", a.collector_name),
    )
}

/// Errors surfaced by the store, intake, and arbiter.
#[derive(Debug, Error)]
pub enum RequestError {
    /// A required intake field is missing or blank after trimming.
    #[error("{field} is required")]
    Validation { field: &'static str },

    /// The referenced request id does not exist.
    #[error("request not found: {id}")]
    NotFound { id: String },

    /// The caller's fencing token is stale: another writer committed first.
    ///
    /// Carries the current state and assignee so the caller can reconcile
    /// without an extra round trip.
    #[error("stale version for {id}: expected {expected}, stored {stored}")]
    VersionConflict {
        id: String,
        expected: i64,
        stored: i64,
        state: RequestState,
        assignee: Option<Assignee>,
    },

    /// The request is no longer `pending`; an expected outcome of losing
    /// the claim race, not a defect.
    #[error("{}", describe_occupied(.id, .state, .assignee.as_ref()))]
    AlreadyAssigned {
        id: String,
        state: RequestState,
        assignee: Option<Assignee>,
    },

    /// The requested transition is not allowed by the lifecycle rules.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: RequestState,
        to: RequestState,
    },

    /// Underlying SQLite failure.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl RequestError {
    /// Map to the stable machine-readable code.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::ValidationFailed,
            Self::NotFound { .. } => ErrorCode::RequestNotFound,
            Self::VersionConflict { .. } => ErrorCode::StaleVersion,
            Self::AlreadyAssigned { .. } => ErrorCode::AlreadyAssigned,
            Self::InvalidTransition { .. } => ErrorCode::InvalidStateTransition,
            Self::Storage(_) => ErrorCode::StorageFailed,
        }
    }
}
