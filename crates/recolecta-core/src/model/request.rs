use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The four lifecycle states of a pickup request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    Pending,
    Assigned,
    Completed,
    Cancelled,
}

impl RequestState {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether a request in this state carries an assignee.
    #[must_use]
    pub const fn carries_assignee(self) -> bool {
        matches!(self, Self::Assigned | Self::Completed)
    }

    /// Whether this state accepts no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Validate whether a transition from self to `target` is allowed.
    ///
    /// Valid transitions:
    /// - `pending -> assigned` (claim / staff-directed assign)
    /// - `assigned -> completed`
    /// - `pending -> cancelled`
    /// - `assigned -> cancelled`
    ///
    /// No transition re-enters `pending`.
    pub fn can_transition_to(self, target: Self) -> Result<(), InvalidTransition> {
        let allowed = matches!(
            (self, target),
            (Self::Pending, Self::Assigned)
                | (Self::Assigned, Self::Completed)
                | (Self::Pending | Self::Assigned, Self::Cancelled)
        );

        if allowed {
            Ok(())
        } else {
            Err(InvalidTransition {
                from: self,
                to: target,
            })
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a state value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStateError {
    pub got: String,
}

impl fmt::Display for ParseStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid state: '{}'", self.got)
    }
}

impl std::error::Error for ParseStateError {}

impl FromStr for RequestState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "assigned" => Ok(Self::Assigned),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(ParseStateError { got: s.to_string() }),
        }
    }
}

/// Error returned when a state transition is invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: RequestState,
    pub to: RequestState,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid transition: {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}

/// Contact details of the person requesting the pickup.
///
/// `name` defaults to empty on deserialization; intake validation rejects
/// the blank value with the field name, which beats a serde parse error
/// for form clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContact {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Where the parcel is collected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(default)]
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// When the client would like the pickup to happen.
///
/// `preferred_time` is free text; "flexible" means any time that day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub preferred_date: String,
    #[serde(default = "Schedule::default_time")]
    pub preferred_time: String,
}

impl Schedule {
    pub(crate) fn default_time() -> String {
        "flexible".to_string()
    }
}

/// The field collector a request is assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignee {
    pub collector_id: String,
    pub collector_name: String,
}

/// All persisted fields for a pickup request.
///
/// Invariant: `assignee` is `Some` iff `state.carries_assignee()`.
/// `version` is the fencing token every conditional update is keyed on;
/// it starts at 0 and increases by exactly 1 per successful update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickupRequest {
    pub id: String,
    pub client: ClientContact,
    pub location: Location,
    pub schedule: Schedule,
    pub state: RequestState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<Assignee>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub photos: Vec<String>,
    pub version: i64,
    pub created_at_us: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_at_us: Option<i64>,
    pub updated_at_us: i64,
}

impl PickupRequest {
    /// Check the assignee/state invariant on an in-memory value.
    #[must_use]
    pub fn assignee_invariant_holds(&self) -> bool {
        self.assignee.is_some() == self.state.carries_assignee()
    }
}
