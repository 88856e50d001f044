//! Intake: validation and creation of new pickup requests.
//!
//! Every request enters the pool through [`submit`]. Validation failures
//! name the missing field so the booking form can highlight it.

use crate::error::RequestError;
use crate::model::{ClientContact, Location, PickupRequest, Schedule};
use crate::store::requests::{self, RequestDraft};
use rusqlite::Connection;
use serde::Deserialize;

/// The raw intake payload from the booking form or the staff console.
///
/// Every field tolerates absence; [`validate`] is what decides which
/// blanks are fatal.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRequest {
    #[serde(default)]
    pub client: ClientContact,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub schedule: Option<SchedulePrefs>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub photos: Vec<String>,
}

/// Optional scheduling preferences; both fields have defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulePrefs {
    #[serde(default)]
    pub preferred_date: Option<String>,
    #[serde(default)]
    pub preferred_time: Option<String>,
}

/// Validate `new` and create it in state `pending`.
///
/// # Errors
///
/// [`RequestError::Validation`] naming `client.name` or `location.address`
/// when the field is absent or blank after trimming; otherwise storage
/// errors from the insert.
pub fn submit(conn: &Connection, new: &NewRequest) -> Result<PickupRequest, RequestError> {
    let draft = validate(new)?;
    let request = requests::create(conn, &draft)?;

    tracing::info!(
        request_id = %request.id,
        client = %request.client.name,
        "pickup request created"
    );
    Ok(request)
}

/// Trim and normalize the payload into a [`RequestDraft`].
///
/// # Errors
///
/// [`RequestError::Validation`] for a blank required field.
pub fn validate(new: &NewRequest) -> Result<RequestDraft, RequestError> {
    let name = new.client.name.trim();
    if name.is_empty() {
        return Err(RequestError::Validation {
            field: "client.name",
        });
    }

    let address = new.location.address.trim();
    if address.is_empty() {
        return Err(RequestError::Validation {
            field: "location.address",
        });
    }

    let prefs = new.schedule.clone().unwrap_or_default();
    let schedule = Schedule {
        preferred_date: prefs
            .preferred_date
            .map_or_else(default_date, |d| d.trim().to_string()),
        preferred_time: prefs
            .preferred_time
            .filter(|t| !t.trim().is_empty())
            .map_or_else(Schedule::default_time, |t| t.trim().to_string()),
    };

    Ok(RequestDraft {
        client: ClientContact {
            name: name.to_string(),
            phone: new.client.phone.trim().to_string(),
            email: trimmed_opt(new.client.email.as_deref()),
        },
        location: Location {
            address: address.to_string(),
            sector: trimmed_opt(new.location.sector.as_deref()),
            reference: trimmed_opt(new.location.reference.as_deref()),
        },
        schedule,
        notes: trimmed_opt(new.notes.as_deref()),
        photos: new
            .photos
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
    })
}

fn trimmed_opt(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

fn default_date() -> String {
    chrono::Utc::now().date_naive().to_string()
}
