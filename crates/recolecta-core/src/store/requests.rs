//! Typed access to the `requests` table.
//!
//! All functions take a shared `&Connection` and return typed structs,
//! never raw rows. [`conditional_update`] is the single primitive every
//! state transition is built on: one conditional `UPDATE` keyed on the
//! stored `version`, so serialization of concurrent writers happens at
//! the storage layer, not in the caller.

use crate::error::RequestError;
use crate::model::{
    Assignee, ClientContact, Location, PickupRequest, RequestState, Schedule,
};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter, types::Type};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::str::FromStr;

/// A validated request ready for insertion. Produced by intake; the store
/// assigns `id`, `version = 0`, `state = pending`, and the timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDraft {
    pub client: ClientContact,
    pub location: Location,
    pub schedule: Schedule,
    pub notes: Option<String>,
    pub photos: Vec<String>,
}

/// Filter for [`query`]. `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub state: Option<RequestState>,
    pub assignee_id: Option<String>,
}

const REQUEST_COLUMNS: &str = "request_id, client_name, client_phone, client_email, \
     address, sector, reference, preferred_date, preferred_time, \
     state, collector_id, collector_name, notes, version, \
     created_at_us, assigned_at_us, updated_at_us";

/// Insert a new request in state `pending` with `version = 0`.
///
/// Photos are inserted in the same transaction and are write-once: no
/// later operation in this crate touches `request_photos`.
///
/// # Errors
///
/// Returns [`RequestError::Storage`] if the insert fails.
pub fn create(conn: &Connection, draft: &RequestDraft) -> Result<PickupRequest, RequestError> {
    let now_us = now_us();

    // The hashed id is collision-resistant but not collision-free; retry
    // with a fresh nonce on the off chance the primary key is taken.
    let mut last_err = None;
    for _ in 0..3 {
        let id = new_request_id(draft, now_us);
        match insert(conn, &id, draft, now_us) {
            Ok(()) => return get(conn, &id),
            Err(err) if is_primary_key_conflict(&err) => {
                last_err = Some(err);
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(last_err.map_or_else(
        || RequestError::Storage(rusqlite::Error::QueryReturnedNoRows),
        RequestError::Storage,
    ))
}

/// Fetch one request by id.
///
/// # Errors
///
/// Returns [`RequestError::NotFound`] if the id does not exist.
pub fn get(conn: &Connection, id: &str) -> Result<PickupRequest, RequestError> {
    let sql = format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE request_id = ?1");
    let row = conn
        .query_row(&sql, params![id], row_to_request)
        .optional()?;

    match row {
        Some(mut request) => {
            request.photos = photos_for(conn, std::slice::from_ref(&request.id))?
                .remove(&request.id)
                .unwrap_or_default();
            Ok(request)
        }
        None => Err(RequestError::NotFound { id: id.to_string() }),
    }
}

/// List requests matching `filter`, newest first with a stable id tiebreak.
///
/// This is the read path pollers hit every 15-30 seconds; it takes no
/// lock and returns a point-in-time snapshot.
///
/// # Errors
///
/// Returns [`RequestError::Storage`] if the query fails.
pub fn query(
    conn: &Connection,
    filter: &RequestFilter,
) -> Result<Vec<PickupRequest>, RequestError> {
    let mut sql = format!("SELECT {REQUEST_COLUMNS} FROM requests");
    let mut clauses: Vec<&str> = Vec::new();
    let mut params_vec: Vec<String> = Vec::new();

    if let Some(state) = filter.state {
        clauses.push("state = ?");
        params_vec.push(state.as_str().to_string());
    }
    if let Some(assignee_id) = &filter.assignee_id {
        clauses.push("collector_id = ?");
        params_vec.push(assignee_id.clone());
    }

    if !clauses.is_empty() {
        let _ = write!(sql, " WHERE {}", clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY created_at_us DESC, request_id ASC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(params_vec.iter()), row_to_request)?;

    let mut requests = Vec::new();
    for row in rows {
        requests.push(row?);
    }

    let ids: Vec<String> = requests.iter().map(|r| r.id.clone()).collect();
    let mut photos = photos_for(conn, &ids)?;
    for request in &mut requests {
        request.photos = photos.remove(&request.id).unwrap_or_default();
    }

    Ok(requests)
}

/// Apply `mutation` to the stored request iff its `version` still equals
/// `expected_version`, bumping the version by exactly 1.
///
/// The write is a single conditional `UPDATE ... WHERE request_id = ? AND
/// version = ?`; SQLite serializes writers, so at most one caller observes
/// any given version as current. A zero-row update after our read means
/// another writer committed in between and resolves to a fresh
/// [`RequestError::VersionConflict`] (or [`RequestError::NotFound`] if the
/// row vanished, which this schema never does).
///
/// The mutation may change `state`, `assignee`, `notes`, and
/// `assigned_at_us` only; identity, intake fields, and photos are
/// immutable here.
///
/// # Errors
///
/// [`RequestError::NotFound`], [`RequestError::VersionConflict`], or
/// [`RequestError::Storage`].
pub fn conditional_update(
    conn: &Connection,
    id: &str,
    expected_version: i64,
    mutation: impl FnOnce(&mut PickupRequest),
) -> Result<PickupRequest, RequestError> {
    let mut current = get(conn, id)?;
    if current.version != expected_version {
        return Err(version_conflict(&current, expected_version));
    }

    mutation(&mut current);
    current.version = expected_version + 1;
    current.updated_at_us = now_us();

    let (collector_id, collector_name) = match &current.assignee {
        Some(assignee) => (
            Some(assignee.collector_id.as_str()),
            Some(assignee.collector_name.as_str()),
        ),
        None => (None, None),
    };

    let changed = conn.execute(
        "UPDATE requests
         SET state = ?1,
             collector_id = ?2,
             collector_name = ?3,
             notes = ?4,
             version = ?5,
             assigned_at_us = ?6,
             updated_at_us = ?7
         WHERE request_id = ?8 AND version = ?9",
        params![
            current.state.as_str(),
            collector_id,
            collector_name,
            current.notes,
            current.version,
            current.assigned_at_us,
            current.updated_at_us,
            id,
            expected_version,
        ],
    )?;

    if changed == 1 {
        return Ok(current);
    }

    // Lost the race between our read and the conditional write.
    let fresh = get(conn, id)?;
    Err(version_conflict(&fresh, expected_version))
}

fn version_conflict(current: &PickupRequest, expected: i64) -> RequestError {
    RequestError::VersionConflict {
        id: current.id.clone(),
        expected,
        stored: current.version,
        state: current.state,
        assignee: current.assignee.clone(),
    }
}

fn insert(
    conn: &Connection,
    id: &str,
    draft: &RequestDraft,
    now_us: i64,
) -> rusqlite::Result<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute(
        "INSERT INTO requests (
            request_id, client_name, client_phone, client_email,
            address, sector, reference, preferred_date, preferred_time,
            state, notes, version, created_at_us, updated_at_us
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'pending', ?10, 0, ?11, ?11)",
        params![
            id,
            draft.client.name,
            draft.client.phone,
            draft.client.email,
            draft.location.address,
            draft.location.sector,
            draft.location.reference,
            draft.schedule.preferred_date,
            draft.schedule.preferred_time,
            draft.notes,
            now_us,
        ],
    )?;

    for (position, media_ref) in (0_i64..).zip(draft.photos.iter()) {
        tx.execute(
            "INSERT INTO request_photos (request_id, position, media_ref)
             VALUES (?1, ?2, ?3)",
            params![id, position, media_ref],
        )?;
    }

    tx.commit()
}

fn photos_for(
    conn: &Connection,
    ids: &[String],
) -> Result<HashMap<String, Vec<String>>, RequestError> {
    let mut by_request: HashMap<String, Vec<String>> = HashMap::new();
    if ids.is_empty() {
        return Ok(by_request);
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        "SELECT request_id, media_ref
         FROM request_photos
         WHERE request_id IN ({placeholders})
         ORDER BY request_id, position"
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(ids.iter()), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    for row in rows {
        let (request_id, media_ref) = row?;
        by_request.entry(request_id).or_default().push(media_ref);
    }

    Ok(by_request)
}

fn row_to_request(row: &Row<'_>) -> rusqlite::Result<PickupRequest> {
    let state_text: String = row.get(9)?;
    let state = RequestState::from_str(&state_text)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(err)))?;

    let collector_id: Option<String> = row.get(10)?;
    let collector_name: Option<String> = row.get(11)?;
    let assignee = match (collector_id, collector_name) {
        (Some(collector_id), Some(collector_name)) => Some(Assignee {
            collector_id,
            collector_name,
        }),
        _ => None,
    };

    Ok(PickupRequest {
        id: row.get(0)?,
        client: ClientContact {
            name: row.get(1)?,
            phone: row.get(2)?,
            email: row.get(3)?,
        },
        location: Location {
            address: row.get(4)?,
            sector: row.get(5)?,
            reference: row.get(6)?,
        },
        schedule: Schedule {
            preferred_date: row.get(7)?,
            preferred_time: row.get(8)?,
        },
        state,
        assignee,
        notes: row.get(12)?,
        photos: Vec::new(),
        version: row.get(13)?,
        created_at_us: row.get(14)?,
        assigned_at_us: row.get(15)?,
        updated_at_us: row.get(16)?,
    })
}

fn new_request_id(draft: &RequestDraft, now_us: i64) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(draft.client.name.as_bytes());
    hasher.update(draft.location.address.as_bytes());
    hasher.update(&now_us.to_le_bytes());
    hasher.update(&rand::random::<u64>().to_le_bytes());

    let hex = hasher.finalize().to_hex();
    format!("sr-{}", &hex.as_str()[..10])
}

fn is_primary_key_conflict(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(info, _)
            if info.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

pub(crate) fn now_us() -> i64 {
    chrono::Utc::now().timestamp_micros()
}
