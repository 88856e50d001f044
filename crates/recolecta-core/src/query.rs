//! Read-only listing surface polled by collectors and staff.
//!
//! `list` takes no lock and returns a point-in-time snapshot; pollers
//! re-query every 15-30 seconds, and staleness up to one poll interval is
//! an accepted trade-off of the design, not an error. A committed state
//! change is visible to the next poll, never before it commits. No
//! process-local cache sits in front of the store.

use crate::error::RequestError;
use crate::model::PickupRequest;
use crate::store::requests;
use rusqlite::Connection;

pub use crate::store::requests::RequestFilter;

/// List requests matching `filter`, newest first.
///
/// # Errors
///
/// Returns [`RequestError::Storage`] if the underlying query fails.
pub fn list(conn: &Connection, filter: &RequestFilter) -> Result<Vec<PickupRequest>, RequestError> {
    requests::query(conn, filter)
}
