//! Canonical SQLite schema for the pickup-request store.
//!
//! The schema is normalized for queryability and safe concurrent writes:
//! - `requests` keeps the aggregate fields plus the `version` fencing token
//!   every conditional update is keyed on
//! - `request_photos` models the write-once ordered media references
//! - CHECK constraints keep the assignee/state invariant true even for a
//!   buggy writer

/// Migration v1: core tables.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS requests (
    request_id TEXT PRIMARY KEY CHECK (request_id LIKE 'sr-%'),
    client_name TEXT NOT NULL CHECK (length(trim(client_name)) > 0),
    client_phone TEXT NOT NULL DEFAULT '',
    client_email TEXT,
    address TEXT NOT NULL CHECK (length(trim(address)) > 0),
    sector TEXT,
    reference TEXT,
    preferred_date TEXT NOT NULL,
    preferred_time TEXT NOT NULL DEFAULT 'flexible',
    state TEXT NOT NULL DEFAULT 'pending'
        CHECK (state IN ('pending', 'assigned', 'completed', 'cancelled')),
    collector_id TEXT,
    collector_name TEXT,
    notes TEXT,
    version INTEGER NOT NULL DEFAULT 0 CHECK (version >= 0),
    created_at_us INTEGER NOT NULL,
    assigned_at_us INTEGER,
    updated_at_us INTEGER NOT NULL,
    CHECK ((collector_id IS NOT NULL) = (state IN ('assigned', 'completed'))),
    CHECK ((collector_id IS NULL) = (collector_name IS NULL))
);

CREATE TABLE IF NOT EXISTS request_photos (
    request_id TEXT NOT NULL REFERENCES requests(request_id) ON DELETE CASCADE,
    position INTEGER NOT NULL CHECK (position >= 0),
    media_ref TEXT NOT NULL CHECK (length(trim(media_ref)) > 0),
    PRIMARY KEY (request_id, position)
);
";

/// Migration v2: read-path indexes for the polling queries.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_requests_state_created
    ON requests(state, created_at_us DESC);

CREATE INDEX IF NOT EXISTS idx_requests_collector_created
    ON requests(collector_id, created_at_us DESC);
";

/// Indexes that must exist after migration (asserted by tests).
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_requests_state_created",
    "idx_requests_collector_created",
];
