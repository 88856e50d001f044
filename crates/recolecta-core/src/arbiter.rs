//! Claim arbiter: the only component permitted to move a request out of
//! `pending`.
//!
//! Self-service claim and staff-directed assignment are one operation with
//! a different caller identity, so they share a single code path here and
//! therefore a single race-handling policy. All transitions go through the
//! store's conditional update; the arbiter never performs a bare
//! read-then-write.

use crate::error::RequestError;
use crate::model::{Assignee, PickupRequest, RequestState};
use crate::notify::Notifier;
use crate::store::requests;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

/// Who initiated the claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    /// A field collector taking a request from the pool for themselves.
    Collector,
    /// Staff placing a chosen collector on the request.
    Staff,
}

/// The collector who will become the assignee, plus who asked for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimActor {
    pub collector_id: String,
    pub collector_name: String,
    pub role: ActorRole,
}

/// Atomically transition `pending -> assigned` and record the assignee.
///
/// The precondition (`state == pending`) is enforced at the moment of the
/// conditional update, not against the read that preceded it: the fencing
/// token changes on every state transition, so a matching version proves
/// the request was still pending when the write landed.
///
/// A version conflict can also come from a benign concurrent write that
/// did not take the request, so the claim is retried exactly once against
/// fresh state; a second conflict is reported as [`RequestError::AlreadyAssigned`]
/// with the current assignee. Re-claiming a request already assigned to
/// the same collector is deliberately a conflict too, never a silent
/// success: double-claim and re-claim are indistinguishable on the wire,
/// and the pool favors an explicit, auditable no-op.
///
/// On success the notifier fires once, outside the write; a delivery
/// failure is logged and never unwinds the assignment.
///
/// # Errors
///
/// [`RequestError::NotFound`] for an unknown id,
/// [`RequestError::AlreadyAssigned`] when the request is no longer
/// pending, or storage errors.
pub fn claim(
    conn: &Connection,
    notifier: &dyn Notifier,
    id: &str,
    actor: &ClaimActor,
) -> Result<PickupRequest, RequestError> {
    let mut current = requests::get(conn, id)?;

    for attempt in 0..2_u8 {
        if current.state != RequestState::Pending {
            return Err(occupied(&current));
        }

        match try_assign(conn, &current, actor) {
            Ok(updated) => {
                tracing::info!(
                    request_id = %updated.id,
                    collector_id = %actor.collector_id,
                    role = ?actor.role,
                    version = updated.version,
                    "request claimed"
                );
                if let Err(err) = notifier.assignment(&updated) {
                    tracing::warn!(
                        request_id = %updated.id,
                        code = %err.error_code(),
                        %err,
                        "assignment notification failed; assignment stands"
                    );
                }
                return Ok(updated);
            }
            Err(RequestError::VersionConflict { .. }) if attempt == 0 => {
                current = requests::get(conn, id)?;
            }
            Err(RequestError::VersionConflict { .. }) => {
                let fresh = requests::get(conn, id)?;
                return Err(occupied(&fresh));
            }
            Err(err) => return Err(err),
        }
    }

    let fresh = requests::get(conn, id)?;
    Err(occupied(&fresh))
}

/// Transition `pending | assigned -> cancelled`.
///
/// `expected_version` is the fencing token the caller last observed; a
/// stale token fails with [`RequestError::VersionConflict`] carrying the
/// current state, so a cancel can never silently undo a newer assignment.
///
/// # Errors
///
/// [`RequestError::NotFound`], [`RequestError::InvalidTransition`] for a
/// terminal request, [`RequestError::VersionConflict`] for a stale token.
pub fn cancel(
    conn: &Connection,
    id: &str,
    expected_version: i64,
) -> Result<PickupRequest, RequestError> {
    let current = requests::get(conn, id)?;
    current
        .state
        .can_transition_to(RequestState::Cancelled)
        .map_err(|err| RequestError::InvalidTransition {
            from: err.from,
            to: err.to,
        })?;

    let cancelled = requests::conditional_update(conn, id, expected_version, |r| {
        r.state = RequestState::Cancelled;
        // Only assigned/completed requests carry an assignee.
        r.assignee = None;
    })?;

    tracing::info!(request_id = %cancelled.id, "request cancelled");
    Ok(cancelled)
}

/// Transition `assigned -> completed`. Invoked by the downstream
/// collection workflow once the pickup produced a real invoice.
///
/// # Errors
///
/// [`RequestError::NotFound`], [`RequestError::InvalidTransition`] unless
/// the request is currently assigned, [`RequestError::VersionConflict`]
/// for a stale token.
pub fn complete(
    conn: &Connection,
    id: &str,
    expected_version: i64,
) -> Result<PickupRequest, RequestError> {
    let current = requests::get(conn, id)?;
    current
        .state
        .can_transition_to(RequestState::Completed)
        .map_err(|err| RequestError::InvalidTransition {
            from: err.from,
            to: err.to,
        })?;

    let completed = requests::conditional_update(conn, id, expected_version, |r| {
        r.state = RequestState::Completed;
    })?;

    tracing::info!(request_id = %completed.id, "request completed");
    Ok(completed)
}

fn try_assign(
    conn: &Connection,
    current: &PickupRequest,
    actor: &ClaimActor,
) -> Result<PickupRequest, RequestError> {
    requests::conditional_update(conn, &current.id, current.version, |r| {
        r.state = RequestState::Assigned;
        r.assignee = Some(Assignee {
            collector_id: actor.collector_id.clone(),
            collector_name: actor.collector_name.clone(),
        });
        r.assigned_at_us = Some(requests::now_us());
    })
}

fn occupied(current: &PickupRequest) -> RequestError {
    RequestError::AlreadyAssigned {
        id: current.id.clone(),
        state: current.state,
        assignee: current.assignee.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::{ActorRole, ClaimActor, cancel, claim, complete};
    use crate::error::RequestError;
    use crate::model::{ClientContact, Location, PickupRequest, RequestState};
    use crate::notify::{NotifyError, Notifier};
    use crate::store::{self, requests::RequestDraft};
    use proptest::prelude::*;
    use rusqlite::Connection;
    use std::path::PathBuf;
    use std::sync::{Arc, Barrier, Mutex};
    use tempfile::TempDir;

    /// Records every notification so tests can count deliveries.
    #[derive(Default)]
    struct RecordingNotifier {
        seen: Mutex<Vec<String>>,
    }

    impl Notifier for RecordingNotifier {
        fn assignment(&self, request: &PickupRequest) -> Result<(), NotifyError> {
            self.seen
                .lock()
                .map_err(|_| NotifyError("poisoned".to_string()))?
                .push(request.id.clone());
            Ok(())
        }
    }

    /// Always fails, to prove delivery failure never unwinds a claim.
    struct FailingNotifier;

    impl Notifier for FailingNotifier {
        fn assignment(&self, _request: &PickupRequest) -> Result<(), NotifyError> {
            Err(NotifyError("channel down".to_string()))
        }
    }

    fn test_store() -> (TempDir, PathBuf, Connection) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("requests.sqlite3");
        let conn = store::open(&path).expect("open store");
        (dir, path, conn)
    }

    fn seeded_request(conn: &Connection) -> PickupRequest {
        store::requests::create(
            conn,
            &RequestDraft {
                client: ClientContact {
                    name: "Maria Garcia".to_string(),
                    phone: String::new(),
                    email: None,
                },
                location: Location {
                    address: "Calle 5".to_string(),
                    sector: None,
                    reference: None,
                },
                schedule: crate::model::Schedule {
                    preferred_date: "2025-07-01".to_string(),
                    preferred_time: crate::model::Schedule::default_time(),
                },
                notes: None,
                photos: vec![],
            },
        )
        .expect("seed request")
    }

    fn collector(id: &str) -> ClaimActor {
        ClaimActor {
            collector_id: id.to_string(),
            collector_name: format!("Collector {id}"),
            role: ActorRole::Collector,
        }
    }

    #[test]
    fn claim_assigns_and_notifies_once() {
        let (_dir, _path, conn) = test_store();
        let request = seeded_request(&conn);
        let notifier = RecordingNotifier::default();

        let updated = claim(&conn, &notifier, &request.id, &collector("c1")).expect("claim");

        assert_eq!(updated.state, RequestState::Assigned);
        assert_eq!(updated.version, 1);
        assert!(updated.assigned_at_us.is_some());
        let assignee = updated.assignee.expect("assignee present");
        assert_eq!(assignee.collector_id, "c1");

        assert_eq!(notifier.seen.lock().expect("lock").len(), 1);
    }

    #[test]
    fn losing_claim_reports_the_winner() {
        let (_dir, _path, conn) = test_store();
        let request = seeded_request(&conn);
        let notifier = RecordingNotifier::default();

        claim(&conn, &notifier, &request.id, &collector("c1")).expect("first claim");
        let err =
            claim(&conn, &notifier, &request.id, &collector("c2")).expect_err("second claim");

        match err {
            RequestError::AlreadyAssigned {
                state, assignee, ..
            } => {
                assert_eq!(state, RequestState::Assigned);
                assert_eq!(assignee.expect("assignee").collector_id, "c1");
            }
            other => panic!("expected AlreadyAssigned, got {other:?}"),
        }

        // Only the winner triggered a notification.
        assert_eq!(notifier.seen.lock().expect("lock").len(), 1);
    }

    #[test]
    fn reclaiming_own_request_is_a_conflict_not_a_silent_success() {
        let (_dir, _path, conn) = test_store();
        let request = seeded_request(&conn);
        let notifier = RecordingNotifier::default();

        claim(&conn, &notifier, &request.id, &collector("c1")).expect("claim");
        let err = claim(&conn, &notifier, &request.id, &collector("c1")).expect_err("re-claim");

        match err {
            RequestError::AlreadyAssigned { assignee, .. } => {
                assert_eq!(assignee.expect("assignee").collector_id, "c1");
            }
            other => panic!("expected AlreadyAssigned, got {other:?}"),
        }
        assert_eq!(notifier.seen.lock().expect("lock").len(), 1);
    }

    #[test]
    fn staff_assignment_uses_the_same_path() {
        let (_dir, _path, conn) = test_store();
        let request = seeded_request(&conn);
        let notifier = RecordingNotifier::default();

        let staff_pick = ClaimActor {
            collector_id: "c3".to_string(),
            collector_name: "Collector c3".to_string(),
            role: ActorRole::Staff,
        };
        let updated = claim(&conn, &notifier, &request.id, &staff_pick).expect("assign");

        assert_eq!(updated.state, RequestState::Assigned);
        assert_eq!(
            updated.assignee.expect("assignee").collector_id,
            "c3"
        );
    }

    #[test]
    fn claim_unknown_id_is_not_found() {
        let (_dir, _path, conn) = test_store();
        let notifier = RecordingNotifier::default();

        let err =
            claim(&conn, &notifier, "sr-missing", &collector("c1")).expect_err("missing id");
        assert!(matches!(err, RequestError::NotFound { .. }));
    }

    #[test]
    fn claim_survives_a_benign_concurrent_write() {
        let (_dir, _path, conn) = test_store();
        let request = seeded_request(&conn);
        let notifier = RecordingNotifier::default();

        // A notes edit bumped the version without taking the request.
        store::requests::conditional_update(&conn, &request.id, 0, |r| {
            r.notes = Some("gate code 4411".to_string());
        })
        .expect("benign write");

        let updated = claim(&conn, &notifier, &request.id, &collector("c1")).expect("claim");
        assert_eq!(updated.state, RequestState::Assigned);
        assert_eq!(updated.version, 2);
    }

    #[test]
    fn notification_failure_never_unwinds_the_assignment() {
        let (_dir, _path, conn) = test_store();
        let request = seeded_request(&conn);

        let updated =
            claim(&conn, &FailingNotifier, &request.id, &collector("c1")).expect("claim");
        assert_eq!(updated.state, RequestState::Assigned);

        let stored = store::requests::get(&conn, &request.id).expect("get");
        assert_eq!(stored.state, RequestState::Assigned);
    }

    #[test]
    fn complete_on_pending_is_invalid_transition() {
        let (_dir, _path, conn) = test_store();
        let request = seeded_request(&conn);

        let err = complete(&conn, &request.id, request.version).expect_err("must fail");
        match err {
            RequestError::InvalidTransition { from, to } => {
                assert_eq!(from, RequestState::Pending);
                assert_eq!(to, RequestState::Completed);
            }
            other => panic!("expected InvalidTransition, got {other:?}"),
        }
    }

    #[test]
    fn complete_assigned_request_keeps_the_assignee() {
        let (_dir, _path, conn) = test_store();
        let request = seeded_request(&conn);
        let notifier = RecordingNotifier::default();

        let assigned = claim(&conn, &notifier, &request.id, &collector("c1")).expect("claim");
        let completed = complete(&conn, &request.id, assigned.version).expect("complete");

        assert_eq!(completed.state, RequestState::Completed);
        assert_eq!(completed.version, assigned.version + 1);
        assert_eq!(
            completed.assignee.expect("assignee").collector_id,
            "c1"
        );
    }

    #[test]
    fn cancel_with_preclaim_version_never_undoes_an_assignment() {
        let (_dir, _path, conn) = test_store();
        let request = seeded_request(&conn);
        let notifier = RecordingNotifier::default();

        let pre_claim_version = request.version;
        claim(&conn, &notifier, &request.id, &collector("c1")).expect("claim");

        let err = cancel(&conn, &request.id, pre_claim_version).expect_err("stale cancel");
        match err {
            RequestError::VersionConflict { state, .. } => {
                assert_eq!(state, RequestState::Assigned);
            }
            other => panic!("expected VersionConflict, got {other:?}"),
        }

        let stored = store::requests::get(&conn, &request.id).expect("get");
        assert_eq!(stored.state, RequestState::Assigned);
    }

    #[test]
    fn cancel_clears_the_assignee() {
        let (_dir, _path, conn) = test_store();
        let request = seeded_request(&conn);
        let notifier = RecordingNotifier::default();

        let assigned = claim(&conn, &notifier, &request.id, &collector("c1")).expect("claim");
        let cancelled = cancel(&conn, &request.id, assigned.version).expect("cancel");

        assert_eq!(cancelled.state, RequestState::Cancelled);
        assert!(cancelled.assignee.is_none());
        assert!(cancelled.assignee_invariant_holds());
    }

    #[test]
    fn cancel_terminal_request_is_invalid_transition() {
        let (_dir, _path, conn) = test_store();
        let request = seeded_request(&conn);
        let notifier = RecordingNotifier::default();

        let assigned = claim(&conn, &notifier, &request.id, &collector("c1")).expect("claim");
        let completed = complete(&conn, &request.id, assigned.version).expect("complete");

        let err = cancel(&conn, &request.id, completed.version).expect_err("must fail");
        assert!(matches!(err, RequestError::InvalidTransition { .. }));
    }

    #[test]
    fn exactly_one_winner_under_concurrent_claims() {
        let (_dir, path, conn) = test_store();
        let request = seeded_request(&conn);
        drop(conn);

        let contenders = 8;
        let notifier = Arc::new(RecordingNotifier::default());
        let barrier = Arc::new(Barrier::new(contenders));

        let handles: Vec<_> = (0..contenders)
            .map(|i| {
                let path = path.clone();
                let request_id = request.id.clone();
                let notifier = Arc::clone(&notifier);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    let conn = store::connect(&path).expect("connect");
                    let actor = collector(&format!("c{i}"));
                    barrier.wait();
                    claim(&conn, &*notifier, &request_id, &actor)
                })
            })
            .collect();

        let mut winners = Vec::new();
        let mut losers = Vec::new();
        for handle in handles {
            match handle.join().expect("join") {
                Ok(updated) => winners.push(updated),
                Err(err) => losers.push(err),
            }
        }

        assert_eq!(winners.len(), 1, "exactly one claim must win");
        assert_eq!(losers.len(), contenders - 1);

        let winner_id = winners[0]
            .assignee
            .as_ref()
            .expect("winner assignee")
            .collector_id
            .clone();
        for err in &losers {
            match err {
                RequestError::AlreadyAssigned { assignee, .. } => {
                    assert_eq!(
                        assignee.as_ref().expect("loser sees assignee").collector_id,
                        winner_id
                    );
                }
                other => panic!("losers must see AlreadyAssigned, got {other:?}"),
            }
        }

        // Settled state: one transition, one notification, invariant holds.
        let conn = store::connect(&path).expect("reconnect");
        let stored = store::requests::get(&conn, &request.id).expect("get");
        assert_eq!(stored.state, RequestState::Assigned);
        assert_eq!(stored.version, 1);
        assert!(stored.assignee_invariant_holds());
        assert_eq!(notifier.seen.lock().expect("lock").len(), 1);
    }

    #[derive(Debug, Clone, Copy)]
    enum Op {
        ClaimA,
        ClaimB,
        Cancel,
        Complete,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::ClaimA),
            Just(Op::ClaimB),
            Just(Op::Cancel),
            Just(Op::Complete),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 32,
            ..ProptestConfig::default()
        })]

        /// Any interleaving of lifecycle operations keeps the assignee
        /// invariant true and the version strictly monotonic: +1 per
        /// success, unchanged on rejection.
        #[test]
        fn lifecycle_ops_preserve_invariants(ops in proptest::collection::vec(op_strategy(), 1..12)) {
            let (_dir, _path, conn) = test_store();
            let request = seeded_request(&conn);
            let notifier = RecordingNotifier::default();

            for op in ops {
                let before = store::requests::get(&conn, &request.id).expect("get before");

                let result = match op {
                    Op::ClaimA => claim(&conn, &notifier, &request.id, &collector("a")),
                    Op::ClaimB => claim(&conn, &notifier, &request.id, &collector("b")),
                    Op::Cancel => cancel(&conn, &request.id, before.version),
                    Op::Complete => complete(&conn, &request.id, before.version),
                };

                let after = store::requests::get(&conn, &request.id).expect("get after");
                prop_assert!(after.assignee_invariant_holds());

                if result.is_ok() {
                    prop_assert_eq!(after.version, before.version + 1);
                } else {
                    prop_assert_eq!(after.version, before.version);
                }
            }
        }
    }
}
