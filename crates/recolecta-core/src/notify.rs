//! Assignment notification contract.
//!
//! The transport that carries the notice (push, WhatsApp, email, ...) is an
//! external collaborator; this module only defines the trigger contract the
//! arbiter fires on a successful claim. Delivery is fire-and-forget: a
//! failure is logged by the caller and never reverses the assignment, and
//! any retry policy belongs to the implementation, not the arbiter.

use crate::error::ErrorCode;
use crate::model::PickupRequest;
use thiserror::Error;

/// Delivery failed or timed out. Logged only; never propagated to the
/// caller of `claim`.
#[derive(Debug, Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

impl NotifyError {
    /// Map to the stable machine-readable code.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        ErrorCode::NotifyFailed
    }
}

/// Dispatch an assignment notice to the winning collector.
pub trait Notifier: Send + Sync {
    /// Called once per successful claim, after the state change committed.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] when the notice could not be handed to the
    /// delivery channel.
    fn assignment(&self, request: &PickupRequest) -> Result<(), NotifyError>;
}

/// Logs the assignment instead of delivering anywhere. The default when no
/// delivery channel is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn assignment(&self, request: &PickupRequest) -> Result<(), NotifyError> {
        let Some(assignee) = &request.assignee else {
            return Err(NotifyError("request carries no assignee".to_string()));
        };

        tracing::info!(
            request_id = %request.id,
            collector_id = %assignee.collector_id,
            collector_name = %assignee.collector_name,
            "pickup request assigned"
        );
        Ok(())
    }
}
