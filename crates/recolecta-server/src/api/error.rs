//! Error-to-envelope translation.
//!
//! Every failure leaves the server as `{success: false, error: {...}}`
//! with the stable `E####` code, and conflict responses carry the current
//! state and assignee so a losing claimant can reconcile without an extra
//! round trip.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use recolecta_core::error::{ErrorCode, RequestError};
use recolecta_core::model::{Assignee, RequestState};
use serde::Serialize;

use super::envelope::Envelope;

/// Machine-readable error payload inside the envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<RequestState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<Assignee>,
}

/// An error ready to leave the server.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub(crate) fn internal(err: impl std::fmt::Display) -> Self {
        tracing::error!(%err, "internal server error");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorBody {
                code: ErrorCode::StorageFailed.code().to_string(),
                message: ErrorCode::StorageFailed.message().to_string(),
                hint: ErrorCode::StorageFailed.hint(),
                state: None,
                assignee: None,
            },
        }
    }

    pub(crate) fn validation(field: &'static str) -> Self {
        Self::from(RequestError::Validation { field })
    }

    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody {
                code: ErrorCode::ValidationFailed.code().to_string(),
                message: message.into(),
                hint: ErrorCode::ValidationFailed.hint(),
                state: None,
                assignee: None,
            },
        }
    }
}

impl From<RequestError> for ApiError {
    fn from(err: RequestError) -> Self {
        let status = match &err {
            RequestError::Validation { .. } => StatusCode::BAD_REQUEST,
            RequestError::NotFound { .. } => StatusCode::NOT_FOUND,
            RequestError::VersionConflict { .. }
            | RequestError::AlreadyAssigned { .. }
            | RequestError::InvalidTransition { .. } => StatusCode::CONFLICT,
            RequestError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let (state, assignee) = match &err {
            RequestError::VersionConflict {
                state, assignee, ..
            }
            | RequestError::AlreadyAssigned {
                state, assignee, ..
            } => (Some(*state), assignee.clone()),
            _ => (None, None),
        };

        let code = err.error_code();
        Self {
            status,
            body: ErrorBody {
                code: code.code().to_string(),
                message: err.to_string(),
                hint: code.hint(),
                state,
                assignee,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(Envelope::<()>::fail(self.body))).into_response()
    }
}
