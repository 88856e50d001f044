//! Request-pool handlers.
//!
//! Bodies are read as raw bytes and parsed leniently: an absent body is
//! the same as `{}`, and a missing required field comes back as the
//! enveloped validation error naming the field, never a bare framework
//! rejection.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use recolecta_core::arbiter::{self, ActorRole, ClaimActor};
use recolecta_core::intake::{self, NewRequest};
use recolecta_core::model::{PickupRequest, RequestState};
use recolecta_core::query::{self, RequestFilter};
use recolecta_core::store::requests;
use serde::Deserialize;
use std::str::FromStr;

use super::envelope::Envelope;
use super::error::ApiError;
use super::AppState;

/// Optional staff-directed assignment body; absent means self-claim.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignBody {
    pub collector_id: Option<String>,
    pub collector_name: Option<String>,
}

/// Fencing token the caller last observed, for cancel/complete.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionBody {
    pub version: Option<i64>,
}

/// Query string for `GET /requests`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub state: Option<String>,
    pub assignee_id: Option<String>,
}

/// `POST /requests` - intake.
pub async fn create_request(
    State(app): State<AppState>,
    bytes: Bytes,
) -> Result<(StatusCode, Json<Envelope<PickupRequest>>), ApiError> {
    let payload: NewRequest = parse_body(&bytes)?;

    let created = app
        .with_store(move |conn| intake::submit(conn, &payload))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok_with_message(
            created,
            "pickup request created",
        )),
    ))
}

/// `GET /requests?state=&assigneeId=` - the surface pollers hit.
pub async fn list_requests(
    State(app): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Envelope<Vec<PickupRequest>>>, ApiError> {
    let state = match params.state.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            RequestState::from_str(raw)
                .map_err(|err| ApiError::bad_request(err.to_string()))?,
        ),
        None => None,
    };

    let filter = RequestFilter {
        state,
        assignee_id: params
            .assignee_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty()),
    };

    let listing = app
        .with_store(move |conn| query::list(conn, &filter))
        .await?;

    Ok(Json(Envelope::ok(listing)))
}

/// `GET /requests/{id}`.
pub async fn get_request(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<PickupRequest>>, ApiError> {
    let request = app.with_store(move |conn| requests::get(conn, &id)).await?;
    Ok(Json(Envelope::ok(request)))
}

/// `PUT /requests/{id}/assign` - self-claim or staff-directed assignment.
pub async fn assign_request(
    State(app): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Result<Json<Envelope<PickupRequest>>, ApiError> {
    let body: AssignBody = parse_body(&bytes)?;
    let actor = resolve_actor(&headers, body)?;

    let notifier = app.notifier();
    let updated = app
        .with_store(move |conn| arbiter::claim(conn, &*notifier, &id, &actor))
        .await?;

    let message = updated.assignee.as_ref().map_or_else(
        || "request assigned".to_string(),
        |a| format!("request assigned to {}", a.collector_name),
    );
    Ok(Json(Envelope::ok_with_message(updated, message)))
}

/// `PUT /requests/{id}/cancel`.
pub async fn cancel_request(
    State(app): State<AppState>,
    Path(id): Path<String>,
    bytes: Bytes,
) -> Result<Json<Envelope<PickupRequest>>, ApiError> {
    let body: VersionBody = parse_body(&bytes)?;
    let version = body
        .version
        .ok_or_else(|| ApiError::validation("version"))?;

    let updated = app
        .with_store(move |conn| arbiter::cancel(conn, &id, version))
        .await?;

    Ok(Json(Envelope::ok_with_message(updated, "request cancelled")))
}

/// `PUT /requests/{id}/complete` - invoked by the downstream collection
/// workflow once the pickup produced a real invoice.
pub async fn complete_request(
    State(app): State<AppState>,
    Path(id): Path<String>,
    bytes: Bytes,
) -> Result<Json<Envelope<PickupRequest>>, ApiError> {
    let body: VersionBody = parse_body(&bytes)?;
    let version = body
        .version
        .ok_or_else(|| ApiError::validation("version"))?;

    let updated = app
        .with_store(move |conn| arbiter::complete(conn, &id, version))
        .await?;

    Ok(Json(Envelope::ok_with_message(updated, "request completed")))
}

fn parse_body<T>(bytes: &Bytes) -> Result<T, ApiError>
where
    T: serde::de::DeserializeOwned + Default,
{
    if bytes.is_empty() {
        return Ok(T::default());
    }
    serde_json::from_slice(bytes)
        .map_err(|err| ApiError::bad_request(format!("invalid JSON body: {err}")))
}

/// Staff-directed assignment names the collector in the body; a
/// self-claim takes the caller identity the auth layer injected into the
/// `x-actor-id` / `x-actor-name` headers.
fn resolve_actor(headers: &HeaderMap, body: AssignBody) -> Result<ClaimActor, ApiError> {
    let directed = body
        .collector_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty());
    let body_name = body
        .collector_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty());

    if let Some(collector_id) = directed {
        let collector_name = body_name.unwrap_or_else(|| collector_id.clone());
        return Ok(ClaimActor {
            collector_id,
            collector_name,
            role: ActorRole::Staff,
        });
    }

    let collector_id = header_value(headers, "x-actor-id")
        .ok_or_else(|| ApiError::validation("x-actor-id"))?;
    let collector_name =
        header_value(headers, "x-actor-name").unwrap_or_else(|| collector_id.clone());

    Ok(ClaimActor {
        collector_id,
        collector_name,
        role: ActorRole::Collector,
    })
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}
