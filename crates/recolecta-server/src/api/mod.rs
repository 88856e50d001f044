//! HTTP surface: shared state and the router.
//!
//! Handlers open a fresh SQLite connection per call on a blocking worker
//! thread; WAL mode keeps the pollers' reads from stalling behind a
//! writer, and every write is conditional on the stored version, so no
//! shared in-process lock is needed.

pub mod envelope;
pub mod error;
pub mod health;
pub mod requests;

use axum::Router;
use axum::routing::{get, post, put};
use recolecta_core::error::RequestError;
use recolecta_core::notify::Notifier;
use recolecta_core::store;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use error::ApiError;

/// Shared handler state; cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    db_path: PathBuf,
    notifier: Arc<dyn Notifier>,
}

impl AppState {
    #[must_use]
    pub fn new(db_path: impl Into<PathBuf>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                db_path: db_path.into(),
                notifier,
            }),
        }
    }

    pub(crate) fn notifier(&self) -> Arc<dyn Notifier> {
        Arc::clone(&self.inner.notifier)
    }

    /// Run `work` against a fresh store connection on a blocking thread.
    pub(crate) async fn with_store<T, F>(&self, work: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> Result<T, RequestError> + Send + 'static,
    {
        let path = self.inner.db_path.clone();
        let outcome = tokio::task::spawn_blocking(move || -> Result<T, ApiError> {
            let conn = store::connect(&path).map_err(ApiError::internal)?;
            work(&conn).map_err(ApiError::from)
        })
        .await;

        match outcome {
            Ok(result) => result,
            Err(err) => Err(ApiError::internal(err)),
        }
    }
}

/// Build the router with all routes and the shared state attached.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/requests",
            post(requests::create_request).get(requests::list_requests),
        )
        .route("/requests/{id}", get(requests::get_request))
        .route("/requests/{id}/assign", put(requests::assign_request))
        .route("/requests/{id}/cancel", put(requests::cancel_request))
        .route("/requests/{id}/complete", put(requests::complete_request))
        .route("/health", get(health::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
