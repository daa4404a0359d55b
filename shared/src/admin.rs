//! Admin endpoints shared by every service.
//!
//! `/health` always answers `ok`. `/ready` answers `ok` once the check passed
//! to [`router`] reports the service as ready, and 503 before that.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use std::sync::Arc;

type ReadinessCheck = Arc<dyn Fn() -> bool + Send + Sync>;

pub fn router<F>(is_ready: F) -> Router
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let check: ReadinessCheck = Arc::new(is_ready);

    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .with_state(check)
}

async fn health() -> &'static str {
    "ok\n"
}

async fn ready(State(is_ready): State<ReadinessCheck>) -> (StatusCode, &'static str) {
    if is_ready() {
        (StatusCode::OK, "ok\n")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready\n")
    }
}
