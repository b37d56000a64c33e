use axum::{extract::State, http::StatusCode, routing::get, Router};
use tracing::info;

use crate::server::Dependencies;
use crate::shutdown::DrainState;

async fn ping() -> (StatusCode, &'static str) {
    info!(route = "/ping", method = "GET", "handle request");
    (StatusCode::OK, "pong")
}

async fn ready(State(state): State<Dependencies>) -> (StatusCode, &'static str) {
    info!(route = "/ready", method = "GET", "handle request");
    if *state.drain_state.borrow() == DrainState::Idle {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "draining")
    }
}

pub fn create_router(deps: Dependencies) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/ready", get(ready))
        .with_state(deps)
}
