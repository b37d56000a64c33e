use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::error::AppError;
use crate::server::Dependencies;

#[derive(Deserialize, Debug)]
struct WaitRequest {
    wait_time: u64,
}

#[derive(Serialize, Debug)]
struct WaitResponse {
    message: String,
}

pub fn create_router(deps: Dependencies) -> Router {
    Router::new().route("/wait", post(wait)).with_state(deps)
}

/// Simulated long-running work. Registers with the inflight tracker so a
/// drain waits for it, and races the work against the shutdown signal so a
/// forced abort can interrupt it with a progress report.
async fn wait(
    State(state): State<Dependencies>,
    Json(req): Json<WaitRequest>,
) -> Result<Json<WaitResponse>, AppError> {
    let _inflight = state.inflight.enter();
    let cancel = state.shutdown.subscribe();

    info!(route = "/wait", wait_secs = req.wait_time, "handle request");
    let started = Instant::now();

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(req.wait_time)) => {
            Ok(Json(WaitResponse {
                message: format!("waited {} seconds", req.wait_time),
            }))
        }
        _ = cancel.cancelled() => {
            let elapsed = started.elapsed().as_secs();
            warn!(
                requested_secs = req.wait_time,
                elapsed_secs = elapsed,
                "wait aborted by shutdown"
            );
            Err(AppError::Aborted {
                requested: req.wait_time,
                elapsed,
            })
        }
    }
}
