use anyhow::Result;
use axum::{
    extract::Request,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use hyper::body::Incoming;
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
};
use serde_json::json;
use std::{convert::Infallible, net::SocketAddr, time::Duration};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower::{Service, ServiceExt};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::{error, inflight, shutdown};

pub mod greet;
pub mod record;
pub mod status;
pub mod wait;

#[derive(Clone)]
pub struct Dependencies {
    inflight: inflight::InflightTracker,
    shutdown: shutdown::ShutdownSignal,
    drain_state: watch::Receiver<shutdown::DrainState>,
}

impl Dependencies {
    pub fn new(
        inflight: inflight::InflightTracker,
        shutdown: shutdown::ShutdownSignal,
        drain_state: watch::Receiver<shutdown::DrainState>,
    ) -> Self {
        Self {
            inflight,
            shutdown,
            drain_state,
        }
    }
}

impl std::fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dependencies").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct Server {
    addr: String,
    deps: Dependencies,
    accept_token: CancellationToken,
    close_token: CancellationToken,
    conns: TaskTracker,
}

impl Server {
    pub fn new(addr: String, deps: Dependencies) -> Self {
        debug!(address = addr, "create new server");
        Self {
            addr,
            deps,
            accept_token: CancellationToken::new(),
            close_token: CancellationToken::new(),
            conns: TaskTracker::new(),
        }
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(self.addr.clone()).await?;
        info!(address = %listener.local_addr()?, "serving on address");
        Ok(listener)
    }

    /// Accept loop. Each connection runs on its own tracked task so the
    /// drain episode can close them all, bounded, once accepting stops.
    pub async fn serve(&self, listener: TcpListener) {
        let router = create_router(self.deps.clone());
        let mut make_service = router.into_make_service_with_connect_info::<SocketAddr>();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((socket, remote_addr)) => {
                            let tower_service = unwrap_infallible(make_service.call(remote_addr).await);
                            let close_token = self.close_token.clone();
                            self.conns.spawn(async move {
                                let socket = TokioIo::new(socket);
                                let hyper_service =
                                    hyper::service::service_fn(move |request: Request<Incoming>| {
                                        tower_service.clone().oneshot(request)
                                    });
                                let builder = auto::Builder::new(TokioExecutor::new());
                                let conn = builder.serve_connection(socket, hyper_service);
                                tokio::pin!(conn);
                                tokio::select! {
                                    result = conn.as_mut() => {
                                        if let Err(err) = result {
                                            warn!(err = ?err, "fail serve connection");
                                        }
                                    }
                                    _ = close_token.cancelled() => {
                                        // finish the in-progress response, then close
                                        conn.as_mut().graceful_shutdown();
                                        if let Err(err) = conn.as_mut().await {
                                            warn!(err = ?err, "fail close connection");
                                        }
                                    }
                                }
                            });
                        }
                        Err(e) => {
                            warn!(error = ?e, "fail accept connection");
                        }
                    }
                }
                _ = self.accept_token.cancelled() => {
                    debug!("shutdown signal received, stopping server");
                    break;
                }
            }
        }
        debug!("server stopped accepting connections");
    }

    /// Stop accepting new connections. The listener socket is released when
    /// the accept loop exits.
    pub fn stop_accepting(&self) {
        self.accept_token.cancel();
    }

    /// Close idle and persistent connections, waiting at most `timeout` for
    /// every connection task to finish. Returns false if the bound elapsed
    /// with connections still open.
    pub async fn close_bounded(&self, timeout: Duration) -> bool {
        self.close_token.cancel();
        self.conns.close();
        tokio::time::timeout(timeout, self.conns.wait()).await.is_ok()
    }
}

fn unwrap_infallible<T>(result: Result<T, Infallible>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => match err {},
    }
}

fn create_router(deps: Dependencies) -> Router {
    status::create_router(deps.clone())
        .merge(greet::create_router())
        .merge(record::create_router())
        .merge(wait::create_router(deps))
        .layer(TraceLayer::new_for_http())
}

impl IntoResponse for error::AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            error::AppError::Aborted { requested, elapsed } => (
                StatusCode::CONFLICT,
                json!({
                    "error": self.to_string(),
                    "requested_secs": requested,
                    "elapsed_secs": elapsed,
                }),
            ),
            error::AppError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": self.to_string() }),
            ),
            error::AppError::FieldMask => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": self.to_string() }),
            ),
        };
        (status, Json(body)).into_response()
    }
}
