//! HTTP ingress: host-header routed publish endpoint.
//!
//! The router/handler/`Extension`-state wiring follows `anvil-server`'s
//! `serve_http` (`axum::Router` + a shared `Extension`, `TraceLayer` for request
//! logging); the handler itself implements `SPEC_FULL.md` §6's Inbound HTTP
//! contract rather than JSON-RPC dispatch.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{body::Bytes, Router};
use tower_http::trace::TraceLayer;

use crate::backend::Backend;
use crate::connection::ConnectionManager;
use crate::error::SupervisorError;
use crate::inbound;
use crate::router::HostRouter;

struct AppState<B: Backend> {
    router: Arc<HostRouter>,
    connection: Arc<ConnectionManager<B>>,
    backend: Arc<B>,
}

/// Build the axum [`Router`] exposing the inbound publish endpoint.
///
/// A single `POST /` handler inspects the `Host` header to resolve channel identity,
/// per `SPEC_FULL.md` §6. CloudEvent binding/validation mechanics are the caller's
/// responsibility; this crate forwards the raw body.
pub fn build_router<B: Backend + 'static>(
    host_router: Arc<HostRouter>,
    connection: Arc<ConnectionManager<B>>,
    backend: Arc<B>,
) -> Router {
    let state = Arc::new(AppState { router: host_router, connection, backend });
    Router::new().route("/", post(handle_publish::<B>)).layer(TraceLayer::new_for_http()).with_state(state)
}

async fn handle_publish<B: Backend + 'static>(
    State(state): State<Arc<AppState<B>>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    let Some(host) = headers.get(axum::http::header::HOST).and_then(|v| v.to_str().ok()) else {
        return (StatusCode::BAD_REQUEST, "missing Host header".to_string());
    };

    match inbound::publish_to_host(&state.router, &state.connection, &state.backend, host, body.to_vec()).await {
        Ok(_) => (StatusCode::ACCEPTED, String::new()),
        Err(SupervisorError::Router(_)) => (StatusCode::NOT_FOUND, "HostName not found".to_string()),
        Err(err @ SupervisorError::Connection(_)) => {
            (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
        }
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

/// Serve the router built by [`build_router`] until the process is terminated.
pub async fn serve(addr: SocketAddr, app: Router) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    axum::Server::bind(&addr).serve(app.into_make_service()).await?;
    Ok(())
}
