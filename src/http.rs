//! HTTP surface: demo endpoint, admin API, health and Prometheus metrics.
//!
//! `/ping` and the admin routes sit behind the mitigation middleware.
//! `/health` and `/metrics` do not, so probes and scrapers are never
//! rate limited or blocked.

use crate::admin;
use crate::middleware::{ClientAddress, mitigate};
use crate::shield::{HealthReport, Shield};
use axum::extract::State;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

/// Handler for GET /metrics - returns Prometheus metrics in text format.
async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

async fn health_handler(State(shield): State<Arc<Shield>>) -> Json<HealthReport> {
    Json(shield.health())
}

async fn ping_handler(
    Extension(ClientAddress(address)): Extension<ClientAddress>,
) -> Json<serde_json::Value> {
    Json(json!({ "success": true, "message": "pong", "address": address }))
}

/// Build the full application router.
pub fn router(shield: Arc<Shield>, metrics_enabled: bool) -> Router {
    let protected = Router::new()
        .route("/ping", get(ping_handler))
        .merge(admin::routes(Arc::clone(&shield)))
        .layer(axum::middleware::from_fn_with_state(Arc::clone(&shield), mitigate));

    let mut open = Router::new().route("/health", get(health_handler));
    if metrics_enabled {
        open = open.route("/metrics", get(metrics_handler));
    }

    protected.merge(open).with_state(shield)
}

/// Serve `app` on `addr` until `shutdown` resolves.
///
/// Peer addresses are made available to the middleware through
/// `ConnectInfo<SocketAddr>`.
pub async fn run_http_server<F>(addr: SocketAddr, app: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "HTTP server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}
