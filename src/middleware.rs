//! Mitigation middleware.
//!
//! Runs once per request, in a fixed order:
//!
//! 1. Resolve the client address. None → 400.
//! 2. Blocklist cache. Blocked → 403, and the rate limiter is never consulted.
//! 3. Rate limiter. Denied → 429 with `Retry-After`.
//! 4. Pass through with a [`ClientAddress`] extension for downstream handlers.
//!
//! Infrastructure failures map to a generic 500, never to a denial body.

use crate::error::ShieldError;
use crate::metrics;
use crate::security::address::{canonical_ip, normalize_address};
use crate::security::{Denial, RateDecision, Tier};
use crate::shield::Shield;
use axum::Json;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error};

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Normalised client address, inserted for handlers behind the middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddress(pub String);

/// Policy decision for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass(String),
    Blocked,
    RateLimited(Denial),
}

/// First `X-Forwarded-For` entry, else the transport peer.
pub fn client_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let forwarded = headers
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(normalize_address);

    forwarded.or_else(|| peer.map(|p| canonical_ip(p.ip()).to_string()))
}

/// Apply the block-then-rate-limit policy to an already resolved identity.
pub async fn evaluate(
    shield: &Shield,
    address: Option<String>,
    endpoint: &str,
    tier: Option<&str>,
) -> Result<Verdict, ShieldError> {
    let address = address.ok_or(ShieldError::IdentityUnresolved)?;

    if shield.registry.is_blocked(&address) {
        return Ok(Verdict::Blocked);
    }

    match shield.rate_limiter.check(&address, endpoint, tier).await? {
        RateDecision::Allow { .. } => Ok(Verdict::Pass(address)),
        RateDecision::Deny(denial) => Ok(Verdict::RateLimited(denial)),
    }
}

/// Axum middleware entry point. Install with
/// `axum::middleware::from_fn_with_state(shield, mitigate)`.
pub async fn mitigate(
    State(shield): State<Arc<Shield>>,
    mut req: Request,
    next: Next,
) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let address = client_address(req.headers(), peer);
    let tier = req.extensions().get::<Tier>().map(|t| t.0.clone());
    let endpoint = req.uri().path().to_string();

    match evaluate(&shield, address, &endpoint, tier.as_deref()).await {
        Ok(Verdict::Pass(address)) => {
            req.extensions_mut().insert(ClientAddress(address));
            next.run(req).await
        }
        Ok(Verdict::Blocked) => {
            metrics::record_denied("blocked");
            debug!(endpoint = %endpoint, "Request from blocked address denied");
            blocked_response()
        }
        Ok(Verdict::RateLimited(denial)) => {
            metrics::record_denied("rate_limited");
            rate_limited_response(&denial)
        }
        Err(e) => {
            metrics::record_denied(e.error_code());
            if e.is_client_error() {
                debug!(endpoint = %endpoint, error = %e, "Request rejected");
            } else {
                error!(endpoint = %endpoint, error = %e, "Mitigation check failed");
            }
            e.into_response()
        }
    }
}

fn blocked_response() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({
            "success": false,
            "error": "Access denied",
            "reason": "blocked",
        })),
    )
        .into_response()
}

fn rate_limited_response(denial: &Denial) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "success": false,
            "error": "Too many requests",
            "message": denial.message,
        })),
    )
        .into_response();

    // Round up so clients never retry inside the window.
    let secs = denial.retry_after.as_millis().div_ceil(1000).max(1);
    if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
        response.headers_mut().insert(header::RETRY_AFTER, value);
    }
    response
}
