//! Admin API for managing the blocklist.
//!
//! All routes require `Authorization: Bearer <token>` matching
//! `[admin].token`. Without a configured token the routes answer 404.
//! A bad token counts as a failed attempt against the caller's address.

use crate::error::ShieldError;
use crate::middleware::ClientAddress;
use crate::shield::Shield;
use axum::extract::{Path, Query, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use chrono::TimeDelta;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

/// Actor recorded on blocks created through this API.
pub const ADMIN_ACTOR: &str = "admin";

const DEFAULT_PAGE_SIZE: u32 = 50;

pub fn routes(shield: Arc<Shield>) -> Router<Arc<Shield>> {
    Router::new()
        .route("/admin/blocks", get(list_blocks).post(create_block))
        .route("/admin/blocks/:address", delete(delete_block))
        .route("/admin/status/:address", get(block_status))
        .route_layer(middleware::from_fn_with_state(shield, require_admin))
}

async fn require_admin(State(shield): State<Arc<Shield>>, req: Request, next: Next) -> Response {
    let Some(expected) = shield.admin_token() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let provided = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let authorized = provided.is_some_and(|p| bool::from(p.as_bytes().ct_eq(expected.as_bytes())));
    if authorized {
        return next.run(req).await;
    }

    let caller = req.extensions().get::<ClientAddress>().map(|c| c.0.clone());
    if let Some(address) = caller {
        warn!(address = %address, "Admin authentication failed");
        if let Err(e) = shield.registry.record_failed_attempt(&address).await {
            warn!(address = %address, error = %e, "Failed to record failed admin attempt");
        }
    }

    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "success": false, "error": "Unauthorized" })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct ListParams {
    page: Option<u32>,
    page_size: Option<u32>,
}

async fn list_blocks(
    State(shield): State<Arc<Shield>>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, ShieldError> {
    let page = params.page.unwrap_or(1).max(1);
    let page_size = params.page_size.unwrap_or(DEFAULT_PAGE_SIZE);

    let blocks = shield.registry.list_blocks(page, page_size).await?;

    Ok(Json(json!({
        "success": true,
        "page": page,
        "blocks": blocks,
    })))
}

#[derive(Debug, Deserialize)]
struct CreateBlock {
    address: String,
    reason: Option<String>,
    /// Omit for an indefinite block.
    expires_in_secs: Option<u64>,
}

async fn create_block(
    State(shield): State<Arc<Shield>>,
    Json(body): Json<CreateBlock>,
) -> Result<Response, ShieldError> {
    let expires_at = match body.expires_in_secs {
        None => None,
        Some(0) => {
            return Err(ShieldError::InvalidInput(
                "expires_in_secs must be greater than zero".into(),
            ));
        }
        Some(secs) => {
            let delta = i64::try_from(secs)
                .ok()
                .and_then(TimeDelta::try_seconds)
                .ok_or_else(|| ShieldError::InvalidInput("expires_in_secs is too large".into()))?;
            let expires_at = shield
                .now()
                .checked_add_signed(delta)
                .ok_or_else(|| ShieldError::InvalidInput("expires_in_secs is too large".into()))?;
            Some(expires_at)
        }
    };

    let record = shield
        .registry
        .block(&body.address, ADMIN_ACTOR, body.reason, expires_at)
        .await?;

    info!(address = %record.address, "Block created via admin API");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "block": record })),
    )
        .into_response())
}

async fn delete_block(
    State(shield): State<Arc<Shield>>,
    Path(address): Path<String>,
) -> Result<Json<serde_json::Value>, ShieldError> {
    let unblocked = shield.registry.unblock(&address).await?;
    Ok(Json(json!({ "success": true, "unblocked": unblocked })))
}

async fn block_status(
    State(shield): State<Arc<Shield>>,
    Path(address): Path<String>,
) -> Json<serde_json::Value> {
    Json(json!({
        "address": address,
        "blocked": shield.registry.is_blocked(&address),
    }))
}
