//! Integration test common infrastructure.
//!
//! Builds a [`Shield`] over an in-memory store with a manual clock and a
//! collecting notification sink, plus helpers for driving the router.

#![allow(dead_code)]

use abuse_shield::config::Config;
use abuse_shield::notify::{CollectingSink, Notifier};
use abuse_shield::security::ManualClock;
use abuse_shield::store::{MemoryStore, RecordStore};
use abuse_shield::{Shield, ShieldParams};
use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use std::sync::Arc;

pub struct TestShield {
    pub shield: Arc<Shield>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub sink: Arc<CollectingSink>,
}

impl TestShield {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let sink = Arc::new(CollectingSink::new());

        let shield = Arc::new(Shield::new(ShieldParams::from_config(
            &config,
            store.clone() as Arc<dyn RecordStore>,
            Notifier::new().with_sink(sink.clone()),
            clock.clone(),
        )));

        Self {
            shield,
            store,
            clock,
            sink,
        }
    }

    pub fn with_admin_token(token: &str) -> Self {
        let mut config = Config::default();
        config.admin.token = Some(token.to_string());
        Self::with_config(config)
    }
}

/// GET `path` as if sent from `address` via a proxy.
pub fn get_from(path: &str, address: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .header("x-forwarded-for", address)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
