//! abuse-shield - persistent IP blocklist and tiered rate limiting for axum services.
//!
//! Build one [`Shield`] at startup, load its cache, start its maintenance
//! tasks and put [`middleware::mitigate`] in front of the routes to protect.

pub mod admin;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod metrics;
pub mod middleware;
pub mod notify;
pub mod security;
pub mod shield;
pub mod store;

pub use error::ShieldError;
pub use shield::{Shield, ShieldParams};
