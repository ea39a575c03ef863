//! Abuse mitigation core.
//!
//! - **Block Registry**: persistent blocklist with a write-through in-memory cache
//! - **Rate Limiting**: per-tier fixed windows that escalate into blocks
//! - **Maintenance**: resync, expiry sweep and counter cleanup cycles
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Mitigation Middleware                   │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │        BlockRegistry  ◄──────┤       RateLimitEngine        │
//! │  BlocklistCache (DashSet)    │  fixed windows (DashMap)     │
//! │  resync / sweep              │  violations ─► escalate      │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │                RecordStore         Notifier                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod address;
pub mod blocklist;
pub mod clock;
pub mod maintenance;
pub mod rate_limit;
pub mod registry;

// Re-export primary types for convenience
pub use address::normalize_address;
pub use blocklist::{BlocklistCache, ReplaceOutcome};
pub use clock::{Clock, ManualClock, SystemClock};
pub use maintenance::Maintenance;
pub use rate_limit::{Denial, RateDecision, RateLimitEngine, Tier};
pub use registry::{BlockRegistry, EscalationCause, RegistryStats, SYSTEM_ACTOR};
