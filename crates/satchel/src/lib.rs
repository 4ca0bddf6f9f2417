//! Embedded session persistence store with TTL expiry.
//!
//! Backs an HTTP session middleware's storage contract with an in-memory,
//! id-indexed collection of session records that is:
//! - loaded asynchronously from a JSON snapshot at startup, behind a
//!   readiness gate that queues early operations
//! - periodically flushed back to disk (best-effort durability)
//! - periodically swept for TTL-expired records
//!
//! # Example
//!
//! ```rust,ignore
//! use satchel::{SessionStore, StoreConfig};
//!
//! let store = SessionStore::open(StoreConfig::default().with_path("./sessions.db"));
//! store.wait_ready().await?;
//! store.set("sid-1", serde_json::json!({ "user": 42 })).await?;
//! let content = store.get("sid-1").await?;
//! ```

mod collection;
mod config;
mod error;
mod gate;
mod record;
mod snapshot;
mod store;

pub use collection::SessionCollection;
pub use config::{
    DEFAULT_AUTOSAVE_INTERVAL, DEFAULT_PATH, DEFAULT_TTL_SECS, ErrorHook, StoreConfig,
};
pub use error::{Result, StoreError};
pub use gate::{ReadyGate, StoreState};
pub use record::SessionRecord;
pub use store::{SessionStorage, SessionStore};
