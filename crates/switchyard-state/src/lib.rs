//! switchyard-state — embedded state store for Switchyard.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for cutover schedules, the alert history, and the audit trail.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Schedules are keyed by cutover name. Alert and audit records are
//! append-only and keyed so that a plain ordered scan yields them in write
//! order: `{cutover}/{ordering}` for alerts, `{YYYY-MM-DD}/{ordering}` for
//! audit records.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
