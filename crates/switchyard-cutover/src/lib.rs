//! switchyard-cutover — the cutover lifecycle and failure-response engine.
//!
//! Each cutover is Inactive or Active. The engine starts cutovers (manually
//! or when their scheduled start is due), evaluates the health of Active
//! ones every tick, raises deduplicated alerts on breaches, and rolls back
//! automatically when a cutover is configured for it.
//!
//! # Components
//!
//! - **`health`** — classifies run/failure/failover counts
//! - **`dedup`** — suppresses repeat alerts within a window
//! - **`locks`** — per-cutover mutual exclusion
//! - **`controller`** — Start / Evaluate / End transitions and the operator API
//! - **`reconcile`** — periodic driver over all schedules

pub mod controller;
pub mod dedup;
pub mod health;
pub mod locks;
pub mod reconcile;

pub use controller::{
    ConfigUpdate, ControllerSettings, CutoverError, CutoverResult, CutoverStatus,
    EvaluationOutcome, LifecycleController, TransitionReport,
};
pub use dedup::AlertDeduplicator;
pub use health::{HealthAssessment, HealthEvaluator, HealthSample};
pub use locks::CutoverLocks;
pub use reconcile::{ReconciliationLoop, TickSummary};
