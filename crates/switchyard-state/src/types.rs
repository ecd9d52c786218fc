//! Domain types for the Switchyard state store.
//!
//! These types represent the persisted cutover schedules and the
//! append-only alert and audit histories. All types are serializable
//! to/from JSON for storage in redb tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique name of a cutover.
pub type CutoverName = String;

// ── Schedule ──────────────────────────────────────────────────────

/// One named cutover: the v3/v4/failover workflow triple, its phase,
/// schedule, alerting policy, and the running totals since the last start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CutoverSchedule {
    pub name: CutoverName,
    /// Resource scope the workflows live in (subscription/resource group).
    #[serde(default)]
    pub resource_scope: String,
    #[serde(default)]
    pub v4_workflow: String,
    #[serde(default)]
    pub v3_workflow: String,
    #[serde(default)]
    pub failover_workflow: String,

    /// Authoritative phase flag.
    #[serde(default)]
    pub is_active: bool,
    /// Unix timestamp (seconds) at which the cutover should start.
    #[serde(default)]
    pub scheduled_start: Option<u64>,
    /// Unix timestamp (seconds) at which the cutover should end.
    #[serde(default)]
    pub scheduled_end: Option<u64>,
    #[serde(default)]
    pub actual_start: Option<u64>,
    #[serde(default)]
    pub actual_end: Option<u64>,

    /// Minimum failed runs in one evaluation window that raise an alert.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default)]
    pub auto_cutback: bool,

    #[serde(default)]
    pub total_runs: u64,
    #[serde(default)]
    pub total_failures: u64,
    #[serde(default)]
    pub total_failovers: u64,
    #[serde(default)]
    pub last_checked: Option<u64>,
    /// Latest issue summary, empty when the last evaluation was clean.
    #[serde(default)]
    pub last_error: String,

    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
}

fn default_failure_threshold() -> u32 {
    1
}

/// Phase of a cutover, derived from `CutoverSchedule::is_active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CutoverPhase {
    Inactive,
    Active,
}

impl CutoverSchedule {
    /// A fresh, unconfigured, Inactive schedule.
    pub fn new(name: &str, now: u64) -> Self {
        Self {
            name: name.to_string(),
            resource_scope: String::new(),
            v4_workflow: String::new(),
            v3_workflow: String::new(),
            failover_workflow: String::new(),
            is_active: false,
            scheduled_start: None,
            scheduled_end: None,
            actual_start: None,
            actual_end: None,
            failure_threshold: default_failure_threshold(),
            auto_cutback: false,
            total_runs: 0,
            total_failures: 0,
            total_failovers: 0,
            last_checked: None,
            last_error: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn phase(&self) -> CutoverPhase {
        if self.is_active {
            CutoverPhase::Active
        } else {
            CutoverPhase::Inactive
        }
    }

    /// Whether all three workflow names and the scope are set.
    pub fn is_configured(&self) -> bool {
        !self.resource_scope.is_empty()
            && !self.v4_workflow.is_empty()
            && !self.v3_workflow.is_empty()
            && !self.failover_workflow.is_empty()
    }

    pub fn reset_totals(&mut self) {
        self.total_runs = 0;
        self.total_failures = 0;
        self.total_failovers = 0;
    }

    /// Human-readable summary of the running totals.
    pub fn totals_summary(&self) -> String {
        format!(
            "Runs: {}, Failures: {}, Failovers: {}",
            self.total_runs, self.total_failures, self.total_failovers
        )
    }
}

/// Check that a cutover name is usable as a store key.
///
/// Names are limited to ASCII alphanumerics, `-`, `_` and `.` so they never
/// collide with the `/` key separator.
pub fn validate_cutover_name(name: &str) -> Result<(), String> {
    if name.is_empty() || name.len() > 128 {
        return Err("name must be 1-128 characters".to_string());
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(format!("name contains invalid character {bad:?}"));
    }
    Ok(())
}

// ── Alerts ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertKind {
    Failure,
    Cutback,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Failure => "Failure",
            AlertKind::Cutback => "Cutback",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification that was attempted for a cutover.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlertRecord {
    pub cutover: CutoverName,
    pub kind: AlertKind,
    pub message: String,
    /// Unix timestamp (seconds) of the send attempt.
    pub timestamp: u64,
    /// Identifier returned by the notification channel; `None` when delivery failed.
    pub delivery_id: Option<String>,
}

// ── Audit ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    CutoverStart,
    CutoverEnd,
    AlertSent,
    ConfigUpdated,
}

/// Who caused an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Actor {
    Schedule,
    #[serde(rename = "API")]
    Api,
    AutoCutback,
    Monitor,
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Actor::Schedule => "Schedule",
            Actor::Api => "API",
            Actor::AutoCutback => "AutoCutback",
            Actor::Monitor => "Monitor",
        };
        f.write_str(s)
    }
}

/// One entry of the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditRecord {
    /// UTC day of `timestamp`, `YYYY-MM-DD`.
    pub partition: String,
    /// Assigned by the store on append; orders records within a partition.
    pub ordering: String,
    pub cutover: CutoverName,
    pub action: AuditAction,
    pub details: String,
    pub actor: Actor,
    pub timestamp: u64,
}

impl AuditRecord {
    pub fn new(
        cutover: &str,
        action: AuditAction,
        details: impl Into<String>,
        actor: Actor,
        timestamp: u64,
    ) -> Self {
        Self {
            partition: day_partition(timestamp),
            ordering: String::new(),
            cutover: cutover.to_string(),
            action,
            details: details.into(),
            actor,
            timestamp,
        }
    }

    /// Build the composite key for the audit table.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.partition, self.ordering)
    }
}

/// UTC calendar day of a unix timestamp, formatted `YYYY-MM-DD`.
pub fn day_partition(epoch_secs: u64) -> String {
    to_datetime(epoch_secs).format("%Y-%m-%d").to_string()
}

/// Render a unix timestamp for humans, e.g. `2026-10-18 14:05 UTC`.
pub fn format_utc(epoch_secs: u64) -> String {
    to_datetime(epoch_secs).format("%Y-%m-%d %H:%M UTC").to_string()
}

fn to_datetime(epoch_secs: u64) -> DateTime<Utc> {
    i64::try_from(epoch_secs)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_default()
}

/// Current unix time in seconds.
pub fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
