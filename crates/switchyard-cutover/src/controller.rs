//! Lifecycle controller — drives the cutover state machine.
//!
//! A cutover moves Inactive → Active on Start (manual or scheduled), loops
//! on Evaluate once per tick while Active, and returns to Inactive on End
//! (manual stop, scheduled end, or auto-cutback). Every operation holds the
//! cutover's lock for its full read-modify-write and re-reads the schedule
//! after acquiring it.
//!
//! Remote workflow changes are best effort: a failed `set_state` is logged,
//! written into the audit details and the notification, and returned in the
//! [`TransitionReport`], but the local phase flip is still committed.

use std::fmt::Write as _;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use switchyard_core::SwitchyardConfig;
use switchyard_remote::{Notifier, RemoteResult, RunCounts, WorkflowClient, WorkflowState};
use switchyard_state::*;

use crate::dedup::AlertDeduplicator;
use crate::health::{HealthEvaluator, HealthSample};
use crate::locks::CutoverLocks;

#[derive(Debug, Error)]
pub enum CutoverError {
    #[error("cutover `{0}` not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("invalid cutover config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    State(#[from] StateError),
}

pub type CutoverResult<T> = Result<T, CutoverError>;

/// Windows and bounds the controller works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Trailing window over which run counts are sampled.
    pub lookback_minutes: u32,
    /// A prior alert younger than this suppresses a new one.
    pub dedup_window_minutes: u32,
    /// How late a scheduled start may still be honored.
    pub start_grace_secs: u64,
    /// Upper bound for every remote call.
    pub remote_timeout: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            lookback_minutes: 30,
            dedup_window_minutes: 30,
            start_grace_secs: 10 * 60,
            remote_timeout: Duration::from_secs(30),
        }
    }
}

impl ControllerSettings {
    pub fn from_config(config: &SwitchyardConfig) -> Self {
        Self {
            lookback_minutes: config.monitor.lookback_minutes,
            dedup_window_minutes: config.monitor.dedup_window_minutes,
            start_grace_secs: u64::from(config.monitor.start_grace_minutes) * 60,
            remote_timeout: config.workflows.timeout(),
        }
    }
}

/// Result of a Start or End transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionReport {
    pub cutover: String,
    /// Phase after the transition.
    pub phase: CutoverPhase,
    pub actor: Actor,
    pub timestamp: u64,
    /// Remote state changes that did not take effect.
    pub remote_failures: Vec<String>,
    /// `None` when the notification could not be delivered.
    pub delivery_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationOutcome {
    /// Not Active, not configured, or the primary workflow is not enabled
    /// (or could not be read). Nothing was recorded.
    Skipped,
    Healthy,
    Issues {
        /// A failure alert was permitted and sent (delivery may still have failed).
        alerted: bool,
        /// Present when the alert triggered an automatic cutback.
        cutback: Option<TransitionReport>,
    },
}

/// Best-effort status of one cutover. Remote states are `None` when unknown.
#[derive(Debug, Clone, Serialize)]
pub struct CutoverStatus {
    #[serde(flatten)]
    pub schedule: CutoverSchedule,
    pub phase: CutoverPhase,
    pub v4_state: Option<WorkflowState>,
    pub v3_state: Option<WorkflowState>,
    pub failover_state: Option<WorkflowState>,
}

/// Partial update of a cutover's configuration. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigUpdate {
    pub resource_scope: Option<String>,
    pub v4_workflow: Option<String>,
    pub v3_workflow: Option<String>,
    pub failover_workflow: Option<String>,
    pub scheduled_start: Option<u64>,
    pub scheduled_end: Option<u64>,
    /// Clear both scheduled times before applying the ones above.
    pub clear_schedule: bool,
    pub failure_threshold: Option<u32>,
    pub auto_cutback: Option<bool>,
}

impl ConfigUpdate {
    fn validate(&self) -> CutoverResult<()> {
        let names = [
            ("resource_scope", &self.resource_scope),
            ("v4_workflow", &self.v4_workflow),
            ("v3_workflow", &self.v3_workflow),
            ("failover_workflow", &self.failover_workflow),
        ];
        for (field, value) in names {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(CutoverError::InvalidConfig(format!("{field} must not be empty")));
            }
        }
        if self.failure_threshold == Some(0) {
            return Err(CutoverError::InvalidConfig(
                "failure_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply to `schedule`, returning the names of the fields that were set.
    fn apply(&self, schedule: &mut CutoverSchedule) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.clear_schedule {
            schedule.scheduled_start = None;
            schedule.scheduled_end = None;
            changed.push("schedule cleared");
        }
        let texts = [
            ("resource_scope", &self.resource_scope, &mut schedule.resource_scope),
            ("v4_workflow", &self.v4_workflow, &mut schedule.v4_workflow),
            ("v3_workflow", &self.v3_workflow, &mut schedule.v3_workflow),
            ("failover_workflow", &self.failover_workflow, &mut schedule.failover_workflow),
        ];
        for (field, value, slot) in texts {
            if let Some(value) = value {
                *slot = value.trim().to_string();
                changed.push(field);
            }
        }
        if let Some(start) = self.scheduled_start {
            schedule.scheduled_start = Some(start);
            changed.push("scheduled_start");
        }
        if let Some(end) = self.scheduled_end {
            schedule.scheduled_end = Some(end);
            changed.push("scheduled_end");
        }
        if let Some(threshold) = self.failure_threshold {
            schedule.failure_threshold = threshold;
            changed.push("failure_threshold");
        }
        if let Some(auto) = self.auto_cutback {
            schedule.auto_cutback = auto;
            changed.push("auto_cutback");
        }
        changed
    }
}

/// Which generation a transition routes traffic to.
#[derive(Debug, Clone, Copy)]
enum Route {
    V4,
    V3,
}

impl Route {
    /// Remote state changes, in the order they are applied.
    fn plan(self, s: &CutoverSchedule) -> [(&str, WorkflowState); 3] {
        use WorkflowState::{Disabled, Enabled};
        match self {
            Route::V4 => [
                (s.v4_workflow.as_str(), Enabled),
                (s.failover_workflow.as_str(), Enabled),
                (s.v3_workflow.as_str(), Disabled),
            ],
            Route::V3 => [
                (s.v4_workflow.as_str(), Disabled),
                (s.failover_workflow.as_str(), Disabled),
                (s.v3_workflow.as_str(), Enabled),
            ],
        }
    }
}

fn append_failures(text: &mut String, failures: &[String]) {
    if !failures.is_empty() {
        let _ = write!(text, "; remote failures: {}", failures.join("; "));
    }
}

/// Owns every transition of every cutover.
pub struct LifecycleController {
    store: StateStore,
    workflows: Arc<dyn WorkflowClient>,
    notifier: Arc<dyn Notifier>,
    dedup: AlertDeduplicator,
    locks: CutoverLocks,
    settings: ControllerSettings,
}

impl LifecycleController {
    pub fn new(
        store: StateStore,
        workflows: Arc<dyn WorkflowClient>,
        notifier: Arc<dyn Notifier>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            dedup: AlertDeduplicator::new(store.clone()),
            store,
            workflows,
            notifier,
            locks: CutoverLocks::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    /// Every stored schedule, ordered by name. Records that fail to decode
    /// are reported per name rather than failing the scan.
    pub fn scan_schedules(&self) -> CutoverResult<Vec<(String, StateResult<CutoverSchedule>)>> {
        Ok(self.store.scan_schedules()?)
    }

    /// Whether a scheduled start should fire at `now`.
    ///
    /// Due times older than the grace window are stale and never honored,
    /// and a start whose scheduled end has already passed is skipped.
    pub fn start_due(&self, schedule: &CutoverSchedule, now: u64) -> bool {
        if schedule.is_active || !schedule.is_configured() {
            return false;
        }
        let Some(start) = schedule.scheduled_start else {
            return false;
        };
        start <= now
            && now - start <= self.settings.start_grace_secs
            && schedule.scheduled_end.is_none_or(|end| end > now)
    }

    pub fn end_due(&self, schedule: &CutoverSchedule, now: u64) -> bool {
        schedule.is_active && schedule.scheduled_end.is_some_and(|end| end <= now)
    }

    // ── Operator API ───────────────────────────────────────────────

    /// Status of every cutover, including live remote workflow states.
    ///
    /// Takes no locks; remote lookups that fail or time out read as `None`.
    pub async fn list_statuses(&self) -> CutoverResult<Vec<CutoverStatus>> {
        let entries = self.store.scan_schedules()?;
        let mut statuses = Vec::with_capacity(entries.len());
        for (name, decoded) in entries {
            let schedule = match decoded {
                Ok(schedule) => schedule,
                Err(e) => {
                    warn!(cutover = %name, error = %e, "skipping unreadable schedule");
                    continue;
                }
            };
            let (v4_state, v3_state, failover_state) = if schedule.is_configured() {
                (
                    self.remote_state(&schedule, &schedule.v4_workflow).await,
                    self.remote_state(&schedule, &schedule.v3_workflow).await,
                    self.remote_state(&schedule, &schedule.failover_workflow).await,
                )
            } else {
                (None, None, None)
            };
            let phase = schedule.phase();
            statuses.push(CutoverStatus {
                schedule,
                phase,
                v4_state,
                v3_state,
                failover_state,
            });
        }
        Ok(statuses)
    }

    /// Manually start (or restart) a cutover.
    ///
    /// `duration_minutes` sets the scheduled end relative to `now`; `None`
    /// or zero runs until stopped. Starting an Active cutover restarts it and
    /// resets its totals.
    pub async fn start_cutover(
        &self,
        name: &str,
        duration_minutes: Option<u32>,
        auto_cutback: bool,
        now: u64,
    ) -> CutoverResult<TransitionReport> {
        self.load(name)?;
        let _guard = self.locks.acquire(name).await;
        let mut schedule = self.load(name)?;
        if !schedule.is_configured() {
            return Err(CutoverError::InvalidConfig(format!(
                "cutover `{name}` has no workflows configured"
            )));
        }
        if schedule.is_active {
            info!(cutover = %name, "restarting active cutover");
        }
        schedule.scheduled_end = duration_minutes
            .filter(|m| *m > 0)
            .map(|m| now + u64::from(m) * 60);
        schedule.auto_cutback = auto_cutback;
        self.start_locked(schedule, Actor::Api, now).await
    }

    /// Manually end an Active cutover.
    pub async fn stop_cutover(&self, name: &str, now: u64) -> CutoverResult<TransitionReport> {
        self.load(name)?;
        let _guard = self.locks.acquire(name).await;
        let schedule = self.load(name)?;
        if !schedule.is_active {
            return Err(CutoverError::Conflict(format!("cutover `{name}` is not active")));
        }
        self.end_locked(schedule, Actor::Api, now).await
    }

    /// Create a cutover or update its configuration.
    pub async fn upsert_config(
        &self,
        name: &str,
        update: ConfigUpdate,
        now: u64,
    ) -> CutoverResult<CutoverSchedule> {
        validate_cutover_name(name).map_err(CutoverError::InvalidConfig)?;
        update.validate()?;

        let _guard = self.locks.acquire(name).await;
        let existing = self.store.get_schedule(name)?;
        let created = existing.is_none();
        let mut schedule = existing.unwrap_or_else(|| CutoverSchedule::new(name, now));

        let changed = update.apply(&mut schedule);
        if let (Some(start), Some(end)) = (schedule.scheduled_start, schedule.scheduled_end)
            && end <= start
        {
            return Err(CutoverError::InvalidConfig(
                "scheduled_end must be after scheduled_start".to_string(),
            ));
        }
        schedule.updated_at = now;
        self.store.put_schedule(&schedule)?;

        let details = match (created, changed.is_empty()) {
            (true, _) => format!("Created; set {}", changed.join(", ")),
            (false, true) => "No changes".to_string(),
            (false, false) => format!("Updated {}", changed.join(", ")),
        };
        self.store.append_audit(AuditRecord::new(
            name,
            AuditAction::ConfigUpdated,
            details,
            Actor::Api,
            now,
        ))?;
        info!(cutover = %name, created, fields = ?changed, "cutover config stored");
        Ok(schedule)
    }

    /// Audit records from the last `days` UTC days, newest first.
    pub fn recent_audit(&self, days: u32, now: u64) -> CutoverResult<Vec<AuditRecord>> {
        Ok(self.store.list_recent_audit(days, now)?)
    }

    /// Alerts for `name` in the last `minutes`, oldest first.
    pub fn recent_alerts(
        &self,
        name: &str,
        kind: Option<AlertKind>,
        minutes: u32,
        now: u64,
    ) -> CutoverResult<Vec<AlertRecord>> {
        self.load(name)?;
        let since = now.saturating_sub(u64::from(minutes) * 60);
        Ok(self.store.list_alerts(name, kind, since)?)
    }

    // ── Tick operations ────────────────────────────────────────────

    /// Start `name` if its scheduled start is due. `Ok(None)` when it is not.
    pub async fn start_scheduled(
        &self,
        name: &str,
        now: u64,
    ) -> CutoverResult<Option<TransitionReport>> {
        let _guard = self.locks.acquire(name).await;
        let schedule = self.load(name)?;
        if !self.start_due(&schedule, now) {
            return Ok(None);
        }
        self.start_locked(schedule, Actor::Schedule, now).await.map(Some)
    }

    /// End `name` if its scheduled end is due. `Ok(None)` when it is not.
    pub async fn end_scheduled(
        &self,
        name: &str,
        now: u64,
    ) -> CutoverResult<Option<TransitionReport>> {
        let _guard = self.locks.acquire(name).await;
        let schedule = self.load(name)?;
        if !self.end_due(&schedule, now) {
            return Ok(None);
        }
        self.end_locked(schedule, Actor::Schedule, now).await.map(Some)
    }

    /// Sample health of an Active cutover, accumulate totals, and alert or
    /// cut back on a breach.
    pub async fn evaluate(&self, name: &str, now: u64) -> CutoverResult<EvaluationOutcome> {
        let _guard = self.locks.acquire(name).await;
        let mut schedule = self.load(name)?;
        if !schedule.is_active || !schedule.is_configured() {
            return Ok(EvaluationOutcome::Skipped);
        }

        match self.remote_state(&schedule, &schedule.v4_workflow).await {
            Some(WorkflowState::Enabled) => {}
            state => {
                debug!(cutover = %name, ?state, "primary workflow not enabled, skipping evaluation");
                return Ok(EvaluationOutcome::Skipped);
            }
        }
        let Some(primary) = self.remote_runs(&schedule, &schedule.v4_workflow).await else {
            return Ok(EvaluationOutcome::Skipped);
        };
        let failover = self
            .remote_runs(&schedule, &schedule.failover_workflow)
            .await
            .unwrap_or_default();

        let sample = HealthSample {
            total: primary.total,
            failed: primary.failed,
            failovers: failover.total,
        };
        schedule.total_runs += sample.total;
        schedule.total_failures += sample.failed;
        schedule.total_failovers += sample.failovers;
        schedule.last_checked = Some(now);
        schedule.updated_at = now;

        let assessment = HealthEvaluator::evaluate(&sample);
        if !assessment.has_issues {
            schedule.last_error.clear();
            self.store.put_schedule(&schedule)?;
            debug!(cutover = %name, runs = sample.total, "cutover healthy");
            return Ok(EvaluationOutcome::Healthy);
        }

        schedule.last_error = assessment.summary.clone();
        self.store.put_schedule(&schedule)?;
        warn!(
            cutover = %name,
            failed = sample.failed,
            failovers = sample.failovers,
            "cutover has issues"
        );

        if !sample.breaches(schedule.failure_threshold) {
            return Ok(EvaluationOutcome::Issues {
                alerted: false,
                cutback: None,
            });
        }
        if !self.dedup.should_alert(
            name,
            AlertKind::Failure,
            self.settings.dedup_window_minutes,
            now,
        ) {
            debug!(cutover = %name, "failure alert suppressed by recent alert");
            return Ok(EvaluationOutcome::Issues {
                alerted: false,
                cutback: None,
            });
        }

        self.send_failure_alert(&schedule, &assessment.summary, now).await?;

        let cutback = if schedule.auto_cutback {
            warn!(cutover = %name, "auto-cutback triggered");
            Some(self.end_locked(schedule, Actor::AutoCutback, now).await?)
        } else {
            None
        };
        Ok(EvaluationOutcome::Issues {
            alerted: true,
            cutback,
        })
    }

    // ── Transitions (caller holds the lock) ────────────────────────

    async fn start_locked(
        &self,
        mut schedule: CutoverSchedule,
        actor: Actor,
        now: u64,
    ) -> CutoverResult<TransitionReport> {
        let remote_failures = self.apply_route(&schedule, Route::V4).await;

        schedule.is_active = true;
        schedule.reset_totals();
        schedule.last_error.clear();
        schedule.actual_start = Some(now);
        schedule.actual_end = None;
        schedule.updated_at = now;
        self.store.put_schedule(&schedule)?;

        let mut details = match schedule.scheduled_end {
            Some(end) => format!("Cutover started; scheduled end {}", format_utc(end)),
            None => "Cutover started; no scheduled end".to_string(),
        };
        append_failures(&mut details, &remote_failures);
        self.store.append_audit(AuditRecord::new(
            &schedule.name,
            AuditAction::CutoverStart,
            details,
            actor,
            now,
        ))?;

        let mut message = format!(
            "Switchyard: cutover {} started by {actor}, v4 is live.",
            schedule.name
        );
        if let Some(end) = schedule.scheduled_end {
            let _ = write!(message, " Scheduled end: {}.", format_utc(end));
        }
        append_failures(&mut message, &remote_failures);
        let delivery_id = self.notify(&schedule.name, &message).await;

        info!(
            cutover = %schedule.name,
            %actor,
            remote_failures = remote_failures.len(),
            "cutover started"
        );
        Ok(TransitionReport {
            cutover: schedule.name,
            phase: CutoverPhase::Active,
            actor,
            timestamp: now,
            remote_failures,
            delivery_id,
        })
    }

    async fn end_locked(
        &self,
        mut schedule: CutoverSchedule,
        actor: Actor,
        now: u64,
    ) -> CutoverResult<TransitionReport> {
        let remote_failures = self.apply_route(&schedule, Route::V3).await;

        schedule.is_active = false;
        schedule.actual_end = Some(now);
        schedule.scheduled_start = None;
        schedule.scheduled_end = None;
        schedule.updated_at = now;
        self.store.put_schedule(&schedule)?;

        let summary = schedule.totals_summary();
        let mut details = summary.clone();
        append_failures(&mut details, &remote_failures);
        self.store.append_audit(AuditRecord::new(
            &schedule.name,
            AuditAction::CutoverEnd,
            details,
            actor,
            now,
        ))?;

        let mut message = match actor {
            Actor::AutoCutback => format!(
                "Switchyard AUTO-CUTBACK: cutover {} rolled back to v3. {summary}",
                schedule.name
            ),
            _ => format!(
                "Switchyard: cutover {} ended by {actor}, v3 is live. {summary}",
                schedule.name
            ),
        };
        append_failures(&mut message, &remote_failures);
        let delivery_id = self.notify(&schedule.name, &message).await;

        if actor == Actor::AutoCutback {
            self.store.append_alert(&AlertRecord {
                cutover: schedule.name.clone(),
                kind: AlertKind::Cutback,
                message,
                timestamp: now,
                delivery_id: delivery_id.clone(),
            })?;
        }

        info!(
            cutover = %schedule.name,
            %actor,
            remote_failures = remote_failures.len(),
            "cutover ended"
        );
        Ok(TransitionReport {
            cutover: schedule.name,
            phase: CutoverPhase::Inactive,
            actor,
            timestamp: now,
            remote_failures,
            delivery_id,
        })
    }

    async fn send_failure_alert(
        &self,
        schedule: &CutoverSchedule,
        summary: &str,
        now: u64,
    ) -> CutoverResult<()> {
        let message = format!(
            "Switchyard ALERT: cutover {} is failing. {summary} (threshold {}).",
            schedule.name, schedule.failure_threshold
        );
        // Recorded before sending so a later tick's dedup sees it.
        let key = self.store.append_alert(&AlertRecord {
            cutover: schedule.name.clone(),
            kind: AlertKind::Failure,
            message: message.clone(),
            timestamp: now,
            delivery_id: None,
        })?;
        let delivery_id = self.notify(&schedule.name, &message).await;
        if let Some(id) = &delivery_id
            && let Err(e) = self.store.set_alert_delivery(&key, id)
        {
            warn!(cutover = %schedule.name, %key, error = %e, "failed to record delivery id");
        }

        let details = match &delivery_id {
            Some(id) => format!("{summary}; delivered as {id}"),
            None => format!("{summary}; delivery failed"),
        };
        self.store.append_audit(AuditRecord::new(
            &schedule.name,
            AuditAction::AlertSent,
            details,
            Actor::Monitor,
            now,
        ))?;
        Ok(())
    }

    // ── Remote calls ───────────────────────────────────────────────

    fn load(&self, name: &str) -> CutoverResult<CutoverSchedule> {
        self.store
            .get_schedule(name)?
            .ok_or_else(|| CutoverError::NotFound(name.to_string()))
    }

    /// Run a remote call under the configured timeout, flattening errors to text.
    async fn bounded<T>(&self, call: impl Future<Output = RemoteResult<T>>) -> Result<T, String> {
        match tokio::time::timeout(self.settings.remote_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("timed out after {:?}", self.settings.remote_timeout)),
        }
    }

    async fn apply_route(&self, schedule: &CutoverSchedule, route: Route) -> Vec<String> {
        let mut failures = Vec::new();
        for (workflow, desired) in route.plan(schedule) {
            let call = self
                .workflows
                .set_state(&schedule.resource_scope, workflow, desired);
            if let Err(detail) = self.bounded(call).await {
                warn!(
                    cutover = %schedule.name,
                    %workflow,
                    state = %desired,
                    error = %detail,
                    "remote state change failed"
                );
                failures.push(format!("{workflow} -> {desired}: {detail}"));
            }
        }
        failures
    }

    async fn remote_state(&self, schedule: &CutoverSchedule, workflow: &str) -> Option<WorkflowState> {
        let call = self.workflows.get_state(&schedule.resource_scope, workflow);
        match self.bounded(call).await {
            Ok(state) => Some(state),
            Err(detail) => {
                warn!(cutover = %schedule.name, %workflow, error = %detail, "workflow state unavailable");
                None
            }
        }
    }

    async fn remote_runs(&self, schedule: &CutoverSchedule, workflow: &str) -> Option<RunCounts> {
        let call = self.workflows.recent_runs(
            &schedule.resource_scope,
            workflow,
            self.settings.lookback_minutes,
        );
        match self.bounded(call).await {
            Ok(counts) => Some(counts),
            Err(detail) => {
                warn!(cutover = %schedule.name, %workflow, error = %detail, "run counts unavailable");
                None
            }
        }
    }

    async fn notify(&self, cutover: &str, message: &str) -> Option<String> {
        match self.bounded(self.notifier.send(message)).await {
            Ok(id) => Some(id),
            Err(detail) => {
                warn!(%cutover, error = %detail, "notification failed");
                None
            }
        }
    }
}
