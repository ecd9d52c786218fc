//! Reconciliation loop — the periodic driver over all cutovers.
//!
//! Each tick runs three passes in order:
//!
//! ```text
//! (a) Evaluate every Active cutover
//! (b) Start every Inactive cutover whose scheduled start is due
//! (c) End every Active cutover whose scheduled end is due
//! ```
//!
//! Phases for (b) and (c) are re-read after (a), so a cutover rolled back
//! by auto-cutback is not ended a second time. A failure on one cutover is
//! logged and the tick moves on to the next. That includes a schedule
//! record that no longer decodes: it is counted as failed once per tick and
//! the remaining cutovers are processed normally.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use switchyard_state::{CutoverSchedule, epoch_secs};

use crate::controller::{CutoverResult, EvaluationOutcome, LifecycleController};

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub evaluated: usize,
    pub alerts: usize,
    pub started: usize,
    pub ended: usize,
    /// Cutovers whose processing failed this tick.
    pub failed: usize,
}

pub struct ReconciliationLoop {
    controller: Arc<LifecycleController>,
}

impl ReconciliationLoop {
    pub fn new(controller: Arc<LifecycleController>) -> Self {
        Self { controller }
    }

    /// Run one tick at `now`. Only a failure to read the schedule table aborts it.
    pub async fn tick_at(&self, now: u64) -> CutoverResult<TickSummary> {
        let mut summary = TickSummary::default();

        // Undecodable records go through evaluation too, so the failure is
        // reported under the cutover's name.
        let targets: Vec<String> = self
            .controller
            .scan_schedules()?
            .into_iter()
            .filter(|(_, decoded)| !matches!(decoded, Ok(s) if !s.is_active))
            .map(|(name, _)| name)
            .collect();
        for name in &targets {
            match self.controller.evaluate(name, now).await {
                Ok(EvaluationOutcome::Skipped) => {}
                Ok(outcome) => {
                    summary.evaluated += 1;
                    if let EvaluationOutcome::Issues { alerted: true, cutback } = &outcome {
                        summary.alerts += 1;
                        if cutback.is_some() {
                            summary.ended += 1;
                        }
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    error!(cutover = %name, error = %e, "evaluation failed");
                }
            }
        }

        // Unreadable records were already counted by the evaluation pass.
        let schedules: Vec<CutoverSchedule> = self
            .controller
            .scan_schedules()?
            .into_iter()
            .filter_map(|(_, decoded)| decoded.ok())
            .collect();

        for schedule in schedules.iter().filter(|s| !s.is_active) {
            if !self.controller.start_due(schedule, now) {
                if schedule.scheduled_start.is_some_and(|start| start <= now) {
                    debug!(cutover = %schedule.name, "scheduled start is stale, ignoring");
                }
                continue;
            }
            match self.controller.start_scheduled(&schedule.name, now).await {
                Ok(Some(_)) => summary.started += 1,
                Ok(None) => {}
                Err(e) => {
                    summary.failed += 1;
                    error!(cutover = %schedule.name, error = %e, "scheduled start failed");
                }
            }
        }

        for schedule in schedules.iter().filter(|s| self.controller.end_due(s, now)) {
            match self.controller.end_scheduled(&schedule.name, now).await {
                Ok(Some(_)) => summary.ended += 1,
                Ok(None) => {}
                Err(e) => {
                    summary.failed += 1;
                    error!(cutover = %schedule.name, error = %e, "scheduled end failed");
                }
            }
        }

        Ok(summary)
    }

    /// Run ticks every `interval` until `shutdown` flips.
    ///
    /// Ticks never overlap; an overrunning tick delays the next one.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "reconciliation loop started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick_at(epoch_secs()).await {
                        Ok(summary) if summary.failed > 0 => {
                            warn!(?summary, "tick finished with failures");
                        }
                        Ok(summary) => debug!(?summary, "tick finished"),
                        Err(e) => error!(error = %e, "tick aborted"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("reconciliation loop shutting down");
                    break;
                }
            }
        }
    }
}
