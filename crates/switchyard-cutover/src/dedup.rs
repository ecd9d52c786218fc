//! Alert suppression window.

use tracing::warn;

use switchyard_state::{AlertKind, StateStore};

/// Decides whether a new alert may be sent for a cutover.
///
/// A single prior alert of the same kind inside the window suppresses the
/// next one. Store failures are treated as "no prior alert" (fail-open).
#[derive(Clone)]
pub struct AlertDeduplicator {
    store: StateStore,
}

impl AlertDeduplicator {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    /// True iff no `(cutover, kind)` alert is younger than `window_minutes`.
    ///
    /// A record exactly `window_minutes` old no longer suppresses.
    pub fn should_alert(&self, cutover: &str, kind: AlertKind, window_minutes: u32, now: u64) -> bool {
        let since = now.saturating_sub(u64::from(window_minutes) * 60);
        match self.store.list_alerts(cutover, Some(kind), since) {
            Ok(recent) => recent.is_empty(),
            Err(e) => {
                warn!(%cutover, %kind, error = %e, "alert history unavailable, allowing alert");
                true
            }
        }
    }
}
