//! StateStore — redb-backed state persistence for Switchyard.
//!
//! Provides typed operations over cutover schedules (upsert, point lookup,
//! full scan) and the append-only alert and audit histories. All values are
//! JSON-serialized into redb's `&[u8]` value columns. The store supports
//! both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
    /// Tie-breaker for append keys written within the same microsecond.
    seq: Arc<AtomicU64>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self::from_database(db);
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self::from_database(db);
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(db),
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(SCHEDULES).map_err(map_err!(Table))?;
        txn.open_table(ALERTS).map_err(map_err!(Table))?;
        txn.open_table(AUDIT).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Monotonic, lexicographically sortable key suffix.
    fn next_ordering(&self) -> String {
        let micros = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) % 1_000_000;
        format!("{micros:020}-{seq:06}")
    }

    fn insert_raw(
        &self,
        definition: TableDefinition<'static, &'static str, &'static [u8]>,
        key: &str,
        value: &[u8],
    ) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(definition).map_err(map_err!(Table))?;
            table.insert(key, value).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Schedules ──────────────────────────────────────────────────

    /// Insert or update a cutover schedule.
    pub fn put_schedule(&self, schedule: &CutoverSchedule) -> StateResult<()> {
        let value = serde_json::to_vec(schedule).map_err(map_err!(Serialize))?;
        self.insert_raw(SCHEDULES, &schedule.name, &value)?;
        debug!(cutover = %schedule.name, active = schedule.is_active, "schedule stored");
        Ok(())
    }

    /// Get a schedule by cutover name.
    pub fn get_schedule(&self, name: &str) -> StateResult<Option<CutoverSchedule>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SCHEDULES).map_err(map_err!(Table))?;
        match table.get(name).map_err(map_err!(Read))? {
            Some(guard) => {
                let schedule: CutoverSchedule =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(schedule))
            }
            None => Ok(None),
        }
    }

    /// List all schedules, ordered by name.
    pub fn list_schedules(&self) -> StateResult<Vec<CutoverSchedule>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SCHEDULES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let schedule: CutoverSchedule =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(schedule);
        }
        Ok(results)
    }

    /// Every stored schedule, ordered by name, decoded one entry at a time.
    ///
    /// A record that fails to decode is returned as an `Err` next to its
    /// key instead of failing the whole scan.
    pub fn scan_schedules(&self) -> StateResult<Vec<(String, StateResult<CutoverSchedule>)>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SCHEDULES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            let decoded = serde_json::from_slice::<CutoverSchedule>(value.value())
                .map_err(map_err!(Deserialize));
            results.push((key.value().to_string(), decoded));
        }
        Ok(results)
    }

    /// Write raw bytes under a schedule key, bypassing serialization.
    #[cfg(any(test, feature = "testing"))]
    pub fn put_raw_schedule(&self, name: &str, value: &[u8]) -> StateResult<()> {
        self.insert_raw(SCHEDULES, name, value)
    }

    // ── Alerts ─────────────────────────────────────────────────────

    /// Append an alert record. Returns its key.
    pub fn append_alert(&self, record: &AlertRecord) -> StateResult<String> {
        let key = format!("{}/{}", record.cutover, self.next_ordering());
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        self.insert_raw(ALERTS, &key, &value)?;
        debug!(cutover = %record.cutover, kind = %record.kind, %key, "alert recorded");
        Ok(key)
    }

    /// Attach a delivery id to an alert written before it was sent.
    pub fn set_alert_delivery(&self, key: &str, delivery_id: &str) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ALERTS).map_err(map_err!(Table))?;
            let mut record: AlertRecord = match table.get(key).map_err(map_err!(Read))? {
                Some(guard) => serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
                None => return Err(StateError::NotFound(key.to_string())),
            };
            record.delivery_id = Some(delivery_id.to_string());
            let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
            table.insert(key, value.as_slice()).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Alerts for a cutover with `timestamp > since`, oldest first.
    ///
    /// `kind = None` returns alerts of every kind.
    pub fn list_alerts(
        &self,
        cutover: &str,
        kind: Option<AlertKind>,
        since: u64,
    ) -> StateResult<Vec<AlertRecord>> {
        let prefix = format!("{cutover}/");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ALERTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.range(prefix.as_str()..).map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if !key.value().starts_with(&prefix) {
                break;
            }
            let record: AlertRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if record.cutover == cutover
                && kind.is_none_or(|k| record.kind == k)
                && record.timestamp > since
            {
                results.push(record);
            }
        }
        Ok(results)
    }

    // ── Audit ──────────────────────────────────────────────────────

    /// Append an audit record, assigning its ordering key. Returns the stored record.
    pub fn append_audit(&self, mut record: AuditRecord) -> StateResult<AuditRecord> {
        record.ordering = self.next_ordering();
        let key = record.table_key();
        let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
        self.insert_raw(AUDIT, &key, &value)?;
        debug!(
            cutover = %record.cutover,
            action = ?record.action,
            actor = %record.actor,
            %key,
            "audit record appended"
        );
        Ok(record)
    }

    /// Audit records whose partition is `>= since_partition`, newest first.
    pub fn list_audit_since(&self, since_partition: &str) -> StateResult<Vec<AuditRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(AUDIT).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        // Keys are `YYYY-MM-DD/...`, so everything from `since_partition` on qualifies.
        for entry in table.range(since_partition..).map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: AuditRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(record);
        }
        results.reverse();
        Ok(results)
    }

    /// Audit records from the last `days` UTC days (today included), newest first.
    pub fn list_recent_audit(&self, days: u32, now: u64) -> StateResult<Vec<AuditRecord>> {
        let span = u64::from(days.max(1) - 1) * 86_400;
        let since = day_partition(now.saturating_sub(span));
        self.list_audit_since(&since)
    }
}
