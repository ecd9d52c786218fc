//! redb table definitions for the Switchyard state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Cutover schedules keyed by `{name}`.
pub const SCHEDULES: TableDefinition<&str, &[u8]> = TableDefinition::new("schedules");

/// Alert records keyed by `{cutover}/{ordering}`.
pub const ALERTS: TableDefinition<&str, &[u8]> = TableDefinition::new("alerts");

/// Audit records keyed by `{YYYY-MM-DD}/{ordering}`.
pub const AUDIT: TableDefinition<&str, &[u8]> = TableDefinition::new("audit");
