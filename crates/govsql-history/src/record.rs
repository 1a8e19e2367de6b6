//! History record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a record entered the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOrigin {
    /// Written back by the workflow after a successful execution.
    Interactive,
    /// Stored directly through the teach operation.
    Taught,
}

/// A stored (question, SQL) pair. The question text is the indexed
/// field; identity is the monotonically assigned `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    pub question: String,
    pub sql: String,
    pub schema_name: String,
    pub user: String,
    pub updated_at: DateTime<Utc>,
    pub origin: RecordOrigin,
}

/// Fields for a record about to be inserted; the store assigns id and
/// timestamp.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub question: String,
    pub sql: String,
    pub schema_name: String,
    pub user: String,
    pub origin: RecordOrigin,
}
