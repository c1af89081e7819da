use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::engine::Engine;
use crate::domain::error::MigrationError;
use crate::domain::value_objects::{SchemaName, TableName};

/// Outcome of one phase for one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    /// Nothing committed.
    #[default]
    None,
    /// Every batch/row committed.
    Full,
    /// Some batches committed before a failure.
    Partial,
}

/// Per-column translation record, kept for the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnOutcome {
    pub name: String,
    #[serde(rename = "source-type")]
    pub source_type: String,
    #[serde(rename = "target-type")]
    pub target_type: String,
}

/// Per-table migration record. Workers write only their own slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableResult {
    pub table: TableName,
    pub columns: Vec<ColumnOutcome>,
    #[serde(rename = "plain-count")]
    pub plain_count: u64,
    #[serde(rename = "plain-status")]
    pub plain_status: PhaseStatus,
    #[serde(rename = "lob-count")]
    pub lob_count: u64,
    #[serde(rename = "lob-status")]
    pub lob_status: PhaseStatus,
}

impl TableResult {
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            columns: Vec::new(),
            plain_count: 0,
            plain_status: PhaseStatus::None,
            lob_count: 0,
            lob_status: PhaseStatus::None,
        }
    }
}

/// One endpoint of the migration, as echoed back in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointIdentity {
    pub rdbms: Engine,
    pub schema: SchemaName,
}

/// The aggregated outcome of one request, built incrementally and
/// returned by value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    #[serde(rename = "migration-id")]
    pub migration_id: Uuid,
    pub source: EndpointIdentity,
    pub target: EndpointIdentity,
    pub status: PhaseStatus,
    #[serde(rename = "started-at")]
    pub started_at: DateTime<Utc>,
    #[serde(rename = "finished-at")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(rename = "migrated-tables")]
    pub tables: Vec<TableResult>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<String>,
}

impl MigrationResult {
    pub fn new(source: EndpointIdentity, target: EndpointIdentity) -> Self {
        Self {
            migration_id: Uuid::new_v4(),
            source,
            target,
            status: PhaseStatus::None,
            started_at: Utc::now(),
            finished_at: None,
            tables: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn push_errors(&mut self, errors: impl IntoIterator<Item = MigrationError>) {
        self.errors
            .extend(errors.into_iter().map(|e| e.envelope_line()));
    }

    pub fn table_mut(&mut self, name: &TableName) -> Option<&mut TableResult> {
        self.tables.iter_mut().find(|t| &t.table == name)
    }

    /// Close the record: stamp the finish time and derive the global
    /// status from the per-table records and the error list — full only
    /// when everything succeeded, none when nothing did.
    pub fn finalize(&mut self) {
        self.finished_at = Some(Utc::now());
        let any_moved = self.tables.iter().any(|t| {
            t.plain_status != PhaseStatus::None || t.lob_status != PhaseStatus::None
        });
        let all_clean = self.errors.is_empty()
            && self
                .tables
                .iter()
                .all(|t| t.plain_status != PhaseStatus::Partial && t.lob_status != PhaseStatus::Partial);
        self.status = if all_clean && (any_moved || !self.tables.is_empty()) {
            PhaseStatus::Full
        } else if any_moved {
            PhaseStatus::Partial
        } else {
            PhaseStatus::None
        };
    }
}
