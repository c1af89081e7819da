use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::engine::Engine;
use crate::domain::error::MigrationError;
use crate::domain::value_objects::{QualifiedColumn, SchemaName, TableName};

/// Which phases of the pipeline a request runs.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PhaseFlags {
    pub metadata: bool,
    pub plain_data: bool,
    pub lob_data: bool,
    pub process_indexes: bool,
    pub process_views: bool,
    pub process_mviews: bool,
}

/// One migration request, immutable once accepted.
///
/// `include_views` follows the control surface convention: a single `*`
/// entry selects every view in the source schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRequest {
    pub source: Engine,
    pub target: Engine,
    pub source_schema: SchemaName,
    pub target_schema: SchemaName,
    pub phases: PhaseFlags,
    pub include_tables: Vec<TableName>,
    pub exclude_tables: Vec<TableName>,
    pub include_views: Vec<TableName>,
    pub exclude_columns: Vec<QualifiedColumn>,
    pub skip_ck_constraints: Vec<TableName>,
    pub skip_fk_constraints: Vec<TableName>,
    pub skip_named_constraints: Vec<String>,
    /// External type overrides, `table.column` -> verbatim target type text.
    pub external_columns: BTreeMap<QualifiedColumn, String>,
}

impl MigrationRequest {
    pub fn new(
        source: Engine,
        target: Engine,
        source_schema: &str,
        target_schema: &str,
    ) -> Self {
        Self {
            source,
            target,
            source_schema: SchemaName(source_schema.to_string()),
            target_schema: SchemaName(target_schema.to_string()),
            phases: PhaseFlags::default(),
            include_tables: Vec::new(),
            exclude_tables: Vec::new(),
            include_views: Vec::new(),
            exclude_columns: Vec::new(),
            skip_ck_constraints: Vec::new(),
            skip_fk_constraints: Vec::new(),
            skip_named_constraints: Vec::new(),
            external_columns: BTreeMap::new(),
        }
    }

    /// Parameter-level validation — everything that can be checked before
    /// any connection is opened. Returns every violation, not just the
    /// first.
    pub fn validate(&self) -> Vec<MigrationError> {
        let mut errors = Vec::new();

        if self.source_schema.0.trim().is_empty() {
            errors.push(MigrationError::required("from-schema"));
        }
        if self.target_schema.0.trim().is_empty() {
            errors.push(MigrationError::required("to-schema"));
        }

        if self.source == self.target
            && self
                .source_schema
                .0
                .eq_ignore_ascii_case(&self.target_schema.0)
        {
            errors.push(MigrationError::invalid_value(
                &self.target_schema.0,
                "source and target schemas are the same",
            ));
        }

        if !self.include_tables.is_empty() && !self.exclude_tables.is_empty() {
            errors.push(MigrationError::invalid_value(
                "include-tables, exclude-tables",
                "mutually exclusive",
            ));
        }

        if !self.phases.metadata && !self.phases.plain_data && !self.phases.lob_data {
            errors.push(MigrationError::invalid_value(
                "migrate-metadata, migrate-plaindata, migrate-lobdata",
                "at least one migration step must be requested",
            ));
        }

        if self.phases.process_indexes && !self.phases.metadata {
            errors.push(MigrationError::invalid_value(
                "process-indexes",
                "requires migrate-metadata",
            ));
        }

        errors
    }

    pub fn include_all_views(&self) -> bool {
        self.include_views.iter().any(|v| v.0 == "*")
    }

    pub fn view_included(&self, name: &str) -> bool {
        self.include_all_views() || self.include_views.iter().any(|v| v.matches(name))
    }

    pub fn column_excluded(&self, table: &str, column: &str) -> bool {
        self.exclude_columns.iter().any(|qc| qc.matches(table, column))
    }

    /// The external override for a column, if one was supplied.
    pub fn override_for(&self, table: &str, column: &str) -> Option<&str> {
        self.external_columns
            .iter()
            .find(|(qc, _)| qc.matches(table, column))
            .map(|(_, ty)| ty.as_str())
    }

    pub fn skip_fk_for(&self, table: &str) -> bool {
        self.skip_fk_constraints.iter().any(|t| t.matches(table))
    }

    pub fn skip_ck_for(&self, table: &str) -> bool {
        self.skip_ck_constraints.iter().any(|t| t.matches(table))
    }

    pub fn constraint_skipped(&self, name: &str) -> bool {
        self.skip_named_constraints
            .iter()
            .any(|n| n.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_request() -> MigrationRequest {
        let mut req = MigrationRequest::new(Engine::Oracle, Engine::Postgres, "hr", "hr");
        req.phases.metadata = true;
        req.phases.plain_data = true;
        req
    }

    #[test]
    fn valid_request_passes() {
        assert!(base_request().validate().is_empty());
    }

    #[test]
    fn include_and_exclude_are_mutually_exclusive() {
        let mut req = base_request();
        req.include_tables.push(TableName("a".into()));
        req.exclude_tables.push(TableName("b".into()));
        let errors = req.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code(), 142);
    }

    #[test]
    fn same_engine_same_schema_refused() {
        let mut req = MigrationRequest::new(Engine::Postgres, Engine::Postgres, "public", "PUBLIC");
        req.phases.metadata = true;
        assert_eq!(req.validate()[0].code(), 142);
    }

    #[test]
    fn missing_schema_is_required_attribute() {
        let mut req = base_request();
        req.target_schema = SchemaName(String::new());
        assert_eq!(req.validate()[0].code(), 112);
    }

    #[test]
    fn no_steps_requested_is_refused() {
        let mut req = base_request();
        req.phases = PhaseFlags::default();
        assert_eq!(req.validate().len(), 1);
    }

    #[test]
    fn process_indexes_requires_metadata() {
        let mut req = base_request();
        req.phases.metadata = false;
        req.phases.process_indexes = true;
        assert!(req.validate().iter().any(|e| e.code() == 142));
    }

    #[test]
    fn star_selects_all_views() {
        let mut req = base_request();
        req.include_views.push(TableName("*".into()));
        assert!(req.view_included("v_active"));
        req.include_views.clear();
        req.include_views.push(TableName("v_active".into()));
        assert!(req.view_included("V_ACTIVE"));
        assert!(!req.view_included("v_other"));
    }

    #[test]
    fn override_lookup_is_case_insensitive() {
        let mut req = base_request();
        req.external_columns.insert(
            QualifiedColumn::new("persons", "id"),
            "NUMERIC(20)".to_string(),
        );
        assert_eq!(req.override_for("PERSONS", "ID"), Some("NUMERIC(20)"));
        assert_eq!(req.override_for("persons", "name"), None);
    }
}
