use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::error::MigrationError;
use crate::domain::graph::TableGraph;
use crate::domain::ports::{SqlExecutor, SqlRow, SqlValue};
use crate::domain::request::MigrationRequest;
use crate::domain::sql_type::SqlType;
use crate::domain::table::{
    ColumnDescriptor, Constraint, IndexDescriptor, TableDescriptor, TableKind,
};
use crate::domain::value_objects::{ColumnName, SchemaName, TableName};
use crate::infrastructure::db::adapter::{adapter_for, EngineAdapter};

/// Everything the later phases need to know about the source schema.
#[derive(Debug)]
pub struct Reflection {
    /// Canonical schema name, with the catalog's case imprint.
    pub schema: SchemaName,
    /// Filtered descriptors: tables in topological order, views last.
    pub tables: Vec<TableDescriptor>,
}

/// Reads the source catalog, applies the request's filters and returns
/// dependency-ordered descriptors. No target is touched here; every
/// validation failure surfaces before any DDL runs.
pub struct SchemaReflector {
    executor: Arc<dyn SqlExecutor>,
}

impl SchemaReflector {
    pub fn new(executor: Arc<dyn SqlExecutor>) -> Self {
        Self { executor }
    }

    pub async fn reflect(
        &self,
        request: &MigrationRequest,
    ) -> Result<Reflection, Vec<MigrationError>> {
        let adapter = adapter_for(self.executor.engine());

        let schema = self.resolve_schema(adapter, &request.source_schema).await?;
        info!("Reflecting schema {} on {}", schema.0, self.executor.engine());

        let table_names = self
            .fetch_names(&adapter.list_tables_sql(&schema.0))
            .await
            .map_err(|e| vec![e])?;
        let view_rows = self
            .executor
            .fetch(&adapter.list_views_sql(&schema.0))
            .await
            .map_err(|e| vec![e])?;
        let views: Vec<(String, TableKind)> = view_rows
            .iter()
            .filter_map(|row| {
                let name = cell_text(row, 0)?;
                let kind = match cell_text(row, 1).as_deref() {
                    Some("M") => TableKind::MaterializedView,
                    _ => TableKind::PlainView,
                };
                Some((name, kind))
            })
            .collect();

        let selected = select_candidates(request, &table_names, &views)?;

        let mut tables = self.load_descriptors(adapter, &schema, selected).await?;
        apply_filters(request, &mut tables)?;

        let order = order_tables(&tables)?;
        debug!(
            "Reflected {} relations from {}.{}",
            order.len(),
            self.executor.engine(),
            schema.0
        );
        Ok(Reflection {
            schema,
            tables: order,
        })
    }

    /// Match the requested schema case-insensitively against the catalog
    /// and keep the catalog's case imprint.
    async fn resolve_schema(
        &self,
        adapter: &'static dyn EngineAdapter,
        requested: &SchemaName,
    ) -> Result<SchemaName, Vec<MigrationError>> {
        let rows = self
            .executor
            .fetch(&adapter.list_schemas_sql())
            .await
            .map_err(|e| vec![e])?;
        for row in &rows {
            if let Some(name) = cell_text(row, 0) {
                if name.eq_ignore_ascii_case(&requested.0) {
                    return Ok(SchemaName(name));
                }
            }
        }
        Err(vec![MigrationError::invalid_value(
            &requested.0,
            format!("schema not found in RDBMS {}", self.executor.engine()),
        )])
    }

    async fn fetch_names(&self, sql: &str) -> Result<Vec<String>, MigrationError> {
        let rows = self.executor.fetch(sql).await?;
        Ok(rows.iter().filter_map(|row| cell_text(row, 0)).collect())
    }

    /// Load columns, constraints and indexes for the whole schema in four
    /// catalog queries, then assemble descriptors for the selected names.
    async fn load_descriptors(
        &self,
        adapter: &'static dyn EngineAdapter,
        schema: &SchemaName,
        selected: Vec<(String, TableKind)>,
    ) -> Result<Vec<TableDescriptor>, Vec<MigrationError>> {
        let source = self.executor.engine();
        let mut tables: BTreeMap<String, TableDescriptor> = selected
            .into_iter()
            .map(|(name, kind)| (name.to_lowercase(), TableDescriptor::new(&name, kind)))
            .collect();

        let column_rows = self
            .executor
            .fetch(&adapter.columns_sql(&schema.0))
            .await
            .map_err(|e| vec![e])?;
        for row in &column_rows {
            let Some(table_name) = cell_text(row, 0) else { continue };
            let Some(table) = tables.get_mut(&table_name.to_lowercase()) else {
                continue;
            };
            let Some(column_name) = cell_text(row, 1) else { continue };
            let Some(data_type) = cell_text(row, 2) else { continue };
            let raw = compose_raw_type(
                &data_type,
                cell_u32(row, 3),
                cell_u32(row, 4),
                cell_u32(row, 5),
            );
            let mut column =
                ColumnDescriptor::new(&column_name, &raw, SqlType::parse(source, &raw));
            column.features.nullable = cell_yes(row, 6);
            column.default = cell_text(row, 7).filter(|d| !d.trim().is_empty());
            column.server_default = column.default.clone();
            column.features.identity = cell_yes(row, 8);
            table.columns.push(column);
        }

        let key_rows = self
            .executor
            .fetch(&adapter.key_constraints_sql(&schema.0))
            .await
            .map_err(|e| vec![e])?;
        self.assemble_key_constraints(&mut tables, &key_rows);

        let check_rows = self
            .executor
            .fetch(&adapter.check_constraints_sql(&schema.0))
            .await
            .map_err(|e| vec![e])?;
        for row in &check_rows {
            let (Some(name), Some(table_name), Some(expression)) = (
                cell_text(row, 0),
                cell_text(row, 1),
                cell_text(row, 2),
            ) else {
                continue;
            };
            if let Some(table) = tables.get_mut(&table_name.to_lowercase()) {
                table.constraints.push(Constraint::Check {
                    name: Some(name),
                    expression,
                });
            }
        }

        let index_rows = self
            .executor
            .fetch(&adapter.indexes_sql(&schema.0))
            .await
            .map_err(|e| vec![e])?;
        for row in &index_rows {
            let (Some(index_name), Some(table_name), Some(column_name)) = (
                cell_text(row, 0),
                cell_text(row, 1),
                cell_text(row, 2),
            ) else {
                continue;
            };
            let unique = cell_yes(row, 3);
            if let Some(table) = tables.get_mut(&table_name.to_lowercase()) {
                if let Some(index) = table.indexes.iter_mut().find(|i| i.name == index_name) {
                    index.columns.push(ColumnName(column_name));
                } else {
                    table.indexes.push(IndexDescriptor {
                        name: index_name,
                        columns: vec![ColumnName(column_name)],
                        unique,
                    });
                }
            }
        }

        Ok(tables.into_values().collect())
    }

    fn assemble_key_constraints(
        &self,
        tables: &mut BTreeMap<String, TableDescriptor>,
        rows: &[SqlRow],
    ) {
        // rows are ordered (table, constraint, position); fold runs
        let mut current: Option<(String, String, char, Constraint)> = None;
        let mut flush = |tables: &mut BTreeMap<String, TableDescriptor>,
                         entry: Option<(String, String, char, Constraint)>| {
            if let Some((table_key, _, _, constraint)) = entry {
                if let Some(table) = tables.get_mut(&table_key) {
                    mark_column_features(table, &constraint);
                    table.constraints.push(constraint);
                }
            }
        };

        for row in rows {
            let (Some(name), Some(kind), Some(table_name), Some(column_name)) = (
                cell_text(row, 0),
                cell_text(row, 1),
                cell_text(row, 2),
                cell_text(row, 3),
            ) else {
                continue;
            };
            let kind_char = kind.chars().next().unwrap_or('U');
            let table_key = table_name.to_lowercase();

            let continues = matches!(
                &current,
                Some((t, n, k, _)) if *t == table_key && *n == name && *k == kind_char
            );
            if continues {
                if let Some((_, _, _, constraint)) = &mut current {
                    push_constraint_column(constraint, &column_name, cell_text(row, 5));
                }
                continue;
            }

            flush(tables, current.take());
            let constraint = match kind_char {
                'P' => Constraint::PrimaryKey {
                    name: Some(name.clone()),
                    columns: vec![ColumnName(column_name)],
                },
                'R' => Constraint::ForeignKey {
                    name: Some(name.clone()),
                    columns: vec![ColumnName(column_name)],
                    referenced_table: TableName(cell_text(row, 4).unwrap_or_default()),
                    referenced_columns: cell_text(row, 5).map(ColumnName).into_iter().collect(),
                    deferrable: cell_yes(row, 6),
                },
                _ => Constraint::Unique {
                    name: Some(name.clone()),
                    columns: vec![ColumnName(column_name)],
                },
            };
            current = Some((table_key, name, kind_char, constraint));
        }
        flush(tables, current.take());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pure filtering & ordering (unit-tested without an executor)
// ─────────────────────────────────────────────────────────────────────────────

/// Apply the include/exclude table filters and the view phase gates.
/// Unknown names in either list refuse the whole migration.
fn select_candidates(
    request: &MigrationRequest,
    table_names: &[String],
    views: &[(String, TableKind)],
) -> Result<Vec<(String, TableKind)>, Vec<MigrationError>> {
    let mut errors = Vec::new();
    let mut selected: Vec<(String, TableKind)> = Vec::new();

    if !request.include_tables.is_empty() {
        let mut missing: Vec<String> = Vec::new();
        for wanted in &request.include_tables {
            match table_names.iter().find(|t| wanted.matches(t)) {
                Some(found) => selected.push((found.clone(), TableKind::Table)),
                None => missing.push(wanted.0.clone()),
            }
        }
        if !missing.is_empty() {
            errors.push(MigrationError::invalid_value(
                missing.join(","),
                format!(
                    "not found in {}.{}",
                    request.source, request.source_schema
                ),
            ));
        }
    } else {
        let mut unknown: Vec<String> = Vec::new();
        for excluded in &request.exclude_tables {
            if !table_names.iter().any(|t| excluded.matches(t)) {
                unknown.push(excluded.0.clone());
            }
        }
        if !unknown.is_empty() {
            errors.push(MigrationError::invalid_value(
                unknown.join(","),
                format!(
                    "not found in {}.{}",
                    request.source, request.source_schema
                ),
            ));
        }
        for name in table_names {
            if !request.exclude_tables.iter().any(|t| t.matches(name)) {
                selected.push((name.clone(), TableKind::Table));
            }
        }
    }

    // named views must exist even when the phase flag is off
    for wanted in &request.include_views {
        if wanted.0 != "*" && !views.iter().any(|(v, _)| wanted.matches(v)) {
            errors.push(MigrationError::invalid_value(
                &wanted.0,
                format!(
                    "view not found in {}.{}",
                    request.source, request.source_schema
                ),
            ));
        }
    }

    for (view, kind) in views {
        let phase_ok = match kind {
            TableKind::PlainView => request.phases.process_views,
            TableKind::MaterializedView => request.phases.process_mviews,
            TableKind::Table => false,
        };
        if phase_ok && request.view_included(view) {
            selected.push((view.clone(), *kind));
        }
    }

    if errors.is_empty() {
        Ok(selected)
    } else {
        Err(errors)
    }
}

/// Column excludes, index stripping and the constraint skip sets.
fn apply_filters(
    request: &MigrationRequest,
    tables: &mut Vec<TableDescriptor>,
) -> Result<(), Vec<MigrationError>> {
    let mut errors = Vec::new();

    for table in tables.iter_mut() {
        let pk = table.primary_key();
        for qc in &request.exclude_columns {
            if !qc.table.matches(&table.name.0) {
                continue;
            }
            if pk.iter().any(|c| c.0.eq_ignore_ascii_case(&qc.column.0)) {
                errors.push(MigrationError::invalid_value(
                    qc.to_string(),
                    "cannot exclude a primary-key column",
                ));
                continue;
            }
            table
                .columns
                .retain(|c| !c.name.0.eq_ignore_ascii_case(&qc.column.0));
        }

        if !request.phases.process_indexes {
            table.indexes.clear();
        }

        let table_name = table.name.0.clone();
        table.constraints.retain(|constraint| {
            if let Some(name) = constraint.name() {
                if request.constraint_skipped(name) {
                    return false;
                }
            }
            if constraint.is_foreign_key() && request.skip_fk_for(&table_name) {
                return false;
            }
            if constraint.is_check() && request.skip_ck_for(&table_name) {
                return false;
            }
            true
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Tables in topological order, views appended afterwards (they can only
/// be created once every table exists).
fn order_tables(tables: &[TableDescriptor]) -> Result<Vec<TableDescriptor>, Vec<MigrationError>> {
    let (plain, views): (Vec<&TableDescriptor>, Vec<&TableDescriptor>) =
        tables.iter().partition(|t| !t.is_view());

    let plain_owned: Vec<TableDescriptor> = plain.iter().map(|t| (*t).clone()).collect();
    let order = TableGraph::build(&plain_owned)
        .topological_order()
        .map_err(|cycle| {
            vec![MigrationError::operation(
                "schema-migration",
                format!(
                    "mutually dependent foreign keys among: {}",
                    cycle.describe()
                ),
            )]
        })?;

    let mut out = Vec::with_capacity(tables.len());
    for name in &order {
        if let Some(t) = plain.iter().find(|t| t.name == *name) {
            out.push((*t).clone());
        }
    }
    out.extend(views.into_iter().cloned());
    Ok(out)
}

// ─── cell helpers ────────────────────────────────────────────────────────────

fn cell_text(row: &SqlRow, idx: usize) -> Option<String> {
    match row.get(idx) {
        Some(SqlValue::Text(s)) => Some(s.clone()),
        Some(SqlValue::Int(i)) => Some(i.to_string()),
        _ => None,
    }
}

fn cell_u32(row: &SqlRow, idx: usize) -> Option<u32> {
    match row.get(idx) {
        Some(SqlValue::Int(i)) => (*i).try_into().ok(),
        Some(SqlValue::Text(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

fn cell_yes(row: &SqlRow, idx: usize) -> bool {
    matches!(row.get(idx), Some(SqlValue::Text(s)) if s.eq_ignore_ascii_case("YES"))
        || matches!(row.get(idx), Some(SqlValue::Int(1)))
}

fn compose_raw_type(
    data_type: &str,
    char_len: Option<u32>,
    precision: Option<u32>,
    scale: Option<u32>,
) -> String {
    if data_type.contains('(') {
        return data_type.to_string();
    }
    if let Some(n) = char_len {
        return format!("{data_type}({n})");
    }
    let base = data_type.to_uppercase();
    if matches!(base.as_str(), "NUMBER" | "NUMERIC" | "DECIMAL" | "DEC") {
        if let Some(p) = precision {
            return match scale {
                Some(s) => format!("{data_type}({p},{s})"),
                None => format!("{data_type}({p})"),
            };
        }
    }
    data_type.to_string()
}

fn mark_column_features(table: &mut TableDescriptor, constraint: &Constraint) {
    let (columns, set): (&[ColumnName], fn(&mut crate::domain::table::ColumnFeatures)) =
        match constraint {
            Constraint::PrimaryKey { columns, .. } => (columns, |f| {
                f.primary_key = true;
                f.nullable = false;
            }),
            Constraint::ForeignKey { columns, .. } => (columns, |f| f.foreign_key = true),
            Constraint::Unique { columns, .. } => (columns, |f| f.unique = true),
            Constraint::Check { .. } => return,
        };
    for name in columns {
        if let Some(col) = table
            .columns
            .iter_mut()
            .find(|c| c.name.0.eq_ignore_ascii_case(&name.0))
        {
            set(&mut col.features);
        }
    }
}

fn push_constraint_column(constraint: &mut Constraint, column: &str, referenced: Option<String>) {
    match constraint {
        Constraint::PrimaryKey { columns, .. } | Constraint::Unique { columns, .. } => {
            columns.push(ColumnName(column.to_string()));
        }
        Constraint::ForeignKey {
            columns,
            referenced_columns,
            ..
        } => {
            columns.push(ColumnName(column.to_string()));
            if let Some(r) = referenced {
                referenced_columns.push(ColumnName(r));
            }
        }
        Constraint::Check { .. } => {}
    }
}
