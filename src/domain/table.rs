use serde::{Deserialize, Serialize};

use crate::domain::sql_type::SqlType;
use crate::domain::value_objects::{ColumnName, TableName};

/// What kind of relation a descriptor stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TableKind {
    Table,
    PlainView,
    MaterializedView,
}

/// Feature flags reflected from the source catalog for one column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnFeatures {
    pub identity: bool,
    pub nullable: bool,
    pub unique: bool,
    pub foreign_key: bool,
    pub primary_key: bool,
}

/// One reflected column, progressively enriched by the type mapper.
///
/// `source_type_raw` is the catalog's opaque spelling; `source_type` its
/// parsed form. `target_type`/`target_rendered` stay `None` until the
/// mapper runs; `target_rendered` is what DDL emits (an external override
/// is carried verbatim here).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: ColumnName,
    pub source_type_raw: String,
    pub source_type: SqlType,
    pub target_type: Option<SqlType>,
    pub target_rendered: Option<String>,
    pub features: ColumnFeatures,
    pub default: Option<String>,
    pub server_default: Option<String>,
    pub lob: bool,
}

impl ColumnDescriptor {
    pub fn new(name: &str, source_type_raw: &str, source_type: SqlType) -> Self {
        Self {
            name: ColumnName(name.to_string()),
            source_type_raw: source_type_raw.to_string(),
            source_type,
            target_type: None,
            target_rendered: None,
            features: ColumnFeatures {
                nullable: true,
                ..ColumnFeatures::default()
            },
            default: None,
            server_default: None,
            lob: false,
        }
    }
}

/// Table constraints, named where the source names them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum Constraint {
    PrimaryKey {
        name: Option<String>,
        columns: Vec<ColumnName>,
    },
    ForeignKey {
        name: Option<String>,
        columns: Vec<ColumnName>,
        referenced_table: TableName,
        referenced_columns: Vec<ColumnName>,
        deferrable: bool,
    },
    Unique {
        name: Option<String>,
        columns: Vec<ColumnName>,
    },
    Check {
        name: Option<String>,
        expression: String,
    },
}

impl Constraint {
    pub fn name(&self) -> Option<&str> {
        match self {
            Constraint::PrimaryKey { name, .. }
            | Constraint::ForeignKey { name, .. }
            | Constraint::Unique { name, .. }
            | Constraint::Check { name, .. } => name.as_deref(),
        }
    }

    pub fn is_foreign_key(&self) -> bool {
        matches!(self, Constraint::ForeignKey { .. })
    }

    pub fn is_check(&self) -> bool {
        matches!(self, Constraint::Check { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub columns: Vec<ColumnName>,
    pub unique: bool,
}

/// A reflected table (or view), the unit the whole pipeline works on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: TableName,
    pub columns: Vec<ColumnDescriptor>,
    pub constraints: Vec<Constraint>,
    pub indexes: Vec<IndexDescriptor>,
    pub kind: TableKind,
}

impl TableDescriptor {
    pub fn new(name: &str, kind: TableKind) -> Self {
        Self {
            name: TableName(name.to_string()),
            columns: Vec::new(),
            constraints: Vec::new(),
            indexes: Vec::new(),
            kind,
        }
    }

    pub fn is_view(&self) -> bool {
        matches!(self.kind, TableKind::PlainView | TableKind::MaterializedView)
    }

    /// Primary-key column names, in declaration order. Empty when the
    /// table has no PK.
    pub fn primary_key(&self) -> Vec<ColumnName> {
        self.constraints
            .iter()
            .find_map(|c| match c {
                Constraint::PrimaryKey { columns, .. } => Some(columns.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// Tables this one references through foreign keys (its parents in
    /// the dependency graph). Self-references are not parents.
    pub fn referenced_tables(&self) -> Vec<TableName> {
        self.constraints
            .iter()
            .filter_map(|c| match c {
                Constraint::ForeignKey {
                    referenced_table, ..
                } if !referenced_table.matches(&self.name.0) => Some(referenced_table.clone()),
                _ => None,
            })
            .collect()
    }

    /// Columns moved by the plain batch loop (everything not LOB-flagged).
    pub fn plain_columns(&self) -> Vec<&ColumnDescriptor> {
        self.columns.iter().filter(|c| !c.lob).collect()
    }

    /// Columns routed through the chunked LOB path.
    pub fn lob_columns(&self) -> Vec<&ColumnDescriptor> {
        self.columns.iter().filter(|c| c.lob).collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name.0.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sql_type::SqlType;

    fn sample_table() -> TableDescriptor {
        let mut t = TableDescriptor::new("orders", TableKind::Table);
        let mut id = ColumnDescriptor::new("id", "integer", SqlType::Int { bytes: 4, signed: true });
        id.features.primary_key = true;
        id.features.nullable = false;
        let mut doc = ColumnDescriptor::new("doc", "bytea", SqlType::Blob);
        doc.lob = true;
        t.columns.push(id);
        t.columns.push(ColumnDescriptor::new(
            "customer_id",
            "integer",
            SqlType::Int { bytes: 4, signed: true },
        ));
        t.columns.push(doc);
        t.constraints.push(Constraint::PrimaryKey {
            name: Some("orders_pk".into()),
            columns: vec![ColumnName("id".into())],
        });
        t.constraints.push(Constraint::ForeignKey {
            name: Some("orders_customer_fk".into()),
            columns: vec![ColumnName("customer_id".into())],
            referenced_table: TableName("customers".into()),
            referenced_columns: vec![ColumnName("id".into())],
            deferrable: false,
        });
        t
    }

    #[test]
    fn primary_key_columns() {
        assert_eq!(sample_table().primary_key(), vec![ColumnName("id".into())]);
    }

    #[test]
    fn referenced_tables_skip_self_references() {
        let mut t = sample_table();
        t.constraints.push(Constraint::ForeignKey {
            name: None,
            columns: vec![ColumnName("parent_order".into())],
            referenced_table: TableName("ORDERS".into()),
            referenced_columns: vec![ColumnName("id".into())],
            deferrable: false,
        });
        assert_eq!(t.referenced_tables(), vec![TableName("customers".into())]);
    }

    #[test]
    fn plain_and_lob_split() {
        let t = sample_table();
        let plain: Vec<_> = t.plain_columns().iter().map(|c| c.name.0.clone()).collect();
        assert_eq!(plain, vec!["id", "customer_id"]);
        let lob: Vec<_> = t.lob_columns().iter().map(|c| c.name.0.clone()).collect();
        assert_eq!(lob, vec!["doc"]);
    }
}
