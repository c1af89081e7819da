use serde::{Deserialize, Serialize};
use std::fmt;

/// Newtype to avoid confusion between schema names
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaName(pub String);

/// Newtype for table names
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TableName(pub String);

/// Newtype for column names
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ColumnName(pub String);

impl TableName {
    /// Case-insensitive comparison; catalogs differ in case imprint.
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl fmt::Display for SchemaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ColumnName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A column reference qualified by its table, in `table.column` form.
/// Used as the key of the external type-override map and of the
/// exclude-columns set. Serializes as the `table.column` string so it
/// can key a JSON map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct QualifiedColumn {
    pub table: TableName,
    pub column: ColumnName,
}

impl serde::Serialize for QualifiedColumn {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for QualifiedColumn {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let spec = String::deserialize(deserializer)?;
        QualifiedColumn::parse(&spec).ok_or_else(|| {
            serde::de::Error::custom(format!("expected table.column, got '{spec}'"))
        })
    }
}

impl QualifiedColumn {
    pub fn new(table: &str, column: &str) -> Self {
        Self {
            table: TableName(table.to_string()),
            column: ColumnName(column.to_string()),
        }
    }

    /// Parse `table.column`; anything without exactly one dot is rejected.
    pub fn parse(spec: &str) -> Option<Self> {
        let (table, column) = spec.split_once('.')?;
        if table.is_empty() || column.is_empty() || column.contains('.') {
            return None;
        }
        Some(Self::new(table, column))
    }

    /// Case-insensitive match against a table/column pair.
    pub fn matches(&self, table: &str, column: &str) -> bool {
        self.table.0.eq_ignore_ascii_case(table) && self.column.0.eq_ignore_ascii_case(column)
    }
}

impl fmt::Display for QualifiedColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_column_parse() {
        let qc = QualifiedColumn::parse("persons.photo").unwrap();
        assert_eq!(qc.table.0, "persons");
        assert_eq!(qc.column.0, "photo");
        assert!(QualifiedColumn::parse("persons").is_none());
        assert!(QualifiedColumn::parse("a.b.c").is_none());
        assert!(QualifiedColumn::parse(".photo").is_none());
    }

    #[test]
    fn qualified_column_matches_case_insensitively() {
        let qc = QualifiedColumn::new("Persons", "Photo");
        assert!(qc.matches("persons", "PHOTO"));
        assert!(!qc.matches("persons", "name"));
    }

    #[test]
    fn table_name_matches() {
        assert!(TableName("Employees".into()).matches("EMPLOYEES"));
    }
}
