use crate::domain::engine::Engine;
use crate::domain::sql_type::SqlType;
use crate::infrastructure::db::adapter::{
    EngineAdapter, RowIdentifier, SessionToggle, TableToggle,
};

/// SQL Server dialect.
///
/// Identifiers are bracket-quoted. Referential gating is table-level
/// (`NOCHECK CONSTRAINT`), so the session-toggle list is empty and the
/// per-table toggles do the work. View scripts come back as complete
/// CREATE statements from `sys.sql_modules`.
pub struct SqlServerAdapter;

impl EngineAdapter for SqlServerAdapter {
    fn engine(&self) -> Engine {
        Engine::SqlServer
    }

    fn quote_ident(&self, s: &str) -> String {
        format!("[{}]", s.replace(']', "]]"))
    }

    fn placeholder(&self, idx: usize) -> String {
        format!("@P{idx}")
    }

    fn list_schemas_sql(&self) -> String {
        "SELECT name FROM sys.schemas ORDER BY name".to_string()
    }

    fn list_tables_sql(&self, schema: &str) -> String {
        format!(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = '{schema}' AND table_type = 'BASE TABLE' \
             ORDER BY table_name"
        )
    }

    fn list_views_sql(&self, schema: &str) -> String {
        // no materialized views on SQL Server (indexed views are still plain)
        format!(
            "SELECT table_name, 'P' FROM information_schema.views \
             WHERE table_schema = '{schema}' ORDER BY 1"
        )
    }

    fn columns_sql(&self, schema: &str) -> String {
        format!(
            "SELECT c.table_name, c.column_name, c.data_type, \
             c.character_maximum_length, c.numeric_precision, c.numeric_scale, \
             c.is_nullable, c.column_default, \
             CASE WHEN COLUMNPROPERTY(OBJECT_ID(c.table_schema + '.' + c.table_name), \
                                      c.column_name, 'IsIdentity') = 1 \
                  THEN 'YES' ELSE 'NO' END \
             FROM information_schema.columns c \
             WHERE c.table_schema = '{schema}' \
             ORDER BY c.table_name, c.ordinal_position"
        )
    }

    fn key_constraints_sql(&self, schema: &str) -> String {
        format!(
            "SELECT tc.constraint_name, \
             CASE tc.constraint_type WHEN 'PRIMARY KEY' THEN 'P' \
                  WHEN 'FOREIGN KEY' THEN 'R' ELSE 'U' END, \
             tc.table_name, kcu.column_name, kcu2.table_name, kcu2.column_name, 'NO' \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON kcu.constraint_name = tc.constraint_name \
              AND kcu.constraint_schema = tc.constraint_schema \
             LEFT JOIN information_schema.referential_constraints rc \
               ON rc.constraint_name = tc.constraint_name \
              AND rc.constraint_schema = tc.constraint_schema \
             LEFT JOIN information_schema.key_column_usage kcu2 \
               ON kcu2.constraint_name = rc.unique_constraint_name \
              AND kcu2.constraint_schema = rc.unique_constraint_schema \
              AND kcu2.ordinal_position = kcu.ordinal_position \
             WHERE tc.table_schema = '{schema}' \
               AND tc.constraint_type IN ('PRIMARY KEY', 'FOREIGN KEY', 'UNIQUE') \
             ORDER BY tc.table_name, tc.constraint_name, kcu.ordinal_position"
        )
    }

    fn check_constraints_sql(&self, schema: &str) -> String {
        format!(
            "SELECT cc.constraint_name, tc.table_name, cc.check_clause \
             FROM information_schema.check_constraints cc \
             JOIN information_schema.table_constraints tc \
               ON tc.constraint_name = cc.constraint_name \
              AND tc.constraint_schema = cc.constraint_schema \
             WHERE tc.table_schema = '{schema}' AND tc.constraint_type = 'CHECK' \
             ORDER BY tc.table_name, cc.constraint_name"
        )
    }

    fn indexes_sql(&self, schema: &str) -> String {
        format!(
            "SELECT i.name, t.name, c.name, \
             CASE WHEN i.is_unique = 1 THEN 'YES' ELSE 'NO' END \
             FROM sys.indexes i \
             JOIN sys.tables t ON t.object_id = i.object_id \
             JOIN sys.schemas s ON s.schema_id = t.schema_id \
             JOIN sys.index_columns icol \
               ON icol.object_id = i.object_id AND icol.index_id = i.index_id \
             JOIN sys.columns c \
               ON c.object_id = t.object_id AND c.column_id = icol.column_id \
             WHERE s.name = '{schema}' AND i.type > 0 \
               AND i.is_primary_key = 0 AND i.is_unique_constraint = 0 \
             ORDER BY i.name, icol.key_ordinal"
        )
    }

    fn table_exists_sql(&self, schema: &str, table: &str) -> String {
        format!(
            "SELECT 1 FROM information_schema.tables \
             WHERE table_schema = '{schema}' AND table_name = '{table}'"
        )
    }

    fn view_script_sql(&self, schema: &str, view: &str, _materialized: bool) -> String {
        format!(
            "SELECT sm.definition FROM sys.sql_modules sm \
             JOIN sys.views v ON v.object_id = sm.object_id \
             JOIN sys.schemas s ON s.schema_id = v.schema_id \
             WHERE s.name = '{schema}' AND v.name = '{view}'"
        )
    }

    fn view_script_is_full_create(&self) -> bool {
        true
    }

    fn physical_row_identifier(&self) -> Option<RowIdentifier> {
        Some(RowIdentifier {
            select_expr: "%%physloc%%",
            predicate: "%%physloc%% = {p}",
        })
    }

    fn session_restrictions(&self) -> Vec<SessionToggle> {
        // referential gating on SQL Server is per table (NOCHECK)
        Vec::new()
    }

    fn table_restrictions(&self, schema: &str, table: &str) -> Vec<TableToggle> {
        vec![TableToggle {
            disable_sql: format!(
                "ALTER TABLE {} NOCHECK CONSTRAINT ALL",
                self.qualified(schema, table)
            ),
            restore_sql: format!(
                "ALTER TABLE {} WITH CHECK CHECK CONSTRAINT ALL",
                self.qualified(schema, table)
            ),
        }]
    }

    fn lob_chunk_select(
        &self,
        schema: &str,
        table: &str,
        column: &str,
        key_predicates: &[String],
        offset: u64,
        length: u64,
    ) -> String {
        format!(
            "SELECT SUBSTRING({}, {}, {}) FROM {} WHERE {}",
            self.quote_ident(column),
            offset + 1,
            length,
            self.qualified(schema, table),
            key_predicates.join(" AND ")
        )
    }

    fn lob_write_append(
        &self,
        schema: &str,
        table: &str,
        column: &str,
        key_predicates: &[String],
        _binary: bool,
    ) -> String {
        // .WRITE with NULL offset appends to a (MAX)-typed column
        format!(
            "UPDATE {} SET {}.WRITE(@P1, NULL, 0) WHERE {}",
            self.qualified(schema, table),
            self.quote_ident(column),
            key_predicates.join(" AND ")
        )
    }

    fn render_type(&self, ty: &SqlType) -> String {
        use SqlType::*;
        match ty {
            Bool => "BIT".to_string(),
            Int { bytes, signed } => match (*bytes, *signed) {
                (1, false) => "TINYINT".to_string(),
                (1, true) | (2, true) => "SMALLINT".to_string(),
                (2, false) | (3, true) | (4, true) => "INT".to_string(),
                // unsigned 8-byte has no wider home; clamp to the widest
                _ => "BIGINT".to_string(),
            },
            Decimal {
                precision: Some(p),
                scale,
            } => format!("NUMERIC({p},{})", scale.unwrap_or(0)),
            Decimal { .. } => "NUMERIC(38,10)".to_string(),
            Float { bytes: 4 } => "REAL".to_string(),
            Float { .. } => "FLOAT".to_string(),
            Char(Some(n)) => format!("CHAR({n})"),
            Char(None) => "CHAR".to_string(),
            VarChar(Some(n)) => format!("VARCHAR({n})"),
            VarChar(None) | Text => "VARCHAR(MAX)".to_string(),
            Binary(Some(n)) => format!("BINARY({n})"),
            Binary(None) => "BINARY".to_string(),
            VarBinary(Some(n)) => format!("VARBINARY({n})"),
            VarBinary(None) | Blob => "VARBINARY(MAX)".to_string(),
            Clob => "NVARCHAR(MAX)".to_string(),
            Date => "DATE".to_string(),
            Time => "TIME".to_string(),
            Timestamp { tz: true } => "DATETIMEOFFSET".to_string(),
            Timestamp { tz: false } => "DATETIME2".to_string(),
            Xml => "XML".to_string(),
            Other(s) => s.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::db::adapter::EngineAdapter;

    #[test]
    fn brackets_quote_identifiers() {
        assert_eq!(SqlServerAdapter.quote_ident("dbo"), "[dbo]");
        assert_eq!(SqlServerAdapter.quote_ident("we]ird"), "[we]]ird]");
        assert_eq!(SqlServerAdapter.placeholder(1), "@P1");
    }

    #[test]
    fn table_toggles_use_nocheck() {
        let toggles = SqlServerAdapter.table_restrictions("dbo", "orders");
        assert_eq!(
            toggles[0].disable_sql,
            "ALTER TABLE [dbo].[orders] NOCHECK CONSTRAINT ALL"
        );
        assert!(toggles[0].restore_sql.contains("WITH CHECK CHECK CONSTRAINT ALL"));
    }

    #[test]
    fn session_toggles_empty() {
        assert!(SqlServerAdapter.session_restrictions().is_empty());
    }

    #[test]
    fn lob_append_uses_dot_write() {
        let sql = SqlServerAdapter.lob_write_append(
            "dbo",
            "persons",
            "photo",
            &["[id] = @P2".into()],
            true,
        );
        assert_eq!(
            sql,
            "UPDATE [dbo].[persons] SET [photo].WRITE(@P1, NULL, 0) WHERE [id] = @P2"
        );
    }

    #[test]
    fn view_scripts_are_full_creates() {
        assert!(SqlServerAdapter.view_script_is_full_create());
        assert!(SqlServerAdapter
            .view_script_sql("dbo", "v_active", false)
            .contains("sys.sql_modules"));
    }

    #[test]
    fn render_unsigned_widths() {
        assert_eq!(
            SqlServerAdapter.render_type(&SqlType::Int {
                bytes: 1,
                signed: false
            }),
            "TINYINT"
        );
        assert_eq!(
            SqlServerAdapter.render_type(&SqlType::Int {
                bytes: 4,
                signed: false
            }),
            "BIGINT"
        );
        assert_eq!(
            SqlServerAdapter.render_type(&SqlType::Blob),
            "VARBINARY(MAX)"
        );
    }
}
