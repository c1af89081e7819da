use crate::domain::engine::Engine;
use crate::domain::sql_type::SqlType;
use crate::infrastructure::db::adapter::{
    EngineAdapter, RowIdentifier, SessionToggle, TableToggle,
};

/// Oracle dialect.
///
/// Schemas are owners in the `ALL_*` catalog views. `DROP TABLE IF
/// EXISTS` is unavailable, so the materializer probes the catalog before
/// dropping. LOB appends go through `DBMS_LOB.WRITEAPPEND`, whose buffer
/// bind tops out at 32767 bytes — the adapter advertises that ceiling
/// and the mover clamps the configured chunk size to it.
pub struct OracleAdapter;

impl EngineAdapter for OracleAdapter {
    fn engine(&self) -> Engine {
        Engine::Oracle
    }

    fn quote_ident(&self, s: &str) -> String {
        format!("\"{}\"", s.replace('"', "\"\""))
    }

    fn placeholder(&self, idx: usize) -> String {
        format!(":{idx}")
    }

    fn list_schemas_sql(&self) -> String {
        "SELECT username FROM all_users ORDER BY username".to_string()
    }

    fn list_tables_sql(&self, schema: &str) -> String {
        // materialized-view container tables also show up in ALL_TABLES
        format!(
            "SELECT table_name FROM all_tables WHERE owner = '{schema}' \
             AND table_name NOT IN \
                 (SELECT mview_name FROM all_mviews WHERE owner = '{schema}') \
             ORDER BY table_name"
        )
    }

    fn list_views_sql(&self, schema: &str) -> String {
        format!(
            "SELECT view_name, 'P' FROM all_views WHERE owner = '{schema}' \
             UNION ALL \
             SELECT mview_name, 'M' FROM all_mviews WHERE owner = '{schema}' \
             ORDER BY 1"
        )
    }

    fn columns_sql(&self, schema: &str) -> String {
        format!(
            "SELECT c.table_name, c.column_name, c.data_type, \
             CASE WHEN c.data_type IN ('CHAR', 'NCHAR', 'VARCHAR2', 'NVARCHAR2') \
                  THEN c.char_length \
                  WHEN c.data_type = 'RAW' THEN c.data_length \
                  ELSE NULL END, \
             c.data_precision, c.data_scale, \
             DECODE(c.nullable, 'Y', 'YES', 'NO'), \
             c.data_default, \
             NVL2(ic.column_name, 'YES', 'NO') \
             FROM all_tab_columns c \
             LEFT JOIN all_tab_identity_cols ic \
               ON ic.owner = c.owner AND ic.table_name = c.table_name \
              AND ic.column_name = c.column_name \
             WHERE c.owner = '{schema}' \
             ORDER BY c.table_name, c.column_id"
        )
    }

    fn key_constraints_sql(&self, schema: &str) -> String {
        format!(
            "SELECT ac.constraint_name, ac.constraint_type, ac.table_name, \
             acc.column_name, rc.table_name, rcc.column_name, \
             DECODE(ac.deferrable, 'DEFERRABLE', 'YES', 'NO') \
             FROM all_constraints ac \
             JOIN all_cons_columns acc \
               ON acc.owner = ac.owner AND acc.constraint_name = ac.constraint_name \
             LEFT JOIN all_constraints rc \
               ON rc.owner = ac.r_owner AND rc.constraint_name = ac.r_constraint_name \
             LEFT JOIN all_cons_columns rcc \
               ON rcc.owner = rc.owner AND rcc.constraint_name = rc.constraint_name \
              AND rcc.position = acc.position \
             WHERE ac.owner = '{schema}' AND ac.constraint_type IN ('P', 'R', 'U') \
             ORDER BY ac.table_name, ac.constraint_name, acc.position"
        )
    }

    fn check_constraints_sql(&self, schema: &str) -> String {
        // NOT NULL constraints surface as generated checks; skip them
        format!(
            "SELECT ac.constraint_name, ac.table_name, ac.search_condition_vc \
             FROM all_constraints ac \
             WHERE ac.owner = '{schema}' AND ac.constraint_type = 'C' \
               AND ac.search_condition_vc NOT LIKE '%IS NOT NULL' \
             ORDER BY ac.table_name, ac.constraint_name"
        )
    }

    fn indexes_sql(&self, schema: &str) -> String {
        format!(
            "SELECT ic.index_name, ic.table_name, ic.column_name, \
             DECODE(ix.uniqueness, 'UNIQUE', 'YES', 'NO') \
             FROM all_ind_columns ic \
             JOIN all_indexes ix \
               ON ix.owner = ic.index_owner AND ix.index_name = ic.index_name \
             WHERE ic.table_owner = '{schema}' \
               AND NOT EXISTS (SELECT 1 FROM all_constraints c \
                               WHERE c.owner = '{schema}' \
                                 AND c.index_name = ix.index_name) \
             ORDER BY ic.index_name, ic.column_position"
        )
    }

    fn table_exists_sql(&self, schema: &str, table: &str) -> String {
        format!("SELECT 1 FROM all_tables WHERE owner = '{schema}' AND table_name = '{table}'")
    }

    fn view_script_sql(&self, schema: &str, view: &str, materialized: bool) -> String {
        if materialized {
            format!("SELECT query FROM all_mviews WHERE owner = '{schema}' AND mview_name = '{view}'")
        } else {
            format!("SELECT text FROM all_views WHERE owner = '{schema}' AND view_name = '{view}'")
        }
    }

    fn physical_row_identifier(&self) -> Option<RowIdentifier> {
        Some(RowIdentifier {
            select_expr: "ROWIDTOCHAR(rowid)",
            predicate: "rowid = CHARTOROWID({p})",
        })
    }

    fn session_restrictions(&self) -> Vec<SessionToggle> {
        vec![
            SessionToggle {
                name: "constraints",
                probe_sql: None,
                disable_sql: "ALTER SESSION SET CONSTRAINTS = DEFERRED".to_string(),
                restore_default_sql: "ALTER SESSION SET CONSTRAINTS = IMMEDIATE".to_string(),
                restore_template: None,
            },
            SessionToggle {
                name: "commit_logging",
                probe_sql: None,
                disable_sql: "ALTER SESSION SET COMMIT_LOGGING = BATCH".to_string(),
                restore_default_sql: "ALTER SESSION SET COMMIT_LOGGING = IMMEDIATE".to_string(),
                restore_template: None,
            },
        ]
    }

    fn table_restrictions(&self, schema: &str, table: &str) -> Vec<TableToggle> {
        vec![TableToggle {
            disable_sql: format!("ALTER TABLE {} NOLOGGING", self.qualified(schema, table)),
            restore_sql: format!("ALTER TABLE {} LOGGING", self.qualified(schema, table)),
        }]
    }

    fn lob_chunk_ceiling(&self) -> Option<u64> {
        Some(32_767)
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
            "SELECT DBMS_LOB.SUBSTR({}, {}, {}) FROM {} WHERE {}",
            self.quote_ident(column),
            length,
            offset + 1,
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
        binary: bool,
    ) -> String {
        // the buffer bind comes first in the block so positional binding
        // lines up with the (chunk, keys...) parameter order
        let (buf_type, lob_type, len_expr) = if binary {
            ("RAW(32767)", "BLOB", "UTL_RAW.LENGTH(buf)")
        } else {
            ("VARCHAR2(32767)", "CLOB", "LENGTH(buf)")
        };
        format!(
            "DECLARE buf {buf_type} := :1; l {lob_type}; BEGIN \
             SELECT {} INTO l FROM {} WHERE {} FOR UPDATE; \
             DBMS_LOB.WRITEAPPEND(l, {len_expr}, buf); \
             END;",
            self.quote_ident(column),
            self.qualified(schema, table),
            key_predicates.join(" AND ")
        )
    }

    fn supports_drop_if_exists(&self) -> bool {
        false
    }

    fn supports_deferrable_constraints(&self) -> bool {
        true
    }

    fn render_type(&self, ty: &SqlType) -> String {
        use SqlType::*;
        match ty {
            Bool => "NUMBER(1)".to_string(),
            Int { bytes, .. } => match bytes {
                0..=2 => "NUMBER(5)",
                3..=4 => "NUMBER(10)",
                _ => "NUMBER(19)",
            }
            .to_string(),
            Decimal {
                precision: Some(p),
                scale,
            } => format!("NUMBER({p},{})", scale.unwrap_or(0)),
            Decimal { .. } => "NUMBER".to_string(),
            Float { bytes: 4 } => "BINARY_FLOAT".to_string(),
            Float { .. } => "BINARY_DOUBLE".to_string(),
            Char(Some(n)) => format!("CHAR({n})"),
            Char(None) => "CHAR".to_string(),
            VarChar(Some(n)) => format!("VARCHAR2({n})"),
            VarChar(None) => "VARCHAR2(4000)".to_string(),
            Text | Clob => "CLOB".to_string(),
            Binary(Some(n)) | VarBinary(Some(n)) => format!("RAW({n})"),
            Binary(None) | VarBinary(None) => "RAW(2000)".to_string(),
            Blob => "BLOB".to_string(),
            Date => "DATE".to_string(),
            // Oracle has no bare TIME type
            Time | Timestamp { tz: false } => "TIMESTAMP".to_string(),
            Timestamp { tz: true } => "TIMESTAMP WITH TIME ZONE".to_string(),
            Xml => "XMLTYPE".to_string(),
            Other(s) => s.clone(),
        }
    }

    fn strip_view_clauses(&self, script: String) -> String {
        script
            .replace("FORCE EDITIONABLE ", "")
            .replace("force editionable ", "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::db::adapter::EngineAdapter;

    #[test]
    fn placeholders_are_numbered_colons() {
        assert_eq!(OracleAdapter.placeholder(2), ":2");
    }

    #[test]
    fn paginated_select_orders_by_rowid_key() {
        let sql = OracleAdapter.paginated_select(
            "HR",
            "PERSONS",
            &["\"ID\"".into()],
            &["rowid".into()],
            0,
            1000,
        );
        assert!(sql.contains("ORDER BY rowid OFFSET 0 ROWS FETCH NEXT 1000 ROWS ONLY"));
    }

    #[test]
    fn drop_table_has_no_if_exists() {
        let sql = OracleAdapter.drop_table_sql("HR", "PERSONS");
        assert_eq!(sql, r#"DROP TABLE "HR"."PERSONS""#);
    }

    #[test]
    fn lob_chunk_select_uses_dbms_lob() {
        let sql = OracleAdapter.lob_chunk_select(
            "HR",
            "PERSONS",
            "PHOTO",
            &[r#""ID" = :1"#.into()],
            4096,
            1024,
        );
        assert!(sql.contains("DBMS_LOB.SUBSTR(\"PHOTO\", 1024, 4097)"));
    }

    #[test]
    fn binary_append_goes_through_writeappend() {
        let sql = OracleAdapter.lob_write_append(
            "HR",
            "PERSONS",
            "PHOTO",
            &[r#""ID" = :2"#.into()],
            true,
        );
        // chunk bind appears before the key bind for positional drivers
        assert!(sql.starts_with("DECLARE buf RAW(32767) := :1; l BLOB;"));
        assert!(sql.contains("DBMS_LOB.WRITEAPPEND(l, UTL_RAW.LENGTH(buf), buf)"));
        assert!(sql.contains("FOR UPDATE"));
        assert!(sql.find(":1").unwrap() < sql.find(":2").unwrap());
    }

    #[test]
    fn chunk_ceiling_matches_writeappend_buffer() {
        assert_eq!(OracleAdapter.lob_chunk_ceiling(), Some(32_767));
    }

    #[test]
    fn table_toggle_is_nologging() {
        let toggles = OracleAdapter.table_restrictions("HR", "PERSONS");
        assert_eq!(toggles[0].disable_sql, r#"ALTER TABLE "HR"."PERSONS" NOLOGGING"#);
        assert_eq!(toggles[0].restore_sql, r#"ALTER TABLE "HR"."PERSONS" LOGGING"#);
    }

    #[test]
    fn render_decimal_and_varchar() {
        assert_eq!(
            OracleAdapter.render_type(&SqlType::Decimal {
                precision: Some(20),
                scale: Some(0)
            }),
            "NUMBER(20,0)"
        );
        assert_eq!(
            OracleAdapter.render_type(&SqlType::VarChar(Some(100))),
            "VARCHAR2(100)"
        );
    }

    #[test]
    fn strip_force_editionable() {
        let script = "CREATE OR REPLACE FORCE EDITIONABLE VIEW \"HR\".\"V\" AS SELECT 1 FROM DUAL".to_string();
        let stripped = OracleAdapter.strip_view_clauses(script);
        assert!(!stripped.contains("FORCE EDITIONABLE"));
    }
}
