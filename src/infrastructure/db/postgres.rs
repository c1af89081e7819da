use crate::domain::engine::Engine;
use crate::domain::sql_type::SqlType;
use crate::infrastructure::db::adapter::{EngineAdapter, RowIdentifier, SessionToggle};

/// PostgreSQL dialect.
///
/// Catalog access goes through `information_schema` plus `pg_matviews`
/// for materialized views (which information_schema does not list).
pub struct PostgresAdapter;

/// Types that cross the driver boundary as text rather than a native
/// bind, needing `::TEXT` on the way out and a CAST on the way in.
fn text_bound(ty: &SqlType) -> bool {
    matches!(
        ty,
        SqlType::Decimal { .. }
            | SqlType::Date
            | SqlType::Time
            | SqlType::Timestamp { .. }
            | SqlType::Xml
            | SqlType::Other(_)
    )
}

impl EngineAdapter for PostgresAdapter {
    fn engine(&self) -> Engine {
        Engine::Postgres
    }

    fn quote_ident(&self, s: &str) -> String {
        format!("\"{}\"", s.replace('"', "\"\""))
    }

    fn placeholder(&self, idx: usize) -> String {
        format!("${idx}")
    }

    fn list_schemas_sql(&self) -> String {
        "SELECT schema_name FROM information_schema.schemata ORDER BY schema_name".to_string()
    }

    fn list_tables_sql(&self, schema: &str) -> String {
        format!(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = '{schema}' AND table_type = 'BASE TABLE' \
             ORDER BY table_name"
        )
    }

    fn list_views_sql(&self, schema: &str) -> String {
        format!(
            "SELECT table_name, 'P' FROM information_schema.views \
             WHERE table_schema = '{schema}' \
             UNION ALL \
             SELECT matviewname, 'M' FROM pg_matviews WHERE schemaname = '{schema}' \
             ORDER BY 1"
        )
    }

    fn columns_sql(&self, schema: &str) -> String {
        format!(
            "SELECT c.table_name, c.column_name, c.data_type, \
             c.character_maximum_length, c.numeric_precision, c.numeric_scale, \
             c.is_nullable, c.column_default, c.is_identity \
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
             tc.table_name, kcu.column_name, ccu.table_name, ccu.column_name, \
             tc.is_deferrable \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON kcu.constraint_name = tc.constraint_name \
              AND kcu.constraint_schema = tc.constraint_schema \
             LEFT JOIN information_schema.constraint_column_usage ccu \
               ON ccu.constraint_name = tc.constraint_name \
              AND ccu.constraint_schema = tc.constraint_schema \
              AND tc.constraint_type = 'FOREIGN KEY' \
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
             WHERE tc.table_schema = '{schema}' \
               AND tc.constraint_type = 'CHECK' \
               AND cc.check_clause NOT LIKE '%IS NOT NULL%' \
             ORDER BY tc.table_name, cc.constraint_name"
        )
    }

    fn indexes_sql(&self, schema: &str) -> String {
        // pg_indexes has no per-column rows; unnest the index key columns.
        format!(
            "SELECT i.relname, t.relname, a.attname, \
             CASE WHEN ix.indisunique THEN 'YES' ELSE 'NO' END \
             FROM pg_index ix \
             JOIN pg_class i ON i.oid = ix.indexrelid \
             JOIN pg_class t ON t.oid = ix.indrelid \
             JOIN pg_namespace n ON n.oid = t.relnamespace \
             JOIN pg_attribute a ON a.attrelid = t.oid \
              AND a.attnum = ANY(ix.indkey) \
             WHERE n.nspname = '{schema}' \
               AND NOT ix.indisprimary \
               AND ix.indexrelid NOT IN \
                   (SELECT conindid FROM pg_constraint WHERE contype IN ('u', 'p')) \
             ORDER BY i.relname, array_position(ix.indkey, a.attnum)"
        )
    }

    fn table_exists_sql(&self, schema: &str, table: &str) -> String {
        format!(
            "SELECT 1 FROM information_schema.tables \
             WHERE table_schema = '{schema}' AND table_name = '{table}'"
        )
    }

    fn view_script_sql(&self, schema: &str, view: &str, materialized: bool) -> String {
        if materialized {
            format!(
                "SELECT definition FROM pg_matviews \
                 WHERE schemaname = '{schema}' AND matviewname = '{view}'"
            )
        } else {
            format!(
                "SELECT view_definition FROM information_schema.views \
                 WHERE table_schema = '{schema}' AND table_name = '{view}'"
            )
        }
    }

    fn physical_row_identifier(&self) -> Option<RowIdentifier> {
        Some(RowIdentifier {
            select_expr: "ctid::text",
            predicate: "ctid = {p}::tid",
        })
    }

    fn select_expr(&self, column_quoted: &str, ty: &SqlType) -> String {
        // types the Any driver cannot decode travel as text
        if text_bound(ty) {
            format!("{column_quoted}::TEXT AS {column_quoted}")
        } else {
            column_quoted.to_string()
        }
    }

    fn insert_expr(&self, idx: usize, ty: &SqlType) -> String {
        if text_bound(ty) {
            format!("CAST({} AS {})", self.placeholder(idx), self.render_type(ty))
        } else {
            self.placeholder(idx)
        }
    }

    fn session_restrictions(&self) -> Vec<SessionToggle> {
        vec![
            // replica role suspends FK/trigger enforcement for the session
            SessionToggle {
                name: "session_replication_role",
                probe_sql: Some("SHOW session_replication_role".to_string()),
                disable_sql: "SET session_replication_role = replica".to_string(),
                restore_default_sql: "SET session_replication_role = origin".to_string(),
                restore_template: Some("SET session_replication_role = {value}"),
            },
            SessionToggle {
                name: "synchronous_commit",
                probe_sql: Some("SHOW synchronous_commit".to_string()),
                disable_sql: "SET synchronous_commit = off".to_string(),
                restore_default_sql: "SET synchronous_commit = on".to_string(),
                restore_template: Some("SET synchronous_commit = {value}"),
            },
        ]
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
            "SELECT substring({} FROM {} FOR {}) FROM {} WHERE {}",
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
        let col = self.quote_ident(column);
        format!(
            "UPDATE {} SET {col} = {col} || $1 WHERE {}",
            self.qualified(schema, table),
            key_predicates.join(" AND ")
        )
    }

    fn supports_deferrable_constraints(&self) -> bool {
        true
    }

    fn render_type(&self, ty: &SqlType) -> String {
        use SqlType::*;
        match ty {
            Bool => "BOOLEAN".to_string(),
            Int { bytes, signed } => {
                // Postgres has no unsigned ints; widen to keep the domain
                let effective = if *signed { *bytes } else { bytes + 1 };
                match effective {
                    0..=2 => "SMALLINT",
                    3..=4 => "INTEGER",
                    _ => "BIGINT",
                }
                .to_string()
            }
            Decimal {
                precision: Some(p),
                scale,
            } => format!("NUMERIC({p},{})", scale.unwrap_or(0)),
            Decimal { .. } => "NUMERIC".to_string(),
            Float { bytes: 4 } => "REAL".to_string(),
            Float { .. } => "DOUBLE PRECISION".to_string(),
            Char(Some(n)) => format!("CHAR({n})"),
            Char(None) => "CHAR".to_string(),
            VarChar(Some(n)) => format!("VARCHAR({n})"),
            VarChar(None) | Text => "TEXT".to_string(),
            Binary(_) | VarBinary(_) | Blob => "BYTEA".to_string(),
            Clob => "TEXT".to_string(),
            Date => "DATE".to_string(),
            Time => "TIME".to_string(),
            Timestamp { tz: true } => "TIMESTAMP WITH TIME ZONE".to_string(),
            Timestamp { tz: false } => "TIMESTAMP".to_string(),
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
    fn quote_and_placeholder() {
        let d = PostgresAdapter;
        assert_eq!(d.quote_ident("my_table"), r#""my_table""#);
        assert_eq!(d.quote_ident(r#"ta"ble"#), r#""ta""ble""#);
        assert_eq!(d.placeholder(3), "$3");
    }

    #[test]
    fn paginated_select_uses_offset_fetch() {
        let d = PostgresAdapter;
        let sql = d.paginated_select(
            "hr",
            "persons",
            &[r#""id""#.into(), r#""name""#.into()],
            &[r#""id""#.into()],
            20,
            10,
        );
        assert_eq!(
            sql,
            r#"SELECT "id", "name" FROM "hr"."persons" ORDER BY "id" OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"#
        );
    }

    #[test]
    fn lob_chunk_select_is_one_based() {
        let d = PostgresAdapter;
        let sql = d.lob_chunk_select("hr", "persons", "photo", &[r#""id" = $1"#.into()], 0, 1024);
        assert!(sql.contains("substring(\"photo\" FROM 1 FOR 1024)"));
        assert!(sql.ends_with(r#"WHERE "id" = $1"#));
    }

    #[test]
    fn lob_append_concatenates() {
        let d = PostgresAdapter;
        let sql = d.lob_write_append("hr", "persons", "photo", &[r#""id" = $2"#.into()], true);
        assert_eq!(
            sql,
            r#"UPDATE "hr"."persons" SET "photo" = "photo" || $1 WHERE "id" = $2"#
        );
    }

    #[test]
    fn unsigned_ints_widen() {
        let d = PostgresAdapter;
        assert_eq!(
            d.render_type(&SqlType::Int {
                bytes: 4,
                signed: false
            }),
            "BIGINT"
        );
        assert_eq!(
            d.render_type(&SqlType::Int {
                bytes: 4,
                signed: true
            }),
            "INTEGER"
        );
    }

    #[test]
    fn lob_types_render_to_postgres_canonicals() {
        let d = PostgresAdapter;
        assert_eq!(d.render_type(&SqlType::Blob), "BYTEA");
        assert_eq!(d.render_type(&SqlType::Clob), "TEXT");
    }

    #[test]
    fn select_expr_casts_nonnative_types_to_text() {
        let d = PostgresAdapter;
        let numeric = SqlType::Decimal {
            precision: Some(9),
            scale: Some(2),
        };
        assert_eq!(
            d.select_expr(r#""price""#, &numeric),
            r#""price"::TEXT AS "price""#
        );
        let int4 = SqlType::Int {
            bytes: 4,
            signed: true,
        };
        assert_eq!(d.select_expr(r#""id""#, &int4), r#""id""#);
        assert_eq!(d.select_expr(r#""photo""#, &SqlType::Blob), r#""photo""#);
    }

    #[test]
    fn session_toggles_are_probed() {
        let toggles = PostgresAdapter.session_restrictions();
        assert_eq!(toggles.len(), 2);
        assert!(toggles.iter().all(|t| t.probe_sql.is_some()));
    }

    #[test]
    fn catalog_queries_name_the_schema() {
        let d = PostgresAdapter;
        assert!(d.list_tables_sql("hr").contains("table_schema = 'hr'"));
        assert!(d.list_views_sql("hr").contains("pg_matviews"));
        assert!(d.columns_sql("hr").contains("ordinal_position"));
        assert!(d.key_constraints_sql("hr").contains("'PRIMARY KEY'"));
    }
}
