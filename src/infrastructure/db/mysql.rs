use crate::domain::engine::Engine;
use crate::domain::sql_type::SqlType;
use crate::infrastructure::db::adapter::{EngineAdapter, RowIdentifier, SessionToggle};

/// MySQL dialect.
///
/// Schemas are databases; `CREATE SCHEMA` takes no AUTHORIZATION clause.
/// There is no stable physical row id, so tables without a primary key
/// page over every column and cannot take the LOB path.
pub struct MysqlAdapter;

impl EngineAdapter for MysqlAdapter {
    fn engine(&self) -> Engine {
        Engine::Mysql
    }

    fn quote_ident(&self, s: &str) -> String {
        format!("`{}`", s.replace('`', "``"))
    }

    fn placeholder(&self, _idx: usize) -> String {
        "?".to_string()
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
             WHERE table_schema = '{schema}' ORDER BY 1"
        )
    }

    fn columns_sql(&self, schema: &str) -> String {
        // column_type (not data_type) keeps display width and UNSIGNED
        format!(
            "SELECT c.table_name, c.column_name, c.column_type, \
             c.character_maximum_length, c.numeric_precision, c.numeric_scale, \
             c.is_nullable, c.column_default, \
             CASE WHEN c.extra LIKE '%auto_increment%' THEN 'YES' ELSE 'NO' END \
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
             tc.table_name, kcu.column_name, \
             kcu.referenced_table_name, kcu.referenced_column_name, 'NO' \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON kcu.constraint_name = tc.constraint_name \
              AND kcu.table_schema = tc.table_schema \
              AND kcu.table_name = tc.table_name \
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
            "SELECT s.index_name, s.table_name, s.column_name, \
             CASE WHEN s.non_unique = 0 THEN 'YES' ELSE 'NO' END \
             FROM information_schema.statistics s \
             WHERE s.table_schema = '{schema}' AND s.index_name <> 'PRIMARY' \
             ORDER BY s.index_name, s.seq_in_index"
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
            "SELECT view_definition FROM information_schema.views \
             WHERE table_schema = '{schema}' AND table_name = '{view}'"
        )
    }

    fn paginated_select(
        &self,
        schema: &str,
        table: &str,
        columns: &[String],
        order_by: &[String],
        offset: u64,
        batch: u64,
    ) -> String {
        format!(
            "SELECT {} FROM {} ORDER BY {} LIMIT {} OFFSET {}",
            columns.join(", "),
            self.qualified(schema, table),
            order_by.join(", "),
            batch,
            offset
        )
    }

    fn physical_row_identifier(&self) -> Option<RowIdentifier> {
        None
    }

    fn select_expr(&self, column_quoted: &str, ty: &SqlType) -> String {
        // decimals, dates and friends come back as BLOB to the Any
        // driver regardless; converting to utf8mb4 at least guarantees
        // well-formed text bytes (binary families stay untouched)
        match ty {
            SqlType::Decimal { .. }
            | SqlType::Date
            | SqlType::Time
            | SqlType::Timestamp { .. }
            | SqlType::Xml
            | SqlType::Other(_) => {
                format!("CONVERT({column_quoted} USING utf8mb4) AS {column_quoted}")
            }
            _ => column_quoted.to_string(),
        }
    }

    fn session_restrictions(&self) -> Vec<SessionToggle> {
        vec![
            SessionToggle {
                name: "foreign_key_checks",
                probe_sql: Some("SELECT @@foreign_key_checks".to_string()),
                disable_sql: "SET FOREIGN_KEY_CHECKS = 0".to_string(),
                restore_default_sql: "SET FOREIGN_KEY_CHECKS = 1".to_string(),
                restore_template: Some("SET FOREIGN_KEY_CHECKS = {value}"),
            },
            SessionToggle {
                name: "unique_checks",
                probe_sql: Some("SELECT @@unique_checks".to_string()),
                disable_sql: "SET UNIQUE_CHECKS = 0".to_string(),
                restore_default_sql: "SET UNIQUE_CHECKS = 1".to_string(),
                restore_template: Some("SET UNIQUE_CHECKS = {value}"),
            },
            SessionToggle {
                name: "sql_log_bin",
                probe_sql: None,
                disable_sql: "SET sql_log_bin = 0".to_string(),
                restore_default_sql: "SET sql_log_bin = 1".to_string(),
                restore_template: None,
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
        let col = self.quote_ident(column);
        format!(
            "UPDATE {} SET {col} = CONCAT({col}, ?) WHERE {}",
            self.qualified(schema, table),
            key_predicates.join(" AND ")
        )
    }

    fn create_schema_sql(&self, schema: &str, _user: &str) -> String {
        // databases have no owner; AUTHORIZATION does not apply
        format!("CREATE SCHEMA {}", self.quote_ident(schema))
    }

    fn render_type(&self, ty: &SqlType) -> String {
        use SqlType::*;
        match ty {
            Bool => "TINYINT(1)".to_string(),
            Int { bytes, signed } => {
                let name = match bytes {
                    1 => "TINYINT",
                    2 => "SMALLINT",
                    3 => "MEDIUMINT",
                    4 => "INT",
                    _ => "BIGINT",
                };
                if *signed {
                    name.to_string()
                } else {
                    format!("{name} UNSIGNED")
                }
            }
            Decimal {
                precision: Some(p),
                scale,
            } => format!("DECIMAL({p},{})", scale.unwrap_or(0)),
            Decimal { .. } => "DECIMAL(65,10)".to_string(),
            Float { bytes: 4 } => "FLOAT".to_string(),
            Float { .. } => "DOUBLE".to_string(),
            Char(Some(n)) => format!("CHAR({n})"),
            Char(None) => "CHAR".to_string(),
            VarChar(Some(n)) => format!("VARCHAR({n})"),
            VarChar(None) | Text => "TEXT".to_string(),
            Binary(Some(n)) => format!("BINARY({n})"),
            Binary(None) => "BINARY".to_string(),
            VarBinary(Some(n)) => format!("VARBINARY({n})"),
            VarBinary(None) => "VARBINARY(255)".to_string(),
            Blob => "LONGBLOB".to_string(),
            Clob => "LONGTEXT".to_string(),
            Date => "DATE".to_string(),
            Time => "TIME".to_string(),
            Timestamp { tz: true } => "TIMESTAMP".to_string(),
            Timestamp { tz: false } => "DATETIME".to_string(),
            Xml => "LONGTEXT".to_string(),
            Other(s) => s.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::db::adapter::EngineAdapter;

    #[test]
    fn backtick_quoting() {
        assert_eq!(MysqlAdapter.quote_ident("my_table"), "`my_table`");
        assert_eq!(MysqlAdapter.quote_ident("ta`ble"), "`ta``ble`");
        assert_eq!(MysqlAdapter.placeholder(5), "?");
    }

    #[test]
    fn pagination_uses_limit_offset() {
        let sql = MysqlAdapter.paginated_select(
            "shop",
            "orders",
            &["`id`".into()],
            &["`id`".into()],
            30,
            10,
        );
        assert_eq!(
            sql,
            "SELECT `id` FROM `shop`.`orders` ORDER BY `id` LIMIT 10 OFFSET 30"
        );
    }

    #[test]
    fn no_physical_row_identifier() {
        assert!(MysqlAdapter.physical_row_identifier().is_none());
    }

    #[test]
    fn create_schema_has_no_authorization() {
        assert_eq!(
            MysqlAdapter.create_schema_sql("shop", "admin"),
            "CREATE SCHEMA `shop`"
        );
    }

    #[test]
    fn lob_append_uses_concat() {
        let sql =
            MysqlAdapter.lob_write_append("shop", "docs", "body", &["`id` = ?".into()], false);
        assert_eq!(
            sql,
            "UPDATE `shop`.`docs` SET `body` = CONCAT(`body`, ?) WHERE `id` = ?"
        );
    }

    #[test]
    fn render_unsigned_and_lobs() {
        assert_eq!(
            MysqlAdapter.render_type(&SqlType::Int {
                bytes: 4,
                signed: false
            }),
            "INT UNSIGNED"
        );
        assert_eq!(MysqlAdapter.render_type(&SqlType::Blob), "LONGBLOB");
        assert_eq!(MysqlAdapter.render_type(&SqlType::Clob), "LONGTEXT");
    }

    #[test]
    fn select_expr_converts_decimals_not_blobs() {
        let d = MysqlAdapter;
        let dec = SqlType::Decimal {
            precision: Some(10),
            scale: Some(2),
        };
        assert_eq!(
            d.select_expr("`price`", &dec),
            "CONVERT(`price` USING utf8mb4) AS `price`"
        );
        assert_eq!(d.select_expr("`photo`", &SqlType::Blob), "`photo`");
    }

    #[test]
    fn session_toggles_cover_fk_unique_binlog() {
        let names: Vec<_> = MysqlAdapter
            .session_restrictions()
            .iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["foreign_key_checks", "unique_checks", "sql_log_bin"]);
    }
}
