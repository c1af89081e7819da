use crate::domain::engine::Engine;
use crate::domain::sql_type::SqlType;
use crate::domain::table::{Constraint, IndexDescriptor, TableDescriptor};

use crate::infrastructure::db::mysql::MysqlAdapter;
use crate::infrastructure::db::oracle::OracleAdapter;
use crate::infrastructure::db::postgres::PostgresAdapter;
use crate::infrastructure::db::sqlserver::SqlServerAdapter;

/// A session-level safety feature relaxed around the bulk data phase.
///
/// When `probe_sql` is present the mover captures the current value
/// before disabling and restores it through `restore_template`
/// (`{value}` is replaced); otherwise `restore_default_sql` is used.
/// Both directions are idempotent plain statements.
#[derive(Debug, Clone)]
pub struct SessionToggle {
    pub name: &'static str,
    pub probe_sql: Option<String>,
    pub disable_sql: String,
    pub restore_default_sql: String,
    pub restore_template: Option<&'static str>,
}

/// A per-table toggle wrapped around one table's copy loop.
#[derive(Debug, Clone)]
pub struct TableToggle {
    pub disable_sql: String,
    pub restore_sql: String,
}

/// A physical row locator for tables without a primary key.
/// `select_expr` goes in the SELECT list; `predicate` contains `{p}`
/// where the bound placeholder belongs.
#[derive(Debug, Clone)]
pub struct RowIdentifier {
    pub select_expr: &'static str,
    pub predicate: &'static str,
}

/// SQL dialect and catalog knowledge for one engine.
///
/// Implemented once per supported engine and resolved through
/// [`adapter_for`]. The interface is pure string manipulation with no
/// driver dependency, so it is shared by the reflector, the
/// materializer and the data mover, and is fully unit-testable without
/// a live database.
///
/// Catalog queries return fixed positional layouts so the reflector can
/// parse them uniformly:
/// - `columns_sql`: (table, column, data_type, char_len, num_precision,
///   num_scale, nullable YES/NO, default, identity YES/NO)
/// - `key_constraints_sql`: (constraint, kind P/R/U, table, column,
///   referenced_table, referenced_column, deferrable YES/NO)
/// - `check_constraints_sql`: (constraint, table, expression)
/// - `indexes_sql`: (index, table, column, unique YES/NO)
/// - `list_views_sql`: (view, kind P/M)
pub trait EngineAdapter: Send + Sync {
    fn engine(&self) -> Engine;

    /// Quote an identifier per dialect.
    fn quote_ident(&self, s: &str) -> String;

    /// 1-based bind placeholder ("$1", "?", ":1", "@P1").
    fn placeholder(&self, idx: usize) -> String;

    fn qualified(&self, schema: &str, name: &str) -> String {
        format!("{}.{}", self.quote_ident(schema), self.quote_ident(name))
    }

    // ── catalog ────────────────────────────────────────────────────────

    fn list_schemas_sql(&self) -> String;
    fn list_tables_sql(&self, schema: &str) -> String;
    fn list_views_sql(&self, schema: &str) -> String;
    fn columns_sql(&self, schema: &str) -> String;
    fn key_constraints_sql(&self, schema: &str) -> String;
    fn check_constraints_sql(&self, schema: &str) -> String;
    fn indexes_sql(&self, schema: &str) -> String;
    fn table_exists_sql(&self, schema: &str, table: &str) -> String;
    fn view_script_sql(&self, schema: &str, view: &str, materialized: bool) -> String;

    /// Whether `view_script_sql` yields a complete CREATE statement or
    /// just the defining query (which the materializer must wrap).
    fn view_script_is_full_create(&self) -> bool {
        false
    }

    // ── pagination & DML ───────────────────────────────────────────────

    /// Deterministic page of rows: `ORDER BY <keys> OFFSET o FETCH NEXT b`.
    /// `order_by` expressions must form a total order (the caller passes
    /// the primary key, the physical row id, or every column).
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
            "SELECT {} FROM {} ORDER BY {} OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
            columns.join(", "),
            self.qualified(schema, table),
            order_by.join(", "),
            offset,
            batch
        )
    }

    /// SELECT-list expression for one column. Engines whose live driver
    /// cannot decode a type natively cast it to text here (and the mover
    /// re-coerces on the target side).
    fn select_expr(&self, column_quoted: &str, _ty: &SqlType) -> String {
        column_quoted.to_string()
    }

    /// VALUES-list expression binding placeholder `idx` into a column of
    /// `ty`. Engines that will not implicitly coerce a text bind wrap it
    /// in a CAST.
    fn insert_expr(&self, idx: usize, _ty: &SqlType) -> String {
        self.placeholder(idx)
    }

    /// Parameterized single-row INSERT, executed once per row inside one
    /// transaction per batch. `types` run parallel to `columns`.
    fn bulk_insert_sql(
        &self,
        schema: &str,
        table: &str,
        columns: &[String],
        types: &[SqlType],
    ) -> String {
        let exprs: Vec<String> = types
            .iter()
            .enumerate()
            .map(|(i, ty)| self.insert_expr(i + 1, ty))
            .collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.qualified(schema, table),
            columns.join(", "),
            exprs.join(", ")
        )
    }

    /// `col = <placeholder>` predicates for the given key columns, with
    /// placeholders numbered from `start_idx`.
    fn key_predicates(&self, key_cols: &[String], start_idx: usize) -> Vec<String> {
        key_cols
            .iter()
            .enumerate()
            .map(|(i, c)| {
                format!(
                    "{} = {}",
                    self.quote_ident(c),
                    self.placeholder(start_idx + i)
                )
            })
            .collect()
    }

    /// Stable physical row locator for tables without a primary key.
    fn physical_row_identifier(&self) -> Option<RowIdentifier>;

    // ── session & table gating ─────────────────────────────────────────

    fn session_restrictions(&self) -> Vec<SessionToggle>;

    fn table_restrictions(&self, _schema: &str, _table: &str) -> Vec<TableToggle> {
        Vec::new()
    }

    // ── LOB access ─────────────────────────────────────────────────────

    /// Hard upper bound on one chunk, where the engine's append path
    /// imposes one.
    fn lob_chunk_ceiling(&self) -> Option<u64> {
        None
    }

    /// SELECT of at most `length` LOB units starting at 0-based `offset`
    /// for the row matching `key_predicates`. EOF is a short read; a NULL
    /// cell means the LOB itself is NULL.
    fn lob_chunk_select(
        &self,
        schema: &str,
        table: &str,
        column: &str,
        key_predicates: &[String],
        offset: u64,
        length: u64,
    ) -> String;

    /// First chunk write: overwrite the column. Bind order: chunk, keys.
    fn lob_write_first(
        &self,
        schema: &str,
        table: &str,
        column: &str,
        key_predicates: &[String],
    ) -> String {
        format!(
            "UPDATE {} SET {} = {} WHERE {}",
            self.qualified(schema, table),
            self.quote_ident(column),
            self.placeholder(1),
            key_predicates.join(" AND ")
        )
    }

    /// Subsequent chunk write: append. Bind order: chunk, keys.
    fn lob_write_append(
        &self,
        schema: &str,
        table: &str,
        column: &str,
        key_predicates: &[String],
        binary: bool,
    ) -> String;

    // ── DDL ────────────────────────────────────────────────────────────

    fn create_schema_sql(&self, schema: &str, user: &str) -> String {
        format!(
            "CREATE SCHEMA {} AUTHORIZATION {}",
            self.quote_ident(schema),
            self.quote_ident(user)
        )
    }

    fn supports_drop_if_exists(&self) -> bool {
        true
    }

    fn drop_table_sql(&self, schema: &str, table: &str) -> String {
        if self.supports_drop_if_exists() {
            format!("DROP TABLE IF EXISTS {}", self.qualified(schema, table))
        } else {
            format!("DROP TABLE {}", self.qualified(schema, table))
        }
    }

    fn drop_view_sql(&self, schema: &str, view: &str, materialized: bool) -> String {
        let kind = if materialized {
            "MATERIALIZED VIEW"
        } else {
            "VIEW"
        };
        if self.supports_drop_if_exists() {
            format!("DROP {kind} IF EXISTS {}", self.qualified(schema, view))
        } else {
            format!("DROP {kind} {}", self.qualified(schema, view))
        }
    }

    fn supports_deferrable_constraints(&self) -> bool {
        false
    }

    /// Concrete spelling of a neutral [`SqlType`] in this engine.
    fn render_type(&self, ty: &SqlType) -> String;

    /// Strip engine-specific clauses that do not port (view scripts).
    fn strip_view_clauses(&self, script: String) -> String {
        script
    }

    /// Compose the CREATE TABLE statement. Constraint filtering has
    /// already happened upstream; everything present is rendered.
    fn create_table_sql(&self, schema: &str, table: &TableDescriptor) -> String {
        let mut parts: Vec<String> = Vec::new();
        for col in &table.columns {
            let rendered = col
                .target_rendered
                .clone()
                .unwrap_or_else(|| self.render_type(&col.source_type));
            let mut line = format!("{} {}", self.quote_ident(&col.name.0), rendered);
            if let Some(default) = &col.default {
                line.push_str(&format!(" DEFAULT {default}"));
            }
            if !col.features.nullable {
                line.push_str(" NOT NULL");
            }
            parts.push(line);
        }
        for constraint in &table.constraints {
            parts.push(self.render_constraint(schema, constraint));
        }
        format!(
            "CREATE TABLE {} ({})",
            self.qualified(schema, &table.name.0),
            parts.join(", ")
        )
    }

    fn render_constraint(&self, schema: &str, constraint: &Constraint) -> String {
        let named = |name: &Option<String>| {
            name.as_ref()
                .map(|n| format!("CONSTRAINT {} ", self.quote_ident(n)))
                .unwrap_or_default()
        };
        match constraint {
            Constraint::PrimaryKey { name, columns } => {
                let cols: Vec<String> = columns.iter().map(|c| self.quote_ident(&c.0)).collect();
                format!("{}PRIMARY KEY ({})", named(name), cols.join(", "))
            }
            Constraint::Unique { name, columns } => {
                let cols: Vec<String> = columns.iter().map(|c| self.quote_ident(&c.0)).collect();
                format!("{}UNIQUE ({})", named(name), cols.join(", "))
            }
            Constraint::Check { name, expression } => {
                format!("{}CHECK ({expression})", named(name))
            }
            Constraint::ForeignKey {
                name,
                columns,
                referenced_table,
                referenced_columns,
                deferrable,
            } => {
                let cols: Vec<String> = columns.iter().map(|c| self.quote_ident(&c.0)).collect();
                let refs: Vec<String> = referenced_columns
                    .iter()
                    .map(|c| self.quote_ident(&c.0))
                    .collect();
                let mut out = format!(
                    "{}FOREIGN KEY ({}) REFERENCES {} ({})",
                    named(name),
                    cols.join(", "),
                    self.qualified(schema, &referenced_table.0),
                    refs.join(", ")
                );
                if *deferrable && self.supports_deferrable_constraints() {
                    out.push_str(" DEFERRABLE INITIALLY DEFERRED");
                }
                out
            }
        }
    }

    fn create_index_sql(&self, schema: &str, table: &str, index: &IndexDescriptor) -> String {
        let cols: Vec<String> = index.columns.iter().map(|c| self.quote_ident(&c.0)).collect();
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            self.quote_ident(&index.name),
            self.qualified(schema, table),
            cols.join(", ")
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

static ORACLE: OracleAdapter = OracleAdapter;
static POSTGRES: PostgresAdapter = PostgresAdapter;
static SQLSERVER: SqlServerAdapter = SqlServerAdapter;
static MYSQL: MysqlAdapter = MysqlAdapter;

/// Resolve the adapter registered for an engine.
pub fn adapter_for(engine: Engine) -> &'static dyn EngineAdapter {
    match engine {
        Engine::Oracle => &ORACLE,
        Engine::Postgres => &POSTGRES,
        Engine::SqlServer => &SQLSERVER,
        Engine::Mysql => &MYSQL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::table::{ColumnDescriptor, TableKind};
    use crate::domain::value_objects::{ColumnName, TableName};

    #[test]
    fn registry_resolves_every_engine() {
        for engine in Engine::ALL {
            assert_eq!(adapter_for(engine).engine(), engine);
        }
    }

    #[test]
    fn default_bulk_insert_uses_engine_placeholders() {
        use crate::domain::sql_type::SqlType;
        let int4 = SqlType::Int {
            bytes: 4,
            signed: true,
        };
        let types = [int4.clone(), SqlType::VarChar(Some(100))];

        let pg = adapter_for(Engine::Postgres);
        let sql = pg.bulk_insert_sql("hr", "persons", &["\"id\"".into(), "\"name\"".into()], &types);
        assert_eq!(
            sql,
            r#"INSERT INTO "hr"."persons" ("id", "name") VALUES ($1, $2)"#
        );

        let my = adapter_for(Engine::Mysql);
        let sql = my.bulk_insert_sql("hr", "persons", &["`id`".into(), "`name`".into()], &types);
        assert_eq!(sql, "INSERT INTO `hr`.`persons` (`id`, `name`) VALUES (?, ?)");
    }

    #[test]
    fn postgres_insert_casts_text_bound_types() {
        use crate::domain::sql_type::SqlType;
        let types = [
            SqlType::Decimal {
                precision: Some(9),
                scale: Some(2),
            },
            SqlType::Timestamp { tz: false },
        ];
        let pg = adapter_for(Engine::Postgres);
        let sql = pg.bulk_insert_sql("hr", "prices", &["\"amount\"".into(), "\"at\"".into()], &types);
        assert_eq!(
            sql,
            r#"INSERT INTO "hr"."prices" ("amount", "at") VALUES (CAST($1 AS NUMERIC(9,2)), CAST($2 AS TIMESTAMP))"#
        );
    }

    #[test]
    fn key_predicates_number_from_start_index() {
        let pg = adapter_for(Engine::Postgres);
        let preds = pg.key_predicates(&["id".into(), "rev".into()], 2);
        assert_eq!(preds, vec![r#""id" = $2"#, r#""rev" = $3"#]);
    }

    #[test]
    fn create_table_renders_columns_and_constraints() {
        let mut t = TableDescriptor::new("persons", TableKind::Table);
        let mut id = ColumnDescriptor::new(
            "id",
            "NUMBER(9,0)",
            crate::domain::sql_type::SqlType::Int {
                bytes: 4,
                signed: true,
            },
        );
        id.features.nullable = false;
        id.target_rendered = Some("INTEGER".into());
        let mut name = ColumnDescriptor::new(
            "name",
            "VARCHAR2(100)",
            crate::domain::sql_type::SqlType::VarChar(Some(100)),
        );
        name.target_rendered = Some("VARCHAR(100)".into());
        t.columns.push(id);
        t.columns.push(name);
        t.constraints.push(Constraint::PrimaryKey {
            name: None,
            columns: vec![ColumnName("id".into())],
        });

        let sql = adapter_for(Engine::Postgres).create_table_sql("hr", &t);
        assert_eq!(
            sql,
            r#"CREATE TABLE "hr"."persons" ("id" INTEGER NOT NULL, "name" VARCHAR(100), PRIMARY KEY ("id"))"#
        );
    }

    #[test]
    fn deferrable_fk_only_where_supported() {
        let fk = Constraint::ForeignKey {
            name: Some("orders_fk".into()),
            columns: vec![ColumnName("customer_id".into())],
            referenced_table: TableName("customers".into()),
            referenced_columns: vec![ColumnName("id".into())],
            deferrable: true,
        };
        let pg = adapter_for(Engine::Postgres).render_constraint("hr", &fk);
        assert!(pg.contains("DEFERRABLE INITIALLY DEFERRED"));
        let my = adapter_for(Engine::Mysql).render_constraint("hr", &fk);
        assert!(!my.contains("DEFERRABLE"));
    }

    #[test]
    fn create_index_sql_includes_unique() {
        let idx = IndexDescriptor {
            name: "persons_name_ix".into(),
            columns: vec![ColumnName("name".into())],
            unique: true,
        };
        let sql = adapter_for(Engine::Postgres).create_index_sql("hr", "persons", &idx);
        assert_eq!(
            sql,
            r#"CREATE UNIQUE INDEX "persons_name_ix" ON "hr"."persons" ("name")"#
        );
    }
}
