use std::sync::Arc;
use tracing::{debug, info};

use crate::application::reflector::Reflection;
use crate::domain::error::MigrationError;
use crate::domain::ports::{SqlExecutor, SqlValue};
use crate::domain::request::MigrationRequest;
use crate::domain::table::{TableDescriptor, TableKind};
use crate::domain::value_objects::SchemaName;
use crate::infrastructure::db::adapter::{adapter_for, EngineAdapter};

/// Applies the reflected, filtered, type-mapped schema to the target:
/// drop-then-create for the candidate tables, indexes after their owning
/// table, views last with their scripts rewritten to the target schema.
pub struct SchemaMaterializer {
    target: Arc<dyn SqlExecutor>,
    target_user: String,
}

impl SchemaMaterializer {
    pub fn new(target: Arc<dyn SqlExecutor>, target_user: &str) -> Self {
        Self {
            target,
            target_user: target_user.to_string(),
        }
    }

    pub async fn materialize(
        &self,
        request: &MigrationRequest,
        reflection: &Reflection,
        source: Arc<dyn SqlExecutor>,
    ) -> Result<SchemaName, Vec<MigrationError>> {
        let adapter = adapter_for(self.target.engine());
        let schema = match self.resolve_target_schema(adapter, &request.target_schema).await {
            Ok(existing) => {
                self.drop_candidates(adapter, &existing, &reflection.tables)
                    .await
                    .map_err(|e| vec![e])?;
                existing
            }
            Err(_) => self.create_target_schema(adapter, &request.target_schema).await?,
        };

        info!(
            "Materializing {} relations into {}.{}",
            reflection.tables.len(),
            self.target.engine(),
            schema.0
        );

        for table in reflection.tables.iter().filter(|t| !t.is_view()) {
            let ddl = adapter.create_table_sql(&schema.0, table);
            self.target
                .execute(&ddl)
                .await
                .map_err(|e| vec![chain_construction(e)])?;
            for index in &table.indexes {
                let ddl = adapter.create_index_sql(&schema.0, &table.name.0, index);
                self.target
                    .execute(&ddl)
                    .await
                    .map_err(|e| vec![chain_construction(e)])?;
            }
        }

        for view in reflection.tables.iter().filter(|t| t.is_view()) {
            self.materialize_view(adapter, &schema, reflection, view, &source)
                .await
                .map_err(|e| vec![e])?;
        }

        Ok(schema)
    }

    /// Check that every selected table already exists on the target —
    /// the precondition for a data phase running without the metadata
    /// phase. Returns the missing names.
    pub async fn missing_tables(
        &self,
        schema: &SchemaName,
        tables: &[TableDescriptor],
    ) -> Result<Vec<String>, MigrationError> {
        let adapter = adapter_for(self.target.engine());
        let mut missing = Vec::new();
        for table in tables.iter().filter(|t| !t.is_view()) {
            let rows = self
                .target
                .fetch(&adapter.table_exists_sql(&schema.0, &table.name.0))
                .await?;
            if rows.is_empty() {
                missing.push(table.name.0.clone());
            }
        }
        Ok(missing)
    }

    async fn resolve_target_schema(
        &self,
        adapter: &'static dyn EngineAdapter,
        requested: &SchemaName,
    ) -> Result<SchemaName, MigrationError> {
        let rows = self.target.fetch(&adapter.list_schemas_sql()).await?;
        for row in &rows {
            if let Some(SqlValue::Text(name)) = row.first() {
                if name.eq_ignore_ascii_case(&requested.0) {
                    return Ok(SchemaName(name.clone()));
                }
            }
        }
        Err(MigrationError::invalid_value(
            &requested.0,
            "schema not present on target",
        ))
    }

    /// CREATE SCHEMA, then re-probe: schema creation silently succeeding
    /// without effect has been observed in the wild, so absence after a
    /// clean CREATE is an explicit failure.
    async fn create_target_schema(
        &self,
        adapter: &'static dyn EngineAdapter,
        requested: &SchemaName,
    ) -> Result<SchemaName, Vec<MigrationError>> {
        let ddl = adapter.create_schema_sql(&requested.0, &self.target_user);
        self.target.execute(&ddl).await.map_err(|e| vec![e])?;

        match self.resolve_target_schema(adapter, requested).await {
            Ok(schema) => Ok(schema),
            Err(_) => Err(vec![MigrationError::unexpected(format!(
                "unable to create schema in RDBMS {}",
                self.target.engine()
            ))]),
        }
    }

    /// Drop the candidate relations in reverse topological order so
    /// children go before their parents. Engines without IF EXISTS get a
    /// catalog probe first.
    async fn drop_candidates(
        &self,
        adapter: &'static dyn EngineAdapter,
        schema: &SchemaName,
        tables: &[TableDescriptor],
    ) -> Result<(), MigrationError> {
        for table in tables.iter().rev() {
            if !adapter.supports_drop_if_exists() {
                let rows = self
                    .target
                    .fetch(&adapter.table_exists_sql(&schema.0, &table.name.0))
                    .await?;
                if rows.is_empty() {
                    continue;
                }
            }
            let ddl = match table.kind {
                TableKind::Table => adapter.drop_table_sql(&schema.0, &table.name.0),
                TableKind::PlainView => adapter.drop_view_sql(&schema.0, &table.name.0, false),
                TableKind::MaterializedView => {
                    adapter.drop_view_sql(&schema.0, &table.name.0, true)
                }
            };
            self.target.execute(&ddl).await?;
        }
        Ok(())
    }

    async fn materialize_view(
        &self,
        adapter: &'static dyn EngineAdapter,
        schema: &SchemaName,
        reflection: &Reflection,
        view: &TableDescriptor,
        source: &Arc<dyn SqlExecutor>,
    ) -> Result<(), MigrationError> {
        let source_adapter = adapter_for(source.engine());
        let materialized = view.kind == TableKind::MaterializedView;
        let script_sql =
            source_adapter.view_script_sql(&reflection.schema.0, &view.name.0, materialized);
        let rows = source.fetch(&script_sql).await?;
        let script = rows
            .first()
            .and_then(|row| match row.first() {
                Some(SqlValue::Text(s)) => Some(s.clone()),
                _ => None,
            })
            .ok_or_else(|| {
                MigrationError::operation(
                    "view-script",
                    format!("no creation script for view {}", view.name.0),
                )
            })?;

        let script = source_adapter.strip_view_clauses(script);
        let body = rewrite_view_script(&script, &reflection.schema.0, &schema.0, adapter);
        let ddl = if source_adapter.view_script_is_full_create() {
            body
        } else {
            let kind = if materialized {
                "MATERIALIZED VIEW"
            } else {
                "VIEW"
            };
            format!(
                "CREATE {kind} {} AS {}",
                adapter.qualified(&schema.0, &view.name.0),
                body.trim().trim_end_matches(';')
            )
        };

        debug!("Creating view {}: {}", view.name.0, ddl);
        self.target
            .execute(&ddl)
            .await
            .map_err(|e| {
                MigrationError::operation(
                    "view-construction",
                    format!("Failed: '{}'; {e}", crate::domain::error::sanitize(&ddl)),
                )
            })
            .map(|_| ())
    }
}

fn chain_construction(e: MigrationError) -> MigrationError {
    MigrationError::operation("schema-construction", e.to_string())
}

/// Rewrite schema-qualified identifiers from the source schema to the
/// target schema: unquoted, double-quoted, bracketed and backticked
/// forms, all case-insensitively.
pub fn rewrite_view_script(
    script: &str,
    source_schema: &str,
    target_schema: &str,
    target_adapter: &dyn EngineAdapter,
) -> String {
    let quoted_target = format!("{}.", target_adapter.quote_ident(target_schema));
    let plain_target = format!("{target_schema}.");

    let mut out = script.to_string();
    for (pattern, replacement) in [
        (format!("\"{source_schema}\"."), &quoted_target),
        (format!("[{source_schema}]."), &quoted_target),
        (format!("`{source_schema}`."), &quoted_target),
        (format!("{source_schema}."), &plain_target),
    ] {
        out = replace_case_insensitive(&out, &pattern, replacement);
    }
    out
}

fn replace_case_insensitive(haystack: &str, needle: &str, replacement: &str) -> String {
    if needle.is_empty() {
        return haystack.to_string();
    }
    let lower_haystack = haystack.to_lowercase();
    let lower_needle = needle.to_lowercase();
    let mut out = String::with_capacity(haystack.len());
    let mut cursor = 0;
    while let Some(found) = lower_haystack[cursor..].find(&lower_needle) {
        let start = cursor + found;
        out.push_str(&haystack[cursor..start]);
        out.push_str(replacement);
        cursor = start + needle.len();
    }
    out.push_str(&haystack[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::{text_row, MockExecutor};
    use crate::domain::engine::Engine;
    use crate::domain::sql_type::SqlType;
    use crate::domain::table::ColumnDescriptor;

    fn table(name: &str) -> TableDescriptor {
        let mut t = TableDescriptor::new(name, TableKind::Table);
        let mut id = ColumnDescriptor::new(
            "id",
            "integer",
            SqlType::Int {
                bytes: 4,
                signed: true,
            },
        );
        id.target_rendered = Some("INTEGER".into());
        id.features.nullable = false;
        t.columns.push(id);
        t
    }

    fn reflection(tables: Vec<TableDescriptor>) -> Reflection {
        Reflection {
            schema: SchemaName("hr".into()),
            tables,
        }
    }

    fn request() -> MigrationRequest {
        let mut req = MigrationRequest::new(Engine::Oracle, Engine::Postgres, "hr", "hr");
        req.phases.metadata = true;
        req
    }

    #[tokio::test]
    async fn existing_schema_drops_in_reverse_order_then_creates() {
        let target = Arc::new(
            MockExecutor::new(Engine::Postgres).respond("schemata", vec![text_row(&["hr"])]),
        );
        let source = Arc::new(MockExecutor::new(Engine::Oracle));
        let materializer = SchemaMaterializer::new(Arc::clone(&target) as Arc<dyn SqlExecutor>, "loader");

        let refl = reflection(vec![table("customers"), table("orders")]);
        materializer
            .materialize(&request(), &refl, source as Arc<dyn SqlExecutor>)
            .await
            .unwrap();

        let stmts = target.statements();
        let drop_orders = stmts
            .iter()
            .position(|s| s == r#"DROP TABLE IF EXISTS "hr"."orders""#)
            .unwrap();
        let drop_customers = stmts
            .iter()
            .position(|s| s == r#"DROP TABLE IF EXISTS "hr"."customers""#)
            .unwrap();
        let create_customers = stmts
            .iter()
            .position(|s| s.starts_with(r#"CREATE TABLE "hr"."customers""#))
            .unwrap();
        let create_orders = stmts
            .iter()
            .position(|s| s.starts_with(r#"CREATE TABLE "hr"."orders""#))
            .unwrap();

        // children dropped before parents, parents created before children
        assert!(drop_orders < drop_customers);
        assert!(create_customers < create_orders);
        assert!(drop_customers < create_customers);
    }

    #[tokio::test]
    async fn absent_schema_is_created_and_reprobed() {
        // first probe: no schema; after CREATE the mock still reports none
        let target = Arc::new(MockExecutor::new(Engine::Postgres));
        let source = Arc::new(MockExecutor::new(Engine::Oracle));
        let materializer = SchemaMaterializer::new(Arc::clone(&target) as Arc<dyn SqlExecutor>, "loader");

        let errors = materializer
            .materialize(&request(), &reflection(vec![table("t")]), source as Arc<dyn SqlExecutor>)
            .await
            .unwrap_err();
        assert_eq!(errors[0].code(), 102);
        assert!(target
            .statements()
            .iter()
            .any(|s| s == r#"CREATE SCHEMA "hr" AUTHORIZATION "loader""#));
    }

    #[tokio::test]
    async fn ddl_failure_aborts_with_schema_construction() {
        let target = Arc::new(
            MockExecutor::new(Engine::Postgres)
                .respond("schemata", vec![text_row(&["hr"])])
                .fail_when("CREATE TABLE"),
        );
        let source = Arc::new(MockExecutor::new(Engine::Oracle));
        let materializer = SchemaMaterializer::new(Arc::clone(&target) as Arc<dyn SqlExecutor>, "loader");

        let errors = materializer
            .materialize(&request(), &reflection(vec![table("t")]), source as Arc<dyn SqlExecutor>)
            .await
            .unwrap_err();
        assert_eq!(errors[0].code(), 104);
        assert!(errors[0].envelope_line().contains("schema-construction"));
    }

    #[tokio::test]
    async fn indexes_created_after_their_table() {
        use crate::domain::table::IndexDescriptor;
        use crate::domain::value_objects::ColumnName;

        let mut t = table("persons");
        t.indexes.push(IndexDescriptor {
            name: "persons_name_ix".into(),
            columns: vec![ColumnName("name".into())],
            unique: false,
        });
        let target = Arc::new(
            MockExecutor::new(Engine::Postgres).respond("schemata", vec![text_row(&["hr"])]),
        );
        let source = Arc::new(MockExecutor::new(Engine::Oracle));
        SchemaMaterializer::new(Arc::clone(&target) as Arc<dyn SqlExecutor>, "loader")
            .materialize(&request(), &reflection(vec![t]), source as Arc<dyn SqlExecutor>)
            .await
            .unwrap();

        let stmts = target.statements();
        let create = stmts
            .iter()
            .position(|s| s.starts_with("CREATE TABLE"))
            .unwrap();
        let index = stmts
            .iter()
            .position(|s| s.starts_with("CREATE INDEX"))
            .unwrap();
        assert!(create < index);
    }

    #[tokio::test]
    async fn view_script_rewritten_and_created_last() {
        let mut v = TableDescriptor::new("v_active", TableKind::PlainView);
        v.columns
            .push(ColumnDescriptor::new("id", "int", SqlType::Int { bytes: 4, signed: true }));

        let target = Arc::new(
            MockExecutor::new(Engine::Postgres).respond("schemata", vec![text_row(&["public"])]),
        );
        let source = Arc::new(MockExecutor::new(Engine::SqlServer).respond(
            "sys.sql_modules",
            vec![text_row(&[
                "CREATE VIEW [dbo].[v_active] AS SELECT id FROM dbo.users WHERE active = 1",
            ])],
        ));

        let mut req = MigrationRequest::new(Engine::SqlServer, Engine::Postgres, "dbo", "public");
        req.phases.metadata = true;
        let refl = Reflection {
            schema: SchemaName("dbo".into()),
            tables: vec![table("users"), v],
        };
        SchemaMaterializer::new(Arc::clone(&target) as Arc<dyn SqlExecutor>, "loader")
            .materialize(&req, &refl, source as Arc<dyn SqlExecutor>)
            .await
            .unwrap();

        let stmts = target.statements();
        let view_stmt = stmts.iter().find(|s| s.contains("v_active")).unwrap();
        assert!(!view_stmt.contains("dbo."), "{view_stmt}");
        assert!(!view_stmt.contains("[dbo]."), "{view_stmt}");
        assert!(view_stmt.contains(r#""public".[v_active]"#) || view_stmt.contains("public."),
            "{view_stmt}");

        let create_table = stmts.iter().position(|s| s.starts_with("CREATE TABLE")).unwrap();
        let create_view = stmts.iter().position(|s| s.contains("v_active") && s.contains("CREATE")).unwrap();
        assert!(create_table < create_view);
    }

    #[test]
    fn rewrite_handles_quoted_and_unquoted_forms() {
        use crate::infrastructure::db::adapter::adapter_for;
        let pg = adapter_for(Engine::Postgres);
        let script = r#"SELECT * FROM dbo.users u JOIN [dbo].[orders] o ON o.uid = u.id JOIN "DBO"."x" q ON 1=1"#;
        let out = rewrite_view_script(script, "dbo", "public", pg);
        assert!(!out.to_lowercase().contains("dbo."));
        assert!(out.contains("public.users"));
        assert!(out.contains(r#""public".[orders]"#));
        assert!(out.contains(r#""public"."x""#));
    }

    #[test]
    fn rewrite_is_case_insensitive_for_oracle_scripts() {
        use crate::infrastructure::db::adapter::adapter_for;
        let ora = adapter_for(Engine::Oracle);
        let script = r#"SELECT a FROM HR.persons UNION SELECT a FROM "HR"."archive""#;
        let out = rewrite_view_script(script, "HR", "STAGE", ora);
        assert!(out.contains("STAGE.persons"));
        assert!(out.contains(r#""STAGE"."archive""#));
    }
}
