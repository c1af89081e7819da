use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::application::materializer::SchemaMaterializer;
use crate::application::mover::{DataMover, MoveOutcome, SessionGate};
use crate::application::reflector::{Reflection, SchemaReflector};
use crate::application::type_mapper::TypeMapper;
use crate::domain::error::MigrationError;
use crate::domain::ports::{ExecutorFactory, SqlExecutor};
use crate::domain::request::MigrationRequest;
use crate::domain::result::{
    ColumnOutcome, EndpointIdentity, MigrationResult, TableResult,
};
use crate::domain::value_objects::{SchemaName, TableName};
use crate::infrastructure::config::AppConfig;

/// Pipeline stage, logged at every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Validating,
    Reflecting,
    Materializing,
    MovingPlain,
    MovingLob,
    Done,
    Failed,
}

/// Sequences one migration request through its phases, fans the data
/// phases out over a bounded worker pool, and assembles the result.
///
/// The orchestrator owns the reflection metadata for the duration of
/// one request; workers write only their own per-table slot.
pub struct MigrationOrchestrator {
    factory: Arc<dyn ExecutorFactory>,
    config: Arc<AppConfig>,
}

impl MigrationOrchestrator {
    pub fn new(factory: Arc<dyn ExecutorFactory>, config: Arc<AppConfig>) -> Self {
        Self { factory, config }
    }

    /// The VALIDATING stage alone: request parameters plus both engines'
    /// connection parameters. Opens no connections.
    pub fn verify(&self, request: &MigrationRequest) -> Vec<MigrationError> {
        let mut errors = request.validate();
        errors.extend(self.config.validate_engine(request.source));
        errors.extend(self.config.validate_engine(request.target));
        errors
    }

    pub async fn migrate(&self, request: &MigrationRequest) -> MigrationResult {
        self.migrate_with_cancel(request, Arc::new(AtomicBool::new(false)))
            .await
    }

    pub async fn migrate_with_cancel(
        &self,
        request: &MigrationRequest,
        cancel: Arc<AtomicBool>,
    ) -> MigrationResult {
        let mut result = MigrationResult::new(
            EndpointIdentity {
                rdbms: request.source,
                schema: request.source_schema.clone(),
            },
            EndpointIdentity {
                rdbms: request.target,
                schema: request.target_schema.clone(),
            },
        );

        transition(Stage::Validating);
        let errors = self.verify(request);
        if !errors.is_empty() {
            return fail(result, errors);
        }

        transition(Stage::Reflecting);
        let source = match self.factory.connect(request.source).await {
            Ok(executor) => executor,
            Err(e) => return fail(result, vec![e]),
        };
        let mut reflection = match SchemaReflector::new(Arc::clone(&source))
            .reflect(request)
            .await
        {
            Ok(reflection) => reflection,
            Err(errors) => return fail(result, errors),
        };
        if reflection.tables.is_empty() {
            return fail(
                result,
                vec![MigrationError::invalid_value(
                    "tables",
                    "nothing selected for migration",
                )],
            );
        }

        let mapper = TypeMapper::new(request.source, request.target);
        let mut warnings = Vec::new();
        for table in &mut reflection.tables {
            mapper.map_table(table, request, &mut warnings);
        }
        result.warnings = warnings;
        for table in &reflection.tables {
            let mut slot = TableResult::new(table.name.clone());
            slot.columns = table
                .columns
                .iter()
                .map(|c| ColumnOutcome {
                    name: c.name.0.clone(),
                    source_type: c.source_type_raw.clone(),
                    target_type: c
                        .target_rendered
                        .clone()
                        .unwrap_or_else(|| c.source_type.to_string()),
                })
                .collect();
            result.tables.push(slot);
        }

        transition(Stage::Materializing);
        let target = match self.factory.connect(request.target).await {
            Ok(executor) => executor,
            Err(e) => return fail(result, vec![e]),
        };
        let target_user = self
            .config
            .engine(request.target)
            .map(|c| c.user.clone())
            .unwrap_or_default();
        let materializer = SchemaMaterializer::new(Arc::clone(&target), &target_user);

        let target_schema = if request.phases.metadata {
            match materializer
                .materialize(request, &reflection, Arc::clone(&source))
                .await
            {
                Ok(schema) => schema,
                Err(errors) => return fail(result, errors),
            }
        } else {
            // existing target assumed; every selected table must be there
            match materializer
                .missing_tables(&request.target_schema, &reflection.tables)
                .await
            {
                Ok(missing) if missing.is_empty() => request.target_schema.clone(),
                Ok(missing) => {
                    return fail(
                        result,
                        vec![MigrationError::invalid_value(
                            missing.join(","),
                            "not present on target",
                        )],
                    )
                }
                Err(e) => return fail(result, vec![e]),
            }
        };

        if request.phases.plain_data || request.phases.lob_data {
            // session restrictions wrap the whole data phase and are
            // restored on every exit path, cancellation included
            let gate = match SessionGate::disable(Arc::clone(&target)).await {
                Ok(gate) => gate,
                Err(e) => return fail(result, vec![e]),
            };

            if request.phases.plain_data {
                transition(Stage::MovingPlain);
                self.run_phase(
                    DataPhase::Plain,
                    &reflection,
                    &target_schema,
                    Arc::clone(&source),
                    Arc::clone(&target),
                    Arc::clone(&cancel),
                    &mut result,
                )
                .await;
            }

            if request.phases.lob_data {
                transition(Stage::MovingLob);
                self.run_phase(
                    DataPhase::Lob,
                    &reflection,
                    &target_schema,
                    Arc::clone(&source),
                    Arc::clone(&target),
                    Arc::clone(&cancel),
                    &mut result,
                )
                .await;
            }

            result.push_errors(gate.restore().await);
        }

        result.finalize();
        transition(if result.errors.is_empty() {
            Stage::Done
        } else {
            Stage::Failed
        });
        result
    }

    /// Fan one data phase out over the worker pool. Each table is one
    /// work unit; at most `max_processes` run at once; every worker
    /// reports into its own result slot.
    #[allow(clippy::too_many_arguments)]
    async fn run_phase(
        &self,
        phase: DataPhase,
        reflection: &Reflection,
        target_schema: &SchemaName,
        source: Arc<dyn SqlExecutor>,
        target: Arc<dyn SqlExecutor>,
        cancel: Arc<AtomicBool>,
        result: &mut MigrationResult,
    ) {
        let migration = self.config.migration;
        let timeout = migration.statement_timeout_secs.map(Duration::from_secs);
        let pool = Arc::new(Semaphore::new(migration.max_processes.max(1)));

        let mut handles = Vec::new();
        for table in reflection.tables.iter().filter(|t| !t.is_view()) {
            if phase == DataPhase::Lob && table.lob_columns().is_empty() {
                continue;
            }
            let pool = Arc::clone(&pool);
            let mover = DataMover::new(
                Arc::clone(&source),
                Arc::clone(&target),
                migration.batch_size,
                migration.chunk_size,
                timeout,
                Arc::clone(&cancel),
            );
            let table = table.clone();
            let source_schema = reflection.schema.clone();
            let target_schema = target_schema.clone();

            handles.push(tokio::spawn(async move {
                let _permit = match pool.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (
                            table.name.clone(),
                            MoveOutcome {
                                count: 0,
                                status: crate::domain::result::PhaseStatus::None,
                                errors: vec![MigrationError::unexpected("worker pool closed")],
                            },
                        )
                    }
                };
                let outcome = match phase {
                    DataPhase::Plain => {
                        mover
                            .move_plain(&source_schema, &target_schema, &table)
                            .await
                    }
                    DataPhase::Lob => {
                        mover.move_lobs(&source_schema, &target_schema, &table).await
                    }
                };
                (table.name.clone(), outcome)
            }));
        }

        for handle in handles {
            match handle.await {
                Ok((name, outcome)) => record_outcome(result, phase, &name, outcome),
                Err(e) => result
                    .errors
                    .push(MigrationError::unexpected(e.to_string()).envelope_line()),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DataPhase {
    Plain,
    Lob,
}

fn record_outcome(
    result: &mut MigrationResult,
    phase: DataPhase,
    table: &TableName,
    outcome: MoveOutcome,
) {
    result.push_errors(outcome.errors.clone());
    if let Some(slot) = result.table_mut(table) {
        match phase {
            DataPhase::Plain => {
                slot.plain_count = outcome.count;
                slot.plain_status = outcome.status;
            }
            DataPhase::Lob => {
                slot.lob_count = outcome.count;
                slot.lob_status = outcome.status;
            }
        }
    }
}

fn transition(stage: Stage) {
    match stage {
        Stage::Failed => info!("Migration stage: {stage:?}"),
        _ => debug!("Migration stage: {stage:?}"),
    }
}

fn fail(mut result: MigrationResult, errors: Vec<MigrationError>) -> MigrationResult {
    result.push_errors(errors);
    result.finalize();
    transition(Stage::Failed);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::{text_row, MockExecutor, MockFactory};
    use crate::domain::engine::Engine;
    use crate::domain::ports::SqlValue;
    use crate::domain::result::PhaseStatus;
    use crate::infrastructure::config::EngineConfig;

    fn app_config() -> Arc<AppConfig> {
        let mut cfg = AppConfig::default();
        let section = |name: &str, port: u16| EngineConfig {
            name: name.to_string(),
            user: "loader".to_string(),
            password: "secret".to_string(),
            host: "localhost".to_string(),
            port: Some(port),
            client: None,
            driver: None,
        };
        cfg.rdbms.oracle = Some(section("orcl", 1521));
        cfg.rdbms.postgres = Some(section("warehouse", 5432));
        cfg.migration.batch_size = 10;
        cfg.migration.chunk_size = 1024;
        Arc::new(cfg)
    }

    /// Oracle source holding `persons(id pk, name varchar2(100), photo blob)`
    /// with two rows; the photo is null for id 2.
    fn oracle_source() -> MockExecutor {
        MockExecutor::new(Engine::Oracle)
            .respond("all_users", vec![text_row(&["HR"])])
            .respond("all_tables WHERE owner = 'HR'", vec![text_row(&["PERSONS"])])
            .respond("all_views", vec![])
            .respond(
                "all_tab_columns",
                vec![
                    text_row(&["PERSONS", "ID", "NUMBER", "<null>", "9", "0", "NO", "<null>", "NO"]),
                    text_row(&["PERSONS", "NAME", "VARCHAR2", "100", "<null>", "<null>", "YES", "<null>", "NO"]),
                    text_row(&["PERSONS", "PHOTO", "BLOB", "<null>", "<null>", "<null>", "YES", "<null>", "NO"]),
                ],
            )
            .respond(
                "all_constraints ac",
                vec![text_row(&["PERSONS_PK", "P", "PERSONS", "ID", "<null>", "<null>", "NO"])],
            )
            .respond("search_condition_vc", vec![])
            .respond("all_ind_columns", vec![])
            // plain page: two rows, then EOF
            .respond(
                r#""ID", "NAME" FROM "HR"."PERSONS" ORDER BY "ID" OFFSET 0"#,
                vec![
                    vec![SqlValue::Int(1), SqlValue::Text("alice".into())],
                    vec![SqlValue::Int(2), SqlValue::Text("bob".into())],
                ],
            )
            // LOB key page: both ids, then EOF
            .respond(
                r#"SELECT "ID" FROM "HR"."PERSONS" ORDER BY "ID" OFFSET 0"#,
                vec![vec![SqlValue::Int(1)], vec![SqlValue::Int(2)]],
            )
            // 3-byte photo for id 1, NULL photo for id 2
            .respond_for_param(
                "DBMS_LOB.SUBSTR",
                SqlValue::Int(1),
                vec![vec![SqlValue::Bytes(b"jpg".to_vec())]],
            )
            .respond_for_param("DBMS_LOB.SUBSTR", SqlValue::Int(2), vec![vec![SqlValue::Null]])
    }

    fn postgres_target() -> MockExecutor {
        MockExecutor::new(Engine::Postgres)
            .respond("schemata", vec![text_row(&["hr"])])
            .respond(
                "SHOW session_replication_role",
                vec![vec![SqlValue::Text("origin".into())]],
            )
            .respond("SHOW synchronous_commit", vec![vec![SqlValue::Text("on".into())]])
    }

    fn request() -> MigrationRequest {
        let mut req = MigrationRequest::new(Engine::Oracle, Engine::Postgres, "hr", "hr");
        req.phases.metadata = true;
        req.phases.plain_data = true;
        req.phases.lob_data = true;
        req
    }

    #[tokio::test]
    async fn oracle_to_postgres_full_pipeline() {
        let source = Arc::new(oracle_source());
        let target = Arc::new(postgres_target());
        let factory = Arc::new(MockFactory {
            source: Arc::clone(&source),
            target: Arc::clone(&target),
        });
        let orchestrator = MigrationOrchestrator::new(factory, app_config());

        let result = orchestrator.migrate(&request()).await;

        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(result.status, PhaseStatus::Full);
        assert_eq!(result.tables.len(), 1);

        let persons = &result.tables[0];
        assert_eq!(persons.plain_count, 2);
        assert_eq!(persons.plain_status, PhaseStatus::Full);
        assert_eq!(persons.lob_count, 1);
        assert_eq!(persons.lob_status, PhaseStatus::Full);

        // column translations recorded in the report
        let types: Vec<(&str, &str)> = persons
            .columns
            .iter()
            .map(|c| (c.name.as_str(), c.target_type.as_str()))
            .collect();
        assert_eq!(
            types,
            vec![
                ("ID", "INTEGER"),
                ("NAME", "VARCHAR(100)"),
                ("PHOTO", "BYTEA"),
            ]
        );

        // DDL ran against the target with the translated types
        let stmts = target.statements();
        assert!(stmts
            .iter()
            .any(|s| s.contains(r#"CREATE TABLE "hr"."PERSONS""#) && s.contains("BYTEA")));
        // session restrictions restored after the data phase
        assert!(stmts.iter().any(|s| s == "SET session_replication_role = origin"));
    }

    #[tokio::test]
    async fn include_exclude_conflict_opens_no_connections() {
        let source = Arc::new(MockExecutor::new(Engine::Oracle));
        let target = Arc::new(MockExecutor::new(Engine::Postgres));
        let factory = Arc::new(MockFactory {
            source: Arc::clone(&source),
            target: Arc::clone(&target),
        });
        let orchestrator = MigrationOrchestrator::new(factory, app_config());

        let mut req = request();
        req.include_tables.push(TableName("a".into()));
        req.exclude_tables.push(TableName("b".into()));
        let result = orchestrator.migrate(&req).await;

        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("142:"));
        assert_eq!(result.status, PhaseStatus::None);
        // neither endpoint was touched
        assert!(source.statements().is_empty());
        assert!(target.statements().is_empty());
    }

    #[tokio::test]
    async fn verify_reports_missing_engine_configuration() {
        let source = Arc::new(MockExecutor::new(Engine::Oracle));
        let target = Arc::new(MockExecutor::new(Engine::Postgres));
        let factory = Arc::new(MockFactory { source, target });
        let mut cfg = AppConfig::default();
        cfg.rdbms.oracle = Some(EngineConfig {
            name: "orcl".into(),
            user: "u".into(),
            password: "p".into(),
            host: "h".into(),
            port: Some(1521),
            client: None,
            driver: None,
        });
        let orchestrator = MigrationOrchestrator::new(factory, Arc::new(cfg));

        let errors = orchestrator.verify(&request());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code(), 112);
        assert!(errors[0].envelope_line().contains("rdbms.postgres"));
    }

    #[tokio::test]
    async fn skipping_metadata_requires_existing_target_tables() {
        let source = Arc::new(oracle_source());
        // target knows the schema but has no PERSONS table
        let target = Arc::new(
            MockExecutor::new(Engine::Postgres).respond("schemata", vec![text_row(&["hr"])]),
        );
        let factory = Arc::new(MockFactory {
            source: Arc::clone(&source),
            target: Arc::clone(&target),
        });
        let orchestrator = MigrationOrchestrator::new(factory, app_config());

        let mut req = request();
        req.phases.metadata = false;
        req.phases.lob_data = false;
        let result = orchestrator.migrate(&req).await;

        assert_eq!(result.status, PhaseStatus::None);
        assert!(result.errors[0].contains("not present on target"), "{:?}", result.errors);
    }

    #[tokio::test]
    async fn batch_failure_leaves_partial_table_and_restores_session() {
        let source = Arc::new(oracle_source());
        let target = Arc::new(postgres_target().fail_when("INSERT INTO"));
        let factory = Arc::new(MockFactory {
            source: Arc::clone(&source),
            target: Arc::clone(&target),
        });
        let orchestrator = MigrationOrchestrator::new(factory, app_config());

        let mut req = request();
        req.phases.lob_data = false;
        let result = orchestrator.migrate(&req).await;

        assert_eq!(result.status, PhaseStatus::None);
        assert_eq!(result.tables[0].plain_status, PhaseStatus::None);
        assert!(!result.errors.is_empty());
        // restoration still happened
        assert!(target
            .statements()
            .iter()
            .any(|s| s == "SET session_replication_role = origin"));
    }

    #[tokio::test]
    async fn repeated_run_reissues_drop_then_create() {
        let source = Arc::new(oracle_source());
        let target = Arc::new(postgres_target());
        let factory = Arc::new(MockFactory {
            source: Arc::clone(&source),
            target: Arc::clone(&target),
        });
        let orchestrator = MigrationOrchestrator::new(factory, app_config());

        let mut req = request();
        req.phases.plain_data = false;
        req.phases.lob_data = false;
        orchestrator.migrate(&req).await;
        orchestrator.migrate(&req).await;

        let stmts = target.statements();
        let drops = stmts
            .iter()
            .filter(|s| s.starts_with(r#"DROP TABLE IF EXISTS "hr"."PERSONS""#))
            .count();
        let creates = stmts
            .iter()
            .filter(|s| s.starts_with(r#"CREATE TABLE "hr"."PERSONS""#))
            .count();
        assert_eq!(drops, 2);
        assert_eq!(creates, 2);
    }
}
