use anyhow::Result;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

// ─── Log level ────────────────────────────────────────────────────────────────

/// Verbosity of dbferry's own tracing output.
///
/// `Error` limits the output to failures (what the CLI's `--quiet` maps
/// to). `Info`, the default, reports phase boundaries and per-table
/// outcomes. `Debug` additionally prints every generated SQL statement
/// (`--verbose`). An explicit `RUST_LOG` in the environment always takes
/// precedence over the chosen level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    #[default]
    Info,
    Debug,
}

#[cfg(feature = "cli")]
impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Error => "dbferry=error",
            LogLevel::Info => "dbferry=info",
            LogLevel::Debug => "dbferry=debug",
        }
    }
}

/// Install the process-wide `tracing` subscriber at the given level.
///
/// Meant for the CLI and similar binary hosts: call it exactly once,
/// before the first migration entry point. Library consumers that
/// already run a subscriber of their own must not call this — a second
/// global subscriber would panic. Gated on the `cli` feature, which
/// carries the `tracing-subscriber` dependency.
#[cfg(feature = "cli")]
pub fn init_tracing(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

// ─── Public API Facade ───

pub use domain::engine::Engine;
pub use domain::error::MigrationError;
pub use domain::request::{MigrationRequest, PhaseFlags};
pub use domain::result::{MigrationResult, PhaseStatus, TableResult};
pub use domain::sql_type::SqlType;
pub use domain::value_objects::{ColumnName, QualifiedColumn, SchemaName, TableName};
pub use infrastructure::config::{AppConfig, EngineConfig, MigrationConfig};

use crate::application::orchestrator::MigrationOrchestrator;
use crate::infrastructure::db::client::PooledExecutorFactory;

// ─── Public entry points ───

/// Run the validation stage only: request parameters and both engines'
/// connection parameters. Opens no connections; an empty list means the
/// migration can be launched.
pub fn verify(config: &Arc<AppConfig>, request: &MigrationRequest) -> Vec<MigrationError> {
    let factory = Arc::new(PooledExecutorFactory::new(Arc::clone(config)));
    MigrationOrchestrator::new(factory, Arc::clone(config)).verify(request)
}

/// Run a full migration request through the pipeline: reflection, type
/// mapping, schema materialization, plain-data batches and LOB streaming,
/// as selected by the request's phase flags.
///
/// The returned [`MigrationResult`] carries per-table counts and statuses
/// plus the accumulated error lines; a failed table never aborts its
/// siblings. Use [`migrate_with_cancel`] to wire up interruption.
pub async fn migrate(
    config: &Arc<AppConfig>,
    request: &MigrationRequest,
) -> Result<MigrationResult> {
    migrate_with_cancel(config, request, Arc::new(AtomicBool::new(false))).await
}

/// [`migrate`], plus a cancellation flag checked between batches. On
/// cancellation the active transaction is rolled back and session
/// restrictions are restored before the partial result is returned.
pub async fn migrate_with_cancel(
    config: &Arc<AppConfig>,
    request: &MigrationRequest,
    cancel: Arc<AtomicBool>,
) -> Result<MigrationResult> {
    let factory = Arc::new(PooledExecutorFactory::new(Arc::clone(config)));
    let orchestrator = MigrationOrchestrator::new(factory, Arc::clone(config));
    Ok(orchestrator.migrate_with_cancel(request, cancel).await)
}
