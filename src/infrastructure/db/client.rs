use async_trait::async_trait;
use sqlx::any::{Any, AnyArguments, AnyPoolOptions};
use sqlx::query::Query;
use sqlx::AnyPool;
use std::sync::Arc;
use tracing::debug;

use crate::domain::engine::Engine;
use crate::domain::error::MigrationError;
use crate::domain::ports::{ExecutorFactory, SqlExecutor, SqlRow, SqlTransaction, SqlValue};
use crate::infrastructure::config::{AppConfig, EngineConfig};
use crate::infrastructure::db::row_mapper::row_to_values;

/// sqlx-backed executor. One pool per endpoint; PostgreSQL and MySQL are
/// covered by the Any driver set compiled into this crate's features.
pub struct SqlxExecutor {
    pool: AnyPool,
    engine: Engine,
}

/// Connect to the engine described in `cfg` and return a `SqlxExecutor`.
pub async fn connect(engine: Engine, cfg: &EngineConfig) -> Result<SqlxExecutor, MigrationError> {
    sqlx::any::install_default_drivers();

    let pool = AnyPoolOptions::new()
        .max_connections(5)
        .connect(&cfg.url(engine))
        .await
        .map_err(|e| {
            MigrationError::operation(
                "connect",
                format!("[{engine}] {} at {}: {e}", cfg.name, cfg.host),
            )
        })?;

    debug!("Connected to {}/{} via {} driver", cfg.host, cfg.name, engine);

    Ok(SqlxExecutor { pool, engine })
}

fn bind_value<'q>(
    query: Query<'q, Any, AnyArguments<'q>>,
    value: &SqlValue,
) -> Query<'q, Any, AnyArguments<'q>> {
    match value {
        SqlValue::Null => query.bind(Option::<String>::None),
        SqlValue::Bool(b) => query.bind(*b),
        SqlValue::Int(i) => query.bind(*i),
        SqlValue::Float(f) => query.bind(*f),
        SqlValue::Text(s) => query.bind(s.clone()),
        SqlValue::Bytes(b) => query.bind(b.clone()),
    }
}

#[async_trait]
impl SqlExecutor for SqlxExecutor {
    fn engine(&self) -> Engine {
        self.engine
    }

    async fn fetch(&self, sql: &str) -> Result<Vec<SqlRow>, MigrationError> {
        debug!("Executing: {sql}");
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrationError::db(self.engine, "fetch", sql, e.to_string()))?;
        rows.iter().map(row_to_values).collect()
    }

    async fn fetch_with(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Vec<SqlRow>, MigrationError> {
        debug!("Executing: {sql}");
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_value(query, param);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrationError::db(self.engine, "fetch", sql, e.to_string()))?;
        rows.iter().map(row_to_values).collect()
    }

    async fn execute(&self, sql: &str) -> Result<u64, MigrationError> {
        debug!("Executing: {sql}");
        let result = sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| MigrationError::db(self.engine, "execute", sql, e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn begin(&self) -> Result<Box<dyn SqlTransaction>, MigrationError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MigrationError::db(self.engine, "begin", "BEGIN", e.to_string()))?;
        Ok(Box::new(SqlxTransaction {
            tx: Some(tx),
            engine: self.engine,
        }))
    }
}

struct SqlxTransaction {
    tx: Option<sqlx::Transaction<'static, Any>>,
    engine: Engine,
}

#[async_trait]
impl SqlTransaction for SqlxTransaction {
    async fn execute_with(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<u64, MigrationError> {
        let tx = self
            .tx
            .as_mut()
            .ok_or_else(|| MigrationError::unexpected("transaction already closed"))?;
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_value(query, param);
        }
        let result = query
            .execute(&mut **tx)
            .await
            .map_err(|e| MigrationError::db(self.engine, "execute", sql, e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), MigrationError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| MigrationError::unexpected("transaction already closed"))?;
        tx.commit()
            .await
            .map_err(|e| MigrationError::db(self.engine, "commit", "COMMIT", e.to_string()))
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), MigrationError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| MigrationError::unexpected("transaction already closed"))?;
        tx.rollback()
            .await
            .map_err(|e| MigrationError::db(self.engine, "rollback", "ROLLBACK", e.to_string()))
    }
}

/// Production [`ExecutorFactory`]: resolves connection parameters from
/// the loaded configuration and picks the driver per engine.
pub struct PooledExecutorFactory {
    config: Arc<AppConfig>,
}

impl PooledExecutorFactory {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ExecutorFactory for PooledExecutorFactory {
    async fn connect(&self, engine: Engine) -> Result<Arc<dyn SqlExecutor>, MigrationError> {
        let cfg = self
            .config
            .engine(engine)
            .ok_or_else(|| MigrationError::required(format!("rdbms.{engine}")))?;

        match engine {
            Engine::Postgres | Engine::Mysql => Ok(Arc::new(connect(engine, cfg).await?)),
            #[cfg(feature = "oracle")]
            Engine::Oracle => Ok(Arc::new(
                crate::infrastructure::db::oracle_client::connect(cfg).await?,
            )),
            #[cfg(not(feature = "oracle"))]
            Engine::Oracle => Err(MigrationError::operation(
                "connect",
                "[oracle] no live driver built in; rebuild with the `oracle` feature",
            )),
            Engine::SqlServer => Err(MigrationError::operation(
                "connect",
                "[sqlserver] no live driver bundled; dialect support only",
            )),
        }
    }
}
