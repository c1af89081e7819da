use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::engine::Engine;
use crate::domain::error::MigrationError;

/// One cell of a fetched or bound row.
///
/// Deliberately small: the mover never interprets values, it only carries
/// them from a source SELECT to a target INSERT. Anything a driver cannot
/// decode natively travels as `Text` (the adapters cast in SQL where
/// needed).
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            SqlValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// One positional row; the column order is the SELECT list's.
pub type SqlRow = Vec<SqlValue>;

/// Port: a live connection (or pool) to one engine.
///
/// Implemented by the sqlx AnyPool client and the blocking Oracle client;
/// the test suite substitutes an in-memory mock. All errors come back as
/// [`MigrationError`] already tagged with engine and statement.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    fn engine(&self) -> Engine;

    /// Run a SELECT without parameters and fetch every row.
    async fn fetch(&self, sql: &str) -> Result<Vec<SqlRow>, MigrationError>;

    /// Run a parameterized SELECT (engine placeholder syntax).
    async fn fetch_with(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Vec<SqlRow>, MigrationError>;

    /// Execute a statement in autocommit mode; returns affected rows.
    async fn execute(&self, sql: &str) -> Result<u64, MigrationError>;

    /// Open an explicit transaction.
    async fn begin(&self) -> Result<Box<dyn SqlTransaction>, MigrationError>;
}

/// Port: one explicit transaction. Dropped without commit = rolled back.
#[async_trait]
pub trait SqlTransaction: Send {
    async fn execute_with(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<u64, MigrationError>;

    async fn commit(self: Box<Self>) -> Result<(), MigrationError>;

    async fn rollback(self: Box<Self>) -> Result<(), MigrationError>;
}

/// Port: opens executors from configured connection parameters.
///
/// Owned by the orchestrator; each phase (and each worker) asks for its
/// own executor and releases it on phase exit, so connection ownership is
/// scoped and release is guaranteed on every exit path.
#[async_trait]
pub trait ExecutorFactory: Send + Sync {
    async fn connect(&self, engine: Engine) -> Result<Arc<dyn SqlExecutor>, MigrationError>;
}
