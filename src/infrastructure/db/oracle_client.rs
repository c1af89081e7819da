use async_trait::async_trait;
use oracle::sql_type::{OracleType, ToSql};
use oracle::Connection;
use std::sync::Arc;
use tracing::debug;

use crate::domain::engine::Engine;
use crate::domain::error::MigrationError;
use crate::domain::ports::{SqlExecutor, SqlRow, SqlTransaction, SqlValue};
use crate::infrastructure::config::EngineConfig;

/// Oracle executor over the blocking `oracle` crate, bridged with
/// `spawn_blocking`.
///
/// One dedicated connection per executor (each worker opens its own).
/// The connection runs with autocommit off; `execute` commits after
/// each statement, transactions commit explicitly — which is exactly
/// Oracle's native model.
pub struct OracleExecutor {
    conn: Arc<Connection>,
}

pub async fn connect(cfg: &EngineConfig) -> Result<OracleExecutor, MigrationError> {
    if let Some(client) = &cfg.client {
        // ODPI-C locates the instant client through the loader path
        debug!("Oracle client libraries expected at {client}");
    }
    let user = cfg.user.clone();
    let password = cfg.password.clone();
    let connect_string = format!(
        "//{}:{}/{}",
        cfg.host,
        cfg.port.unwrap_or_else(|| Engine::Oracle.default_port()),
        cfg.name
    );
    let name = cfg.name.clone();
    let host = cfg.host.clone();

    let conn = tokio::task::spawn_blocking(move || {
        Connection::connect(&user, &password, &connect_string)
    })
    .await
    .map_err(|e| MigrationError::unexpected(e.to_string()))?
    .map_err(|e| {
        MigrationError::operation("connect", format!("[oracle] {name} at {host}: {e}"))
    })?;

    debug!("Connected to {host}/{name} via oracle driver");

    Ok(OracleExecutor {
        conn: Arc::new(conn),
    })
}

fn db_err(operation: &str, sql: &str, e: oracle::Error) -> MigrationError {
    MigrationError::db(Engine::Oracle, operation, sql, e.to_string())
}

fn to_sql_params(params: &[SqlValue]) -> Vec<Box<dyn ToSql>> {
    params
        .iter()
        .map(|p| -> Box<dyn ToSql> {
            match p {
                SqlValue::Null => Box::new(None::<String>),
                SqlValue::Bool(b) => Box::new(i64::from(*b)),
                SqlValue::Int(i) => Box::new(*i),
                SqlValue::Float(f) => Box::new(*f),
                SqlValue::Text(s) => Box::new(s.clone()),
                SqlValue::Bytes(b) => Box::new(b.clone()),
            }
        })
        .collect()
}

/// Decode one cell according to its catalog type: binary columns as
/// bytes, exact integers as i64, floats as f64, everything else as text
/// (Oracle renders numbers and timestamps to strings losslessly).
fn decode_cell(row: &oracle::Row, idx: usize, ty: &OracleType) -> Result<SqlValue, MigrationError> {
    let decode_err =
        |e: oracle::Error| MigrationError::operation("row-decode", format!("column {idx}: {e}"));
    let value = match ty {
        OracleType::Raw(_) | OracleType::LongRaw | OracleType::BLOB => row
            .get::<usize, Option<Vec<u8>>>(idx)
            .map_err(decode_err)?
            .map_or(SqlValue::Null, SqlValue::Bytes),
        OracleType::BinaryFloat | OracleType::BinaryDouble => row
            .get::<usize, Option<f64>>(idx)
            .map_err(decode_err)?
            .map_or(SqlValue::Null, SqlValue::Float),
        OracleType::Number(precision, 0) if *precision > 0 && *precision <= 18 => row
            .get::<usize, Option<i64>>(idx)
            .map_err(decode_err)?
            .map_or(SqlValue::Null, SqlValue::Int),
        _ => row
            .get::<usize, Option<String>>(idx)
            .map_err(decode_err)?
            .map_or(SqlValue::Null, SqlValue::Text),
    };
    Ok(value)
}

fn fetch_blocking(conn: &Connection, sql: &str) -> Result<Vec<SqlRow>, MigrationError> {
    let rows = conn.query(sql, &[]).map_err(|e| db_err("fetch", sql, e))?;
    let types: Vec<OracleType> = rows
        .column_info()
        .iter()
        .map(|ci| ci.oracle_type().clone())
        .collect();
    let mut out = Vec::new();
    for row in rows {
        let row = row.map_err(|e| db_err("fetch", sql, e))?;
        let mut values = Vec::with_capacity(types.len());
        for (idx, ty) in types.iter().enumerate() {
            values.push(decode_cell(&row, idx, ty)?);
        }
        out.push(values);
    }
    Ok(out)
}

#[async_trait]
impl SqlExecutor for OracleExecutor {
    fn engine(&self) -> Engine {
        Engine::Oracle
    }

    async fn fetch(&self, sql: &str) -> Result<Vec<SqlRow>, MigrationError> {
        debug!("Executing: {sql}");
        let conn = Arc::clone(&self.conn);
        let sql = sql.to_string();
        tokio::task::spawn_blocking(move || fetch_blocking(&conn, &sql))
            .await
            .map_err(|e| MigrationError::unexpected(e.to_string()))?
    }

    async fn fetch_with(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Vec<SqlRow>, MigrationError> {
        debug!("Executing: {sql}");
        let conn = Arc::clone(&self.conn);
        let sql = sql.to_string();
        let params = params.to_vec();
        tokio::task::spawn_blocking(move || {
            let boxed = to_sql_params(&params);
            let refs: Vec<&dyn ToSql> = boxed.iter().map(|b| b.as_ref()).collect();
            let rows = conn
                .query(&sql, &refs)
                .map_err(|e| db_err("fetch", &sql, e))?;
            let types: Vec<OracleType> = rows
                .column_info()
                .iter()
                .map(|ci| ci.oracle_type().clone())
                .collect();
            let mut out = Vec::new();
            for row in rows {
                let row = row.map_err(|e| db_err("fetch", &sql, e))?;
                let mut values = Vec::with_capacity(types.len());
                for (idx, ty) in types.iter().enumerate() {
                    values.push(decode_cell(&row, idx, ty)?);
                }
                out.push(values);
            }
            Ok(out)
        })
        .await
        .map_err(|e| MigrationError::unexpected(e.to_string()))?
    }

    async fn execute(&self, sql: &str) -> Result<u64, MigrationError> {
        debug!("Executing: {sql}");
        let conn = Arc::clone(&self.conn);
        let sql = sql.to_string();
        tokio::task::spawn_blocking(move || {
            let stmt = conn.execute(&sql, &[]).map_err(|e| db_err("execute", &sql, e))?;
            let affected = stmt.row_count().unwrap_or(0);
            conn.commit().map_err(|e| db_err("commit", &sql, e))?;
            Ok(affected)
        })
        .await
        .map_err(|e| MigrationError::unexpected(e.to_string()))?
    }

    async fn begin(&self) -> Result<Box<dyn SqlTransaction>, MigrationError> {
        Ok(Box::new(OracleTransaction {
            conn: Arc::clone(&self.conn),
        }))
    }
}

struct OracleTransaction {
    conn: Arc<Connection>,
}

#[async_trait]
impl SqlTransaction for OracleTransaction {
    async fn execute_with(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<u64, MigrationError> {
        let conn = Arc::clone(&self.conn);
        let sql = sql.to_string();
        let params = params.to_vec();
        tokio::task::spawn_blocking(move || {
            let boxed = to_sql_params(&params);
            let refs: Vec<&dyn ToSql> = boxed.iter().map(|b| b.as_ref()).collect();
            let stmt = conn
                .execute(&sql, &refs)
                .map_err(|e| db_err("execute", &sql, e))?;
            Ok(stmt.row_count().unwrap_or(0))
        })
        .await
        .map_err(|e| MigrationError::unexpected(e.to_string()))?
    }

    async fn commit(self: Box<Self>) -> Result<(), MigrationError> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            conn.commit().map_err(|e| db_err("commit", "COMMIT", e))
        })
        .await
        .map_err(|e| MigrationError::unexpected(e.to_string()))?
    }

    async fn rollback(self: Box<Self>) -> Result<(), MigrationError> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            conn.rollback().map_err(|e| db_err("rollback", "ROLLBACK", e))
        })
        .await
        .map_err(|e| MigrationError::unexpected(e.to_string()))?
    }
}
