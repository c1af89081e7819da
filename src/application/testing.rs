//! In-memory [`SqlExecutor`] used by the service tests: canned result
//! sets keyed by SQL substring, a statement log, and failure injection.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::domain::engine::Engine;
use crate::domain::error::MigrationError;
use crate::domain::ports::{ExecutorFactory, SqlExecutor, SqlRow, SqlTransaction, SqlValue};

#[derive(Default)]
pub struct MockState {
    /// (substring, required first param, rows) — first match wins.
    pub responses: Vec<(String, Option<SqlValue>, Vec<SqlRow>)>,
    /// Substrings that make any call fail.
    pub fail_contains: Vec<String>,
    /// Every statement seen, in order (fetches and executes).
    pub statements: Vec<String>,
    /// Rows committed through transactions: (sql, params).
    pub committed: Vec<(String, Vec<SqlValue>)>,
    /// Number of committed transactions.
    pub commits: usize,
    /// Number of rolled-back transactions.
    pub rollbacks: usize,
}

pub struct MockExecutor {
    engine: Engine,
    pub state: Arc<Mutex<MockState>>,
}

impl MockExecutor {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub fn respond(self, substring: &str, rows: Vec<SqlRow>) -> Self {
        self.state
            .lock()
            .unwrap()
            .responses
            .push((substring.to_string(), None, rows));
        self
    }

    /// Like [`respond`], but only when the first bound parameter equals
    /// `param` — lets per-row queries (same SQL, different key) differ.
    pub fn respond_for_param(self, substring: &str, param: SqlValue, rows: Vec<SqlRow>) -> Self {
        self.state
            .lock()
            .unwrap()
            .responses
            .push((substring.to_string(), Some(param), rows));
        self
    }

    pub fn fail_when(self, substring: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .fail_contains
            .push(substring.to_string());
        self
    }

    pub fn statements(&self) -> Vec<String> {
        self.state.lock().unwrap().statements.clone()
    }

    pub fn committed(&self) -> Vec<(String, Vec<SqlValue>)> {
        self.state.lock().unwrap().committed.clone()
    }

    pub fn commits(&self) -> usize {
        self.state.lock().unwrap().commits
    }

    fn check_fail(&self, sql: &str) -> Result<(), MigrationError> {
        let state = self.state.lock().unwrap();
        for pattern in &state.fail_contains {
            if sql.contains(pattern.as_str()) {
                return Err(MigrationError::db(
                    self.engine,
                    "mock",
                    sql,
                    "injected failure",
                ));
            }
        }
        Ok(())
    }

    fn lookup(&self, sql: &str, params: &[SqlValue]) -> Vec<SqlRow> {
        let state = self.state.lock().unwrap();
        for (pattern, wanted_param, rows) in &state.responses {
            if !sql.contains(pattern.as_str()) {
                continue;
            }
            match wanted_param {
                None => return rows.clone(),
                Some(p) if params.first() == Some(p) => return rows.clone(),
                Some(_) => continue,
            }
        }
        Vec::new()
    }
}

#[async_trait]
impl SqlExecutor for MockExecutor {
    fn engine(&self) -> Engine {
        self.engine
    }

    async fn fetch(&self, sql: &str) -> Result<Vec<SqlRow>, MigrationError> {
        self.state.lock().unwrap().statements.push(sql.to_string());
        self.check_fail(sql)?;
        Ok(self.lookup(sql, &[]))
    }

    async fn fetch_with(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Vec<SqlRow>, MigrationError> {
        self.state.lock().unwrap().statements.push(sql.to_string());
        self.check_fail(sql)?;
        Ok(self.lookup(sql, params))
    }

    async fn execute(&self, sql: &str) -> Result<u64, MigrationError> {
        self.state.lock().unwrap().statements.push(sql.to_string());
        self.check_fail(sql)?;
        Ok(0)
    }

    async fn begin(&self) -> Result<Box<dyn SqlTransaction>, MigrationError> {
        Ok(Box::new(MockTransaction {
            engine: self.engine,
            state: Arc::clone(&self.state),
            pending: Vec::new(),
        }))
    }
}

pub struct MockTransaction {
    engine: Engine,
    state: Arc<Mutex<MockState>>,
    pending: Vec<(String, Vec<SqlValue>)>,
}

#[async_trait]
impl SqlTransaction for MockTransaction {
    async fn execute_with(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<u64, MigrationError> {
        {
            let state = self.state.lock().unwrap();
            for pattern in &state.fail_contains {
                if sql.contains(pattern.as_str()) {
                    return Err(MigrationError::db(
                        self.engine,
                        "mock",
                        sql,
                        "injected failure",
                    ));
                }
            }
        }
        self.pending.push((sql.to_string(), params.to_vec()));
        Ok(1)
    }

    async fn commit(self: Box<Self>) -> Result<(), MigrationError> {
        let mut state = self.state.lock().unwrap();
        state.committed.extend(self.pending.clone());
        state.commits += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), MigrationError> {
        let mut state = self.state.lock().unwrap();
        state.rollbacks += 1;
        Ok(())
    }
}

/// Factory handing out pre-built mocks per engine.
pub struct MockFactory {
    pub source: Arc<MockExecutor>,
    pub target: Arc<MockExecutor>,
}

#[async_trait]
impl ExecutorFactory for MockFactory {
    async fn connect(&self, engine: Engine) -> Result<Arc<dyn SqlExecutor>, MigrationError> {
        if engine == self.source.engine() {
            Ok(Arc::clone(&self.source) as Arc<dyn SqlExecutor>)
        } else if engine == self.target.engine() {
            Ok(Arc::clone(&self.target) as Arc<dyn SqlExecutor>)
        } else {
            Err(MigrationError::required(format!("rdbms.{engine}")))
        }
    }
}

/// Shorthand for a row of text cells.
pub fn text_row(cells: &[&str]) -> SqlRow {
    cells
        .iter()
        .map(|c| {
            if *c == "<null>" {
                SqlValue::Null
            } else {
                SqlValue::Text(c.to_string())
            }
        })
        .collect()
}
