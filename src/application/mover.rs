use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::error::MigrationError;
use crate::domain::ports::{SqlExecutor, SqlValue};
use crate::domain::result::PhaseStatus;
use crate::domain::sql_type::SqlType;
use crate::domain::table::TableDescriptor;
use crate::domain::value_objects::SchemaName;
use crate::infrastructure::db::adapter::{adapter_for, EngineAdapter, SessionToggle};

/// Outcome of moving one table through one phase.
#[derive(Debug)]
pub struct MoveOutcome {
    pub count: u64,
    pub status: PhaseStatus,
    pub errors: Vec<MigrationError>,
}

impl MoveOutcome {
    fn clean(count: u64) -> Self {
        Self {
            count,
            status: PhaseStatus::Full,
            errors: Vec::new(),
        }
    }

    fn failed(count: u64, errors: Vec<MigrationError>) -> Self {
        Self {
            count,
            status: if count > 0 {
                PhaseStatus::Partial
            } else {
                PhaseStatus::None
            },
            errors,
        }
    }
}

/// Session restrictions disabled around the whole data phase.
///
/// Toggles with a probe have their prior value captured so restoration
/// puts back exactly what was there; the rest restore to the engine
/// default. [`SessionGate::restore`] is called on every exit path —
/// success, error and cancellation.
pub struct SessionGate {
    executor: Arc<dyn SqlExecutor>,
    restores: Vec<String>,
}

impl SessionGate {
    pub async fn disable(executor: Arc<dyn SqlExecutor>) -> Result<Self, MigrationError> {
        let toggles = adapter_for(executor.engine()).session_restrictions();
        let mut restores: Vec<String> = Vec::with_capacity(toggles.len());
        for toggle in &toggles {
            let restore = Self::restore_statement(&executor, toggle).await;
            if let Err(e) = executor.execute(&toggle.disable_sql).await {
                // put back whatever was already relaxed before bailing
                for undo in &restores {
                    let _ = executor.execute(undo.as_str()).await;
                }
                return Err(e);
            }
            restores.push(restore);
            debug!("Disabled session restriction {}", toggle.name);
        }
        Ok(Self { executor, restores })
    }

    async fn restore_statement(executor: &Arc<dyn SqlExecutor>, toggle: &SessionToggle) -> String {
        if let (Some(probe), Some(template)) = (&toggle.probe_sql, toggle.restore_template) {
            if let Ok(rows) = executor.fetch(probe).await {
                let probed = rows.first().and_then(|row| match row.first() {
                    Some(SqlValue::Text(s)) => Some(s.clone()),
                    Some(SqlValue::Int(i)) => Some(i.to_string()),
                    Some(SqlValue::Bool(b)) => Some(if *b { "1" } else { "0" }.to_string()),
                    _ => None,
                });
                if let Some(value) = probed {
                    return template.replace("{value}", &value);
                }
            }
        }
        toggle.restore_default_sql.clone()
    }

    /// Restore every captured toggle. Failures are reported, not raised:
    /// restoration must attempt every toggle even when one fails.
    pub async fn restore(self) -> Vec<MigrationError> {
        let mut errors = Vec::new();
        for restore in &self.restores {
            if let Err(e) = self.executor.execute(restore).await {
                errors.push(e);
            }
        }
        errors
    }
}

/// Streams one table at a time: plain rows in committed batches, LOB
/// columns in per-row chunked transactions.
pub struct DataMover {
    source: Arc<dyn SqlExecutor>,
    target: Arc<dyn SqlExecutor>,
    batch_size: u64,
    chunk_size: u64,
    timeout: Option<Duration>,
    cancel: Arc<AtomicBool>,
}

impl DataMover {
    pub fn new(
        source: Arc<dyn SqlExecutor>,
        target: Arc<dyn SqlExecutor>,
        batch_size: u64,
        chunk_size: u64,
        timeout: Option<Duration>,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source,
            target,
            batch_size,
            chunk_size,
            timeout,
            cancel,
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    async fn timed<T, F>(&self, operation: &str, fut: F) -> Result<T, MigrationError>
    where
        F: std::future::Future<Output = Result<T, MigrationError>>,
    {
        match self.timeout {
            None => fut.await,
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                MigrationError::operation(
                    operation,
                    format!("statement timed out after {}s", limit.as_secs()),
                )
            })?,
        }
    }

    /// Batched plain-data copy for one table. Batches commit in offset
    /// order; the first failure abandons the table (its committed prefix
    /// stays visible) and the caller proceeds with the next one.
    pub async fn move_plain(
        &self,
        source_schema: &SchemaName,
        target_schema: &SchemaName,
        table: &TableDescriptor,
    ) -> MoveOutcome {
        let src = adapter_for(self.source.engine());
        let tgt = adapter_for(self.target.engine());

        let columns = table.plain_columns();
        if columns.is_empty() {
            return MoveOutcome::clean(0);
        }

        let select_list: Vec<String> = columns
            .iter()
            .map(|c| src.select_expr(&src.quote_ident(&c.name.0), &c.source_type))
            .collect();
        let insert_columns: Vec<String> =
            columns.iter().map(|c| tgt.quote_ident(&c.name.0)).collect();
        let target_types: Vec<SqlType> = columns
            .iter()
            .map(|c| c.target_type.clone().unwrap_or_else(|| c.source_type.clone()))
            .collect();
        let order_by = order_keys(src, table);
        let insert_sql = tgt.bulk_insert_sql(
            &target_schema.0,
            &table.name.0,
            &insert_columns,
            &target_types,
        );

        let toggles = tgt.table_restrictions(&target_schema.0, &table.name.0);
        for toggle in &toggles {
            if let Err(e) = self.target.execute(&toggle.disable_sql).await {
                warn!("table restriction not disabled: {e}");
            }
        }

        let outcome = self
            .plain_batch_loop(src, source_schema, table, &select_list, &order_by, &insert_sql, &target_types)
            .await;

        for toggle in &toggles {
            if let Err(e) = self.target.execute(&toggle.restore_sql).await {
                warn!("table restriction not restored: {e}");
            }
        }

        info!(
            "Table {}: {} plain rows migrated ({:?})",
            table.name.0, outcome.count, outcome.status
        );
        outcome
    }

    #[allow(clippy::too_many_arguments)]
    async fn plain_batch_loop(
        &self,
        src: &'static dyn EngineAdapter,
        source_schema: &SchemaName,
        table: &TableDescriptor,
        select_list: &[String],
        order_by: &[String],
        insert_sql: &str,
        target_types: &[SqlType],
    ) -> MoveOutcome {
        let mut offset = 0u64;
        let mut migrated = 0u64;

        loop {
            if self.cancelled() {
                debug!("Cancelled before batch at offset {offset}");
                return MoveOutcome {
                    count: migrated,
                    status: if migrated > 0 {
                        PhaseStatus::Partial
                    } else {
                        PhaseStatus::None
                    },
                    errors: Vec::new(),
                };
            }

            let select = src.paginated_select(
                &source_schema.0,
                &table.name.0,
                select_list,
                order_by,
                offset,
                self.batch_size,
            );
            let rows = match self.timed("bulk-select", self.source.fetch(&select)).await {
                Ok(rows) => rows,
                Err(e) => return MoveOutcome::failed(migrated, vec![e]),
            };
            if rows.is_empty() {
                return MoveOutcome::clean(migrated);
            }
            let fetched = rows.len() as u64;

            let mut tx = match self.target.begin().await {
                Ok(tx) => tx,
                Err(e) => return MoveOutcome::failed(migrated, vec![e]),
            };
            for row in rows {
                let params: Vec<SqlValue> = row
                    .into_iter()
                    .zip(target_types)
                    .map(|(value, ty)| coerce_for_target(value, ty))
                    .collect();
                if let Err(e) = self
                    .timed("bulk-insert", tx.execute_with(insert_sql, &params))
                    .await
                {
                    let _ = tx.rollback().await;
                    return MoveOutcome::failed(migrated, vec![e]);
                }
            }
            if let Err(e) = tx.commit().await {
                return MoveOutcome::failed(migrated, vec![e]);
            }

            migrated += fetched;
            offset += fetched;
        }
    }

    /// Chunked LOB copy for one table. Rows are addressed by primary key
    /// (or the engine's physical row id); one row is one transaction;
    /// null LOBs stay null and do not count.
    pub async fn move_lobs(
        &self,
        source_schema: &SchemaName,
        target_schema: &SchemaName,
        table: &TableDescriptor,
    ) -> MoveOutcome {
        let src = adapter_for(self.source.engine());
        let tgt = adapter_for(self.target.engine());

        let lob_columns = table.lob_columns();
        if lob_columns.is_empty() {
            return MoveOutcome {
                count: 0,
                status: PhaseStatus::None,
                errors: Vec::new(),
            };
        }

        // a physical row id cannot re-identify the row on the target
        // side, so the LOB path needs a real primary key
        let pk = table.primary_key();
        if pk.is_empty() {
            return MoveOutcome::failed(
                0,
                vec![MigrationError::operation(
                    "lob-migration",
                    format!(
                        "table {} has no primary key; LOB rows cannot be addressed",
                        table.name.0
                    ),
                )],
            );
        }
        let names: Vec<String> = pk.iter().map(|c| c.0.clone()).collect();
        let key_selects: Vec<String> = names.iter().map(|n| src.quote_ident(n)).collect();
        let write_preds = tgt.key_predicates(&names, 2);

        let chunk = match tgt.lob_chunk_ceiling() {
            Some(ceiling) => self.chunk_size.min(ceiling),
            None => self.chunk_size,
        }
        .max(1);

        let mut migrated = 0u64;
        let mut errors: Vec<MigrationError> = Vec::new();
        let mut offset = 0u64;

        loop {
            if self.cancelled() {
                break;
            }
            let page = src.paginated_select(
                &source_schema.0,
                &table.name.0,
                &key_selects,
                &key_selects,
                offset,
                self.batch_size,
            );
            let key_rows = match self.timed("lob-select", self.source.fetch(&page)).await {
                Ok(rows) => rows,
                Err(e) => {
                    errors.push(e);
                    break;
                }
            };
            if key_rows.is_empty() {
                break;
            }
            let fetched = key_rows.len() as u64;

            for key_row in key_rows {
                if self.cancelled() {
                    break;
                }
                match self
                    .move_row_lobs(
                        src,
                        tgt,
                        source_schema,
                        target_schema,
                        table,
                        &lob_columns,
                        &key_row,
                        &write_preds,
                        chunk,
                    )
                    .await
                {
                    Ok(written) => migrated += written,
                    Err(e) => errors.push(e),
                }
            }
            offset += fetched;
        }

        let status = if errors.is_empty() {
            PhaseStatus::Full
        } else if migrated > 0 {
            PhaseStatus::Partial
        } else {
            PhaseStatus::None
        };
        info!(
            "Table {}: {} LOBs migrated ({:?})",
            table.name.0, migrated, status
        );
        MoveOutcome {
            count: migrated,
            status,
            errors,
        }
    }

    /// Copy every LOB column of a single row inside one transaction.
    /// Returns how many non-null LOBs were written.
    #[allow(clippy::too_many_arguments)]
    async fn move_row_lobs(
        &self,
        src: &'static dyn EngineAdapter,
        tgt: &'static dyn EngineAdapter,
        source_schema: &SchemaName,
        target_schema: &SchemaName,
        table: &TableDescriptor,
        lob_columns: &[&crate::domain::table::ColumnDescriptor],
        key_row: &[SqlValue],
        write_preds: &[String],
        chunk: u64,
    ) -> Result<u64, MigrationError> {
        let pk_names: Vec<String> = table.primary_key().iter().map(|c| c.0.clone()).collect();
        let read_preds = src.key_predicates(&pk_names, 1);

        let mut tx: Option<Box<dyn crate::domain::ports::SqlTransaction>> = None;
        let mut written = 0u64;

        for column in lob_columns {
            let binary = !matches!(
                column.target_type.as_ref().unwrap_or(&column.source_type),
                SqlType::Clob | SqlType::Text | SqlType::Xml
            );
            let mut offset = 0u64;
            let mut first = true;
            loop {
                let select = src.lob_chunk_select(
                    &source_schema.0,
                    &table.name.0,
                    &column.name.0,
                    &read_preds,
                    offset,
                    chunk,
                );
                let rows = self
                    .timed("lob-read", self.source.fetch_with(&select, key_row))
                    .await?;
                let cell = rows
                    .first()
                    .and_then(|r| r.first())
                    .cloned()
                    .unwrap_or(SqlValue::Null);

                // NULL at the start means the LOB itself is NULL: leave
                // the target NULL and do not count it
                if cell.is_null() && offset == 0 {
                    break;
                }
                let (len, value) = match cell {
                    SqlValue::Bytes(b) => (b.len() as u64, SqlValue::Bytes(b)),
                    SqlValue::Text(s) => (s.chars().count() as u64, SqlValue::Text(s)),
                    _ => (0, SqlValue::Null),
                };
                if len == 0 && offset > 0 {
                    break;
                }

                let write_sql = if first {
                    tgt.lob_write_first(
                        &target_schema.0,
                        &table.name.0,
                        &column.name.0,
                        write_preds,
                    )
                } else {
                    tgt.lob_write_append(
                        &target_schema.0,
                        &table.name.0,
                        &column.name.0,
                        write_preds,
                        binary,
                    )
                };
                let mut params = Vec::with_capacity(1 + key_row.len());
                params.push(value);
                params.extend(key_row.iter().cloned());

                if tx.is_none() {
                    tx = Some(self.target.begin().await?);
                }
                let Some(active) = tx.as_mut() else {
                    return Err(MigrationError::unexpected("row transaction not open"));
                };
                if let Err(e) = self
                    .timed("lob-write", active.execute_with(&write_sql, &params))
                    .await
                {
                    if let Some(open) = tx.take() {
                        let _ = open.rollback().await;
                    }
                    return Err(e);
                }

                if first {
                    written += 1;
                    first = false;
                }
                if len < chunk {
                    break;
                }
                offset += len;
            }
        }

        if let Some(open) = tx.take() {
            open.commit().await?;
        }
        Ok(written)
    }
}

/// Ordering keys guaranteeing a total order for pagination: primary key,
/// else the physical row id, else every column.
fn order_keys(adapter: &'static dyn EngineAdapter, table: &TableDescriptor) -> Vec<String> {
    let pk = table.primary_key();
    if !pk.is_empty() {
        return pk.iter().map(|c| adapter.quote_ident(&c.0)).collect();
    }
    if let Some(id) = adapter.physical_row_identifier() {
        return vec![id.select_expr.to_string()];
    }
    table
        .plain_columns()
        .iter()
        .map(|c| adapter.quote_ident(&c.name.0))
        .collect()
}

/// Bridge driver asymmetries between source decode and target bind.
fn coerce_for_target(value: SqlValue, target_type: &SqlType) -> SqlValue {
    match value {
        // text-shaped bytes (MySQL CONVERT quirk) into non-binary columns
        SqlValue::Bytes(b)
            if !matches!(
                target_type,
                SqlType::Binary(_) | SqlType::VarBinary(_) | SqlType::Blob | SqlType::Other(_)
            ) =>
        {
            SqlValue::Text(String::from_utf8_lossy(&b).into_owned())
        }
        SqlValue::Int(i) if matches!(target_type, SqlType::Bool) => SqlValue::Bool(i != 0),
        SqlValue::Bool(b) if matches!(target_type, SqlType::Int { .. }) => {
            SqlValue::Int(i64::from(b))
        }
        other => other,
    }
}
