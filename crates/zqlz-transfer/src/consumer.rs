//! Target-side loading: DDL, row binding, batched inserts and commit cadence

use async_trait::async_trait;
use zqlz_core::{ColumnMeta, Row, Value, ZqlzError};

use crate::{
    ConsumerSettings, Disposition, MappingKind, TableMapping, TargetContainer, TargetTable,
    TransferError, TransferMonitor, TransferResult, TransferSession, ddl,
};

/// Upper bound on bind parameters in one multi-row `INSERT`
const MAX_PARAMS_PER_STATEMENT: usize = 999;

/// Receives rows pushed by a source read.
///
/// Every read is bracketed by `fetch_start` and `fetch_end`; a segmented
/// transfer produces one bracket per segment.
#[async_trait]
pub trait DataConsumer: Send {
    async fn fetch_start(
        &mut self,
        columns: &[ColumnMeta],
        offset: u64,
        limit: Option<u64>,
    ) -> TransferResult<()>;

    async fn fetch_row(&mut self, row: Row) -> TransferResult<()>;

    async fn fetch_end(&mut self) -> TransferResult<()>;
}

/// Loads rows for one table mapping into the target database
pub struct DatabaseTransferConsumer {
    mapping: TableMapping,
    container: TargetContainer,
    settings: ConsumerSettings,
    monitor: TransferMonitor,
    session: Option<TransferSession>,
    /// Position in the insert column list for each incoming column; `None` drops it
    bindings: Vec<Option<usize>>,
    insert_prefix: String,
    insert_width: usize,
    pending: Vec<Vec<Value>>,
    rows_exported: u64,
    truncated: bool,
}

impl DatabaseTransferConsumer {
    pub fn new(
        mapping: TableMapping,
        container: TargetContainer,
        settings: ConsumerSettings,
        monitor: TransferMonitor,
    ) -> Self {
        Self {
            mapping,
            container,
            settings,
            monitor,
            session: None,
            bindings: Vec::new(),
            insert_prefix: String::new(),
            insert_width: 0,
            pending: Vec::new(),
            rows_exported: 0,
            truncated: false,
        }
    }

    pub fn mapping(&self) -> &TableMapping {
        &self.mapping
    }

    /// Rows accepted so far
    pub fn rows_exported(&self) -> u64 {
        self.rows_exported
    }

    /// Target label reflecting the mapping disposition
    pub fn target_name(&self) -> String {
        match self.mapping.disposition() {
            Disposition::Create => format!("{} [Create]", self.mapping.target_name()),
            Disposition::Existing(table) => format!("{} [Insert]", table.name()),
            Disposition::Skip => "[Skip]".to_string(),
            Disposition::Unresolved => "?".to_string(),
        }
    }

    /// Create missing target objects before any row is delivered.
    ///
    /// A created table is looked up again afterwards and becomes an existing
    /// mapping, so rows are bound against the real target columns.
    #[tracing::instrument(skip(self), fields(target = %self.mapping.target_name()))]
    pub async fn start_transfer(&mut self) -> TransferResult<()> {
        self.monitor.check_cancelled()?;
        self.mapping.ensure_columns(&self.monitor).await?;

        let dialect = self.container.dialect().clone();
        let catalog = self.container.type_catalog();
        let mut statements = Vec::new();
        match self.mapping.disposition() {
            Disposition::Create => {
                if !self
                    .mapping
                    .columns()
                    .iter()
                    .any(|c| c.kind() == MappingKind::Create)
                {
                    return Err(TransferError::IncompleteMapping(self.target_name()));
                }
                let identifier = match self.mapping.source().identifier_columns(&self.monitor).await {
                    Ok(columns) => columns,
                    Err(e) if e.is_cancelled() => return Err(e),
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to read source identifier");
                        Vec::new()
                    }
                };
                statements.push(ddl::create_table_sql(
                    &dialect,
                    catalog,
                    self.container.schema(),
                    &self.mapping,
                    &identifier,
                ));
            }
            Disposition::Existing(table) => {
                statements.extend(
                    self.mapping
                        .columns()
                        .iter()
                        .filter(|c| c.kind() == MappingKind::Create)
                        .map(|c| ddl::add_column_sql(&dialect, catalog, table, c)),
                );
            }
            Disposition::Skip | Disposition::Unresolved => {}
        }

        if statements.is_empty() {
            return Ok(());
        }
        self.monitor.sub_task(format!("Create target {}", self.mapping.target_name()));
        for sql in statements {
            self.execute_ddl(sql).await?;
        }
        self.reload_target().await
    }

    /// Table a front end should open once this consumer's load succeeded
    pub fn finish_transfer(&self) -> Option<TargetTable> {
        if self.settings.open_table_on_finish {
            self.mapping.target().cloned()
        } else {
            None
        }
    }

    /// Release the target session; failures are logged
    pub async fn close(&mut self) {
        if !self.pending.is_empty() {
            tracing::warn!(rows = self.pending.len(), "discarding rows that were never flushed");
            self.pending.clear();
        }
        if let Some(session) = self.session.take() {
            session.close().await;
        }
    }

    async fn session(&mut self) -> TransferResult<&mut TransferSession> {
        if self.session.is_none() {
            let mut session = TransferSession::open(
                self.container.data_source().as_ref(),
                self.settings.open_new_connections,
                "Data load",
            )
            .await?;
            if self.settings.use_transactions {
                session.set_auto_commit(false).await?;
            }
            self.session = Some(session);
        }
        self.session
            .as_mut()
            .ok_or_else(|| ZqlzError::Connection("Target session is not open".into()).into())
    }

    async fn execute_ddl(&mut self, sql: String) -> TransferResult<()> {
        tracing::debug!(sql = %sql, "executing target DDL");
        let session = self.session().await?;
        if let Err(source) = session.execute(&sql, &[]).await {
            return Err(TransferError::Ddl { sql, source });
        }
        if !session.is_auto_commit() {
            session.commit().await?;
        }
        Ok(())
    }

    async fn reload_target(&mut self) -> TransferResult<()> {
        let name = match self.mapping.disposition() {
            Disposition::Existing(table) => table.name().to_string(),
            _ => self.container.dialect().transform_name(self.mapping.target_name()),
        };
        let table = self
            .container
            .find_table(&name, &self.monitor)
            .await?
            .ok_or_else(|| TransferError::TargetNotFound {
                table: name.clone(),
                container: self.container.path(),
            })?;

        self.mapping.set_disposition(Disposition::Existing(table));
        self.mapping.rebind_created(&self.container, &self.monitor).await?;
        for column in self.mapping.columns() {
            if !column.is_resolved() {
                tracing::debug!(
                    column = %column.source_name(),
                    "column mapping still unresolved after target reload"
                );
            }
        }
        Ok(())
    }

    async fn truncate_target(&mut self, table: &TargetTable) -> TransferResult<()> {
        let dialect = self.container.dialect();
        let qualified = dialect.qualified_name(table.schema(), table.name());
        let sql = if dialect.supports_truncate {
            format!("TRUNCATE TABLE {}", qualified)
        } else {
            format!("DELETE FROM {}", qualified)
        };
        tracing::debug!(sql = %sql, "clearing target table");
        self.session().await?.execute(&sql, &[]).await?;
        self.truncated = true;
        Ok(())
    }

    fn bind_columns(&mut self, columns: &[ColumnMeta], table: &TargetTable) -> TransferResult<()> {
        let dialect = self.container.dialect();
        let mut target_columns = Vec::new();
        let mut bindings = Vec::with_capacity(columns.len());
        for meta in columns {
            let mapping = self
                .mapping
                .column(&meta.name)
                .ok_or_else(|| TransferError::MissingTargetAttribute(meta.name.clone()))?;
            match mapping.disposition() {
                Disposition::Skip => bindings.push(None),
                Disposition::Existing(target) => {
                    bindings.push(Some(target_columns.len()));
                    target_columns.push(dialect.quote_identifier(&target.name));
                }
                Disposition::Create | Disposition::Unresolved => {
                    return Err(TransferError::UnresolvedAttribute(meta.name.clone()));
                }
            }
        }

        self.insert_prefix = format!(
            "INSERT INTO {} ({}) VALUES ",
            dialect.qualified_name(table.schema(), table.name()),
            target_columns.join(",")
        );
        self.insert_width = target_columns.len();
        self.bindings = bindings;
        Ok(())
    }

    /// Flush buffered rows on a commit boundary, then commit when running
    /// in manual-commit mode
    async fn insert_batch(&mut self, force: bool) -> TransferResult<()> {
        let commit_every = self.settings.commit_after_rows.max(1);
        let need_commit = force || self.rows_exported % commit_every == 0;
        if !need_commit {
            return Ok(());
        }

        self.flush_pending().await?;

        if self.settings.use_transactions {
            let session = self.session().await?;
            if !session.is_auto_commit() {
                session.commit().await?;
            }
        }
        Ok(())
    }

    async fn flush_pending(&mut self) -> TransferResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let rows = std::mem::take(&mut self.pending);
        if self.insert_width == 0 {
            return Ok(());
        }

        let rows_per_statement = (MAX_PARAMS_PER_STATEMENT / self.insert_width).max(1);
        let ignore_errors = self.settings.ignore_errors;
        for chunk in rows.chunks(rows_per_statement) {
            let (sql, params) = self.insert_statement(chunk);
            let result = self.session().await?.execute(&sql, &params).await;
            match result {
                Ok(_) => self.monitor.add_rows_written(chunk.len() as u64),
                Err(e) if ignore_errors => {
                    tracing::warn!(rows = chunk.len(), error = %e, "insert failed, skipping rows");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn insert_statement(&self, rows: &[Vec<Value>]) -> (String, Vec<Value>) {
        let dialect = self.container.dialect();
        let mut sql = self.insert_prefix.clone();
        let mut params = Vec::with_capacity(rows.len() * self.insert_width);
        for (row_idx, row) in rows.iter().enumerate() {
            if row_idx > 0 {
                sql.push(',');
            }
            let placeholders: Vec<String> = (0..row.len())
                .map(|col_idx| dialect.placeholder(params.len() + col_idx + 1))
                .collect();
            sql.push('(');
            sql.push_str(&placeholders.join(","));
            sql.push(')');
            params.extend(row.iter().cloned());
        }
        (sql, params)
    }
}

#[async_trait]
impl DataConsumer for DatabaseTransferConsumer {
    async fn fetch_start(
        &mut self,
        columns: &[ColumnMeta],
        offset: u64,
        _limit: Option<u64>,
    ) -> TransferResult<()> {
        self.session().await?;
        let table = self
            .mapping
            .target()
            .cloned()
            .ok_or_else(|| TransferError::IncompleteMapping(self.target_name()))?;

        if offset == 0 && self.settings.truncate_before_load && !self.truncated {
            self.truncate_target(&table).await?;
        }
        self.bind_columns(columns, &table)
    }

    async fn fetch_row(&mut self, row: Row) -> TransferResult<()> {
        let mut target_values = vec![Value::Null; self.insert_width];
        for (value, binding) in row.into_values().into_iter().zip(&self.bindings) {
            if let Some(position) = binding {
                target_values[*position] = value;
            }
        }
        self.pending.push(target_values);
        self.rows_exported += 1;
        self.insert_batch(false).await
    }

    async fn fetch_end(&mut self) -> TransferResult<()> {
        if self.rows_exported > 0 {
            self.insert_batch(true).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
