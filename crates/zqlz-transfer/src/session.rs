//! Connection plus commit-mode handling for one side of a transfer

use std::sync::Arc;

use zqlz_core::{Connection, QueryResult, Result, StatementResult, Transaction, Value};

use crate::DataSource;

/// A connection used by a single producer or consumer.
///
/// In manual-commit mode a transaction is started lazily by the first
/// statement after each commit or rollback, so committing never leaves an
/// empty transaction behind.
pub struct TransferSession {
    connection: Arc<dyn Connection>,
    transaction: Option<Box<dyn Transaction>>,
    auto_commit: bool,
    isolated: bool,
}

impl TransferSession {
    pub fn new(connection: Arc<dyn Connection>, isolated: bool) -> Self {
        Self {
            connection,
            transaction: None,
            auto_commit: true,
            isolated,
        }
    }

    /// Open a session on `source`: a fresh isolated connection when requested
    /// and the engine is not embedded, otherwise its default connection.
    pub async fn open(source: &dyn DataSource, open_new: bool, purpose: &str) -> Result<Self> {
        if open_new && !source.is_embedded() {
            let connection = source.open_isolated(purpose).await?;
            Ok(Self::new(connection, true))
        } else {
            Ok(Self::new(source.default_connection(), false))
        }
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    /// Whether the session owns its connection
    pub fn is_isolated(&self) -> bool {
        self.isolated
    }

    pub fn is_auto_commit(&self) -> bool {
        self.auto_commit
    }

    /// Switch commit mode. Leaving manual mode commits pending work.
    pub async fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
        if auto_commit && !self.auto_commit {
            self.commit().await?;
        }
        self.auto_commit = auto_commit;
        Ok(())
    }

    pub async fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.ensure_transaction().await?;
        match &self.transaction {
            Some(tx) => tx.query(sql, params).await,
            None => self.connection.query(sql, params).await,
        }
    }

    pub async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        self.ensure_transaction().await?;
        match &self.transaction {
            Some(tx) => tx.execute(sql, params).await,
            None => self.connection.execute(sql, params).await,
        }
    }

    /// Commit the open transaction, if any
    pub async fn commit(&mut self) -> Result<()> {
        match self.transaction.take() {
            Some(tx) => tx.commit().await,
            None => Ok(()),
        }
    }

    /// Roll back the open transaction, if any
    pub async fn rollback(&mut self) -> Result<()> {
        match self.transaction.take() {
            Some(tx) => tx.rollback().await,
            None => Ok(()),
        }
    }

    /// Release the session. Uncommitted work is rolled back and an isolated
    /// connection is closed; failures are logged, never returned.
    pub async fn close(mut self) {
        if self.transaction.is_some() {
            tracing::debug!("rolling back uncommitted work on session close");
            if let Err(e) = self.rollback().await {
                tracing::warn!(error = %e, "failed to roll back on session close");
            }
        }
        if self.isolated {
            if let Err(e) = self.connection.close().await {
                tracing::warn!(error = %e, "failed to close isolated connection");
            }
        }
    }

    async fn ensure_transaction(&mut self) -> Result<()> {
        if !self.auto_commit && self.transaction.is_none() {
            self.transaction = Some(self.connection.begin_transaction().await?);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
