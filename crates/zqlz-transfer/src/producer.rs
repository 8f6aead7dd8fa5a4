//! Source-side extraction

use std::sync::Arc;

use crate::{
    DataConsumer, DataContainer, ExtractType, ProducerSettings, TransferMonitor, TransferResult,
    TransferSession,
};

/// Counters reported by one [`DatabaseTransferProducer::transfer_data`] run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerStats {
    /// Rows delivered to the consumer
    pub rows: u64,
    /// Number of `read_data` calls issued
    pub batches: u64,
    /// Result of the row-count probe, when it ran and succeeded
    pub total_rows: Option<u64>,
}

/// Reads one source container and pushes its rows into a consumer
pub struct DatabaseTransferProducer {
    source: Arc<dyn DataContainer>,
}

impl DatabaseTransferProducer {
    pub fn new(source: Arc<dyn DataContainer>) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &Arc<dyn DataContainer> {
        &self.source
    }

    /// Stream the source into `consumer`.
    ///
    /// The source session is always released before returning: a
    /// transactional read is committed and an isolated connection closed
    /// whether or not extraction succeeded. Cleanup failures are logged.
    #[tracing::instrument(skip_all, fields(source = %self.source.full_name()))]
    pub async fn transfer_data(
        &self,
        consumer: &mut dyn DataConsumer,
        settings: &ProducerSettings,
        monitor: &TransferMonitor,
    ) -> TransferResult<ProducerStats> {
        monitor.check_cancelled()?;
        let mut session = TransferSession::open(
            self.source.data_source().as_ref(),
            settings.open_new_connections,
            "Data read",
        )
        .await?;

        let transactional = session.is_isolated() || self.source.forces_transactional_read();
        if transactional {
            if let Err(e) = session.set_auto_commit(false).await {
                tracing::warn!(error = %e, "failed to disable auto-commit on source connection");
            }
        }

        let result = self.extract(&mut session, consumer, settings, monitor).await;

        if transactional {
            if let Err(e) = session.commit().await {
                tracing::warn!(error = %e, "failed to commit source transaction");
            }
        }
        session.close().await;

        match &result {
            Ok(stats) => tracing::debug!(rows = stats.rows, batches = stats.batches, "source exhausted"),
            Err(e) => tracing::debug!(error = %e, "extraction aborted"),
        }
        result
    }

    async fn extract(
        &self,
        session: &mut TransferSession,
        consumer: &mut dyn DataConsumer,
        settings: &ProducerSettings,
        monitor: &TransferMonitor,
    ) -> TransferResult<ProducerStats> {
        let mut stats = ProducerStats::default();

        if settings.query_row_count {
            monitor.sub_task(format!("Count rows of {}", self.source.name()));
            match self.source.count_data(session).await {
                Ok(count) => {
                    stats.total_rows = Some(count);
                    monitor.set_total_rows(Some(count));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "row count probe failed, total is unknown");
                    if let Err(e) = session.rollback().await {
                        tracing::warn!(error = %e, "failed to roll back after row count failure");
                    }
                }
            }
        }

        monitor.sub_task(format!("Read {}", self.source.name()));
        match settings.extract_type {
            ExtractType::SingleQuery => {
                monitor.check_cancelled()?;
                stats.rows = self.source.read_data(session, consumer, 0, None).await?;
                stats.batches = 1;
                monitor.add_rows_read(stats.rows);
            }
            ExtractType::Segments => {
                let segment_size = settings.segment_size.max(1);
                let mut offset = 0u64;
                loop {
                    monitor.check_cancelled()?;
                    let fetched = self
                        .source
                        .read_data(session, consumer, offset, Some(segment_size))
                        .await?;
                    stats.batches += 1;
                    stats.rows += fetched;
                    monitor.add_rows_read(fetched);
                    // Advance by what the driver returned, not what was asked for
                    offset += fetched;
                    if fetched < segment_size {
                        break;
                    }
                }
            }
        }
        Ok(stats)
    }
}
