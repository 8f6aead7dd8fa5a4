//! Runs a set of table mappings through producer/consumer pairs on a bounded worker pool

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;

use crate::{
    DatabaseTransferConsumer, DatabaseTransferProducer, MappingKind, MappingStore, ProducerStats,
    TableMapping, TargetContainer, TargetTable, TransferError, TransferMonitor, TransferResult,
    TransferSettings,
};

/// Outcome of one table
#[derive(Debug)]
pub enum TransferStatus {
    Completed,
    Skipped,
    Cancelled,
    Failed(TransferError),
}

/// Result of transferring one table mapping
#[derive(Debug)]
pub struct TableTransferResult {
    /// Position of the mapping in the store
    pub index: usize,
    /// Full name of the source container
    pub source: String,
    /// Target label, e.g. `orders [Insert]`
    pub target: String,
    pub status: TransferStatus,
    pub rows_read: u64,
    pub rows_written: u64,
    /// Source read statistics, when extraction finished
    pub stats: Option<ProducerStats>,
    /// Table a front end should open once the transfer is done
    pub open_target: Option<TargetTable>,
    pub duration: Duration,
}

impl TableTransferResult {
    fn new(index: usize, source: String, target: String, status: TransferStatus) -> Self {
        Self {
            index,
            source,
            target,
            status,
            rows_read: 0,
            rows_written: 0,
            stats: None,
            open_target: None,
            duration: Duration::ZERO,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, TransferStatus::Completed | TransferStatus::Skipped)
    }

    pub fn error(&self) -> Option<&TransferError> {
        match &self.status {
            TransferStatus::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Results of a whole transfer, ordered like the mappings were
#[derive(Debug)]
pub struct TransferReport {
    pub results: Vec<TableTransferResult>,
    pub elapsed: Duration,
    pub cancelled: bool,
}

impl TransferReport {
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.results.iter().all(TableTransferResult::is_success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &TableTransferResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.status, TransferStatus::Failed(_)))
    }

    pub fn total_rows_written(&self) -> u64 {
        self.results.iter().map(|r| r.rows_written).sum()
    }
}

/// A configured transfer, ready to run.
///
/// Takes the mapping store by value: mappings cannot change while jobs are
/// reading them.
pub struct TransferPipeline {
    container: TargetContainer,
    mappings: Vec<TableMapping>,
    settings: TransferSettings,
    monitor: TransferMonitor,
}

impl TransferPipeline {
    pub fn new(
        store: MappingStore,
        settings: TransferSettings,
        monitor: TransferMonitor,
    ) -> TransferResult<Self> {
        let (container, mappings) = store.into_parts();
        let container = container.ok_or(TransferError::NoTargetContainer)?;
        Ok(Self {
            container,
            mappings,
            settings,
            monitor,
        })
    }

    pub fn mappings(&self) -> &[TableMapping] {
        &self.mappings
    }

    pub fn monitor(&self) -> &TransferMonitor {
        &self.monitor
    }

    /// Transfer every non-skipped mapping, at most `max_jobs` at a time.
    ///
    /// A failing table does not stop the others; its error is reported in
    /// its result. Cancelling the monitor stops jobs at their next check.
    pub async fn run(self) -> TransferReport {
        let start = Instant::now();
        let Self {
            container,
            mappings,
            settings,
            monitor,
        } = self;

        let max_jobs = settings.max_jobs.max(1);
        tracing::info!(
            tables = mappings.len(),
            max_jobs,
            container = %container.path(),
            "starting data transfer"
        );

        let semaphore = Arc::new(Semaphore::new(max_jobs));
        let settings = Arc::new(settings);
        let mut handles = Vec::with_capacity(mappings.len());

        for (index, mapping) in mappings.into_iter().enumerate() {
            if !mapping.is_completed() {
                tracing::warn!(source = %mapping.source().full_name(), "mapping is incomplete");
            }
            let source = mapping.source().full_name();
            let job = run_job(
                index,
                mapping,
                container.clone(),
                settings.clone(),
                semaphore.clone(),
                monitor.child(),
            );
            handles.push((index, source, tokio::spawn(job)));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (index, source, handle) in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::error!(source = %source, error = %e, "transfer task failed");
                    results.push(TableTransferResult::new(
                        index,
                        source,
                        String::new(),
                        TransferStatus::Failed(TransferError::Task(e.to_string())),
                    ));
                }
            }
        }
        results.sort_by_key(|r| r.index);

        let report = TransferReport {
            results,
            elapsed: start.elapsed(),
            cancelled: monitor.is_cancelled(),
        };
        tracing::info!(
            rows = report.total_rows_written(),
            failed = report.failures().count(),
            cancelled = report.cancelled,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "data transfer finished"
        );
        report
    }
}

async fn run_job(
    index: usize,
    mapping: TableMapping,
    container: TargetContainer,
    settings: Arc<TransferSettings>,
    semaphore: Arc<Semaphore>,
    monitor: TransferMonitor,
) -> TableTransferResult {
    let source = mapping.source().full_name();
    if mapping.kind() == MappingKind::Skip {
        tracing::debug!(source = %source, "skipping table");
        return TableTransferResult::new(index, source, "[Skip]".into(), TransferStatus::Skipped);
    }

    let _permit = semaphore.acquire().await;
    let start = Instant::now();

    let producer = DatabaseTransferProducer::new(mapping.source().clone());
    let mut consumer =
        DatabaseTransferConsumer::new(mapping, container, settings.consumer.clone(), monitor.clone());

    let outcome = transfer_table(&producer, &mut consumer, &settings, &monitor).await;
    let open_target = match outcome {
        Ok(_) => consumer.finish_transfer(),
        Err(_) => None,
    };
    consumer.close().await;

    let (status, stats) = match outcome {
        Ok(stats) => (TransferStatus::Completed, Some(stats)),
        Err(e) if e.is_cancelled() => (TransferStatus::Cancelled, None),
        Err(e) => {
            tracing::error!(source = %source, error = %e, "table transfer failed");
            (TransferStatus::Failed(e), None)
        }
    };

    TableTransferResult {
        index,
        source,
        target: consumer.target_name(),
        status,
        rows_read: monitor.rows_read(),
        rows_written: monitor.rows_written(),
        stats,
        open_target,
        duration: start.elapsed(),
    }
}

async fn transfer_table(
    producer: &DatabaseTransferProducer,
    consumer: &mut DatabaseTransferConsumer,
    settings: &TransferSettings,
    monitor: &TransferMonitor,
) -> TransferResult<ProducerStats> {
    monitor.check_cancelled()?;
    consumer.start_transfer().await?;
    producer
        .transfer_data(consumer, &settings.producer, monitor)
        .await
}

#[cfg(test)]
mod tests;
