//! ZQLZ Transfer - Table mapping and database-to-database data transfer
//!
//! This crate maps source tables and queries onto a target schema (existing
//! tables, tables to create, or skipped ones), resolves compatible column
//! types across dialects, and streams rows from producers to consumers on a
//! bounded pool of worker tasks.

mod consumer;
mod data_source;
pub mod ddl;
mod error;
mod mapping;
mod monitor;
mod pipeline;
mod producer;
mod session;
mod settings;
mod source;
mod target;
mod type_resolver;

#[cfg(test)]
mod test_support;

pub use consumer::{DataConsumer, DatabaseTransferConsumer};
pub use data_source::{DataSource, DriverDataSource};
pub use error::{TransferError, TransferResult};
pub use mapping::{ColumnMapping, Disposition, MappingKind, MappingStore, ParentTarget, TableMapping};
pub use monitor::TransferMonitor;
pub use pipeline::{TableTransferResult, TransferPipeline, TransferReport, TransferStatus};
pub use producer::{DatabaseTransferProducer, ProducerStats};
pub use session::TransferSession;
pub use settings::{
    ConsumerSettings, DEFAULT_COMMIT_AFTER_ROWS, DEFAULT_MAX_JOBS, DEFAULT_SEGMENT_SIZE,
    ExtractType, ProducerSettings, TransferSettings,
};
pub use source::{ContainerKind, DataContainer, QuerySource, SourceAttribute, TableSource};
pub use target::{TargetContainer, TargetTable};
pub use type_resolver::resolve_target_type;
