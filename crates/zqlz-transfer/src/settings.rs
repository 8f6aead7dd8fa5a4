//! Persisted data transfer settings
//!
//! Every key is optional: settings files written by older versions, or edited
//! by hand, load with defaults filled in for whatever is missing.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_COMMIT_AFTER_ROWS: u64 = 10_000;
pub const DEFAULT_SEGMENT_SIZE: u64 = 100_000;
pub const DEFAULT_MAX_JOBS: usize = 1;

/// How the producer reads its source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractType {
    /// One unbounded read streamed straight to the consumer
    #[default]
    SingleQuery,
    /// Repeated bounded reads of `segment_size` rows
    Segments,
}

/// Target-side settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConsumerSettings {
    /// Path of the target container
    pub container: Option<String>,
    pub open_new_connections: bool,
    pub use_transactions: bool,
    pub commit_after_rows: u64,
    pub open_table_on_finish: bool,
    /// Empty existing target tables before the first row is loaded
    pub truncate_before_load: bool,
    /// Log failed inserts and keep loading instead of aborting
    pub ignore_errors: bool,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            container: None,
            open_new_connections: true,
            use_transactions: true,
            commit_after_rows: DEFAULT_COMMIT_AFTER_ROWS,
            open_table_on_finish: true,
            truncate_before_load: false,
            ignore_errors: false,
        }
    }
}

impl ConsumerSettings {
    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    pub fn with_open_new_connections(mut self, open: bool) -> Self {
        self.open_new_connections = open;
        self
    }

    pub fn with_transactions(mut self, use_transactions: bool) -> Self {
        self.use_transactions = use_transactions;
        self
    }

    pub fn with_commit_after_rows(mut self, rows: u64) -> Self {
        self.commit_after_rows = rows.max(1);
        self
    }

    pub fn with_open_table_on_finish(mut self, open: bool) -> Self {
        self.open_table_on_finish = open;
        self
    }

    pub fn with_truncate_before_load(mut self, truncate: bool) -> Self {
        self.truncate_before_load = truncate;
        self
    }

    pub fn with_ignore_errors(mut self, ignore: bool) -> Self {
        self.ignore_errors = ignore;
        self
    }
}

/// Source-side settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProducerSettings {
    pub open_new_connections: bool,
    pub query_row_count: bool,
    pub extract_type: ExtractType,
    pub segment_size: u64,
}

impl Default for ProducerSettings {
    fn default() -> Self {
        Self {
            open_new_connections: true,
            query_row_count: true,
            extract_type: ExtractType::SingleQuery,
            segment_size: DEFAULT_SEGMENT_SIZE,
        }
    }
}

impl ProducerSettings {
    pub fn with_open_new_connections(mut self, open: bool) -> Self {
        self.open_new_connections = open;
        self
    }

    pub fn with_query_row_count(mut self, query: bool) -> Self {
        self.query_row_count = query;
        self
    }

    pub fn with_extract_type(mut self, extract_type: ExtractType) -> Self {
        self.extract_type = extract_type;
        self
    }

    /// Switch to segmented extraction with the given segment size
    pub fn with_segments(mut self, segment_size: u64) -> Self {
        self.extract_type = ExtractType::Segments;
        self.segment_size = segment_size.max(1);
        self
    }
}

/// All transfer settings, as stored in `data_transfer.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransferSettings {
    pub consumer: ConsumerSettings,
    pub producer: ProducerSettings,
    /// Upper bound on tables transferred concurrently
    pub max_jobs: usize,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            consumer: ConsumerSettings::default(),
            producer: ProducerSettings::default(),
            max_jobs: DEFAULT_MAX_JOBS,
        }
    }
}

impl TransferSettings {
    pub fn with_max_jobs(mut self, max_jobs: usize) -> Self {
        self.max_jobs = max_jobs.max(1);
        self
    }

    /// Load from the default settings file
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::settings_path()?)
    }

    /// Load from `path`; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read transfer settings from {:?}", path))?;
        serde_json::from_str(&content).with_context(|| "Failed to parse transfer settings JSON")
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::settings_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write transfer settings to {:?}", path))?;
        Ok(())
    }

    pub fn settings_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not find config directory")?;
        Ok(config_dir.join("zqlz").join("data_transfer.json"))
    }
}

#[cfg(test)]
mod tests;
