//! Database driver trait definition

use crate::{Connection, DialectInfo, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Core driver trait that all database drivers implement
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Unique identifier for this driver (e.g., "postgres", "sqlite")
    fn id(&self) -> &'static str {
        self.name()
    }

    /// Human-readable name (e.g., "PostgreSQL", "SQLite")
    fn name(&self) -> &'static str;

    /// Whether the engine runs inside the host process.
    ///
    /// Embedded engines serialize writers on a single file, so opening a
    /// second connection for a background job buys nothing and may deadlock.
    fn is_embedded(&self) -> bool {
        false
    }

    /// SQL dialect metadata: type catalog, quoting, paging and placeholders
    fn dialect_info(&self) -> DialectInfo {
        DialectInfo::default()
    }

    /// Create a new connection
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>>;
}

/// Connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub id: uuid::Uuid,
    /// Display name
    pub name: String,
    /// Driver ID (e.g., "postgres", "sqlite")
    pub driver: String,
    /// Host address (empty for file-based databases)
    pub host: String,
    pub port: u16,
    /// Database name or file path
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Additional driver-specific parameters
    pub params: HashMap<String, String>,
}

impl ConnectionConfig {
    pub fn new(driver: &str, name: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            name: name.to_string(),
            driver: driver.to_string(),
            host: String::new(),
            port: 0,
            database: None,
            username: None,
            password: None,
            params: HashMap::new(),
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }
}
