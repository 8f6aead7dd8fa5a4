//! Database endpoints that a transfer reads from or writes into

use std::sync::Arc;

use async_trait::async_trait;
use zqlz_core::{Connection, ConnectionConfig, DataTypeInfo, DatabaseDriver, DialectInfo, Result};

/// A database participating in a transfer, either as source or target.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Display name of the connection
    fn name(&self) -> &str;

    fn dialect(&self) -> &DialectInfo;

    /// Whether the engine runs in-process; such sources never get isolated connections
    fn is_embedded(&self) -> bool {
        false
    }

    /// The long-lived connection shared with the rest of the application.
    /// Metadata reads always go through it.
    fn default_connection(&self) -> Arc<dyn Connection>;

    /// Open a dedicated connection for a background task
    async fn open_isolated(&self, purpose: &str) -> Result<Arc<dyn Connection>>;

    /// Local type catalog, or `None` for plain sinks that expose no types
    fn type_catalog(&self) -> Option<&[DataTypeInfo]> {
        let dialect = self.dialect();
        dialect
            .has_type_catalog()
            .then_some(dialect.data_types.as_slice())
    }
}

/// [`DataSource`] backed by a registered driver and a saved connection config
pub struct DriverDataSource {
    driver: Arc<dyn DatabaseDriver>,
    config: ConnectionConfig,
    dialect: DialectInfo,
    connection: Arc<dyn Connection>,
}

impl DriverDataSource {
    /// Wrap an already open default connection
    pub fn new(
        driver: Arc<dyn DatabaseDriver>,
        config: ConnectionConfig,
        connection: Arc<dyn Connection>,
    ) -> Self {
        let dialect = driver.dialect_info();
        Self {
            driver,
            config,
            dialect,
            connection,
        }
    }

    /// Open the default connection and wrap it
    pub async fn connect(driver: Arc<dyn DatabaseDriver>, config: ConnectionConfig) -> Result<Self> {
        let connection = driver.connect(&config).await?;
        tracing::debug!(driver = driver.id(), name = %config.name, "opened default connection");
        Ok(Self::new(driver, config, connection))
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

#[async_trait]
impl DataSource for DriverDataSource {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn dialect(&self) -> &DialectInfo {
        &self.dialect
    }

    fn is_embedded(&self) -> bool {
        self.driver.is_embedded()
    }

    fn default_connection(&self) -> Arc<dyn Connection> {
        self.connection.clone()
    }

    async fn open_isolated(&self, purpose: &str) -> Result<Arc<dyn Connection>> {
        tracing::debug!(
            driver = self.driver.id(),
            name = %self.config.name,
            purpose,
            "opening isolated connection"
        );
        self.driver.connect(&self.config).await
    }
}
