//! Target side of a transfer: the container new data lands in

use std::sync::Arc;

use zqlz_core::{ColumnInfo, DataTypeInfo, DialectInfo, TableInfo, ZqlzError};

use crate::{DataSource, TransferMonitor, TransferResult};

/// An existing table in the target container
#[derive(Debug, Clone, PartialEq)]
pub struct TargetTable {
    pub info: TableInfo,
}

impl TargetTable {
    pub fn new(info: TableInfo) -> Self {
        Self { info }
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn schema(&self) -> Option<&str> {
        self.info.schema.as_deref()
    }

    /// Whether the object is an entity whose attributes can be enumerated and
    /// written to
    pub fn is_entity(&self) -> bool {
        self.info.table_type.is_data_manipulable()
    }
}

/// A schema (or whole database) in the target data source
#[derive(Clone)]
pub struct TargetContainer {
    data_source: Arc<dyn DataSource>,
    schema: Option<String>,
}

impl TargetContainer {
    pub fn new(data_source: Arc<dyn DataSource>, schema: Option<String>) -> Self {
        Self {
            data_source,
            schema,
        }
    }

    pub fn data_source(&self) -> &Arc<dyn DataSource> {
        &self.data_source
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn dialect(&self) -> &DialectInfo {
        self.data_source.dialect()
    }

    pub fn type_catalog(&self) -> Option<&[DataTypeInfo]> {
        self.data_source.type_catalog()
    }

    /// Path string persisted under the `container` settings key
    pub fn path(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}/{}", self.data_source.name(), schema),
            None => self.data_source.name().to_string(),
        }
    }

    /// Children rows can be written into
    pub async fn tables(&self, monitor: &TransferMonitor) -> TransferResult<Vec<TargetTable>> {
        monitor.check_cancelled()?;
        let connection = self.data_source.default_connection();
        let introspection = connection.as_schema_introspection().ok_or_else(|| {
            ZqlzError::NotSupported("Schema introspection is not supported by this driver".into())
        })?;
        let tables = introspection.list_tables(self.schema()).await?;
        Ok(tables
            .into_iter()
            .filter(|t| t.table_type.is_data_manipulable())
            .map(TargetTable::new)
            .collect())
    }

    /// Find a data-manipulable child by name, ignoring quotes and case
    pub async fn find_table(
        &self,
        name: &str,
        monitor: &TransferMonitor,
    ) -> TransferResult<Option<TargetTable>> {
        let dialect = self.dialect();
        let wanted = dialect.unquote_identifier(name);
        Ok(self
            .tables(monitor)
            .await?
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(&wanted)))
    }

    /// Visible columns of an existing target table
    pub async fn columns(
        &self,
        table: &TargetTable,
        monitor: &TransferMonitor,
    ) -> TransferResult<Vec<ColumnInfo>> {
        monitor.check_cancelled()?;
        let connection = self.data_source.default_connection();
        let introspection = connection.as_schema_introspection().ok_or_else(|| {
            ZqlzError::NotSupported("Schema introspection is not supported by this driver".into())
        })?;
        let columns = introspection
            .get_columns(table.schema().or(self.schema()), table.name())
            .await?;
        Ok(columns.into_iter().filter(|c| !c.is_hidden).collect())
    }
}

impl std::fmt::Debug for TargetContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetContainer")
            .field("path", &self.path())
            .finish()
    }
}
