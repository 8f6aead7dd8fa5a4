//! Table-level mapping and its transitions

use std::sync::Arc;

use zqlz_core::ColumnInfo;

use crate::{DataContainer, TargetContainer, TargetTable, TransferMonitor, TransferResult};

use super::{ColumnMapping, Disposition, MappingKind, ParentTarget, SKIP_NAME};

/// Mapping of one source table or query onto the target container
#[derive(Clone)]
pub struct TableMapping {
    source: Arc<dyn DataContainer>,
    disposition: Disposition<TargetTable>,
    target_name: String,
    columns: Vec<ColumnMapping>,
    columns_loaded: bool,
}

impl TableMapping {
    pub fn new(source: Arc<dyn DataContainer>) -> Self {
        let target_name = source.name().to_string();
        Self {
            source,
            disposition: Disposition::Unresolved,
            target_name,
            columns: Vec::new(),
            columns_loaded: false,
        }
    }

    pub fn source(&self) -> &Arc<dyn DataContainer> {
        &self.source
    }

    pub fn disposition(&self) -> &Disposition<TargetTable> {
        &self.disposition
    }

    pub fn kind(&self) -> MappingKind {
        self.disposition.kind()
    }

    /// Bound target table, present only for [`MappingKind::Existing`]
    pub fn target(&self) -> Option<&TargetTable> {
        self.disposition.target()
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub fn set_target_name(&mut self, name: impl Into<String>) {
        self.target_name = name.into();
    }

    pub fn columns(&self) -> &[ColumnMapping] {
        &self.columns
    }

    pub fn columns_mut(&mut self) -> &mut [ColumnMapping] {
        &mut self.columns
    }

    /// Column mapping for a source column, matched case-insensitively
    pub fn column(&self, source_name: &str) -> Option<&ColumnMapping> {
        self.columns
            .iter()
            .find(|c| c.source_name().eq_ignore_ascii_case(source_name))
    }

    pub fn column_mut(&mut self, source_name: &str) -> Option<&mut ColumnMapping> {
        self.columns
            .iter_mut()
            .find(|c| c.source_name().eq_ignore_ascii_case(source_name))
    }

    /// Whether the source columns have been read
    pub fn columns_loaded(&self) -> bool {
        self.columns_loaded
    }

    /// Skipped mappings are always complete; otherwise the table and every
    /// column must be resolved.
    pub fn is_completed(&self) -> bool {
        match self.disposition {
            Disposition::Skip => true,
            Disposition::Unresolved => false,
            _ => self.columns.iter().all(ColumnMapping::is_resolved),
        }
    }

    /// Populate column mappings from the source, at most once.
    ///
    /// Introspection failures are logged and leave the mapping without
    /// columns; the next call tries again. Only cancellation is returned.
    pub async fn ensure_columns(&mut self, monitor: &TransferMonitor) -> TransferResult<()> {
        if self.columns_loaded {
            return Ok(());
        }
        monitor.check_cancelled()?;
        match self.source.attributes(monitor).await {
            Ok(attributes) => {
                self.columns = attributes.into_iter().map(ColumnMapping::new).collect();
                self.columns_loaded = true;
                tracing::debug!(
                    source = %self.source.full_name(),
                    columns = self.columns.len(),
                    "loaded source attributes"
                );
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                tracing::warn!(
                    source = %self.source.full_name(),
                    error = %e,
                    "failed to read source attributes"
                );
            }
        }
        Ok(())
    }

    /// Change the table disposition.
    ///
    /// Binding an existing table adopts its name; column bindings are
    /// recomputed by the following [`TableMapping::refresh`]. Creating a new
    /// table moves unresolved columns to create-new right away. Skipping
    /// leaves columns untouched.
    pub fn set_disposition(&mut self, disposition: Disposition<TargetTable>) {
        match &disposition {
            Disposition::Existing(table) => self.target_name = table.name().to_string(),
            Disposition::Create => {
                for column in self.columns.iter_mut().filter(|c| !c.is_resolved()) {
                    column.update_disposition(ParentTarget::Create);
                }
            }
            Disposition::Skip | Disposition::Unresolved => {}
        }
        self.disposition = disposition;
    }

    /// Re-apply the column transition rule against live target metadata
    pub async fn refresh(
        &mut self,
        container: &TargetContainer,
        monitor: &TransferMonitor,
    ) -> TransferResult<()> {
        self.ensure_columns(monitor).await?;

        let target_columns: Option<Vec<ColumnInfo>> = match &self.disposition {
            Disposition::Existing(table) if table.is_entity() => {
                match container.columns(table, monitor).await {
                    Ok(columns) => Some(columns),
                    Err(e) if e.is_cancelled() => return Err(e),
                    Err(e) => {
                        tracing::warn!(
                            table = %table.name(),
                            error = %e,
                            "failed to read target columns"
                        );
                        None
                    }
                }
            }
            _ => None,
        };

        let parent = match &self.disposition {
            Disposition::Unresolved => ParentTarget::Unresolved,
            Disposition::Existing(_) => ParentTarget::Existing(target_columns.as_deref()),
            Disposition::Create => ParentTarget::Create,
            Disposition::Skip => return Ok(()),
        };
        for column in &mut self.columns {
            column.update_disposition(parent);
        }
        Ok(())
    }

    /// Bind create-new columns to the columns DDL just added to the target.
    ///
    /// Skipped and already bound columns keep their disposition.
    pub async fn rebind_created(
        &mut self,
        container: &TargetContainer,
        monitor: &TransferMonitor,
    ) -> TransferResult<()> {
        let target_columns = match &self.disposition {
            Disposition::Existing(table) if table.is_entity() => {
                Some(container.columns(table, monitor).await?)
            }
            Disposition::Existing(_) => None,
            _ => return Ok(()),
        };
        for column in self
            .columns
            .iter_mut()
            .filter(|c| c.kind() == MappingKind::Create)
        {
            column.update_disposition(ParentTarget::Existing(target_columns.as_deref()));
        }
        Ok(())
    }

    /// Point the mapping at a target table by name.
    ///
    /// A data-manipulable table with that name in `container` is bound as
    /// existing; otherwise the table is marked for creation under that name.
    /// The name `skip` skips the table.
    pub async fn map_target_name(
        &mut self,
        name: &str,
        container: &TargetContainer,
        monitor: &TransferMonitor,
    ) -> TransferResult<()> {
        let name = name.trim();
        if name.eq_ignore_ascii_case(SKIP_NAME) {
            self.set_disposition(Disposition::Skip);
            return Ok(());
        }

        let existing = match container.find_table(name, monitor).await {
            Ok(table) => table,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                tracing::warn!(table = name, error = %e, "failed to look up target table");
                None
            }
        };
        match existing {
            Some(table) => self.set_disposition(Disposition::Existing(table)),
            None => {
                self.target_name = name.to_string();
                self.set_disposition(Disposition::Create);
            }
        }
        self.refresh(container, monitor).await
    }
}

impl std::fmt::Debug for TableMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableMapping")
            .field("source", &self.source.full_name())
            .field("disposition", &self.disposition)
            .field("target_name", &self.target_name)
            .field("columns", &self.columns)
            .finish()
    }
}
