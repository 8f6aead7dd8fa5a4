//! Insertion-ordered registry of table mappings for one transfer

use std::sync::Arc;

use indexmap::IndexMap;

use crate::{DataContainer, TargetContainer, TransferError, TransferMonitor, TransferResult};

use super::{MappingKind, TableMapping};

/// Owns the target container and one [`TableMapping`] per distinct source.
///
/// Mappings are keyed by the source's full name and kept in the order the
/// sources were added. The store is mutated while the user edits mappings and
/// handed off by value before the transfer starts.
#[derive(Debug, Default, Clone)]
pub struct MappingStore {
    container: Option<TargetContainer>,
    mappings: IndexMap<String, TableMapping>,
}

impl MappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_container(container: TargetContainer) -> Self {
        Self {
            container: Some(container),
            mappings: IndexMap::new(),
        }
    }

    pub fn container(&self) -> Option<&TargetContainer> {
        self.container.as_ref()
    }

    /// Register a source, returning its mapping. Adding a source twice
    /// returns the mapping created the first time.
    pub fn add_source(&mut self, source: Arc<dyn DataContainer>) -> &mut TableMapping {
        self.mappings
            .entry(source.full_name())
            .or_insert_with(|| TableMapping::new(source))
    }

    pub fn get(&self, source: &dyn DataContainer) -> Option<&TableMapping> {
        self.mappings.get(&source.full_name())
    }

    pub fn get_mut(&mut self, source: &dyn DataContainer) -> Option<&mut TableMapping> {
        self.mappings.get_mut(&source.full_name())
    }

    pub fn mappings(&self) -> impl Iterator<Item = &TableMapping> {
        self.mappings.values()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn is_completed(&self) -> bool {
        self.mappings.values().all(TableMapping::is_completed)
    }

    /// Switch the target container.
    ///
    /// Create-new mappings are re-resolved by name against the new container
    /// and may turn into existing ones. Existing bindings are left untouched.
    pub async fn set_container(
        &mut self,
        container: TargetContainer,
        monitor: &TransferMonitor,
    ) -> TransferResult<()> {
        tracing::debug!(container = %container.path(), "target container changed");
        for mapping in self.mappings.values_mut() {
            if mapping.kind() == MappingKind::Create {
                let name = mapping.target_name().to_string();
                mapping.map_target_name(&name, &container, monitor).await?;
            }
        }
        self.container = Some(container);
        Ok(())
    }

    /// Resolve every unresolved mapping by its current target name
    pub async fn auto_assign(&mut self, monitor: &TransferMonitor) -> TransferResult<()> {
        let container = self.container.clone().ok_or(TransferError::NoTargetContainer)?;
        for mapping in self.mappings.values_mut() {
            if mapping.kind() == MappingKind::Unresolved {
                let name = mapping.target_name().to_string();
                mapping.map_target_name(&name, &container, monitor).await?;
            }
        }
        Ok(())
    }

    /// Take the container and mappings, in insertion order
    pub fn into_parts(self) -> (Option<TargetContainer>, Vec<TableMapping>) {
        (self.container, self.mappings.into_values().collect())
    }
}
