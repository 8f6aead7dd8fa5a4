//! Column-level mapping

use zqlz_core::{ColumnInfo, DataTypeInfo};

use crate::{SourceAttribute, resolve_target_type};

use super::{Disposition, MappingKind, SKIP_NAME};

/// State of the parent table mapping that drives column transitions
#[derive(Debug, Clone, Copy)]
pub enum ParentTarget<'a> {
    Unresolved,
    /// Parent loads into an existing object. `None` when that object is not
    /// an entity whose columns can be enumerated.
    Existing(Option<&'a [ColumnInfo]>),
    Create,
    Skip,
}

/// Mapping of one source column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMapping {
    source: SourceAttribute,
    disposition: Disposition<ColumnInfo>,
    target_name: Option<String>,
    target_type: Option<String>,
}

impl ColumnMapping {
    pub fn new(source: SourceAttribute) -> Self {
        Self {
            source,
            disposition: Disposition::Unresolved,
            target_name: None,
            target_type: None,
        }
    }

    pub fn source(&self) -> &SourceAttribute {
        &self.source
    }

    pub fn source_name(&self) -> &str {
        &self.source.name
    }

    pub fn disposition(&self) -> &Disposition<ColumnInfo> {
        &self.disposition
    }

    pub fn kind(&self) -> MappingKind {
        self.disposition.kind()
    }

    /// Bound target column, present only for [`MappingKind::Existing`]
    pub fn target(&self) -> Option<&ColumnInfo> {
        self.disposition.target()
    }

    pub fn is_resolved(&self) -> bool {
        self.disposition.is_resolved()
    }

    /// Chosen target name, if one has been set or resolved
    pub fn target_name(&self) -> Option<&str> {
        self.target_name.as_deref()
    }

    /// Target name, defaulting to the source column name
    pub fn effective_target_name(&self) -> &str {
        self.target_name.as_deref().unwrap_or(&self.source.name)
    }

    pub fn set_target_name(&mut self, name: impl Into<String>) {
        self.target_name = Some(name.into());
    }

    /// Explicit target type override, if any
    pub fn target_type_override(&self) -> Option<&str> {
        self.target_type.as_deref()
    }

    /// Override the resolved target type; `None` restores resolver output
    pub fn set_target_type(&mut self, target_type: Option<String>) {
        self.target_type = target_type;
    }

    /// DDL type for this column in a target with the given type catalog
    pub fn target_type(&self, catalog: Option<&[DataTypeInfo]>) -> String {
        resolve_target_type(&self.source, self.target_type.as_deref(), catalog)
    }

    /// Force a disposition chosen by the caller. Existing bindings go through
    /// [`ColumnMapping::update_disposition`] instead.
    pub fn set_disposition(&mut self, disposition: Disposition<ColumnInfo>) {
        if let Disposition::Existing(target) = &disposition {
            self.target_name = Some(target.name.clone());
        }
        self.disposition = disposition;
    }

    /// Recompute the disposition from the parent table state.
    ///
    /// A pure function of the parent state and the chosen target name, so
    /// applying it repeatedly with the same parent yields the same result.
    pub fn update_disposition(&mut self, parent: ParentTarget<'_>) {
        self.disposition = match parent {
            ParentTarget::Existing(Some(columns)) => {
                let name = self.effective_target_name().to_string();
                match columns.iter().find(|c| c.name.eq_ignore_ascii_case(&name)) {
                    Some(column) => {
                        self.target_name = Some(column.name.clone());
                        Disposition::Existing(column.clone())
                    }
                    None => {
                        self.target_name = Some(name);
                        Disposition::Create
                    }
                }
            }
            ParentTarget::Existing(None) => Disposition::Unresolved,
            ParentTarget::Create => {
                if self.target_name.is_none() {
                    self.target_name = Some(self.source.name.clone());
                }
                Disposition::Create
            }
            ParentTarget::Skip => Disposition::Skip,
            ParentTarget::Unresolved => Disposition::Unresolved,
        };
    }

    /// Point the column at `name` and re-resolve it against the parent.
    /// The name `skip` skips the column.
    pub fn map_target_name(&mut self, name: &str, parent: ParentTarget<'_>) {
        let name = name.trim();
        if name.eq_ignore_ascii_case(SKIP_NAME) {
            self.set_disposition(Disposition::Skip);
            return;
        }
        self.target_name = Some(name.to_string());
        self.update_disposition(parent);
    }
}
