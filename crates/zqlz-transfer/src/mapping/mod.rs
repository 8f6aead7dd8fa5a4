//! Table and column mappings between a transfer source and its target
//!
//! A mapping records what should happen to each source table and column:
//! load into an existing target object, create a new one, or skip it. The
//! transition rules live on the mapping types themselves so any front end can
//! drive them without owning the logic.

mod column;
mod store;
mod table;

pub use column::*;
pub use store::*;
pub use table::*;

use serde::{Deserialize, Serialize};

/// Target name that marks a table or column as skipped when typed by the user
const SKIP_NAME: &str = "skip";

/// Intended disposition of a mapping.
///
/// The bound target object lives inside [`Disposition::Existing`], so a
/// mapping has a target exactly when it uses an existing object.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition<T> {
    /// Not decided yet
    Unresolved,
    /// Load into an existing target object
    Existing(T),
    /// Create a new target object
    Create,
    /// Leave out of the transfer
    Skip,
}

impl<T> Disposition<T> {
    pub fn kind(&self) -> MappingKind {
        match self {
            Disposition::Unresolved => MappingKind::Unresolved,
            Disposition::Existing(_) => MappingKind::Existing,
            Disposition::Create => MappingKind::Create,
            Disposition::Skip => MappingKind::Skip,
        }
    }

    pub fn target(&self) -> Option<&T> {
        match self {
            Disposition::Existing(target) => Some(target),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, Disposition::Unresolved)
    }
}

/// Disposition without its payload, for display and persistence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingKind {
    Unresolved,
    Existing,
    Create,
    Skip,
}
