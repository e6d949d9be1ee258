use thiserror::Error;

use crate::registry::OwnerId;

/// Internal consistency failures. These indicate a registry bug, not caller
/// misuse, and are raised as panics at the point of detection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("mount node {owner:?} holds {effects} effects but {snapshots} dependency snapshots")]
    SnapshotMismatch {
        owner: OwnerId,
        effects: usize,
        snapshots: usize,
    },
}
