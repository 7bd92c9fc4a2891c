use thiserror::Error;

use crate::identity::{IndexPath, ItemUniqueId};

/// Caller errors detected while building a [`Snapshot`](crate::Snapshot).
///
/// Section ids are rendered with their `Debug` representation so the error
/// type does not carry the caller's id type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("section id {id} appears at section {first} and again at section {second}")]
    DuplicateSection {
        id: String,
        first: usize,
        second: usize,
    },
    #[error("item {item:?} appears at {first} and again at {second}")]
    DuplicateItem {
        item: ItemUniqueId,
        first: IndexPath,
        second: IndexPath,
    },
    #[error("section id {id} is not part of the snapshot")]
    MissingSection { id: String },
}

/// An edit script did not fit the [`ListModel`](crate::ListModel) it was
/// applied to, usually because it was computed against a different base.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    #[error("section index {index} is out of bounds (len {len})")]
    SectionOutOfBounds { index: usize, len: usize },
    #[error("item index {path} is out of bounds")]
    ItemOutOfBounds { path: IndexPath },
    #[error("slot {path} is targeted by more than one insertion or move")]
    SlotConflict { path: IndexPath },
    #[error("section {index} has unfilled slots after applying the script")]
    Incomplete { index: usize },
}
