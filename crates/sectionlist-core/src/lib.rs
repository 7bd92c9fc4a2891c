//! Core data model for virtualized, sectioned lists.
//!
//! - [`ItemUniqueId`] / [`IndexPath`]: identity and position of items
//! - [`Snapshot`]: immutable, validated description of the whole list
//! - [`diff`]: minimal edit script between two snapshots
//! - [`ListView`] / [`ListModel`]: applying edit scripts to a view
//!
//! # Example
//!
//! ```rust
//! use sectionlist_core::{diff, ListModel, Snapshot};
//!
//! let before = Snapshot::builder().section("inbox", [1u32, 2, 3]).build().unwrap();
//! let after = Snapshot::builder().section("inbox", [3u32, 1]).build().unwrap();
//!
//! let mut view = ListModel::from_snapshot(&before);
//! sectionlist_core::apply(&mut view, &diff(&before, &after), true);
//! assert!(view.matches(&after));
//! ```

pub mod collections;
mod diff;
mod error;
mod identity;
mod model;
mod snapshot;

pub use diff::*;
pub use error::*;
pub use identity::*;
pub use model::*;
pub use snapshot::*;
