//! List coordination for sectioned, identity-keyed collections.
//!
//! Builds on `sectionlist-core` with a render object cache, prefetch
//! scheduling and the [`SectionedList`](lazy::SectionedList) coordinator.

pub mod lazy;

pub use lazy::{
    Boundary, ItemRenderer, ListConfig, ListDataSource, ListStats, PrefetchHandler,
    PrefetchInstructions, PrefetchStrategy, SectionedList, ViewCache, ViewCachePolicy,
};
