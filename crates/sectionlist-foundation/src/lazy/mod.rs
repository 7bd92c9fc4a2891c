//! Virtualized sectioned lists.
//!
//! Only the items a host currently shows, plus a small window around them,
//! are materialized. Render objects are pooled by identity and prefetching
//! follows the viewport.
//!
//! # Architecture
//!
//! - [`SectionedList`] - coordinator owning the snapshot, cache and prefetch state
//! - [`ListDataSource`] - host capabilities ([`ItemRenderer`] + [`PrefetchHandler`])
//! - [`ViewCache`] - two-tier render object pool
//! - [`compute_prefetch_window`] / [`PrefetchTracker`] - prefetch window math and
//!   in-flight reconciliation
//! - [`PrefetchWorker`] - coalescing background computation
//!
//! # Example
//!
//! ```rust,ignore
//! let mut list = SectionedList::new(source);
//! list.apply_snapshot(snapshot, false, &mut view);
//! list.report_visible(0, 12);
//! let cell = list.render_object(IndexPath::new(0, 12));
//! list.poll_prefetch();
//! ```

mod item_provider;
mod list_state;
mod prefetch;
mod prefetch_worker;
mod view_cache;

pub use item_provider::*;
pub use list_state::*;
pub use prefetch::*;
pub use prefetch_worker::*;
pub use view_cache::*;
