//! Data-source capabilities consumed by the lazy list core.
//!
//! The core never inspects item content. It asks an [`ItemRenderer`] to build
//! or refresh render objects and tells a [`PrefetchHandler`] which off-screen
//! items are worth loading. Item identities themselves come from the applied
//! [`Snapshot`](sectionlist_core::Snapshot).

use sectionlist_core::ItemUniqueId;

/// Builds the expensive per-item objects cached by the
/// [`ViewCache`](super::ViewCache).
///
/// Heterogeneous content is expressed through `RenderObject`: an enum over the
/// content variants, or a shared trait object handle. Render objects are
/// handles, so `Clone` must be cheap (`Rc`/`Arc` or a small id).
pub trait ItemRenderer {
    type RenderObject: Clone;

    /// Creates the render object for `id` on a cache miss.
    fn materialize(&mut self, id: ItemUniqueId) -> Self::RenderObject;

    /// Refreshes a cached render object before it is displayed again.
    fn update_in_place(&mut self, object: &mut Self::RenderObject, id: ItemUniqueId) {
        let _ = (object, id);
    }
}

/// Which end of the whole list the visible window touches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Boundary {
    Start,
    End,
}

/// Receives fire-and-forget prefetch instructions.
///
/// Instructions are grouped per recompute: every cancel of a batch is
/// delivered before its prefetches. The coordinator never calls these with an
/// empty slice, but implementations must tolerate one.
pub trait PrefetchHandler {
    fn prefetch(&mut self, items: &[ItemUniqueId]);

    fn cancel_prefetch(&mut self, items: &[ItemUniqueId]);

    /// The visible window started touching `boundary` of the list.
    fn reached_boundary(&mut self, boundary: Boundary) {
        let _ = boundary;
    }
}

/// Everything a [`SectionedList`](super::SectionedList) needs from its host.
pub trait ListDataSource: ItemRenderer + PrefetchHandler {}

impl<T: ItemRenderer + PrefetchHandler> ListDataSource for T {}
