//! Coordinator wiring snapshots, the view cache and prefetching to a host.
//!
//! [`SectionedList`] owns the current [`Snapshot`], one [`ViewCache`], the
//! in-flight prefetch set and the prefetch worker. Every mutator takes
//! `&mut self`; the host drives it from its main thread.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use sectionlist_core::{
    apply, diff, IndexPath, ItemIdentifierProvider, ItemUniqueId, ListView, SectionId, Snapshot,
};

use super::item_provider::{Boundary, ListDataSource};
use super::prefetch::{
    compute_prefetch_window, PrefetchInstructions, PrefetchStrategy, PrefetchTracker,
};
use super::prefetch_worker::{PrefetchWorker, WindowRequest, WindowUpdate};
use super::view_cache::{ViewCache, ViewCachePolicy};

/// Configuration for a [`SectionedList`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListConfig {
    pub cache: ViewCachePolicy,
    pub prefetch: PrefetchStrategy,
}

impl ListConfig {
    pub fn cache(mut self, cache: ViewCachePolicy) -> Self {
        self.cache = cache;
        self
    }

    pub fn prefetch(mut self, prefetch: PrefetchStrategy) -> Self {
        self.prefetch = prefetch;
        self
    }
}

/// Lifecycle statistics for a [`SectionedList`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ListStats {
    /// Auto-cached objects currently shown by a cell.
    pub items_in_use: usize,
    /// Auto-cached objects not shown by any cell.
    pub items_in_pool: usize,
    pub persistent_items: usize,
    /// Objects created through the data source since creation.
    pub total_materialized: u64,
    /// Cached objects handed out again.
    pub reuse_count: u64,
    pub evictions: u64,
    pub over_capacity_events: u64,
    pub prefetches_issued: u64,
    pub cancels_issued: u64,
    /// Prefetch windows reconciled into instructions.
    pub batches_applied: u64,
    /// Prefetch windows dropped as stale.
    pub batches_discarded: u64,
}

/// A virtualized, sectioned, identity-keyed list.
pub struct SectionedList<S: SectionId, D: ListDataSource> {
    config: ListConfig,
    snapshot: Snapshot<S>,
    data_source: D,
    cache: ViewCache<D::RenderObject>,
    visible: BTreeMap<IndexPath, ItemUniqueId>,
    tracker: PrefetchTracker,
    worker: Option<PrefetchWorker>,
    generation: u64,
    next_batch: u64,
    last_applied_batch: u64,
    /// Visibility changed since the last computed window.
    dirty: bool,
    anchor: Option<(IndexPath, ItemUniqueId)>,
    at_start: bool,
    at_end: bool,
    prefetches_issued: u64,
    cancels_issued: u64,
    batches_applied: u64,
    batches_discarded: u64,
}

impl<S: SectionId, D: ListDataSource> SectionedList<S, D> {
    /// Creates an empty list with the default configuration.
    pub fn new(data_source: D) -> Self {
        Self::with_config(data_source, ListConfig::default())
    }

    pub fn with_config(data_source: D, config: ListConfig) -> Self {
        let worker = spawn_worker(&config.prefetch);
        Self {
            cache: ViewCache::with_policy(config.cache.clone()),
            config,
            snapshot: Snapshot::empty(),
            data_source,
            visible: BTreeMap::new(),
            tracker: PrefetchTracker::new(),
            worker,
            generation: 0,
            next_batch: 0,
            last_applied_batch: 0,
            dirty: false,
            anchor: None,
            at_start: false,
            at_end: false,
            prefetches_issued: 0,
            cancels_issued: 0,
            batches_applied: 0,
            batches_discarded: 0,
        }
    }

    pub fn config(&self) -> &ListConfig {
        &self.config
    }

    pub fn snapshot(&self) -> &Snapshot<S> {
        &self.snapshot
    }

    pub fn data_source(&self) -> &D {
        &self.data_source
    }

    pub fn data_source_mut(&mut self) -> &mut D {
        &mut self.data_source
    }

    /// Snapshot generation, bumped by every applied non-empty diff.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Replaces the current snapshot and updates `view` with the difference.
    ///
    /// Returns `false` without touching the view, the cache or the prefetch
    /// state when `snapshot` has the same sections and items as the current
    /// one.
    pub fn apply_snapshot<V>(&mut self, snapshot: Snapshot<S>, animated: bool, view: &mut V) -> bool
    where
        V: ListView<S> + ?Sized,
    {
        let script = diff(&self.snapshot, &snapshot);
        if !apply(view, &script, animated) {
            log::trace!("SectionedList: snapshot unchanged");
            return false;
        }
        log::debug!(
            "SectionedList: applied {} operations ({} inserted, {} removed, {} moved)",
            script.len(),
            script.identities.inserted.len(),
            script.identities.removed.len(),
            script.identities.moved.len()
        );

        self.snapshot = snapshot;
        self.generation += 1;

        let previous = std::mem::take(&mut self.visible);
        for (_, id) in previous {
            match self.snapshot.index_path(&id) {
                Some(path) => {
                    self.visible.insert(path, id);
                }
                None => self.cache.mark_hidden(&id),
            }
        }

        self.anchor = self.anchor.and_then(|(old_path, id)| {
            match self.snapshot.index_path(&id) {
                Some(path) => Some((path, id)),
                None => {
                    let path = clamp_path(&self.snapshot, old_path)?;
                    let id = self.snapshot.item_at(path)?;
                    Some((path, id))
                }
            }
        });

        self.visibility_changed();
        true
    }

    /// Records that the host displays the item at `(section, item)`.
    pub fn report_visible(&mut self, section: usize, item: usize) {
        let path = IndexPath::new(section, item);
        let Some(id) = self.snapshot.item_at(path) else {
            log::debug!("SectionedList: visible position {path} is out of bounds");
            return;
        };
        if self.visible.insert(path, id) == Some(id) {
            return;
        }
        self.cache.mark_visible(id);
        self.visibility_changed();
    }

    /// Records that the host no longer displays the item at `(section, item)`.
    pub fn report_hidden(&mut self, section: usize, item: usize) {
        let path = IndexPath::new(section, item);
        let Some(id) = self.visible.remove(&path) else {
            log::debug!("SectionedList: hidden position {path} was not visible");
            return;
        };
        self.cache.mark_hidden(&id);
        self.visibility_changed();
    }

    /// Visible index paths in order.
    pub fn visible_items(&self) -> impl Iterator<Item = IndexPath> + '_ {
        self.visible.keys().copied()
    }

    /// Index path of the item the viewport is anchored to.
    ///
    /// Follows the first visible item across snapshot changes. When that item
    /// is removed, its old position is clamped into the new bounds.
    pub fn scroll_anchor(&self) -> Option<IndexPath> {
        self.anchor.map(|(path, _)| path)
    }

    /// Returns the render object for the item at `path`, materializing it
    /// through the cache.
    pub fn render_object(&mut self, path: IndexPath) -> Option<D::RenderObject> {
        let Some(id) = self.snapshot.item_at(path) else {
            log::debug!("SectionedList: no item at {path}");
            return None;
        };
        Some(self.cache.materialize(id, &mut self.data_source))
    }

    pub fn cache_get(&mut self, id: ItemUniqueId) -> Option<D::RenderObject> {
        self.cache.get(id)
    }

    pub fn cache_set(&mut self, id: ItemUniqueId, value: D::RenderObject) {
        self.cache.set(id, value);
    }

    pub fn cache_pin(&mut self, id: ItemUniqueId) {
        self.cache.pin(id);
    }

    pub fn cache_unpin(&mut self, id: ItemUniqueId) {
        self.cache.unpin(id);
    }

    /// Opts `id` into the persistent cache tier.
    pub fn cache_persist(&mut self, id: ItemUniqueId, value: D::RenderObject) {
        self.cache.insert_persistent(id, value);
    }

    /// Removes `id` from the persistent cache tier.
    pub fn cache_forget(&mut self, id: &ItemUniqueId) -> Option<D::RenderObject> {
        self.cache.remove_persistent(id)
    }

    pub fn cache_clear(&mut self) {
        self.cache.clear();
    }

    pub fn cache(&self) -> &ViewCache<D::RenderObject> {
        &self.cache
    }

    pub fn set_cache_policy(&mut self, policy: ViewCachePolicy) {
        self.cache.set_policy(policy.clone());
        self.config.cache = policy;
    }

    /// Replaces the prefetch strategy. Disabling cancels everything in flight.
    pub fn set_prefetch_strategy(&mut self, strategy: PrefetchStrategy) {
        let respawn = strategy.background != self.config.prefetch.background
            || strategy.coalesce_window != self.config.prefetch.coalesce_window
            || strategy.enabled != self.config.prefetch.enabled;
        self.config.prefetch = strategy;
        if respawn {
            self.worker = spawn_worker(&self.config.prefetch);
        }
        if !self.config.prefetch.enabled {
            let instructions = self.tracker.cancel_all();
            self.emit(&instructions);
            self.dirty = false;
        } else {
            self.dirty = true;
            self.schedule_prefetch();
        }
    }

    /// Prefetch requests currently in flight, in index path order.
    pub fn in_flight_prefetches(&self) -> Vec<(IndexPath, ItemUniqueId)> {
        self.tracker.in_flight().collect()
    }

    /// Applies the newest window computed by the worker, if any.
    ///
    /// Windows older than the last applied one or computed against a previous
    /// snapshot are discarded. Without a running worker, a pending window is
    /// computed inline instead.
    pub fn poll_prefetch(&mut self) -> PrefetchInstructions {
        let Some(worker) = self.worker.as_mut() else {
            return if self.dirty {
                self.flush_prefetch()
            } else {
                PrefetchInstructions::default()
            };
        };
        if !worker.retry_parked() {
            self.worker = None;
            return self.poll_prefetch();
        }
        let updates = worker.drain();
        self.apply_updates(updates)
    }

    /// Like [`poll_prefetch`](Self::poll_prefetch), but waits up to `timeout`
    /// for the worker to answer the latest request.
    pub fn poll_prefetch_timeout(&mut self, timeout: Duration) -> PrefetchInstructions {
        let deadline = Instant::now() + timeout;
        let mut instructions = self.poll_prefetch();
        while self.awaiting_worker() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let Some(worker) = self.worker.as_mut() else {
                break;
            };
            worker.retry_parked();
            let Some(update) = worker.recv_timeout(remaining) else {
                break;
            };
            let mut updates = vec![update];
            updates.extend(worker.drain());
            let next = self.apply_updates(updates);
            instructions.cancel.extend(next.cancel);
            instructions.prefetch.extend(next.prefetch);
        }
        instructions
    }

    /// Computes the prefetch window for the current visibility on the calling
    /// thread and emits the resulting instructions.
    ///
    /// Any window still being computed by the worker becomes stale.
    pub fn flush_prefetch(&mut self) -> PrefetchInstructions {
        self.next_batch += 1;
        self.last_applied_batch = self.next_batch;
        self.dirty = false;
        if !self.config.prefetch.enabled {
            return PrefetchInstructions::default();
        }
        let visible: Vec<IndexPath> = self.visible.keys().copied().collect();
        let target = compute_prefetch_window(
            &visible,
            &self.snapshot.section_lengths(),
            self.config.prefetch.prefetch_count,
        );
        self.batches_applied += 1;
        let instructions = self.tracker.reconcile(&target, &self.snapshot);
        self.emit(&instructions);
        instructions
    }

    pub fn stats(&self) -> ListStats {
        let cache = self.cache.stats();
        let items_in_use = self
            .cache
            .keys_by_recency()
            .filter(|id| self.cache.is_visible(id))
            .count();
        ListStats {
            items_in_use,
            items_in_pool: self.cache.len() - items_in_use,
            persistent_items: self.cache.persistent_len(),
            total_materialized: cache.materialized,
            reuse_count: cache.reused,
            evictions: cache.evictions,
            over_capacity_events: cache.over_capacity_events,
            prefetches_issued: self.prefetches_issued,
            cancels_issued: self.cancels_issued,
            batches_applied: self.batches_applied,
            batches_discarded: self.batches_discarded,
        }
    }

    fn awaiting_worker(&self) -> bool {
        self.config.prefetch.enabled
            && self.worker.is_some()
            && self.last_applied_batch < self.next_batch
    }

    fn visibility_changed(&mut self) {
        if let Some((&path, &id)) = self.visible.iter().next() {
            self.anchor = Some((path, id));
        }
        self.update_boundaries();
        self.dirty = true;
        self.schedule_prefetch();
    }

    fn update_boundaries(&mut self) {
        let first = self.snapshot.items().next().map(|(path, _)| path);
        let last = last_path(&self.snapshot);
        let at_start = first.is_some_and(|path| self.visible.contains_key(&path));
        let at_end = last.is_some_and(|path| self.visible.contains_key(&path));

        if at_start && !self.at_start {
            self.data_source.reached_boundary(Boundary::Start);
        }
        if at_end && !self.at_end {
            self.data_source.reached_boundary(Boundary::End);
        }
        self.at_start = at_start;
        self.at_end = at_end;
    }

    fn schedule_prefetch(&mut self) {
        if !self.config.prefetch.enabled {
            return;
        }
        let Some(worker) = self.worker.as_mut() else {
            return;
        };
        self.next_batch += 1;
        let request = WindowRequest {
            batch: self.next_batch,
            generation: self.generation,
            visible: self.visible.keys().copied().collect(),
            section_lengths: self.snapshot.section_lengths(),
            prefetch_count: self.config.prefetch.prefetch_count,
        };
        if worker.submit(request) {
            self.dirty = false;
        } else {
            log::warn!("SectionedList: prefetch worker stopped, computing windows inline");
            self.worker = None;
        }
    }

    fn apply_updates(&mut self, updates: Vec<WindowUpdate>) -> PrefetchInstructions {
        let mut newest: Option<WindowUpdate> = None;
        for update in updates {
            let stale =
                update.batch <= self.last_applied_batch || update.generation != self.generation;
            if stale {
                log::trace!("SectionedList: discarding prefetch batch {}", update.batch);
                self.batches_discarded += 1;
                continue;
            }
            if let Some(superseded) = newest.replace(update) {
                log::trace!("SectionedList: batch {} superseded", superseded.batch);
                self.batches_discarded += 1;
            }
        }

        let Some(update) = newest else {
            return PrefetchInstructions::default();
        };
        self.last_applied_batch = update.batch;
        self.batches_applied += 1;
        let instructions = self.tracker.reconcile(&update.target, &self.snapshot);
        self.emit(&instructions);
        instructions
    }

    fn emit(&mut self, instructions: &PrefetchInstructions) {
        if !instructions.cancel.is_empty() {
            let ids = instructions.cancel_ids();
            self.cancels_issued += ids.len() as u64;
            self.data_source.cancel_prefetch(&ids);
        }
        if !instructions.prefetch.is_empty() {
            let ids = instructions.prefetch_ids();
            self.prefetches_issued += ids.len() as u64;
            self.data_source.prefetch(&ids);
        }
        if !instructions.is_empty() {
            log::trace!(
                "SectionedList: prefetch +{} -{} ({} in flight)",
                instructions.prefetch.len(),
                instructions.cancel.len(),
                self.tracker.len()
            );
        }
    }
}

fn spawn_worker(strategy: &PrefetchStrategy) -> Option<PrefetchWorker> {
    if !strategy.enabled || !strategy.background {
        return None;
    }
    match PrefetchWorker::spawn(strategy.coalesce_window) {
        Ok(worker) => Some(worker),
        Err(err) => {
            log::warn!("SectionedList: failed to spawn prefetch worker ({err}); computing inline");
            None
        }
    }
}

fn last_path<P: ItemIdentifierProvider + ?Sized>(items: &P) -> Option<IndexPath> {
    (0..items.section_count()).rev().find_map(|section| {
        let len = items.item_identifiers(section)?.len();
        len.checked_sub(1).map(|item| IndexPath::new(section, item))
    })
}

/// Clamps `path` into the bounds of `items`, moving to the nearest non-empty
/// section at or before the clamped section.
fn clamp_path<P: ItemIdentifierProvider + ?Sized>(items: &P, path: IndexPath) -> Option<IndexPath> {
    let count = items.section_count();
    let start = path.section.min(count.checked_sub(1)?);
    (0..=start).rev().find_map(|section| {
        let len = items.item_identifiers(section)?.len();
        let item = if section == path.section {
            path.item.min(len.checked_sub(1)?)
        } else {
            len.checked_sub(1)?
        };
        Some(IndexPath::new(section, item))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lazy::{ItemRenderer, PrefetchHandler};
    use sectionlist_core::{EditScript, ListModel};
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Source {
        created: Rc<Cell<usize>>,
        prefetched: Vec<ItemUniqueId>,
        cancelled: Vec<ItemUniqueId>,
        boundaries: Vec<Boundary>,
    }

    impl ItemRenderer for Source {
        type RenderObject = ItemUniqueId;

        fn materialize(&mut self, id: ItemUniqueId) -> ItemUniqueId {
            self.created.set(self.created.get() + 1);
            id
        }
    }

    impl PrefetchHandler for Source {
        fn prefetch(&mut self, items: &[ItemUniqueId]) {
            self.prefetched.extend_from_slice(items);
        }

        fn cancel_prefetch(&mut self, items: &[ItemUniqueId]) {
            self.cancelled.extend_from_slice(items);
        }

        fn reached_boundary(&mut self, boundary: Boundary) {
            self.boundaries.push(boundary);
        }
    }

    #[derive(Default)]
    struct CountingView {
        batches: usize,
        model: ListModel<&'static str>,
    }

    impl ListView<&'static str> for CountingView {
        fn perform_batch_updates(&mut self, script: &EditScript<&'static str>, animated: bool) {
            self.batches += 1;
            self.model.perform_batch_updates(script, animated);
        }
    }

    fn inline_list() -> SectionedList<&'static str, Source> {
        let config = ListConfig::default().prefetch(PrefetchStrategy::new(2).background(false));
        SectionedList::with_config(Source::default(), config)
    }

    fn snapshot(sections: &[(&'static str, std::ops::Range<u32>)]) -> Snapshot<&'static str> {
        let mut builder = Snapshot::builder();
        for (id, items) in sections {
            builder = builder.section(*id, items.clone());
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_apply_same_snapshot_is_noop() {
        let mut list = inline_list();
        let mut view = CountingView::default();
        let s = snapshot(&[("a", 0..10)]);

        assert!(list.apply_snapshot(s.clone(), false, &mut view));
        assert!(!list.apply_snapshot(s, false, &mut view));
        assert_eq!(view.batches, 1);
        assert_eq!(list.generation(), 1);
    }

    #[test]
    fn test_visible_items_follow_identity() {
        let mut list = inline_list();
        let mut view = CountingView::default();
        list.apply_snapshot(snapshot(&[("a", 10..20)]), false, &mut view);
        list.report_visible(0, 3);

        list.apply_snapshot(snapshot(&[("a", 0..20)]), true, &mut view);
        assert_eq!(list.visible_items().collect::<Vec<_>>(), vec![IndexPath::new(0, 13)]);
        assert_eq!(list.scroll_anchor(), Some(IndexPath::new(0, 13)));
    }

    #[test]
    fn test_anchor_clamped_when_removed() {
        let mut list = inline_list();
        let mut view = CountingView::default();
        list.apply_snapshot(snapshot(&[("a", 0..10)]), false, &mut view);
        list.report_visible(0, 8);

        list.apply_snapshot(snapshot(&[("a", 0..4)]), false, &mut view);
        assert_eq!(list.visible_items().count(), 0);
        assert_eq!(list.scroll_anchor(), Some(IndexPath::new(0, 3)));
    }

    #[test]
    fn test_boundary_reported_once_per_entry() {
        let mut list = inline_list();
        let mut view = CountingView::default();
        list.apply_snapshot(snapshot(&[("a", 0..3), ("b", 0..3)]), false, &mut view);

        list.report_visible(0, 0);
        list.report_visible(0, 1);
        list.report_hidden(0, 0);
        list.report_visible(0, 0);
        list.report_visible(1, 2);

        assert_eq!(
            list.data_source().boundaries,
            vec![Boundary::Start, Boundary::Start, Boundary::End]
        );
    }

    #[test]
    fn test_inline_flush_emits_cancel_before_prefetch() {
        let mut list = inline_list();
        let mut view = CountingView::default();
        list.apply_snapshot(snapshot(&[("a", 0..20)]), false, &mut view);
        list.report_visible(0, 5);
        let first = list.flush_prefetch();
        assert_eq!(first.prefetch.len(), 4);

        list.report_hidden(0, 5);
        list.report_visible(0, 12);
        let second = list.flush_prefetch();
        assert_eq!(second.cancel.len(), 4);
        assert_eq!(second.prefetch.len(), 4);
        assert!(list.flush_prefetch().is_empty());
        assert_eq!(list.stats().prefetches_issued, 8);
        assert_eq!(list.stats().cancels_issued, 4);
    }

    #[test]
    fn test_render_object_reuses_cache() {
        let mut list = inline_list();
        let mut view = CountingView::default();
        list.apply_snapshot(snapshot(&[("a", 0..5)]), false, &mut view);

        let first = list.render_object(IndexPath::new(0, 1)).unwrap();
        let again = list.render_object(IndexPath::new(0, 1)).unwrap();
        assert_eq!(first, again);
        assert_eq!(list.data_source().created.get(), 1);
        assert!(list.render_object(IndexPath::new(3, 0)).is_none());
    }

    #[test]
    fn test_disabling_prefetch_cancels_in_flight() {
        let mut list = inline_list();
        let mut view = CountingView::default();
        list.apply_snapshot(snapshot(&[("a", 0..20)]), false, &mut view);
        list.report_visible(0, 10);
        list.flush_prefetch();

        list.set_prefetch_strategy(PrefetchStrategy::disabled());
        assert!(list.in_flight_prefetches().is_empty());
        assert_eq!(list.data_source().cancelled.len(), 4);
        assert!(list.flush_prefetch().is_empty());
    }

    #[test]
    fn test_set_cache_policy_shrinks_and_disables_cache() {
        let mut list = inline_list();
        let mut view = CountingView::default();
        list.apply_snapshot(snapshot(&[("a", 0..10)]), false, &mut view);
        list.report_visible(0, 0);
        for item in 0..6 {
            list.render_object(IndexPath::new(0, item));
        }
        let shown = list.snapshot().item_at(IndexPath::new(0, 0)).unwrap();
        let newest = list.snapshot().item_at(IndexPath::new(0, 5)).unwrap();

        list.set_cache_policy(ViewCachePolicy::new(2));
        assert_eq!(list.config().cache.capacity, 2);
        assert_eq!(list.cache().keys_by_recency().collect::<Vec<_>>(), vec![shown, newest]);

        list.set_cache_policy(ViewCachePolicy::disabled());
        assert_eq!(list.cache().keys_by_recency().collect::<Vec<_>>(), vec![shown]);
        assert_eq!(list.stats().items_in_use, 1);
        assert_eq!(list.stats().items_in_pool, 0);
    }

    #[test]
    fn test_clamp_path_skips_empty_sections() {
        let s = snapshot(&[("a", 0..3), ("b", 0..0)]);
        assert_eq!(clamp_path(&s, IndexPath::new(1, 4)), Some(IndexPath::new(0, 2)));
        assert_eq!(clamp_path(&Snapshot::<&str>::empty(), IndexPath::new(0, 0)), None);
    }
}
