//! Prefetch windows for sectioned lazy lists.
//!
//! Loads items just outside the visible range before they scroll in. The
//! window is computed per section from the visible items, spills into the
//! neighbouring section at the edges of the visible range, and is reconciled
//! against the set of prefetches already in flight so that only the changes
//! are sent to the data source.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use smallvec::SmallVec;

use sectionlist_core::collections::map::HashSet;
use sectionlist_core::{IndexPath, ItemIdentifierProvider, ItemUniqueId};

/// Default number of items to prefetch on each side of the visible range.
pub const DEFAULT_PREFETCH_COUNT: usize = 5;

/// Default time over which visibility changes are batched.
pub const DEFAULT_COALESCE_WINDOW: Duration = Duration::from_millis(100);

/// Strategy for prefetching items in a sectioned list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrefetchStrategy {
    /// Number of items to prefetch beyond each edge of the visible range.
    pub prefetch_count: usize,

    /// Visibility changes arriving within this window are handled as one batch.
    pub coalesce_window: Duration,

    /// Whether prefetching is enabled.
    pub enabled: bool,

    /// Compute windows on a worker thread. When `false`, windows are only
    /// computed by `flush_prefetch` on the calling thread.
    pub background: bool,
}

impl Default for PrefetchStrategy {
    fn default() -> Self {
        Self {
            prefetch_count: DEFAULT_PREFETCH_COUNT,
            coalesce_window: DEFAULT_COALESCE_WINDOW,
            enabled: true,
            background: true,
        }
    }
}

impl PrefetchStrategy {
    /// Creates a new prefetch strategy with the specified count.
    pub fn new(prefetch_count: usize) -> Self {
        Self {
            prefetch_count,
            ..Self::default()
        }
    }

    /// Disables prefetching.
    pub fn disabled() -> Self {
        Self {
            prefetch_count: 0,
            enabled: false,
            ..Self::default()
        }
    }

    pub fn coalesce_window(mut self, window: Duration) -> Self {
        self.coalesce_window = window;
        self
    }

    pub fn background(mut self, background: bool) -> Self {
        self.background = background;
        self
    }
}

/// Visible extent of one section.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct VisibleSpan {
    section: usize,
    first: usize,
    last: usize,
}

/// Computes the set of index paths to prefetch.
///
/// `visible` may be in any order and may contain stale positions; positions
/// outside `section_lengths` are ignored. Visible positions are never part of
/// the result.
pub fn compute_prefetch_window<'a, I>(
    visible: I,
    section_lengths: &[usize],
    prefetch_count: usize,
) -> BTreeSet<IndexPath>
where
    I: IntoIterator<Item = &'a IndexPath>,
{
    let mut target = BTreeSet::new();
    if prefetch_count == 0 {
        return target;
    }

    let mut spans: SmallVec<[VisibleSpan; 4]> = SmallVec::new();
    let mut on_screen = BTreeSet::new();
    for path in visible {
        let in_bounds = section_lengths
            .get(path.section)
            .is_some_and(|&len| path.item < len);
        if !in_bounds {
            continue;
        }
        on_screen.insert(*path);
        match spans.iter_mut().find(|span| span.section == path.section) {
            Some(span) => {
                span.first = span.first.min(path.item);
                span.last = span.last.max(path.item);
            }
            None => spans.push(VisibleSpan {
                section: path.section,
                first: path.item,
                last: path.item,
            }),
        }
    }
    if spans.is_empty() {
        return target;
    }
    spans.sort_by_key(|span| span.section);

    for span in &spans {
        let len = section_lengths[span.section];
        let forward_end = span.last.saturating_add(prefetch_count).min(len - 1);
        for item in span.last + 1..=forward_end {
            target.insert(IndexPath::new(span.section, item));
        }
        for item in span.first.saturating_sub(prefetch_count)..span.first {
            target.insert(IndexPath::new(span.section, item));
        }
    }

    let earliest = spans[0];
    if earliest.first < prefetch_count {
        let preceding = (0..earliest.section)
            .rev()
            .find(|&section| section_lengths[section] > 0);
        if let Some(section) = preceding {
            let len = section_lengths[section];
            for item in len.saturating_sub(prefetch_count)..len {
                target.insert(IndexPath::new(section, item));
            }
        }
    }

    let latest = spans[spans.len() - 1];
    let latest_len = section_lengths[latest.section];
    if latest_len - 1 - latest.last < prefetch_count {
        let following = (latest.section + 1..section_lengths.len())
            .find(|&section| section_lengths[section] > 0);
        if let Some(section) = following {
            let len = section_lengths[section];
            for item in 0..prefetch_count.min(len) {
                target.insert(IndexPath::new(section, item));
            }
        }
    }

    target.retain(|path| !on_screen.contains(path));
    target
}

/// Prefetch and cancel instructions produced by one recompute.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrefetchInstructions {
    /// Newly wanted items, in index path order.
    pub prefetch: Vec<(IndexPath, ItemUniqueId)>,
    /// No longer wanted items, in index path order, with the identity they
    /// were prefetched under.
    pub cancel: Vec<(IndexPath, ItemUniqueId)>,
}

impl PrefetchInstructions {
    pub fn is_empty(&self) -> bool {
        self.prefetch.is_empty() && self.cancel.is_empty()
    }

    pub fn prefetch_ids(&self) -> Vec<ItemUniqueId> {
        self.prefetch.iter().map(|(_, id)| *id).collect()
    }

    pub fn cancel_ids(&self) -> Vec<ItemUniqueId> {
        self.cancel.iter().map(|(_, id)| *id).collect()
    }

    /// Prefetches grouped as `(section, item indices)`.
    pub fn prefetch_by_section(&self) -> Vec<(usize, Vec<usize>)> {
        group_by_section(&self.prefetch)
    }

    /// Cancels grouped as `(section, item indices)`.
    pub fn cancel_by_section(&self) -> Vec<(usize, Vec<usize>)> {
        group_by_section(&self.cancel)
    }
}

fn group_by_section(entries: &[(IndexPath, ItemUniqueId)]) -> Vec<(usize, Vec<usize>)> {
    let mut groups: Vec<(usize, Vec<usize>)> = Vec::new();
    for (path, _) in entries {
        match groups.last_mut() {
            Some((section, items)) if *section == path.section => items.push(path.item),
            _ => groups.push((path.section, vec![path.item])),
        }
    }
    groups
}

/// The in-flight prefetch set of one list instance.
///
/// Keyed by index path; the identity captured when the prefetch was issued is
/// kept so that a later cancel names the same item.
#[derive(Debug, Default)]
pub struct PrefetchTracker {
    in_flight: BTreeMap<IndexPath, ItemUniqueId>,
}

impl PrefetchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the in-flight set with `target` and returns the difference.
    ///
    /// Paths in `target` that no longer resolve in `items` are skipped.
    /// Instructions are issued per identity: an item that merely shifted to
    /// another path inside the window stays in flight, while a path whose
    /// identity changed cancels the old identity and prefetches the new one.
    /// Reconciling the same target twice yields empty instructions the second
    /// time.
    pub fn reconcile<P>(&mut self, target: &BTreeSet<IndexPath>, items: &P) -> PrefetchInstructions
    where
        P: ItemIdentifierProvider + ?Sized,
    {
        let mut next = BTreeMap::new();
        for path in target {
            if let Some(id) = items.item_at(*path) {
                next.insert(*path, id);
            }
        }

        let wanted: HashSet<ItemUniqueId> = next.values().copied().collect();
        let requested: HashSet<ItemUniqueId> = self.in_flight.values().copied().collect();

        let mut instructions = PrefetchInstructions::default();
        for (path, id) in &self.in_flight {
            if !wanted.contains(id) {
                instructions.cancel.push((*path, *id));
            }
        }
        for (path, id) in &next {
            if !requested.contains(id) {
                instructions.prefetch.push((*path, *id));
            }
        }
        self.in_flight = next;
        instructions
    }

    /// Drops everything in flight, returning it as cancellations.
    pub fn cancel_all(&mut self) -> PrefetchInstructions {
        PrefetchInstructions {
            prefetch: Vec::new(),
            cancel: std::mem::take(&mut self.in_flight).into_iter().collect(),
        }
    }

    pub fn in_flight(&self) -> impl Iterator<Item = (IndexPath, ItemUniqueId)> + '_ {
        self.in_flight.iter().map(|(path, id)| (*path, *id))
    }

    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    pub fn contains(&self, path: &IndexPath) -> bool {
        self.in_flight.contains_key(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sectionlist_core::Snapshot;

    fn paths(section: usize, items: std::ops::RangeInclusive<usize>) -> BTreeSet<IndexPath> {
        items.map(|item| IndexPath::new(section, item)).collect()
    }

    fn visible(section: usize, items: std::ops::RangeInclusive<usize>) -> Vec<IndexPath> {
        paths(section, items).into_iter().collect()
    }

    fn list(lengths: &[u32]) -> Snapshot<usize> {
        let mut builder = Snapshot::builder();
        for (section, &len) in lengths.iter().enumerate() {
            builder = builder.section(section, 0..len);
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_window_both_directions() {
        let target = compute_prefetch_window(&visible(0, 20..=24), &[50], 5);

        let mut expected = paths(0, 25..=29);
        expected.extend(paths(0, 15..=19));
        assert_eq!(target, expected);
    }

    #[test]
    fn test_window_clamped_at_section_end() {
        let target = compute_prefetch_window(&visible(0, 45..=48), &[50], 5);

        let mut expected = paths(0, 49..=49);
        expected.extend(paths(0, 40..=44));
        assert_eq!(target, expected);
    }

    #[test]
    fn test_backward_spillover_into_preceding_section() {
        let target = compute_prefetch_window(&visible(1, 0..=2), &[10, 10], 5);

        let mut expected = paths(1, 3..=7);
        expected.extend(paths(0, 5..=9));
        assert_eq!(target, expected);
    }

    #[test]
    fn test_forward_spillover_skips_empty_sections() {
        let target = compute_prefetch_window(&visible(0, 5..=8), &[10, 0, 3], 5);

        let mut expected = paths(0, 9..=9);
        expected.extend(paths(0, 0..=4));
        expected.extend(paths(2, 0..=2));
        assert_eq!(target, expected);
    }

    #[test]
    fn test_no_spillover_when_window_fits() {
        let target = compute_prefetch_window(&visible(1, 5..=6), &[10, 20, 10], 5);
        assert!(target.iter().all(|path| path.section == 1));
    }

    #[test]
    fn test_visible_items_in_multiple_sections() {
        let mut shown = visible(0, 8..=9);
        shown.extend(visible(1, 0..=1));
        let target = compute_prefetch_window(&shown, &[10, 10], 2);

        let mut expected = paths(0, 6..=7);
        expected.extend(paths(1, 2..=3));
        assert_eq!(target, expected);
    }

    #[test]
    fn test_out_of_bounds_visible_positions_are_ignored() {
        let stale = vec![IndexPath::new(0, 99), IndexPath::new(4, 0)];
        assert!(compute_prefetch_window(&stale, &[10], 5).is_empty());
        assert!(compute_prefetch_window(&visible(0, 1..=2), &[10], 0).is_empty());
    }

    #[test]
    fn test_reconcile_converges() {
        let snapshot = list(&[50]);
        let mut tracker = PrefetchTracker::new();
        let target = compute_prefetch_window(&visible(0, 20..=24), &[50], 5);

        let first = tracker.reconcile(&target, &snapshot);
        assert_eq!(first.prefetch.len(), 10);
        assert!(first.cancel.is_empty());

        let second = tracker.reconcile(&target, &snapshot);
        assert!(second.is_empty());
        assert_eq!(tracker.len(), 10);
        assert!(tracker.contains(&IndexPath::new(0, 15)));
        assert!(!tracker.contains(&IndexPath::new(0, 20)));
    }

    #[test]
    fn test_reconcile_cancels_departed_window() {
        let snapshot = list(&[50]);
        let mut tracker = PrefetchTracker::new();
        tracker.reconcile(&paths(0, 25..=29), &snapshot);

        let moved = tracker.reconcile(&paths(0, 30..=34), &snapshot);
        let cancelled: BTreeSet<_> = moved.cancel.iter().map(|(path, _)| *path).collect();
        let prefetched: BTreeSet<_> = moved.prefetch.iter().map(|(path, _)| *path).collect();
        assert_eq!(cancelled, paths(0, 25..=29));
        assert_eq!(prefetched, paths(0, 30..=34));
        assert_eq!(moved.cancel_by_section(), vec![(0, vec![25, 26, 27, 28, 29])]);
    }

    #[test]
    fn test_reconcile_reissues_when_identity_changes() {
        let before = list(&[10]);
        let after = Snapshot::builder().section(0usize, 100..110u32).build().unwrap();
        let mut tracker = PrefetchTracker::new();
        tracker.reconcile(&paths(0, 5..=5), &before);

        let instructions = tracker.reconcile(&paths(0, 5..=5), &after);
        assert_eq!(instructions.cancel_ids(), vec![ItemUniqueId::new(&0usize, &5u32)]);
        assert_eq!(
            instructions.prefetch_ids(),
            vec![ItemUniqueId::new(&0usize, &105u32)]
        );
    }

    #[test]
    fn test_cancel_all_empties_tracker() {
        let snapshot = list(&[10]);
        let mut tracker = PrefetchTracker::new();
        tracker.reconcile(&paths(0, 0..=2), &snapshot);

        let instructions = tracker.cancel_all();
        assert_eq!(instructions.cancel.len(), 3);
        assert!(tracker.is_empty());
    }
}
