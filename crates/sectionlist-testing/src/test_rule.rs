use std::ops::RangeInclusive;
use std::time::Duration;

use sectionlist_core::{IndexPath, ItemUniqueId, ListModel, SectionId, Snapshot};
use sectionlist_foundation::{ListConfig, PrefetchInstructions, PrefetchStrategy, SectionedList};

use crate::recording::{DataSourceEvent, RecordingDataSource};

/// How long [`ListTestRule::await_idle`] waits for the prefetch worker.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Identity of item `item` in section `section`, as built by [`snapshot`].
pub fn item_id(section: &'static str, item: u32) -> ItemUniqueId {
    ItemUniqueId::new(&section, &item)
}

/// Builds a snapshot from `(section id, item ids)` pairs.
pub fn snapshot<I>(sections: &[(&'static str, I)]) -> Snapshot<&'static str>
where
    I: Clone + IntoIterator<Item = u32>,
{
    let mut builder = Snapshot::builder();
    for (id, items) in sections {
        builder = builder.section(*id, items.clone());
    }
    match builder.build() {
        Ok(snapshot) => snapshot,
        Err(err) => panic!("invalid test snapshot: {err}"),
    }
}

/// Drives a [`SectionedList`] backed by a [`RecordingDataSource`] and a
/// [`ListModel`] standing in for the host view.
pub struct ListTestRule<S: SectionId = &'static str> {
    list: SectionedList<S, RecordingDataSource>,
    view: ListModel<S>,
}

impl<S: SectionId> ListTestRule<S> {
    /// Creates a rule computing prefetch windows inline with `prefetch_count`.
    pub fn new(prefetch_count: usize) -> Self {
        let strategy = PrefetchStrategy::new(prefetch_count).background(false);
        Self::with_config(ListConfig::default().prefetch(strategy))
    }

    pub fn with_config(config: ListConfig) -> Self {
        Self {
            list: SectionedList::with_config(RecordingDataSource::new(), config),
            view: ListModel::new(),
        }
    }

    /// Applies `snapshot` and returns whether the view was updated.
    pub fn set_content(&mut self, snapshot: Snapshot<S>) -> bool {
        self.list.apply_snapshot(snapshot, false, &mut self.view)
    }

    /// Hides every visible item and shows `items` of `section` instead.
    pub fn scroll_to(&mut self, section: usize, items: RangeInclusive<usize>) {
        let shown: Vec<IndexPath> = self.list.visible_items().collect();
        for path in shown {
            self.list.report_hidden(path.section, path.item);
        }
        for item in items {
            self.list.report_visible(section, item);
        }
    }

    /// Shows `items` of `section` in addition to what is already visible.
    pub fn show(&mut self, section: usize, items: RangeInclusive<usize>) {
        for item in items {
            self.list.report_visible(section, item);
        }
    }

    /// Computes the prefetch window inline.
    pub fn flush(&mut self) -> PrefetchInstructions {
        self.list.flush_prefetch()
    }

    /// Waits for the prefetch worker to answer the latest visibility change.
    pub fn await_idle(&mut self) -> PrefetchInstructions {
        self.list.poll_prefetch_timeout(DEFAULT_IDLE_TIMEOUT)
    }

    pub fn list(&self) -> &SectionedList<S, RecordingDataSource> {
        &self.list
    }

    pub fn list_mut(&mut self) -> &mut SectionedList<S, RecordingDataSource> {
        &mut self.list
    }

    pub fn view(&self) -> &ListModel<S> {
        &self.view
    }

    pub fn data_source(&self) -> &RecordingDataSource {
        self.list.data_source()
    }

    /// Drains recorded events.
    pub fn take_events(&mut self) -> Vec<DataSourceEvent> {
        self.list.data_source_mut().take_events()
    }

    /// Drains recorded events, returning only prefetched identities.
    pub fn take_prefetched(&mut self) -> Vec<ItemUniqueId> {
        let prefetched = self.data_source().prefetched();
        self.list.data_source_mut().clear();
        prefetched
    }

    /// Drains recorded events, returning only cancelled identities.
    pub fn take_cancelled(&mut self) -> Vec<ItemUniqueId> {
        let cancelled = self.data_source().cancelled();
        self.list.data_source_mut().clear();
        cancelled
    }

    /// Identities currently in flight, in index path order.
    pub fn in_flight_paths(&self) -> Vec<IndexPath> {
        self.list
            .in_flight_prefetches()
            .into_iter()
            .map(|(path, _)| path)
            .collect()
    }

    pub fn assert_view_matches_snapshot(&self) {
        assert!(
            self.view.matches(self.list.snapshot()),
            "view {:?} does not show {:?}",
            self.view,
            self.list.snapshot()
        );
    }
}

impl Default for ListTestRule {
    fn default() -> Self {
        Self::new(sectionlist_foundation::lazy::DEFAULT_PREFETCH_COUNT)
    }
}
