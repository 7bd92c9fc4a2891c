use std::cell::Cell;
use std::rc::Rc;

use sectionlist_core::ItemUniqueId;
use sectionlist_foundation::{Boundary, ItemRenderer, PrefetchHandler};

/// Render object handed out by [`RecordingDataSource`].
#[derive(Debug)]
pub struct TestCell {
    pub id: ItemUniqueId,
    /// Serial number in creation order, starting at 0.
    pub serial: usize,
    updates: Cell<usize>,
}

impl TestCell {
    /// Times this cell was refreshed for reuse.
    pub fn updates(&self) -> usize {
        self.updates.get()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataSourceEvent {
    Materialize(ItemUniqueId),
    Update(ItemUniqueId),
    Prefetch(Vec<ItemUniqueId>),
    Cancel(Vec<ItemUniqueId>),
    Boundary(Boundary),
}

/// Data source that records every call made by the list.
#[derive(Debug, Default)]
pub struct RecordingDataSource {
    events: Vec<DataSourceEvent>,
    created: usize,
}

impl RecordingDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[DataSourceEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<DataSourceEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Number of render objects created so far.
    pub fn created(&self) -> usize {
        self.created
    }

    /// Every identity passed to `prefetch`, in call order.
    pub fn prefetched(&self) -> Vec<ItemUniqueId> {
        self.events
            .iter()
            .filter_map(|event| match event {
                DataSourceEvent::Prefetch(ids) => Some(ids.iter().copied()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Every identity passed to `cancel_prefetch`, in call order.
    pub fn cancelled(&self) -> Vec<ItemUniqueId> {
        self.events
            .iter()
            .filter_map(|event| match event {
                DataSourceEvent::Cancel(ids) => Some(ids.iter().copied()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn boundaries(&self) -> Vec<Boundary> {
        self.events
            .iter()
            .filter_map(|event| match event {
                DataSourceEvent::Boundary(boundary) => Some(*boundary),
                _ => None,
            })
            .collect()
    }
}

impl ItemRenderer for RecordingDataSource {
    type RenderObject = Rc<TestCell>;

    fn materialize(&mut self, id: ItemUniqueId) -> Rc<TestCell> {
        self.events.push(DataSourceEvent::Materialize(id));
        let cell = Rc::new(TestCell {
            id,
            serial: self.created,
            updates: Cell::new(0),
        });
        self.created += 1;
        cell
    }

    fn update_in_place(&mut self, object: &mut Rc<TestCell>, id: ItemUniqueId) {
        self.events.push(DataSourceEvent::Update(id));
        object.updates.set(object.updates.get() + 1);
    }
}

impl PrefetchHandler for RecordingDataSource {
    fn prefetch(&mut self, items: &[ItemUniqueId]) {
        self.events.push(DataSourceEvent::Prefetch(items.to_vec()));
    }

    fn cancel_prefetch(&mut self, items: &[ItemUniqueId]) {
        self.events.push(DataSourceEvent::Cancel(items.to_vec()));
    }

    fn reached_boundary(&mut self, boundary: Boundary) {
        self.events.push(DataSourceEvent::Boundary(boundary));
    }
}
