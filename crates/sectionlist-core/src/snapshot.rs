//! Immutable, identity-keyed descriptions of a sectioned list.
//!
//! A [`Snapshot`] is a pure value: building a new one never mutates a previous
//! one. Item arrays are reference counted, so snapshots derived with
//! [`Snapshot::with_section_items`] share every untouched section with their
//! parent.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use crate::collections::map::HashMap;
use crate::collections::IndexMap;
use crate::error::SnapshotError;
use crate::identity::{IndexPath, ItemIdentifierProvider, ItemUniqueId, SectionId};

/// One section: its caller id and the ordered identities of its items.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Section<S> {
    pub id: S,
    pub elements: Arc<[ItemUniqueId]>,
}

impl<S: SectionId> Section<S> {
    pub fn new(id: S, elements: impl IntoIterator<Item = ItemUniqueId>) -> Self {
        Self {
            id,
            elements: elements.into_iter().collect(),
        }
    }

    /// Builds a section by deriving each element's identity from `id` and the
    /// caller's item id.
    pub fn from_items<I, T>(id: S, items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Hash,
    {
        let elements = items
            .into_iter()
            .map(|item| ItemUniqueId::new(&id, &item))
            .collect();
        Self { id, elements }
    }
}

/// Ordered sequence of sections, validated for unique section and item ids.
#[derive(Clone)]
pub struct Snapshot<S: SectionId> {
    sections: IndexMap<S, Arc<[ItemUniqueId]>>,
    locations: Arc<HashMap<ItemUniqueId, IndexPath>>,
}

impl<S: SectionId> Snapshot<S> {
    /// A snapshot with no sections.
    pub fn empty() -> Self {
        Self {
            sections: IndexMap::default(),
            locations: Arc::new(HashMap::default()),
        }
    }

    /// Validates and builds a snapshot from `sections`, in order.
    ///
    /// Duplicate section ids and duplicate item identities are reported with
    /// both positions; neither duplicate is silently kept.
    pub fn new(sections: impl IntoIterator<Item = Section<S>>) -> Result<Self, SnapshotError> {
        let mut table: IndexMap<S, Arc<[ItemUniqueId]>> = IndexMap::default();
        for (index, section) in sections.into_iter().enumerate() {
            if let Some(first) = table.get_index_of(&section.id) {
                return Err(SnapshotError::DuplicateSection {
                    id: format!("{:?}", section.id),
                    first,
                    second: index,
                });
            }
            table.insert(section.id, section.elements);
        }
        let locations = index_locations(&table)?;
        Ok(Self {
            sections: table,
            locations: Arc::new(locations),
        })
    }

    pub fn builder() -> SnapshotBuilder<S> {
        SnapshotBuilder::new()
    }

    /// Returns a new snapshot whose section `id` holds `elements`; every other
    /// section is shared with `self`.
    pub fn with_section_items(
        &self,
        id: &S,
        elements: impl IntoIterator<Item = ItemUniqueId>,
    ) -> Result<Self, SnapshotError> {
        let mut table = self.sections.clone();
        let Some(slot) = table.get_mut(id) else {
            return Err(SnapshotError::MissingSection {
                id: format!("{:?}", id),
            });
        };
        *slot = elements.into_iter().collect();
        let locations = index_locations(&table)?;
        Ok(Self {
            sections: table,
            locations: Arc::new(locations),
        })
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Total number of items across all sections.
    pub fn item_count(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn section_index(&self, id: &S) -> Option<usize> {
        self.sections.get_index_of(id)
    }

    pub fn section_id(&self, index: usize) -> Option<&S> {
        self.sections.get_index(index).map(|(id, _)| id)
    }

    pub fn section_ids(&self) -> impl Iterator<Item = &S> + '_ {
        self.sections.keys()
    }

    /// Items of the section with id `id`.
    pub fn items_in(&self, id: &S) -> Option<&[ItemUniqueId]> {
        self.sections.get(id).map(|items| &items[..])
    }

    /// Shared handle to the item array of section `index`.
    pub fn section_elements(&self, index: usize) -> Option<&Arc<[ItemUniqueId]>> {
        self.sections.get_index(index).map(|(_, items)| items)
    }

    /// Sections in order as `(id, items)` pairs.
    pub fn sections(&self) -> impl Iterator<Item = (&S, &[ItemUniqueId])> + '_ {
        self.sections.iter().map(|(id, items)| (id, &items[..]))
    }

    /// Every item with its position, in visual order.
    pub fn items(&self) -> impl Iterator<Item = (IndexPath, ItemUniqueId)> + '_ {
        self.sections
            .values()
            .enumerate()
            .flat_map(|(section, items)| {
                items
                    .iter()
                    .enumerate()
                    .map(move |(item, id)| (IndexPath::new(section, item), *id))
            })
    }

    /// Current position of `id`, if it is part of this snapshot.
    pub fn index_path(&self, id: &ItemUniqueId) -> Option<IndexPath> {
        self.locations.get(id).copied()
    }

    pub fn contains(&self, id: &ItemUniqueId) -> bool {
        self.locations.contains_key(id)
    }

    /// Converts back to an owned section list.
    pub fn to_sections(&self) -> Vec<Section<S>> {
        self.sections
            .iter()
            .map(|(id, elements)| Section {
                id: id.clone(),
                elements: Arc::clone(elements),
            })
            .collect()
    }
}

fn index_locations<S: SectionId>(
    table: &IndexMap<S, Arc<[ItemUniqueId]>>,
) -> Result<HashMap<ItemUniqueId, IndexPath>, SnapshotError> {
    let total = table.values().map(|items| items.len()).sum();
    let mut locations: HashMap<ItemUniqueId, IndexPath> = HashMap::default();
    locations.reserve(total);
    for (section, items) in table.values().enumerate() {
        for (item, id) in items.iter().enumerate() {
            let path = IndexPath::new(section, item);
            if let Some(first) = locations.insert(*id, path) {
                return Err(SnapshotError::DuplicateItem {
                    item: *id,
                    first,
                    second: path,
                });
            }
        }
    }
    Ok(locations)
}

impl<S: SectionId> Default for Snapshot<S> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<S: SectionId> PartialEq for Snapshot<S> {
    /// Order-sensitive: two snapshots are equal when they describe the same
    /// sections with the same items in the same order.
    fn eq(&self, other: &Self) -> bool {
        self.sections.len() == other.sections.len()
            && self
                .sections
                .iter()
                .zip(other.sections.iter())
                .all(|((a_id, a_items), (b_id, b_items))| a_id == b_id && a_items == b_items)
    }
}

impl<S: SectionId> Eq for Snapshot<S> {}

impl<S: SectionId> fmt::Debug for Snapshot<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.sections.iter().map(|(id, items)| (id, items.len())))
            .finish()
    }
}

impl<S: SectionId> ItemIdentifierProvider for Snapshot<S> {
    fn section_count(&self) -> usize {
        self.sections.len()
    }

    fn item_identifiers(&self, section_index: usize) -> Option<&[ItemUniqueId]> {
        self.sections
            .get_index(section_index)
            .map(|(_, items)| &items[..])
    }
}

/// Collects sections and validates them into a [`Snapshot`].
///
/// # Example
///
/// ```rust
/// use sectionlist_core::Snapshot;
///
/// let snapshot = Snapshot::builder()
///     .section("pinned", ["a", "b"])
///     .section("recent", 0..10u32)
///     .build()
///     .expect("unique ids");
/// assert_eq!(snapshot.item_count(), 12);
/// ```
pub struct SnapshotBuilder<S> {
    sections: Vec<Section<S>>,
}

impl<S: SectionId> SnapshotBuilder<S> {
    pub fn new() -> Self {
        Self {
            sections: Vec::new(),
        }
    }

    /// Appends a section whose item identities are derived from `items`.
    pub fn section<I, T>(mut self, id: S, items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Hash,
    {
        self.sections.push(Section::from_items(id, items));
        self
    }

    /// Appends a section with precomputed identities.
    pub fn section_with_ids(
        mut self,
        id: S,
        elements: impl IntoIterator<Item = ItemUniqueId>,
    ) -> Self {
        self.sections.push(Section::new(id, elements));
        self
    }

    pub fn push(&mut self, section: Section<S>) -> &mut Self {
        self.sections.push(section);
        self
    }

    pub fn build(self) -> Result<Snapshot<S>, SnapshotError> {
        Snapshot::new(self.sections)
    }
}

impl<S: SectionId> Default for SnapshotBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}
