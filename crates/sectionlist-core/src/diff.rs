//! Identity diffing between two [`Snapshot`]s.
//!
//! The edit script uses batch-update semantics: removals are addressed by
//! their position in the old snapshot, insertions by their position in the
//! new snapshot, and moves by both. Items that keep their relative order are
//! stationary and fill the remaining slots, so only items outside a longest
//! increasing subsequence of old positions are reported as moves.
//!
//! Sections are matched by section id. An item whose section changes is never
//! reported as a move: it is removed from its old section and inserted into
//! its new one. Items belonging to inserted or removed sections are implied
//! by the section operation.

use std::sync::Arc;

use crate::identity::{IndexPath, ItemIdentifierProvider, ItemUniqueId, SectionId};
use crate::snapshot::Snapshot;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectionRemoval<S> {
    pub id: S,
    /// Index in the old snapshot.
    pub index: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectionInsertion<S> {
    pub id: S,
    /// Index in the new snapshot.
    pub index: usize,
    pub elements: Arc<[ItemUniqueId]>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectionMove<S> {
    pub id: S,
    pub from: usize,
    pub to: usize,
}

/// An item insertion (new position) or removal (old position).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ItemChange {
    pub id: ItemUniqueId,
    pub at: IndexPath,
}

/// A move within one section identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ItemMove {
    pub id: ItemUniqueId,
    pub from: IndexPath,
    pub to: IndexPath,
}

/// Whole-list identity changes, independent of positional bookkeeping.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdentityChanges {
    /// Present in new, absent in old; in new visual order.
    pub inserted: Vec<ItemUniqueId>,
    /// Present in old, absent in new; in old visual order.
    pub removed: Vec<ItemUniqueId>,
    /// Present in both at a different index path; in old visual order.
    pub moved: Vec<ItemUniqueId>,
    /// Subset of `moved` whose section identity changed.
    pub relocated: Vec<ItemUniqueId>,
}

/// Minimal transform from one snapshot to another.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditScript<S> {
    pub section_removals: Vec<SectionRemoval<S>>,
    pub section_insertions: Vec<SectionInsertion<S>>,
    pub section_moves: Vec<SectionMove<S>>,
    /// Sorted by old index path.
    pub item_removals: Vec<ItemChange>,
    /// Sorted by new index path.
    pub item_insertions: Vec<ItemChange>,
    /// Sorted by destination index path.
    pub item_moves: Vec<ItemMove>,
    pub identities: IdentityChanges,
}

impl<S> Default for EditScript<S> {
    fn default() -> Self {
        Self {
            section_removals: Vec::new(),
            section_insertions: Vec::new(),
            section_moves: Vec::new(),
            item_removals: Vec::new(),
            item_insertions: Vec::new(),
            item_moves: Vec::new(),
            identities: IdentityChanges::default(),
        }
    }
}

impl<S> EditScript<S> {
    /// `true` when applying the script would not change anything.
    pub fn is_empty(&self) -> bool {
        self.section_removals.is_empty()
            && self.section_insertions.is_empty()
            && self.section_moves.is_empty()
            && self.item_removals.is_empty()
            && self.item_insertions.is_empty()
            && self.item_moves.is_empty()
    }

    /// Number of individual operations in the script.
    pub fn len(&self) -> usize {
        self.section_removals.len()
            + self.section_insertions.len()
            + self.section_moves.len()
            + self.item_removals.len()
            + self.item_insertions.len()
            + self.item_moves.len()
    }

    /// Item removals from the section at old index `section`.
    pub fn removals_in(&self, section: usize) -> impl Iterator<Item = &ItemChange> + '_ {
        self.item_removals
            .iter()
            .filter(move |change| change.at.section == section)
    }

    /// Item insertions into the section at new index `section`.
    pub fn insertions_in(&self, section: usize) -> impl Iterator<Item = &ItemChange> + '_ {
        self.item_insertions
            .iter()
            .filter(move |change| change.at.section == section)
    }

    /// Item moves landing in the section at new index `section`.
    pub fn moves_in(&self, section: usize) -> impl Iterator<Item = &ItemMove> + '_ {
        self.item_moves
            .iter()
            .filter(move |item_move| item_move.to.section == section)
    }
}

/// Computes the edit script turning `old` into `new`.
///
/// The result depends only on the two snapshots; `diff(s, s)` is always empty.
pub fn diff<S: SectionId>(old: &Snapshot<S>, new: &Snapshot<S>) -> EditScript<S> {
    let mut script = EditScript::default();

    for (index, id) in old.section_ids().enumerate() {
        if new.section_index(id).is_none() {
            script.section_removals.push(SectionRemoval {
                id: id.clone(),
                index,
            });
        }
    }

    // (new index, old index) of every section present in both.
    let mut retained: Vec<(usize, usize)> = Vec::with_capacity(new.section_count());
    for (index, id) in new.section_ids().enumerate() {
        match old.section_index(id) {
            Some(old_index) => retained.push((index, old_index)),
            None => {
                let elements = new
                    .section_elements(index)
                    .cloned()
                    .unwrap_or_else(|| Arc::from(Vec::new()));
                script.section_insertions.push(SectionInsertion {
                    id: id.clone(),
                    index,
                    elements,
                });
            }
        }
    }

    let old_order: Vec<usize> = retained.iter().map(|&(_, old_index)| old_index).collect();
    for (&(to, from), stationary) in retained.iter().zip(longest_increasing_mask(&old_order)) {
        if !stationary {
            if let Some(id) = new.section_id(to) {
                script.section_moves.push(SectionMove {
                    id: id.clone(),
                    from,
                    to,
                });
            }
        }
    }

    for &(new_section, old_section) in &retained {
        diff_section_items(old, new, old_section, new_section, &mut script);
    }

    script.item_removals.sort_by_key(|change| change.at);
    script.item_insertions.sort_by_key(|change| change.at);
    script.item_moves.sort_by_key(|item_move| item_move.to);
    script.identities = identity_changes(old, new);

    log::trace!(
        "diff: {} section ops, {} item ops",
        script.section_removals.len()
            + script.section_insertions.len()
            + script.section_moves.len(),
        script.item_removals.len() + script.item_insertions.len() + script.item_moves.len(),
    );
    script
}

fn diff_section_items<S: SectionId>(
    old: &Snapshot<S>,
    new: &Snapshot<S>,
    old_section: usize,
    new_section: usize,
    script: &mut EditScript<S>,
) {
    let old_items = old.item_identifiers(old_section).unwrap_or(&[]);
    let new_items = new.item_identifiers(new_section).unwrap_or(&[]);

    for (offset, id) in old_items.iter().enumerate() {
        let stays = new
            .index_path(id)
            .is_some_and(|path| path.section == new_section);
        if !stays {
            script.item_removals.push(ItemChange {
                id: *id,
                at: IndexPath::new(old_section, offset),
            });
        }
    }

    // (new offset, old offset) of items that stay in this section.
    let mut common: Vec<(usize, usize)> = Vec::with_capacity(new_items.len());
    for (offset, id) in new_items.iter().enumerate() {
        match old.index_path(id) {
            Some(path) if path.section == old_section => common.push((offset, path.item)),
            _ => script.item_insertions.push(ItemChange {
                id: *id,
                at: IndexPath::new(new_section, offset),
            }),
        }
    }

    let old_offsets: Vec<usize> = common.iter().map(|&(_, from)| from).collect();
    for (&(to, from), stationary) in common.iter().zip(longest_increasing_mask(&old_offsets)) {
        if !stationary {
            script.item_moves.push(ItemMove {
                id: new_items[to],
                from: IndexPath::new(old_section, from),
                to: IndexPath::new(new_section, to),
            });
        }
    }
}

fn identity_changes<S: SectionId>(old: &Snapshot<S>, new: &Snapshot<S>) -> IdentityChanges {
    let mut changes = IdentityChanges::default();
    for (path, id) in old.items() {
        match new.index_path(&id) {
            None => changes.removed.push(id),
            Some(new_path) if new_path != path => {
                changes.moved.push(id);
                if old.section_id(path.section) != new.section_id(new_path.section) {
                    changes.relocated.push(id);
                }
            }
            Some(_) => {}
        }
    }
    changes.inserted = new
        .items()
        .filter(|(_, id)| !old.contains(id))
        .map(|(_, id)| id)
        .collect();
    changes
}

/// Marks the members of one longest strictly increasing subsequence of `seq`.
fn longest_increasing_mask(seq: &[usize]) -> Vec<bool> {
    let mut tails: Vec<usize> = Vec::new();
    let mut predecessor: Vec<Option<usize>> = vec![None; seq.len()];
    for (index, &value) in seq.iter().enumerate() {
        let position = tails.partition_point(|&tail| seq[tail] < value);
        if position > 0 {
            predecessor[index] = Some(tails[position - 1]);
        }
        if position == tails.len() {
            tails.push(index);
        } else {
            tails[position] = index;
        }
    }

    let mut mask = vec![false; seq.len()];
    let mut cursor = tails.last().copied();
    while let Some(index) = cursor {
        mask[index] = true;
        cursor = predecessor[index];
    }
    mask
}
