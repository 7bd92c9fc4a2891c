//! Applying edit scripts to a view.
//!
//! [`ListView`] is the seam to the host's list widget. [`ListModel`] is an
//! in-memory implementation that mirrors what a host would display; it is the
//! reference used to check that `diff(a, b)` applied to a view built from `a`
//! reproduces `b`.

use crate::collections::map::HashSet;
use crate::diff::EditScript;
use crate::error::ApplyError;
use crate::identity::{IndexPath, ItemUniqueId, SectionId};
use crate::snapshot::Snapshot;

/// Host view receiving batched structural updates.
pub trait ListView<S> {
    /// Performs every operation of `script` as one batch.
    ///
    /// Never called with an empty script.
    fn perform_batch_updates(&mut self, script: &EditScript<S>, animated: bool);
}

/// Applies `script` to `view`.
///
/// An empty script performs no call at all. Returns whether the view was
/// updated.
pub fn apply<S, V>(view: &mut V, script: &EditScript<S>, animated: bool) -> bool
where
    V: ListView<S> + ?Sized,
{
    if script.is_empty() {
        return false;
    }
    view.perform_batch_updates(script, animated);
    true
}

/// Sections and item identities as a host view would hold them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListModel<S> {
    sections: Vec<(S, Vec<ItemUniqueId>)>,
    batches: usize,
}

enum Slot<S> {
    Retained(usize),
    Inserted(S, Vec<ItemUniqueId>),
}

impl<S: SectionId> ListModel<S> {
    pub fn new() -> Self {
        Self {
            sections: Vec::new(),
            batches: 0,
        }
    }

    pub fn from_snapshot(snapshot: &Snapshot<S>) -> Self {
        Self {
            sections: snapshot
                .sections()
                .map(|(id, items)| (id.clone(), items.to_vec()))
                .collect(),
            batches: 0,
        }
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn section_id(&self, index: usize) -> Option<&S> {
        self.sections.get(index).map(|(id, _)| id)
    }

    pub fn items(&self, section: usize) -> Option<&[ItemUniqueId]> {
        self.sections.get(section).map(|(_, items)| &items[..])
    }

    /// Number of non-empty batches applied so far.
    pub fn batches_applied(&self) -> usize {
        self.batches
    }

    /// Whether the model shows exactly the sections and order of `snapshot`.
    pub fn matches(&self, snapshot: &Snapshot<S>) -> bool {
        self.sections.len() == snapshot.section_count()
            && self
                .sections
                .iter()
                .zip(snapshot.sections())
                .all(|((id, items), (other_id, other_items))| {
                    id == other_id && items[..] == *other_items
                })
    }

    /// Applies `script` atomically: on error the model is left untouched.
    pub fn apply_script(&mut self, script: &EditScript<S>) -> Result<(), ApplyError> {
        let old_len = self.sections.len();
        let mut vacated: HashSet<usize> = HashSet::default();
        for removal in &script.section_removals {
            check_section(removal.index, old_len)?;
            vacated.insert(removal.index);
        }
        for section_move in &script.section_moves {
            check_section(section_move.from, old_len)?;
            vacated.insert(section_move.from);
        }

        let new_len = (old_len + script.section_insertions.len())
            .checked_sub(script.section_removals.len())
            .ok_or(ApplyError::Incomplete { index: 0 })?;
        let mut slots: Vec<Option<Slot<S>>> = (0..new_len).map(|_| None).collect();
        for insertion in &script.section_insertions {
            place(
                &mut slots,
                insertion.index,
                Slot::Inserted(insertion.id.clone(), insertion.elements.to_vec()),
            )?;
        }
        for section_move in &script.section_moves {
            place(&mut slots, section_move.to, Slot::Retained(section_move.from))?;
        }
        let mut stationary = (0..old_len).filter(|index| !vacated.contains(index));
        for (index, slot) in slots.iter_mut().enumerate() {
            if slot.is_none() {
                let old_index = stationary.next().ok_or(ApplyError::Incomplete { index })?;
                *slot = Some(Slot::Retained(old_index));
            }
        }
        if stationary.next().is_some() {
            return Err(ApplyError::Incomplete { index: new_len });
        }

        let mut new_of_old: Vec<Option<usize>> = vec![None; old_len];
        for (new_index, slot) in slots.iter().enumerate() {
            if let Some(Slot::Retained(old_index)) = slot {
                new_of_old[*old_index] = Some(new_index);
            }
        }

        let mut sections = Vec::with_capacity(new_len);
        for (new_index, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(Slot::Inserted(id, items)) => {
                    let targets_inserted = script.insertions_in(new_index).next().is_some()
                        || script.moves_in(new_index).next().is_some();
                    if targets_inserted {
                        return Err(ApplyError::SlotConflict {
                            path: IndexPath::new(new_index, 0),
                        });
                    }
                    sections.push((id, items));
                }
                Some(Slot::Retained(old_index)) => {
                    let (id, old_items) = &self.sections[old_index];
                    let items = self.rebuild_section(script, old_index, new_index, old_items)?;
                    sections.push((id.clone(), items));
                }
                None => return Err(ApplyError::Incomplete { index: new_index }),
            }
        }

        for change in &script.item_removals {
            if new_of_old.get(change.at.section).copied().flatten().is_none() {
                return Err(ApplyError::ItemOutOfBounds { path: change.at });
            }
        }

        self.sections = sections;
        self.batches += 1;
        Ok(())
    }

    fn rebuild_section(
        &self,
        script: &EditScript<S>,
        old_index: usize,
        new_index: usize,
        old_items: &[ItemUniqueId],
    ) -> Result<Vec<ItemUniqueId>, ApplyError> {
        let mut vacated: HashSet<usize> = HashSet::default();
        for change in script.removals_in(old_index) {
            check_item(old_items, change.at, change.id)?;
            vacated.insert(change.at.item);
        }
        for item_move in script
            .item_moves
            .iter()
            .filter(|item_move| item_move.from.section == old_index)
        {
            check_item(old_items, item_move.from, item_move.id)?;
            vacated.insert(item_move.from.item);
        }

        let arriving: Vec<(usize, ItemUniqueId)> = script
            .insertions_in(new_index)
            .map(|change| (change.at.item, change.id))
            .chain(
                script
                    .moves_in(new_index)
                    .map(|item_move| (item_move.to.item, item_move.id)),
            )
            .collect();

        let new_len = (old_items.len() + arriving.len())
            .checked_sub(vacated.len())
            .ok_or(ApplyError::Incomplete { index: new_index })?;
        let mut slots: Vec<Option<ItemUniqueId>> = vec![None; new_len];
        for (offset, id) in arriving {
            let path = IndexPath::new(new_index, offset);
            match slots.get_mut(offset) {
                Some(slot @ None) => *slot = Some(id),
                Some(Some(_)) => return Err(ApplyError::SlotConflict { path }),
                None => return Err(ApplyError::ItemOutOfBounds { path }),
            }
        }

        let mut stationary = old_items
            .iter()
            .enumerate()
            .filter(|(offset, _)| !vacated.contains(offset))
            .map(|(_, id)| *id);
        for slot in slots.iter_mut().filter(|slot| slot.is_none()) {
            *slot = stationary.next();
        }
        if stationary.next().is_some() {
            return Err(ApplyError::Incomplete { index: new_index });
        }
        slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or(ApplyError::Incomplete { index: new_index })
    }
}

fn check_section(index: usize, len: usize) -> Result<(), ApplyError> {
    if index < len {
        Ok(())
    } else {
        Err(ApplyError::SectionOutOfBounds { index, len })
    }
}

fn check_item(items: &[ItemUniqueId], path: IndexPath, id: ItemUniqueId) -> Result<(), ApplyError> {
    match items.get(path.item) {
        Some(existing) if *existing == id => Ok(()),
        _ => Err(ApplyError::ItemOutOfBounds { path }),
    }
}

fn place<S>(slots: &mut [Option<Slot<S>>], index: usize, slot: Slot<S>) -> Result<(), ApplyError> {
    let len = slots.len();
    match slots.get_mut(index) {
        Some(target @ None) => {
            *target = Some(slot);
            Ok(())
        }
        Some(Some(_)) => Err(ApplyError::SlotConflict {
            path: IndexPath::new(index, 0),
        }),
        None => Err(ApplyError::SectionOutOfBounds { index, len }),
    }
}

impl<S: SectionId> Default for ListModel<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: SectionId> ListView<S> for ListModel<S> {
    fn perform_batch_updates(&mut self, script: &EditScript<S>, _animated: bool) {
        if let Err(err) = self.apply_script(script) {
            log::error!("ListModel: edit script rejected: {err}");
        }
    }
}
