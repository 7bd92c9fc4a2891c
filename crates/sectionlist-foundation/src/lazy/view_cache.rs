//! Two-tier cache of render objects keyed by item identity.
//!
//! - The **auto-cache** is bounded by [`ViewCachePolicy::capacity`] and evicts
//!   the least recently touched entry that nothing protects.
//! - The **persistent cache** is unbounded and opt-in. Its entries are
//!   implicitly pinned and only leave through [`ViewCache::remove_persistent`]
//!   or [`ViewCache::clear`].
//!
//! When nothing is evictable the auto-cache grows past its capacity instead of
//! dropping an object that is still on screen.

use std::collections::BTreeMap;

use sectionlist_core::collections::map::{HashMap, HashSet};
use sectionlist_core::ItemUniqueId;

use super::item_provider::ItemRenderer;

/// Default number of render objects kept by the auto-cache.
pub const DEFAULT_AUTO_CACHE_CAPACITY: usize = 32;

/// Policy for the bounded auto-cache tier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewCachePolicy {
    /// Maximum number of auto-cached objects.
    ///
    /// Persistent objects that have been displayed are mirrored into the auto
    /// tier and count toward this bound without ever being evicted from it.
    /// Size the capacity above the number of persistent items expected on
    /// screen, or new auto entries are evicted as soon as they are inserted.
    pub capacity: usize,

    /// Whether displayed objects are auto-cached at all.
    pub enabled: bool,
}

impl Default for ViewCachePolicy {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_AUTO_CACHE_CAPACITY,
            enabled: true,
        }
    }
}

impl ViewCachePolicy {
    /// Creates a policy with the specified capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            enabled: true,
        }
    }

    /// Disables auto-caching. Persistent entries are still honored.
    pub fn disabled() -> Self {
        Self {
            capacity: 0,
            enabled: false,
        }
    }
}

/// An auto-cached render object.
#[derive(Clone, Debug)]
pub struct CacheEntry<R> {
    pub key: ItemUniqueId,
    pub value: R,
    pub pinned: bool,
    /// Value of the cache clock at the last touch.
    pub last_touch: u64,
}

/// Counters describing cache behavior since creation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ViewCacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Objects created through [`ItemRenderer::materialize`].
    pub materialized: u64,
    /// Cached objects handed out again through [`ViewCache::materialize`].
    pub reused: u64,
    pub evictions: u64,
    /// Times the auto-cache went over capacity because nothing was evictable.
    pub over_capacity_events: u64,
}

/// Render-object cache for one list instance.
///
/// Owned and mutated by the list's main path only.
pub struct ViewCache<R> {
    auto: HashMap<ItemUniqueId, CacheEntry<R>>,
    /// `last_touch -> key`, oldest first.
    recency: BTreeMap<u64, ItemUniqueId>,
    persistent: HashMap<ItemUniqueId, R>,
    pinned: HashSet<ItemUniqueId>,
    /// Identities currently shown by a cell.
    visible: HashSet<ItemUniqueId>,
    clock: u64,
    over_capacity: bool,
    policy: ViewCachePolicy,
    stats: ViewCacheStats,
}

impl<R: Clone> ViewCache<R> {
    /// Creates a cache with the default policy.
    pub fn new() -> Self {
        Self::with_policy(ViewCachePolicy::default())
    }

    /// Creates a cache with the specified policy.
    pub fn with_policy(policy: ViewCachePolicy) -> Self {
        Self {
            auto: HashMap::default(),
            recency: BTreeMap::new(),
            persistent: HashMap::default(),
            pinned: HashSet::default(),
            visible: HashSet::default(),
            clock: 0,
            over_capacity: false,
            policy,
            stats: ViewCacheStats::default(),
        }
    }

    pub fn policy(&self) -> &ViewCachePolicy {
        &self.policy
    }

    /// Replaces the policy and evicts down to the new capacity.
    pub fn set_policy(&mut self, policy: ViewCachePolicy) {
        self.policy = policy;
        if !self.policy.enabled {
            let keep: HashSet<ItemUniqueId> = self
                .auto
                .keys()
                .filter(|id| !self.is_evictable(id))
                .copied()
                .collect();
            self.auto.retain(|id, _| keep.contains(id));
            self.recency.retain(|_, id| keep.contains(id));
        }
        self.evict_if_needed();
    }

    /// Looks up `id` (persistent tier first) and records the access.
    pub fn get(&mut self, id: ItemUniqueId) -> Option<R> {
        if let Some(value) = self.persistent.get(&id).cloned() {
            self.stats.hits += 1;
            self.upsert(id, value.clone());
            self.evict_if_needed();
            return Some(value);
        }
        if self.touch(id) {
            self.stats.hits += 1;
            return self.auto.get(&id).map(|entry| entry.value.clone());
        }
        self.stats.misses += 1;
        None
    }

    /// Looks up `id` without touching recency or counters.
    pub fn peek(&self, id: &ItemUniqueId) -> Option<&R> {
        self.persistent
            .get(id)
            .or_else(|| self.auto.get(id).map(|entry| &entry.value))
    }

    /// Stores `value` in the auto-cache and enforces the capacity bound.
    pub fn set(&mut self, id: ItemUniqueId, value: R) {
        self.upsert(id, value);
        self.evict_if_needed();
    }

    /// Marks `id` as most recently used. Returns whether it was auto-cached.
    pub fn touch(&mut self, id: ItemUniqueId) -> bool {
        let Some(entry) = self.auto.get_mut(&id) else {
            return false;
        };
        self.recency.remove(&entry.last_touch);
        self.clock += 1;
        entry.last_touch = self.clock;
        self.recency.insert(self.clock, id);
        true
    }

    /// Protects `id` from eviction, whether or not it is cached yet.
    pub fn pin(&mut self, id: ItemUniqueId) {
        self.pinned.insert(id);
        if let Some(entry) = self.auto.get_mut(&id) {
            entry.pinned = true;
        }
    }

    pub fn unpin(&mut self, id: ItemUniqueId) {
        self.pinned.remove(&id);
        if let Some(entry) = self.auto.get_mut(&id) {
            entry.pinned = false;
        }
        self.evict_if_needed();
    }

    pub fn is_pinned(&self, id: &ItemUniqueId) -> bool {
        self.pinned.contains(id) || self.persistent.contains_key(id)
    }

    /// Opts `id` into the unbounded persistent tier.
    pub fn insert_persistent(&mut self, id: ItemUniqueId, value: R) {
        self.persistent.insert(id, value);
    }

    /// Removes `id` from the persistent tier. The auto-cache copy, if any,
    /// becomes evictable again.
    pub fn remove_persistent(&mut self, id: &ItemUniqueId) -> Option<R> {
        let removed = self.persistent.remove(id);
        if removed.is_some() {
            self.evict_if_needed();
        }
        removed
    }

    /// Records that a cell currently shows `id`.
    pub fn mark_visible(&mut self, id: ItemUniqueId) {
        self.visible.insert(id);
    }

    /// Records that no cell shows `id` any more; it may now be evicted.
    pub fn mark_hidden(&mut self, id: &ItemUniqueId) {
        if self.visible.remove(id) {
            self.evict_if_needed();
        }
    }

    pub fn is_visible(&self, id: &ItemUniqueId) -> bool {
        self.visible.contains(id)
    }

    /// Returns the render object for `id`, creating it on a miss.
    ///
    /// Lookup order is persistent tier, auto tier, then
    /// [`ItemRenderer::materialize`]. Reused objects are refreshed through
    /// [`ItemRenderer::update_in_place`]. The result is always inserted into
    /// or touched in the auto-cache.
    pub fn materialize<F>(&mut self, id: ItemUniqueId, renderer: &mut F) -> R
    where
        F: ItemRenderer<RenderObject = R> + ?Sized,
    {
        let value = if let Some(object) = self.persistent.get_mut(&id) {
            renderer.update_in_place(object, id);
            self.stats.hits += 1;
            self.stats.reused += 1;
            object.clone()
        } else if let Some(entry) = self.auto.get_mut(&id) {
            renderer.update_in_place(&mut entry.value, id);
            self.stats.hits += 1;
            self.stats.reused += 1;
            entry.value.clone()
        } else {
            self.stats.misses += 1;
            self.stats.materialized += 1;
            renderer.materialize(id)
        };
        self.upsert(id, value.clone());
        self.evict_if_needed();
        value
    }

    /// Evicts least recently touched evictable entries until the auto-cache
    /// fits its capacity. Returns the number of evicted entries.
    pub fn evict_if_needed(&mut self) -> usize {
        let capacity = self.effective_capacity();
        if self.auto.len() <= capacity {
            self.over_capacity = false;
            return 0;
        }

        let excess = self.auto.len() - capacity;
        let victims: Vec<(u64, ItemUniqueId)> = self
            .recency
            .iter()
            .filter(|(_, id)| self.is_evictable(id))
            .take(excess)
            .map(|(touch, id)| (*touch, *id))
            .collect();
        for (touch, id) in &victims {
            self.recency.remove(touch);
            self.auto.remove(id);
        }
        self.stats.evictions += victims.len() as u64;

        if self.auto.len() > capacity {
            if !self.over_capacity {
                self.over_capacity = true;
                self.stats.over_capacity_events += 1;
                log::warn!(
                    "ViewCache: {} entries exceed capacity {} because none are evictable; \
                     consider raising the capacity",
                    self.auto.len(),
                    capacity
                );
            }
        } else {
            self.over_capacity = false;
        }
        victims.len()
    }

    /// Removes `id` from the auto-cache regardless of its state.
    pub fn remove(&mut self, id: &ItemUniqueId) -> Option<R> {
        let entry = self.auto.remove(id)?;
        self.recency.remove(&entry.last_touch);
        Some(entry.value)
    }

    /// Destroys every cached object in both tiers and forgets all pins.
    ///
    /// The visibility relation is kept: it mirrors the host's cells.
    pub fn clear(&mut self) {
        self.auto.clear();
        self.recency.clear();
        self.persistent.clear();
        self.pinned.clear();
        self.over_capacity = false;
    }

    /// Number of auto-cached objects.
    pub fn len(&self) -> usize {
        self.auto.len()
    }

    pub fn is_empty(&self) -> bool {
        self.auto.is_empty() && self.persistent.is_empty()
    }

    pub fn persistent_len(&self) -> usize {
        self.persistent.len()
    }

    pub fn visible_len(&self) -> usize {
        self.visible.len()
    }

    pub fn contains(&self, id: &ItemUniqueId) -> bool {
        self.auto.contains_key(id) || self.persistent.contains_key(id)
    }

    /// Auto-cached keys, least recently touched first.
    pub fn keys_by_recency(&self) -> impl Iterator<Item = ItemUniqueId> + '_ {
        self.recency.values().copied()
    }

    pub fn entry(&self, id: &ItemUniqueId) -> Option<&CacheEntry<R>> {
        self.auto.get(id)
    }

    pub fn stats(&self) -> &ViewCacheStats {
        &self.stats
    }

    fn effective_capacity(&self) -> usize {
        if self.policy.enabled {
            self.policy.capacity
        } else {
            0
        }
    }

    fn is_evictable(&self, id: &ItemUniqueId) -> bool {
        !self.pinned.contains(id) && !self.visible.contains(id) && !self.persistent.contains_key(id)
    }

    fn upsert(&mut self, id: ItemUniqueId, value: R) {
        if !self.policy.enabled {
            return;
        }
        self.clock += 1;
        let touch = self.clock;
        let pinned = self.pinned.contains(&id);
        if let Some(previous) = self.auto.insert(
            id,
            CacheEntry {
                key: id,
                value,
                pinned,
                last_touch: touch,
            },
        ) {
            self.recency.remove(&previous.last_touch);
        }
        self.recency.insert(touch, id);
    }
}

impl<R: Clone> Default for ViewCache<R> {
    fn default() -> Self {
        Self::new()
    }
}
