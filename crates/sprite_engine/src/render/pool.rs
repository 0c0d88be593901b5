//! Reference-counted resource pool
//!
//! Shared storage behind the texture, vertex and sound managers. Resources
//! are deduplicated by a string key, reference counted through cloneable
//! [`PoolHandle`]s, and evicted under memory pressure.
//!
//! # Architecture
//!
//! ```text
//! ResourcePool<T>
//!     ├── entries   (SlotMap: resource, cost, age, residency)
//!     ├── order     (insertion order, the sweep order for eviction)
//!     └── by_key    (cache key -> entry, when caching is enabled)
//!             ↓
//!       PoolHandle<T>  (entry key + shared reference counter)
//! ```
//!
//! An entry is *resident* while its device-level allocation exists; only
//! resident entries count towards [`ResourcePool::utilized_kb`]. An entry
//! with no outstanding handles is *unique* and may be erased outright.
//!
//! # Usage
//!
//! ```rust
//! use sprite_engine::render::pool::ResourcePool;
//!
//! let mut pool: ResourcePool<&str> = ResourcePool::new(true);
//! let a = pool.insert(Some("hero.png".to_string()), "pixels", 64);
//! pool.set_resident(&a, true);
//! let b = pool.lookup("hero.png").unwrap();
//! assert_eq!(a, b);
//! assert_eq!(pool.utilized_kb(), 64);
//! ```

use crate::foundation::collections::{new_key_type, SlotMap};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

new_key_type! {
    /// Key of a pool entry
    pub struct ResourceKey;
}

/// Counted reference to a pooled resource.
///
/// Cloning adds a reference; dropping removes one. The pool never erases an
/// entry while a handle to it exists.
pub struct PoolHandle<T> {
    key: ResourceKey,
    refs: Rc<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> PoolHandle<T> {
    /// Key of the referenced entry
    pub fn key(&self) -> ResourceKey {
        self.key
    }

    /// Number of outstanding handles to the entry, this one included
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.refs) - 1
    }
}

impl<T> Clone for PoolHandle<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            refs: self.refs.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> PartialEq for PoolHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T> Eq for PoolHandle<T> {}

impl<T> fmt::Debug for PoolHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolHandle")
            .field("key", &self.key)
            .field("refs", &self.ref_count())
            .finish()
    }
}

#[derive(Debug)]
struct PoolEntry<T> {
    resource: T,
    refs: Rc<()>,
    cost_kb: u32,
    age_ms: u32,
    cache_key: Option<String>,
    resident: bool,
}

impl<T> PoolEntry<T> {
    fn is_unique(&self) -> bool {
        Rc::strong_count(&self.refs) == 1
    }
}

/// Outcome of a [`ResourcePool::collect`] pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectStats {
    /// Entries erased from the pool
    pub erased: usize,
    /// Referenced entries whose allocation was released
    pub unloaded: usize,
}

/// Reference-counted cache with budget-driven eviction
#[derive(Debug)]
pub struct ResourcePool<T> {
    entries: SlotMap<ResourceKey, PoolEntry<T>>,
    order: Vec<ResourceKey>,
    by_key: HashMap<String, ResourceKey>,
    caching: bool,
    utilized_kb: u32,
}

impl<T> ResourcePool<T> {
    /// Create an empty pool; `caching` enables deduplication by key
    pub fn new(caching: bool) -> Self {
        Self {
            entries: SlotMap::with_key(),
            order: Vec::new(),
            by_key: HashMap::new(),
            caching,
            utilized_kb: 0,
        }
    }

    /// True when loads are deduplicated by key
    pub fn caching(&self) -> bool {
        self.caching
    }

    /// New reference to a cached entry, if caching is enabled and one exists
    pub fn lookup(&self, cache_key: &str) -> Option<PoolHandle<T>> {
        if !self.caching {
            return None;
        }
        let key = *self.by_key.get(cache_key)?;
        let entry = self.entries.get(key)?;
        Some(PoolHandle {
            key,
            refs: entry.refs.clone(),
            _marker: PhantomData,
        })
    }

    /// Add a non-resident entry and return the first handle to it.
    ///
    /// Entries without a cache key (dynamic resources) are never shared.
    pub fn insert(&mut self, cache_key: Option<String>, resource: T, cost_kb: u32) -> PoolHandle<T> {
        let refs = Rc::new(());
        let key = self.entries.insert(PoolEntry {
            resource,
            refs: refs.clone(),
            cost_kb,
            age_ms: 0,
            cache_key: cache_key.clone(),
            resident: false,
        });
        self.order.push(key);
        if let (true, Some(cache_key)) = (self.caching, cache_key) {
            self.by_key.insert(cache_key, key);
        }
        PoolHandle {
            key,
            refs,
            _marker: PhantomData,
        }
    }

    /// Resource behind a handle
    pub fn get(&self, handle: &PoolHandle<T>) -> Option<&T> {
        self.entries.get(handle.key).map(|e| &e.resource)
    }

    /// Mutable resource behind a handle
    pub fn get_mut(&mut self, handle: &PoolHandle<T>) -> Option<&mut T> {
        self.entries.get_mut(handle.key).map(|e| &mut e.resource)
    }

    /// Resource by entry key
    pub fn get_by_key(&self, key: ResourceKey) -> Option<&T> {
        self.entries.get(key).map(|e| &e.resource)
    }

    /// Mutable resource by entry key
    pub fn get_by_key_mut(&mut self, key: ResourceKey) -> Option<&mut T> {
        self.entries.get_mut(key).map(|e| &mut e.resource)
    }

    /// True while the entry's allocation exists
    pub fn is_resident(&self, handle: &PoolHandle<T>) -> bool {
        self.entries.get(handle.key).is_some_and(|e| e.resident)
    }

    /// Record that the entry's allocation was created or released
    pub fn set_resident(&mut self, handle: &PoolHandle<T>, resident: bool) {
        if let Some(entry) = self.entries.get_mut(handle.key) {
            match (entry.resident, resident) {
                (false, true) => self.utilized_kb += entry.cost_kb,
                (true, false) => self.utilized_kb -= entry.cost_kb,
                _ => {}
            }
            entry.resident = resident;
        }
    }

    /// Reset the entry's age; called whenever the resource is used
    pub fn touch(&mut self, handle: &PoolHandle<T>) {
        if let Some(entry) = self.entries.get_mut(handle.key) {
            entry.age_ms = 0;
        }
    }

    /// Milliseconds since the entry was last used
    pub fn age_ms(&self, handle: &PoolHandle<T>) -> Option<u32> {
        self.entries.get(handle.key).map(|e| e.age_ms)
    }

    /// Memory cost of resident entries
    pub fn utilized_kb(&self) -> u32 {
        self.utilized_kb
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the pool has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if the entry has a key in the dedup index
    pub fn contains_key(&self, cache_key: &str) -> bool {
        self.by_key.contains_key(cache_key)
    }

    /// Keys and resources in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (ResourceKey, &T)> {
        self.order
            .iter()
            .filter_map(|&key| self.entries.get(key).map(|e| (key, &e.resource)))
    }

    fn unload_entry(&mut self, key: ResourceKey, unload: &mut impl FnMut(&mut T)) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) if entry.resident => {
                unload(&mut entry.resource);
                entry.resident = false;
                self.utilized_kb -= entry.cost_kb;
                true
            }
            _ => false,
        }
    }

    fn erase(&mut self, key: ResourceKey, unload: &mut impl FnMut(&mut T)) {
        self.unload_entry(key, unload);
        if let Some(entry) = self.entries.remove(key) {
            if let Some(cache_key) = entry.cache_key {
                if self.by_key.get(&cache_key) == Some(&key) {
                    self.by_key.remove(&cache_key);
                }
            }
        }
    }

    /// Evict until utilized memory drops below `target_kb`.
    ///
    /// The first pass erases unreferenced entries regardless of age. When
    /// `stale_age_ms` is given, a second pass releases the allocation of
    /// entries unused for longer than that, keeping the entries so they can
    /// be reloaded. `unload` releases a resident resource's allocation.
    pub fn collect(
        &mut self,
        target_kb: u32,
        stale_age_ms: Option<u32>,
        mut unload: impl FnMut(&mut T),
    ) -> CollectStats {
        let mut stats = CollectStats::default();
        let order = std::mem::take(&mut self.order);
        let mut kept = Vec::with_capacity(order.len());
        let mut reached = false;
        for key in order {
            let unique = self.entries.get(key).is_some_and(PoolEntry::is_unique);
            if !reached && unique {
                self.erase(key, &mut unload);
                stats.erased += 1;
                reached = self.utilized_kb < target_kb;
            } else if self.entries.contains_key(key) {
                kept.push(key);
            }
        }
        self.order = kept;
        if reached {
            return stats;
        }

        if let Some(stale_age_ms) = stale_age_ms {
            let candidates: Vec<ResourceKey> = self.order.clone();
            for key in candidates {
                let stale = self.entries.get(key).is_some_and(|e| e.age_ms > stale_age_ms);
                if stale && self.unload_entry(key, &mut unload) {
                    stats.unloaded += 1;
                }
                if self.utilized_kb < target_kb {
                    break;
                }
            }
        }
        stats
    }

    /// Age every entry by `dt_ms`, erasing unreferenced entries already idle
    /// for longer than `idle_limit_ms`. Returns the number erased.
    pub fn expire_idle(&mut self, dt_ms: u32, idle_limit_ms: u32, mut unload: impl FnMut(&mut T)) -> usize {
        let order = std::mem::take(&mut self.order);
        let mut kept = Vec::with_capacity(order.len());
        let mut erased = 0;
        for key in order {
            let Some(entry) = self.entries.get_mut(key) else {
                continue;
            };
            if entry.is_unique() && entry.age_ms > idle_limit_ms {
                self.erase(key, &mut unload);
                erased += 1;
            } else {
                entry.age_ms = entry.age_ms.saturating_add(dt_ms);
                kept.push(key);
            }
        }
        self.order = kept;
        erased
    }

    /// Release every resident allocation, keeping all entries
    pub fn unload_all(&mut self, mut unload: impl FnMut(&mut T)) {
        for key in self.order.clone() {
            self.unload_entry(key, &mut unload);
        }
    }

    /// Erase every entry, releasing resident allocations
    pub fn clear(&mut self, mut unload: impl FnMut(&mut T)) {
        for key in std::mem::take(&mut self.order) {
            self.erase(key, &mut unload);
        }
        self.by_key.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resident_pool(costs: &[u32]) -> (ResourcePool<u32>, Vec<PoolHandle<u32>>) {
        let mut pool = ResourcePool::new(true);
        let handles = costs
            .iter()
            .enumerate()
            .map(|(i, &cost)| {
                let h = pool.insert(Some(format!("r{i}")), i as u32, cost);
                pool.set_resident(&h, true);
                h
            })
            .collect();
        (pool, handles)
    }

    #[test]
    fn test_same_key_shares_entry_and_cost() {
        let mut pool: ResourcePool<u32> = ResourcePool::new(true);
        let a = pool.insert(Some("a".into()), 1, 100);
        pool.set_resident(&a, true);
        let b = pool.lookup("a").unwrap();
        pool.set_resident(&b, true);
        assert_eq!(a, b);
        assert_eq!(a.ref_count(), 2);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.utilized_kb(), 100);
    }

    #[test]
    fn test_caching_disabled_never_shares() {
        let mut pool: ResourcePool<u32> = ResourcePool::new(false);
        pool.insert(Some("a".into()), 1, 10);
        assert!(pool.lookup("a").is_none());
    }

    #[test]
    fn test_collect_erases_unreferenced_until_target() {
        let (mut pool, handles) = resident_pool(&[100, 100, 100, 100]);
        drop(handles);
        let mut unloaded = Vec::new();
        let stats = pool.collect(250, Some(70), |r| unloaded.push(*r));
        assert_eq!(stats.erased, 2);
        assert_eq!(pool.utilized_kb(), 200);
        assert_eq!(unloaded, vec![0, 1]);
        assert!(pool.lookup("r0").is_none());
        assert!(pool.lookup("r2").is_some());
    }

    #[test]
    fn test_collect_never_erases_referenced() {
        let (mut pool, mut handles) = resident_pool(&[100, 100, 100]);
        let held = handles.remove(1);
        drop(handles);
        pool.collect(0, None, |_| {});
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.get(&held), Some(&1));
        assert_eq!(pool.utilized_kb(), 100);
    }

    #[test]
    fn test_stale_pass_unloads_but_keeps_referenced() {
        let (mut pool, handles) = resident_pool(&[100, 100]);
        pool.expire_idle(100, 10_000, |_| {});
        pool.touch(&handles[1]);
        let stats = pool.collect(50, Some(70), |_| {});
        assert_eq!(stats, CollectStats { erased: 0, unloaded: 1 });
        assert!(!pool.is_resident(&handles[0]));
        assert!(pool.is_resident(&handles[1]));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_expire_idle_only_drops_unreferenced() {
        let (mut pool, mut handles) = resident_pool(&[10, 10]);
        let held = handles.remove(0);
        drop(handles);
        assert_eq!(pool.expire_idle(20_000, 10_000, |_| {}), 0);
        assert_eq!(pool.expire_idle(1, 10_000, |_| {}), 1);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.age_ms(&held), Some(20_001));
    }
}
