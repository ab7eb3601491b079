use crate::key::SerializedKey;
use parking_lot::Mutex;
use std::cell::UnsafeCell;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Ordered index from a cell's serialized key to the byte offset, within
/// that key's arena allocation, of its value (see `arena::Arena::alloc_cell`).
///
/// Access goes through `lock()`, whose behavior switches on `frozen`:
/// while unfrozen, it's a real `parking_lot::Mutex` guard, serializing
/// writers against readers and each other. Once `CellCache::freeze` has
/// run, `add`/`add_counter` refuse further writes (see `CellCache`), so
/// `lock()` degrades to a no-op — no contention, any number of scanner
/// threads can read concurrently — because there is nothing left to race
/// against. This mirrors the original CellCache's lock()/unlock() pair,
/// which does the same thing by skipping the underlying pthread mutex call
/// once frozen.
pub struct CellMap {
    map: UnsafeCell<BTreeMap<SerializedKey, u32>>,
    mutex: Mutex<()>,
    frozen: AtomicBool,
    collisions: AtomicU64,
}

unsafe impl Sync for CellMap {}

impl CellMap {
    pub fn new() -> Self {
        CellMap {
            map: UnsafeCell::new(BTreeMap::new()),
            mutex: Mutex::new(()),
            frozen: AtomicBool::new(false),
            collisions: AtomicU64::new(0),
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Runs `f` with shared access to the map. Blocks on the real mutex
    /// while unfrozen; otherwise runs immediately.
    pub fn with<R>(&self, f: impl FnOnce(&BTreeMap<SerializedKey, u32>) -> R) -> R {
        if self.is_frozen() {
            let map = unsafe { &*self.map.get() };
            f(map)
        } else {
            let _guard = self.mutex.lock();
            let map = unsafe { &*self.map.get() };
            f(map)
        }
    }

    /// Runs `f` with exclusive access to the map. Panics if the cache is
    /// frozen; `CellCache` is expected to check `is_frozen` before ever
    /// calling this, this is a last-resort invariant check.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut BTreeMap<SerializedKey, u32>) -> R) -> R {
        assert!(!self.is_frozen(), "attempted to mutate a frozen CellMap");
        let _guard = self.mutex.lock();
        let map = unsafe { &mut *self.map.get() };
        f(map)
    }

    /// Inserts `key -> offset`, returning the previous offset if `key`
    /// already occupied this exact position (an exact-key collision, which
    /// `CellCache` logs but otherwise treats as a silent overwrite).
    pub fn insert(&self, key: SerializedKey, offset: u32) -> Option<u32> {
        self.with_mut(|map| {
            let prev = map.insert(key, offset);
            if prev.is_some() {
                self.collisions.fetch_add(1, Ordering::Relaxed);
            }
            prev
        })
    }

    /// Removes `key`, returning its offset if present. Used by the counter
    /// merge fast path to replace an existing delta entry in place (remove
    /// the stale key, insert the merged one) without growing the map.
    pub fn remove(&self, key: &SerializedKey) -> Option<u32> {
        self.with_mut(|map| map.remove(key))
    }

    pub fn len(&self) -> usize {
        self.with(|map| map.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn collisions(&self) -> u64 {
        self.collisions.load(Ordering::Relaxed)
    }

    /// Synchronizes with any writer still mid-flight, then marks the map
    /// frozen. After this returns, `with_mut` panics and `with` stops
    /// locking.
    pub fn freeze(&self) {
        let _guard = self.mutex.lock();
        self.frozen.store(true, Ordering::Release);
    }

    /// Reverses `freeze`. Only safe to call when no scanner holds a
    /// reference into this map; `CellCache::unfreeze` upholds that.
    pub fn unfreeze(&self) {
        self.frozen.store(false, Ordering::Release);
    }

    /// Returns the first key at or after `from` (a `lower_bound` query),
    /// together with its value offset.
    pub fn lower_bound(&self, from: &SerializedKey) -> Option<(SerializedKey, u32)> {
        self.with(|map| {
            map.range((Bound::Included(*from), Bound::Unbounded))
                .next()
                .map(|(k, v)| (*k, *v))
        })
    }

    /// Iterates `[from, to)` in ascending key order, copying out each
    /// `(key, offset)` pair. Used by scanners, which otherwise can't hold
    /// a `BTreeMap` iterator borrow across the public `CellCacheScanner`
    /// API without entangling its lifetime with the lock guard.
    pub fn collect_range(&self, from: &SerializedKey, to: Option<&SerializedKey>) -> Vec<(SerializedKey, u32)> {
        self.with(|map| {
            let start = Bound::Included(*from);
            let end = match to {
                Some(t) => Bound::Excluded(*t),
                None => Bound::Unbounded,
            };
            map.range((start, end)).map(|(k, v)| (*k, *v)).collect()
        })
    }

    pub fn collect_all(&self) -> Vec<(SerializedKey, u32)> {
        self.with(|map| map.iter().map(|(k, v)| (*k, *v)).collect())
    }
}

impl Default for CellMap {
    fn default() -> Self {
        Self::new()
    }
}
