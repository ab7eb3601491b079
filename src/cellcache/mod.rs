// # CellCache
//
// The in-memory write buffer for a single range. Composes an `Arena`
// (owns the bytes) with a `CellMap` (orders them). Writes go in until
// `freeze()` is called, at which point the cache becomes read-only and
// concurrent scanners no longer contend on a lock; see `CellMap` for how
// that transition is implemented.

mod cell_map;
mod mask;
mod scanner;

pub use cell_map::CellMap;
pub use mask::ColumnFamilyMask;
pub use scanner::{CellCacheScanner, ScanSpec, ScannedCell};

use crate::arena::Arena;
use crate::common::{Component, ComponentStats, HealthStatus, MetricValue, Monitorable};
use crate::error::{RangeTableError, Result};
use crate::key::value::CounterValue;
use crate::key::{decode_content, Flag, Key, SerializedKey};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

pub struct CellCache {
    arena: Arena,
    map: CellMap,
    stats: Mutex<ComponentStats>,
    /// Sticky, cache-wide: once any counter cell is written with a
    /// non-`Insert` flag (a counter delete/tombstone), every subsequent
    /// `add_counter` call — for any `(row, cf, cq)`, not just the one that
    /// tripped it — skips the merge-in-place fast path and just adds.
    /// Mirrors `CellCache::m_have_counter_deletes` upstream: once deletes
    /// are present, `lower_bound` can no longer be trusted to land on an
    /// undeleted total, so merging must stop everywhere.
    have_counter_deletes: AtomicBool,
}

impl CellCache {
    pub fn new() -> Self {
        CellCache {
            arena: Arena::new(),
            map: CellMap::new(),
            stats: Mutex::new(ComponentStats::default()),
            have_counter_deletes: AtomicBool::new(false),
        }
    }

    pub fn with_page_size(page_size: usize) -> Self {
        CellCache {
            arena: Arena::with_page_size(page_size),
            map: CellMap::new(),
            stats: Mutex::new(ComponentStats::default()),
            have_counter_deletes: AtomicBool::new(false),
        }
    }

    /// Inserts a plain (non-counter) cell.
    pub fn add(&self, key: &Key<'_>, value: &[u8]) -> Result<()> {
        if self.map.is_frozen() {
            return Err(RangeTableError::Internal(
                "add called on a frozen CellCache".to_string(),
            ));
        }
        let (serialized, offset) = self.arena.alloc_cell(key, value);
        if self.map.insert(serialized, offset).is_some() {
            warn!(row = ?key.row, "exact key collision in CellCache");
        }
        self.stats.lock().record_success();
        Ok(())
    }

    /// Merges a counter delta or reset into the running total stored at
    /// `(key.row, key.column_family, key.column_qualifier)`, returning the
    /// new total.
    ///
    /// A `Reset` always lands as a fresh entry ahead of whatever delta
    /// chain preceded it (matching the original's tombstone-by-insertion
    /// behavior) — cache size grows by one. A `Delta` instead looks up the
    /// most recent entry for this `(row, cf, cq)` via `lower_bound`; if
    /// that entry's prefix matches and its value is itself a `Delta`, the
    /// merge happens in place (the stale entry is removed and the merged
    /// total is inserted under the incoming key), leaving cache size
    /// unchanged. Any other case — no prior entry, or the most recent
    /// entry is a `Reset` — falls through to inserting a fresh entry.
    /// Arithmetic wraps on overflow, matching the wire encoding's
    /// fixed-width `i64`.
    ///
    /// If `key.flag` isn't `Flag::Insert` (a counter delete), or if any
    /// earlier call already saw one, the merge fast path is skipped
    /// entirely — every cache-wide counter write after that point just
    /// adds, and this is permanent for the life of the cache. See
    /// `have_counter_deletes`.
    pub fn add_counter(&self, key: &Key<'_>, op: CounterValue) -> Result<i64> {
        if self.map.is_frozen() {
            return Err(RangeTableError::Internal(
                "add_counter called on a frozen CellCache".to_string(),
            ));
        }

        if key.flag.is_delete() {
            self.have_counter_deletes.store(true, Ordering::Release);
            return self.add_counter_fresh(key, op);
        }

        if self.have_counter_deletes.load(Ordering::Acquire) {
            return self.add_counter_fresh(key, op);
        }

        let previous = self.previous_counter_entry(key.row, key.column_family, key.column_qualifier);

        let merged = match op {
            CounterValue::Reset(reset_to) => {
                let encoded = CounterValue::Reset(reset_to).encode();
                let (serialized, offset) = self.arena.alloc_cell(key, &encoded);
                if self.map.insert(serialized, offset).is_some() {
                    warn!(row = ?key.row, "exact key collision merging a counter cell");
                }
                reset_to
            }
            CounterValue::Delta(delta) => {
                let previous_value = previous.as_ref().map(|(_, v)| *v);
                let total = match previous_value {
                    Some(CounterValue::Delta(prev)) => prev.wrapping_add(delta),
                    Some(CounterValue::Reset(prev)) => prev.wrapping_add(delta),
                    None => delta,
                };
                let encoded = CounterValue::Delta(total).encode();
                let (serialized, offset) = self.arena.alloc_cell(key, &encoded);

                if matches!(previous_value, Some(CounterValue::Delta(_))) {
                    let (stale_key, _) = previous.expect("checked Some above");
                    self.map.remove(&stale_key);
                }
                if self.map.insert(serialized, offset).is_some() {
                    warn!(row = ?key.row, "exact key collision merging a counter cell");
                }
                total
            }
        };

        self.stats.lock().record_success();
        Ok(merged)
    }

    /// Adds `op` as a brand-new entry with no merge lookup at all: the path
    /// taken for counter deletes themselves, and for every counter write
    /// that follows one anywhere in the cache.
    fn add_counter_fresh(&self, key: &Key<'_>, op: CounterValue) -> Result<i64> {
        let value = match op {
            CounterValue::Delta(v) => v,
            CounterValue::Reset(v) => v,
        };
        let encoded = op.encode();
        let (serialized, offset) = self.arena.alloc_cell(key, &encoded);
        if self.map.insert(serialized, offset).is_some() {
            warn!(row = ?key.row, "exact key collision adding a counter cell");
        }
        self.stats.lock().record_success();
        Ok(value)
    }

    /// Current accumulated value at `(row, cf, cq)`, or `None` if no
    /// counter cell has ever been written there.
    pub fn latest_counter_value(&self, row: &[u8], cf: u8, cq: &[u8]) -> Option<i64> {
        self.previous_counter_entry(row, cf, cq).map(|(_, v)| match v {
            CounterValue::Delta(v) => v,
            CounterValue::Reset(v) => v,
        })
    }

    /// Finds the most recent counter entry for `(row, cf, cq)`, if any, via
    /// a `lower_bound` probe keyed on the largest possible timestamp and
    /// revision for that prefix (counter cells are always written with
    /// `Flag::Insert`, so the first entry at or after that probe that
    /// shares the prefix is the newest one).
    fn previous_counter_entry(&self, row: &[u8], cf: u8, cq: &[u8]) -> Option<(SerializedKey, CounterValue)> {
        let probe_key = Key::new(row, cf, cq, Flag::DeleteRow, i64::MAX, i64::MAX);
        let probe_content = probe_key.encode_content();
        let probe = SerializedKey::from_boxed(&probe_content);

        let (found_key, offset) = self.map.lower_bound(&probe)?;
        let decoded = decode_content(found_key.as_slice())?;
        if decoded.row != row || decoded.column_family != cf || decoded.column_qualifier != cq {
            return None;
        }
        let value = unsafe { self.arena.value_at(&found_key, offset) };
        CounterValue::decode(value).map(|c| (found_key, c))
    }

    /// Reads back the value stored for `key`, looking it up by its exact
    /// serialized bytes. Mostly useful in tests; production scans go
    /// through `CellCacheScanner`.
    pub fn get(&self, key: &Key<'_>) -> Option<Vec<u8>> {
        let content = key.encode_content();
        let probe = SerializedKey::from_boxed(&content);
        let (found, offset) = self.map.lower_bound(&probe)?;
        if found.as_slice() != probe.as_slice() {
            return None;
        }
        Some(unsafe { self.arena.value_at(&found, offset) }.to_vec())
    }

    pub fn create_scanner(&self, spec: ScanSpec) -> CellCacheScanner<'_> {
        CellCacheScanner::new(self, spec)
    }

    pub(crate) fn arena(&self) -> &Arena {
        &self.arena
    }

    pub(crate) fn map(&self) -> &CellMap {
        &self.map
    }

    /// Distinct row keys currently present, in ascending order.
    pub fn get_rows(&self) -> Vec<Vec<u8>> {
        let mut rows: Vec<Vec<u8>> = Vec::new();
        for (key, _) in self.map.collect_all() {
            if let Some(decoded) = decode_content(key.as_slice()) {
                if rows.last().map(|r| r.as_slice() != decoded.row).unwrap_or(true) {
                    rows.push(decoded.row.to_vec());
                }
            }
        }
        rows
    }

    /// Picks up to `n` candidate split-point rows, evenly spaced through
    /// the cache's current key order. Used by range-splitting logic that
    /// lives outside this crate's scope; exposed here since it only needs
    /// the map.
    pub fn get_split_rows(&self, n: usize) -> Vec<Vec<u8>> {
        let rows = self.get_rows();
        if n == 0 || rows.is_empty() {
            return Vec::new();
        }
        let stride = (rows.len() / (n + 1)).max(1);
        rows.into_iter()
            .skip(stride)
            .step_by(stride)
            .take(n)
            .collect()
    }

    pub fn memory_used(&self) -> usize {
        self.arena.used()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn is_frozen(&self) -> bool {
        self.map.is_frozen()
    }

    /// Makes the cache read-only. After this, `add`/`add_counter` return
    /// errors and scanning no longer contends on a lock.
    pub fn freeze(&self) {
        self.map.freeze();
        debug!(cells = self.len(), "CellCache frozen");
    }

    /// Reverses `freeze`. Callers must ensure no scanner is mid-iteration;
    /// `CellCache` itself has no way to track outstanding scanners.
    pub fn unfreeze(&self) {
        self.map.unfreeze();
    }
}

impl Default for CellCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for CellCache {
    fn health_check(&self) -> HealthStatus {
        HealthStatus::Healthy
    }
}

impl Monitorable for CellCache {
    fn collect_metrics(&self) -> HashMap<String, MetricValue> {
        let mut metrics = HashMap::new();
        metrics.insert("cells".to_string(), MetricValue::Gauge(self.len() as f64));
        metrics.insert(
            "memory_used_bytes".to_string(),
            MetricValue::Gauge(self.memory_used() as f64),
        );
        metrics.insert(
            "collisions".to_string(),
            MetricValue::Counter(self.map.collisions()),
        );
        metrics
    }
}
