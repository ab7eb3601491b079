// # Configuration
//
// Mirrors the teacher's `DatabaseConfig` pattern: a serde-backed struct with
// a sane `Default`, loadable from a config file with environment overrides.

use crate::error::{RangeTableError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// `SharedMutator` configuration (timeouts, flush cadence, flags).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutatorConfig {
    /// Per-operation deadline.
    pub timeout_ms: u64,
    /// Period for the interval flush; `0` disables the interval handler.
    pub flush_interval_ms: u64,
    /// Bitmask of `MutatorFlags`.
    pub flags: u32,
    /// Buffered-size threshold (bytes) above which `auto_flush` fires.
    pub auto_flush_threshold_bytes: u64,
}

impl Default for MutatorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            flush_interval_ms: 0,
            flags: 0,
            auto_flush_threshold_bytes: 4 * 1024 * 1024,
        }
    }
}

/// Flags accepted by `MutatorConfig::flags`.
pub mod mutator_flags {
    pub const NO_LOG_SYNC: u32 = 1 << 0;
    pub const IGNORE_UNKNOWN_CFS: u32 = 1 << 1;
    pub const IGNORE_CELL_LIMIT: u32 = 1 << 2;
}

/// `GcWorker` configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcConfig {
    /// Directory under which CellStore files live, e.g. `/hypertable/tables/`.
    pub tables_dir: String,
    /// Max cells to request per metadata scan batch.
    pub scan_batch_size: usize,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            tables_dir: "/rangetable/tables/".to_string(),
            scan_batch_size: 1000,
        }
    }
}

/// `CellCache` configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CellCacheConfig {
    /// Default page size for the backing arena (bytes).
    pub arena_page_size: usize,
    /// Allocations larger than this get a dedicated page instead of sharing
    /// the current default page.
    pub arena_page_alloc_limit: usize,
    /// Size at which a Range should call `freeze()`. Consulted by callers of
    /// `CellCache::memory_used()`; not enforced by the cache itself.
    pub freeze_threshold_bytes: u64,
}

impl Default for CellCacheConfig {
    fn default() -> Self {
        let page_size = 256 * 1024;
        Self {
            arena_page_size: page_size,
            arena_page_alloc_limit: page_size / 2,
            freeze_threshold_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Top-level process configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RangeTableConfig {
    pub cellcache: CellCacheConfig,
    pub mutator: MutatorConfig,
    pub gc: GcConfig,
}

impl RangeTableConfig {
    /// Load configuration from a JSON file (`rangetable.json`); the whole
    /// file must parse, there is no partial-default merge. Environment
    /// variable `RANGETABLE_GC_TABLES_DIR`, when set, overrides
    /// `gc.tables_dir` after the file is loaded.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: RangeTableConfig =
            serde_json::from_str(&contents).map_err(|e| RangeTableError::Config(e.to_string()))?;
        if let Ok(dir) = std::env::var("RANGETABLE_GC_TABLES_DIR") {
            config.gc.tables_dir = dir;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_json() {
        let config = RangeTableConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: RangeTableConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.cellcache.arena_page_size, config.cellcache.arena_page_size);
        assert_eq!(parsed.mutator.timeout_ms, config.mutator.timeout_ms);
    }

    #[test]
    fn load_reads_file_and_applies_env_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rangetable.json");
        let config = RangeTableConfig::default();
        std::fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();

        std::env::set_var("RANGETABLE_GC_TABLES_DIR", "/custom/tables/");
        let loaded = RangeTableConfig::load(&path).unwrap();
        std::env::remove_var("RANGETABLE_GC_TABLES_DIR");

        assert_eq!(loaded.gc.tables_dir, "/custom/tables/");
    }
}
