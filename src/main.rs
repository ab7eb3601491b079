// # rangetable-gc
//
// Standalone entry point that runs a `GcWorker` on a fixed interval. Wired
// against the in-memory `MemMetadataTable`/`MemDfs` doubles since this
// crate doesn't ship a network client for the real METADATA table or a
// DFS — those live in the range server and master processes this crate's
// components are meant to be embedded in. This binary exists to exercise
// the GC loop end to end and as a template for wiring in real
// implementations of `MetadataTable`/`Dfs`.

use rangetable::dfs::MemDfs;
use rangetable::gc::GcWorker;
use rangetable::metadata::MemMetadataTable;
use rangetable::{RangeTableConfig, Result, VERSION};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    print_banner();

    let config_path = std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("rangetable.json");

    let config = if config_path.exists() {
        match RangeTableConfig::load(&config_path) {
            Ok(config) => {
                info!(path = %config_path.display(), "loaded configuration");
                config
            }
            Err(err) => {
                warn!(error = %err, "failed to load configuration, using defaults");
                RangeTableConfig::default()
            }
        }
    } else {
        info!("no rangetable.json found, using defaults");
        RangeTableConfig::default()
    };

    info!(version = VERSION, tables_dir = %config.gc.tables_dir, "starting GC loop");

    let metadata = Arc::new(MemMetadataTable::new());
    let dfs = Arc::new(MemDfs::new());
    let worker = GcWorker::new(metadata, dfs, config.gc.clone());

    let period = Duration::from_millis(config.mutator.flush_interval_ms.max(60_000));
    loop {
        match worker.gc().await {
            Ok(report) => info!(
                rows_deleted = report.rows_deleted,
                files_reaped = report.files_reaped.len(),
                "GC pass complete"
            ),
            Err(err) => error!(error = %err, "GC pass failed"),
        }
        tokio::time::sleep(period).await;
    }
}

fn print_banner() {
    println!("╔══════════════════════════════════════════════╗");
    println!("║  RangeTable GC  v{:<28}║", VERSION);
    println!("╚══════════════════════════════════════════════╝");
}
