// # GcWorker
//
// Reclaims CellStore files no METADATA access group references anymore.
// Each pass starts from a clean slate: scan every `Files` cell, group by
// `(row, access_group)`, keep the newest version per group as live and the
// rest as garbage, tally a refcount per file actually present in the DFS
// (live names count, garbage-only names don't), delete whole METADATA rows
// whose every access group's live cell is the "no files" sentinel, delete
// the superseded cell versions that remain, then reap any DFS file whose
// refcount came out to zero. Running `gc()` twice back to back with no
// intervening writes is a no-op the second time — there's no cross-pass
// state to get out of sync.

use crate::config::GcConfig;
use crate::dfs::Dfs;
use crate::error::Result;
use crate::metadata::{parse_files_value, FilesCell, MetadataTable};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Summary of one `GcWorker::gc` pass.
#[derive(Debug, Clone, Default)]
pub struct GcReport {
    pub rows_deleted: usize,
    pub files_reaped: Vec<String>,
}

pub struct GcWorker<M: MetadataTable, D: Dfs> {
    metadata: Arc<M>,
    dfs: Arc<D>,
    config: GcConfig,
}

impl<M: MetadataTable, D: Dfs> GcWorker<M, D> {
    pub fn new(metadata: Arc<M>, dfs: Arc<D>, config: GcConfig) -> Self {
        GcWorker { metadata, dfs, config }
    }

    /// Runs one collection pass.
    pub async fn gc(&self) -> Result<GcReport> {
        let listed_files = self.dfs.list(&self.config.tables_dir).await?;
        let refcounts: DashMap<String, u64> = listed_files.into_iter().map(|f| (f, 0)).collect();

        let cells = self.metadata.scan_files().await?;
        let mut groups: HashMap<(Vec<u8>, String), Vec<FilesCell>> = HashMap::new();
        for cell in cells {
            groups
                .entry((cell.row.clone(), cell.access_group.clone()))
                .or_default()
                .push(cell);
        }

        // Per row: does at least one access group still have live files?
        let mut row_has_live_files: HashMap<Vec<u8>, bool> = HashMap::new();
        let mut stale_cells: Vec<(Vec<u8>, String, i64)> = Vec::new();

        for ((row, access_group), mut versions) in groups {
            versions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            if versions.len() > 1 && versions[0].timestamp == versions[1].timestamp {
                warn!(
                    row = ?row,
                    access_group,
                    timestamp = versions[0].timestamp,
                    "duplicate Files cell timestamp within one access group"
                );
            }

            let (live, garbage) = versions.split_at(1);
            let live_names = parse_files_value(&live[0].value);

            row_has_live_files.entry(row.clone()).or_insert(false);
            if !live_names.is_empty() {
                row_has_live_files.insert(row.clone(), true);
            }
            for name in &live_names {
                let path = format!("{}{}", self.config.tables_dir, name);
                *refcounts.entry(path).or_insert(0) += 1;
            }

            for old in garbage {
                for name in parse_files_value(&old.value) {
                    let path = format!("{}{}", self.config.tables_dir, name);
                    refcounts.entry(path).or_insert(0);
                }
                stale_cells.push((row.clone(), access_group.clone(), old.timestamp));
            }
        }

        let mut rows_deleted = 0;
        for (row, has_live) in &row_has_live_files {
            if !has_live {
                self.metadata.delete_row(row).await?;
                rows_deleted += 1;
            }
        }

        // Harmless no-op for rows just deleted wholesale above; their
        // individual cells are already gone.
        for (row, access_group, timestamp) in stale_cells {
            self.metadata.delete_cell(&row, &access_group, timestamp).await?;
        }

        let mut files_reaped = Vec::new();
        for entry in refcounts.iter() {
            if *entry.value() == 0 {
                let filename = entry.key().clone();
                match self.dfs.remove(&filename).await {
                    Ok(()) => files_reaped.push(filename),
                    Err(err) => warn!(filename, error = %err, "failed to reap file"),
                }
            }
        }

        info!(
            rows_deleted,
            files_reaped = files_reaped.len(),
            "garbage collection pass complete"
        );
        Ok(GcReport {
            rows_deleted,
            files_reaped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dfs::MemDfs;
    use crate::metadata::MemMetadataTable;

    fn config() -> GcConfig {
        GcConfig {
            tables_dir: "/tables/".to_string(),
            scan_batch_size: 1000,
        }
    }

    #[tokio::test]
    async fn reaps_files_with_no_referencing_row() {
        let metadata = Arc::new(MemMetadataTable::new());
        let dfs = Arc::new(MemDfs::new());
        dfs.seed("/tables/t1/cs1");
        dfs.seed("/tables/t1/cs2");
        metadata.seed_cell(b"row1".to_vec(), "ag1", 1, b"t1/cs1;\n");

        let worker = GcWorker::new(Arc::clone(&metadata), Arc::clone(&dfs), config());
        let report = worker.gc().await.unwrap();

        assert_eq!(report.files_reaped, vec!["/tables/t1/cs2".to_string()]);
        assert!(dfs.contains("/tables/t1/cs1"));
        assert!(!dfs.contains("/tables/t1/cs2"));
    }

    #[tokio::test]
    async fn deletes_rows_with_no_live_files() {
        let metadata = Arc::new(MemMetadataTable::new());
        let dfs = Arc::new(MemDfs::new());
        metadata.seed_cell(b"empty-row".to_vec(), "ag1", 1, b"!");

        let worker = GcWorker::new(Arc::clone(&metadata), Arc::clone(&dfs), config());
        let report = worker.gc().await.unwrap();

        assert_eq!(report.rows_deleted, 1);
        assert!(!metadata.contains_row(b"empty-row"));
    }

    #[tokio::test]
    async fn a_row_with_any_access_group_still_live_is_kept() {
        let metadata = Arc::new(MemMetadataTable::new());
        let dfs = Arc::new(MemDfs::new());
        dfs.seed("/tables/t1/cs1");
        metadata.seed_cell(b"row1".to_vec(), "ag1", 1, b"t1/cs1;\n");
        metadata.seed_cell(b"row1".to_vec(), "ag2", 1, b"!");

        let worker = GcWorker::new(Arc::clone(&metadata), Arc::clone(&dfs), config());
        let report = worker.gc().await.unwrap();

        assert_eq!(report.rows_deleted, 0);
        assert!(metadata.contains_row(b"row1"));
    }

    #[tokio::test]
    async fn a_file_referenced_by_any_row_survives() {
        let metadata = Arc::new(MemMetadataTable::new());
        let dfs = Arc::new(MemDfs::new());
        dfs.seed("/tables/t1/cs1");
        metadata.seed_cell(b"row1".to_vec(), "ag1", 1, b"t1/cs1;\n");
        metadata.seed_cell(b"row2".to_vec(), "ag1", 1, b"t1/cs1;\n");

        let worker = GcWorker::new(Arc::clone(&metadata), Arc::clone(&dfs), config());
        let report = worker.gc().await.unwrap();

        assert!(report.files_reaped.is_empty());
        assert!(dfs.contains("/tables/t1/cs1"));
    }

    #[tokio::test]
    async fn an_older_version_for_the_same_access_group_is_deleted_and_its_orphan_reaped() {
        let metadata = Arc::new(MemMetadataTable::new());
        let dfs = Arc::new(MemDfs::new());
        dfs.seed("/tables/t1/a.cs");
        dfs.seed("/tables/t1/b.cs");
        dfs.seed("/tables/t1/c.cs");
        // Newer version keeps a.cs and b.cs; the older version also listed
        // c.cs, which nothing live references anymore.
        metadata.seed_cell(b"T:end1".to_vec(), "ag1", 2, b"a.cs;\nb.cs;\n");
        metadata.seed_cell(b"T:end1".to_vec(), "ag1", 1, b"a.cs;\nc.cs;\n");

        let worker = GcWorker::new(Arc::clone(&metadata), Arc::clone(&dfs), config());
        let report = worker.gc().await.unwrap();

        assert_eq!(report.files_reaped, vec!["/tables/t1/c.cs".to_string()]);
        assert!(dfs.contains("/tables/t1/a.cs"));
        assert!(dfs.contains("/tables/t1/b.cs"));
        assert_eq!(metadata.cell_count(b"T:end1"), 1, "the older cell version must be deleted");
    }

    #[tokio::test]
    async fn second_pass_with_no_changes_is_a_no_op() {
        let metadata = Arc::new(MemMetadataTable::new());
        let dfs = Arc::new(MemDfs::new());
        dfs.seed("/tables/t1/cs1");
        metadata.seed_cell(b"row1".to_vec(), "ag1", 1, b"t1/cs1;\n");

        let worker = GcWorker::new(Arc::clone(&metadata), Arc::clone(&dfs), config());
        let first = worker.gc().await.unwrap();
        let second = worker.gc().await.unwrap();

        assert_eq!(first.rows_deleted, 0);
        assert_eq!(second.rows_deleted, 0);
        assert!(second.files_reaped.is_empty());
    }
}
