// # MetadataTable
//
// The seam `GcWorker` reads versioned `Files` cells through to find which
// CellStore files back each range's access groups, and through which it
// deletes stale cell versions and whole rows. Production code would be a
// `RangeClient`-backed view of the real `METADATA` table; `MemMetadataTable`
// is the in-process double.

use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// One version of a `METADATA` row's `Files` cell for a single access
/// group. A row can carry several of these per access group — `GcWorker`
/// keeps only the newest (by `timestamp`) as live and reaps the rest.
#[derive(Debug, Clone)]
pub struct FilesCell {
    pub row: Vec<u8>,
    pub access_group: String,
    pub timestamp: i64,
    /// Raw cell value: entries separated by `;\n`, each optionally
    /// prefixed with `#`, or a value starting with the sentinel byte `'!'`
    /// meaning "no files" for this access group. See `parse_files_value`.
    pub value: Vec<u8>,
}

#[async_trait]
pub trait MetadataTable: Send + Sync {
    /// Every `Files` cell currently present, across every row, access
    /// group, and version. `GcWorker` groups and orders these itself.
    async fn scan_files(&self) -> Result<Vec<FilesCell>>;

    /// Deletes one specific cell version.
    async fn delete_cell(&self, row: &[u8], access_group: &str, timestamp: i64) -> Result<()>;

    /// Deletes every cell belonging to a row (its range no longer exists).
    async fn delete_row(&self, row: &[u8]) -> Result<()>;
}

/// Parses a `Files` cell's raw value into the filenames it lists.
///
/// A value whose first byte is the sentinel `'!'` means this access group
/// currently has no live files and parses to an empty list. Otherwise
/// entries are separated by `;\n` and a leading `#` — used upstream to mark
/// a filename as already slated for removal — is stripped before the name
/// is returned.
pub fn parse_files_value(raw: &[u8]) -> Vec<String> {
    if raw.first() == Some(&b'!') {
        return Vec::new();
    }
    String::from_utf8_lossy(raw)
        .split(";\n")
        .map(|entry| entry.strip_prefix('#').unwrap_or(entry))
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

/// Encodes a `METADATA` row key as `[u16 BE table_id.len()][table_id
/// bytes][end_row bytes]`. The fixed-width length prefix lets a reader
/// recover `table_id` without scanning for a separator, which matters
/// because `end_row` itself may contain arbitrary bytes.
pub fn encode_metadata_row(table_id: &str, end_row: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(2 + table_id.len() + end_row.len());
    buf.extend_from_slice(&(table_id.len() as u16).to_be_bytes());
    buf.extend_from_slice(table_id.as_bytes());
    buf.extend_from_slice(end_row);
    buf
}

/// Inverse of `encode_metadata_row`.
pub fn decode_metadata_row(row: &[u8]) -> Option<(String, Vec<u8>)> {
    if row.len() < 2 {
        return None;
    }
    let mut len_bytes = [0u8; 2];
    len_bytes.copy_from_slice(&row[0..2]);
    let table_id_len = u16::from_be_bytes(len_bytes) as usize;
    if row.len() < 2 + table_id_len {
        return None;
    }
    let table_id = String::from_utf8(row[2..2 + table_id_len].to_vec()).ok()?;
    let end_row = row[2 + table_id_len..].to_vec();
    Some((table_id, end_row))
}

pub struct MemMetadataTable {
    rows: Mutex<BTreeMap<Vec<u8>, Vec<FilesCell>>>,
}

impl MemMetadataTable {
    pub fn new() -> Self {
        MemMetadataTable {
            rows: Mutex::new(BTreeMap::new()),
        }
    }

    /// Seeds one versioned `Files` cell for `(row, access_group)`.
    pub fn seed_cell(&self, row: Vec<u8>, access_group: &str, timestamp: i64, raw_value: &[u8]) {
        self.rows.lock().entry(row.clone()).or_default().push(FilesCell {
            row,
            access_group: access_group.to_string(),
            timestamp,
            value: raw_value.to_vec(),
        });
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn contains_row(&self, row: &[u8]) -> bool {
        self.rows.lock().contains_key(row)
    }

    /// Number of cell versions still stored for `row`, across every access
    /// group. Zero after the row's last cell is individually deleted, even
    /// if the row's (now-empty) entry hasn't been dropped via `delete_row`.
    pub fn cell_count(&self, row: &[u8]) -> usize {
        self.rows.lock().get(row).map(Vec::len).unwrap_or(0)
    }
}

impl Default for MemMetadataTable {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataTable for MemMetadataTable {
    async fn scan_files(&self) -> Result<Vec<FilesCell>> {
        Ok(self.rows.lock().values().flatten().cloned().collect())
    }

    async fn delete_cell(&self, row: &[u8], access_group: &str, timestamp: i64) -> Result<()> {
        if let Some(cells) = self.rows.lock().get_mut(row) {
            cells.retain(|c| !(c.access_group == access_group && c.timestamp == timestamp));
        }
        Ok(())
    }

    async fn delete_row(&self, row: &[u8]) -> Result<()> {
        self.rows.lock().remove(row);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_row_key_round_trips() {
        let row = encode_metadata_row("my_table", b"zzz");
        let (table_id, end_row) = decode_metadata_row(&row).unwrap();
        assert_eq!(table_id, "my_table");
        assert_eq!(end_row, b"zzz");
    }

    #[test]
    fn row_key_prefix_survives_end_row_containing_arbitrary_bytes() {
        let end_row = vec![0u8, 1, 2, 255];
        let row = encode_metadata_row("t", &end_row);
        let (table_id, decoded_end_row) = decode_metadata_row(&row).unwrap();
        assert_eq!(table_id, "t");
        assert_eq!(decoded_end_row, end_row);
    }

    #[test]
    fn parse_files_value_splits_on_semicolon_newline() {
        let names = parse_files_value(b"a.cs;\nb.cs;\n");
        assert_eq!(names, vec!["a.cs".to_string(), "b.cs".to_string()]);
    }

    #[test]
    fn parse_files_value_strips_leading_hash() {
        let names = parse_files_value(b"#a.cs;\nb.cs;\n");
        assert_eq!(names, vec!["a.cs".to_string(), "b.cs".to_string()]);
    }

    #[test]
    fn parse_files_value_sentinel_means_no_files() {
        assert_eq!(parse_files_value(b"!"), Vec::<String>::new());
    }

    #[tokio::test]
    async fn scan_delete_cell_and_delete_row() {
        let table = MemMetadataTable::new();
        table.seed_cell(b"row1".to_vec(), "ag1", 1, b"cs1;\n");
        table.seed_cell(b"row1".to_vec(), "ag1", 2, b"cs1;\ncs2;\n");

        let cells = table.scan_files().await.unwrap();
        assert_eq!(cells.len(), 2);

        table.delete_cell(b"row1", "ag1", 1).await.unwrap();
        assert_eq!(table.cell_count(b"row1"), 1);

        table.delete_row(b"row1").await.unwrap();
        assert!(!table.contains_row(b"row1"));
    }
}
