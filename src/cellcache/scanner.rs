use super::mask::ColumnFamilyMask;
use super::CellCache;
use crate::key::{decode_content, Flag, Key, SerializedKey};

/// Bounds and filters for a `CellCache` scan.
#[derive(Debug, Clone, Default)]
pub struct ScanSpec {
    /// Inclusive. `None` means "from the beginning".
    pub start_row: Option<Vec<u8>>,
    /// Inclusive. `None` means "to the end".
    pub end_row: Option<Vec<u8>>,
    pub families: Option<Vec<u8>>,
}

impl ScanSpec {
    pub fn all() -> Self {
        ScanSpec::default()
    }

    fn mask(&self) -> ColumnFamilyMask {
        match &self.families {
            Some(families) => ColumnFamilyMask::from_families(families.iter().copied()),
            None => ColumnFamilyMask::all(),
        }
    }
}

/// A decoded cell handed back by `CellCacheScanner::next`.
#[derive(Debug, Clone)]
pub struct ScannedCell {
    pub row: Vec<u8>,
    pub column_family: u8,
    pub column_qualifier: Vec<u8>,
    pub flag: Flag,
    pub timestamp: i64,
    pub revision: i64,
    pub value: Vec<u8>,
}

/// Forward iterator over a `CellCache`'s contents within a row range,
/// filtered to a set of column families.
///
/// `DELETE_ROW` tombstones are admitted regardless of the family filter —
/// callers need to see them to know a row has been wholly deleted even if
/// they only asked for specific families. This relies on `DELETE_ROW`
/// cells being written with `column_family = 0` (see `Key::delete_row`),
/// which puts them first among a row's entries; a scanner starting
/// mid-row would otherwise have no way to notice one.
///
/// Snapshots the matching `(SerializedKey, offset)` pairs at construction
/// time via `CellMap::collect_range`, which takes the map's lock exactly
/// once (or, on a frozen cache, not at all). Decoding happens lazily as
/// `next()` is called.
pub struct CellCacheScanner<'a> {
    cache: &'a CellCache,
    entries: Vec<(SerializedKey, u32)>,
    cursor: usize,
    mask: ColumnFamilyMask,
}

impl<'a> CellCacheScanner<'a> {
    pub(super) fn new(cache: &'a CellCache, spec: ScanSpec) -> Self {
        let start_content = spec
            .start_row
            .as_deref()
            .map(|row| row_lower_bound_content(row));
        // `end_row` is inclusive, so the upper bound passed to `collect_range`
        // (which treats its `to` as exclusive) must sort after every cell of
        // `end_row` itself, not before all of them.
        let end_content = spec
            .end_row
            .as_deref()
            .map(|row| row_exclusive_upper_bound_content(row));

        let start_key = start_content
            .as_deref()
            .map(SerializedKey::from_boxed)
            .unwrap_or_else(|| SerializedKey::from_boxed(&[]));
        let end_key = end_content.as_deref().map(SerializedKey::from_boxed);

        let entries = cache.map().collect_range(&start_key, end_key.as_ref());

        CellCacheScanner {
            cache,
            entries,
            cursor: 0,
            mask: spec.mask(),
        }
    }

    fn decode_at(&self, idx: usize) -> ScannedCell {
        let (key, offset) = &self.entries[idx];
        let decoded = decode_content(key.as_slice()).expect("cache only holds well-formed keys");
        let value = unsafe { self.cache.arena().value_at(key, *offset) };
        ScannedCell {
            row: decoded.row.to_vec(),
            column_family: decoded.column_family,
            column_qualifier: decoded.column_qualifier.to_vec(),
            flag: decoded.flag,
            timestamp: decoded.timestamp,
            revision: decoded.revision,
            value: value.to_vec(),
        }
    }
}

impl<'a> Iterator for CellCacheScanner<'a> {
    type Item = ScannedCell;

    fn next(&mut self) -> Option<ScannedCell> {
        while self.cursor < self.entries.len() {
            let idx = self.cursor;
            self.cursor += 1;
            let cell = self.decode_at(idx);
            if cell.flag == Flag::DeleteRow || self.mask.contains(cell.column_family) {
                return Some(cell);
            }
        }
        None
    }
}

/// The smallest possible serialized-key content for `row`: the key that
/// would sort immediately before any real cell in that row, used as a
/// `lower_bound`/range-start probe.
fn row_lower_bound_content(row: &[u8]) -> Vec<u8> {
    Key::new(row, 0, &[], Flag::DeleteRow, i64::MAX, i64::MAX).encode_content()
}

/// The smallest serialized-key content that sorts strictly after every
/// real cell belonging to `row`, used as an exclusive range-end probe so
/// that `end_row` itself is scanned inclusively.
///
/// Every cell of `row` encodes to `row ++ 0x00 ++ ...` (the field
/// terminator after the row bytes). Rows may not contain an embedded
/// `0x00`, so replacing that terminator with `0x01` yields a string that
/// is a byte-for-byte prefix match up through `row` and then strictly
/// greater at the first differing byte — landing after every cell of
/// `row` while still sorting before any other row that compares greater
/// than `row`.
fn row_exclusive_upper_bound_content(row: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(row.len() + 1);
    buf.extend_from_slice(row);
    buf.push(1);
    buf
}
