use super::decompressor::KeyDecompressorNone;
use super::format::{Trailer, MAGIC_DATA, MAGIC_IDX_FIXED, MAGIC_IDX_VAR, TRAILER_LEN};
use crate::error::{RangeTableError, Result};

struct Block<'a> {
    payload: &'a [u8],
}

fn read_block<'a>(buf: &'a [u8], expected_magic: [u8; 10]) -> Result<(Block<'a>, usize)> {
    if buf.len() < 18 || buf[0..10] != expected_magic {
        return Err(RangeTableError::Serialization(
            "CellStore block magic mismatch".to_string(),
        ));
    }
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&buf[10..14]);
    let payload_len = u32::from_le_bytes(len_bytes) as usize;
    let payload_start = 14;
    let payload_end = payload_start + payload_len;
    let checksum_end = payload_end + 4;
    if buf.len() < checksum_end {
        return Err(RangeTableError::Serialization(
            "CellStore block truncated".to_string(),
        ));
    }
    let payload = &buf[payload_start..payload_end];
    let mut checksum_bytes = [0u8; 4];
    checksum_bytes.copy_from_slice(&buf[payload_end..checksum_end]);
    let expected = u32::from_le_bytes(checksum_bytes);
    if crc32c::crc32c(payload) != expected {
        return Err(RangeTableError::Serialization(
            "CellStore block checksum mismatch".to_string(),
        ));
    }
    Ok((Block { payload }, checksum_end))
}

/// Read-only view over a CellStore file's bytes. Holds only offsets into
/// `data`; doesn't copy any cell content.
pub struct CellStoreReader<'a> {
    data: &'a [u8],
    trailer: Trailer,
}

impl<'a> CellStoreReader<'a> {
    pub fn open(data: &'a [u8]) -> Result<Self> {
        if data.len() < TRAILER_LEN {
            return Err(RangeTableError::Serialization(
                "CellStore file shorter than a trailer".to_string(),
            ));
        }
        let trailer_bytes = &data[data.len() - TRAILER_LEN..];
        let trailer = Trailer::decode(trailer_bytes).ok_or_else(|| {
            RangeTableError::Serialization("CellStore trailer magic mismatch".to_string())
        })?;
        Ok(CellStoreReader { data, trailer })
    }

    pub fn cell_count(&self) -> u32 {
        self.trailer.cell_count
    }

    fn data_block(&self) -> Result<Block<'a>> {
        let start = self.trailer.data_block_offset as usize;
        let (block, _) = read_block(&self.data[start..], MAGIC_DATA)?;
        Ok(block)
    }

    fn idx_var_block(&self) -> Result<Block<'a>> {
        let start = self.trailer.idx_var_offset as usize;
        let (block, _) = read_block(&self.data[start..], MAGIC_IDX_VAR)?;
        Ok(block)
    }

    fn idx_fixed_block(&self) -> Result<Block<'a>> {
        let start = self.trailer.idx_fixed_offset as usize;
        let (block, _) = read_block(&self.data[start..], MAGIC_IDX_FIXED)?;
        Ok(block)
    }

    /// Iterates every cell in key order.
    pub fn iter(&self) -> Result<KeyDecompressorNone<'a>> {
        Ok(KeyDecompressorNone::new(self.data_block()?.payload))
    }

    /// Binary-searches the variable-width key index for an exact key
    /// content match, then reads the value out of the data block at the
    /// matching fixed-index offset. `O(log n)` comparisons, `O(1)` data
    /// reads — the point of carrying a separate index alongside the data
    /// block instead of always scanning it.
    pub fn find(&self, key_content: &[u8]) -> Result<Option<&'a [u8]>> {
        let idx_var = self.idx_var_block()?.payload;
        let idx_fixed = self.idx_fixed_block()?.payload;

        let mut entries: Vec<&'a [u8]> = Vec::with_capacity(self.trailer.cell_count as usize);
        let mut pos = 0;
        while pos < idx_var.len() {
            let mut len_bytes = [0u8; 4];
            len_bytes.copy_from_slice(&idx_var[pos..pos + 4]);
            let len = u32::from_le_bytes(len_bytes) as usize;
            entries.push(&idx_var[pos + 4..pos + 4 + len]);
            pos += 4 + len;
        }

        let found = entries.binary_search_by(|candidate| candidate.cmp(&key_content));
        let idx = match found {
            Ok(idx) => idx,
            Err(_) => return Ok(None),
        };

        let mut offset_bytes = [0u8; 4];
        offset_bytes.copy_from_slice(&idx_fixed[idx * 4..idx * 4 + 4]);
        let data_offset = u32::from_le_bytes(offset_bytes) as usize;

        let data_payload = self.data_block()?.payload;
        let mut decompressor = KeyDecompressorNone::new(&data_payload[data_offset..]);
        Ok(decompressor.next().map(|(_, value)| value))
    }
}

#[cfg(test)]
mod tests {
    use super::super::writer::CellStoreWriter;
    use super::*;
    use crate::key::{Flag, Key};

    #[test]
    fn round_trips_cells_through_iter_and_find() {
        let cells = vec![
            (Key::new(b"a", 0, b"q", Flag::Insert, 2, 0), b"val-a".to_vec()),
            (Key::new(b"b", 0, b"q", Flag::Insert, 1, 0), b"val-b".to_vec()),
        ];
        let file = CellStoreWriter::write(&cells);
        let reader = CellStoreReader::open(&file).unwrap();
        assert_eq!(reader.cell_count(), 2);

        let collected: Vec<_> = reader.iter().unwrap().collect();
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[0].1, b"val-a");
        assert_eq!(collected[1].1, b"val-b");

        let b_content = cells[1].0.encode_content();
        let found = reader.find(&b_content).unwrap();
        assert_eq!(found, Some(b"val-b".as_slice()));
    }

    #[test]
    fn find_returns_none_for_missing_key() {
        let cells = vec![(Key::new(b"a", 0, b"q", Flag::Insert, 1, 0), b"v".to_vec())];
        let file = CellStoreWriter::write(&cells);
        let reader = CellStoreReader::open(&file).unwrap();
        let missing = Key::new(b"zzz", 0, b"q", Flag::Insert, 1, 0).encode_content();
        assert_eq!(reader.find(&missing).unwrap(), None);
    }

    #[test]
    fn rejects_truncated_file() {
        let cells = vec![(Key::new(b"a", 0, b"q", Flag::Insert, 1, 0), b"v".to_vec())];
        let file = CellStoreWriter::write(&cells);
        let truncated = &file[..file.len() / 2];
        assert!(CellStoreReader::open(truncated).is_err());
    }
}
