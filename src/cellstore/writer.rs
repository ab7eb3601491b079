use super::format::{Trailer, FORMAT_VERSION, MAGIC_DATA, MAGIC_IDX_FIXED, MAGIC_IDX_VAR};
use crate::key::value::encode_value;
use crate::key::Key;

fn checksummed_block(magic: [u8; 10], payload: &[u8]) -> Vec<u8> {
    let mut block = Vec::with_capacity(10 + 4 + payload.len() + 4);
    block.extend_from_slice(&magic);
    block.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    block.extend_from_slice(payload);
    block.extend_from_slice(&crc32c::crc32c(payload).to_le_bytes());
    block
}

/// Writes a CellStore file from cells already in ascending key order (the
/// order a frozen `CellCache` hands a compactor). Produces a data block
/// holding every cell, a fixed-width index of data-payload offsets, a
/// variable-width index of the corresponding key bytes, and a trailer —
/// see `cellstore::format` for the block layout.
pub struct CellStoreWriter;

impl CellStoreWriter {
    pub fn write(cells: &[(Key<'_>, Vec<u8>)]) -> Vec<u8> {
        let mut data_payload = Vec::new();
        let mut idx_fixed_payload = Vec::new();
        let mut idx_var_payload = Vec::new();

        for (key, value) in cells {
            let offset = data_payload.len() as u32;
            idx_fixed_payload.extend_from_slice(&offset.to_le_bytes());

            let content = key.encode_content();
            idx_var_payload.extend_from_slice(&(content.len() as u32).to_le_bytes());
            idx_var_payload.extend_from_slice(&content);

            data_payload.extend_from_slice(&(content.len() as u32).to_le_bytes());
            data_payload.extend_from_slice(&content);
            encode_value(value, &mut data_payload);
        }

        let data_block = checksummed_block(MAGIC_DATA, &data_payload);
        let idx_fixed_block = checksummed_block(MAGIC_IDX_FIXED, &idx_fixed_payload);
        let idx_var_block = checksummed_block(MAGIC_IDX_VAR, &idx_var_payload);

        let data_block_offset = 0u64;
        let idx_fixed_offset = data_block.len() as u64;
        let idx_var_offset = idx_fixed_offset + idx_fixed_block.len() as u64;

        let trailer = Trailer {
            cell_count: cells.len() as u32,
            data_block_offset,
            idx_fixed_offset,
            idx_var_offset,
            format_version: FORMAT_VERSION,
        };

        let mut file = Vec::with_capacity(
            data_block.len() + idx_fixed_block.len() + idx_var_block.len() + super::format::TRAILER_LEN,
        );
        file.extend_from_slice(&data_block);
        file.extend_from_slice(&idx_fixed_block);
        file.extend_from_slice(&idx_var_block);
        file.extend_from_slice(&trailer.encode());
        file
    }
}
