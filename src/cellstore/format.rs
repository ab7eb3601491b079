/// 10-byte ASCII block magic numbers, padded with `-` to a fixed width so
/// every block header is easy to eyeball in a hex dump.
pub const MAGIC_DATA: [u8; 10] = *b"Data------";
pub const MAGIC_IDX_FIXED: [u8; 10] = *b"IdxFix----";
pub const MAGIC_IDX_VAR: [u8; 10] = *b"IdxVar----";
pub const MAGIC_TRAILER: [u8; 10] = *b"Trailer---";

pub const FORMAT_VERSION: u32 = 1;

/// Trailer written at the end of every CellStore file, giving a reader the
/// byte offsets of the other three blocks without needing to scan forward
/// from the start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    pub cell_count: u32,
    pub data_block_offset: u64,
    pub idx_fixed_offset: u64,
    pub idx_var_offset: u64,
    pub format_version: u32,
}

pub const TRAILER_LEN: usize = 10 + 4 + 8 + 8 + 8 + 4;

impl Trailer {
    pub fn encode(&self) -> [u8; TRAILER_LEN] {
        let mut buf = [0u8; TRAILER_LEN];
        let mut w = 0;
        buf[w..w + 10].copy_from_slice(&MAGIC_TRAILER);
        w += 10;
        buf[w..w + 4].copy_from_slice(&self.cell_count.to_le_bytes());
        w += 4;
        buf[w..w + 8].copy_from_slice(&self.data_block_offset.to_le_bytes());
        w += 8;
        buf[w..w + 8].copy_from_slice(&self.idx_fixed_offset.to_le_bytes());
        w += 8;
        buf[w..w + 8].copy_from_slice(&self.idx_var_offset.to_le_bytes());
        w += 8;
        buf[w..w + 4].copy_from_slice(&self.format_version.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Option<Trailer> {
        if buf.len() != TRAILER_LEN || buf[0..10] != MAGIC_TRAILER {
            return None;
        }
        let mut r = 10;
        let cell_count = u32::from_le_bytes(buf[r..r + 4].try_into().ok()?);
        r += 4;
        let data_block_offset = u64::from_le_bytes(buf[r..r + 8].try_into().ok()?);
        r += 8;
        let idx_fixed_offset = u64::from_le_bytes(buf[r..r + 8].try_into().ok()?);
        r += 8;
        let idx_var_offset = u64::from_le_bytes(buf[r..r + 8].try_into().ok()?);
        r += 8;
        let format_version = u32::from_le_bytes(buf[r..r + 4].try_into().ok()?);
        Some(Trailer {
            cell_count,
            data_block_offset,
            idx_fixed_offset,
            idx_var_offset,
            format_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailer_round_trips() {
        let trailer = Trailer {
            cell_count: 42,
            data_block_offset: 0,
            idx_fixed_offset: 1000,
            idx_var_offset: 2000,
            format_version: FORMAT_VERSION,
        };
        let encoded = trailer.encode();
        assert_eq!(Trailer::decode(&encoded), Some(trailer));
    }

    #[test]
    fn decode_rejects_wrong_magic() {
        let mut buf = [0u8; TRAILER_LEN];
        buf[0..10].copy_from_slice(b"XXXXXXXXXX");
        assert_eq!(Trailer::decode(&buf), None);
    }
}
