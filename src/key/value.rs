// Value encoding: opaque bytes behind a length prefix, plus the two
// fixed-layout counter payloads the merge logic in `cellcache` recognizes.

/// Tag byte marking a counter cell whose payload is a signed delta to apply
/// to whatever accumulator it merges against.
pub const COUNTER_DELTA_TAG: u8 = 0x08;

/// Tag byte marking a counter cell that resets the accumulator outright.
/// Hypertable's on-disk form suffixes this with `=` for readability in
/// `hypertable shell` dumps; we keep the trailing byte for format parity.
pub const COUNTER_RESET_TAG: u8 = 0x09;

const COUNTER_RESET_SUFFIX: u8 = b'=';

/// A counter payload: either a delta to fold into the running total, or a
/// reset that replaces it outright. See `cellcache::merge_counter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterValue {
    Delta(i64),
    Reset(i64),
}

impl CounterValue {
    /// Encode to the 9- or 10-byte wire form stored as a cell's value.
    pub fn encode(self) -> Vec<u8> {
        match self {
            CounterValue::Delta(v) => {
                let mut buf = Vec::with_capacity(9);
                buf.push(COUNTER_DELTA_TAG);
                buf.extend_from_slice(&v.to_be_bytes());
                buf
            }
            CounterValue::Reset(v) => {
                let mut buf = Vec::with_capacity(10);
                buf.push(COUNTER_RESET_TAG);
                buf.extend_from_slice(&v.to_be_bytes());
                buf.push(COUNTER_RESET_SUFFIX);
                buf
            }
        }
    }

    /// Decode a counter payload. Returns `None` if `raw` isn't a recognized
    /// counter encoding (wrong tag, wrong length, or a malformed reset
    /// suffix) so the caller can fall back to treating it as an ordinary
    /// value.
    pub fn decode(raw: &[u8]) -> Option<Self> {
        match raw.first().copied() {
            Some(COUNTER_DELTA_TAG) if raw.len() == 9 => {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&raw[1..9]);
                Some(CounterValue::Delta(i64::from_be_bytes(bytes)))
            }
            Some(COUNTER_RESET_TAG) if raw.len() == 10 && raw[9] == COUNTER_RESET_SUFFIX => {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&raw[1..9]);
                Some(CounterValue::Reset(i64::from_be_bytes(bytes)))
            }
            _ => None,
        }
    }
}

/// Appends `bytes` to `out` behind a little-endian `u32` length prefix. Used
/// for cell values; the equivalent framing for serialized keys lives in
/// `key::serialized`.
pub fn encode_value(bytes: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(bytes);
}

/// Reads a length-prefixed value starting at `buf[0..]`, returning the value
/// slice and the number of bytes consumed (4 + value length).
pub fn decode_value(buf: &[u8]) -> Option<(&[u8], usize)> {
    if buf.len() < 4 {
        return None;
    }
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&buf[0..4]);
    let len = u32::from_le_bytes(len_bytes) as usize;
    let total = 4 + len;
    if buf.len() < total {
        return None;
    }
    Some((&buf[4..total], total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_round_trips() {
        let v = CounterValue::Delta(-42);
        let encoded = v.encode();
        assert_eq!(encoded.len(), 9);
        assert_eq!(CounterValue::decode(&encoded), Some(v));
    }

    #[test]
    fn reset_round_trips() {
        let v = CounterValue::Reset(7);
        let encoded = v.encode();
        assert_eq!(encoded.len(), 10);
        assert_eq!(encoded[9], b'=');
        assert_eq!(CounterValue::decode(&encoded), Some(v));
    }

    #[test]
    fn decode_rejects_non_counter_payloads() {
        assert_eq!(CounterValue::decode(b"hello"), None);
        assert_eq!(CounterValue::decode(&[COUNTER_DELTA_TAG, 1, 2]), None);
    }

    #[test]
    fn value_round_trips() {
        let mut buf = Vec::new();
        encode_value(b"cell-payload", &mut buf);
        let (decoded, consumed) = decode_value(&buf).unwrap();
        assert_eq!(decoded, b"cell-payload");
        assert_eq!(consumed, buf.len());
    }
}
