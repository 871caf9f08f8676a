//! Chunked base64 decoding through pooled buffers.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::{DecodeSliceError, Engine};

use crate::buffers::pool::BufferPool;

/// Characters decoded per chunk. Must stay a multiple of 4.
pub const DECODE_CHUNK_CHARS: usize = 16 * 1024;

const DECODE_CHUNK_BYTES: usize = DECODE_CHUNK_CHARS / 4 * 3;

/// Decode standard base64, ignoring ASCII whitespace.
///
/// Input is staged through a pooled 16 KiB char buffer so a large payload
/// never needs a second full-size copy of its encoded form.
pub fn base64_decode_to_bytes(pool: &Arc<BufferPool>, input: &str) -> Result<Vec<u8>, DecodeSliceError> {
    let mut chars = pool.rent(DECODE_CHUNK_CHARS);
    let mut decoded = pool.rent(DECODE_CHUNK_BYTES);
    let mut out = Vec::with_capacity(input.len() / 4 * 3);
    let mut filled = 0;

    for &b in input.as_bytes() {
        if b.is_ascii_whitespace() {
            continue;
        }
        chars[filled] = b;
        filled += 1;
        if filled == DECODE_CHUNK_CHARS {
            let n = STANDARD.decode_slice(&chars[..filled], &mut decoded[..DECODE_CHUNK_BYTES])?;
            out.extend_from_slice(&decoded[..n]);
            filled = 0;
        }
    }

    if filled > 0 {
        let n = STANDARD.decode_slice(&chars[..filled], &mut decoded[..DECODE_CHUNK_BYTES])?;
        out.extend_from_slice(&decoded[..n]);
    }
    Ok(out)
}

/// Encode bytes as standard padded base64.
pub fn base64_encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 256) as u8).collect()
    }

    #[test]
    fn decodes_empty_input() {
        let pool = Arc::new(BufferPool::new(4));
        assert!(base64_decode_to_bytes(&pool, "").unwrap().is_empty());
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn decodes_across_chunk_boundaries() {
        let pool = Arc::new(BufferPool::new(4));
        for len in [1, 2, 3, DECODE_CHUNK_BYTES, DECODE_CHUNK_BYTES + 1, 1024 * 1024 + 7] {
            let data = sample(len);
            let decoded = base64_decode_to_bytes(&pool, &base64_encode(&data)).unwrap();
            assert_eq!(decoded, data, "length {len}");
        }
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn ignores_line_breaks() {
        let pool = Arc::new(BufferPool::new(4));
        let encoded = base64_encode(b"line wrapped content for mime bodies");
        let wrapped: String = encoded
            .as_bytes()
            .chunks(8)
            .map(|c| format!("{}\r\n", std::str::from_utf8(c).unwrap()))
            .collect();
        let decoded = base64_decode_to_bytes(&pool, &wrapped).unwrap();
        assert_eq!(decoded, b"line wrapped content for mime bodies");
    }

    #[test]
    fn malformed_input_returns_buffers() {
        let pool = Arc::new(BufferPool::new(4));
        assert!(base64_decode_to_bytes(&pool, "not*base64!").is_err());
        assert!(base64_decode_to_bytes(&pool, "abc").is_err());
        let mut long = base64_encode(&sample(DECODE_CHUNK_BYTES * 2));
        long.insert(DECODE_CHUNK_CHARS + 5, '%');
        assert!(base64_decode_to_bytes(&pool, &long).is_err());
        assert_eq!(pool.outstanding(), 0);
    }
}
