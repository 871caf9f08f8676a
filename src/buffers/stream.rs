//! Stream conversion through pooled scratch buffers.

use std::io::{self, Read, Write};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::buffers::pool::{BufferPool, PooledBuffer};

/// Chunk size for raw byte copies.
pub const COPY_CHUNK_SIZE: usize = 80 * 1024;

/// Staging size for text decoding.
pub const TEXT_CHUNK_SIZE: usize = 32 * 1024;

/// Copy everything from `reader` into `writer`, returning the byte count.
///
/// Neither stream is closed.
pub fn copy_stream<R, W>(pool: &Arc<BufferPool>, reader: &mut R, writer: &mut W) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buf = pool.rent(COPY_CHUNK_SIZE);
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
    Ok(total)
}

/// Copy `reader` into `writer`, flush, then close the reader.
pub fn copy_stream_and_close<R, W>(pool: &Arc<BufferPool>, mut reader: R, writer: &mut W) -> io::Result<u64>
where
    R: Read,
    W: Write + ?Sized,
{
    let copied = copy_stream(pool, &mut reader, writer)?;
    writer.flush()?;
    drop(reader);
    Ok(copied)
}

/// Async counterpart of [`copy_stream`].
pub async fn copy_stream_async<R, W>(pool: &Arc<BufferPool>, reader: &mut R, writer: &mut W) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = pool.rent(COPY_CHUNK_SIZE);
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        total += n as u64;
    }
    writer.flush().await?;
    Ok(total)
}

/// Read a stream to the end into a byte vector.
///
/// `len_hint` pre-sizes the destination when the source length is known.
pub fn stream_to_bytes<R>(pool: &Arc<BufferPool>, reader: &mut R, len_hint: Option<usize>) -> io::Result<Vec<u8>>
where
    R: Read + ?Sized,
{
    let mut out = Vec::with_capacity(len_hint.map(|len| presize(len, 0)).unwrap_or(0));
    copy_stream(pool, reader, &mut out)?;
    Ok(out)
}

/// Read a UTF-8 stream to the end into a string.
///
/// Invalid sequences are replaced with U+FFFD.
pub fn stream_to_string<R>(pool: &Arc<BufferPool>, reader: &mut R, len_hint: Option<usize>) -> io::Result<String>
where
    R: Read + ?Sized,
{
    let mut text = TextAccumulator::new(pool, len_hint);
    let mut buf = pool.rent(TEXT_CHUNK_SIZE);
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        text.push(&buf[..n]);
    }
    Ok(text.finish())
}

/// Upper bound on capacity reserved up front from a length hint. Larger
/// outputs still grow as data arrives.
pub const MAX_PRESIZE: usize = 16 * 1024 * 1024;

/// Capacity to reserve for `len` bytes plus `margin_pct` percent.
fn presize(len: usize, margin_pct: usize) -> usize {
    len.saturating_add(len / 100 * margin_pct).min(MAX_PRESIZE)
}

/// Incremental UTF-8 decoder backed by a pooled staging buffer.
///
/// Multi-byte sequences split across pushes are carried over to the next
/// flush instead of being replaced.
#[derive(Debug)]
pub struct TextAccumulator {
    staging: PooledBuffer,
    filled: usize,
    out: String,
}

impl TextAccumulator {
    /// Create an accumulator. A known byte length reserves +10% for the output.
    pub fn new(pool: &Arc<BufferPool>, len_hint: Option<usize>) -> Self {
        let capacity = len_hint.map(|len| presize(len, 10)).unwrap_or(0);
        Self {
            staging: pool.rent(TEXT_CHUNK_SIZE),
            filled: 0,
            out: String::with_capacity(capacity),
        }
    }

    /// Append raw bytes.
    pub fn push(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let space = self.staging.len() - self.filled;
            let n = space.min(data.len());
            self.staging[self.filled..self.filled + n].copy_from_slice(&data[..n]);
            self.filled += n;
            data = &data[n..];
            if self.filled == self.staging.len() {
                self.flush(false);
            }
        }
    }

    /// Decoded length so far, excluding bytes still staged.
    pub fn decoded_len(&self) -> usize {
        self.out.len()
    }

    /// Decode whatever is left and return the text.
    pub fn finish(mut self) -> String {
        self.flush(true);
        std::mem::take(&mut self.out)
    }

    fn flush(&mut self, last: bool) {
        let mut start = 0;
        while start < self.filled {
            match std::str::from_utf8(&self.staging[start..self.filled]) {
                Ok(valid) => {
                    self.out.push_str(valid);
                    start = self.filled;
                }
                Err(e) => {
                    let valid_end = start + e.valid_up_to();
                    if let Ok(valid) = std::str::from_utf8(&self.staging[start..valid_end]) {
                        self.out.push_str(valid);
                    }
                    match e.error_len() {
                        Some(bad) => {
                            self.out.push(char::REPLACEMENT_CHARACTER);
                            start = valid_end + bad;
                        }
                        None if last => {
                            self.out.push(char::REPLACEMENT_CHARACTER);
                            start = self.filled;
                        }
                        None => {
                            start = valid_end;
                            break;
                        }
                    }
                }
            }
        }
        let carry = self.filled - start;
        self.staging.copy_within(start..self.filled, 0);
        self.filled = carry;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Reader that yields at most `step` bytes per call.
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    struct CloseTracker<'a> {
        inner: Cursor<Vec<u8>>,
        closed: &'a std::cell::Cell<bool>,
    }

    impl Read for CloseTracker<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            Read::read(&mut self.inner, buf)
        }
    }

    impl Drop for CloseTracker<'_> {
        fn drop(&mut self) {
            self.closed.set(true);
        }
    }

    #[test]
    fn copy_stream_copies_everything() {
        let pool = Arc::new(BufferPool::new(4));
        let data: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
        let mut out = Vec::new();
        let copied = copy_stream(&pool, &mut Cursor::new(&data), &mut out).unwrap();
        assert_eq!(copied, data.len() as u64);
        assert_eq!(out, data);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn copy_stream_and_close_drops_reader() {
        let pool = Arc::new(BufferPool::new(4));
        let closed = std::cell::Cell::new(false);
        let reader = CloseTracker {
            inner: Cursor::new(b"payload".to_vec()),
            closed: &closed,
        };
        let mut out = Vec::new();
        copy_stream_and_close(&pool, reader, &mut out).unwrap();
        assert!(closed.get());
        assert_eq!(out, b"payload");
    }

    #[test]
    fn stream_to_string_handles_split_multibyte_sequences() {
        let pool = Arc::new(BufferPool::new(4));
        let text = "żółw ∑ 🦀 ".repeat(10_000);
        let mut reader = Trickle {
            data: text.as_bytes(),
            step: 7,
        };
        let decoded = stream_to_string(&pool, &mut reader, Some(text.len())).unwrap();
        assert_eq!(decoded, text);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn stream_to_string_replaces_invalid_bytes() {
        let pool = Arc::new(BufferPool::new(4));
        let mut reader = Cursor::new(vec![b'a', 0xff, b'b', 0xe2, 0x82]);
        let decoded = stream_to_string(&pool, &mut reader, None).unwrap();
        assert_eq!(decoded, "a\u{fffd}b\u{fffd}");
    }

    #[test]
    fn stream_to_bytes_reads_to_end() {
        let pool = Arc::new(BufferPool::new(4));
        let mut reader = Trickle {
            data: &[7u8; 100_000],
            step: 4096,
        };
        let bytes = stream_to_bytes(&pool, &mut reader, Some(100_000)).unwrap();
        assert_eq!(bytes.len(), 100_000);
    }

    #[tokio::test]
    async fn copy_stream_async_copies_everything() {
        let pool = Arc::new(BufferPool::new(4));
        let data = vec![42u8; 200_000];
        let mut reader = &data[..];
        let mut out: Vec<u8> = Vec::new();
        let copied = copy_stream_async(&pool, &mut reader, &mut out).await.unwrap();
        assert_eq!(copied, 200_000);
        assert_eq!(out, data);
    }

    #[test]
    fn oversized_length_hint_is_clamped() {
        let pool = Arc::new(BufferPool::new(4));
        let mut text = TextAccumulator::new(&pool, Some(usize::MAX - 2));
        text.push(b"abc");
        assert_eq!(text.finish(), "abc");

        let mut reader = &b"xyz"[..];
        let bytes = stream_to_bytes(&pool, &mut reader, Some(usize::MAX)).unwrap();
        assert_eq!(bytes, b"xyz");
        assert_eq!(presize(usize::MAX, 10), MAX_PRESIZE);
        assert_eq!(presize(1000, 10), 1100);
    }
}
