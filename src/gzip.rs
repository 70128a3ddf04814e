//! Stateful, chunk-fed gzip decompression.
//!
//! Layer blobs arrive as a sequence of Range-fetched chunks; the tar parser
//! needs to rescan the decompressed buffer from an arbitrary prior offset as
//! more data arrives, so the decoder keeps everything it has ever produced
//! rather than discarding consumed bytes.

use flate2::write::GzDecoder;
use std::io::Write;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Incremental gzip decoder matching the `feed`/`buffer` contract: each
/// `feed` call appends its freshly produced bytes to an internal buffer and
/// also returns them, so a caller can choose to scan just the new bytes or
/// rescan everything via [`IncrementalGzipDecoder::buffer`].
pub struct IncrementalGzipDecoder {
    decoder: GzDecoder<Vec<u8>>,
    magic_checked: bool,
    pending: Vec<u8>,
    errored: bool,
}

impl Default for IncrementalGzipDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl IncrementalGzipDecoder {
    pub fn new() -> Self {
        Self {
            decoder: GzDecoder::new(Vec::new()),
            magic_checked: false,
            pending: Vec::new(),
            errored: false,
        }
    }

    /// Returns true once a previous `feed` has hit corruption or an
    /// unexpected gzip magic. All subsequent `feed` calls are no-ops.
    pub fn is_errored(&self) -> bool {
        self.errored
    }

    /// Feed a chunk of compressed bytes, returning the newly produced
    /// decompressed bytes. Returns an empty slice once the decoder has
    /// entered the errored state.
    pub fn feed(&mut self, chunk: &[u8]) -> &[u8] {
        if self.errored {
            return &[];
        }

        let mut input = chunk;
        if !self.magic_checked {
            self.pending.extend_from_slice(chunk);
            if self.pending.len() < GZIP_MAGIC.len() {
                // not enough bytes yet to validate the magic; nothing to feed
                return &[];
            }
            if self.pending[..GZIP_MAGIC.len()] != GZIP_MAGIC {
                self.errored = true;
                return &[];
            }
            self.magic_checked = true;
            input = &self.pending;
        }

        let before = self.decoder.get_ref().len();
        // the write-based decoder buffers decoded output internally and
        // only drains it to the inner `Vec` on flush, even when the input
        // written so far decodes cleanly.
        let result = self.decoder.write_all(input).and_then(|()| self.decoder.flush());
        if !self.magic_checked_consumed() {
            self.pending.clear();
        }
        match result {
            Ok(()) => {
                let after = self.decoder.get_ref().len();
                &self.decoder.get_ref()[before..after]
            }
            Err(_) => {
                self.errored = true;
                &[]
            }
        }
    }

    fn magic_checked_consumed(&self) -> bool {
        // once magic_checked flips true we've already fed `pending` through
        // write_all above; clear it so future feeds don't re-send it.
        self.magic_checked && self.pending.is_empty()
    }

    /// The complete decompressed output produced so far.
    pub fn buffer(&self) -> &[u8] {
        self.decoder.get_ref()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn gzip_bytes(data: &[u8]) -> Vec<u8> {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn rejects_non_gzip_magic() {
        let mut decoder = IncrementalGzipDecoder::new();
        let out = decoder.feed(b"not a gzip stream at all").to_vec();
        assert!(out.is_empty());
        assert!(decoder.is_errored());
    }

    #[test]
    fn feeds_incrementally_and_accumulates() {
        let compressed = gzip_bytes(b"hello streaming world");
        let mut decoder = IncrementalGzipDecoder::new();
        let mut produced = Vec::new();
        for chunk in compressed.chunks(3) {
            produced.extend_from_slice(decoder.feed(chunk));
        }
        assert_eq!(produced, b"hello streaming world");
        assert_eq!(decoder.buffer(), b"hello streaming world");
        assert!(!decoder.is_errored());
    }

    #[test]
    fn magic_split_across_feeds() {
        let compressed = gzip_bytes(b"abc");
        let mut decoder = IncrementalGzipDecoder::new();
        // feed one byte of the magic at a time
        let first = decoder.feed(&compressed[0..1]).to_vec();
        assert!(first.is_empty());
        assert!(!decoder.is_errored());
        let mut produced = first;
        produced.extend_from_slice(decoder.feed(&compressed[1..]));
        assert_eq!(produced, b"abc");
    }

    #[test]
    fn corrupted_stream_errors_and_stays_errored() {
        let mut compressed = gzip_bytes(
            b"some content long enough to compress, needs to be fairly long for deflate to do real work here",
        );
        // corrupt the deflate stream itself, just past the 10-byte gzip header
        for byte in compressed.iter_mut().skip(10).take(10) {
            *byte ^= 0xff;
        }
        let mut decoder = IncrementalGzipDecoder::new();
        decoder.feed(&compressed);
        assert!(decoder.is_errored());
        assert!(decoder.feed(b"more").is_empty());
    }
}
