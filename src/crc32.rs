//! CRC-32 accounting for entry content as it is decompressed.

use std::io;
use std::io::prelude::*;

use crc32fast::Hasher;

/// Reader that accumulates the CRC32 and length of everything read through it.
///
/// The caller compares the result against the directory once the stream is exhausted, so that
/// a mismatch can be reported with the entry it belongs to.
pub(crate) struct Crc32Reader<R> {
    inner: R,
    hasher: Hasher,
    bytes_read: u64,
}

impl<R> Crc32Reader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Crc32Reader {
            inner,
            hasher: Hasher::new(),
            bytes_read: 0,
        }
    }

    /// CRC32 of the bytes read so far.
    pub(crate) fn crc32(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    pub(crate) fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

impl<R: Read> Read for Crc32Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = self.inner.read(buf)?;
        self.hasher.update(&buf[..count]);
        self.bytes_read += count as u64;
        Ok(count)
    }
}
