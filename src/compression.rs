//! Possible ZIP compression methods, and the streaming codecs behind them.

use std::fmt;
use std::io;
use std::io::prelude::*;

use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;

use crate::result::{ZipError, ZipResult};
use crate::types::DeflateStrategy;

/// Identifies the storage format used to compress a file within a ZIP archive.
///
/// Each file's compression method is stored alongside it, allowing the
/// contents to be read without context.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, Hash)]
#[non_exhaustive]
pub enum CompressionMethod {
    /// Store the file as is
    Stored,
    /// Compress the file using Deflate
    #[default]
    Deflated,
    /// Any other method code. Entries using it can be listed but not read or written.
    Unsupported(u16),
}

impl CompressionMethod {
    pub const STORE: u16 = 0;
    pub const DEFLATE: u16 = 8;

    /// Converts a u16 to its corresponding CompressionMethod
    pub const fn parse_from_u16(val: u16) -> Self {
        match val {
            Self::STORE => CompressionMethod::Stored,
            Self::DEFLATE => CompressionMethod::Deflated,
            v => CompressionMethod::Unsupported(v),
        }
    }

    /// Converts a CompressionMethod to a u16
    pub const fn serialize_to_u16(self) -> u16 {
        match self {
            CompressionMethod::Stored => Self::STORE,
            CompressionMethod::Deflated => Self::DEFLATE,
            CompressionMethod::Unsupported(v) => v,
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionMethod::Stored => f.write_str("Stored"),
            CompressionMethod::Deflated => f.write_str("Deflated"),
            CompressionMethod::Unsupported(v) => write!(f, "Unsupported({v})"),
        }
    }
}

/// The codec an entry streams its content through.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EntryCodec {
    Stored,
    Deflated(Compression),
}

impl EntryCodec {
    /// Pick the codec for `method`. Methods without a codec fail here, before any bytes move.
    pub fn new(method: CompressionMethod, strategy: DeflateStrategy) -> ZipResult<Self> {
        match method {
            CompressionMethod::Stored => Ok(EntryCodec::Stored),
            CompressionMethod::Deflated => Ok(EntryCodec::Deflated(deflate_level(strategy))),
            CompressionMethod::Unsupported(code) => Err(ZipError::UnsupportedArchive(
                format!("Compression method {code} is not supported").into(),
            )),
        }
    }

    pub const fn method(&self) -> CompressionMethod {
        match self {
            EntryCodec::Stored => CompressionMethod::Stored,
            EntryCodec::Deflated(_) => CompressionMethod::Deflated,
        }
    }

    pub(crate) fn compressor<W: Write>(&self, writer: W) -> EntryWriter<W> {
        match *self {
            EntryCodec::Stored => EntryWriter::Stored(writer),
            EntryCodec::Deflated(level) => {
                EntryWriter::Deflated(DeflateEncoder::new(writer, level))
            }
        }
    }

    pub(crate) fn decompressor<R: Read>(&self, reader: R) -> EntryReader<R> {
        match self {
            EntryCodec::Stored => EntryReader::Stored(reader),
            EntryCodec::Deflated(_) => EntryReader::Deflated(DeflateDecoder::new(reader)),
        }
    }
}

fn deflate_level(strategy: DeflateStrategy) -> Compression {
    match strategy {
        DeflateStrategy::Normal => Compression::default(),
        DeflateStrategy::Maximum => Compression::best(),
        DeflateStrategy::Fast => Compression::new(2),
        DeflateStrategy::SuperFast => Compression::fast(),
    }
}

/// Compressing side of an [`EntryCodec`].
pub(crate) enum EntryWriter<W: Write> {
    Stored(W),
    Deflated(DeflateEncoder<W>),
}

impl<W: Write> EntryWriter<W> {
    /// Flush any buffered compressed output and hand back the sink.
    pub(crate) fn finish(self) -> io::Result<W> {
        match self {
            EntryWriter::Stored(w) => Ok(w),
            EntryWriter::Deflated(w) => w.finish(),
        }
    }
}

impl<W: Write> Write for EntryWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            EntryWriter::Stored(w) => w.write(buf),
            EntryWriter::Deflated(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            EntryWriter::Stored(w) => w.flush(),
            EntryWriter::Deflated(w) => w.flush(),
        }
    }
}

/// Decompressing side of an [`EntryCodec`].
pub(crate) enum EntryReader<R: Read> {
    Stored(R),
    Deflated(DeflateDecoder<R>),
}

impl<R: Read> Read for EntryReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            EntryReader::Stored(r) => r.read(buf),
            EntryReader::Deflated(r) => r.read(buf),
        }
    }
}

/// Writer that counts the bytes passing through it.
pub(crate) struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W> CountingWriter<W> {
    pub(crate) fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }

    pub(crate) fn count(&self) -> u64 {
        self.count
    }

    pub(crate) fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.count += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
