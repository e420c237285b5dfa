//! A library for reading, appending to, merging and rewriting ZIP archives in place.
//!
//! The archive file is opened once and owned by a [`ZipArchive`]. Entries are listed from the
//! central directory, read as a stream of decompressed chunks, and added by streaming their
//! content through the compressor while the CRC-32 and sizes accumulate. Nothing reaches the
//! on-disk central directory until [`ZipArchive::finish`] or [`ZipArchive::close`].
//!
//! ZIP64 is supported for reading, and for writing when enabled through [`Config::zip64`]:
//! entry sizes and offsets of 4 GiB and more go into the ZIP64 extended information extra
//! field, and the archive ends with a ZIP64 end of central directory record and its locator.
//!
//! Stored and Deflated entries can be read and written. Entries with any other compression
//! method, encryption or spanning several disks are reported as unsupported.
//!
//! ```
//! use std::io::Cursor;
//! use zipcore::{Config, OpenMode, ZipArchive};
//!
//! # fn main() -> zipcore::result::ZipResult<()> {
//! let mut zip = ZipArchive::create(Cursor::new(Vec::new()), Config::default())?;
//! zip.add_text_entry("hello.txt", "Hello, world!")?;
//! let bytes = zip.close()?.into_inner();
//!
//! let mut zip = ZipArchive::open(Cursor::new(bytes), OpenMode::Read, Config::default())?;
//! assert_eq!(zip.read_text_entry("hello.txt")?, "Hello, world!");
//! # Ok(())
//! # }
//! ```
#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_debug_implementations)]

mod spec;

mod archive;
pub mod compression;
mod config;
mod cp437;
mod crc32;
mod directory;
mod entry;
pub mod extra_fields;
mod fs;
pub mod result;
pub mod types;

pub use crate::archive::{RawFile, ZipArchive};
pub use crate::compression::CompressionMethod;
pub use crate::config::{Config, DEFAULT_BUFFER_SIZE, EntryOptions, OpenMode};
pub use crate::directory::{
    CentralDirectoryRecord, DataDescriptor, DirectoryCommon, LocalFileHeader,
};
pub use crate::entry::ZipEntry;
pub use crate::extra_fields::ExtraField;
pub use crate::fs::zip_directory;
pub use crate::result::{ZipError, ZipResult};
pub use crate::spec::{
    CentralDirectoryEnd, ZIP64_BYTES_THR, ZIP64_ENTRY_THR, Zip32CentralDirectoryEnd,
    Zip64CentralDirectoryEnd, Zip64CentralDirectoryEndLocator,
};
pub use crate::types::{DateTime, DeflateStrategy, GeneralPurposeFlags, System, Version};
