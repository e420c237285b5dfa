#![allow(unknown_lints)] // non_local_definitions isn't in Rust 1.70
#![allow(non_local_definitions)]
//! Error types that can be emitted from this library

use displaydoc::Display;
use std::borrow::Cow;
use thiserror::Error;

use std::error::Error;
use std::fmt;
use std::io;
use std::num::TryFromIntError;

/// Generic result type with ZipError as its error variant
pub type ZipResult<T> = Result<T, ZipError>;

/// Error type for Zip
#[derive(Debug, Display, Error)]
#[non_exhaustive]
pub enum ZipError {
    /// i/o error: {0}
    Io(#[from] io::Error),

    /// invalid Zip archive: {0}
    InvalidArchive(Cow<'static, str>),

    /// unsupported Zip archive: {0}
    UnsupportedArchive(Cow<'static, str>),

    /// invalid argument: {0}
    InvalidArgument(Cow<'static, str>),

    /// specified file not found in archive: {0}
    FileNotFound(Box<str>),

    /// CRC-32 mismatch in {name}: expected {expected:#010x}, computed {actual:#010x}
    ChecksumMismatch {
        name: Box<str>,
        expected: u32,
        actual: u32,
    },

    /// {field} mismatch in {name}: expected {expected}, found {actual}
    SizeMismatch {
        name: Box<str>,
        field: &'static str,
        expected: u64,
        actual: u64,
    },

    /// entry {name} needs ZIP64 ({size} bytes) but the archive was not opened with ZIP64 enabled
    EntryTooLarge { name: Box<str>, size: u64 },

    /// central directory needs ZIP64 ({0} bytes) but the archive was not opened with ZIP64 enabled
    DirectoryTooLarge(u64),

    /// {0} entries need ZIP64 but the archive was not opened with ZIP64 enabled
    TooManyEntries(usize),
}

impl ZipError {
    /// Whether this error reports a CRC or size disagreement found after reading an entry.
    pub const fn is_integrity_error(&self) -> bool {
        matches!(
            self,
            ZipError::ChecksumMismatch { .. } | ZipError::SizeMismatch { .. }
        )
    }
}

pub(crate) fn invalid_archive<T, M: Into<Cow<'static, str>>>(message: M) -> ZipResult<T> {
    Err(ZipError::InvalidArchive(message.into()))
}

pub(crate) fn invalid_argument<T, M: Into<Cow<'static, str>>>(message: M) -> ZipResult<T> {
    Err(ZipError::InvalidArgument(message.into()))
}

macro_rules! invalid {
    ($fmt_string:literal) => {
        {
            return crate::result::invalid_archive($fmt_string);
        }
    };
    ($fmt_string:literal, $($param:expr),+) => {
        {
            return crate::result::invalid_archive(format!($fmt_string, $($param),+));
        }
    };
}
pub(crate) use invalid;

impl From<ZipError> for io::Error {
    fn from(err: ZipError) -> io::Error {
        let kind = match &err {
            ZipError::Io(err) => err.kind(),
            ZipError::InvalidArchive(_)
            | ZipError::ChecksumMismatch { .. }
            | ZipError::SizeMismatch { .. } => io::ErrorKind::InvalidData,
            ZipError::UnsupportedArchive(_) => io::ErrorKind::Unsupported,
            ZipError::InvalidArgument(_) => io::ErrorKind::InvalidInput,
            ZipError::FileNotFound(_) => io::ErrorKind::NotFound,
            ZipError::EntryTooLarge { .. }
            | ZipError::DirectoryTooLarge(_)
            | ZipError::TooManyEntries(_) => io::ErrorKind::FileTooLarge,
        };

        io::Error::new(kind, err)
    }
}

/// Error type for time parsing
#[derive(Debug)]
pub struct DateTimeRangeError;

// TryFromIntError is also an out-of-range error.
impl From<TryFromIntError> for DateTimeRangeError {
    fn from(_value: TryFromIntError) -> Self {
        DateTimeRangeError
    }
}

impl fmt::Display for DateTimeRangeError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            fmt,
            "a date could not be represented within the bounds the MS-DOS date range (1980-2107)"
        )
    }
}

impl Error for DateTimeRangeError {}
