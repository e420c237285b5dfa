//! Archive and entry options.

use crate::compression::CompressionMethod;
use crate::extra_fields::ExtraField;
use crate::types::{DateTime, DeflateStrategy};

/// Default streaming chunk size, also the step by which the end-of-archive search grows.
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// How an archive is opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpenMode {
    /// Entries can be listed and read.
    Read,
    /// Entries can also be added, removed and merged; [`crate::ZipArchive::finish`] rewrites
    /// the central directory.
    Write,
}

/// Archive-level settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub(crate) zip64: bool,
    pub(crate) buffer_size: usize,
    pub(crate) data_descriptor: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            zip64: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
            data_descriptor: false,
        }
    }
}

impl Config {
    /// Enable ZIP64 for the archive being written.
    ///
    /// Without it, an entry, offset or directory that does not fit 32 bits is rejected, and
    /// more than 65535 entries cannot be written. With it, the archive always ends with a
    /// ZIP64 end of central directory record and its locator.
    #[must_use]
    pub const fn zip64(mut self, zip64: bool) -> Self {
        self.zip64 = zip64;
        self
    }

    /// Chunk size for streaming. Zero is treated as one.
    #[must_use]
    pub const fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Default for whether new entries put their CRC and sizes in a trailing data descriptor.
    #[must_use]
    pub const fn data_descriptor(mut self, data_descriptor: bool) -> Self {
        self.data_descriptor = data_descriptor;
        self
    }

    pub const fn is_zip64(&self) -> bool {
        self.zip64
    }

    pub(crate) fn chunk_size(&self) -> usize {
        self.buffer_size.max(1)
    }

    /// Entry options seeded with this archive's defaults.
    pub fn entry_options(&self) -> EntryOptions {
        EntryOptions::default().data_descriptor(self.data_descriptor)
    }
}

/// Per-entry settings used when constructing a [`crate::ZipEntry`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntryOptions {
    pub(crate) compression_method: CompressionMethod,
    pub(crate) deflate_strategy: DeflateStrategy,
    pub(crate) last_modified_time: Option<DateTime>,
    pub(crate) comment: Box<str>,
    pub(crate) extra_fields: Vec<ExtraField>,
    pub(crate) data_descriptor: bool,
    pub(crate) permissions: Option<u32>,
}

impl EntryOptions {
    /// Set the compression method for the new file
    ///
    /// The default is `CompressionMethod::Deflated`.
    #[must_use]
    pub fn compression_method(mut self, method: CompressionMethod) -> Self {
        self.compression_method = method;
        self
    }

    #[must_use]
    pub fn deflate_strategy(mut self, strategy: DeflateStrategy) -> Self {
        self.deflate_strategy = strategy;
        self
    }

    /// Set the last modified time
    ///
    /// The default is the current time, read when the entry is constructed.
    #[must_use]
    pub fn last_modified_time(mut self, mod_time: DateTime) -> Self {
        self.last_modified_time = Some(mod_time);
        self
    }

    #[must_use]
    pub fn comment(mut self, comment: impl Into<Box<str>>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Extra fields to store. ZIP64 fields are managed by the archive and dropped here.
    #[must_use]
    pub fn extra_fields(mut self, fields: Vec<ExtraField>) -> Self {
        self.extra_fields = fields;
        self
    }

    #[must_use]
    pub fn data_descriptor(mut self, data_descriptor: bool) -> Self {
        self.data_descriptor = data_descriptor;
        self
    }

    /// Set the permissions for the new file.
    ///
    /// The format is represented with unix-style permissions.
    /// The default is `0o644`, which represents `rw-r--r--` for files,
    /// and `0o755`, which represents `rwxr-xr-x` for directories.
    ///
    /// This method only preserves the file permissions bits (via a `& 0o777`) and discards
    /// higher file mode bits. So it cannot be used to denote an entry as a directory,
    /// symlink, or other special file type.
    #[must_use]
    pub fn unix_permissions(mut self, mode: u32) -> Self {
        self.permissions = Some(mode & 0o777);
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert!(!config.is_zip64());
        assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE);
        assert!(!config.data_descriptor);
        let options = config.entry_options();
        assert_eq!(options.compression_method, CompressionMethod::Deflated);
        assert!(!options.data_descriptor);
        assert_eq!(options.last_modified_time, None);
    }

    #[test]
    fn builders() {
        let config = Config::default()
            .zip64(true)
            .buffer_size(0)
            .data_descriptor(true);
        assert!(config.is_zip64());
        assert_eq!(config.chunk_size(), 1);
        assert!(config.entry_options().data_descriptor);

        let options = EntryOptions::default()
            .compression_method(CompressionMethod::Stored)
            .unix_permissions(0o100755)
            .comment("c");
        assert_eq!(options.permissions, Some(0o755));
        assert_eq!(&*options.comment, "c");
    }
}
