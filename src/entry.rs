//! A single archive member.

use std::path::{Component, PathBuf};
use std::sync::Arc;

use crate::compression::{CompressionMethod, EntryCodec};
use crate::config::EntryOptions;
use crate::directory::{CentralDirectoryRecord, DirectoryCommon, LocalFileHeader};
use crate::extra_fields::{self, ExtraField, Ntfs, Zip64ExtendedInformation};
use crate::result::{ZipError, ZipResult, invalid, invalid_argument};
use crate::spec::ZIP64_BYTES_THR;
use crate::types::{
    BASE_VERSION, DEFAULT_VERSION, DateTime, DeflateStrategy, GeneralPurposeFlags, System,
    Version, ffi,
};

/// Attribute bit MS-DOS uses for directories.
const DOS_DIRECTORY_ATTRIBUTE: u32 = 0x10;

/// One member of an archive.
///
/// The entry owns its central directory record behind an [`Arc`]. Every change, whether from
/// a builder method or from the archive once the content has been written, produces a fresh
/// record and swaps it in, so a record handed out earlier never changes underneath its holder.
/// The local file header is derived from the record on demand.
#[derive(Clone, Debug)]
pub struct ZipEntry {
    record: Arc<CentralDirectoryRecord>,
    codec: EntryCodec,
    /// Reserve a ZIP64 field in the local header before the sizes are known.
    pub(crate) large_file: bool,
    compressed_size: u64,
    uncompressed_size: u64,
    header_offset: u64,
}

fn encode_text(text: &str) -> (Box<[u8]>, bool) {
    (text.as_bytes().into(), !text.is_ascii())
}

/// Drop ZIP64 fields: the archive rebuilds them from the real sizes.
fn without_zip64(fields: Vec<ExtraField>) -> Vec<ExtraField> {
    fields.into_iter().filter(|field| !field.is_zip64()).collect()
}

impl ZipEntry {
    /// Construct an entry for writing.
    ///
    /// Fails with [`ZipError::UnsupportedArchive`] when the compression method has no codec,
    /// and with [`ZipError::InvalidArgument`] when the name is empty or the name, comment or
    /// extra fields are too long to encode.
    pub fn new(name: &str, options: &EntryOptions) -> ZipResult<Self> {
        if name.is_empty() {
            return invalid_argument("entry name is empty");
        }
        let codec = EntryCodec::new(options.compression_method, options.deflate_strategy)?;
        let (file_name_raw, name_utf8) = encode_text(name);
        let (file_comment_raw, comment_utf8) = encode_text(&options.comment);

        let mut flags = GeneralPurposeFlags::default()
            .with_utf8(name_utf8 || comment_utf8)
            .with_data_descriptor(options.data_descriptor);
        if codec.method() == CompressionMethod::Deflated {
            flags = flags.with_deflate_strategy(options.deflate_strategy);
        }

        let is_dir = name.ends_with('/');
        let external_attributes = if is_dir {
            ((ffi::S_IFDIR | options.permissions.unwrap_or(0o755)) << 16) | DOS_DIRECTORY_ATTRIBUTE
        } else {
            (ffi::S_IFREG | options.permissions.unwrap_or(0o644)) << 16
        };

        let extra_field = extra_fields::encode_all(&without_zip64(options.extra_fields.clone()))?;
        let record = CentralDirectoryRecord {
            common: DirectoryCommon {
                version_needed: Version::new(BASE_VERSION / 10, BASE_VERSION % 10, System::Dos),
                flags,
                compression_method: codec.method().serialize_to_u16(),
                last_modified: options.last_modified_time.unwrap_or_else(DateTime::now),
                crc32: 0,
                compressed_size: 0,
                uncompressed_size: 0,
                file_name: name.into(),
                file_name_raw,
                extra_field,
            },
            version_made_by: Version::new(DEFAULT_VERSION / 10, DEFAULT_VERSION % 10, System::Unix),
            file_comment: options.comment.clone(),
            file_comment_raw,
            disk_number_start: 0,
            internal_attributes: 0,
            external_attributes,
            local_header_offset: 0,
        };
        record.validate()?;

        Ok(Self {
            record: Arc::new(record),
            codec,
            large_file: false,
            compressed_size: 0,
            uncompressed_size: 0,
            header_offset: 0,
        })
    }

    /// Wrap a record decoded from a central directory, resolving ZIP64 values.
    pub fn from_record(record: CentralDirectoryRecord) -> ZipResult<Self> {
        let common = &record.common;
        let codec = EntryCodec::new(
            CompressionMethod::parse_from_u16(common.compression_method),
            common.flags.deflate_strategy(),
        )?;
        let info = record.zip64_info()?.unwrap_or_default();
        let resolve = |base: u32, wide: Option<u64>, what: &str| -> ZipResult<u64> {
            if base != u32::MAX {
                return Ok(base.into());
            }
            match wide {
                Some(value) => Ok(value),
                None => invalid!(
                    "{} of {} is missing from its ZIP64 field",
                    what,
                    common.file_name
                ),
            }
        };
        let compressed_size =
            resolve(common.compressed_size, info.compressed_size, "compressed size")?;
        let uncompressed_size =
            resolve(common.uncompressed_size, info.uncompressed_size, "uncompressed size")?;
        let header_offset =
            resolve(record.local_header_offset, info.header_offset, "header offset")?;

        Ok(Self {
            record: Arc::new(record),
            codec,
            large_file: false,
            compressed_size,
            uncompressed_size,
            header_offset,
        })
    }

    /// Apply `change` to a copy of the record and swap the copy in.
    fn replace_record(mut self, change: impl FnOnce(&mut CentralDirectoryRecord)) -> Self {
        let mut record = Arc::unwrap_or_clone(self.record);
        change(&mut record);
        self.record = Arc::new(record);
        self
    }

    /// Use `method` for the content. Unsupported methods fail here.
    pub fn with_compression(self, method: CompressionMethod) -> ZipResult<Self> {
        let strategy = self.deflate_strategy();
        let codec = EntryCodec::new(method, strategy)?;
        let mut entry = self.replace_record(|record| {
            record.common.compression_method = method.serialize_to_u16();
            let flags = record.common.flags;
            record.common.flags = match method {
                CompressionMethod::Deflated => flags.with_deflate_strategy(strategy),
                _ => flags.with_deflate_strategy(DeflateStrategy::Normal),
            };
        });
        entry.codec = codec;
        Ok(entry)
    }

    /// Use `strategy` when deflating. Stored entries keep it in mind for a later switch to
    /// deflate but record no strategy bits.
    pub fn with_deflate_strategy(self, strategy: DeflateStrategy) -> ZipResult<Self> {
        let method = self.compression_method();
        let codec = EntryCodec::new(method, strategy)?;
        let mut entry = self.replace_record(|record| {
            if method == CompressionMethod::Deflated {
                record.common.flags = record.common.flags.with_deflate_strategy(strategy);
            }
        });
        entry.codec = codec;
        Ok(entry)
    }

    #[must_use]
    pub fn with_modification_time(self, time: DateTime) -> Self {
        self.replace_record(|record| record.common.last_modified = time)
    }

    pub fn with_comment(self, comment: &str) -> ZipResult<Self> {
        let (file_comment_raw, utf8) = encode_text(comment);
        let entry = self.replace_record(|record| {
            record.file_comment = comment.into();
            record.file_comment_raw = file_comment_raw;
            if utf8 {
                record.common.flags = record.common.flags.with_utf8(true);
            }
        });
        entry.record.validate()?;
        Ok(entry)
    }

    /// Replace the extra fields. ZIP64 fields in `fields` are ignored; the one describing
    /// this entry's own sizes is kept.
    pub fn with_extra_fields(self, fields: Vec<ExtraField>) -> ZipResult<Self> {
        let mut kept: Vec<ExtraField> = self
            .extra_fields()?
            .into_iter()
            .filter(ExtraField::is_zip64)
            .collect();
        kept.extend(without_zip64(fields));
        let extra_field = extra_fields::encode_all(&kept)?;
        Ok(self.replace_record(|record| record.common.extra_field = extra_field))
    }

    /// Raise version-needed to 4.5 and reserve a ZIP64 field in the local header. With a data
    /// descriptor the field holds zeros and marks the descriptor as 64 bits wide.
    pub(crate) fn prepare_zip64(mut self) -> Self {
        self.large_file = true;
        self.replace_record(|record| {
            let version = Version::new(DEFAULT_VERSION / 10, DEFAULT_VERSION % 10, System::Dos);
            if record.common.version_needed.specification() < version.specification() {
                record.common.version_needed = version;
            }
        })
    }

    /// The local file header matching the current record.
    ///
    /// The central ZIP64 field is replaced by the local form, which carries both sizes. With
    /// a data descriptor, CRC and sizes are zero, in the ZIP64 field too.
    pub fn local_directory(&self) -> ZipResult<LocalFileHeader> {
        let mut common = self.record.common.clone();
        let mut fields = without_zip64(self.extra_fields()?);
        if common.flags.has_data_descriptor() {
            common.crc32 = 0;
            common.compressed_size = 0;
            common.uncompressed_size = 0;
            if self.large_file {
                fields.insert(
                    0,
                    ExtraField::Zip64(Zip64ExtendedInformation::local_header(0, 0)),
                );
            }
        } else if self.large_file
            || self.compressed_size >= ZIP64_BYTES_THR
            || self.uncompressed_size >= ZIP64_BYTES_THR
        {
            common.compressed_size = u32::MAX;
            common.uncompressed_size = u32::MAX;
            fields.insert(
                0,
                ExtraField::Zip64(Zip64ExtendedInformation::local_header(
                    self.uncompressed_size,
                    self.compressed_size,
                )),
            );
        }
        common.extra_field = extra_fields::encode_all(&fields)?;
        Ok(LocalFileHeader { common })
    }

    /// Record the outcome of writing this entry: final sizes, CRC and local header offset.
    ///
    /// When `is_zip64`, values that do not fit 32 bits become sentinels and a rebuilt ZIP64
    /// field carries exactly those values. Otherwise such values are an error.
    pub(crate) fn update_directory(
        self,
        is_zip64: bool,
        compressed_size: u64,
        uncompressed_size: u64,
        crc32: u32,
        header_offset: u64,
    ) -> ZipResult<Self> {
        let narrow = |value: u64| -> ZipResult<u32> {
            if value < ZIP64_BYTES_THR {
                Ok(value as u32)
            } else if is_zip64 {
                Ok(u32::MAX)
            } else {
                Err(ZipError::EntryTooLarge {
                    name: self.name().into(),
                    size: value,
                })
            }
        };
        let compressed = narrow(compressed_size)?;
        let uncompressed = narrow(uncompressed_size)?;
        let offset = narrow(header_offset)?;

        let mut fields = without_zip64(self.extra_fields()?);
        if let Some(info) = Zip64ExtendedInformation::central_header(
            uncompressed_size,
            compressed_size,
            header_offset,
        ) {
            fields.insert(0, ExtraField::Zip64(info));
        }
        let extra_field = extra_fields::encode_all(&fields)?;

        let mut entry = self.replace_record(|record| {
            record.common.crc32 = crc32;
            record.common.compressed_size = compressed;
            record.common.uncompressed_size = uncompressed;
            record.common.extra_field = extra_field;
            record.local_header_offset = offset;
            if is_zip64 {
                let version = Version::new(DEFAULT_VERSION / 10, DEFAULT_VERSION % 10, System::Dos);
                if record.common.version_needed.specification() < version.specification() {
                    record.common.version_needed = version;
                }
            }
        });
        entry.compressed_size = compressed_size;
        entry.uncompressed_size = uncompressed_size;
        entry.header_offset = header_offset;
        Ok(entry)
    }

    pub fn record(&self) -> &CentralDirectoryRecord {
        &self.record
    }

    pub fn codec(&self) -> EntryCodec {
        self.codec
    }

    /// Name as decoded from the archive.
    pub fn name(&self) -> &str {
        &self.record.common.file_name
    }

    /// Name bytes as stored.
    pub fn name_raw(&self) -> &[u8] {
        &self.record.common.file_name_raw
    }

    pub fn comment(&self) -> &str {
        &self.record.file_comment
    }

    pub fn compression_method(&self) -> CompressionMethod {
        self.codec.method()
    }

    pub fn deflate_strategy(&self) -> DeflateStrategy {
        self.record.common.flags.deflate_strategy()
    }

    pub fn flags(&self) -> GeneralPurposeFlags {
        self.record.common.flags
    }

    pub fn has_data_descriptor(&self) -> bool {
        self.record.common.flags.has_data_descriptor()
    }

    /// Whether the data descriptor written after this entry uses 64-bit sizes, which is the
    /// case when the local header carries a ZIP64 field.
    pub(crate) fn has_zip64_descriptor(&self) -> bool {
        self.has_data_descriptor() && (self.large_file || self.record.common.is_zip64())
    }

    /// Last modified time. This will only have a 2 second precision.
    pub fn last_modified(&self) -> DateTime {
        self.record.common.last_modified
    }

    pub fn crc32(&self) -> u32 {
        self.record.common.crc32
    }

    /// Size of the content once decompressed.
    pub fn size(&self) -> u64 {
        self.uncompressed_size
    }

    /// Size of the content as stored.
    pub fn compressed_size(&self) -> u64 {
        self.compressed_size
    }

    /// Absolute position of the local file header.
    pub fn header_offset(&self) -> u64 {
        self.header_offset
    }

    /// Whether any directory field of this entry is a ZIP64 sentinel.
    pub fn is_zip64(&self) -> bool {
        self.record.is_zip64()
    }

    pub fn is_dir(&self) -> bool {
        self.record.common.is_dir()
    }

    pub fn is_file(&self) -> bool {
        !self.is_dir()
    }

    /// Decoded extra fields.
    pub fn extra_fields(&self) -> ZipResult<Vec<ExtraField>> {
        self.record.extra_fields()
    }

    /// The NTFS timestamps, when present.
    pub fn ntfs(&self) -> ZipResult<Option<Ntfs>> {
        Ok(self.extra_fields()?.into_iter().find_map(|field| match field {
            ExtraField::Ntfs(ntfs) => Some(ntfs),
            _ => None,
        }))
    }

    /// Get unix mode for the file
    pub fn unix_mode(&self) -> Option<u32> {
        let external_attributes = self.record.external_attributes;
        if external_attributes == 0 {
            return None;
        }

        match self.record.version_made_by.system() {
            System::Unix => Some(external_attributes >> 16),
            System::Dos | System::WindowsNtfs => {
                // Interpret MS-DOS directory bit
                let is_dir = (external_attributes & DOS_DIRECTORY_ATTRIBUTE) != 0;
                let mut mode = if is_dir {
                    ffi::S_IFDIR | 0o0775
                } else {
                    ffi::S_IFREG | 0o0664
                };
                if 0x01 == (external_attributes & 0x01) {
                    // Read-only bit; strip write permissions
                    mode &= 0o0555;
                }
                Some(mode)
            }
            System::Unknown => None,
        }
    }

    /// Relative path this entry would extract to, or `None` if the name would escape the
    /// extraction directory (absolute paths, `..` past the root, NUL bytes).
    pub fn enclosed_name(&self) -> Option<PathBuf> {
        let name = self.name();
        if name.contains('\0') {
            return None;
        }
        let path = PathBuf::from(name);
        let mut depth = 0usize;
        for component in path.components() {
            match component {
                Component::Prefix(_) | Component::RootDir => return None,
                Component::ParentDir => depth = depth.checked_sub(1)?,
                Component::Normal(_) => depth += 1,
                Component::CurDir => (),
            }
        }
        Some(path)
    }
}
