//! Per-entry directory records: the central directory record, the local file header and the
//! trailing data descriptor.

use std::io::prelude::*;
use std::mem;

use crate::cp437::decode_text;
use crate::extra_fields::{self, ExtraField, Zip64ExtendedInformation, Zip64Sentinels};
use crate::result::{ZipError, ZipResult, invalid};
use crate::spec::{
    self, Block, CENTRAL_DIRECTORY_HEADER_SIGNATURE, DATA_DESCRIPTOR_SIGNATURE,
    LOCAL_FILE_HEADER_SIGNATURE, LittleEndianReadExt, read_exact_boxed,
};
use crate::types::{DateTime, GeneralPurposeFlags, Version};

/// Longest name, extra field or comment a record can carry.
pub(crate) const MAX_TRAILER_LEN: usize = u16::MAX as usize;

#[derive(Copy, Clone, Debug)]
#[repr(packed)]
pub(crate) struct ZipCentralEntryBlock {
    pub magic: spec::Magic,
    pub version_made_by: u16,
    pub version_to_extract: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name_length: u16,
    pub extra_field_length: u16,
    pub file_comment_length: u16,
    pub disk_number: u16,
    pub internal_file_attributes: u16,
    pub external_file_attributes: u32,
    pub offset: u32,
}

le_block!(
    ZipCentralEntryBlock,
    CENTRAL_DIRECTORY_HEADER_SIGNATURE,
    "Invalid Central Directory header",
    [
        (magic, spec::Magic),
        (version_made_by, u16),
        (version_to_extract, u16),
        (flags, u16),
        (compression_method, u16),
        (last_mod_time, u16),
        (last_mod_date, u16),
        (crc32, u32),
        (compressed_size, u32),
        (uncompressed_size, u32),
        (file_name_length, u16),
        (extra_field_length, u16),
        (file_comment_length, u16),
        (disk_number, u16),
        (internal_file_attributes, u16),
        (external_file_attributes, u32),
        (offset, u32),
    ]
);

#[derive(Copy, Clone, Debug)]
#[repr(packed)]
pub(crate) struct ZipLocalEntryBlock {
    pub magic: spec::Magic,
    pub version_to_extract: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name_length: u16,
    pub extra_field_length: u16,
}

le_block!(
    ZipLocalEntryBlock,
    LOCAL_FILE_HEADER_SIGNATURE,
    "Invalid local file header",
    [
        (magic, spec::Magic),
        (version_to_extract, u16),
        (flags, u16),
        (compression_method, u16),
        (last_mod_time, u16),
        (last_mod_date, u16),
        (crc32, u32),
        (compressed_size, u32),
        (uncompressed_size, u32),
        (file_name_length, u16),
        (extra_field_length, u16),
    ]
);

fn trailer_len(what: &str, len: usize) -> ZipResult<u16> {
    u16::try_from(len).map_err(|_| {
        ZipError::InvalidArgument(
            format!("{what} is {len} bytes, at most {MAX_TRAILER_LEN} fit").into(),
        )
    })
}

/// Fields shared by the central directory record and the local file header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryCommon {
    pub version_needed: Version,
    pub flags: GeneralPurposeFlags,
    pub compression_method: u16,
    pub last_modified: DateTime,
    pub crc32: u32,
    /// `u32::MAX` means the value lives in the ZIP64 extra field.
    pub compressed_size: u32,
    /// `u32::MAX` means the value lives in the ZIP64 extra field.
    pub uncompressed_size: u32,
    pub file_name: Box<str>,
    /// Name as stored. To be used when `file_name` was decoded lossily.
    pub file_name_raw: Box<[u8]>,
    pub extra_field: Box<[u8]>,
}

impl DirectoryCommon {
    /// Whether either size is a ZIP64 sentinel.
    pub fn is_zip64(&self) -> bool {
        self.compressed_size == u32::MAX || self.uncompressed_size == u32::MAX
    }

    pub fn is_dir(&self) -> bool {
        self.file_name.ends_with('/')
    }

    pub(crate) fn size_sentinels(&self) -> Zip64Sentinels {
        Zip64Sentinels::local(
            self.uncompressed_size == u32::MAX,
            self.compressed_size == u32::MAX,
        )
    }

    fn decode_name(flags: GeneralPurposeFlags, file_name_raw: Box<[u8]>) -> (Box<str>, Box<[u8]>) {
        (decode_text(&file_name_raw, flags.is_utf8()), file_name_raw)
    }
}

/// Central directory file header
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CentralDirectoryRecord {
    pub common: DirectoryCommon,
    pub version_made_by: Version,
    pub file_comment: Box<str>,
    pub file_comment_raw: Box<[u8]>,
    pub disk_number_start: u16,
    pub internal_attributes: u16,
    pub external_attributes: u32,
    /// `u32::MAX` means the value lives in the ZIP64 extra field.
    pub local_header_offset: u32,
}

impl CentralDirectoryRecord {
    pub const FIXED_LEN: usize = mem::size_of::<ZipCentralEntryBlock>();

    /// Whether any field is a ZIP64 sentinel.
    pub fn is_zip64(&self) -> bool {
        self.zip64_sentinels().any()
    }

    pub fn zip64_sentinels(&self) -> Zip64Sentinels {
        Zip64Sentinels {
            header_offset: self.local_header_offset == u32::MAX,
            disk_number: self.disk_number_start == u16::MAX,
            ..self.common.size_sentinels()
        }
    }

    /// Decode the extra field list against this record's sentinels.
    pub fn extra_fields(&self) -> ZipResult<Vec<ExtraField>> {
        extra_fields::decode_all(&self.common.extra_field, self.zip64_sentinels())
    }

    /// The ZIP64 field, if any field of this record is a sentinel.
    pub(crate) fn zip64_info(&self) -> ZipResult<Option<Zip64ExtendedInformation>> {
        let sentinels = self.zip64_sentinels();
        if !sentinels.any() {
            return Ok(None);
        }
        Ok(self.extra_fields()?.into_iter().find_map(|field| match field {
            ExtraField::Zip64(info) => Some(info),
            _ => None,
        }))
    }

    /// Encoded length, including the variable trailers.
    pub fn len(&self) -> usize {
        Self::FIXED_LEN
            + self.common.file_name_raw.len()
            + self.common.extra_field.len()
            + self.file_comment_raw.len()
    }

    pub fn parse<R: Read>(reader: &mut R) -> ZipResult<Self> {
        let ZipCentralEntryBlock {
            // magic,
            version_made_by,
            version_to_extract,
            flags,
            compression_method,
            last_mod_time,
            last_mod_date,
            crc32,
            compressed_size,
            uncompressed_size,
            file_name_length,
            extra_field_length,
            file_comment_length,
            disk_number,
            internal_file_attributes,
            external_file_attributes,
            offset,
            ..
        } = ZipCentralEntryBlock::parse(reader)?;

        let flags = GeneralPurposeFlags::from_bits(flags);
        let file_name_raw = read_exact_boxed(reader, file_name_length as usize)?;
        let extra_field = read_exact_boxed(reader, extra_field_length as usize)?;
        let file_comment_raw = read_exact_boxed(reader, file_comment_length as usize)?;
        let (file_name, file_name_raw) = DirectoryCommon::decode_name(flags, file_name_raw);
        let file_comment = decode_text(&file_comment_raw, flags.is_utf8());

        Ok(Self {
            common: DirectoryCommon {
                version_needed: Version::from_bits(version_to_extract),
                flags,
                compression_method,
                last_modified: DateTime::from_msdos(last_mod_date, last_mod_time),
                crc32,
                compressed_size,
                uncompressed_size,
                file_name,
                file_name_raw,
                extra_field,
            },
            version_made_by: Version::from_bits(version_made_by),
            file_comment,
            file_comment_raw,
            disk_number_start: disk_number,
            internal_attributes: internal_file_attributes,
            external_attributes: external_file_attributes,
            local_header_offset: offset,
        })
    }

    fn block(&self) -> ZipResult<ZipCentralEntryBlock> {
        let common = &self.common;
        Ok(ZipCentralEntryBlock {
            magic: CENTRAL_DIRECTORY_HEADER_SIGNATURE,
            version_made_by: self.version_made_by.bits(),
            version_to_extract: common.version_needed.bits(),
            flags: common.flags.bits(),
            compression_method: common.compression_method,
            last_mod_time: common.last_modified.timepart(),
            last_mod_date: common.last_modified.datepart(),
            crc32: common.crc32,
            compressed_size: common.compressed_size,
            uncompressed_size: common.uncompressed_size,
            file_name_length: trailer_len("file name", common.file_name_raw.len())?,
            extra_field_length: trailer_len("extra field", common.extra_field.len())?,
            file_comment_length: trailer_len("file comment", self.file_comment_raw.len())?,
            disk_number: self.disk_number_start,
            internal_file_attributes: self.internal_attributes,
            external_file_attributes: self.external_attributes,
            offset: self.local_header_offset,
        })
    }

    /// Fail if a trailer is too long to encode.
    pub fn validate(&self) -> ZipResult<()> {
        self.block().map(drop)
    }

    /// Encode to bytes. Fails before producing anything when a trailer is too long.
    pub fn encode(&self) -> ZipResult<Vec<u8>> {
        let block = self.block()?;
        let mut out = Vec::with_capacity(self.len());
        out.extend_from_slice(&block.encode());
        out.extend_from_slice(&self.common.file_name_raw);
        out.extend_from_slice(&self.common.extra_field);
        out.extend_from_slice(&self.file_comment_raw);
        Ok(out)
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> ZipResult<()> {
        writer.write_all(&self.encode()?)?;
        Ok(())
    }
}

/// Local file header
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalFileHeader {
    pub common: DirectoryCommon,
}

impl LocalFileHeader {
    pub const FIXED_LEN: usize = mem::size_of::<ZipLocalEntryBlock>();

    /// CRC and both sizes are zero: the real values follow the data in a descriptor.
    pub fn has_data_descriptor(&self) -> bool {
        self.common.crc32 == 0
            && self.common.compressed_size == 0
            && self.common.uncompressed_size == 0
    }

    pub fn len(&self) -> usize {
        Self::FIXED_LEN + self.common.file_name_raw.len() + self.common.extra_field.len()
    }

    pub fn extra_fields(&self) -> ZipResult<Vec<ExtraField>> {
        extra_fields::decode_all(&self.common.extra_field, self.common.size_sentinels())
    }

    pub fn parse<R: Read>(reader: &mut R) -> ZipResult<Self> {
        let ZipLocalEntryBlock {
            // magic,
            version_to_extract,
            flags,
            compression_method,
            last_mod_time,
            last_mod_date,
            crc32,
            compressed_size,
            uncompressed_size,
            file_name_length,
            extra_field_length,
            ..
        } = ZipLocalEntryBlock::parse(reader)?;

        let flags = GeneralPurposeFlags::from_bits(flags);
        let file_name_raw = read_exact_boxed(reader, file_name_length as usize)?;
        let extra_field = read_exact_boxed(reader, extra_field_length as usize)?;
        let (file_name, file_name_raw) = DirectoryCommon::decode_name(flags, file_name_raw);

        Ok(Self {
            common: DirectoryCommon {
                version_needed: Version::from_bits(version_to_extract),
                flags,
                compression_method,
                last_modified: DateTime::from_msdos(last_mod_date, last_mod_time),
                crc32,
                compressed_size,
                uncompressed_size,
                file_name,
                file_name_raw,
                extra_field,
            },
        })
    }

    pub fn encode(&self) -> ZipResult<Vec<u8>> {
        let common = &self.common;
        let block = ZipLocalEntryBlock {
            magic: LOCAL_FILE_HEADER_SIGNATURE,
            version_to_extract: common.version_needed.bits(),
            flags: common.flags.bits(),
            compression_method: common.compression_method,
            last_mod_time: common.last_modified.timepart(),
            last_mod_date: common.last_modified.datepart(),
            crc32: common.crc32,
            compressed_size: common.compressed_size,
            uncompressed_size: common.uncompressed_size,
            file_name_length: trailer_len("file name", common.file_name_raw.len())?,
            extra_field_length: trailer_len("extra field", common.extra_field.len())?,
        };
        let mut out = Vec::with_capacity(self.len());
        out.extend_from_slice(&block.encode());
        out.extend_from_slice(&common.file_name_raw);
        out.extend_from_slice(&common.extra_field);
        Ok(out)
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> ZipResult<()> {
        writer.write_all(&self.encode()?)?;
        Ok(())
    }
}

/// CRC and sizes written after the data of an entry whose local header left them zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

impl DataDescriptor {
    /// Encoded length, signature included.
    pub const fn len(zip64: bool) -> usize {
        if zip64 { 24 } else { 16 }
    }

    /// Parse a descriptor. The leading signature is optional; sizes are eight bytes wide
    /// when `zip64` is set.
    pub fn parse<R: Read>(reader: &mut R, zip64: bool) -> ZipResult<Self> {
        let first = reader.read_u32_le()?;
        let crc32 = if first == DATA_DESCRIPTOR_SIGNATURE {
            reader.read_u32_le()?
        } else {
            first
        };
        let (compressed_size, uncompressed_size) = if zip64 {
            (reader.read_u64_le()?, reader.read_u64_le()?)
        } else {
            (
                reader.read_u32_le()?.into(),
                reader.read_u32_le()?.into(),
            )
        };
        Ok(Self {
            crc32,
            compressed_size,
            uncompressed_size,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W, zip64: bool) -> ZipResult<()> {
        let mut out = Vec::with_capacity(Self::len(zip64));
        out.extend(DATA_DESCRIPTOR_SIGNATURE.to_le_bytes());
        out.extend(self.crc32.to_le_bytes());
        if zip64 {
            out.extend(self.compressed_size.to_le_bytes());
            out.extend(self.uncompressed_size.to_le_bytes());
        } else {
            let (Ok(compressed), Ok(uncompressed)) = (
                u32::try_from(self.compressed_size),
                u32::try_from(self.uncompressed_size),
            ) else {
                invalid!("Data descriptor sizes need ZIP64 width");
            };
            out.extend(compressed.to_le_bytes());
            out.extend(uncompressed.to_le_bytes());
        }
        writer.write_all(&out)?;
        Ok(())
    }
}
