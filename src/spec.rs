#![allow(clippy::wrong_self_convention)]
#![macro_use]
//! Fixed-layout records at the tail of an archive, and the block machinery shared by every
//! on-disk record.

use crate::result::{ZipError, ZipResult, invalid};
use memchr::memmem::FinderRev;
use std::io;
use std::io::prelude::*;
use std::mem;

pub type Magic = u32;

pub const LOCAL_FILE_HEADER_SIGNATURE: Magic = 0x04034b50;
pub const CENTRAL_DIRECTORY_HEADER_SIGNATURE: Magic = 0x02014b50;
pub const CENTRAL_DIRECTORY_END_SIGNATURE: Magic = 0x06054b50;
pub const ZIP64_CENTRAL_DIRECTORY_END_SIGNATURE: Magic = 0x06064b50;
pub const ZIP64_CENTRAL_DIRECTORY_END_LOCATOR_SIGNATURE: Magic = 0x07064b50;
pub const DATA_DESCRIPTOR_SIGNATURE: Magic = 0x08074b50;

/// 32-bit sizes and offsets at or above this value live in the ZIP64 extra field.
pub const ZIP64_BYTES_THR: u64 = u32::MAX as u64;
/// Entry counts at or above this value live in the ZIP64 end of central directory.
pub const ZIP64_ENTRY_THR: usize = u16::MAX as usize;

/// Longest comment a 16-bit length field can describe.
pub(crate) const MAX_COMMENT_LEN: usize = u16::MAX as usize;

/// Upper bound on ZIP64 end of central directory extensible data kept in memory.
pub(crate) const ZIP64_EXTENSIBLE_DATA_CAP: u64 = 2 * 1024 * 1024;

pub trait Block: Sized + Copy {
    fn interpret(bytes: &[u8]) -> ZipResult<Self>;

    fn deserialize(block: &[u8]) -> Self {
        assert_eq!(block.len(), mem::size_of::<Self>());
        let block_ptr: *const Self = block.as_ptr().cast();
        // SAFETY: every implementor is `#[repr(packed)]` plain old data, so any bit pattern of
        // the right length is a valid value and alignment is 1.
        unsafe { block_ptr.read() }
    }

    fn parse<T: Read>(reader: &mut T) -> ZipResult<Self> {
        let mut block = vec![0u8; mem::size_of::<Self>()];
        reader.read_exact(&mut block)?;
        Self::interpret(&block)
    }

    fn encode(self) -> Box<[u8]>;

    fn serialize(self) -> Box<[u8]> {
        let mut out_block = vec![0u8; mem::size_of::<Self>()];
        let out_view: &mut [u8] = out_block.as_mut();
        let out_ptr: *mut Self = out_view.as_mut_ptr().cast();
        // SAFETY: the buffer is exactly `size_of::<Self>()` bytes and `Self` has alignment 1.
        unsafe {
            out_ptr.write(self);
        }
        out_block.into_boxed_slice()
    }

    fn write<T: Write>(self, writer: &mut T) -> ZipResult<()> {
        let block = self.encode();
        writer.write_all(&block)?;
        Ok(())
    }
}

/// Convert all the fields of a struct *from* little-endian representations.
macro_rules! from_le {
    ($obj:ident, $field:ident, $type:ty) => {
        $obj.$field = <$type>::from_le($obj.$field);
    };
    ($obj:ident, [($field:ident, $type:ty) $(,)?]) => {
        from_le![$obj, $field, $type];
    };
    ($obj:ident, [($field:ident, $type:ty), $($rest:tt),+ $(,)?]) => {
        from_le![$obj, $field, $type];
        from_le!($obj, [$($rest),+]);
    };
}

/// Convert all the fields of a struct *into* little-endian representations.
macro_rules! to_le {
    ($obj:ident, $field:ident, $type:ty) => {
        $obj.$field = <$type>::to_le($obj.$field);
    };
    ($obj:ident, [($field:ident, $type:ty) $(,)?]) => {
        to_le![$obj, $field, $type];
    };
    ($obj:ident, [($field:ident, $type:ty), $($rest:tt),+ $(,)?]) => {
        to_le![$obj, $field, $type];
        to_le!($obj, [$($rest),+]);
    };
}

/// Implements `from_le`, `to_le` and [`Block`] for a packed record with a leading magic.
macro_rules! le_block {
    ($name:ident, $magic:expr, $err:literal, [$(($field:ident, $type:ty)),+ $(,)?]) => {
        impl $name {
            #[inline(always)]
            fn from_le(mut self) -> Self {
                from_le![self, [$(($field, $type)),+]];
                self
            }

            #[inline(always)]
            fn to_le(mut self) -> Self {
                to_le![self, [$(($field, $type)),+]];
                self
            }
        }

        impl $crate::spec::Block for $name {
            fn interpret(bytes: &[u8]) -> $crate::result::ZipResult<Self> {
                let block = Self::deserialize(bytes).from_le();
                if block.magic != $magic {
                    $crate::result::invalid!($err);
                }
                Ok(block)
            }

            fn encode(self) -> Box<[u8]> {
                self.to_le().serialize()
            }
        }
    };
}

/// Little-endian accessors for variable-length payloads.
pub(crate) trait LittleEndianReadExt: Read {
    fn read_u16_le(&mut self) -> io::Result<u16> {
        let mut out = [0u8; 2];
        self.read_exact(&mut out)?;
        Ok(u16::from_le_bytes(out))
    }

    fn read_u32_le(&mut self) -> io::Result<u32> {
        let mut out = [0u8; 4];
        self.read_exact(&mut out)?;
        Ok(u32::from_le_bytes(out))
    }

    fn read_u64_le(&mut self) -> io::Result<u64> {
        let mut out = [0u8; 8];
        self.read_exact(&mut out)?;
        Ok(u64::from_le_bytes(out))
    }
}

impl<R: Read + ?Sized> LittleEndianReadExt for R {}

pub(crate) fn read_exact_boxed<R: Read + ?Sized>(
    reader: &mut R,
    len: usize,
) -> io::Result<Box<[u8]>> {
    let mut out = vec![0u8; len];
    reader.read_exact(&mut out)?;
    Ok(out.into_boxed_slice())
}

#[derive(Copy, Clone, Debug)]
#[repr(packed)]
pub struct Zip32CDEBlock {
    pub magic: Magic,
    pub disk_number: u16,
    pub disk_with_central_directory: u16,
    pub number_of_files_on_this_disk: u16,
    pub number_of_files: u16,
    pub central_directory_size: u32,
    pub central_directory_offset: u32,
    pub zip_file_comment_length: u16,
}

le_block!(
    Zip32CDEBlock,
    CENTRAL_DIRECTORY_END_SIGNATURE,
    "Invalid end of central directory signature",
    [
        (magic, Magic),
        (disk_number, u16),
        (disk_with_central_directory, u16),
        (number_of_files_on_this_disk, u16),
        (number_of_files, u16),
        (central_directory_size, u32),
        (central_directory_offset, u32),
        (zip_file_comment_length, u16),
    ]
);

/// The classic 22-byte end of central directory record plus its comment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Zip32CentralDirectoryEnd {
    pub disk_number: u16,
    pub disk_with_central_directory: u16,
    pub number_of_files_on_this_disk: u16,
    pub number_of_files: u16,
    pub central_directory_size: u32,
    pub central_directory_offset: u32,
    pub zip_file_comment: Box<[u8]>,
}

impl Zip32CentralDirectoryEnd {
    pub const LEN: usize = mem::size_of::<Zip32CDEBlock>();

    /// Whether any field holds its ZIP64 sentinel.
    pub fn is_zip64(&self) -> bool {
        self.disk_number == u16::MAX
            || self.disk_with_central_directory == u16::MAX
            || self.number_of_files_on_this_disk == u16::MAX
            || self.number_of_files == u16::MAX
            || self.central_directory_size == u32::MAX
            || self.central_directory_offset == u32::MAX
    }

    /// Sentinel record pointing readers at the ZIP64 end of central directory.
    pub fn zip64_sentinel(zip_file_comment: Box<[u8]>) -> Self {
        Self {
            disk_number: 0,
            disk_with_central_directory: 0,
            number_of_files_on_this_disk: u16::MAX,
            number_of_files: u16::MAX,
            central_directory_size: u32::MAX,
            central_directory_offset: u32::MAX,
            zip_file_comment,
        }
    }

    fn block_and_comment(&self) -> ZipResult<(Zip32CDEBlock, &[u8])> {
        let Ok(zip_file_comment_length) = u16::try_from(self.zip_file_comment.len()) else {
            return Err(ZipError::InvalidArgument(
                format!(
                    "archive comment is {} bytes, at most {MAX_COMMENT_LEN} fit",
                    self.zip_file_comment.len()
                )
                .into(),
            ));
        };
        let block = Zip32CDEBlock {
            magic: CENTRAL_DIRECTORY_END_SIGNATURE,
            disk_number: self.disk_number,
            disk_with_central_directory: self.disk_with_central_directory,
            number_of_files_on_this_disk: self.number_of_files_on_this_disk,
            number_of_files: self.number_of_files,
            central_directory_size: self.central_directory_size,
            central_directory_offset: self.central_directory_offset,
            zip_file_comment_length,
        };
        Ok((block, &self.zip_file_comment))
    }

    fn from_block(block: Zip32CDEBlock, zip_file_comment: Box<[u8]>) -> Self {
        let Zip32CDEBlock {
            // magic,
            disk_number,
            disk_with_central_directory,
            number_of_files_on_this_disk,
            number_of_files,
            central_directory_size,
            central_directory_offset,
            ..
        } = block;
        Self {
            disk_number,
            disk_with_central_directory,
            number_of_files_on_this_disk,
            number_of_files,
            central_directory_size,
            central_directory_offset,
            zip_file_comment,
        }
    }

    pub fn parse<T: Read>(reader: &mut T) -> ZipResult<Self> {
        let block = Zip32CDEBlock::parse(reader)?;
        let zip_file_comment = read_exact_boxed(reader, block.zip_file_comment_length as usize)?;
        Ok(Self::from_block(block, zip_file_comment))
    }

    /// Locate the record by scanning backward from the end of the file.
    ///
    /// The fixed-length tail is tried first. If no valid record ends the file, the tail
    /// window grows by `step` bytes per round until it covers the longest possible comment.
    /// A candidate whose comment length runs past the end of the file is skipped. Returns
    /// the record and its absolute position.
    pub fn find_and_parse<T: Read + Seek>(
        reader: &mut T,
        file_length: u64,
        step: usize,
    ) -> ZipResult<(Self, u64)> {
        if file_length < Self::LEN as u64 {
            invalid!("File is too short to hold an end of central directory record");
        }

        let sig_bytes = CENTRAL_DIRECTORY_END_SIGNATURE.to_le_bytes();
        let finder = FinderRev::new(&sig_bytes);

        let max_window = (Self::LEN + MAX_COMMENT_LEN).min(file_length as usize);
        let step = step.max(1);
        let mut window_len = Self::LEN;
        // Positions at or above this have already been tried in a smaller window.
        let mut checked_from = file_length;

        loop {
            let window_start = file_length - window_len as u64;
            reader.seek(io::SeekFrom::Start(window_start))?;
            let window = read_exact_boxed(reader, window_len)?;

            for offset in finder.rfind_iter(&window) {
                let cde_start_pos = window_start + offset as u64;
                if cde_start_pos >= checked_from {
                    continue;
                }
                let Some(header) = window.get(offset..offset + Self::LEN) else {
                    continue;
                };
                let block = Zip32CDEBlock::interpret(header)?;
                let comment_start = offset + Self::LEN;
                let comment_end = comment_start + block.zip_file_comment_length as usize;
                let Some(comment) = window.get(comment_start..comment_end) else {
                    log::trace!(
                        "Skipping end of central directory candidate at {cde_start_pos}: \
                         comment runs past the end of the file"
                    );
                    continue;
                };
                let cde = Self::from_block(block, comment.into());
                return Ok((cde, cde_start_pos));
            }

            checked_from = window_start;
            if window_len >= max_window {
                break;
            }
            window_len = (window_len + step).min(max_window);
        }

        invalid!("Could not find central directory end")
    }

    pub fn write<T: Write>(&self, writer: &mut T) -> ZipResult<()> {
        let (block, comment) = self.block_and_comment()?;
        block.write(writer)?;
        writer.write_all(comment)?;
        Ok(())
    }
}

#[derive(Copy, Clone, Debug)]
#[repr(packed)]
pub struct Zip64CDELocatorBlock {
    pub magic: Magic,
    pub disk_with_central_directory: u32,
    pub end_of_central_directory_offset: u64,
    pub number_of_disks: u32,
}

le_block!(
    Zip64CDELocatorBlock,
    ZIP64_CENTRAL_DIRECTORY_END_LOCATOR_SIGNATURE,
    "Invalid zip64 locator digital signature header",
    [
        (magic, Magic),
        (disk_with_central_directory, u32),
        (end_of_central_directory_offset, u64),
        (number_of_disks, u32),
    ]
);

/// Fixed 20-byte record carrying the absolute offset of the ZIP64 end of central directory.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Zip64CentralDirectoryEndLocator {
    pub disk_with_central_directory: u32,
    pub end_of_central_directory_offset: u64,
    pub number_of_disks: u32,
}

impl Zip64CentralDirectoryEndLocator {
    pub const LEN: usize = mem::size_of::<Zip64CDELocatorBlock>();

    pub fn parse<T: Read>(reader: &mut T) -> ZipResult<Self> {
        let Zip64CDELocatorBlock {
            // magic,
            disk_with_central_directory,
            end_of_central_directory_offset,
            number_of_disks,
            ..
        } = Zip64CDELocatorBlock::parse(reader)?;

        Ok(Self {
            disk_with_central_directory,
            end_of_central_directory_offset,
            number_of_disks,
        })
    }

    pub fn block(self) -> Zip64CDELocatorBlock {
        let Self {
            disk_with_central_directory,
            end_of_central_directory_offset,
            number_of_disks,
        } = self;
        Zip64CDELocatorBlock {
            magic: ZIP64_CENTRAL_DIRECTORY_END_LOCATOR_SIGNATURE,
            disk_with_central_directory,
            end_of_central_directory_offset,
            number_of_disks,
        }
    }

    pub fn write<T: Write>(self, writer: &mut T) -> ZipResult<()> {
        self.block().write(writer)
    }
}

#[derive(Copy, Clone, Debug)]
#[repr(packed)]
pub struct Zip64CDEBlock {
    pub magic: Magic,
    pub record_size: u64,
    pub version_made_by: u16,
    pub version_needed_to_extract: u16,
    pub disk_number: u32,
    pub disk_with_central_directory: u32,
    pub number_of_files_on_this_disk: u64,
    pub number_of_files: u64,
    pub central_directory_size: u64,
    pub central_directory_offset: u64,
}

le_block!(
    Zip64CDEBlock,
    ZIP64_CENTRAL_DIRECTORY_END_SIGNATURE,
    "Invalid zip64 end of central directory signature",
    [
        (magic, Magic),
        (record_size, u64),
        (version_made_by, u16),
        (version_needed_to_extract, u16),
        (disk_number, u32),
        (disk_with_central_directory, u32),
        (number_of_files_on_this_disk, u64),
        (number_of_files, u64),
        (central_directory_size, u64),
        (central_directory_offset, u64),
    ]
);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Zip64CentralDirectoryEnd {
    pub version_made_by: u16,
    pub version_needed_to_extract: u16,
    pub disk_number: u32,
    pub disk_with_central_directory: u32,
    pub number_of_files_on_this_disk: u64,
    pub number_of_files: u64,
    pub central_directory_size: u64,
    pub central_directory_offset: u64,
    pub extensible_data_sector: Box<[u8]>,
}

impl Zip64CentralDirectoryEnd {
    pub const LEN: usize = mem::size_of::<Zip64CDEBlock>();
    /// `record_size` counts everything after itself: the block minus magic and size field.
    const RECORD_SIZE_BASE: u64 = (Self::LEN - 12) as u64;

    /// Two-phase decode: the fixed prefix gives the full record length, then the extensible
    /// data follows. Data beyond [`ZIP64_EXTENSIBLE_DATA_CAP`] is skipped.
    pub fn parse<T: Read>(reader: &mut T) -> ZipResult<Self> {
        let Zip64CDEBlock {
            // magic,
            record_size,
            version_made_by,
            version_needed_to_extract,
            disk_number,
            disk_with_central_directory,
            number_of_files_on_this_disk,
            number_of_files,
            central_directory_size,
            central_directory_offset,
            ..
        } = Zip64CDEBlock::parse(reader)?;

        let Some(extensible_len) = record_size.checked_sub(Self::RECORD_SIZE_BASE) else {
            invalid!("Zip64 end of central directory record size {} is too small", record_size);
        };
        let kept_len = if extensible_len > ZIP64_EXTENSIBLE_DATA_CAP {
            log::warn!(
                "Zip64 end of central directory carries {extensible_len} bytes of extensible \
                 data; keeping the first {ZIP64_EXTENSIBLE_DATA_CAP}"
            );
            ZIP64_EXTENSIBLE_DATA_CAP
        } else {
            extensible_len
        };
        let extensible_data_sector = read_exact_boxed(reader, kept_len as usize)?;
        let skipped = extensible_len - kept_len;
        if skipped > 0 {
            let copied = io::copy(&mut reader.by_ref().take(skipped), &mut io::sink())?;
            if copied != skipped {
                invalid!("Zip64 end of central directory extensible data is truncated");
            }
        }

        Ok(Self {
            version_made_by,
            version_needed_to_extract,
            disk_number,
            disk_with_central_directory,
            number_of_files_on_this_disk,
            number_of_files,
            central_directory_size,
            central_directory_offset,
            extensible_data_sector,
        })
    }

    pub fn block(&self) -> Zip64CDEBlock {
        Zip64CDEBlock {
            magic: ZIP64_CENTRAL_DIRECTORY_END_SIGNATURE,
            record_size: Self::RECORD_SIZE_BASE + self.extensible_data_sector.len() as u64,
            version_made_by: self.version_made_by,
            version_needed_to_extract: self.version_needed_to_extract,
            disk_number: self.disk_number,
            disk_with_central_directory: self.disk_with_central_directory,
            number_of_files_on_this_disk: self.number_of_files_on_this_disk,
            number_of_files: self.number_of_files,
            central_directory_size: self.central_directory_size,
            central_directory_offset: self.central_directory_offset,
        }
    }

    pub fn write<T: Write>(&self, writer: &mut T) -> ZipResult<()> {
        self.block().write(writer)?;
        writer.write_all(&self.extensible_data_sector)?;
        Ok(())
    }
}

/// Either end of central directory record promoted to 64-bit fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CentralDirectoryEnd {
    pub disk_number: u32,
    pub disk_with_central_directory: u32,
    pub number_of_files_on_this_disk: u64,
    pub number_of_files: u64,
    pub central_directory_size: u64,
    pub central_directory_offset: u64,
    pub comment: Box<[u8]>,
    pub is_zip64: bool,
}

impl CentralDirectoryEnd {
    /// The ZIP64 record supplies the numbers, the classic record supplies the comment.
    pub fn promote(
        zip32: Zip32CentralDirectoryEnd,
        zip64: Option<Zip64CentralDirectoryEnd>,
    ) -> Self {
        match zip64 {
            Some(zip64) => Self {
                disk_number: zip64.disk_number,
                disk_with_central_directory: zip64.disk_with_central_directory,
                number_of_files_on_this_disk: zip64.number_of_files_on_this_disk,
                number_of_files: zip64.number_of_files,
                central_directory_size: zip64.central_directory_size,
                central_directory_offset: zip64.central_directory_offset,
                comment: zip32.zip_file_comment,
                is_zip64: true,
            },
            None => Self {
                disk_number: zip32.disk_number.into(),
                disk_with_central_directory: zip32.disk_with_central_directory.into(),
                number_of_files_on_this_disk: zip32.number_of_files_on_this_disk.into(),
                number_of_files: zip32.number_of_files.into(),
                central_directory_size: zip32.central_directory_size.into(),
                central_directory_offset: zip32.central_directory_offset.into(),
                comment: zip32.zip_file_comment,
                is_zip64: false,
            },
        }
    }

    pub fn is_multi_disk(&self) -> bool {
        self.disk_number != 0
            || self.disk_with_central_directory != 0
            || self.number_of_files_on_this_disk != self.number_of_files
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    #[repr(packed)]
    pub struct TestBlock {
        pub magic: Magic,
        pub file_name_length: u16,
    }

    le_block!(
        TestBlock,
        0x01111,
        "bad test magic",
        [(magic, Magic), (file_name_length, u16)]
    );

    /// Demonstrate that a block object can be safely written to memory and deserialized back out.
    #[test]
    fn block_serde() {
        let block = TestBlock {
            magic: 0x01111,
            file_name_length: 3,
        };
        let mut c = Cursor::new(Vec::new());
        block.write(&mut c).unwrap();
        assert_eq!(c.get_ref(), &[0x11, 0x10, 0, 0, 3, 0]);
        c.set_position(0);
        let block2 = TestBlock::parse(&mut c).unwrap();
        assert_eq!(block, block2);
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let bytes = [0u8; 6];
        assert!(matches!(
            TestBlock::interpret(&bytes),
            Err(ZipError::InvalidArchive(_))
        ));
    }

    fn eocd(comment: &[u8]) -> Zip32CentralDirectoryEnd {
        Zip32CentralDirectoryEnd {
            disk_number: 0,
            disk_with_central_directory: 0,
            number_of_files_on_this_disk: 2,
            number_of_files: 2,
            central_directory_size: 0xFFFF_FFFE,
            central_directory_offset: 0,
            zip_file_comment: comment.into(),
        }
    }

    #[test]
    fn eocd_round_trip() {
        let record = eocd(b"a comment");
        let mut buf = Vec::new();
        record.write(&mut buf).unwrap();
        assert_eq!(buf.len(), Zip32CentralDirectoryEnd::LEN + 9);
        let parsed = Zip32CentralDirectoryEnd::parse(&mut buf.as_slice()).unwrap();
        assert_eq!(parsed, record);
        assert!(!parsed.is_zip64());
        assert!(Zip32CentralDirectoryEnd::zip64_sentinel(Box::new([])).is_zip64());
    }

    #[test]
    fn eocd_comment_too_long() {
        let record = eocd(&vec![b'x'; MAX_COMMENT_LEN + 1]);
        assert!(matches!(
            record.write(&mut Vec::new()),
            Err(ZipError::InvalidArgument(_))
        ));
    }

    #[test]
    fn find_with_leading_data_and_comment() {
        for comment_len in [0usize, 1, 300, MAX_COMMENT_LEN] {
            let mut buf = vec![0xAAu8; 100];
            eocd(&vec![b'c'; comment_len]).write(&mut buf).unwrap();
            let len = buf.len() as u64;
            let (found, pos) =
                Zip32CentralDirectoryEnd::find_and_parse(&mut Cursor::new(buf), len, 64).unwrap();
            assert_eq!(pos, 100);
            assert_eq!(found.zip_file_comment.len(), comment_len);
        }
    }

    #[test]
    fn find_rejects_overlong_comment_claim() {
        let mut buf = Vec::new();
        eocd(b"abc").write(&mut buf).unwrap();
        // Claim 4 more comment bytes than the file holds.
        let len_pos = Zip32CentralDirectoryEnd::LEN - 2;
        buf[len_pos..len_pos + 2].copy_from_slice(&7u16.to_le_bytes());
        let len = buf.len() as u64;
        assert!(matches!(
            Zip32CentralDirectoryEnd::find_and_parse(&mut Cursor::new(buf), len, 8),
            Err(ZipError::InvalidArchive(_))
        ));
    }

    #[test]
    fn find_in_tiny_file() {
        let buf = vec![0u8; 10];
        assert!(matches!(
            Zip32CentralDirectoryEnd::find_and_parse(&mut Cursor::new(buf), 10, 8192),
            Err(ZipError::InvalidArchive(_))
        ));
    }

    #[test]
    fn zip64_end_round_trip_with_extensible_data() {
        let record = Zip64CentralDirectoryEnd {
            version_made_by: 45,
            version_needed_to_extract: 45,
            disk_number: 0,
            disk_with_central_directory: 0,
            number_of_files_on_this_disk: 70_000,
            number_of_files: 70_000,
            central_directory_size: u32::MAX as u64 + 10,
            central_directory_offset: 1 << 33,
            extensible_data_sector: Box::new([1, 2, 3]),
        };
        let mut buf = Vec::new();
        record.write(&mut buf).unwrap();
        assert_eq!(buf.len(), Zip64CentralDirectoryEnd::LEN + 3);
        // record_size is "length after this field"
        assert_eq!(u64::from_le_bytes(buf[4..12].try_into().unwrap()), 44 + 3);
        let parsed = Zip64CentralDirectoryEnd::parse(&mut buf.as_slice()).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn zip64_end_oversized_extensible_data_is_clamped() {
        let extra = ZIP64_EXTENSIBLE_DATA_CAP as usize + 5;
        let record = Zip64CentralDirectoryEnd {
            version_made_by: 45,
            version_needed_to_extract: 45,
            disk_number: 0,
            disk_with_central_directory: 0,
            number_of_files_on_this_disk: 1,
            number_of_files: 1,
            central_directory_size: 46,
            central_directory_offset: 0,
            extensible_data_sector: vec![7u8; extra].into_boxed_slice(),
        };
        let mut buf = Vec::new();
        record.write(&mut buf).unwrap();
        buf.extend_from_slice(b"tail");
        let mut reader = Cursor::new(buf);
        let parsed = Zip64CentralDirectoryEnd::parse(&mut reader).unwrap();
        assert_eq!(
            parsed.extensible_data_sector.len() as u64,
            ZIP64_EXTENSIBLE_DATA_CAP
        );
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"tail");
    }

    #[test]
    fn locator_round_trip() {
        let locator = Zip64CentralDirectoryEndLocator {
            disk_with_central_directory: 0,
            end_of_central_directory_offset: 0x1_0000_0000,
            number_of_disks: 1,
        };
        let mut buf = Vec::new();
        locator.write(&mut buf).unwrap();
        assert_eq!(buf.len(), Zip64CentralDirectoryEndLocator::LEN);
        assert_eq!(
            Zip64CentralDirectoryEndLocator::parse(&mut buf.as_slice()).unwrap(),
            locator
        );
    }

    #[test]
    fn promote_plain_end() {
        let end = CentralDirectoryEnd::promote(eocd(b"hi"), None);
        assert_eq!(end.number_of_files, 2);
        assert_eq!(end.central_directory_size, 0xFFFF_FFFE);
        assert_eq!(&*end.comment, b"hi");
        assert!(!end.is_zip64);
        assert!(!end.is_multi_disk());
    }

    #[test]
    fn little_endian_reads() {
        let mut data: &[u8] = &[1, 0, 2, 0, 0, 0, 3, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(data.read_u16_le().unwrap(), 1);
        assert_eq!(data.read_u32_le().unwrap(), 2);
        assert_eq!(data.read_u64_le().unwrap(), 3);
        assert!(data.read_u16_le().is_err());
    }
}
