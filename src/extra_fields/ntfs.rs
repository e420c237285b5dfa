//! NTFS extra field (0x000a)
//!
//! | Value      | Size    | Description                         |
//! | ---------- | ------- | ----------------------------------- |
//! | Reserved   | 4 bytes | Reserved for future use             |
//! | Tag1       | 2 bytes | NTFS attribute tag value #1 (`1`)   |
//! | Size1      | 2 bytes | Size of attribute #1 (`16`)         |
//! | Mtime      | 8 bytes | File last modification time         |
//! | Atime      | 8 bytes | File last access time               |
//! | Ctime      | 8 bytes | File creation time                  |
//!
//! Times are Windows FILETIME values: 100-nanosecond intervals since 1601-01-01 UTC.
//! Writers that follow APPNOTE 4.5.5 put 24 in Size1; both values are read.

use std::time::SystemTime;

use time::OffsetDateTime;

use crate::spec::LittleEndianReadExt;

/// FILETIME of the Unix epoch.
const FILETIME_UNIX_DIFF: i128 = 116_444_736_000_000_000;
const TIMESTAMP_ATTRIBUTE_TAG: u16 = 0x0001;
const TIMESTAMP_ATTRIBUTE_SIZE: u16 = 16;
/// Bytes of the three FILETIMEs following the timestamp attribute header.
const TIMESTAMPS_LEN: usize = 24;

/// The NTFS extra field as described in APPNOTE 4.5.5
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Ntfs {
    mtime: u64,
    atime: u64,
    ctime: u64,
}

impl Ntfs {
    /// Length of the encoded payload.
    pub const PAYLOAD_LEN: usize = 32;

    /// Build from raw FILETIME values.
    pub const fn new(mtime: u64, atime: u64, ctime: u64) -> Self {
        Self {
            mtime,
            atime,
            ctime,
        }
    }

    /// Build from calendar times. Moments before 1601 become FILETIME zero.
    pub fn from_times(mtime: OffsetDateTime, atime: OffsetDateTime, ctime: OffsetDateTime) -> Self {
        Self::new(to_filetime(mtime), to_filetime(atime), to_filetime(ctime))
    }

    pub fn from_system_times(mtime: SystemTime, atime: SystemTime, ctime: SystemTime) -> Self {
        Self::from_times(mtime.into(), atime.into(), ctime.into())
    }

    /// Parse a payload. Only the timestamp attribute (tag 1) is understood; other attributes
    /// are skipped. Returns `None` when no usable timestamp attribute is present.
    ///
    /// The three times always follow the timestamp attribute header, whether its size says
    /// 16 or 24.
    pub(crate) fn parse(mut data: &[u8]) -> Option<Self> {
        let _reserved = data.read_u32_le().ok()?;
        while data.len() >= 4 {
            let tag = data.read_u16_le().ok()?;
            let size = data.read_u16_le().ok()? as usize;
            if tag == TIMESTAMP_ATTRIBUTE_TAG && size >= usize::from(TIMESTAMP_ATTRIBUTE_SIZE) {
                let mut times = data.get(..TIMESTAMPS_LEN)?;
                let mtime = times.read_u64_le().ok()?;
                let atime = times.read_u64_le().ok()?;
                let ctime = times.read_u64_le().ok()?;
                return Some(Self::new(mtime, atime, ctime));
            }
            data = data.get(size..)?;
        }
        None
    }

    pub(crate) fn write_payload(&self, out: &mut Vec<u8>) {
        out.extend(0u32.to_le_bytes());
        out.extend(TIMESTAMP_ATTRIBUTE_TAG.to_le_bytes());
        out.extend(TIMESTAMP_ATTRIBUTE_SIZE.to_le_bytes());
        out.extend(self.mtime.to_le_bytes());
        out.extend(self.atime.to_le_bytes());
        out.extend(self.ctime.to_le_bytes());
    }

    /// Returns the file last modification time as a file time.
    pub const fn mtime(&self) -> u64 {
        self.mtime
    }

    /// Returns the file last access time as a file time.
    pub const fn atime(&self) -> u64 {
        self.atime
    }

    /// Returns the file creation time as a file time.
    pub const fn ctime(&self) -> u64 {
        self.ctime
    }

    pub fn modified(&self) -> Option<OffsetDateTime> {
        from_filetime(self.mtime)
    }

    pub fn accessed(&self) -> Option<OffsetDateTime> {
        from_filetime(self.atime)
    }

    pub fn created(&self) -> Option<OffsetDateTime> {
        from_filetime(self.ctime)
    }
}

fn to_filetime(time: OffsetDateTime) -> u64 {
    let intervals = time.unix_timestamp_nanos() / 100 + FILETIME_UNIX_DIFF;
    u64::try_from(intervals.max(0)).unwrap_or(u64::MAX)
}

fn from_filetime(filetime: u64) -> Option<OffsetDateTime> {
    let nanos = (i128::from(filetime) - FILETIME_UNIX_DIFF) * 100;
    OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()
}

#[cfg(test)]
mod test {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn payload_layout() {
        let ntfs = Ntfs::new(1, 2, 3);
        let mut out = Vec::new();
        ntfs.write_payload(&mut out);
        assert_eq!(out.len(), Ntfs::PAYLOAD_LEN);
        assert_eq!(&out[..8], &[0, 0, 0, 0, 1, 0, 16, 0]);
        assert_eq!(Ntfs::parse(&out), Some(ntfs));
    }

    #[test]
    fn skips_foreign_attributes() {
        let mut payload = vec![0, 0, 0, 0];
        // attribute 7, 2 bytes
        payload.extend([7, 0, 2, 0, 0xAA, 0xBB]);
        payload.extend([1, 0, 24, 0]);
        payload.extend(5u64.to_le_bytes());
        payload.extend(6u64.to_le_bytes());
        payload.extend(7u64.to_le_bytes());
        assert_eq!(Ntfs::parse(&payload), Some(Ntfs::new(5, 6, 7)));
    }

    #[test]
    fn reads_both_attribute_sizes() {
        for size in [16, 24] {
            let mut payload = vec![0, 0, 0, 0, 1, 0, size, 0];
            payload.extend(5u64.to_le_bytes());
            payload.extend(6u64.to_le_bytes());
            payload.extend(7u64.to_le_bytes());
            assert_eq!(Ntfs::parse(&payload), Some(Ntfs::new(5, 6, 7)), "size {size}");
        }
    }

    #[test]
    fn rejects_short_timestamp_attribute() {
        // Header claims 16 bytes but only two times follow.
        let payload = [0, 0, 0, 0, 1, 0, 16, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(Ntfs::parse(&payload), None);
        let payload = [0, 0, 0, 0, 1, 0, 8, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(Ntfs::parse(&payload), None);
        assert_eq!(Ntfs::parse(&[0, 0]), None);
    }

    #[test]
    fn filetime_conversion() {
        // Expected NTFS modification time in Windows FILETIME units.
        let ntfs = Ntfs::new(133_813_273_144_169_390, 0, 0);
        assert_eq!(
            ntfs.modified().unwrap(),
            datetime!(2025-01-14 11:21:54.416_939_000 UTC)
        );
        assert_eq!(
            ntfs.accessed().unwrap(),
            datetime!(1601-01-01 00:00:00 UTC)
        );
        let unix_epoch = datetime!(1970-01-01 00:00:00 UTC);
        let ntfs = Ntfs::from_times(unix_epoch, unix_epoch, unix_epoch);
        assert_eq!(ntfs.ctime(), 116_444_736_000_000_000);
    }
}
