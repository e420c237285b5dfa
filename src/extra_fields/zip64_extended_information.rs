//! 4.5.3 -Zip64 Extended Information Extra Field (0x0001)
//!
//! | Value                  | Size    | Description                                  |
//! | ---------------------- | ------- | -------------------------------------------- |
//! | `0x0001`               | 2 bytes | Tag for this "extra" block type              |
//! | Size                   | 2 bytes | Size of this "extra" block                   |
//! | Original Size          | 8 bytes | Original uncompressed file size              |
//! | Compressed Size        | 8 bytes | Size of compressed data                      |
//! | Relative Header Offset | 8 bytes | Offset of local header record                |
//! | Disk Start Number      | 4 bytes | Number of the disk on which this file starts |
//!
//! The field is not self-describing: each value appears only when the matching field of the
//! owning record holds its sentinel, always in the order above.

use crate::result::{ZipResult, invalid};
use crate::spec::{LittleEndianReadExt, ZIP64_BYTES_THR};

/// Which fields of the owning record hold their ZIP64 sentinel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Zip64Sentinels {
    pub uncompressed_size: bool,
    pub compressed_size: bool,
    pub header_offset: bool,
    pub disk_number: bool,
}

impl Zip64Sentinels {
    /// Sentinels of a local header, which only ever carries the two sizes.
    pub const fn local(uncompressed_size: bool, compressed_size: bool) -> Self {
        Self {
            uncompressed_size,
            compressed_size,
            header_offset: false,
            disk_number: false,
        }
    }

    pub const fn any(&self) -> bool {
        self.uncompressed_size || self.compressed_size || self.header_offset || self.disk_number
    }

    /// Minimum payload length these sentinels call for.
    pub const fn payload_len(&self) -> usize {
        let mut len = 0;
        if self.uncompressed_size {
            len += 8;
        }
        if self.compressed_size {
            len += 8;
        }
        if self.header_offset {
            len += 8;
        }
        if self.disk_number {
            len += 4;
        }
        len
    }
}

/// Zip64 extended information extra field
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Zip64ExtendedInformation {
    pub uncompressed_size: Option<u64>,
    pub compressed_size: Option<u64>,
    pub header_offset: Option<u64>,
    pub disk_number: Option<u32>,
}

impl Zip64ExtendedInformation {
    /// The local header form MUST include BOTH original and compressed file size fields.
    pub(crate) const fn local_header(uncompressed_size: u64, compressed_size: u64) -> Self {
        Self {
            uncompressed_size: Some(uncompressed_size),
            compressed_size: Some(compressed_size),
            header_offset: None,
            disk_number: None,
        }
    }

    /// Central directory form, holding only the values that overflow their 32-bit fields.
    /// Returns `None` when nothing overflows.
    pub(crate) fn central_header(
        uncompressed_size: u64,
        compressed_size: u64,
        header_offset: u64,
    ) -> Option<Self> {
        let pick = |value: u64| (value >= ZIP64_BYTES_THR).then_some(value);
        let info = Self {
            uncompressed_size: pick(uncompressed_size),
            compressed_size: pick(compressed_size),
            header_offset: pick(header_offset),
            disk_number: None,
        };
        info.sentinels().any().then_some(info)
    }

    /// The sentinels this field answers for.
    pub const fn sentinels(&self) -> Zip64Sentinels {
        Zip64Sentinels {
            uncompressed_size: self.uncompressed_size.is_some(),
            compressed_size: self.compressed_size.is_some(),
            header_offset: self.header_offset.is_some(),
            disk_number: self.disk_number.is_some(),
        }
    }

    /// Decode a payload whose shape is dictated by `sentinels`. Trailing bytes past the
    /// expected values are ignored.
    pub(crate) fn parse(mut data: &[u8], sentinels: Zip64Sentinels) -> ZipResult<Self> {
        if data.len() < sentinels.payload_len() {
            invalid!(
                "Zip64 extra field holds {} bytes but the record needs {}",
                data.len(),
                sentinels.payload_len()
            );
        }
        let mut info = Self::default();
        if sentinels.uncompressed_size {
            info.uncompressed_size = Some(data.read_u64_le()?);
        }
        if sentinels.compressed_size {
            info.compressed_size = Some(data.read_u64_le()?);
        }
        if sentinels.header_offset {
            info.header_offset = Some(data.read_u64_le()?);
        }
        if sentinels.disk_number {
            info.disk_number = Some(data.read_u32_le()?);
        }
        Ok(info)
    }

    pub fn payload_len(&self) -> usize {
        self.sentinels().payload_len()
    }

    pub(crate) fn write_payload(&self, out: &mut Vec<u8>) {
        let Self {
            uncompressed_size,
            compressed_size,
            header_offset,
            disk_number,
        } = *self;
        if let Some(uncompressed_size) = uncompressed_size {
            out.extend(u64::to_le_bytes(uncompressed_size));
        }
        if let Some(compressed_size) = compressed_size {
            out.extend(u64::to_le_bytes(compressed_size));
        }
        if let Some(header_offset) = header_offset {
            out.extend(u64::to_le_bytes(header_offset));
        }
        if let Some(disk_number) = disk_number {
            out.extend(u32::to_le_bytes(disk_number));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::result::ZipError;

    #[test]
    fn central_header_keeps_only_overflowing_values() {
        assert_eq!(Zip64ExtendedInformation::central_header(1, 2, 3), None);
        let info =
            Zip64ExtendedInformation::central_header(ZIP64_BYTES_THR + 1, 10, ZIP64_BYTES_THR)
                .unwrap();
        assert_eq!(info.uncompressed_size, Some(ZIP64_BYTES_THR + 1));
        assert_eq!(info.compressed_size, None);
        assert_eq!(info.header_offset, Some(ZIP64_BYTES_THR));
        assert_eq!(info.payload_len(), 16);
    }

    #[test]
    fn payload_order_is_canonical() {
        let info = Zip64ExtendedInformation {
            uncompressed_size: Some(0x0101_0101_0101_0101),
            compressed_size: None,
            header_offset: Some(0x0202_0202_0202_0202),
            disk_number: Some(3),
        };
        let mut out = Vec::new();
        info.write_payload(&mut out);
        assert_eq!(out.len(), 20);
        assert_eq!(&out[..8], &[1; 8]);
        assert_eq!(&out[8..16], &[2; 8]);
        assert_eq!(&out[16..], &[3, 0, 0, 0]);
        assert_eq!(
            Zip64ExtendedInformation::parse(&out, info.sentinels()).unwrap(),
            info
        );
    }

    #[test]
    fn parse_follows_sentinels() {
        let mut payload = Vec::new();
        payload.extend(7u64.to_le_bytes());
        payload.extend(9u64.to_le_bytes());
        // Only the compressed size is a sentinel: the first value belongs to it.
        let info =
            Zip64ExtendedInformation::parse(&payload, Zip64Sentinels::local(false, true)).unwrap();
        assert_eq!(info.uncompressed_size, None);
        assert_eq!(info.compressed_size, Some(7));
    }

    #[test]
    fn parse_short_payload() {
        let payload = 7u64.to_le_bytes();
        assert!(matches!(
            Zip64ExtendedInformation::parse(&payload, Zip64Sentinels::local(true, true)),
            Err(ZipError::InvalidArchive(_))
        ));
    }

    #[test]
    fn local_header_has_both_sizes() {
        let info = Zip64ExtendedInformation::local_header(0, 0);
        assert_eq!(info.sentinels(), Zip64Sentinels::local(true, true));
        assert_eq!(info.payload_len(), 16);
    }
}
