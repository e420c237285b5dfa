//! Types for extra fields
//!
//! The extra field of a directory record is a list of `(tag, length, payload)` sub-records.
//! ZIP64 and NTFS fields are decoded; any other tag is kept verbatim.

use crate::result::{ZipError, ZipResult, invalid};
use crate::spec::LittleEndianReadExt;

mod ntfs;
mod zip64_extended_information;

// re-export
pub use ntfs::Ntfs;
pub use zip64_extended_information::{Zip64ExtendedInformation, Zip64Sentinels};

/// Longest extra field a 16-bit length can describe.
pub(crate) const MAX_EXTRA_FIELD_LEN: usize = u16::MAX as usize;

/// Extra field tags this crate interprets
#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum UsedExtraField {
    /// ZIP64 extended information extra field
    Zip64ExtendedInfo = 0x0001,
    /// NTFS
    Ntfs = 0x000a,
}

impl TryFrom<u16> for UsedExtraField {
    type Error = ();

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            v if v == UsedExtraField::Zip64ExtendedInfo as u16 => Ok(Self::Zip64ExtendedInfo),
            v if v == UsedExtraField::Ntfs as u16 => Ok(Self::Ntfs),
            _ => Err(()),
        }
    }
}

/// contains one extra field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExtraField {
    /// ZIP64 sizes and offset, present when the owning record holds sentinels
    Zip64(Zip64ExtendedInformation),

    /// NTFS timestamps
    Ntfs(Ntfs),

    /// Any other tag, kept as an opaque payload
    Unknown { tag: u16, data: Box<[u8]> },
}

impl ExtraField {
    pub fn tag(&self) -> u16 {
        match self {
            ExtraField::Zip64(_) => UsedExtraField::Zip64ExtendedInfo as u16,
            ExtraField::Ntfs(_) => UsedExtraField::Ntfs as u16,
            ExtraField::Unknown { tag, .. } => *tag,
        }
    }

    pub fn is_zip64(&self) -> bool {
        matches!(self, ExtraField::Zip64(_))
    }

    fn write_payload(&self, out: &mut Vec<u8>) {
        match self {
            ExtraField::Zip64(info) => info.write_payload(out),
            ExtraField::Ntfs(ntfs) => ntfs.write_payload(out),
            ExtraField::Unknown { data, .. } => out.extend_from_slice(data),
        }
    }
}

/// Decode the extra field of a record whose sentinel fields are `sentinels`.
///
/// A sub-record that claims more bytes than remain is a format error, as is a record with
/// sentinels but no ZIP64 field. Fewer than four trailing bytes are treated as padding.
pub fn decode_all(mut bytes: &[u8], sentinels: Zip64Sentinels) -> ZipResult<Vec<ExtraField>> {
    let mut fields = Vec::new();
    let mut found_zip64 = false;
    while bytes.len() >= 4 {
        let tag = bytes.read_u16_le()?;
        let len = bytes.read_u16_le()? as usize;
        let Some(data) = bytes.get(..len) else {
            invalid!(
                "Extra field 0x{:04x} claims {} bytes but only {} remain",
                tag,
                len,
                bytes.len()
            );
        };
        bytes = &bytes[len..];
        let field = match UsedExtraField::try_from(tag) {
            Ok(UsedExtraField::Zip64ExtendedInfo) => {
                found_zip64 = true;
                ExtraField::Zip64(Zip64ExtendedInformation::parse(data, sentinels)?)
            }
            Ok(UsedExtraField::Ntfs) => match Ntfs::parse(data) {
                Some(ntfs) => ExtraField::Ntfs(ntfs),
                None => ExtraField::Unknown {
                    tag,
                    data: data.into(),
                },
            },
            Err(()) => ExtraField::Unknown {
                tag,
                data: data.into(),
            },
        };
        fields.push(field);
    }
    if !bytes.is_empty() {
        log::trace!("Ignoring {} bytes of extra field padding", bytes.len());
    }
    if sentinels.any() && !found_zip64 {
        invalid!("Record holds ZIP64 sentinels but has no ZIP64 extra field");
    }
    Ok(fields)
}

/// Encode `fields` back-to-back. Fails when the result or any payload exceeds 0xFFFF bytes.
pub fn encode_all(fields: &[ExtraField]) -> ZipResult<Box<[u8]>> {
    let mut out = Vec::new();
    let mut payload = Vec::new();
    for field in fields {
        payload.clear();
        field.write_payload(&mut payload);
        let Ok(len) = u16::try_from(payload.len()) else {
            return Err(ZipError::InvalidArgument(
                format!(
                    "extra field 0x{:04x} payload is {} bytes",
                    field.tag(),
                    payload.len()
                )
                .into(),
            ));
        };
        out.extend(field.tag().to_le_bytes());
        out.extend(len.to_le_bytes());
        out.extend_from_slice(&payload);
    }
    if out.len() > MAX_EXTRA_FIELD_LEN {
        return Err(ZipError::InvalidArgument(
            format!(
                "extra fields total {} bytes, at most {MAX_EXTRA_FIELD_LEN} fit",
                out.len()
            )
            .into(),
        ));
    }
    Ok(out.into_boxed_slice())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::spec::ZIP64_BYTES_THR;

    #[test]
    fn unknown_tags_round_trip() {
        let fields = vec![
            ExtraField::Unknown {
                tag: 0xcafe,
                data: Box::new([]),
            },
            ExtraField::Unknown {
                tag: 0x5455,
                data: Box::new([1, 2, 3, 4, 5]),
            },
        ];
        let bytes = encode_all(&fields).unwrap();
        assert_eq!(&bytes[..4], &[0xfe, 0xca, 0, 0]);
        assert_eq!(
            decode_all(&bytes, Zip64Sentinels::default()).unwrap(),
            fields
        );
    }

    #[test]
    fn mixed_fields_round_trip() {
        let sentinels = Zip64Sentinels {
            uncompressed_size: true,
            compressed_size: false,
            header_offset: true,
            disk_number: false,
        };
        let fields = vec![
            ExtraField::Ntfs(Ntfs::new(10, 20, 30)),
            ExtraField::Zip64(Zip64ExtendedInformation {
                uncompressed_size: Some(ZIP64_BYTES_THR + 5),
                header_offset: Some(ZIP64_BYTES_THR),
                ..Default::default()
            }),
        ];
        let bytes = encode_all(&fields).unwrap();
        assert_eq!(bytes.len(), 4 + 32 + 4 + 16);
        assert_eq!(decode_all(&bytes, sentinels).unwrap(), fields);
    }

    #[test]
    fn truncated_sub_record() {
        let bytes = [0x55, 0x54, 10, 0, 1, 2, 3];
        assert!(matches!(
            decode_all(&bytes, Zip64Sentinels::default()),
            Err(ZipError::InvalidArchive(_))
        ));
    }

    #[test]
    fn trailing_padding_is_tolerated() {
        let bytes = [0x55, 0x54, 1, 0, 9, 0, 0];
        let fields = decode_all(&bytes, Zip64Sentinels::default()).unwrap();
        assert_eq!(
            fields,
            vec![ExtraField::Unknown {
                tag: 0x5455,
                data: Box::new([9]),
            }]
        );
    }

    #[test]
    fn sentinel_without_zip64_field() {
        let bytes = encode_all(&[ExtraField::Ntfs(Ntfs::new(1, 1, 1))]).unwrap();
        assert!(matches!(
            decode_all(&bytes, Zip64Sentinels::local(true, false)),
            Err(ZipError::InvalidArchive(_))
        ));
    }

    #[test]
    fn ntfs_timestamps_with_attribute_size_16() {
        let mut bytes = vec![0x0a, 0, 32, 0, 0, 0, 0, 0, 1, 0, 16, 0];
        bytes.extend(5u64.to_le_bytes());
        bytes.extend(6u64.to_le_bytes());
        bytes.extend(7u64.to_le_bytes());
        assert_eq!(
            decode_all(&bytes, Zip64Sentinels::default()).unwrap(),
            vec![ExtraField::Ntfs(Ntfs::new(5, 6, 7))]
        );
        assert_eq!(
            &*encode_all(&[ExtraField::Ntfs(Ntfs::new(5, 6, 7))]).unwrap(),
            bytes.as_slice()
        );
    }

    #[test]
    fn malformed_ntfs_is_kept_opaque() {
        let bytes = [0x0a, 0, 4, 0, 0, 0, 0, 0];
        let fields = decode_all(&bytes, Zip64Sentinels::default()).unwrap();
        assert_eq!(
            fields,
            vec![ExtraField::Unknown {
                tag: 0x000a,
                data: Box::new([0, 0, 0, 0]),
            }]
        );
    }

    #[test]
    fn oversized_extra_is_rejected() {
        let fields = vec![
            ExtraField::Unknown {
                tag: 1234,
                data: vec![0; 40_000].into_boxed_slice(),
            },
            ExtraField::Unknown {
                tag: 1235,
                data: vec![0; 40_000].into_boxed_slice(),
            },
        ];
        assert!(matches!(
            encode_all(&fields),
            Err(ZipError::InvalidArgument(_))
        ));
        let single = [ExtraField::Unknown {
            tag: 1,
            data: vec![0; 70_000].into_boxed_slice(),
        }];
        assert!(encode_all(&single).is_err());
    }
}
