use std::io::Cursor;

use zipcore::result::ZipError;
use zipcore::extra_fields::ExtraField;
use zipcore::{
    CompressionMethod, Config, DataDescriptor, LocalFileHeader, OpenMode, ZipArchive, ZipEntry,
};

const CONTENT: &str = "described after the data, not before";

fn build(config: Config) -> Vec<u8> {
    let mut zip = ZipArchive::create(Cursor::new(Vec::new()), config).unwrap();
    let options = zip
        .config()
        .entry_options()
        .compression_method(CompressionMethod::Stored);
    zip.add_entry_with_content(ZipEntry::new("stored.txt", &options).unwrap(), CONTENT.as_bytes())
        .unwrap();
    zip.add_text_entry("deflated.txt", CONTENT).unwrap();
    zip.close().unwrap().into_inner()
}

fn local_header(bytes: &[u8], name: &str) -> LocalFileHeader {
    let zip = ZipArchive::open(Cursor::new(bytes.to_vec()), OpenMode::Read, Config::default())
        .unwrap();
    let offset = zip.entry(name).unwrap().header_offset() as usize;
    LocalFileHeader::parse(&mut &bytes[offset..]).unwrap()
}

/// Position of the descriptor following the data of `name`.
fn descriptor_position(bytes: &[u8], name: &str) -> usize {
    let zip = ZipArchive::open(Cursor::new(bytes.to_vec()), OpenMode::Read, Config::default())
        .unwrap();
    let entry = zip.entry(name).unwrap();
    entry.header_offset() as usize
        + local_header(bytes, name).len()
        + entry.compressed_size() as usize
}

#[test]
fn descriptor_entries_round_trip() {
    for zip64 in [false, true] {
        let config = Config::default().data_descriptor(true).zip64(zip64);
        let bytes = build(config);
        let mut zip =
            ZipArchive::open(Cursor::new(bytes.clone()), OpenMode::Read, Config::default())
                .unwrap();
        for name in ["stored.txt", "deflated.txt"] {
            assert!(zip.entry(name).unwrap().has_data_descriptor());
            assert_eq!(zip.read_text_entry(name).unwrap(), CONTENT);
        }

        // A ZIP64 field in the local header announces 64-bit descriptor sizes.
        let local = local_header(&bytes, "stored.txt");
        assert!(local.has_data_descriptor());
        assert_eq!(
            local.extra_fields().unwrap().iter().any(ExtraField::is_zip64),
            zip64
        );
        let position = descriptor_position(&bytes, "stored.txt");
        let descriptor = DataDescriptor::parse(&mut &bytes[position..], zip64).unwrap();
        let next = position + DataDescriptor::len(zip64);
        assert_eq!(
            next as u64,
            zip.entry("deflated.txt").unwrap().header_offset()
        );
        assert_eq!(descriptor.uncompressed_size, CONTENT.len() as u64);
        assert_eq!(descriptor.compressed_size, CONTENT.len() as u64);
        assert_eq!(descriptor.crc32, zip.entry("stored.txt").unwrap().crc32());
    }
}

#[test]
fn corrupted_descriptor_is_an_integrity_error() {
    let mut bytes = build(Config::default().data_descriptor(true));
    let position = descriptor_position(&bytes, "stored.txt");
    // Skip the signature and damage the CRC.
    bytes[position + 4] ^= 0x01;
    let mut zip = ZipArchive::open(Cursor::new(bytes), OpenMode::Read, Config::default()).unwrap();
    let err = zip.read_entry_to_vec("stored.txt").unwrap_err();
    assert!(err.is_integrity_error());
    assert_eq!(zip.read_text_entry("deflated.txt").unwrap(), CONTENT);

    let mut bytes = build(Config::default().data_descriptor(true));
    let position = descriptor_position(&bytes, "stored.txt");
    bytes[position + 8] ^= 0x01;
    let mut zip = ZipArchive::open(Cursor::new(bytes), OpenMode::Read, Config::default()).unwrap();
    assert!(matches!(
        zip.read_entry_to_vec("stored.txt"),
        Err(ZipError::SizeMismatch { field: "compressed size", .. })
    ));
}

#[test]
fn local_header_with_values_contradicts_the_descriptor_flag() {
    let mut bytes = build(Config::default().data_descriptor(true));
    let offset = {
        let zip = ZipArchive::open(Cursor::new(bytes.clone()), OpenMode::Read, Config::default())
            .unwrap();
        zip.entry("stored.txt").unwrap().header_offset() as usize
    };
    // CRC-32 field of the local header.
    bytes[offset + 14] = 0x55;
    let mut zip = ZipArchive::open(Cursor::new(bytes), OpenMode::Read, Config::default()).unwrap();
    assert!(matches!(
        zip.read_entry_to_vec("stored.txt"),
        Err(ZipError::InvalidArchive(_))
    ));
}

#[test]
fn descriptor_flag_is_per_entry() {
    let mut zip = ZipArchive::create(Cursor::new(Vec::new()), Config::default()).unwrap();
    let with = zip.config().entry_options().data_descriptor(true);
    zip.add_entry_with_content(ZipEntry::new("with", &with).unwrap(), b"1".as_slice())
        .unwrap();
    zip.add_text_entry("without", "2").unwrap();
    let bytes = zip.close().unwrap().into_inner();
    let mut zip = ZipArchive::open(Cursor::new(bytes), OpenMode::Read, Config::default()).unwrap();
    assert!(zip.entry("with").unwrap().has_data_descriptor());
    assert!(!zip.entry("without").unwrap().has_data_descriptor());
    assert_eq!(zip.read_text_entry("with").unwrap(), "1");
    assert_eq!(zip.read_text_entry("without").unwrap(), "2");
}
