use std::io::Cursor;

use zipcore::extra_fields::{ExtraField, Ntfs};
use zipcore::result::ZipError;
use zipcore::{
    CompressionMethod, Config, DateTime, DeflateStrategy, EntryOptions, OpenMode, ZipArchive,
    ZipEntry,
};

fn source() -> Vec<u8> {
    let mut zip = ZipArchive::create(Cursor::new(Vec::new()), Config::default()).unwrap();
    let time = DateTime::from_date_and_time(2020, 6, 1, 12, 0, 0).unwrap();
    let options = EntryOptions::default()
        .last_modified_time(time)
        .comment("from the source")
        .deflate_strategy(DeflateStrategy::Maximum)
        .extra_fields(vec![ExtraField::Ntfs(Ntfs::new(1, 2, 3))]);
    let alpha = "alpha".repeat(1000);
    zip.add_entry_with_content(ZipEntry::new("a.txt", &options).unwrap(), alpha.as_bytes())
        .unwrap();
    let stored = options.clone().compression_method(CompressionMethod::Stored);
    zip.add_entry_with_content(ZipEntry::new("b.bin", &stored).unwrap(), [1u8, 2, 3].as_slice())
        .unwrap();
    zip.add_text_entry("skip/c.txt", "gamma").unwrap();
    zip.close().unwrap().into_inner()
}

fn destination() -> ZipArchive<Cursor<Vec<u8>>> {
    let mut zip = ZipArchive::create(Cursor::new(Vec::new()), Config::default().buffer_size(64))
        .unwrap();
    zip.add_text_entry("existing.txt", "here first").unwrap();
    zip
}

#[test]
fn merge_copies_filtered_entries() {
    let mut zip = destination();
    let copied = zip
        .merge(Cursor::new(source()), |entry| !entry.name().starts_with("skip/"))
        .unwrap();
    assert_eq!(copied, 2);
    let bytes = zip.close().unwrap().into_inner();

    let mut zip = ZipArchive::open(Cursor::new(bytes), OpenMode::Read, Config::default()).unwrap();
    assert_eq!(
        zip.file_names().collect::<Vec<_>>(),
        ["existing.txt", "a.txt", "b.bin"]
    );

    let a = zip.entry("a.txt").unwrap();
    assert_eq!(a.comment(), "from the source");
    assert_eq!(a.last_modified(), DateTime::from_date_and_time(2020, 6, 1, 12, 0, 0).unwrap());
    assert_eq!(a.compression_method(), CompressionMethod::Deflated);
    assert!(a.flags().is_deflate_max());
    assert_eq!(a.ntfs().unwrap(), Some(Ntfs::new(1, 2, 3)));

    let b = zip.entry("b.bin").unwrap();
    assert_eq!(b.compression_method(), CompressionMethod::Stored);

    assert_eq!(zip.read_text_entry("a.txt").unwrap(), "alpha".repeat(1000));
    assert_eq!(zip.read_entry_to_vec("b.bin").unwrap(), [1, 2, 3]);
    assert_eq!(zip.read_text_entry("existing.txt").unwrap(), "here first");
}

#[test]
fn merge_rejects_duplicates_before_writing() {
    let mut zip = destination();
    zip.add_text_entry("b.bin", "clash").unwrap();
    let err = zip.merge(Cursor::new(source()), |_| true).unwrap_err();
    assert!(matches!(err, ZipError::InvalidArgument(_)));
    assert_eq!(zip.file_names().collect::<Vec<_>>(), ["existing.txt", "b.bin"]);
}

#[test]
fn merge_reports_source_integrity_errors() {
    let mut bytes = source();
    let offset = {
        let zip = ZipArchive::open(Cursor::new(bytes.clone()), OpenMode::Read, Config::default())
            .unwrap();
        let entry = zip.entry("b.bin").unwrap();
        entry.header_offset() as usize + 30 + entry.name_raw().len()
    };
    bytes[offset] ^= 0xff;

    let mut zip = destination();
    let err = zip
        .merge(Cursor::new(bytes), |entry| entry.name() == "b.bin")
        .unwrap_err();
    assert!(err.is_integrity_error());
    // The half-copied entry does not reach the table.
    assert_eq!(zip.file_names().collect::<Vec<_>>(), ["existing.txt"]);
}

#[test]
fn merge_into_a_read_only_archive_fails() {
    let mut zip =
        ZipArchive::open(Cursor::new(source()), OpenMode::Read, Config::default()).unwrap();
    assert!(matches!(
        zip.merge(Cursor::new(source()), |_| true),
        Err(ZipError::InvalidArgument(_))
    ));
}
