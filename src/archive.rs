//! The archive orchestrator: opens an archive, keeps the entry table and rewrites the central
//! directory.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Cursor, SeekFrom, prelude::*};
use std::path::Path;
use std::sync::mpsc;
use std::thread;

use indexmap::IndexMap;

use crate::compression::{CompressionMethod, CountingWriter};
use crate::config::{Config, OpenMode};
use crate::crc32::Crc32Reader;
use crate::directory::{CentralDirectoryRecord, DataDescriptor, LocalFileHeader};
use crate::entry::ZipEntry;
use crate::extra_fields::ExtraField;
use crate::result::{ZipError, ZipResult, invalid, invalid_argument};
use crate::spec::{
    CentralDirectoryEnd, MAX_COMMENT_LEN, ZIP64_BYTES_THR, ZIP64_ENTRY_THR,
    Zip32CentralDirectoryEnd, Zip64CentralDirectoryEnd, Zip64CentralDirectoryEndLocator,
};
use crate::types::{DEFAULT_VERSION, System, Version};

/// Chunks the merge producer may run ahead of the consumer.
const MERGE_CHANNEL_BOUND: usize = 4;

/// Random access storage an archive lives in.
///
/// Besides reading, writing and seeking, the archive must be able to drop stale bytes past the
/// end of a rewritten central directory.
pub trait RawFile: Read + Write + Seek {
    fn set_len(&mut self, len: u64) -> io::Result<()>;
}

impl RawFile for File {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }
}

impl RawFile for Cursor<Vec<u8>> {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len).map_err(io::Error::other)?;
        self.get_mut().resize(len, 0);
        Ok(())
    }
}

impl RawFile for Cursor<&mut Vec<u8>> {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len).map_err(io::Error::other)?;
        self.get_mut().resize(len, 0);
        Ok(())
    }
}

impl<T: RawFile + ?Sized> RawFile for &mut T {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        (**self).set_len(len)
    }
}

/// ZIP archive reader and writer
///
/// ```no_run
/// use std::io::prelude::*;
/// fn list_zip_contents(path: &std::path::Path) -> zipcore::result::ZipResult<()> {
///     use zipcore::{Config, OpenMode, ZipArchive};
///
///     let mut zip = ZipArchive::open_path(path, OpenMode::Read, Config::default())?;
///
///     let names: Vec<String> = zip.file_names().map(str::to_owned).collect();
///     for name in names {
///         let content = zip.read_entry_to_vec(&name)?;
///         println!("Filename: {name}, {} bytes", content.len());
///     }
///
///     Ok(())
/// }
/// ```
///
/// Changes made in [`OpenMode::Write`] only reach the central directory on disk when
/// [`ZipArchive::finish`] or [`ZipArchive::close`] runs. Entry data added before that goes
/// past the existing directory, so an interrupted session leaves the previous directory
/// readable.
#[derive(Debug)]
pub struct ZipArchive<F> {
    file: F,
    mode: OpenMode,
    config: Config,
    entries: IndexMap<Box<str>, ZipEntry>,
    comment: Box<[u8]>,
    zip64: bool,
    /// End of the last entry's data. The next central directory starts here.
    end_of_data: u64,
    /// End of the directory currently on disk. New entry data never goes below it.
    directory_end: u64,
    pending: bool,
    /// Local header lengths of entries written by this instance, rewritten by `finish`.
    written: HashMap<Box<str>, usize>,
}

fn clamp_capacity(count: u64, directory_size: u64) -> usize {
    let max_records = directory_size / CentralDirectoryRecord::FIXED_LEN as u64;
    usize::try_from(count.min(max_records)).unwrap_or(usize::MAX)
}

impl<F: RawFile> ZipArchive<F> {
    /// Open an archive held in `file`.
    ///
    /// An empty file is an error in [`OpenMode::Read`] and a fresh archive with pending
    /// changes in [`OpenMode::Write`].
    pub fn open(mut file: F, mode: OpenMode, config: Config) -> ZipResult<Self> {
        let file_length = file.seek(SeekFrom::End(0))?;
        if file_length == 0 {
            if mode == OpenMode::Read {
                invalid!("empty archive");
            }
            log::debug!("Starting a new archive");
            return Ok(Self {
                file,
                mode,
                zip64: config.is_zip64(),
                config,
                entries: IndexMap::new(),
                comment: Box::new([]),
                end_of_data: 0,
                directory_end: 0,
                pending: true,
                written: HashMap::new(),
            });
        }

        let (zip32, cde_pos) =
            Zip32CentralDirectoryEnd::find_and_parse(&mut file, file_length, config.chunk_size())?;
        let zip64 = if zip32.is_zip64() {
            Self::read_zip64_end(&mut file, cde_pos)?
        } else {
            None
        };
        let end = CentralDirectoryEnd::promote(zip32, zip64);
        if end.is_multi_disk() {
            return Err(ZipError::UnsupportedArchive(
                "Multi-disk archives are not supported".into(),
            ));
        }
        let directory_start = end.central_directory_offset;
        if directory_start
            .checked_add(end.central_directory_size)
            .is_none_or(|directory_end| directory_end > cde_pos)
        {
            invalid!(
                "Central directory at {} ({} bytes) runs past its end record at {}",
                directory_start,
                end.central_directory_size,
                cde_pos
            );
        }

        file.seek(SeekFrom::Start(directory_start))?;
        let mut entries = IndexMap::with_capacity(clamp_capacity(
            end.number_of_files,
            end.central_directory_size,
        ));
        {
            let mut reader = BufReader::with_capacity(config.chunk_size(), &mut file);
            for _ in 0..end.number_of_files {
                let entry = ZipEntry::from_record(CentralDirectoryRecord::parse(&mut reader)?)?;
                log::trace!(
                    "Entry {} at {}: {} -> {} bytes",
                    entry.name(),
                    entry.header_offset(),
                    entry.size(),
                    entry.compressed_size()
                );
                let name: Box<str> = entry.name().into();
                if entries.insert(name, entry).is_some() {
                    log::warn!("Duplicate entry name in central directory; keeping the last one");
                }
            }
        }
        log::debug!(
            "Opened archive: {} entries, directory at {}, zip64 {}",
            entries.len(),
            directory_start,
            end.is_zip64
        );

        Ok(Self {
            file,
            mode,
            zip64: config.is_zip64() || end.is_zip64,
            config,
            entries,
            comment: end.comment,
            end_of_data: directory_start,
            directory_end: file_length,
            pending: false,
            written: HashMap::new(),
        })
    }

    /// Follow the locator that precedes a sentinel end record. An archive with exactly 65535
    /// entries carries a sentinel count without being ZIP64, so a missing locator is not an
    /// error.
    fn read_zip64_end(file: &mut F, cde_pos: u64) -> ZipResult<Option<Zip64CentralDirectoryEnd>> {
        let Some(locator_pos) = cde_pos.checked_sub(Zip64CentralDirectoryEndLocator::LEN as u64)
        else {
            log::debug!("No room for a ZIP64 locator before the end record");
            return Ok(None);
        };
        file.seek(SeekFrom::Start(locator_pos))?;
        let locator = match Zip64CentralDirectoryEndLocator::parse(file) {
            Ok(locator) => locator,
            Err(ZipError::InvalidArchive(_)) => {
                log::debug!("End record holds sentinels but no ZIP64 locator precedes it");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        if locator.number_of_disks > 1 {
            return Err(ZipError::UnsupportedArchive(
                "Multi-disk archives are not supported".into(),
            ));
        }
        let zip64_pos = locator.end_of_central_directory_offset;
        if zip64_pos.saturating_add(Zip64CentralDirectoryEnd::LEN as u64) > locator_pos {
            invalid!("ZIP64 end of central directory offset {} is out of range", zip64_pos);
        }
        file.seek(SeekFrom::Start(zip64_pos))?;
        Ok(Some(Zip64CentralDirectoryEnd::parse(file)?))
    }

    /// Start a new archive in `file`, discarding whatever it held.
    pub fn create(mut file: F, config: Config) -> ZipResult<Self> {
        file.set_len(0)?;
        Self::open(file, OpenMode::Write, config)
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether the archive is written with ZIP64 end records.
    pub fn is_zip64(&self) -> bool {
        self.zip64
    }

    /// Number of entries contained in this zip.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether this zip archive contains no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in directory order.
    pub fn entries(&self) -> impl Iterator<Item = &ZipEntry> {
        self.entries.values()
    }

    pub fn entry(&self, name: &str) -> Option<&ZipEntry> {
        self.entries.get(name)
    }

    /// Returns an iterator over all the file and directory names in this archive.
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(Box::as_ref)
    }

    /// Get the comment of the zip archive.
    pub fn comment(&self) -> &[u8] {
        &self.comment
    }

    /// Set the archive comment, written by the next [`ZipArchive::finish`].
    pub fn set_comment(&mut self, comment: impl Into<Box<[u8]>>) -> ZipResult<()> {
        self.ensure_writable()?;
        let comment = comment.into();
        if comment.len() > MAX_COMMENT_LEN {
            return invalid_argument(format!(
                "archive comment is {} bytes, at most {MAX_COMMENT_LEN} fit",
                comment.len()
            ));
        }
        self.comment = comment;
        self.pending = true;
        Ok(())
    }

    /// Whether there are changes not yet written by [`ZipArchive::finish`].
    pub fn has_pending_changes(&self) -> bool {
        self.pending
    }

    fn ensure_writable(&self) -> ZipResult<()> {
        match self.mode {
            OpenMode::Write => Ok(()),
            OpenMode::Read => invalid_argument("archive is open for reading only"),
        }
    }

    /// Add an entry without content.
    pub fn add_entry(&mut self, entry: ZipEntry) -> ZipResult<()> {
        self.add_entry_with_content(entry, io::empty())
    }

    /// Add a UTF-8 text entry with this archive's default entry options.
    pub fn add_text_entry(&mut self, name: &str, text: &str) -> ZipResult<()> {
        let entry = ZipEntry::new(name, &self.config.entry_options())?;
        self.add_entry_with_content(entry, text.as_bytes())
    }

    /// Add a directory. A trailing `/` is appended when missing.
    pub fn add_directory(&mut self, name: &str) -> ZipResult<()> {
        let name = if name.ends_with('/') {
            name.to_owned()
        } else {
            format!("{name}/")
        };
        let options = self
            .config
            .entry_options()
            .compression_method(CompressionMethod::Stored);
        self.add_entry(ZipEntry::new(&name, &options)?)
    }

    /// Add `entry`, streaming its content from `content`.
    ///
    /// The local header goes at the end of the entry data, followed by the compressed content
    /// and, if the entry's flags ask for one, a data descriptor. On any failure the file
    /// position is restored and the entry table is left as it was. Without ZIP64, content,
    /// compressed data or a header offset that does not fit 32 bits fails with
    /// [`ZipError::EntryTooLarge`].
    pub fn add_entry_with_content<R: Read>(
        &mut self,
        entry: ZipEntry,
        content: R,
    ) -> ZipResult<()> {
        self.ensure_writable()?;
        if self.entries.contains_key(entry.name()) {
            return invalid_argument(format!("duplicate entry name {}", entry.name()));
        }
        let entry = if self.zip64 {
            entry.prepare_zip64()
        } else {
            entry
        };
        let position = self.end_of_data.max(self.directory_end);
        if !self.zip64 && position >= ZIP64_BYTES_THR {
            return Err(ZipError::EntryTooLarge {
                name: entry.name().into(),
                size: position,
            });
        }
        let header = entry.local_directory()?.encode()?;

        match self.write_entry(entry, &header, position, content) {
            Ok((entry, end)) => {
                log::trace!(
                    "Added {} at {}: {} -> {} bytes",
                    entry.name(),
                    position,
                    entry.size(),
                    entry.compressed_size()
                );
                let name: Box<str> = entry.name().into();
                self.written.insert(name.clone(), header.len());
                self.entries.insert(name, entry);
                self.end_of_data = end;
                self.pending = true;
                Ok(())
            }
            Err(e) => {
                self.rollback(position);
                Err(e)
            }
        }
    }

    /// Write the header, content and descriptor of `entry` at `position`. Returns the updated
    /// entry and the position just past its data.
    fn write_entry<R: Read>(
        &mut self,
        entry: ZipEntry,
        header: &[u8],
        position: u64,
        content: R,
    ) -> ZipResult<(ZipEntry, u64)> {
        let zip64 = self.zip64;
        let chunk = self.config.chunk_size();
        let too_large = |size: u64| ZipError::EntryTooLarge {
            name: entry.name().into(),
            size,
        };

        self.file.seek(SeekFrom::Start(position))?;
        self.file.write_all(header)?;

        let mut source = Crc32Reader::new(content);
        let mut compressor = entry
            .codec()
            .compressor(CountingWriter::new(BufWriter::with_capacity(chunk, &mut self.file)));
        let mut buffer = vec![0; chunk];
        loop {
            let read = match source.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            compressor.write_all(&buffer[..read])?;
            if !zip64 && source.bytes_read() >= ZIP64_BYTES_THR {
                return Err(too_large(source.bytes_read()));
            }
        }
        let counter = compressor.finish()?;
        let compressed_size = counter.count();
        counter
            .into_inner()
            .into_inner()
            .map_err(io::IntoInnerError::into_error)?;
        if !zip64 && compressed_size >= ZIP64_BYTES_THR {
            return Err(too_large(compressed_size));
        }

        let crc32 = source.crc32();
        let uncompressed_size = source.bytes_read();
        let entry =
            entry.update_directory(zip64, compressed_size, uncompressed_size, crc32, position)?;
        let mut end = position + header.len() as u64 + compressed_size;
        if entry.has_data_descriptor() {
            let wide = entry.has_zip64_descriptor();
            DataDescriptor {
                crc32,
                compressed_size,
                uncompressed_size,
            }
            .write(&mut self.file, wide)?;
            end += DataDescriptor::len(wide) as u64;
        }
        Ok((entry, end))
    }

    /// Drop whatever a failed add wrote past `position`.
    fn rollback(&mut self, position: u64) {
        if let Err(e) = self
            .file
            .seek(SeekFrom::Start(position))
            .and_then(|_| self.file.set_len(position))
        {
            log::warn!("Could not discard a failed entry write at {position}: {e}");
        }
    }

    /// Remove an entry from the table. Its bytes stay in the file until the directory is
    /// rewritten without it.
    pub fn remove_entry(&mut self, name: &str) -> ZipResult<ZipEntry> {
        self.ensure_writable()?;
        let Some(entry) = self.entries.shift_remove(name) else {
            return Err(ZipError::FileNotFound(name.into()));
        };
        self.written.remove(name);
        self.pending = true;
        Ok(entry)
    }

    /// Stream the decompressed content of entry `name` into `sink`.
    ///
    /// `sink` receives the content in chunks along with a flag that is true for exactly one
    /// call, the one completing the size recorded in the directory. An empty entry produces a
    /// single empty chunk. Errors returned by `sink` stop the read and are returned unchanged.
    ///
    /// When the entry has a data descriptor, its values are checked against the directory.
    /// The CRC and size of the decompressed content are checked last.
    pub fn read_entry<S>(&mut self, name: &str, mut sink: S) -> ZipResult<()>
    where
        S: FnMut(&[u8], bool) -> ZipResult<()>,
    {
        let Some(entry) = self.entries.get(name) else {
            return Err(ZipError::FileNotFound(name.into()));
        };
        let entry = entry.clone();
        if entry.flags().is_encrypted() {
            return Err(ZipError::UnsupportedArchive(
                format!("{name} is encrypted").into(),
            ));
        }
        let expected = entry.size();
        let chunk = self.config.chunk_size();

        self.file.seek(SeekFrom::Start(entry.header_offset()))?;
        let mut buffered = BufReader::with_capacity(chunk, &mut self.file);
        let local = LocalFileHeader::parse(&mut buffered)?;
        if entry.has_data_descriptor() && !local.has_data_descriptor() {
            invalid!(
                "{} expects a data descriptor but its local header carries CRC and sizes",
                name
            );
        }
        let data_start = entry.header_offset() + local.len() as u64;

        let mut reader = Crc32Reader::new(
            entry
                .codec()
                .decompressor((&mut buffered).take(entry.compressed_size())),
        );
        let mut buffer = vec![0; chunk];
        let mut total = 0u64;
        loop {
            let read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            total += read as u64;
            if total > expected {
                total += io::copy(&mut reader, &mut io::sink())?;
                return Err(ZipError::SizeMismatch {
                    name: name.into(),
                    field: "uncompressed size",
                    expected,
                    actual: total,
                });
            }
            sink(&buffer[..read], total == expected)?;
        }
        if expected == 0 {
            sink(&[], true)?;
        }
        let crc32 = reader.crc32();
        drop(reader);

        if entry.has_data_descriptor() {
            buffered.seek(SeekFrom::Start(data_start + entry.compressed_size()))?;
            let wide = entry.record().common.is_zip64()
                || local.extra_fields()?.iter().any(ExtraField::is_zip64);
            let descriptor = DataDescriptor::parse(&mut buffered, wide)?;
            if descriptor.crc32 != entry.crc32() {
                return Err(ZipError::ChecksumMismatch {
                    name: name.into(),
                    expected: entry.crc32(),
                    actual: descriptor.crc32,
                });
            }
            for (field, expected, actual) in [
                ("compressed size", entry.compressed_size(), descriptor.compressed_size),
                ("uncompressed size", entry.size(), descriptor.uncompressed_size),
            ] {
                if expected != actual {
                    return Err(ZipError::SizeMismatch {
                        name: name.into(),
                        field,
                        expected,
                        actual,
                    });
                }
            }
        }

        if total != expected {
            return Err(ZipError::SizeMismatch {
                name: name.into(),
                field: "uncompressed size",
                expected,
                actual: total,
            });
        }
        if crc32 != entry.crc32() {
            return Err(ZipError::ChecksumMismatch {
                name: name.into(),
                expected: entry.crc32(),
                actual: crc32,
            });
        }
        Ok(())
    }

    /// Read the whole content of entry `name`.
    pub fn read_entry_to_vec(&mut self, name: &str) -> ZipResult<Vec<u8>> {
        let capacity = self
            .entry(name)
            .map_or(0, |entry| usize::try_from(entry.size()).unwrap_or(0));
        let mut content = Vec::with_capacity(capacity.min(1 << 24));
        self.read_entry(name, |chunk, _| {
            content.extend_from_slice(chunk);
            Ok(())
        })?;
        Ok(content)
    }

    /// Read entry `name` as UTF-8 text.
    pub fn read_text_entry(&mut self, name: &str) -> ZipResult<String> {
        String::from_utf8(self.read_entry_to_vec(name)?).map_err(|e| {
            ZipError::InvalidArgument(format!("{name} is not UTF-8 text: {e}").into())
        })
    }

    /// Copy the entries of the archive in `source` that `filter` accepts into this archive.
    ///
    /// Each copied entry keeps its name, comment, timestamp, permissions, compression method
    /// and extra fields. Content is decompressed from the source by a producer thread and
    /// handed over through a bounded channel, then compressed again on the way in. Returns
    /// the number of entries copied.
    pub fn merge<S, P>(&mut self, source: S, mut filter: P) -> ZipResult<usize>
    where
        S: RawFile + Send,
        P: FnMut(&ZipEntry) -> bool,
    {
        self.ensure_writable()?;
        let mut source = ZipArchive::open(source, OpenMode::Read, self.config.clone())?;
        let selected: Vec<ZipEntry> = source
            .entries()
            .filter(|entry| filter(entry))
            .cloned()
            .collect();
        if let Some(duplicate) = selected.iter().find(|e| self.entries.contains_key(e.name())) {
            return invalid_argument(format!("duplicate entry name {}", duplicate.name()));
        }
        log::debug!("Merging {} of {} entries", selected.len(), source.len());

        for original in &selected {
            let entry = self.merged_entry(original)?;
            self.merge_one(&mut source, original.name(), entry)?;
        }
        Ok(selected.len())
    }

    fn merged_entry(&self, original: &ZipEntry) -> ZipResult<ZipEntry> {
        let mut options = self
            .config
            .entry_options()
            .compression_method(original.compression_method())
            .deflate_strategy(original.deflate_strategy())
            .last_modified_time(original.last_modified())
            .comment(original.comment())
            .extra_fields(original.extra_fields()?);
        if let Some(mode) = original.unix_mode() {
            options = options.unix_permissions(mode);
        }
        ZipEntry::new(original.name(), &options)
    }

    fn merge_one<S: RawFile + Send>(
        &mut self,
        source: &mut ZipArchive<S>,
        name: &str,
        entry: ZipEntry,
    ) -> ZipResult<()> {
        let (sender, receiver) = mpsc::sync_channel::<Option<Vec<u8>>>(MERGE_CHANNEL_BOUND);
        thread::scope(|scope| -> ZipResult<()> {
            let producer = thread::Builder::new()
                .name("zip-merge-producer".into())
                .spawn_scoped(scope, move || {
                    let mut hung_up = false;
                    let result = source.read_entry(name, |chunk, _| {
                        if sender.send(Some(chunk.to_vec())).is_err() {
                            hung_up = true;
                            return Err(io::Error::from(io::ErrorKind::BrokenPipe).into());
                        }
                        Ok(())
                    });
                    match result {
                        // The consumer stopped first and reports its own error.
                        Err(_) if hung_up => Ok(()),
                        Err(e) => Err(e),
                        Ok(()) => {
                            if sender.send(None).is_err() {
                                log::debug!("Merge consumer stopped before the end of {name}");
                            }
                            Ok(())
                        }
                    }
                })?;
            let added = self.add_entry_with_content(entry, ChannelReader::new(receiver));
            let produced = producer
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("merge producer panicked").into()));
            produced.and(added)
        })
    }

    /// Write the central directory and end records, then truncate the file after them.
    ///
    /// Does nothing unless there are pending changes. Local headers of entries added by this
    /// instance are rewritten with their final CRC and sizes.
    pub fn finish(&mut self) -> ZipResult<()> {
        if !self.pending {
            return Ok(());
        }
        let count = self.entries.len();
        if !self.zip64 && count > ZIP64_ENTRY_THR {
            return Err(ZipError::TooManyEntries(count));
        }
        let directory_start = self.end_of_data;
        let directory_size: u64 = self
            .entries
            .values()
            .map(|entry| entry.record().len() as u64)
            .sum();
        if !self.zip64 {
            for value in [directory_start, directory_size] {
                if value >= ZIP64_BYTES_THR {
                    return Err(ZipError::DirectoryTooLarge(value));
                }
            }
        }

        self.file.seek(SeekFrom::Start(directory_start))?;
        {
            let mut writer = BufWriter::with_capacity(self.config.chunk_size(), &mut self.file);
            for entry in self.entries.values() {
                entry.record().write(&mut writer)?;
            }
            writer.flush()?;
        }

        for (name, &header_len) in &self.written {
            let Some(entry) = self.entries.get(name) else {
                continue;
            };
            let header = entry.local_directory()?.encode()?;
            if header.len() != header_len {
                invalid!(
                    "Local header of {} changed from {} to {} bytes",
                    name,
                    header_len,
                    header.len()
                );
            }
            self.file.seek(SeekFrom::Start(entry.header_offset()))?;
            self.file.write_all(&header)?;
        }

        let directory_end = directory_start + directory_size;
        self.file.seek(SeekFrom::Start(directory_end))?;
        let comment = self.comment.clone();
        let footer = if self.zip64 {
            let version = Version::new(DEFAULT_VERSION / 10, DEFAULT_VERSION % 10, System::Unix);
            Zip64CentralDirectoryEnd {
                version_made_by: version.bits(),
                version_needed_to_extract: u16::from(DEFAULT_VERSION),
                disk_number: 0,
                disk_with_central_directory: 0,
                number_of_files_on_this_disk: count as u64,
                number_of_files: count as u64,
                central_directory_size: directory_size,
                central_directory_offset: directory_start,
                extensible_data_sector: Box::new([]),
            }
            .write(&mut self.file)?;
            Zip64CentralDirectoryEndLocator {
                disk_with_central_directory: 0,
                end_of_central_directory_offset: directory_end,
                number_of_disks: 1,
            }
            .write(&mut self.file)?;
            Zip32CentralDirectoryEnd::zip64_sentinel(comment)
        } else {
            Zip32CentralDirectoryEnd {
                disk_number: 0,
                disk_with_central_directory: 0,
                number_of_files_on_this_disk: count as u16,
                number_of_files: count as u16,
                central_directory_size: directory_size as u32,
                central_directory_offset: directory_start as u32,
                zip_file_comment: comment,
            }
        };
        footer.write(&mut self.file)?;

        let end = self.file.stream_position()?;
        self.file.flush()?;
        self.file.set_len(end)?;
        self.directory_end = end;
        self.written.clear();
        self.pending = false;
        log::debug!(
            "Wrote central directory: {count} entries at {directory_start}, archive ends at {end}"
        );
        Ok(())
    }

    /// Finish pending changes and return the underlying file.
    pub fn close(mut self) -> ZipResult<F> {
        self.finish()?;
        Ok(self.file)
    }

    /// Unwrap the underlying file without writing pending changes.
    pub fn into_inner(self) -> F {
        self.file
    }
}

impl ZipArchive<File> {
    /// Open the archive at `path`. In [`OpenMode::Write`] the file is created if missing.
    pub fn open_path<P: AsRef<Path>>(path: P, mode: OpenMode, config: Config) -> ZipResult<Self> {
        let file = match mode {
            OpenMode::Read => File::open(path)?,
            OpenMode::Write => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)?,
        };
        Self::open(file, mode, config)
    }
}

/// Content source fed by the merge producer. `None` marks the end of the entry; a closed
/// channel without it means the producer failed.
struct ChannelReader {
    receiver: mpsc::Receiver<Option<Vec<u8>>>,
    current: Vec<u8>,
    position: usize,
    done: bool,
}

impl ChannelReader {
    fn new(receiver: mpsc::Receiver<Option<Vec<u8>>>) -> Self {
        Self {
            receiver,
            current: Vec::new(),
            position: 0,
            done: false,
        }
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.position == self.current.len() {
            if self.done {
                return Ok(0);
            }
            match self.receiver.recv() {
                Ok(Some(chunk)) => {
                    self.current = chunk;
                    self.position = 0;
                }
                Ok(None) => self.done = true,
                Err(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "merge source stopped before the end of the entry",
                    ));
                }
            }
        }
        let available = &self.current[self.position..];
        let count = available.len().min(buf.len());
        buf[..count].copy_from_slice(&available[..count]);
        self.position += count;
        Ok(count)
    }
}
