//! Filesystem helpers: zip up a directory tree, extract an archive into one.

use std::fs::{self, File};
use std::io::{self, prelude::*};
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::archive::{RawFile, ZipArchive};
use crate::compression::CompressionMethod;
use crate::config::{Config, EntryOptions};
use crate::entry::ZipEntry;
use crate::result::{ZipError, ZipResult, invalid, invalid_argument};
use crate::types::DateTime;

/// Archive name of `path` relative to `root`: components joined with `/`.
fn archive_name(root: &Path, path: &Path) -> ZipResult<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| ZipError::InvalidArgument(format!("{path:?} is outside {root:?}").into()))?;
    let mut name = String::new();
    for component in relative.components() {
        let Component::Normal(part) = component else {
            continue;
        };
        let Some(part) = part.to_str() else {
            return invalid_argument(format!("{relative:?} is a Non UTF-8 Path"));
        };
        if !name.is_empty() {
            name.push('/');
        }
        name.push_str(part);
    }
    Ok(name)
}

/// Write every directory and regular file below `src_dir` into a new archive in `file`.
///
/// Entries are added in traversal order, sorted by file name within each directory, so the
/// same tree always produces the same entry order. Directories are stored uncompressed; files
/// take their compression settings from `options` and, unless `options` fixes them, their
/// modification time and permissions from the filesystem. Symbolic links are skipped.
pub fn zip_directory<F: RawFile, P: AsRef<Path>>(
    src_dir: P,
    file: F,
    config: Config,
    options: &EntryOptions,
) -> ZipResult<F> {
    let src_dir = src_dir.as_ref();
    if !src_dir.is_dir() {
        return Err(ZipError::FileNotFound(src_dir.display().to_string().into()));
    }
    let mut zip = ZipArchive::create(file, config)?;

    for dir_entry in WalkDir::new(src_dir).min_depth(1).sort_by_file_name() {
        let dir_entry = dir_entry.map_err(io::Error::from)?;
        let path = dir_entry.path();
        let name = archive_name(src_dir, path)?;
        let metadata = dir_entry.metadata().map_err(io::Error::from)?;

        let mut entry_options = options.clone();
        if entry_options.last_modified_time.is_none() {
            if let Ok(modified) = metadata.modified() {
                entry_options =
                    entry_options.last_modified_time(DateTime::from_system_time_lossy(modified));
            }
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if entry_options.permissions.is_none() {
                entry_options = entry_options.unix_permissions(metadata.permissions().mode());
            }
        }

        let file_type = dir_entry.file_type();
        if file_type.is_dir() {
            log::trace!("adding dir {path:?} as {name}/");
            let entry_options = entry_options.compression_method(CompressionMethod::Stored);
            zip.add_entry(ZipEntry::new(&format!("{name}/"), &entry_options)?)?;
        } else if file_type.is_file() {
            log::trace!("adding file {path:?} as {name}");
            let entry = ZipEntry::new(&name, &entry_options)?;
            zip.add_entry_with_content(entry, File::open(path)?)?;
        } else {
            log::debug!("Skipping {path:?}: neither a directory nor a regular file");
        }
    }
    zip.close()
}

fn make_writable_dir_all<T: AsRef<Path>>(outpath: T) -> ZipResult<()> {
    fs::create_dir_all(outpath.as_ref())?;
    #[cfg(unix)]
    {
        // Dirs must be writable until all normal files are extracted
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(outpath.as_ref())?.permissions().mode();
        fs::set_permissions(outpath.as_ref(), fs::Permissions::from_mode(0o700 | mode))?;
    }
    Ok(())
}

impl<F: RawFile> ZipArchive<F> {
    /// Extract every entry into `directory`, creating it and any parent directories.
    ///
    /// Every name is checked before anything is written: a name that would land outside
    /// `directory` (absolute, or climbing out with `..`) fails the whole extraction with
    /// [`ZipError::InvalidArchive`]. On Unix, recorded permissions are applied once all
    /// content is written.
    pub fn extract_to_directory<P: AsRef<Path>>(&mut self, directory: P) -> ZipResult<()> {
        let directory = directory.as_ref();
        let mut targets = Vec::with_capacity(self.len());
        for entry in self.entries() {
            let Some(relative) = entry.enclosed_name() else {
                invalid!("Entry {} would extract outside the target directory", entry.name());
            };
            targets.push((entry.name().to_owned(), directory.join(relative), entry.unix_mode()));
        }

        make_writable_dir_all(directory)?;
        let mut files_by_unix_mode: Vec<(PathBuf, u32)> = Vec::new();
        for (name, outpath, mode) in targets {
            if name.ends_with('/') {
                make_writable_dir_all(&outpath)?;
            } else {
                if let Some(parent) = outpath.parent() {
                    make_writable_dir_all(parent)?;
                }
                let mut outfile = io::BufWriter::new(File::create(&outpath)?);
                self.read_entry(&name, |chunk, _| {
                    outfile.write_all(chunk)?;
                    Ok(())
                })?;
                outfile.flush()?;
            }
            if let Some(mode) = mode {
                files_by_unix_mode.push((outpath, mode));
            }
        }

        #[cfg(unix)]
        {
            use std::cmp::Reverse;
            use std::os::unix::fs::PermissionsExt;

            // Ensure we update children's permissions before making a parent unwritable
            files_by_unix_mode.sort_by_key(|(path, _)| Reverse(path.clone()));
            for (path, mode) in files_by_unix_mode {
                fs::set_permissions(&path, fs::Permissions::from_mode(mode & 0o7777))?;
            }
        }
        #[cfg(not(unix))]
        {
            drop(files_by_unix_mode);
        }

        log::debug!("Extracted {} entries to {directory:?}", self.len());
        Ok(())
    }
}
