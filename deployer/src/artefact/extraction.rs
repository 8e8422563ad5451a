//! Reading packaged archives back.
//!
//! Used to verify a freshly written archive and to unpack one locally with
//! the same semantics the remote extraction program has: every entry lands
//! relative to the destination directory. Entry paths are checked for
//! traversal before anything is written (zip-slip).

use std::fs;
use std::io::{Read, Seek};
use std::path::{Component, Path};

/// Errors arising from reading or unpacking an archive.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// I/O error during extraction.
    #[error("extraction I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The zip container is malformed.
    #[error("cannot read archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// A path in the archive attempts to traverse outside the destination.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The offending path from the archive entry.
        path: String,
    },
}

/// One decoded archive entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveEntry {
    /// A directory, path without trailing `/`.
    Directory(String),
    /// A regular file and its bytes.
    File {
        /// Relative path using `/` separators.
        path: String,
        /// Uncompressed contents.
        contents: Vec<u8>,
    },
}

impl ArchiveEntry {
    /// Relative path of the entry.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Directory(path) | Self::File { path, .. } => path,
        }
    }
}

/// Decode every entry of a zip archive.
///
/// # Errors
///
/// Returns [`ExtractionError::PathTraversal`] for absolute or `..` entry
/// names, or an archive/I/O error for malformed input.
pub fn read_entries<R: Read + Seek>(reader: R) -> Result<Vec<ArchiveEntry>, ExtractionError> {
    let mut archive = zip::ZipArchive::new(reader)?;
    let mut entries = Vec::with_capacity(archive.len());

    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        let name = file.name().to_owned();
        validate_entry_path(Path::new(&name))?;

        if file.is_dir() {
            entries.push(ArchiveEntry::Directory(name.trim_end_matches('/').to_owned()));
        } else {
            let mut contents = Vec::new();
            file.read_to_end(&mut contents)?;
            entries.push(ArchiveEntry::File {
                path: name,
                contents,
            });
        }
    }

    Ok(entries)
}

/// Count the entries of the archive at `path` without decompressing them.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or is not a zip archive.
pub fn count_entries(path: &Path) -> Result<usize, ExtractionError> {
    let file = fs::File::open(path)?;
    let archive = zip::ZipArchive::new(file)?;
    Ok(archive.len())
}

/// Unpack the archive at `archive_path` into `dest_dir`.
///
/// Returns the relative paths of the files written.
///
/// # Errors
///
/// Returns [`ExtractionError::PathTraversal`] if any entry attempts to
/// escape the destination directory, or an I/O/archive error.
pub fn extract_to_dir(archive_path: &Path, dest_dir: &Path) -> Result<Vec<String>, ExtractionError> {
    let file = fs::File::open(archive_path)?;
    let entries = read_entries(file)?;
    let mut written = Vec::new();

    for entry in entries {
        match entry {
            ArchiveEntry::Directory(path) => fs::create_dir_all(dest_dir.join(&path))?,
            ArchiveEntry::File { path, contents } => {
                let dest_path = dest_dir.join(&path);
                if let Some(parent) = dest_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&dest_path, contents)?;
                written.push(path);
            }
        }
    }

    Ok(written)
}

/// Validate that an entry path does not escape the destination directory
/// via `..` components or absolute paths.
fn validate_entry_path(path: &Path) -> Result<(), ExtractionError> {
    let escapes = path.is_absolute()
        || path.to_string_lossy().starts_with('/')
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)));
    if escapes {
        return Err(ExtractionError::PathTraversal {
            path: path.display().to_string(),
        });
    }
    Ok(())
}
