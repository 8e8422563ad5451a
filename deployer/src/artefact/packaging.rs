//! Artifact packaging: turn a build directory into one zip archive.
//!
//! Entries keep their paths relative to the source directory, using `/`
//! separators. A destination inside the source tree is skipped so that
//! repeated runs do not nest old archives. On any failure the partially
//! written destination is removed before the error is returned, which keeps
//! retries idempotent.

use super::extraction::count_entries;
use super::packaging_error::PackagingError;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

/// A packaged build directory on local disk.
#[derive(Debug)]
pub struct Artifact {
    path: PathBuf,
    summary: ArtifactSummary,
}

/// Facts about an artifact reported to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactSummary {
    /// Archive file name.
    pub file_name: String,
    /// Number of files packaged.
    pub files: usize,
    /// Number of directory entries packaged.
    pub directories: usize,
    /// Archive size in bytes.
    pub bytes: u64,
    /// Lowercase hex SHA-256 of the archive.
    pub sha256: String,
}

impl Artifact {
    /// Path of the archive file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size, entry counts, and digest.
    #[must_use]
    pub fn summary(&self) -> &ArtifactSummary {
        &self.summary
    }

    /// Delete the local archive once it is no longer needed.
    ///
    /// A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns any other I/O error from the removal.
    pub fn discard(self) -> io::Result<()> {
        remove_if_present(&self.path)
    }
}

/// Compute the SHA-256 digest of a file as lowercase hex.
///
/// # Errors
///
/// Returns [`PackagingError::Io`] if the file cannot be read.
pub fn compute_sha256(path: &Path) -> Result<String, PackagingError> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Package `source` into a zip archive at `destination`.
///
/// Any existing file at `destination` is overwritten.
///
/// # Errors
///
/// Returns [`PackagingError::SourceMissing`], [`PackagingError::NotADirectory`]
/// or [`PackagingError::EmptySource`] for unusable sources, and I/O or
/// archive errors otherwise. No destination file is left behind on error.
pub fn package_directory(source: &Path, destination: &Path) -> Result<Artifact, PackagingError> {
    let excluded = fs::canonicalize(destination).ok();
    let mut partial = PartialArchive::new(destination);

    let metadata = match fs::metadata(source) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(PackagingError::SourceMissing(source.to_path_buf()));
        }
        Err(e) => return Err(PackagingError::Io(e)),
    };
    if !metadata.is_dir() {
        return Err(PackagingError::NotADirectory(source.to_path_buf()));
    }

    let entries = collect_entries(source, excluded.as_deref())?;
    let files = entries.iter().filter(|e| !e.is_dir).count();
    if files == 0 {
        return Err(PackagingError::EmptySource(source.to_path_buf()));
    }

    write_archive(destination, &entries)?;

    let found = count_entries(destination).map_err(|e| {
        log::debug!("archive read-back failed: {e}");
        PackagingError::Verification {
            expected: entries.len(),
            found: 0,
        }
    })?;
    if found != entries.len() {
        return Err(PackagingError::Verification {
            expected: entries.len(),
            found,
        });
    }

    let bytes = fs::metadata(destination)?.len();
    let sha256 = compute_sha256(destination)?;
    partial.keep();

    let summary = ArtifactSummary {
        file_name: destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        files,
        directories: entries.len() - files,
        bytes,
        sha256,
    };
    log::info!(
        "packaged {} file(s) from {} into {} ({} bytes, sha256 {})",
        summary.files,
        source.display(),
        destination.display(),
        summary.bytes,
        summary.sha256
    );

    Ok(Artifact {
        path: destination.to_path_buf(),
        summary,
    })
}

/// A file or directory found below the source directory.
#[derive(Debug)]
struct SourceEntry {
    /// Absolute or caller-relative path on disk.
    disk_path: PathBuf,
    /// Archive name with `/` separators.
    archive_name: String,
    is_dir: bool,
}

/// Walk `root` depth-first in name order, skipping `excluded`.
fn collect_entries(root: &Path, excluded: Option<&Path>) -> Result<Vec<SourceEntry>, PackagingError> {
    let mut entries = Vec::new();
    walk(root, "", excluded, &mut entries)?;
    Ok(entries)
}

fn walk(
    dir: &Path,
    prefix: &str,
    excluded: Option<&Path>,
    entries: &mut Vec<SourceEntry>,
) -> Result<(), PackagingError> {
    let mut children = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    children.sort_by_key(fs::DirEntry::file_name);

    for child in children {
        let disk_path = child.path();
        let name = child
            .file_name()
            .into_string()
            .map_err(|_| PackagingError::NonUtf8Path(disk_path.clone()))?;
        let archive_name = format!("{prefix}{name}");
        let metadata = fs::metadata(&disk_path)?;

        if metadata.is_dir() {
            entries.push(SourceEntry {
                disk_path: disk_path.clone(),
                archive_name: format!("{archive_name}/"),
                is_dir: true,
            });
            walk(&disk_path, &format!("{archive_name}/"), excluded, entries)?;
        } else {
            if is_excluded(&disk_path, excluded) {
                log::debug!("skipping destination archive {}", disk_path.display());
                continue;
            }
            entries.push(SourceEntry {
                disk_path,
                archive_name,
                is_dir: false,
            });
        }
    }
    Ok(())
}

fn is_excluded(path: &Path, excluded: Option<&Path>) -> bool {
    excluded.is_some_and(|target| fs::canonicalize(path).is_ok_and(|p| p == target))
}

fn write_archive(destination: &Path, entries: &[SourceEntry]) -> Result<(), PackagingError> {
    let output = fs::File::create(destination)?;
    let mut writer = zip::ZipWriter::new(output);
    let file_options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);
    let dir_options = SimpleFileOptions::default().unix_permissions(0o755);

    for entry in entries {
        if entry.is_dir {
            writer.add_directory(entry.archive_name.as_str(), dir_options)?;
        } else {
            let size = fs::metadata(&entry.disk_path)?.len();
            writer.start_file(
                entry.archive_name.as_str(),
                file_options.large_file(size >= u64::from(u32::MAX)),
            )?;
            let mut source = fs::File::open(&entry.disk_path)?;
            io::copy(&mut source, &mut writer)?;
        }
    }

    writer.finish()?;
    Ok(())
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Removes the destination on drop unless [`PartialArchive::keep`] was called.
struct PartialArchive<'a> {
    path: &'a Path,
    keep: bool,
}

impl<'a> PartialArchive<'a> {
    fn new(path: &'a Path) -> Self {
        Self { path, keep: false }
    }

    fn keep(&mut self) {
        self.keep = true;
    }
}

impl Drop for PartialArchive<'_> {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        if let Err(e) = remove_if_present(self.path) {
            log::warn!(
                "could not remove partial archive {}: {e}",
                self.path.display()
            );
        }
    }
}

#[cfg(test)]
#[path = "packaging_tests.rs"]
mod tests;
