//! Error types for artifact packaging.
//!
//! Covers a missing or empty source tree, I/O and zip writer failures, and
//! the read-back check performed on every finished archive.

use std::path::PathBuf;
use thiserror::Error;

/// Errors arising while packaging a build directory.
#[derive(Debug, Error)]
pub enum PackagingError {
    /// An I/O operation failed (reading source files, writing the archive).
    #[error("I/O error during packaging: {0}")]
    Io(#[from] std::io::Error),

    /// The zip writer rejected an entry or failed to finalise.
    #[error("archive write failed: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// The source directory does not exist.
    #[error("source directory {} does not exist", .0.display())]
    SourceMissing(PathBuf),

    /// The source path exists but is not a directory.
    #[error("source path {} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    /// The source directory contains no files.
    #[error("source directory {} contains no files", .0.display())]
    EmptySource(PathBuf),

    /// A path below the source directory is not valid UTF-8.
    #[error("path {} is not valid UTF-8", .0.display())]
    NonUtf8Path(PathBuf),

    /// The finished archive could not be read back with the expected entries.
    #[error("archive verification failed: expected {expected} entries, found {found}")]
    Verification {
        /// Entries written.
        expected: usize,
        /// Entries read back.
        found: usize,
    },
}
