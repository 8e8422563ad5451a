//! Remote file store access.
//!
//! The pipeline talks to the remote host only through the [`Connector`] and
//! [`RemoteStore`] traits so that tests can substitute an in-memory host.
//! The production implementation is FTP/FTPS ([`ftp`]); [`session`] wraps an
//! open store so that it is closed exactly once on every exit path.

pub mod ftp;
pub mod session;

use sitedrop::config::{RemoteEndpoint, Timeouts};
use std::fmt;
use std::path::{Path, PathBuf};

/// Opens authenticated sessions against a remote file store.
#[cfg_attr(test, mockall::automock)]
pub trait Connector {
    /// Connect and authenticate.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError`] for unreachable hosts, rejected
    /// credentials, TLS negotiation failures, or timeouts.
    fn open(
        &self,
        endpoint: &RemoteEndpoint,
        timeouts: &Timeouts,
    ) -> Result<Box<dyn RemoteStore>, ConnectionError>;
}

/// One live connection to the remote file store.
///
/// Operations take `&mut self`, so a store executes strictly one request at
/// a time in call order.
#[cfg_attr(test, mockall::automock)]
pub trait RemoteStore {
    /// Ensure `path` exists and delete everything below it.
    ///
    /// Deletion is best-effort: entries removed before a failure stay
    /// removed, but the failure is always returned.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError`] if any create, list, or delete is rejected.
    fn clear_directory(&mut self, path: &str) -> Result<(), TransferError>;

    /// Upload one local file to `remote_path`, creating parent directories
    /// and overwriting an existing file. Returns the bytes stored.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError`] on any failure; the remote content at
    /// `remote_path` must then be treated as unknown.
    fn upload_file(&mut self, local_path: &Path, remote_path: &str) -> Result<u64, TransferError>;

    /// List the direct children of `path`, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError`] if the listing is rejected.
    fn list_directory(&mut self, path: &str) -> Result<Option<Vec<RemoteEntry>>, TransferError>;

    /// Release the connection. Calling it again has no effect.
    fn close(&mut self);
}

/// Kind of a remote directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symlink or anything else.
    Other,
}

/// A direct child of a listed remote directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// Bare name, never `.` or `..`.
    pub name: String,
    /// Entry kind.
    pub kind: EntryKind,
}

impl RemoteEntry {
    /// Convenience constructor for a file entry.
    #[must_use]
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
        }
    }

    /// Convenience constructor for a directory entry.
    #[must_use]
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Directory,
        }
    }
}

/// A remote command, as named in errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOperation {
    /// Directory listing.
    List,
    /// Directory creation.
    MakeDir,
    /// File deletion.
    Delete,
    /// Directory removal.
    RemoveDir,
    /// File upload.
    Upload,
}

impl fmt::Display for RemoteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::List => "listing of",
            Self::MakeDir => "creation of",
            Self::Delete => "deletion of",
            Self::RemoveDir => "removal of directory",
            Self::Upload => "upload to",
        })
    }
}

/// Errors arising while opening a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// The host could not be resolved or refused the connection.
    #[error("cannot reach {address}: {reason}")]
    Unreachable {
        /// `host:port` that was dialled.
        address: String,
        /// Description of the failure.
        reason: String,
    },

    /// The host did not answer within the connect timeout.
    #[error("connection to {address} timed out after {seconds}s")]
    Timeout {
        /// `host:port` that was dialled.
        address: String,
        /// Timeout that elapsed.
        seconds: u64,
    },

    /// TLS could not be negotiated on the control channel.
    #[error("TLS negotiation with {host} failed: {reason}")]
    Security {
        /// Host name used for certificate validation.
        host: String,
        /// Description of the failure.
        reason: String,
    },

    /// The credentials were rejected.
    #[error("authentication failed for user {user}: {reason}")]
    Authentication {
        /// Login user.
        user: String,
        /// Server response.
        reason: String,
    },
}

/// Errors arising from remote file operations on an open session.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// The remote host refused or failed a command.
    #[error("remote host rejected {operation} {path}: {reason}")]
    Rejected {
        /// Command that failed.
        operation: RemoteOperation,
        /// Remote path involved.
        path: String,
        /// Server response or transport error.
        reason: String,
    },

    /// The local source file could not be read.
    #[error("cannot read local file {}", path.display())]
    LocalRead {
        /// Local path.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Fewer bytes reached the remote file than the local file holds.
    #[error("upload to {path} incomplete: {stored} of {expected} bytes stored")]
    Incomplete {
        /// Remote path.
        path: String,
        /// Bytes acknowledged by the remote host.
        stored: u64,
        /// Local file size.
        expected: u64,
    },

    /// A command did not complete within the transfer timeout.
    #[error("{operation} {path} timed out")]
    Timeout {
        /// Command that timed out.
        operation: RemoteOperation,
        /// Remote path involved.
        path: String,
    },

    /// The session was already closed.
    #[error("session is closed")]
    Closed,
}

/// Parent directory of an absolute remote path, with trailing `/`.
#[must_use]
pub fn remote_parent(path: &str) -> &str {
    match path.trim_end_matches('/').rfind('/') {
        Some(idx) => &path[..=idx],
        None => "/",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::nested("/site/app.zip", "/site/")]
    #[case::deep("/a/b/c.txt", "/a/b/")]
    #[case::root_file("/app.zip", "/")]
    #[case::relative("app.zip", "/")]
    fn parent_of_remote_path(#[case] path: &str, #[case] expected: &str) {
        assert_eq!(remote_parent(path), expected);
    }

    #[test]
    fn rejected_error_reads_naturally() {
        let err = TransferError::Rejected {
            operation: RemoteOperation::RemoveDir,
            path: "/site/assets".to_owned(),
            reason: "550 Directory not empty".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "remote host rejected removal of directory /site/assets: 550 Directory not empty"
        );
    }
}
