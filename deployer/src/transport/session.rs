//! Scoped transport session.
//!
//! A [`Session`] owns one open [`RemoteStore`] and closes it exactly once,
//! either through [`Session::close`] or when dropped on an error path.
//! Requests are issued one at a time because every operation borrows the
//! session mutably.

use super::{Connector, ConnectionError, RemoteEntry, RemoteStore, TransferError};
use serde::Serialize;
use sitedrop::config::{RemoteEndpoint, Timeouts};
use sitedrop::names::RemoteDir;
use std::path::Path;

/// A completed, size-checked upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    /// Remote path written.
    pub remote_path: String,
    /// Bytes stored remotely.
    pub bytes: u64,
}

/// An open, authenticated session against the remote file store.
pub struct Session {
    store: Option<Box<dyn RemoteStore>>,
}

impl Session {
    /// Open a session through `connector`.
    ///
    /// # Errors
    ///
    /// Returns the connector's [`ConnectionError`] unchanged.
    pub fn open(
        connector: &dyn Connector,
        endpoint: &RemoteEndpoint,
        timeouts: &Timeouts,
    ) -> Result<Self, ConnectionError> {
        let store = connector.open(endpoint, timeouts)?;
        Ok(Self { store: Some(store) })
    }

    /// Wrap an already opened store.
    #[must_use]
    pub fn from_store(store: Box<dyn RemoteStore>) -> Self {
        Self { store: Some(store) }
    }

    fn store(&mut self) -> Result<&mut (dyn RemoteStore + 'static), TransferError> {
        self.store.as_deref_mut().ok_or(TransferError::Closed)
    }

    /// Ensure `dir` exists and is empty.
    ///
    /// Running it against an already empty directory succeeds and changes
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError`] if any remote deletion fails. Entries
    /// removed before the failure stay removed.
    pub fn clear_remote_directory(&mut self, dir: &RemoteDir) -> Result<(), TransferError> {
        self.store()?.clear_directory(dir.as_str())
    }

    /// Upload `local_path` to `remote_path`, overwriting any existing file.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError`]; the remote file's content is then unknown.
    pub fn upload_file(
        &mut self,
        local_path: &Path,
        remote_path: &str,
    ) -> Result<UploadReceipt, TransferError> {
        let bytes = self.store()?.upload_file(local_path, remote_path)?;
        Ok(UploadReceipt {
            remote_path: remote_path.to_owned(),
            bytes,
        })
    }

    /// List the direct children of `dir`, or `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError`] if the listing is rejected.
    pub fn list(&mut self, dir: &RemoteDir) -> Result<Option<Vec<RemoteEntry>>, TransferError> {
        self.store()?.list_directory(dir.as_str())
    }

    /// Whether [`Session::close`] has already run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.store.is_none()
    }

    /// Release the connection. Later operations fail with
    /// [`TransferError::Closed`]; closing twice is a no-op.
    pub fn close(&mut self) {
        if let Some(mut store) = self.store.take() {
            store.close();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
