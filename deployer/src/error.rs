//! Stage-tagged errors for a deployment run.
//!
//! Every failure is wrapped in a [`DeployError`] that records which pipeline
//! stage was active, so the operator always learns where a run stopped. No
//! stage retries; each error aborts the run.

use crate::artefact::packaging_error::PackagingError;
use crate::bridge::trigger::TriggerError;
use crate::transport::{ConnectionError, TransferError};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// A pipeline stage that can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Building the local archive.
    Packaging,
    /// Opening and authenticating the transport session.
    Connecting,
    /// Emptying the remote directory.
    Clearing,
    /// Uploading the archive.
    Uploading,
    /// Uploading and firing the extraction program.
    Triggering,
}

impl Stage {
    /// Lower-case stage name as shown to the operator.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Packaging => "packaging",
            Self::Connecting => "connecting",
            Self::Clearing => "clearing",
            Self::Uploading => "uploading",
            Self::Triggering => "triggering",
        }
    }

    /// Whether a failure in this stage may have left files on the remote host.
    #[must_use]
    pub fn may_leave_remote_residue(self) -> bool {
        matches!(self, Self::Clearing | Self::Uploading | Self::Triggering)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed deployment, tagged with the stage that failed.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The local archive could not be produced.
    #[error("{stage} failed: {source}")]
    Packaging {
        /// Always [`Stage::Packaging`].
        stage: Stage,
        /// Underlying cause.
        #[source]
        source: PackagingError,
    },

    /// The transport session could not be opened.
    #[error("{stage} failed: {source}")]
    Connection {
        /// Always [`Stage::Connecting`].
        stage: Stage,
        /// Underlying cause.
        #[source]
        source: ConnectionError,
    },

    /// A remote file operation failed.
    #[error("{stage} failed: {source}")]
    Transfer {
        /// The stage that issued the operation.
        stage: Stage,
        /// Underlying cause.
        #[source]
        source: TransferError,
    },

    /// The extraction trigger failed or returned an unexpected response.
    #[error("{stage} failed: {source}")]
    Trigger {
        /// Always [`Stage::Triggering`].
        stage: Stage,
        /// Underlying cause.
        #[source]
        source: TriggerError,
    },
}

impl DeployError {
    /// Wrap a packaging failure.
    #[must_use]
    pub fn packaging(source: PackagingError) -> Self {
        Self::Packaging {
            stage: Stage::Packaging,
            source,
        }
    }

    /// Wrap a session-open failure.
    #[must_use]
    pub fn connection(source: ConnectionError) -> Self {
        Self::Connection {
            stage: Stage::Connecting,
            source,
        }
    }

    /// Wrap a remote file operation failure raised during `stage`.
    #[must_use]
    pub fn transfer(stage: Stage, source: TransferError) -> Self {
        Self::Transfer { stage, source }
    }

    /// Wrap an extraction trigger failure.
    #[must_use]
    pub fn trigger(source: TriggerError) -> Self {
        Self::Trigger {
            stage: Stage::Triggering,
            source,
        }
    }

    /// The stage that failed.
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::Packaging { stage, .. }
            | Self::Connection { stage, .. }
            | Self::Transfer { stage, .. }
            | Self::Trigger { stage, .. } => *stage,
        }
    }

    /// Short name of the error family (`PackagingError`, `ConnectionError`, ...).
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Packaging { .. } => "PackagingError",
            Self::Connection { .. } => "ConnectionError",
            Self::Transfer { .. } => "TransferError",
            Self::Trigger { .. } => "TriggerError",
        }
    }

    /// Body returned by the extraction trigger, when one was received.
    #[must_use]
    pub fn response_body(&self) -> Option<&str> {
        match self {
            Self::Trigger { source, .. } => source.response_body(),
            _ => None,
        }
    }
}

/// Result type alias using [`DeployError`].
pub type Result<T> = std::result::Result<T, DeployError>;
