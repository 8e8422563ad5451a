//! What a deployment run has left on the remote host.
//!
//! Derived by listing the remote base directory, so retries and resets can
//! reason about residue instead of assuming a clean slate.

use crate::transport::{EntryKind, RemoteEntry};
use serde::Serialize;
use sitedrop::names::{ArchiveName, ScriptName};
use std::fmt;

/// Observed state of the remote deployment directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteState {
    /// The directory does not exist.
    Missing,
    /// The directory exists and is empty.
    Empty,
    /// The archive is present without the extraction program.
    ArchiveOnly,
    /// The extraction program is present without the archive.
    DirectiveOnly,
    /// Both are present; a run stopped between upload and extraction.
    ArchiveAndDirective,
    /// Site files are present with neither the archive nor the program.
    Deployed,
}

impl RemoteState {
    /// Classify a listing. `None` means the directory does not exist.
    #[must_use]
    pub fn classify(
        entries: Option<&[RemoteEntry]>,
        archive: &ArchiveName,
        script: &ScriptName,
    ) -> Self {
        let Some(entries) = entries else {
            return Self::Missing;
        };
        let has_file = |name: &str| {
            entries
                .iter()
                .any(|e| e.kind != EntryKind::Directory && e.name == name)
        };
        match (has_file(archive.as_str()), has_file(script.as_str())) {
            (true, true) => Self::ArchiveAndDirective,
            (true, false) => Self::ArchiveOnly,
            (false, true) => Self::DirectiveOnly,
            (false, false) if entries.is_empty() => Self::Empty,
            (false, false) => Self::Deployed,
        }
    }

    /// Whether an earlier run left its archive or program behind.
    #[must_use]
    pub fn has_residue(self) -> bool {
        matches!(
            self,
            Self::ArchiveOnly | Self::DirectiveOnly | Self::ArchiveAndDirective
        )
    }

    /// One-line explanation for the operator.
    #[must_use]
    pub fn describe(self) -> &'static str {
        match self {
            Self::Missing => "remote directory does not exist",
            Self::Empty => "remote directory is empty",
            Self::ArchiveOnly => "archive present, extraction never ran or failed to delete it",
            Self::DirectiveOnly => "extraction program present without its archive",
            Self::ArchiveAndDirective => {
                "archive and extraction program present; a run stopped before extraction finished"
            }
            Self::Deployed => "site files present, no deployment residue",
        }
    }
}

impl fmt::Display for RemoteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Missing => "missing",
            Self::Empty => "empty",
            Self::ArchiveOnly => "archive_only",
            Self::DirectiveOnly => "directive_only",
            Self::ArchiveAndDirective => "archive_and_directive",
            Self::Deployed => "deployed",
        })
    }
}
