//! The single-use extraction program uploaded next to the archive.
//!
//! An [`ExtractionDirective`] is an ordered plan of [`DirectiveStep`]s bound
//! to one archive name. The plan renders to PHP source for the remote web
//! server, and the rendered source carries the plan in its first comment line
//! so that a simulated host can execute exactly what was uploaded.
//!
//! The program's output contract:
//!
//! - a missing archive prints an `Error:` message and exits before any
//!   deletion;
//! - any later failure prints an `Error:` message and then deletes the
//!   program;
//! - success prints [`SUCCESS_MARKER`] and then deletes the program.

use sitedrop::names::ArchiveName;
use std::fmt::Write as _;
use std::io::{self, Write as _};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tempfile::TempPath;

/// The only output that counts as a successful extraction.
pub const SUCCESS_MARKER: &str = "SITEDROP_EXTRACTION_OK";

/// Prefix of every failure message the program prints.
pub const ERROR_PREFIX: &str = "Error:";

const PLAN_HEADER: &str = "// sitedrop extraction directive:";

/// One action of the remote extraction program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveStep {
    /// Stop with an error, touching nothing, if the archive is absent.
    RequireArchive,
    /// Open and parse the archive.
    OpenArchive,
    /// Extract every entry into the program's own directory.
    ExtractHere,
    /// Delete the archive.
    DeleteArchive,
    /// Print [`SUCCESS_MARKER`].
    EmitMarker,
    /// Delete the program's own source file.
    DeleteSelf,
}

impl DirectiveStep {
    /// The order every directive follows.
    pub const PLAN: [Self; 6] = [
        Self::RequireArchive,
        Self::OpenArchive,
        Self::ExtractHere,
        Self::DeleteArchive,
        Self::EmitMarker,
        Self::DeleteSelf,
    ];

    /// Identifier used in the rendered plan header.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RequireArchive => "require-archive",
            Self::OpenArchive => "open-archive",
            Self::ExtractHere => "extract-here",
            Self::DeleteArchive => "delete-archive",
            Self::EmitMarker => "emit-marker",
            Self::DeleteSelf => "delete-self",
        }
    }
}

impl FromStr for DirectiveStep {
    type Err = DirectiveParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::PLAN
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| DirectiveParseError::UnknownStep(s.to_owned()))
    }
}

/// Errors reading a plan back out of rendered source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectiveParseError {
    /// The source does not start with a directive header.
    #[error("source carries no extraction directive header")]
    MissingHeader,
    /// The header names a step this version does not know.
    #[error("unknown directive step: {0}")]
    UnknownStep(String),
    /// The header's archive name is invalid.
    #[error("invalid archive name in directive header: {0}")]
    InvalidArchive(String),
    /// The header's time limit is not a whole number of seconds.
    #[error("invalid time limit in directive header: {0}")]
    InvalidTimeLimit(String),
}

/// Message printed when the archive is absent.
#[must_use]
pub fn missing_archive_message(archive: &str) -> String {
    format!("{ERROR_PREFIX} {archive} not found")
}

/// Message printed when the archive cannot be opened.
#[must_use]
pub fn unreadable_archive_message(archive: &str) -> String {
    format!("{ERROR_PREFIX} cannot open {archive}")
}

/// Message printed when extraction fails.
#[must_use]
pub fn extraction_failed_message(archive: &str) -> String {
    format!("{ERROR_PREFIX} cannot extract {archive}")
}

/// Message printed when the archive cannot be removed after extraction.
#[must_use]
pub fn archive_not_deleted_message(archive: &str) -> String {
    format!("{ERROR_PREFIX} extracted but cannot delete {archive}")
}

/// A freshly generated extraction program for one archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionDirective {
    archive: ArchiveName,
    time_limit: Duration,
    steps: Vec<DirectiveStep>,
}

impl ExtractionDirective {
    /// Plan the extraction of `archive`, allowing the remote program
    /// `time_limit` to finish.
    #[must_use]
    pub fn new(archive: &ArchiveName, time_limit: Duration) -> Self {
        Self {
            archive: archive.clone(),
            time_limit,
            steps: DirectiveStep::PLAN.to_vec(),
        }
    }

    /// Recover the plan embedded in rendered source.
    ///
    /// # Errors
    ///
    /// Returns [`DirectiveParseError`] if the header line is absent or
    /// malformed.
    pub fn from_source(source: &str) -> Result<Self, DirectiveParseError> {
        let header = source
            .lines()
            .find_map(|line| line.trim().strip_prefix(PLAN_HEADER))
            .ok_or(DirectiveParseError::MissingHeader)?;

        let mut archive = None;
        let mut time_limit = Duration::ZERO;
        let mut steps = Vec::new();
        for field in header.split(';').map(str::trim) {
            if let Some(name) = field.strip_prefix("archive=") {
                archive = Some(
                    ArchiveName::try_from(name)
                        .map_err(|_| DirectiveParseError::InvalidArchive(name.to_owned()))?,
                );
            } else if let Some(secs) = field.strip_prefix("time-limit=") {
                time_limit = secs
                    .parse()
                    .map(Duration::from_secs)
                    .map_err(|_| DirectiveParseError::InvalidTimeLimit(secs.to_owned()))?;
            } else if let Some(list) = field.strip_prefix("steps=") {
                steps = list
                    .split(',')
                    .map(DirectiveStep::from_str)
                    .collect::<Result<_, _>>()?;
            }
        }

        Ok(Self {
            archive: archive.ok_or(DirectiveParseError::MissingHeader)?,
            time_limit,
            steps,
        })
    }

    /// Archive this directive unpacks.
    #[must_use]
    pub fn archive(&self) -> &ArchiveName {
        &self.archive
    }

    /// Steps in execution order.
    #[must_use]
    pub fn steps(&self) -> &[DirectiveStep] {
        &self.steps
    }

    /// Execution time limit granted to the remote program.
    #[must_use]
    pub fn time_limit(&self) -> Duration {
        self.time_limit
    }

    /// Render the PHP source.
    #[must_use]
    pub fn render(&self) -> String {
        let archive = self.archive.as_str();
        let mut src = String::new();
        src.push_str("<?php\n");
        let plan = self
            .steps
            .iter()
            .map(|step| step.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let _ = writeln!(
            src,
            "{PLAN_HEADER} archive={archive}; time-limit={}; steps={plan}",
            self.time_limit.as_secs()
        );
        src.push_str("header('Content-Type: text/plain; charset=utf-8');\n");
        src.push_str("header('Cache-Control: no-store');\n");
        let _ = writeln!(src, "@set_time_limit({});", self.time_limit.as_secs());
        let _ = writeln!(src, "$archive = __DIR__ . '/{archive}';");
        src.push_str(concat!(
            "function sitedrop_fail($message) {\n",
            "    echo $message;\n",
            "    @unlink(__FILE__);\n",
            "    exit;\n",
            "}\n",
        ));

        for step in &self.steps {
            let _ = writeln!(src, "// {}", step.as_str());
            src.push_str(&render_step(*step, archive));
        }
        src
    }

    /// Render and write the program into `dir` as a scoped local file.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from creating or writing the file.
    pub fn write_local(&self, dir: &Path) -> io::Result<LocalDirective> {
        let mut file = tempfile::Builder::new()
            .prefix(".sitedrop-directive-")
            .suffix(".php")
            .tempfile_in(dir)?;
        file.write_all(self.render().as_bytes())?;
        file.flush()?;
        Ok(LocalDirective {
            path: file.into_temp_path(),
        })
    }
}

fn render_step(step: DirectiveStep, archive: &str) -> String {
    match step {
        DirectiveStep::RequireArchive => format!(
            "if (!is_file($archive)) {{\n    echo '{}';\n    exit;\n}}\n",
            missing_archive_message(archive)
        ),
        DirectiveStep::OpenArchive => format!(
            "$zip = new ZipArchive();\nif ($zip->open($archive) !== true) {{\n    sitedrop_fail('{}');\n}}\n",
            unreadable_archive_message(archive)
        ),
        DirectiveStep::ExtractHere => format!(
            "$extracted = $zip->extractTo(__DIR__);\n$zip->close();\nif (!$extracted) {{\n    sitedrop_fail('{}');\n}}\n",
            extraction_failed_message(archive)
        ),
        DirectiveStep::DeleteArchive => format!(
            "if (!@unlink($archive)) {{\n    sitedrop_fail('{}');\n}}\n",
            archive_not_deleted_message(archive)
        ),
        DirectiveStep::EmitMarker => format!("echo '{SUCCESS_MARKER}';\n"),
        DirectiveStep::DeleteSelf => "@unlink(__FILE__);\n".to_owned(),
    }
}

/// The rendered program on local disk, removed when dropped.
#[derive(Debug)]
pub struct LocalDirective {
    path: TempPath,
}

impl LocalDirective {
    /// Local path of the rendered program.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the local copy now, reporting any failure.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from the removal.
    pub fn discard(self) -> io::Result<()> {
        self.path.close()
    }
}
