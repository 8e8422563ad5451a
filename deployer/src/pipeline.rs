//! Deployment orchestration.
//!
//! A run moves one way through `Idle → Packaging → Connecting → [Clearing] →
//! Uploading → Triggering → Verified`, or into `Failed` from any
//! non-terminal state. No stage is retried. On failure the open session and
//! the local scratch directory are released by their guards; no remote
//! remediation is attempted.

use crate::artefact::packaging::{ArtifactSummary, package_directory};
use crate::artefact::packaging_error::PackagingError;
use crate::bridge::extract_remotely;
use crate::bridge::trigger::ExtractionTrigger;
use crate::error::{DeployError, Stage};
use crate::remote_state::RemoteState;
use crate::transport::session::{Session, UploadReceipt};
use crate::transport::{Connector, TransferError};
use serde::Serialize;
use sitedrop::config::DeploymentConfig;
use std::fmt;
use tempfile::TempDir;

/// Where a deployment run currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployState {
    /// Nothing has happened yet.
    Idle,
    /// Building the local archive.
    Packaging,
    /// Opening the transport session.
    Connecting,
    /// Emptying the remote directory.
    Clearing,
    /// Uploading the archive.
    Uploading,
    /// Uploading and firing the extraction program.
    Triggering,
    /// The trigger response carried the success marker.
    Verified,
    /// The run stopped.
    Failed {
        /// Stage that failed.
        stage: Stage,
        /// Rendered error chain.
        cause: String,
    },
}

impl DeployState {
    fn rank(&self) -> Option<u8> {
        match self {
            Self::Idle => Some(0),
            Self::Packaging => Some(1),
            Self::Connecting => Some(2),
            Self::Clearing => Some(3),
            Self::Uploading => Some(4),
            Self::Triggering => Some(5),
            Self::Verified => Some(6),
            Self::Failed { .. } => None,
        }
    }

    /// Whether the run has finished, successfully or not.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Verified | Self::Failed { .. })
    }

    /// Whether moving to `next` is allowed. States are never re-entered.
    #[must_use]
    pub fn can_advance_to(&self, next: &Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), next.rank()) {
            (_, None) => true,
            (Some(current), Some(target)) => target > current,
            (None, Some(_)) => false,
        }
    }
}

impl fmt::Display for DeployState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Packaging => f.write_str("packaging"),
            Self::Connecting => f.write_str("connecting"),
            Self::Clearing => f.write_str("clearing"),
            Self::Uploading => f.write_str("uploading"),
            Self::Triggering => f.write_str("triggering"),
            Self::Verified => f.write_str("verified"),
            Self::Failed { stage, .. } => write!(f, "failed at {stage}"),
        }
    }
}

/// Per-run switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployOptions {
    /// Empty the remote directory before uploading.
    pub clear_first: bool,
}

impl DeployOptions {
    /// Options taken from configuration alone.
    #[must_use]
    pub fn from_config(config: &DeploymentConfig) -> Self {
        Self {
            clear_first: config.clear_before_deploy,
        }
    }
}

/// Terminal record of one run.
#[derive(Debug, Serialize)]
pub struct DeploymentResult {
    /// Final state.
    pub state: DeployState,
    /// Stages entered, in order.
    pub stages: Vec<Stage>,
    /// True only when the trigger response carried the success marker.
    pub success: bool,
    /// Body returned by the extraction trigger, when one arrived.
    pub response_body: Option<String>,
    /// The packaged archive, when packaging succeeded.
    pub artifact: Option<ArtifactSummary>,
    /// Completed uploads, in order.
    pub uploads: Vec<UploadReceipt>,
    /// Remote directory state observed right after connecting.
    pub remote_state_before: Option<RemoteState>,
    /// The failure, when the run did not verify.
    #[serde(skip)]
    pub error: Option<DeployError>,
}

impl DeploymentResult {
    /// Whether the run verified.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// The last stage entered.
    #[must_use]
    pub fn stage_reached(&self) -> Option<Stage> {
        self.stages.last().copied()
    }
}

/// What a dry run would do.
#[derive(Debug, Clone, Serialize)]
pub struct DeployPlan {
    /// The archive as it would be uploaded.
    pub artifact: ArtifactSummary,
    /// Whether the remote directory would be emptied first.
    pub clear_first: bool,
    /// Remote directory that receives everything.
    pub remote_dir: String,
    /// Remote paths that would be written, in order.
    pub uploads: Vec<String>,
    /// URL that would be fetched.
    pub trigger_url: String,
}

#[derive(Debug, Default)]
struct RunRecord {
    artifact: Option<ArtifactSummary>,
    uploads: Vec<UploadReceipt>,
    remote_state_before: Option<RemoteState>,
}

/// Runs one deployment.
pub struct Deployer<'a> {
    config: &'a DeploymentConfig,
    connector: &'a dyn Connector,
    trigger: &'a dyn ExtractionTrigger,
    options: DeployOptions,
    state: DeployState,
    stages: Vec<Stage>,
}

impl<'a> Deployer<'a> {
    /// Prepare a run against `config`.
    #[must_use]
    pub fn new(
        config: &'a DeploymentConfig,
        connector: &'a dyn Connector,
        trigger: &'a dyn ExtractionTrigger,
        options: DeployOptions,
    ) -> Self {
        Self {
            config,
            connector,
            trigger,
            options,
            state: DeployState::Idle,
            stages: Vec::new(),
        }
    }

    /// Execute every stage and report the outcome.
    #[must_use]
    pub fn run(mut self) -> DeploymentResult {
        let mut record = RunRecord::default();
        let outcome = self.execute(&mut record);

        let (response_body, error) = match outcome {
            Ok(body) => {
                self.transition(DeployState::Verified);
                (Some(body), None)
            }
            Err(err) => {
                log::error!("deployment failed: {err}");
                self.transition(DeployState::Failed {
                    stage: err.stage(),
                    cause: error_chain(&err),
                });
                (err.response_body().map(str::to_owned), Some(err))
            }
        };

        DeploymentResult {
            success: self.state == DeployState::Verified,
            state: self.state,
            stages: self.stages,
            response_body,
            artifact: record.artifact,
            uploads: record.uploads,
            remote_state_before: record.remote_state_before,
            error,
        }
    }

    fn execute(&mut self, record: &mut RunRecord) -> Result<String, DeployError> {
        self.enter(Stage::Packaging);
        let scratch = scratch_dir()?;
        let artifact = package_directory(
            self.config.build_dir.as_std_path(),
            &scratch.path().join(self.config.archive_name.as_str()),
        )
        .map_err(DeployError::packaging)?;
        record.artifact = Some(artifact.summary().clone());

        self.enter(Stage::Connecting);
        let mut session = Session::open(self.connector, &self.config.remote, &self.config.timeouts)
            .map_err(DeployError::connection)?;
        let before =
            probe(&mut session, self.config).map_err(|e| DeployError::transfer(Stage::Connecting, e))?;
        if before.has_residue() {
            log::warn!(
                "{} holds residue of an earlier run: {}",
                self.config.remote.base_path,
                before.describe()
            );
        }
        record.remote_state_before = Some(before);

        if self.options.clear_first {
            self.enter(Stage::Clearing);
            session
                .clear_remote_directory(&self.config.remote.base_path)
                .map_err(|e| DeployError::transfer(Stage::Clearing, e))?;
        }

        self.enter(Stage::Uploading);
        let receipt = session
            .upload_file(artifact.path(), &self.config.remote_archive_path())
            .map_err(|e| DeployError::transfer(Stage::Uploading, e))?;
        record.uploads.push(receipt);
        if let Err(e) = artifact.discard() {
            log::warn!("could not remove local archive: {e}");
        }

        self.enter(Stage::Triggering);
        let body = extract_remotely(
            &mut session,
            self.trigger,
            self.config,
            scratch.path(),
            &mut record.uploads,
        )?;
        session.close();
        Ok(body)
    }

    fn enter(&mut self, stage: Stage) {
        self.stages.push(stage);
        self.transition(match stage {
            Stage::Packaging => DeployState::Packaging,
            Stage::Connecting => DeployState::Connecting,
            Stage::Clearing => DeployState::Clearing,
            Stage::Uploading => DeployState::Uploading,
            Stage::Triggering => DeployState::Triggering,
        });
    }

    fn transition(&mut self, next: DeployState) {
        debug_assert!(
            self.state.can_advance_to(&next),
            "illegal transition {} -> {next}",
            self.state
        );
        log::info!("{} -> {next}", self.state);
        self.state = next;
    }
}

/// Package the build directory and describe the run without contacting the
/// remote host. The archive is deleted again before returning.
///
/// # Errors
///
/// Returns a [`DeployError`] tagged [`Stage::Packaging`].
pub fn plan(config: &DeploymentConfig, options: DeployOptions) -> Result<DeployPlan, DeployError> {
    let scratch = scratch_dir()?;
    let artifact = package_directory(
        config.build_dir.as_std_path(),
        &scratch.path().join(config.archive_name.as_str()),
    )
    .map_err(DeployError::packaging)?;
    let summary = artifact.summary().clone();
    if let Err(e) = artifact.discard() {
        log::warn!("could not remove local archive: {e}");
    }

    Ok(DeployPlan {
        artifact: summary,
        clear_first: options.clear_first,
        remote_dir: config.remote.base_path.to_string(),
        uploads: vec![config.remote_archive_path(), config.remote_script_path()],
        trigger_url: config.trigger_url(),
    })
}

/// Empty the configured remote directory.
///
/// # Errors
///
/// Returns a [`DeployError`] tagged [`Stage::Connecting`] or
/// [`Stage::Clearing`].
pub fn reset(config: &DeploymentConfig, connector: &dyn Connector) -> Result<(), DeployError> {
    log::info!("resetting {}", config.remote.base_path);
    let mut session = Session::open(connector, &config.remote, &config.timeouts)
        .map_err(DeployError::connection)?;
    session
        .clear_remote_directory(&config.remote.base_path)
        .map_err(|e| DeployError::transfer(Stage::Clearing, e))?;
    session.close();
    Ok(())
}

/// Connect and classify the remote directory.
///
/// # Errors
///
/// Returns a [`DeployError`] tagged [`Stage::Connecting`].
pub fn probe_remote(
    config: &DeploymentConfig,
    connector: &dyn Connector,
) -> Result<RemoteState, DeployError> {
    let mut session = Session::open(connector, &config.remote, &config.timeouts)
        .map_err(DeployError::connection)?;
    let state = probe(&mut session, config).map_err(|e| DeployError::transfer(Stage::Connecting, e))?;
    session.close();
    Ok(state)
}

fn probe(session: &mut Session, config: &DeploymentConfig) -> Result<RemoteState, TransferError> {
    let entries = session.list(&config.remote.base_path)?;
    let state = RemoteState::classify(
        entries.as_deref(),
        &config.archive_name,
        &config.trigger_script,
    );
    log::debug!("remote state of {}: {state}", config.remote.base_path);
    Ok(state)
}

fn scratch_dir() -> Result<TempDir, DeployError> {
    tempfile::Builder::new()
        .prefix("sitedrop-")
        .tempdir()
        .map_err(|e| DeployError::packaging(PackagingError::Io(e)))
}

/// Render an error and its sources as `outer: inner: ...`.
#[must_use]
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !rendered.contains(&text) {
            rendered.push_str(": ");
            rendered.push_str(&text);
        }
        source = cause.source();
    }
    rendered
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
