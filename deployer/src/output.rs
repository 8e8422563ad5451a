//! Operator-facing output for the `sitedrop` CLI.
//!
//! Human-readable reports go to stdout, diagnostics to stderr. Every report
//! also has a JSON form for scripting.

use crate::error::Stage;
use crate::pipeline::{DeployPlan, DeploymentResult, error_chain};
use crate::remote_state::RemoteState;
use serde::Serialize;
use std::fmt::Write as _;
use std::io::Write;

/// Write one line to `out`, ignoring write failures.
pub fn write_line(out: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(out, "{message}").is_err() {
        // Best-effort output; ignore write failures.
    }
}

/// Recovery advice for a run that stopped in `stage`.
#[must_use]
pub fn failure_hint(stage: Stage) -> Option<&'static str> {
    stage.may_leave_remote_residue().then_some(
        "The remote directory may hold a partial deployment. \
         Run `sitedrop reset`, then deploy again.",
    )
}

/// Summary of a finished run.
#[must_use]
pub fn deploy_report(result: &DeploymentResult) -> String {
    let mut text = String::new();
    if let Some(artifact) = &result.artifact {
        let _ = writeln!(
            text,
            "Packaged {} file(s) into {} ({} bytes, sha256 {})",
            artifact.files, artifact.file_name, artifact.bytes, artifact.sha256
        );
    }
    if let Some(state) = result.remote_state_before {
        let _ = writeln!(text, "Remote before deploy: {}", state.describe());
    }
    for upload in &result.uploads {
        let _ = writeln!(text, "Uploaded {} ({} bytes)", upload.remote_path, upload.bytes);
    }
    if result.is_success() {
        text.push_str("Deployment verified: extraction reported success.");
        return text;
    }

    let stage = result
        .stage_reached()
        .map_or_else(|| "unknown".to_owned(), |s| s.to_string());
    let _ = write!(text, "Deployment FAILED at stage {stage}");
    if let Some(err) = &result.error {
        let _ = write!(text, "\n  {}: {}", err.kind(), error_chain(err));
    }
    if let Some(body) = &result.response_body {
        let _ = write!(text, "\n  Remote response: {}", body.trim());
    }
    if let Some(hint) = result.stage_reached().and_then(failure_hint) {
        let _ = write!(text, "\n{hint}");
    }
    text
}

/// Summary of a dry run.
#[must_use]
pub fn plan_report(plan: &DeployPlan) -> String {
    let mut text = format!(
        "Dry run: nothing was sent.\n\
         Packaged {} file(s) into {} ({} bytes, sha256 {})\n",
        plan.artifact.files, plan.artifact.file_name, plan.artifact.bytes, plan.artifact.sha256
    );
    if plan.clear_first {
        let _ = writeln!(text, "Would clear {}", plan.remote_dir);
    }
    for upload in &plan.uploads {
        let _ = writeln!(text, "Would upload {upload}");
    }
    let _ = write!(text, "Would fetch {}", plan.trigger_url);
    text
}

/// The `status` command's report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    /// Remote directory inspected.
    pub remote_dir: String,
    /// Observed state.
    pub state: RemoteState,
    /// Whether a failed run left files behind.
    pub residue: bool,
    /// Human explanation of `state`.
    pub description: &'static str,
}

impl StatusReport {
    /// Build the report for `state` observed in `remote_dir`.
    #[must_use]
    pub fn new(remote_dir: impl Into<String>, state: RemoteState) -> Self {
        Self {
            remote_dir: remote_dir.into(),
            state,
            residue: state.has_residue(),
            description: state.describe(),
        }
    }

    /// Human-readable form.
    #[must_use]
    pub fn display_text(&self) -> String {
        let mut text = format!("{}: {} ({})", self.remote_dir, self.state, self.description);
        if self.residue {
            text.push_str("\nRun `sitedrop reset` to remove deployment residue.");
        }
        text
    }
}

/// Pretty-printed JSON.
///
/// # Errors
///
/// Returns the serializer error, which only occurs for non-string map keys.
pub fn to_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(value)
}
