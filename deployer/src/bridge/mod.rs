//! Remote execution bridge.
//!
//! Unpacks an uploaded archive on a host that offers nothing but file
//! transfer and anonymous HTTP: a single-use extraction program is rendered,
//! uploaded next to the archive, and fetched over HTTP. The program removes
//! the archive and itself; the bridge only removes its local copy.
//!
//! # Sub-modules
//!
//! - [`directive`] - The step plan and its PHP rendering.
//! - [`trigger`] - HTTP firing and response interpretation.

pub mod directive;
pub mod trigger;

use crate::error::{DeployError, Stage};
use crate::transport::session::{Session, UploadReceipt};
use directive::{ExtractionDirective, LocalDirective};
use sitedrop::config::DeploymentConfig;
use std::path::Path;
use trigger::{ExtractionTrigger, TriggerError, interpret};

/// Render, upload, and fire the extraction program for the configured archive.
///
/// Every successful upload is appended to `uploads`. Returns the response
/// body when it carries the success marker. The local copy of the program is
/// removed on every path.
///
/// # Errors
///
/// Returns a [`DeployError`] tagged [`Stage::Triggering`]. A timeout means
/// the remote state is unknown.
pub fn extract_remotely(
    session: &mut Session,
    trigger: &dyn ExtractionTrigger,
    config: &DeploymentConfig,
    scratch: &Path,
    uploads: &mut Vec<UploadReceipt>,
) -> Result<String, DeployError> {
    let directive = ExtractionDirective::new(&config.archive_name, config.timeouts.trigger);
    let local = directive
        .write_local(scratch)
        .map_err(|e| DeployError::trigger(TriggerError::Render(e)))?;

    let outcome = upload_and_fire(session, trigger, config, &local, uploads);

    if let Err(e) = local.discard() {
        log::warn!("could not remove local extraction program: {e}");
    }
    outcome
}

fn upload_and_fire(
    session: &mut Session,
    trigger: &dyn ExtractionTrigger,
    config: &DeploymentConfig,
    local: &LocalDirective,
    uploads: &mut Vec<UploadReceipt>,
) -> Result<String, DeployError> {
    let receipt = session
        .upload_file(local.path(), &config.remote_script_path())
        .map_err(|e| DeployError::transfer(Stage::Triggering, e))?;
    uploads.push(receipt);

    let url = config.trigger_url();
    log::info!("triggering extraction at {url}");
    let body = trigger
        .fire(&url, config.timeouts.trigger)
        .map_err(DeployError::trigger)?;
    log::debug!("extraction response: {body:?}");
    interpret(&url, &body).map_err(DeployError::trigger)?;
    Ok(body)
}
