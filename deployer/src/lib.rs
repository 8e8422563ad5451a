//! sitedrop deployment library.
//!
//! This crate packages a local static build, uploads it to FTP-only shared
//! hosting, and has the host unpack it through a single-use PHP program
//! fetched over HTTP. It is used by the `sitedrop` CLI binary and can be
//! driven programmatically against an in-memory host for testing.
//!
//! # Modules
//!
//! - [`artefact`] - Deterministic zip packaging and archive inspection
//! - [`bridge`] - Extraction program rendering and the HTTP trigger
//! - [`cli`] - Command-line argument definitions
//! - [`commands`] - Command dispatch with injectable network seams
//! - [`error`] - Stage-tagged deployment errors
//! - [`logging`] - Log subscriber setup for the binary
//! - [`output`] - Human and JSON reports
//! - [`pipeline`] - Deployment state machine, reset, and remote probing
//! - [`remote_state`] - Classification of the remote directory contents
//! - [`transport`] - FTP/FTPS sessions behind the remote store traits

pub mod artefact;
pub mod bridge;
pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod remote_state;
pub mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
