//! Build artifact packaging and archive read-back.
//!
//! # Sub-modules
//!
//! - [`packaging`] - Zip a build directory into one archive (`Artifact`).
//! - [`packaging_error`] - Error types for packaging operations.
//! - [`extraction`] - Archive decoding and local extraction with path
//!   traversal protection.

pub mod extraction;
pub mod packaging;
pub mod packaging_error;
