//! Deployment configuration model shared by the sitedrop tools.
//!
//! # Modules
//!
//! - [`config`] - File schema, environment overrides, and [`DeploymentConfig`]
//! - [`error`] - Configuration error types
//! - [`names`] - Validated archive, script, directory, and URL newtypes

pub mod config;
pub mod error;
pub mod names;

pub use config::{DeploymentConfig, Password, RemoteEndpoint, Timeouts, TransportSecurity};
pub use error::ConfigError;
