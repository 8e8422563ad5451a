//! Error types for deployment configuration.
//!
//! Each variant names the offending setting so the operator can fix the
//! config file or environment variable directly.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors arising while loading or validating a deployment configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read config file {path}")]
    Read {
        /// Path that was read.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML or does not match the schema.
    #[error("invalid config file {path}: {source}")]
    Parse {
        /// Path that was parsed.
        path: Utf8PathBuf,
        /// Underlying TOML failure.
        #[source]
        source: toml::de::Error,
    },

    /// A required setting was supplied by neither the file nor the environment.
    #[error("missing required setting `{key}` (set it in the config file or via {env})")]
    Missing {
        /// Dotted config key, for example `remote.host`.
        key: &'static str,
        /// Environment variable that can supply it.
        env: &'static str,
    },

    /// A setting was present but violates a constraint.
    #[error("invalid value for `{key}`: {reason}")]
    Invalid {
        /// Dotted config key.
        key: &'static str,
        /// Description of the violated constraint.
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Result type alias using [`ConfigError`].
pub type Result<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_names_key_and_env_var() {
        let err = ConfigError::Missing {
            key: "remote.host",
            env: "SITEDROP_HOST",
        };
        let msg = err.to_string();
        assert!(msg.contains("remote.host"));
        assert!(msg.contains("SITEDROP_HOST"));
    }

    #[test]
    fn read_error_preserves_source() {
        let err = ConfigError::Read {
            path: Utf8PathBuf::from("/etc/sitedrop.toml"),
            source: std::io::Error::other("denied"),
        };
        assert!(err.to_string().contains("/etc/sitedrop.toml"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
