//! Deployment configuration: file schema, environment overrides, and the
//! validated [`DeploymentConfig`] handed to the pipeline.
//!
//! Settings are read from a TOML file (all keys optional) and then
//! overridden by `SITEDROP_*` environment variables, so a deployment can be
//! configured entirely from the environment in CI. Validation happens once,
//! here; the resulting value is immutable for the duration of a run.

use crate::error::{ConfigError, Result};
use crate::names::{ArchiveName, RemoteDir, ScriptName, SiteUrl};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Name of the config file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "sitedrop.toml";

/// Default FTP control port.
pub const DEFAULT_PORT: u16 = 21;

const DEFAULT_CONNECT_SECS: u64 = 30;
const DEFAULT_TRANSFER_SECS: u64 = 120;
const DEFAULT_TRIGGER_SECS: u64 = 300;

/// Environment variable names, paired with the config key they override.
pub mod env {
    /// Remote host, optionally `host:port`.
    pub const HOST: &str = "SITEDROP_HOST";
    /// Remote user name.
    pub const USER: &str = "SITEDROP_USER";
    /// Remote password.
    pub const PASSWORD: &str = "SITEDROP_PASSWORD";
    /// `true` to negotiate explicit TLS on the control channel.
    pub const SECURE: &str = "SITEDROP_SECURE";
    /// Remote base directory.
    pub const REMOTE_PATH: &str = "SITEDROP_REMOTE_PATH";
    /// Local build output directory.
    pub const BUILD_DIR: &str = "SITEDROP_BUILD_DIR";
    /// Archive file name.
    pub const ARCHIVE_NAME: &str = "SITEDROP_ARCHIVE_NAME";
    /// Public site base URL.
    pub const SITE_URL: &str = "SITEDROP_SITE_URL";
    /// Extraction trigger script name.
    pub const TRIGGER_SCRIPT: &str = "SITEDROP_TRIGGER_SCRIPT";
}

// ---------------------------------------------------------------------------
// File schema
// ---------------------------------------------------------------------------

/// Raw contents of a `sitedrop.toml` file.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// `[remote]` table.
    pub remote: RemoteSection,
    /// `[local]` table.
    pub local: LocalSection,
    /// `[site]` table.
    pub site: SiteSection,
    /// `[timeouts]` table.
    pub timeouts: TimeoutSection,
    /// `[deploy]` table.
    pub deploy: DeploySection,
}

/// `[remote]` table.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteSection {
    pub host: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub secure: Option<bool>,
    pub base_path: Option<String>,
}

/// `[local]` table.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LocalSection {
    pub build_dir: Option<Utf8PathBuf>,
    pub archive_name: Option<String>,
}

/// `[site]` table.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SiteSection {
    pub url: Option<String>,
    pub trigger_script: Option<String>,
}

/// `[timeouts]` table, in seconds.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutSection {
    pub connect: Option<u64>,
    pub transfer: Option<u64>,
    pub trigger: Option<u64>,
}

/// `[deploy]` table.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct DeploySection {
    pub clear_before_deploy: Option<bool>,
}

impl ConfigFile {
    /// Parse a config file body.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the TOML is malformed or has
    /// unknown keys.
    pub fn parse(path: &Utf8Path, contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    /// Read and parse a config file from disk.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn read(path: &Utf8Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::parse(path, &contents)
    }
}

// ---------------------------------------------------------------------------
// Validated model
// ---------------------------------------------------------------------------

/// A remote credential whose `Debug` output never reveals the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    /// Wrap a secret.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Return the secret for authentication.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

/// Whether the control channel is upgraded to TLS after connecting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransportSecurity {
    /// Plain-text FTP.
    #[default]
    Plain,
    /// Explicit FTPS (`AUTH TLS`).
    ExplicitTls,
}

impl TransportSecurity {
    /// Map the boolean `secure` flag onto a security mode.
    #[must_use]
    pub fn from_flag(secure: bool) -> Self {
        if secure {
            Self::ExplicitTls
        } else {
            Self::Plain
        }
    }

    /// True when TLS is negotiated.
    #[must_use]
    pub fn is_secure(self) -> bool {
        matches!(self, Self::ExplicitTls)
    }
}

/// Connection details for the remote file store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteEndpoint {
    /// Host name or address.
    pub host: String,
    /// Control port.
    pub port: u16,
    /// Login user.
    pub user: String,
    /// Login password.
    pub password: Password,
    /// Plain or TLS.
    pub security: TransportSecurity,
    /// Directory that receives the archive and serves the site.
    pub base_path: RemoteDir,
}

impl RemoteEndpoint {
    /// `host:port` string for socket resolution.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Bounded waits for each network-bound step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    /// Connect and authenticate.
    pub connect: Duration,
    /// Any single clear, list, or upload command.
    pub transfer: Duration,
    /// The extraction trigger HTTP request.
    pub trigger: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(DEFAULT_CONNECT_SECS),
            transfer: Duration::from_secs(DEFAULT_TRANSFER_SECS),
            trigger: Duration::from_secs(DEFAULT_TRIGGER_SECS),
        }
    }
}

/// Everything one deployment run needs. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeploymentConfig {
    /// Remote file store.
    pub remote: RemoteEndpoint,
    /// Local build output to package.
    pub build_dir: Utf8PathBuf,
    /// Archive file name used locally and remotely.
    pub archive_name: ArchiveName,
    /// Public base URL of the site.
    pub site_url: SiteUrl,
    /// File name of the generated extraction program.
    pub trigger_script: ScriptName,
    /// Network timeouts.
    pub timeouts: Timeouts,
    /// Empty the remote directory before uploading.
    pub clear_before_deploy: bool,
}

impl DeploymentConfig {
    /// Remote path of the uploaded archive.
    #[must_use]
    pub fn remote_archive_path(&self) -> String {
        self.remote.base_path.join(self.archive_name.as_str())
    }

    /// Remote path of the uploaded extraction program.
    #[must_use]
    pub fn remote_script_path(&self) -> String {
        self.remote.base_path.join(self.trigger_script.as_str())
    }

    /// Public URL that runs the extraction program.
    #[must_use]
    pub fn trigger_url(&self) -> String {
        self.site_url.endpoint(&self.trigger_script)
    }

    /// Load configuration from the given file (or the default lookup) and
    /// the process environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read or parsed, or
    /// if the merged settings fail validation.
    pub fn load(explicit: Option<&Utf8Path>) -> Result<Self> {
        let file = match locate_config_file(explicit) {
            Some(path) => {
                log::debug!("reading configuration from {path}");
                ConfigFile::read(&path)?
            }
            None => {
                log::debug!("no config file found; using environment only");
                ConfigFile::default()
            }
        };
        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    /// Merge a parsed file with an environment lookup and validate.
    ///
    /// The lookup is injected so tests can supply variables without
    /// touching the process environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first missing or invalid
    /// setting.
    ///
    /// # Examples
    ///
    /// ```
    /// use sitedrop::config::{ConfigFile, DeploymentConfig};
    ///
    /// let env = |key: &str| match key {
    ///     "SITEDROP_HOST" => Some("ftp.example.net".to_owned()),
    ///     "SITEDROP_USER" => Some("deploy".to_owned()),
    ///     "SITEDROP_PASSWORD" => Some("secret".to_owned()),
    ///     "SITEDROP_REMOTE_PATH" => Some("/site".to_owned()),
    ///     "SITEDROP_SITE_URL" => Some("http://example.net".to_owned()),
    ///     _ => None,
    /// };
    /// let config = DeploymentConfig::from_sources(ConfigFile::default(), env).unwrap();
    /// assert_eq!(config.remote_archive_path(), "/site/app.zip");
    /// assert_eq!(config.trigger_url(), "http://example.net/_unzip.php");
    /// ```
    pub fn from_sources<F>(file: ConfigFile, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |value: Option<String>, var: &str| {
            lookup(var)
                .filter(|v| !v.trim().is_empty())
                .or(value)
                .map(|v| v.trim().to_owned())
        };

        let host_value = require(pick(file.remote.host, env::HOST), "remote.host", env::HOST)?;
        let (host, port) = split_host_port(&host_value)?;
        let user = require(pick(file.remote.user, env::USER), "remote.user", env::USER)?;
        let password = lookup(env::PASSWORD)
            .filter(|v| !v.is_empty())
            .or(file.remote.password)
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing {
                key: "remote.password",
                env: env::PASSWORD,
            })?;
        let secure = match lookup(env::SECURE) {
            Some(raw) => parse_flag(env::SECURE, &raw)?,
            None => file.remote.secure.unwrap_or(false),
        };
        let base_path = RemoteDir::try_from(
            require(
                pick(file.remote.base_path, env::REMOTE_PATH),
                "remote.base_path",
                env::REMOTE_PATH,
            )?
            .as_str(),
        )?;

        let build_dir = lookup(env::BUILD_DIR)
            .filter(|v| !v.trim().is_empty())
            .map(Utf8PathBuf::from)
            .or(file.local.build_dir)
            .unwrap_or_else(|| Utf8PathBuf::from("out"));
        let archive_name = ArchiveName::try_from(
            pick(file.local.archive_name, env::ARCHIVE_NAME).unwrap_or_else(|| "app.zip".to_owned()),
        )?;
        let site_url = SiteUrl::try_from(
            require(pick(file.site.url, env::SITE_URL), "site.url", env::SITE_URL)?.as_str(),
        )?;
        let trigger_script = ScriptName::try_from(
            pick(file.site.trigger_script, env::TRIGGER_SCRIPT)
                .unwrap_or_else(|| "_unzip.php".to_owned()),
        )?;

        let timeouts = build_timeouts(&file.timeouts)?;

        Ok(Self {
            remote: RemoteEndpoint {
                host,
                port,
                user,
                password: Password::new(password),
                security: TransportSecurity::from_flag(secure),
                base_path,
            },
            build_dir,
            archive_name,
            site_url,
            trigger_script,
            timeouts,
            clear_before_deploy: file.deploy.clear_before_deploy.unwrap_or(true),
        })
    }
}

fn require(value: Option<String>, key: &'static str, env: &'static str) -> Result<String> {
    value.ok_or(ConfigError::Missing { key, env })
}

/// Split `host[:port]`. Anything with more than one `:` is taken as a bare
/// IPv6 host on the default port.
fn split_host_port(value: &str) -> Result<(String, u16)> {
    match value.split_once(':') {
        Some((host, port)) if !port.contains(':') => {
            if host.is_empty() {
                return Err(ConfigError::invalid("remote.host", "host must not be empty"));
            }
            let port = port.parse::<u16>().map_err(|_| {
                ConfigError::invalid("remote.host", format!("\"{port}\" is not a valid port"))
            })?;
            Ok((host.to_owned(), port))
        }
        _ => Ok((value.to_owned(), DEFAULT_PORT)),
    }
}

fn parse_flag(key: &'static str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::invalid(
            key,
            format!("\"{other}\" is not a boolean"),
        )),
    }
}

fn build_timeouts(section: &TimeoutSection) -> Result<Timeouts> {
    let defaults = Timeouts::default();
    let secs = |value: Option<u64>, key: &'static str, default: Duration| match value {
        Some(0) => Err(ConfigError::invalid(key, "timeout must be at least one second")),
        Some(n) => Ok(Duration::from_secs(n)),
        None => Ok(default),
    };
    Ok(Timeouts {
        connect: secs(section.connect, "timeouts.connect", defaults.connect)?,
        transfer: secs(section.transfer, "timeouts.transfer", defaults.transfer)?,
        trigger: secs(section.trigger, "timeouts.trigger", defaults.trigger)?,
    })
}

/// Decide which config file to read, if any.
///
/// An explicit path is always used (and must exist when read). Otherwise
/// `./sitedrop.toml` wins over the per-user config directory.
#[must_use]
pub fn locate_config_file(explicit: Option<&Utf8Path>) -> Option<Utf8PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_owned());
    }
    let local = Utf8PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }
    user_config_file().filter(|path| path.is_file())
}

/// Per-user config file location, e.g. `~/.config/sitedrop/sitedrop.toml`.
#[must_use]
pub fn user_config_file() -> Option<Utf8PathBuf> {
    directories_next::ProjectDirs::from("", "", "sitedrop")
        .and_then(|dirs| Utf8PathBuf::try_from(dirs.config_dir().to_path_buf()).ok())
        .map(|dir| dir.join(CONFIG_FILE_NAME))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
