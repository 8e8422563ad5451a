//! Validated names and locations used by a deployment.
//!
//! The archive name and trigger-script name are spliced verbatim into the
//! generated remote program and into the trigger URL, so they are restricted
//! to a conservative character set. Remote directories and the site URL are
//! normalised once here so that joining never produces doubled or missing
//! separators.

use crate::error::{ConfigError, Result};
use std::fmt;

/// Characters accepted in a bare remote file name.
fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

/// Validate a bare file name carrying the given extension.
fn validate_file_name(key: &'static str, value: &str, extension: &str) -> Result<()> {
    if value.is_empty() {
        return Err(ConfigError::invalid(key, "name must not be empty"));
    }
    if let Some(bad) = value.chars().find(|c| !is_name_char(*c)) {
        return Err(ConfigError::invalid(
            key,
            format!("character {bad:?} is not allowed in \"{value}\" (use A-Z, a-z, 0-9, '.', '_', '-')"),
        ));
    }
    if value.starts_with('.') {
        return Err(ConfigError::invalid(
            key,
            format!("\"{value}\" must not start with '.'"),
        ));
    }
    let stem_len = value.len().saturating_sub(extension.len());
    if !value.ends_with(extension) || stem_len == 0 {
        return Err(ConfigError::invalid(
            key,
            format!("\"{value}\" must end with {extension}"),
        ));
    }
    Ok(())
}

macro_rules! file_name_type {
    ($(#[$meta:meta])* $name:ident, $key:literal, $ext:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name(String);

        impl $name {
            /// Return the name as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<&str> for $name {
            type Error = ConfigError;

            fn try_from(value: &str) -> Result<Self> {
                validate_file_name($key, value, $ext)?;
                Ok(Self(value.to_owned()))
            }
        }

        impl TryFrom<String> for $name {
            type Error = ConfigError;

            fn try_from(value: String) -> Result<Self> {
                validate_file_name($key, &value, $ext)?;
                Ok(Self(value))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

file_name_type!(
    /// File name of the packaged archive, e.g. `app.zip`.
    ///
    /// # Examples
    ///
    /// ```
    /// use sitedrop::names::ArchiveName;
    ///
    /// let name = ArchiveName::try_from("app.zip").unwrap();
    /// assert_eq!(name.as_str(), "app.zip");
    /// assert!(ArchiveName::try_from("../app.zip").is_err());
    /// ```
    ArchiveName,
    "local.archive_name",
    ".zip"
);

file_name_type!(
    /// File name of the generated extraction program, e.g. `_unzip.php`.
    ScriptName,
    "site.trigger_script",
    ".php"
);

/// An absolute remote directory, always with leading and trailing `/`.
///
/// # Examples
///
/// ```
/// use sitedrop::names::RemoteDir;
///
/// let dir = RemoteDir::try_from("site/public_html").unwrap();
/// assert_eq!(dir.as_str(), "/site/public_html/");
/// assert_eq!(dir.join("app.zip"), "/site/public_html/app.zip");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteDir(String);

impl RemoteDir {
    /// Return the directory path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Join a bare file name onto this directory.
    #[must_use]
    pub fn join(&self, name: &str) -> String {
        format!("{}{}", self.0, name.trim_start_matches('/'))
    }
}

impl TryFrom<&str> for RemoteDir {
    type Error = ConfigError;

    fn try_from(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::invalid(
                "remote.base_path",
                "remote path must not be empty",
            ));
        }
        let segments: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();
        if segments.iter().any(|s| *s == "." || *s == "..") {
            return Err(ConfigError::invalid(
                "remote.base_path",
                format!("\"{trimmed}\" must not contain '.' or '..' segments"),
            ));
        }
        if segments.is_empty() {
            return Ok(Self("/".to_owned()));
        }
        Ok(Self(format!("/{}/", segments.join("/"))))
    }
}

impl fmt::Display for RemoteDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Public base URL of the deployed site, without a trailing `/`.
///
/// # Examples
///
/// ```
/// use sitedrop::names::{ScriptName, SiteUrl};
///
/// let url = SiteUrl::try_from("http://example.net/").unwrap();
/// let script = ScriptName::try_from("_unzip.php").unwrap();
/// assert_eq!(url.endpoint(&script), "http://example.net/_unzip.php");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SiteUrl(String);

impl SiteUrl {
    /// Return the URL as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Public URL of a script placed in the site's root directory.
    #[must_use]
    pub fn endpoint(&self, script: &ScriptName) -> String {
        format!("{}/{}", self.0, script.as_str())
    }
}

impl TryFrom<&str> for SiteUrl {
    type Error = ConfigError;

    fn try_from(value: &str) -> Result<Self> {
        let trimmed = value.trim().trim_end_matches('/');
        let rest = trimmed
            .strip_prefix("http://")
            .or_else(|| trimmed.strip_prefix("https://"))
            .ok_or_else(|| {
                ConfigError::invalid("site.url", format!("\"{value}\" must start with http:// or https://"))
            })?;
        if rest.is_empty() || rest.chars().any(char::is_whitespace) {
            return Err(ConfigError::invalid(
                "site.url",
                format!("\"{value}\" has no valid host"),
            ));
        }
        Ok(Self(trimmed.to_owned()))
    }
}

impl fmt::Display for SiteUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::plain("app.zip")]
    #[case::dashed("site-build_2.zip")]
    fn accepts_archive_names(#[case] value: &str) {
        assert!(ArchiveName::try_from(value).is_ok());
    }

    #[rstest]
    #[case::empty("")]
    #[case::traversal("../app.zip")]
    #[case::nested("dist/app.zip")]
    #[case::quote("app'.zip")]
    #[case::php_breakout("a';system('id');'.zip")]
    #[case::wrong_extension("app.tar")]
    #[case::extension_only(".zip")]
    #[case::hidden(".app.zip")]
    fn rejects_archive_names(#[case] value: &str) {
        let err = ArchiveName::try_from(value).expect_err("should reject");
        assert!(err.to_string().contains("local.archive_name"));
    }

    #[test]
    fn script_name_requires_php_extension() {
        assert!(ScriptName::try_from("_unzip.php").is_ok());
        assert!(ScriptName::try_from("_unzip.sh").is_err());
    }

    #[rstest]
    #[case::bare("site", "/site/")]
    #[case::slashed("/site/", "/site/")]
    #[case::nested("/a.example/public_html", "/a.example/public_html/")]
    #[case::doubled("//a//b//", "/a/b/")]
    #[case::root("/", "/")]
    fn remote_dir_is_normalised(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(RemoteDir::try_from(input).expect("valid").as_str(), expected);
    }

    #[rstest]
    #[case::empty("")]
    #[case::parent("/site/../etc")]
    #[case::current("/site/./x")]
    fn remote_dir_rejects(#[case] input: &str) {
        assert!(RemoteDir::try_from(input).is_err());
    }

    #[test]
    fn remote_dir_join_does_not_double_slashes() {
        let dir = RemoteDir::try_from("/site/").expect("valid");
        assert_eq!(dir.join("/app.zip"), "/site/app.zip");
        assert_eq!(RemoteDir::try_from("/").expect("valid").join("app.zip"), "/app.zip");
    }

    #[rstest]
    #[case::http("http://example.net", "http://example.net")]
    #[case::trailing("https://example.net/", "https://example.net")]
    #[case::subpath("https://example.net/app/", "https://example.net/app")]
    fn site_url_is_normalised(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(SiteUrl::try_from(input).expect("valid").as_str(), expected);
    }

    #[rstest]
    #[case::scheme("ftp://example.net")]
    #[case::no_host("http://")]
    #[case::bare("example.net")]
    fn site_url_rejects(#[case] input: &str) {
        assert!(SiteUrl::try_from(input).is_err());
    }
}
