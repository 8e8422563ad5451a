//! Log backend for the `sitedrop` binary.
//!
//! Library code logs through the `log` facade; the binary installs a
//! `tracing-subscriber` formatter on stderr, whose `log` bridge collects
//! those records.

use tracing_subscriber::EnvFilter;

/// Filter directive for the given CLI flags, or `None` to defer to
/// `RUST_LOG`.
#[must_use]
pub fn flag_directive(verbosity: u8, quiet: bool) -> Option<&'static str> {
    match (quiet, verbosity) {
        (true, _) => Some("warn"),
        (false, 0) => None,
        (false, 1) => Some("debug"),
        (false, _) => Some("trace"),
    }
}

/// Build the filter: CLI flags first, then `RUST_LOG`, then `info`.
#[must_use]
pub fn build_filter(verbosity: u8, quiet: bool) -> EnvFilter {
    match flag_directive(verbosity, quiet) {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

/// Install the stderr subscriber. A second call has no effect.
pub fn init(verbosity: u8, quiet: bool) {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(build_filter(verbosity, quiet))
        .with_writer(std::io::stderr)
        .with_target(verbosity > 1)
        .try_init();
    if installed.is_err() {
        log::debug!("log subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::default(0, false, None)]
    #[case::verbose(1, false, Some("debug"))]
    #[case::very_verbose(3, false, Some("trace"))]
    #[case::quiet(0, true, Some("warn"))]
    fn flags_map_to_directives(
        #[case] verbosity: u8,
        #[case] quiet: bool,
        #[case] expected: Option<&str>,
    ) {
        assert_eq!(flag_directive(verbosity, quiet), expected);
    }

    #[test]
    fn rust_log_applies_without_flags() {
        temp_env::with_var("RUST_LOG", Some("sitedrop_deployer=trace"), || {
            let filter = build_filter(0, false);
            assert!(filter.to_string().contains("sitedrop_deployer=trace"));
        });
    }

    #[test]
    fn flags_override_rust_log() {
        temp_env::with_var("RUST_LOG", Some("trace"), || {
            assert_eq!(build_filter(0, true).to_string(), "warn");
        });
    }
}
