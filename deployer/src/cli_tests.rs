//! Tests for CLI parsing.

use super::*;
use rstest::rstest;

#[test]
fn cli_parses_deploy_defaults() {
    let cli = Cli::parse_from(["sitedrop", "deploy"]);
    assert_eq!(cli.command, Command::Deploy(DeployArgs::default()));
    assert!(cli.config.is_none());
    assert_eq!(cli.verbosity, 0);
    assert!(!cli.quiet);
}

#[test]
fn cli_parses_global_options_after_subcommand() {
    let cli = Cli::parse_from(["sitedrop", "reset", "-c", "deploy/site.toml", "-vv"]);
    assert_eq!(cli.command, Command::Reset);
    assert_eq!(cli.config, Some(Utf8PathBuf::from("deploy/site.toml")));
    assert_eq!(cli.verbosity, 2);
}

#[test]
fn cli_parses_status_json() {
    let cli = Cli::parse_from(["sitedrop", "status", "--json"]);
    assert_eq!(cli.command, Command::Status(StatusArgs { json: true }));
}

#[test]
fn cli_parses_deploy_flags() {
    let cli = Cli::parse_from(["sitedrop", "deploy", "--no-clear", "--dry-run", "--json"]);
    match cli.command {
        Command::Deploy(args) => {
            assert!(args.no_clear);
            assert!(args.dry_run);
            assert!(args.json);
            assert!(!args.reset_first);
        }
        other => panic!("expected Deploy command, got {other:?}"),
    }
}

#[rstest]
#[case::reset_and_no_clear(&["sitedrop", "deploy", "--reset-first", "--no-clear"])]
#[case::verbose_and_quiet(&["sitedrop", "-v", "-q", "status"])]
#[case::missing_subcommand(&["sitedrop"])]
#[case::unknown_subcommand(&["sitedrop", "rollback"])]
fn cli_rejects_invalid_usage(#[case] args: &[&str]) {
    assert!(Cli::try_parse_from(args).is_err());
}

#[rstest]
#[case::configured_default(DeployArgs::default(), true, true)]
#[case::configured_off(DeployArgs::default(), false, false)]
#[case::reset_first(DeployArgs { reset_first: true, ..DeployArgs::default() }, false, true)]
#[case::no_clear(DeployArgs { no_clear: true, ..DeployArgs::default() }, true, false)]
fn clear_first_respects_flags(
    #[case] args: DeployArgs,
    #[case] configured: bool,
    #[case] expected: bool,
) {
    assert_eq!(args.clear_first(configured), expected);
}
