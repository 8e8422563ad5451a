//! CLI argument definitions for `sitedrop`.
//!
//! Kept apart from the entrypoint so the binary stays focused on wiring.

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Deploy a static site build to FTP-only shared hosting.
#[derive(Parser, Debug)]
#[command(name = "sitedrop")]
#[command(version, about)]
#[command(long_about = concat!(
    "Deploy a static site build to FTP-only shared hosting.\n\n",
    "sitedrop zips the local build directory, uploads the archive over FTP or ",
    "FTPS, uploads a single-use PHP extraction program next to it, and fetches ",
    "that program over HTTP. The program unpacks the archive in place and then ",
    "deletes both the archive and itself.\n\n",
    "Settings come from sitedrop.toml and SITEDROP_* environment variables.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Deploy, clearing the remote directory first (the default):\n",
    "    $ sitedrop deploy\n\n",
    "  Show what would be uploaded without connecting:\n",
    "    $ sitedrop deploy --dry-run\n\n",
    "  Inspect the remote directory after a failed run:\n",
    "    $ sitedrop status\n\n",
    "  Empty the remote directory:\n",
    "    $ sitedrop reset",
))]
pub struct Cli {
    /// Configuration file [default: ./sitedrop.toml, then the user config dir].
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Increase log verbosity (repeatable: -v, -vv).
    #[arg(
        short,
        long = "verbose",
        action = clap::ArgAction::Count,
        conflicts_with = "quiet",
        global = true
    )]
    pub verbosity: u8,

    /// Only log warnings and errors.
    #[arg(short, long, conflicts_with = "verbosity", global = true)]
    pub quiet: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Package, upload, and extract the build on the remote host.
    Deploy(DeployArgs),

    /// Empty the remote directory.
    Reset,

    /// Report what the remote directory currently holds.
    Status(StatusArgs),
}

/// Arguments for the deploy command.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployArgs {
    /// Empty the remote directory before uploading, whatever the config says.
    #[arg(long, conflicts_with = "no_clear")]
    pub reset_first: bool,

    /// Do not empty the remote directory before uploading.
    #[arg(long)]
    pub no_clear: bool,

    /// Package the build and print the plan without contacting the host.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the result as JSON.
    #[arg(long)]
    pub json: bool,
}

impl DeployArgs {
    /// Whether to clear first, given the configured default.
    #[must_use]
    pub fn clear_first(&self, configured: bool) -> bool {
        if self.reset_first {
            true
        } else if self.no_clear {
            false
        } else {
            configured
        }
    }
}

/// Arguments for the status command.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusArgs {
    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
