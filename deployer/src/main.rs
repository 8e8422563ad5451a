//! sitedrop CLI entrypoint.
//!
//! Wires the FTP connector and HTTP trigger into the command dispatcher and
//! turns its result into the process exit code.

use clap::Parser;
use sitedrop_deployer::bridge::trigger::HttpTrigger;
use sitedrop_deployer::cli::Cli;
use sitedrop_deployer::commands::{Runtime, dispatch};
use sitedrop_deployer::logging;
use sitedrop_deployer::transport::ftp::FtpConnector;

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbosity, cli.quiet);

    let connector = FtpConnector;
    let trigger = HttpTrigger;
    let runtime = Runtime {
        connector: &connector,
        trigger: &trigger,
    };
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let exit_code = dispatch(&cli, &runtime, &mut stdout, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}
