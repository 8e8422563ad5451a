//! Command dispatch for the `sitedrop` binary.
//!
//! The network seams are injected through [`Runtime`] so the whole command
//! surface can run against an in-memory host in tests.

use crate::bridge::trigger::ExtractionTrigger;
use crate::cli::{Cli, Command, DeployArgs, StatusArgs};
use crate::output::{StatusReport, deploy_report, failure_hint, plan_report, to_json, write_line};
use crate::pipeline::{DeployOptions, Deployer, error_chain, plan, probe_remote, reset};
use crate::transport::Connector;
use serde::Serialize;
use sitedrop::config::DeploymentConfig;
use std::io::Write;

/// Process exit code for success.
pub const EXIT_OK: i32 = 0;
/// Process exit code for a failed deployment, reset, or probe.
pub const EXIT_FAILURE: i32 = 1;
/// Process exit code for configuration or usage errors.
pub const EXIT_USAGE: i32 = 2;

/// The remote seams a command runs against.
pub struct Runtime<'a> {
    /// Opens transport sessions.
    pub connector: &'a dyn Connector,
    /// Fires the extraction program.
    pub trigger: &'a dyn ExtractionTrigger,
}

/// Load configuration and run the selected command. Returns the exit code.
pub fn dispatch(
    cli: &Cli,
    runtime: &Runtime<'_>,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> i32 {
    let config = match DeploymentConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            write_line(stderr, format!("configuration error: {}", error_chain(&err)));
            return EXIT_USAGE;
        }
    };
    run_command(&cli.command, &config, runtime, stdout, stderr)
}

/// Run `command` against an already loaded configuration.
pub fn run_command(
    command: &Command,
    config: &DeploymentConfig,
    runtime: &Runtime<'_>,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> i32 {
    match command {
        Command::Deploy(args) => run_deploy(args, config, runtime, stdout, stderr),
        Command::Reset => run_reset(config, runtime, stdout, stderr),
        Command::Status(args) => run_status(args, config, runtime, stdout, stderr),
    }
}

fn run_deploy(
    args: &DeployArgs,
    config: &DeploymentConfig,
    runtime: &Runtime<'_>,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> i32 {
    let options = DeployOptions {
        clear_first: args.clear_first(config.clear_before_deploy),
    };

    if args.dry_run {
        return match plan(config, options) {
            Ok(plan) if args.json => emit_json(&plan, stdout, stderr, EXIT_OK),
            Ok(plan) => {
                write_line(stdout, plan_report(&plan));
                EXIT_OK
            }
            Err(err) => {
                write_line(stderr, error_chain(&err));
                EXIT_FAILURE
            }
        };
    }

    let result = Deployer::new(config, runtime.connector, runtime.trigger, options).run();
    let code = if result.is_success() {
        EXIT_OK
    } else {
        EXIT_FAILURE
    };
    if args.json {
        return emit_json(&result, stdout, stderr, code);
    }
    if result.is_success() {
        write_line(stdout, deploy_report(&result));
    } else {
        write_line(stderr, deploy_report(&result));
    }
    code
}

fn run_reset(
    config: &DeploymentConfig,
    runtime: &Runtime<'_>,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> i32 {
    match reset(config, runtime.connector) {
        Ok(()) => {
            write_line(stdout, format!("Cleared {}", config.remote.base_path));
            EXIT_OK
        }
        Err(err) => {
            write_line(stderr, format!("Reset FAILED: {}", error_chain(&err)));
            if let Some(hint) = failure_hint(err.stage()) {
                write_line(stderr, hint);
            }
            EXIT_FAILURE
        }
    }
}

fn run_status(
    args: &StatusArgs,
    config: &DeploymentConfig,
    runtime: &Runtime<'_>,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> i32 {
    match probe_remote(config, runtime.connector) {
        Ok(state) => {
            let report = StatusReport::new(config.remote.base_path.to_string(), state);
            if args.json {
                emit_json(&report, stdout, stderr, EXIT_OK)
            } else {
                write_line(stdout, report.display_text());
                EXIT_OK
            }
        }
        Err(err) => {
            write_line(stderr, format!("Status FAILED: {}", error_chain(&err)));
            EXIT_FAILURE
        }
    }
}

fn emit_json<T: Serialize>(
    value: &T,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
    code: i32,
) -> i32 {
    match to_json(value) {
        Ok(json) => {
            write_line(stdout, json);
            code
        }
        Err(err) => {
            write_line(stderr, format!("cannot render JSON: {err}"));
            EXIT_FAILURE
        }
    }
}
