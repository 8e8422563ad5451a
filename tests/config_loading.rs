//! Behaviour-driven tests for deployment configuration loading.
//!
//! Each scenario writes a real config file and loads it with a controlled
//! set of `SITEDROP_*` variables. Tests use the rstest-bdd v0.5.0 mutable
//! world pattern.

use camino::Utf8PathBuf;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use sitedrop::config::{DeploymentConfig, env};
use std::fs;
use tempfile::TempDir;

const ALL_VARS: [&str; 9] = [
    env::HOST,
    env::USER,
    env::PASSWORD,
    env::SECURE,
    env::REMOTE_PATH,
    env::BUILD_DIR,
    env::ARCHIVE_NAME,
    env::SITE_URL,
    env::TRIGGER_SCRIPT,
];

// ---------------------------------------------------------------------------
// World types
// ---------------------------------------------------------------------------

struct ConfigWorld {
    temp_dir: TempDir,
    env: Vec<(String, String)>,
    result: Option<Result<DeploymentConfig, String>>,
}

#[fixture]
fn world() -> ConfigWorld {
    ConfigWorld {
        temp_dir: TempDir::new().expect("temp dir"),
        env: Vec::new(),
        result: None,
    }
}

fn config_path(world: &ConfigWorld) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(world.temp_dir.path().join("sitedrop.toml"))
        .expect("utf-8 temp path")
}

fn write_config(world: &ConfigWorld, contents: &str) {
    fs::write(config_path(world), contents).expect("write config");
}

fn loaded(world: &ConfigWorld) -> &DeploymentConfig {
    match world.result.as_ref() {
        Some(Ok(config)) => config,
        Some(Err(error)) => panic!("expected configuration loading to succeed: {error}"),
        None => panic!("configuration should be loaded"),
    }
}

// ---------------------------------------------------------------------------
// Step definitions
// ---------------------------------------------------------------------------

#[given("a config file for host \"{host}\" serving \"{path}\"")]
fn given_full_file(world: &mut ConfigWorld, host: String, path: String) {
    write_config(
        world,
        &format!(
            concat!(
                "[remote]\n",
                "host = \"{host}\"\n",
                "user = \"deploy\"\n",
                "password = \"s3cret\"\n",
                "base_path = \"{path}\"\n",
                "[site]\n",
                "url = \"http://example.net\"\n",
            ),
            host = host,
            path = path,
        ),
    );
}

#[given("an empty config file")]
fn given_empty_file(world: &mut ConfigWorld) {
    write_config(world, "");
}

#[given("a config file without a password")]
fn given_file_without_password(world: &mut ConfigWorld) {
    write_config(
        world,
        concat!(
            "[remote]\n",
            "host = \"ftp.example.net\"\n",
            "user = \"deploy\"\n",
            "base_path = \"/site\"\n",
            "[site]\n",
            "url = \"http://example.net\"\n",
        ),
    );
}

#[given("a config file with an unknown key")]
fn given_file_with_unknown_key(world: &mut ConfigWorld) {
    write_config(world, "[remote]\nhost = \"ftp.example.net\"\nport = 21\n");
}

#[given("the environment sets \"{var}\" to \"{value}\"")]
fn given_env(world: &mut ConfigWorld, var: String, value: String) {
    world.env.push((var, value));
}

#[when("the configuration is loaded")]
fn when_loaded(world: &mut ConfigWorld) {
    let vars: Vec<(&str, Option<&str>)> = ALL_VARS
        .iter()
        .map(|name| {
            let value = world
                .env
                .iter()
                .rev()
                .find(|(var, _)| var == name)
                .map(|(_, value)| value.as_str());
            (*name, value)
        })
        .collect();
    let path = config_path(world);
    let outcome = temp_env::with_vars(vars, || DeploymentConfig::load(Some(&path)));
    world.result = Some(outcome.map_err(|error| {
        let mut message = error.to_string();
        let mut source = std::error::Error::source(&error);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }));
}

#[then("the remote archive path is \"{expected}\"")]
fn then_archive_path(world: &mut ConfigWorld, expected: String) {
    assert_eq!(loaded(world).remote_archive_path(), expected);
}

#[then("the trigger URL is \"{expected}\"")]
fn then_trigger_url(world: &mut ConfigWorld, expected: String) {
    assert_eq!(loaded(world).trigger_url(), expected);
}

#[then("the remote host is \"{host}\" on port {port}")]
fn then_remote_host(world: &mut ConfigWorld, host: String, port: u16) {
    let config = loaded(world);
    assert_eq!(config.remote.host, host);
    assert_eq!(config.remote.port, port);
}

#[then("a configuration error mentioning \"{snippet}\" is reported")]
fn then_error(world: &mut ConfigWorld, snippet: String) {
    match world.result.as_ref() {
        Some(Err(error)) => assert!(
            error.contains(&snippet),
            "expected error '{error}' to mention '{snippet}'"
        ),
        Some(Ok(config)) => {
            panic!("expected configuration loading to fail but succeeded with {config:?}")
        }
        None => panic!("configuration should be loaded"),
    }
}

// ---------------------------------------------------------------------------
// Scenario bindings
// ---------------------------------------------------------------------------

#[scenario(
    path = "tests/features/config_loading.feature",
    name = "A config file supplies every setting"
)]
fn scenario_full_file(world: ConfigWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/config_loading.feature",
    name = "Environment variables override the file"
)]
fn scenario_env_overrides(world: ConfigWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/config_loading.feature",
    name = "The environment alone is enough"
)]
fn scenario_env_only(world: ConfigWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/config_loading.feature",
    name = "A missing password is named"
)]
fn scenario_missing_password(world: ConfigWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/config_loading.feature",
    name = "Unknown keys are rejected"
)]
fn scenario_unknown_keys(world: ConfigWorld) {
    let _ = world;
}
