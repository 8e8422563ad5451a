//! Behaviour-driven tests for build packaging.
//!
//! These scenarios package a real directory tree and read the archive back.
//! Tests use the rstest-bdd v0.5.0 mutable world pattern.

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use sitedrop_deployer::artefact::extraction::extract_to_dir;
use sitedrop_deployer::artefact::packaging::{Artifact, package_directory};
use sitedrop_deployer::artefact::packaging_error::PackagingError;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// World types
// ---------------------------------------------------------------------------

struct PackagingWorld {
    temp_dir: TempDir,
    build_files: Vec<String>,
    artifact: Option<Artifact>,
    error: Option<PackagingError>,
}

#[fixture]
fn world() -> PackagingWorld {
    PackagingWorld {
        temp_dir: TempDir::new().expect("temp dir"),
        build_files: Vec::new(),
        artifact: None,
        error: None,
    }
}

fn build_dir(world: &PackagingWorld) -> PathBuf {
    world.temp_dir.path().join("out")
}

fn archive_path(world: &PackagingWorld) -> PathBuf {
    world.temp_dir.path().join("app.zip")
}

// ---------------------------------------------------------------------------
// Step definitions
// ---------------------------------------------------------------------------

#[given("a build file \"{name}\"")]
fn given_build_file(world: &mut PackagingWorld, name: String) {
    let path = build_dir(world).join(&name);
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(&path, format!("contents of {name}")).expect("write");
    world.build_files.push(name);
}

#[given("no build directory")]
fn given_no_build_dir(world: &mut PackagingWorld) {
    assert!(!build_dir(world).exists());
}

#[given("an empty build directory")]
fn given_empty_build_dir(world: &mut PackagingWorld) {
    fs::create_dir_all(build_dir(world).join("assets")).expect("mkdir");
}

#[when("the build is packaged")]
fn when_packaged(world: &mut PackagingWorld) {
    match package_directory(&build_dir(world), &archive_path(world)) {
        Ok(artifact) => world.artifact = Some(artifact),
        Err(e) => world.error = Some(e),
    }
}

#[then("the archive holds {files} files and {dirs} directory")]
fn then_archive_counts(world: &mut PackagingWorld, files: usize, dirs: usize) {
    let artifact = world.artifact.as_ref().expect("packaging succeeded");
    assert_eq!(artifact.summary().files, files);
    assert_eq!(artifact.summary().directories, dirs);
    assert_eq!(artifact.summary().file_name, "app.zip");
    assert_eq!(artifact.summary().sha256.len(), 64);
}

#[then("extracting the archive reproduces the build")]
fn then_extraction_matches(world: &mut PackagingWorld) {
    let artifact = world.artifact.as_ref().expect("packaging succeeded");
    let dest = world.temp_dir.path().join("unpacked");
    let mut written = extract_to_dir(artifact.path(), &dest).expect("extract");
    written.sort();
    let mut expected = world.build_files.clone();
    expected.sort();
    assert_eq!(written, expected);

    for name in &world.build_files {
        let contents = fs::read_to_string(dest.join(name)).expect("read");
        assert_eq!(contents, format!("contents of {name}"));
    }
}

#[then("packaging fails with \"{snippet}\"")]
fn then_packaging_fails(world: &mut PackagingWorld, snippet: String) {
    let error = world.error.as_ref().expect("packaging failed");
    let message = error.to_string();
    assert!(
        message.contains(&snippet),
        "expected '{message}' to mention '{snippet}'"
    );
}

#[then("no archive is left behind")]
fn then_no_archive(world: &mut PackagingWorld) {
    assert!(!archive_path(world).exists());
}

// ---------------------------------------------------------------------------
// Scenario bindings
// ---------------------------------------------------------------------------

#[scenario(
    path = "tests/features/packaging.feature",
    name = "Package a nested build directory"
)]
fn scenario_package_nested_build(world: PackagingWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/packaging.feature",
    name = "A missing build directory is rejected"
)]
fn scenario_missing_build_dir(world: PackagingWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/packaging.feature",
    name = "An empty build directory is rejected"
)]
fn scenario_empty_build_dir(world: PackagingWorld) {
    let _ = world;
}
