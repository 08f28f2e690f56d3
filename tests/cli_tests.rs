//! Integration tests for the `rulegraph` binary using `assert_cmd`.
//!
//! Each test writes a manifest into a temporary directory and checks what the
//! binary prints for it.

use anyhow::{Context, Result};
use assert_cmd::Command;
use predicates::prelude::*;
use rstest::{fixture, rstest};
use serde_json::Value;
use std::fs;
use tempfile::{TempDir, tempdir};

const MANIFEST: &str = r#"{
    "targets": [
        { "name": "app", "steps": [{ "name": "cc" }, { "name": "ld", "kind": "link" }] }
    ],
    "commands": [
        { "args": "OUTPUT app.o COMMAND cc -c gen.c DEPENDS gen.c" },
        { "args": ["OUTPUT", "gen.c", "COMMAND", "gen", "DEPENDS", "gen.in"] },
        { "name": "add_custom_command", "args": "TARGET app POST_BUILD COMMAND strip app" },
        { "args": "TARGET app PRE_BUILD COMMAND echo 'starting build'" }
    ]
}"#;

#[fixture]
fn project() -> TempDir {
    let dir = tempdir().expect("create temp dir");
    fs::write(dir.path().join("Rulefile.json"), MANIFEST).expect("write manifest");
    dir
}

fn rulegraph(dir: &TempDir) -> Result<Command> {
    let mut cmd = Command::cargo_bin("rulegraph").context("locate rulegraph binary")?;
    cmd.current_dir(dir.path());
    Ok(cmd)
}

#[rstest]
fn plan_is_the_default_command(project: TempDir) -> Result<()> {
    let output = rulegraph(&project)?.output().context("run rulegraph")?;
    assert!(output.status.success(), "plan should succeed");
    let json: Value = serde_json::from_slice(&output.stdout).context("parse plan JSON")?;
    assert_eq!(json["rules"][0]["outputs"][0], "gen.c");
    assert_eq!(json["rules"][1]["outputs"][0], "app.o");
    assert_eq!(json["rules"][1]["after"][0], "gen.c");
    assert_eq!(json["external_inputs"], serde_json::json!(["gen.in"]));
    assert_eq!(json["targets"][0]["target"], "app");
    Ok(())
}

#[rstest]
fn directory_flag_locates_the_manifest(project: TempDir) -> Result<()> {
    let elsewhere = tempdir().context("create second temp dir")?;
    let mut cmd = Command::cargo_bin("rulegraph").context("locate rulegraph binary")?;
    cmd.current_dir(elsewhere.path())
        .arg("-C")
        .arg(project.path())
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("gen.c"));
    Ok(())
}

#[rstest]
fn sequence_merges_phases_with_steps(project: TempDir) -> Result<()> {
    rulegraph(&project)?
        .args(["sequence", "app"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("PRE_BUILD: echo "))
        .stdout(predicate::str::contains("starting build"))
        .stdout(predicate::str::ends_with(
            "\nstep: cc\nstep: ld\nPOST_BUILD: strip app\n",
        ));
    Ok(())
}

#[rstest]
fn graph_emits_dot(project: TempDir) -> Result<()> {
    rulegraph(&project)?
        .arg("graph")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("digraph rules {"))
        .stdout(predicate::str::contains("r1 -> r0;"));
    Ok(())
}

#[rstest]
fn unknown_sequence_target_fails(project: TempDir) -> Result<()> {
    rulegraph(&project)?
        .args(["sequence", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown target 'missing'"));
    Ok(())
}

#[rstest]
fn cycle_is_reported_on_stderr() -> Result<()> {
    let dir = tempdir().context("create temp dir")?;
    fs::write(
        dir.path().join("Rulefile.json"),
        r#"{ "commands": [
            { "args": "OUTPUT a COMMAND mk DEPENDS b" },
            { "args": "OUTPUT b COMMAND mk DEPENDS a" }
        ] }"#,
    )
    .context("write manifest")?;
    rulegraph(&dir)?
        .assert()
        .failure()
        .stderr(predicate::str::contains("circular dependency detected: a -> b -> a"));
    Ok(())
}

#[rstest]
fn malformed_declaration_names_the_call() -> Result<()> {
    let dir = tempdir().context("create temp dir")?;
    fs::write(
        dir.path().join("Rulefile.json"),
        r#"{ "targets": [{ "name": "app" }], "commands": [
            { "args": "TARGET app COMMAND x" }
        ] }"#,
    )
    .context("write manifest")?;
    rulegraph(&dir)?
        .assert()
        .failure()
        .stderr(predicate::str::contains("ADD_CUSTOM_COMMAND call #1"))
        .stderr(predicate::str::contains("malformed custom command"));
    Ok(())
}

#[rstest]
fn missing_manifest_fails() -> Result<()> {
    let dir = tempdir().context("create temp dir")?;
    rulegraph(&dir)?
        .assert()
        .failure()
        .stderr(predicate::str::contains("Rulefile.json"));
    Ok(())
}

#[rstest]
#[case("add_custom_command")]
#[case("ADD_CUSTOM_COMMAND")]
fn describe_prints_documentation(#[case] name: &str) -> Result<()> {
    let dir = tempdir().context("create temp dir")?;
    rulegraph(&dir)?
        .args(["describe", name])
        .assert()
        .success()
        .stdout(predicate::str::contains("PRE_LINK"));
    Ok(())
}
