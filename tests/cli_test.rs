//! End-to-end tests for the `reprun` binary.
#![cfg(unix)]
// The cargo_bin function is marked deprecated in favor of cargo_bin! macro,
// but both work correctly. Suppressing until assert_cmd stabilizes the new API.
#![allow(deprecated)]

use assert_cmd::cargo::cargo_bin;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const WAGES_PIPELINE: &str = r#"
name: wages
stages:
  - name: setup
    command: ["sh", "-c", "mkdir -p build && echo ok > build/setup.ok && echo setup >> calls.log"]
    outputs: [build/setup.ok]
  - name: clean
    command: ["sh", "-c", "test ! -f fail.flag || { echo 'wage column missing' >&2; exit 1; }; cat raw.csv > build/clean.csv && echo clean >> calls.log"]
    inputs: [raw.csv]
    outputs: [build/clean.csv]
    depends_on: [setup]
  - name: analyze
    command: ["sh", "-c", "wc -l < build/clean.csv > build/results.txt && echo analyze >> calls.log"]
    inputs: [build/clean.csv]
    outputs: [build/results.txt]
    depends_on: [clean]
"#;

fn setup_project(pipeline: &str) -> TempDir {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("pipeline.yml"), pipeline).unwrap();
    fs::write(temp.path().join("raw.csv"), "id,wage\n1,10\n2,12\n").unwrap();
    temp
}

fn reprun(dir: &Path) -> Command {
    let mut cmd = Command::new(cargo_bin("reprun"));
    cmd.current_dir(dir).env("NO_COLOR", "1").env_remove("RUST_LOG");
    cmd
}

fn calls(dir: &Path) -> Vec<String> {
    fs::read_to_string(dir.join("calls.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn cli_shows_help() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin("reprun"));
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("history"));
    Ok(())
}

#[test]
fn cli_shows_version() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin("reprun"));
    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
    Ok(())
}

#[test]
fn run_executes_stages_in_dependency_order() -> Result<(), Box<dyn std::error::Error>> {
    let temp = setup_project(WAGES_PIPELINE);

    reprun(temp.path())
        .args(["run", "pipeline.yml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("analyze"));

    assert_eq!(calls(temp.path()), vec!["setup", "clean", "analyze"]);
    assert!(temp.path().join("build/results.txt").exists());
    assert!(temp.path().join(".reprun/ledger.yml").exists());
    assert!(temp.path().join(".reprun/reprun.log").exists());
    Ok(())
}

#[test]
fn second_run_skips_everything() -> Result<(), Box<dyn std::error::Error>> {
    let temp = setup_project(WAGES_PIPELINE);

    reprun(temp.path()).args(["run", "pipeline.yml"]).assert().success();
    reprun(temp.path())
        .args(["run", "pipeline.yml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("up to date").or(predicate::str::contains("skipped")));

    assert_eq!(calls(temp.path()).len(), 3);
    Ok(())
}

#[test]
fn changed_input_reruns_stage_and_dependents() -> Result<(), Box<dyn std::error::Error>> {
    let temp = setup_project(WAGES_PIPELINE);

    reprun(temp.path()).args(["run", "pipeline.yml"]).assert().success();
    fs::write(temp.path().join("raw.csv"), "id,wage\n1,10\n2,12\n3,15\n")?;
    reprun(temp.path()).args(["run", "pipeline.yml"]).assert().success();

    assert_eq!(
        calls(temp.path()),
        vec!["setup", "clean", "analyze", "clean", "analyze"]
    );
    Ok(())
}

#[test]
fn failed_stage_exits_one_and_stops_dependents() -> Result<(), Box<dyn std::error::Error>> {
    let temp = setup_project(WAGES_PIPELINE);
    fs::write(temp.path().join("fail.flag"), "")?;

    reprun(temp.path())
        .args(["run", "pipeline.yml"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("stage 'clean' failed"))
        .stderr(predicate::str::contains("wage column missing"));

    assert_eq!(calls(temp.path()), vec!["setup"]);
    let ledger = fs::read_to_string(temp.path().join(".reprun/ledger.yml"))?;
    assert!(!ledger.contains("analyze"));
    Ok(())
}

#[test]
fn rerun_after_failure_resumes() -> Result<(), Box<dyn std::error::Error>> {
    let temp = setup_project(WAGES_PIPELINE);
    fs::write(temp.path().join("fail.flag"), "")?;
    reprun(temp.path()).args(["run", "pipeline.yml"]).assert().code(1);

    fs::remove_file(temp.path().join("fail.flag"))?;
    reprun(temp.path()).args(["run", "pipeline.yml"]).assert().success();

    assert_eq!(calls(temp.path()), vec!["setup", "clean", "analyze"]);
    Ok(())
}

#[test]
fn missing_declared_output_fails_the_stage() -> Result<(), Box<dyn std::error::Error>> {
    let temp = setup_project(
        r#"
stages:
  - name: figures
    command: ["true"]
    outputs: [fig1.png]
"#,
    );

    reprun(temp.path())
        .args(["run", "pipeline.yml"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("declared output not produced: fig1.png"));
    Ok(())
}

#[test]
fn unknown_dependency_exits_two() -> Result<(), Box<dyn std::error::Error>> {
    let temp = setup_project(
        r#"
stages:
  - name: analyze
    command: ["true"]
    depends_on: [missing]
"#,
    );

    reprun(temp.path())
        .args(["run", "pipeline.yml"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("missing"));
    assert!(!temp.path().join(".reprun").exists());
    Ok(())
}

#[test]
fn missing_pipeline_file_exits_two() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    reprun(temp.path())
        .args(["run", "nope.yml"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("not found"));
    Ok(())
}

#[test]
fn cycle_exits_three() -> Result<(), Box<dyn std::error::Error>> {
    let temp = setup_project(
        r#"
stages:
  - name: a
    command: ["true"]
    depends_on: [b]
  - name: b
    command: ["true"]
    depends_on: [a]
"#,
    );

    reprun(temp.path())
        .args(["run", "pipeline.yml"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("cycle"));
    Ok(())
}

#[test]
fn unknown_only_selection_exits_two() -> Result<(), Box<dyn std::error::Error>> {
    let temp = setup_project(WAGES_PIPELINE);
    reprun(temp.path())
        .args(["run", "pipeline.yml", "--only", "plots"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("plots"));
    Ok(())
}

#[test]
fn dry_run_writes_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let temp = setup_project(WAGES_PIPELINE);

    reprun(temp.path())
        .args(["run", "pipeline.yml", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("would run setup"))
        .stdout(predicate::str::contains("3 stages would run"));

    assert!(calls(temp.path()).is_empty());
    assert!(!temp.path().join(".reprun").exists());
    assert!(!temp.path().join("build").exists());
    Ok(())
}

#[test]
fn from_runs_stage_and_dependents() -> Result<(), Box<dyn std::error::Error>> {
    let temp = setup_project(WAGES_PIPELINE);
    reprun(temp.path()).args(["run", "pipeline.yml"]).assert().success();

    reprun(temp.path())
        .args(["run", "pipeline.yml", "--from", "clean", "--force"])
        .assert()
        .success();

    assert_eq!(
        calls(temp.path()),
        vec!["setup", "clean", "analyze", "clean", "analyze"]
    );
    Ok(())
}

#[test]
fn parallel_workers_complete_independent_stages() -> Result<(), Box<dyn std::error::Error>> {
    let temp = setup_project(
        r#"
stages:
  - name: setup
    command: ["sh", "-c", "echo ok > setup.ok"]
    outputs: [setup.ok]
  - name: left
    command: ["sh", "-c", "test -f setup.ok && echo l > left.out"]
    outputs: [left.out]
    depends_on: [setup]
  - name: right
    command: ["sh", "-c", "test -f setup.ok && echo r > right.out"]
    outputs: [right.out]
    depends_on: [setup]
  - name: merge
    command: ["sh", "-c", "cat left.out right.out > merged.out"]
    outputs: [merged.out]
    depends_on: [left, right]
"#,
    );

    reprun(temp.path())
        .args(["run", "pipeline.yml", "--workers", "2"])
        .assert()
        .success();

    assert_eq!(fs::read_to_string(temp.path().join("merged.out"))?, "l\nr\n");
    Ok(())
}

#[test]
fn check_prints_execution_order() -> Result<(), Box<dyn std::error::Error>> {
    let temp = setup_project(WAGES_PIPELINE);

    reprun(temp.path())
        .args(["check", "pipeline.yml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1. setup"))
        .stdout(predicate::str::contains("2. clean"))
        .stdout(predicate::str::contains("3. analyze"));

    assert!(!temp.path().join(".reprun").exists());
    Ok(())
}

#[test]
fn status_reports_stale_stage() -> Result<(), Box<dyn std::error::Error>> {
    let temp = setup_project(WAGES_PIPELINE);
    reprun(temp.path()).args(["run", "pipeline.yml"]).assert().success();
    fs::write(temp.path().join("raw.csv"), "id,wage\n9,99\n")?;

    let output = reprun(temp.path())
        .args(["status", "pipeline.yml", "--json"])
        .output()?;
    assert!(output.status.success());

    let stages: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(stages[0]["stage"], "setup");
    assert_eq!(stages[0]["state"], "current");
    assert_eq!(stages[1]["state"], "stale");
    Ok(())
}

#[test]
fn history_lists_runs() -> Result<(), Box<dyn std::error::Error>> {
    let temp = setup_project(WAGES_PIPELINE);
    fs::write(temp.path().join("fail.flag"), "")?;
    reprun(temp.path()).args(["run", "pipeline.yml"]).assert().code(1);
    fs::remove_file(temp.path().join("fail.flag"))?;
    reprun(temp.path()).args(["run", "pipeline.yml"]).assert().success();

    let output = reprun(temp.path())
        .args(["history", "pipeline.yml", "--json"])
        .output()?;
    let runs: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    let runs = runs.as_array().unwrap();

    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0]["outcome"], "completed");
    assert_eq!(runs[0]["stages"]["setup"]["status"], "skipped");
    assert_eq!(runs[1]["outcome"], "aborted");
    assert_eq!(runs[1]["stages"]["clean"]["status"], "failed");
    Ok(())
}

#[test]
fn completions_generate_script() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin("reprun"));
    cmd.args(["completions", "bash"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("reprun"));
    Ok(())
}
