//! Integration tests for the bookflow binary.
// The cargo_bin function is marked deprecated in favor of cargo_bin! macro,
// but both work correctly.
#![allow(deprecated)]

use assert_cmd::cargo::cargo_bin;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const PROJECT: &str = r#"
settings:
  sources: [laguna, vulkan]
  storage_target: books-raw
pipelines:
  - "pipelines/*.yaml"
"#;

const INGEST: &str = r#"
name: ingest
description: Scrape every source then count rows
summary: { task: count_rows, label: Books Loaded }
tasks:
  - id: scrape
    for_each: sources
    kind: { type: work, command: "echo scraping {source} into {storage_target}" }
  - id: count_rows
    depends_on: [scrape]
    kind: { type: work, command: "echo 42", capture: text }
  - id: run_checks
    depends_on: [count_rows]
    kind: { type: work, command: "echo '[[0]]'", capture: json }
  - id: gate
    depends_on: [run_checks]
    kind: { type: quality_gate, upstream: run_checks }
"#;

const BROKEN_CHECK: &str = r#"
name: broken_check
tasks:
  - id: run_checks
    kind: { type: work, command: "echo '[[\"3\"], \"abc\", 0]'", capture: json }
  - id: gate
    kind: { type: quality_gate, upstream: run_checks }
  - id: always
    depends_on: [gate]
    trigger_rule: all_done
    kind: { type: work, command: "echo cleanup" }
"#;

fn setup_project(pipelines: &[(&str, &str)]) -> TempDir {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("bookflow.yaml"), PROJECT).unwrap();
    fs::create_dir_all(temp.path().join("pipelines")).unwrap();
    for (name, content) in pipelines {
        fs::write(temp.path().join("pipelines").join(name), content).unwrap();
    }
    temp
}

fn bookflow(temp: &TempDir) -> Command {
    let mut cmd = Command::new(cargo_bin("bookflow"));
    cmd.current_dir(temp.path());
    cmd.env("NO_COLOR", "1");
    cmd.env_remove("BOOKFLOW_SOURCES");
    cmd.env_remove("BOOKFLOW_STORAGE_TARGET");
    cmd
}

#[test]
fn cli_shows_help() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin("bookflow"));
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Pipeline orchestration"));
    Ok(())
}

#[test]
fn cli_list_shows_pipelines() -> Result<(), Box<dyn std::error::Error>> {
    let temp = setup_project(&[("ingest.yaml", INGEST), ("broken.yaml", BROKEN_CHECK)]);
    bookflow(&temp)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("ingest (5 tasks)"))
        .stdout(predicate::str::contains("broken_check (3 tasks)"));
    Ok(())
}

#[test]
fn cli_missing_project_fails() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    bookflow(&temp)
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("bookflow.yaml"));
    Ok(())
}

#[test]
fn cli_validate_all() -> Result<(), Box<dyn std::error::Error>> {
    let temp = setup_project(&[("ingest.yaml", INGEST)]);
    bookflow(&temp)
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("All pipelines are valid!"));
    Ok(())
}

#[test]
fn cli_validate_reports_cycle() -> Result<(), Box<dyn std::error::Error>> {
    let cyclic = r#"
name: cyclic
tasks:
  - id: a
    depends_on: [b]
    kind: { type: work, command: "true" }
  - id: b
    depends_on: [a]
    kind: { type: work, command: "true" }
"#;
    let temp = setup_project(&[("cyclic.yaml", cyclic)]);
    bookflow(&temp)
        .args(["validate", "cyclic"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Circular dependency"));
    Ok(())
}

#[test]
fn cli_run_succeeds_and_reports_summary() -> Result<(), Box<dyn std::error::Error>> {
    let temp = setup_project(&[("ingest.yaml", INGEST)]);
    bookflow(&temp)
        .args(["run", "ingest"])
        .assert()
        .success()
        .stdout(predicate::str::contains("scrape_laguna"))
        .stdout(predicate::str::contains("scrape_vulkan"))
        .stdout(predicate::str::contains("Books Loaded: 42"))
        .stdout(predicate::str::contains("Pipeline completed successfully"));
    Ok(())
}

#[test]
fn cli_run_fails_on_quality_gate() -> Result<(), Box<dyn std::error::Error>> {
    let temp = setup_project(&[("broken.yaml", BROKEN_CHECK)]);
    bookflow(&temp)
        .args(["run", "broken_check"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Pipeline failed"))
        .stderr(predicate::str::contains("3 issues found in 'run_checks'"));
    Ok(())
}

#[test]
fn cli_run_unknown_pipeline_fails() -> Result<(), Box<dyn std::error::Error>> {
    let temp = setup_project(&[("ingest.yaml", INGEST)]);
    bookflow(&temp)
        .args(["run", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope"));
    Ok(())
}

#[test]
fn cli_run_dry_run_skips_tasks() -> Result<(), Box<dyn std::error::Error>> {
    let temp = setup_project(&[("broken.yaml", BROKEN_CHECK)]);
    bookflow(&temp)
        .args(["run", "broken_check", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Pipeline completed successfully"));
    Ok(())
}

#[test]
fn cli_run_passes_params() -> Result<(), Box<dyn std::error::Error>> {
    let echo = r#"
name: echo_param
summary: { task: show, label: Version }
tasks:
  - id: show
    kind: { type: work, command: "echo $BOOKFLOW_PARAM_DATASET_VERSION", capture: text }
"#;
    let temp = setup_project(&[("echo.yaml", echo)]);
    bookflow(&temp)
        .args(["run", "echo_param", "--param", "dataset_version=2024-01"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Version: 2024-01"));
    Ok(())
}

#[test]
fn cli_graph_mermaid() -> Result<(), Box<dyn std::error::Error>> {
    let temp = setup_project(&[("ingest.yaml", INGEST)]);
    bookflow(&temp)
        .args(["graph", "ingest", "--format", "mermaid"])
        .assert()
        .success()
        .stdout(predicate::str::contains("graph TD"))
        .stdout(predicate::str::contains("scrape_laguna --> count_rows"));
    Ok(())
}

#[test]
fn cli_check_passes_zero() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    bookflow(&temp)
        .args(["check", r#"[["0.0"]]"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("Check passed"));
    Ok(())
}

#[test]
fn cli_check_fails_on_positive_count() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    bookflow(&temp)
        .args(["check", r#"[["3"], "abc", 0]"#])
        .assert()
        .failure()
        .stdout(predicate::str::contains("3 issues found"));
    Ok(())
}

#[test]
fn cli_check_fails_without_number() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    bookflow(&temp)
        .args(["check", r#"["abc"]"#])
        .assert()
        .failure()
        .stdout(predicate::str::contains("No numeric result"));
    Ok(())
}

fn demo_project() -> Command {
    let mut cmd = Command::new(cargo_bin("bookflow"));
    cmd.arg("-C").arg(concat!(env!("CARGO_MANIFEST_DIR"), "/pipelines"));
    cmd.env("NO_COLOR", "1");
    cmd.env_remove("BOOKFLOW_SOURCES");
    cmd.env_remove("BOOKFLOW_STORAGE_TARGET");
    cmd.env_remove("BOOKFLOW_PROJECT");
    cmd
}

#[test]
fn cli_demo_project_is_valid() -> Result<(), Box<dyn std::error::Error>> {
    demo_project()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("scrapy_to_postgres"))
        .stdout(predicate::str::contains("data_validation (7 tasks)"));

    demo_project()
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("All pipelines are valid!"));
    Ok(())
}

#[test]
fn cli_demo_ingestion_fans_out_per_publisher() -> Result<(), Box<dyn std::error::Error>> {
    demo_project()
        .args(["graph", "book_ingestion_and_transformation", "--format", "mermaid"])
        .assert()
        .success()
        .stdout(predicate::str::contains("create_schema_tables --> scrape_laguna"))
        .stdout(predicate::str::contains("scrape_prometej --> validate_s3_data"));
    Ok(())
}

#[test]
fn cli_graph_defaults_to_text() -> Result<(), Box<dyn std::error::Error>> {
    demo_project()
        .args(["graph", "data_validation"])
        .assert()
        .success()
        .stdout(predicate::str::contains("check_raw_results"));
    Ok(())
}

#[test]
fn cli_check_treats_booleans_as_counts() -> Result<(), Box<dyn std::error::Error>> {
    let temp = TempDir::new()?;
    bookflow(&temp)
        .args(["check", "true"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("1 issues found"));
    bookflow(&temp)
        .args(["check", "[false, 5]"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Check passed"));
    Ok(())
}
