use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use tempfile::TempDir;

/// Runs the binary in an empty directory with a scrubbed environment, so no
/// `.env` file or developer settings leak in and no client binaries are found.
fn reindex(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("pgreindex").unwrap();
    cmd.current_dir(dir.path())
        .env_clear()
        .env("PATH", dir.path())
        .env("RUST_LOG", "info");
    cmd
}

fn log_contents(dir: &TempDir) -> String {
    fs::read_to_string(dir.path().join("reindex.log")).unwrap_or_default()
}

/// Puts a `docker` on the scrubbed `PATH` that answers the version query with
/// PostgreSQL 16, the usage query with `catalog`, and accepts anything else.
/// Every SQL text it receives is appended to `calls.log`. Only shell builtins
/// are used since `PATH` holds nothing else.
fn fake_docker(dir: &TempDir, catalog: &str) {
    let script = format!(
        r#"#!/bin/sh
for arg do last=$arg; done
printf '%s\n' "$last" >> calls.log
case "$last" in
  *server_version_num*) echo 160002 ;;
  *json_agg*) printf '%s\n' '{catalog}' ;;
esac
"#
    );
    let path = dir.path().join("docker");
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
}

fn docker_calls(dir: &TempDir) -> String {
    fs::read_to_string(dir.path().join("calls.log")).unwrap_or_default()
}

const NO_THRESHOLDS: [&str; 6] = [
    "--min-idx-scans",
    "0",
    "--min-table-size-mb",
    "0",
    "--min-index-size-mb",
    "0",
];

#[test]
fn help_lists_every_flag() {
    let dir = TempDir::new().unwrap();
    let assert = reindex(&dir).arg("--help").assert().success();

    let output = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    for flag in [
        "--host",
        "--port",
        "--user",
        "--db",
        "--password",
        "--container",
        "--schemas",
        "--min-idx-scans",
        "--min-table-size-mb",
        "--min-index-size-mb",
        "--scope",
        "--concurrently",
        "--dry-run",
        "--log-file",
    ] {
        assert!(output.contains(flag), "help is missing {flag}");
    }
}

#[test]
fn unknown_flag_is_a_usage_error() {
    let dir = TempDir::new().unwrap();
    reindex(&dir)
        .arg("--bogus")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--bogus"));
}

#[test]
fn invalid_scope_exits_with_three() {
    let dir = TempDir::new().unwrap();
    reindex(&dir)
        .args(["--scope", "schema"])
        .assert()
        .code(3)
        .stdout(predicate::str::contains("unknown scope 'schema'"));

    assert!(log_contents(&dir).contains("Invalid --scope"));
}

#[test]
fn invalid_scope_from_environment_exits_with_three() {
    let dir = TempDir::new().unwrap();
    reindex(&dir)
        .env("REINDEX_SCOPE", "database")
        .assert()
        .code(3);
}

#[test]
fn non_boolean_flag_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    reindex(&dir)
        .args(["--dry-run", "maybe"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Invalid --dry-run: 'maybe'"));
}

#[test]
fn empty_schema_list_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    reindex(&dir)
        .args(["--schemas", " , "])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("at least one schema"));
}

#[test]
fn concurrently_without_known_server_version_exits_with_two() {
    let dir = TempDir::new().unwrap();
    reindex(&dir)
        .args(["--container", "paperless-db", "--concurrently", "true"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("rerun with --concurrently false"));

    let log = log_contents(&dir);
    assert!(log.contains("Could not read server version"));
    assert!(!log.contains("executing"));
}

#[test]
fn unknown_server_version_is_not_fatal_without_concurrently() {
    let dir = TempDir::new().unwrap();
    reindex(&dir)
        .args(["--container", "paperless-db", "--concurrently", "false"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Failed to select reindex candidates"));
}

#[test]
fn log_file_is_appended_across_runs() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("custom.log");

    for _ in 0..2 {
        reindex(&dir)
            .args(["--scope", "nope", "--log-file"])
            .arg(&log)
            .assert()
            .code(3);
    }

    let contents = fs::read_to_string(&log).unwrap();
    assert_eq!(contents.matches("Invalid --scope").count(), 2);
}

#[test]
fn dry_run_logs_every_statement_without_executing() {
    let dir = TempDir::new().unwrap();
    fake_docker(
        &dir,
        r#"[{"schema_name":"public","table_name":"t","index_name":"i x","idx_scan":5,"table_bytes":8192,"index_bytes":16384}]"#,
    );

    reindex(&dir)
        .args(["--container", "db", "--dry-run", "true"])
        .args(NO_THRESHOLDS)
        .assert()
        .success();

    assert!(log_contents(&dir)
        .contains(r#"[dry-run] REINDEX INDEX CONCURRENTLY "public"."i x";"#));
    let calls = docker_calls(&dir);
    assert!(calls.contains("json_agg"));
    assert!(!calls.contains("REINDEX"));
}

#[test]
fn dry_run_statements_survive_a_quiet_log_filter() {
    let dir = TempDir::new().unwrap();
    fake_docker(
        &dir,
        r#"[{"schema_name":"public","table_name":"t","index_name":"i x","idx_scan":5,"table_bytes":8192,"index_bytes":16384}]"#,
    );

    reindex(&dir)
        .env("RUST_LOG", "warn")
        .args(["--container", "db", "--dry-run", "true"])
        .args(NO_THRESHOLDS)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            r#"[dry-run] REINDEX INDEX CONCURRENTLY "public"."i x";"#,
        ))
        .stdout(predicate::str::contains("Server version").not());
}

#[test]
fn zero_candidates_is_logged_and_succeeds() {
    let dir = TempDir::new().unwrap();
    fake_docker(&dir, "[]");

    reindex(&dir)
        .args(["--container", "db"])
        .assert()
        .success();

    assert!(log_contents(&dir).contains("zero candidates"));
    assert!(!docker_calls(&dir).contains("REINDEX"));
}

#[test]
fn table_scope_executes_quoted_table_rebuild() {
    let dir = TempDir::new().unwrap();
    fake_docker(
        &dir,
        r#"[{"schema_name":"public","table_name":"t\"q","index_name":"a","idx_scan":5,"table_bytes":8192,"index_bytes":16384},{"schema_name":"public","table_name":"t\"q","index_name":"b","idx_scan":9,"table_bytes":8192,"index_bytes":16384}]"#,
    );

    reindex(&dir)
        .args(["--container", "db", "--scope", "table"])
        .args(NO_THRESHOLDS)
        .assert()
        .success();

    let calls = docker_calls(&dir);
    assert_eq!(
        calls.matches(r#"REINDEX TABLE CONCURRENTLY "public"."t""q";"#).count(),
        1
    );
    assert!(log_contents(&dir).contains("executing (1/1)"));
}

#[test]
fn invalid_scope_wins_over_an_unwritable_log_file() {
    let dir = TempDir::new().unwrap();
    reindex(&dir)
        .args(["--scope", "bogus", "--log-file", "missing/reindex.log"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Failed to open log file"))
        .stderr(predicate::str::contains("unknown scope 'bogus'"));
}

#[test]
fn unwritable_log_file_alone_is_a_failure() {
    let dir = TempDir::new().unwrap();
    reindex(&dir)
        .args(["--log-file", "missing/reindex.log"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to open log file"));
}
