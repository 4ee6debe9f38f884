// Command-line behaviour of the `lfc` binary.
//
// - each `--emit` target runs only the passes it needs
// - `--emit run` executes a chain with typed `--arg` values
// - compile errors exit non-zero with rendered diagnostics on stderr

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn lfc_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_lfc"))
}

fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .to_path_buf()
}

fn demo(name: &str) -> String {
    project_root()
        .join("demos")
        .join(name)
        .to_str()
        .unwrap()
        .to_string()
}

fn lfc(args: &[&str]) -> Output {
    Command::new(lfc_binary())
        .args(args)
        .output()
        .expect("failed to run lfc")
}

fn stdout_of(args: &[&str]) -> String {
    let output = lfc(args);
    assert!(
        output.status.success(),
        "lfc failed with args {:?}\nstderr: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).expect("non-UTF8 output")
}

fn temp_file(name: &str, contents: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("lfc-cli-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

// ── Emit targets ────────────────────────────────────────────────────────────

#[test]
fn emit_rust_is_the_default() {
    let out = stdout_of(&[&demo("evens.lfc")]);
    assert!(out.starts_with("// Generated by lfc"));
    assert!(out.contains("// source: sha256:"));
    assert!(out.contains("pub struct Evens {"));
    assert!(out.contains("pub fn evens("));
}

#[test]
fn no_provenance_drops_hash_lines() {
    let out = stdout_of(&["--no-provenance", &demo("evens.lfc")]);
    assert!(!out.contains("sha256:"));
    assert!(out.contains("pub struct Evens {"));
}

#[test]
fn emit_descriptors_is_json() {
    let out = stdout_of(&["--emit", "descriptors", &demo("dedup.lfc")]);
    let json: serde_json::Value = serde_json::from_str(&out).expect("valid JSON");
    let names: Vec<&str> = json
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|d| d["name"].as_str())
        .collect();
    assert_eq!(names, vec!["unique", "first_over", "by_parity"]);
}

#[test]
fn descriptors_round_trip_through_json_input() {
    let descriptors = stdout_of(&["--emit", "descriptors", &demo("evens.lfc")]);
    let path = temp_file("evens.json", &descriptors);
    let out = stdout_of(&[
        "--format",
        "json",
        "--emit",
        "run",
        "--arg",
        "n=10",
        path.to_str().unwrap(),
    ]);
    assert_eq!(out, "60L\n");
}

#[test]
fn emit_ir_selects_one_chain() {
    let out = stdout_of(&["--emit", "ir", "--chain", "page", &demo("partition.lfc")]);
    let json: serde_json::Value = serde_json::from_str(&out).expect("valid JSON");
    let chains = json.as_array().expect("array");
    assert_eq!(chains.len(), 1);
    assert_eq!(chains[0]["name"], "page");
    assert_eq!(chains[0]["loop_count"], 1);
}

#[test]
fn emit_count_reports_static_counts() {
    let out = stdout_of(&["--emit", "count", &demo("partition.lfc")]);
    assert!(out.contains("page: count 10, loops 1"), "{out}");
    assert!(out.contains("window: count unknown, loops 1"), "{out}");
}

// ── Running chains ──────────────────────────────────────────────────────────

#[test]
fn run_with_arguments() {
    let out = stdout_of(&["--emit", "run", "--arg", "n=10", &demo("evens.lfc")]);
    assert_eq!(out, "60L\n");

    let out = stdout_of(&[
        "--emit",
        "run",
        "--chain",
        "unique",
        "--arg",
        "xs=[3, 1, 3, 2, 1]",
        &demo("dedup.lfc"),
    ]);
    assert_eq!(out, "[3, 1, 2]\n");

    let out = stdout_of(&[
        "--emit",
        "run",
        "--chain",
        "window",
        "--arg",
        "xs=[1,2,3,4,5,6]",
        &demo("partition.lfc"),
    ]);
    assert_eq!(out, "[3, 4, 5]\n");

    let out = stdout_of(&[
        "--emit",
        "run",
        "--chain",
        "joined",
        "--arg",
        "n=3",
        &demo("concat.lfc"),
    ]);
    assert_eq!(out, "1277L\n");
}

#[test]
fn run_reports_faults() {
    let output = lfc(&[
        "--emit",
        "run",
        "--chain",
        "first_over",
        "--arg",
        "xs=[1, 2]",
        "--arg",
        "limit=5",
        &demo("dedup.lfc"),
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("sequence contains no matching element"), "{stderr}");
}

#[test]
fn run_needs_a_chain_choice_and_every_argument() {
    let output = lfc(&["--emit", "run", &demo("dedup.lfc")]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--chain"));

    let output = lfc(&["--emit", "run", &demo("evens.lfc")]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("missing argument `n`"));

    let output = lfc(&["--emit", "run", "--arg", "n=ten", &demo("evens.lfc")]);
    assert!(!output.status.success());
}

// ── Errors ──────────────────────────────────────────────────────────────────

#[test]
fn bind_errors_are_rendered() {
    let path = temp_file("bad.lfc", "chain c = Range(0, 3).Wher(x => x > 1).Count()\n");
    let output = lfc(&[path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error[E0101]"), "{stderr}");
    assert!(stderr.contains("bad.lfc:1:"), "{stderr}");
    assert!(output.stdout.is_empty());
}

#[test]
fn parse_errors_exit_non_zero() {
    let path = temp_file("syntax.lfc", "chain c Range(0, 1).Sum()\n");
    let output = lfc(&[path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("parse error"));
}

#[test]
fn missing_input_is_an_io_error() {
    let output = lfc(&["does-not-exist.lfc"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn output_file_is_written() {
    let out_path = std::env::temp_dir().join(format!("lfc-out-{}.rs", std::process::id()));
    let output = lfc(&[
        "-o",
        out_path.to_str().unwrap(),
        &demo("concat.lfc"),
    ]);
    assert!(output.status.success());
    let text = std::fs::read_to_string(&out_path).expect("written");
    assert!(text.contains("pub struct Joined {"));
    assert!(text.contains("pub struct Both {"));
}
