// ABOUTME: black-box tests driving the compiled `ekcc` binary end to end

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

fn write_source(name: &str, contents: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("ekcc_e2e_{name}_{}.ek", std::process::id()));
    fs::write(&path, contents).expect("write test source");
    path
}

fn jit_run(path: &PathBuf, trailing: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ekcc"))
        .arg(path)
        .arg("--jit")
        .args(trailing)
        .output()
        .expect("spawn ekcc")
}

fn compile_only(path: &PathBuf) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ekcc"))
        .arg(path)
        .output()
        .expect("spawn ekcc")
}

#[test]
fn addition_exits_with_sum() {
    let path = write_source("add", "def int run() { return 2 + 3; }");
    let output = jit_run(&path, &[]);
    assert_eq!(output.status.code(), Some(5));
}

#[test]
fn while_loop_prints_and_exits_zero() {
    let path = write_source(
        "loop",
        "def int run() { int $i = 0; while ($i < 3) { print $i; $i = $i + 1; } return 0; }",
    );
    let output = jit_run(&path, &[]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "0 \n1 \n2 \n");
}

#[test]
fn cint_overflow_traps_and_continues() {
    let path = write_source(
        "overflow",
        "def int run() { cint $x = 2147483647; $x = $x + 1; return 0; }",
    );
    let output = jit_run(&path, &[]);
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Error: cint value overflowed"));
}

#[test]
fn float_to_int_cast_truncates() {
    let path = write_source(
        "cast",
        "def int run() { float $f = 3.5; int $i = [int] $f; print $i; return $i; }",
    );
    let output = jit_run(&path, &[]);
    assert_eq!(output.status.code(), Some(3));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "3 \n");
}

#[test]
fn getarg_reads_host_argv() {
    let path = write_source(
        "getarg",
        "extern int getarg(int);\ndef int run() { return getarg(0); }",
    );
    let output = jit_run(&path, &["--", "7"]);
    assert_eq!(output.status.code(), Some(7));
}

#[test]
fn type_mismatch_fails_without_producing_ir() {
    let path = write_source("mismatch", "def int run() { return 1 + 2.0; }");
    let output = compile_only(&path);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("error:"));
}

#[test]
fn missing_run_fails_to_compile() {
    let path = write_source("missing_run", "def int helper() { return 0; }");
    let output = compile_only(&path);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("run"));
}
