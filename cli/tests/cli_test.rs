use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::error::Error;
use std::fs;
use std::process::Command;
use tempfile::{TempDir, tempdir};

fn workspace(files: &[(&str, &str)]) -> Result<TempDir, Box<dyn Error>> {
    let dir = tempdir()?;
    for (name, code) in files {
        fs::write(dir.path().join(name), code)?;
    }
    Ok(dir)
}

const CONFIG: &str = r#"
title = "moon"
width = 800
window = { size = { w = 3 }, visible = true }

function add(a, b)
  return a + b
end

function divmod(a, b)
  return a // b, a % b
end
"#;

#[test]
fn gets_nested_value() -> Result<(), Box<dyn Error>> {
    let dir = workspace(&[("config.lua", CONFIG)])?;

    let mut cmd = Command::cargo_bin("moon")?;
    cmd.current_dir(dir.path()).args(["get", "config.lua", "window.size.w"]);
    cmd.assert().success().stdout(predicate::str::diff("3\n"));

    Ok(())
}

#[test]
fn gets_string_as_json() -> Result<(), Box<dyn Error>> {
    let dir = workspace(&[("config.lua", CONFIG)])?;

    let mut cmd = Command::cargo_bin("moon")?;
    cmd.current_dir(dir.path()).args(["get", "config.lua", "title", "--json"]);
    cmd.assert().success().stdout(predicate::str::diff("\"moon\"\n"));

    Ok(())
}

#[test]
fn reports_missing_segment() -> Result<(), Box<dyn Error>> {
    let dir = workspace(&[("config.lua", CONFIG)])?;

    let mut cmd = Command::cargo_bin("moon")?;
    cmd.current_dir(dir.path()).args(["get", "config.lua", "missing.inner"]);
    cmd.assert().failure().stderr(predicate::str::contains("missing"));

    Ok(())
}

#[test]
fn calls_function_with_arguments() -> Result<(), Box<dyn Error>> {
    let dir = workspace(&[("config.lua", CONFIG)])?;

    let mut cmd = Command::cargo_bin("moon")?;
    cmd.current_dir(dir.path()).args(["call", "config.lua", "add", "2", "3"]);
    cmd.assert().success().stdout(predicate::str::diff("5\n"));

    Ok(())
}

#[test]
fn calls_function_with_several_results() -> Result<(), Box<dyn Error>> {
    let dir = workspace(&[("config.lua", CONFIG)])?;

    let mut cmd = Command::cargo_bin("moon")?;
    cmd.current_dir(dir.path())
        .args(["call", "config.lua", "divmod", "7", "2", "--returns", "2", "--json"]);
    cmd.assert().success().stdout(predicate::str::diff("[3,1]\n"));

    Ok(())
}

#[test]
fn call_accepts_negative_numbers_before_flags() -> Result<(), Box<dyn Error>> {
    let dir = workspace(&[("config.lua", CONFIG)])?;

    let mut cmd = Command::cargo_bin("moon")?;
    cmd.current_dir(dir.path())
        .args(["call", "config.lua", "add", "-2", "-3", "--json"]);
    cmd.assert().success().stdout(predicate::str::diff("[-5]\n"));

    Ok(())
}

#[test]
fn lists_fields_as_json() -> Result<(), Box<dyn Error>> {
    let dir = workspace(&[("config.lua", CONFIG)])?;

    let mut cmd = Command::cargo_bin("moon")?;
    cmd.current_dir(dir.path()).args(["fields", "config.lua", "window", "--json"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"size\""))
        .stdout(predicate::str::contains("\"type\": \"table\""))
        .stdout(predicate::str::contains("\"type\": \"boolean\""));

    Ok(())
}

#[test]
fn run_fails_on_syntax_error() -> Result<(), Box<dyn Error>> {
    let dir = workspace(&[("broken.lua", "x = = 1\n")])?;

    let mut cmd = Command::cargo_bin("moon")?;
    cmd.current_dir(dir.path()).args(["run", "broken.lua"]);
    cmd.assert().failure().stderr(predicate::str::contains("broken.lua"));

    Ok(())
}

#[test]
fn standard_library_is_opt_in() -> Result<(), Box<dyn Error>> {
    let dir = workspace(&[("upper.lua", "shout = string.upper(\"hi\")\n")])?;

    let mut without = Command::cargo_bin("moon")?;
    without.current_dir(dir.path()).args(["get", "upper.lua", "shout"]);
    without.assert().failure();

    let mut with = Command::cargo_bin("moon")?;
    with.current_dir(dir.path()).args(["--std", "get", "upper.lua", "shout"]);
    with.assert().success().stdout(predicate::str::diff("HI\n"));

    Ok(())
}

#[test]
fn dependencies_run_before_the_script() -> Result<(), Box<dyn Error>> {
    let dir = workspace(&[
        ("helpers.lua", "function double(x) return x * 2 end\n"),
        ("main.lua", "answer = double(21)\n"),
    ])?;

    let mut cmd = Command::cargo_bin("moon")?;
    cmd.current_dir(dir.path())
        .args(["get", "main.lua", "answer", "--dep", "helpers.lua"]);
    cmd.assert().success().stdout(predicate::str::diff("42\n"));

    Ok(())
}

#[test]
fn rejects_parent_dir_paths() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("moon")?;
    cmd.args(["run", "../outside.lua"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Parent directory components"));

    Ok(())
}
