// tests/common/mod.rs

//! Shared helpers for the integration tests: each test gets its own
//! temporary project directory and drives the installed binaries through
//! `current_dir`, never the test process's own working directory.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::{Command, Output};

/// Write an executable `.do` script (a `#!/bin/sh` header is prepended).
pub fn write_script(dir: &Path, name: &str, body: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
}

pub fn redo(dir: &Path, args: &[&str]) -> Output {
    run_tool(env!("CARGO_BIN_EXE_redo"), dir, args)
}

pub fn redo_ifchange(dir: &Path, args: &[&str]) -> Output {
    run_tool(env!("CARGO_BIN_EXE_redo-ifchange"), dir, args)
}

pub fn redo_hash(dir: &Path, args: &[&str]) -> Output {
    run_tool(env!("CARGO_BIN_EXE_redo-hash"), dir, args)
}

/// Number of times a run-counting script has appended to its log file.
pub fn run_count(dir: &Path, log: &str) -> usize {
    match fs::read_to_string(dir.join(log)) {
        Ok(body) => body.lines().count(),
        Err(_) => 0,
    }
}

pub fn read(dir: &Path, name: &str) -> String {
    fs::read_to_string(dir.join(name)).unwrap()
}

pub fn assert_success(out: &Output) {
    assert!(
        out.status.success(),
        "command failed with {:?}\nstderr:\n{}",
        out.status,
        String::from_utf8_lossy(&out.stderr)
    );
}

fn run_tool(bin: &str, dir: &Path, args: &[&str]) -> Output {
    // Scripts invoke redo-ifchange and friends by name; all four binaries
    // sit next to each other in the build directory.
    let bin_dir = Path::new(bin).parent().unwrap();
    let path = match std::env::var("PATH") {
        Ok(p) => format!("{}:{p}", bin_dir.display()),
        Err(_) => bin_dir.display().to_string(),
    };
    Command::new(bin)
        .args(args)
        .current_dir(dir)
        .env("PATH", path)
        .env_remove("REDOFLAGS")
        .env_remove("MAKEFLAGS")
        .env_remove("MFLAGS")
        .env_remove("MAKELEVEL")
        .env_remove("REDO_LOG")
        .output()
        .unwrap()
}
