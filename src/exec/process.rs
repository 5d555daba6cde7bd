// src/exec/process.rs

//! Child-process plumbing: spawning build scripts and reaping any child.

use std::borrow::Cow;
use std::io;
use std::os::fd::RawFd;
use std::process::Command;

use nix::sys::wait::{WaitStatus, wait};
use tracing::debug;

use crate::config::BuildOptions;

/// Terminal state of a reaped child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildStatus {
    Exited(i32),
    Signaled(i32),
}

impl ChildStatus {
    pub fn success(&self) -> bool {
        matches!(self, ChildStatus::Exited(0))
    }
}

/// Block until any child of this process terminates.
pub fn reap_any() -> io::Result<(i32, ChildStatus)> {
    loop {
        match wait() {
            Ok(WaitStatus::Exited(pid, code)) => {
                return Ok((pid.as_raw(), ChildStatus::Exited(code)));
            }
            Ok(WaitStatus::Signaled(pid, signal, _)) => {
                return Ok((pid.as_raw(), ChildStatus::Signaled(signal as i32)));
            }
            Ok(other) => {
                debug!(?other, "ignoring non-terminal wait status");
            }
            Err(errno) => return Err(io::Error::from(errno)),
        }
    }
}

/// Everything needed to exec one build script.
#[derive(Debug)]
pub struct ScriptInvocation<'a> {
    pub script: &'a str,
    /// `$1`: target path with the matched suffix removed.
    pub fullbase: &'a str,
    /// `$2`: the matched suffix (leading dot, possibly empty).
    pub ext: &'a str,
    /// `$3`: where the script writes its output.
    pub tmp_target: &'a str,
    /// Value for the child's `REDOFLAGS`.
    pub redoflags: String,
}

/// Exec the script with the conventional positional arguments and the
/// propagated environment. The jobserver pipe and the temp-database
/// descriptor are inherited because they carry no close-on-exec flag.
pub fn spawn_script(inv: &ScriptInvocation<'_>) -> io::Result<i32> {
    let child = Command::new(exec_path(inv.script).as_ref())
        .arg(inv.fullbase)
        .arg(inv.ext)
        .arg(inv.tmp_target)
        .env("REDOFLAGS", &inv.redoflags)
        .env("MAKELEVEL", next_make_level())
        .spawn()?;
    Ok(child.id() as i32)
}

/// Render the `REDOFLAGS` value for a child: propagated flags plus the
/// descriptor numbers the child needs for nested invocations.
pub fn render_redoflags(
    opts: &BuildOptions,
    parent_db_fd: RawFd,
    jobserver_fds: Option<(RawFd, RawFd)>,
) -> String {
    let mut words = opts.propagated_flags();
    words.push(format!("--redoparent-fd={parent_db_fd}"));
    if let Some((r, w)) = jobserver_fds {
        words.push(format!("--jobserver-fds={r},{w}"));
    }
    words.join(" ")
}

/// Anchor slash-less script paths to the working directory. `Command`
/// resolves a bare filename through `$PATH`, which would never find a
/// top-level `foo.do`.
fn exec_path(script: &str) -> Cow<'_, str> {
    if script.contains('/') {
        Cow::Borrowed(script)
    } else {
        Cow::Owned(format!("./{script}"))
    }
}

fn next_make_level() -> String {
    let level = std::env::var("MAKELEVEL")
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(0);
    (level + 1).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_script_names_are_never_path_searched() {
        assert_eq!(exec_path("hello.do"), "./hello.do");
        assert_eq!(exec_path("default.do"), "./default.do");
        assert_eq!(exec_path("sub/hello.do"), "sub/hello.do");
        assert_eq!(exec_path("./hello.do"), "./hello.do");
    }

    #[test]
    fn redoflags_carry_flags_and_descriptors() {
        let opts = BuildOptions {
            keep_going: true,
            verbose: true,
            ..BuildOptions::default()
        };
        let flags = render_redoflags(&opts, 7, Some((3, 4)));
        assert_eq!(
            flags,
            "--keep-going --verbose --redoparent-fd=7 --jobserver-fds=3,4"
        );
        let flags = render_redoflags(&BuildOptions::default(), 9, None);
        assert_eq!(flags, "--redoparent-fd=9");
    }
}
