// src/exec/job.rs

//! One unit of work: run the build script for a target.

use std::fmt;
use std::fs::File;
use std::io;
use std::path::Path;

use nix::fcntl::Flock;

use crate::db;

/// Scheduler-visible lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Flagged for rebuild, not yet started.
    Pending,
    /// Script process is running under the given pid.
    Spawned(i32),
    /// Lock/file/exec failure before the script ever ran.
    FailedToSpawn,
    /// Temp artifacts promoted or discarded; terminal.
    Finalized { ok: bool },
}

/// A target flagged for rebuild, exclusively owned by one orchestrator
/// invocation. The lock file, not this struct, is what serializes
/// concurrent builds of the same target across process trees.
pub struct Job {
    pub target: String,
    pub tmp_target: String,
    pub database: String,
    pub tmp_database: String,
    pub lock_file: String,
    /// Re-check staleness once the lock is held (conditional builds only):
    /// a concurrent invocation may have committed the target meanwhile.
    pub verify_after_lock: bool,
    pub state: JobState,
    /// Held from just before temp-file creation until finalization.
    pub lock: Option<Flock<File>>,
}

impl Job {
    pub fn new(target: &str, verify_after_lock: bool) -> Self {
        Self {
            target: target.to_string(),
            tmp_target: db::tmp_target_path(target),
            database: db::database_path(target),
            tmp_database: db::tmp_database_path(target),
            lock_file: db::lock_path(target),
            verify_after_lock,
            state: JobState::Pending,
            lock: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state == JobState::Pending
    }

    pub fn spawned_pid(&self) -> Option<i32> {
        match self.state {
            JobState::Spawned(pid) => Some(pid),
            _ => None,
        }
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self.state, JobState::Finalized { .. })
    }

    /// Drop temp artifacts after a failure; the committed database and
    /// target, if any, stay untouched.
    pub fn discard_temp(&self) {
        let _ = remove_any(&self.tmp_target);
        let _ = remove_any(&self.tmp_database);
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("target", &self.target)
            .field("state", &self.state)
            .field("locked", &self.lock.is_some())
            .finish_non_exhaustive()
    }
}

/// Remove a path of any kind, recursively for directories. Missing paths
/// are fine.
pub fn remove_any(path: &str) -> io::Result<()> {
    let meta = match Path::new(path).symlink_metadata() {
        Ok(m) => m,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };
    if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_paths_follow_the_database_layout() {
        let job = Job::new("sub/foo.out", true);
        assert_eq!(job.tmp_target, "sub/foo.out.doing");
        assert_eq!(job.database, ".redo/sub/foo.out.prereqs");
        assert_eq!(job.tmp_database, ".redo/sub/foo.out.prereqs.build");
        assert_eq!(job.lock_file, ".redo/sub/foo.out.prereqs.lock");
        assert!(job.is_pending());
    }
}
