// src/db/mod.rs

//! On-disk dependency database: layout, record codec, signatures.
//!
//! Everything lives under `.redo/` next to the invocation working
//! directory:
//!
//! - `.redo/<target>.prereqs`        committed database
//! - `.redo/<target>.prereqs.build`  in-progress temp database
//! - `.redo/<target>.prereqs.lock`   per-target build lock
//! - `<target>.doing`                temp build output pending promotion

pub mod codec;
pub mod signature;

use std::fs::File;
use std::io::{self, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::Path;

pub const DB_DIR: &str = ".redo";

pub fn database_path(target: &str) -> String {
    format!("{DB_DIR}/{target}.prereqs")
}

pub fn tmp_database_path(target: &str) -> String {
    format!("{DB_DIR}/{target}.prereqs.build")
}

pub fn lock_path(target: &str) -> String {
    format!("{DB_DIR}/{target}.prereqs.lock")
}

pub fn tmp_target_path(target: &str) -> String {
    format!("{target}.doing")
}

/// Whether any recognized database form exists for `target`, committed or
/// in progress. `.prereqsne` is the older database suffix; a file under
/// either name marks the target as build-governed.
pub fn has_any_database(target: &str) -> bool {
    [
        format!("{DB_DIR}/{target}.prereqs"),
        format!("{DB_DIR}/{target}.prereqsne"),
        format!("{DB_DIR}/{target}.prereqs.build"),
        format!("{DB_DIR}/{target}.prereqsne.build"),
    ]
    .iter()
    .any(|p| Path::new(p).exists())
}

/// Write end of the dependency database a running script records into:
/// either the descriptor inherited from the parent `redo` (via
/// `REDOFLAGS=--redoparent-fd=N`) or a job's own temp database during
/// script resolution.
#[derive(Debug)]
pub struct PrereqSink {
    file: File,
}

impl PrereqSink {
    pub fn from_owned(fd: OwnedFd) -> Self {
        Self {
            file: File::from(fd),
        }
    }

    /// Adopt a descriptor number inherited across exec.
    ///
    /// The caller asserts the descriptor is open and not owned elsewhere in
    /// this process; it is closed when the sink is dropped.
    pub fn from_inherited_fd(fd: RawFd) -> Self {
        Self {
            file: unsafe { File::from_raw_fd(fd) },
        }
    }

    /// Descriptor number to advertise to child scripts.
    pub fn raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    /// Append pre-encoded records. One write call, so concurrent siblings
    /// sharing the descriptor interleave at record granularity.
    pub fn append(&self, records: &[u8]) -> io::Result<()> {
        (&self.file).write_all(records)
    }
}
