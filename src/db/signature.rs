// src/db/signature.rs

//! Per-path signatures and the per-invocation signature cache.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use blake3::Hasher;
use tracing::trace;

pub const HASH_LEN: usize = 32;

/// Sentinel timestamp for paths that do not exist.
pub const NO_TIMESTAMP: i64 = -1;

/// What kind of directory entry a path currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Path does not exist (or cannot be examined).
    Absent,
    /// Device, fifo, socket, symlink: anything that is neither a regular
    /// file nor a directory.
    Special,
    Directory,
    RegularFile,
}

/// Recorded state of a path: kind, last-written time (whole seconds) and a
/// 256-bit content hash that is meaningful only for regular files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub kind: FileKind,
    pub mtime: i64,
    pub hash: [u8; HASH_LEN],
}

impl Signature {
    pub fn absent() -> Self {
        Self {
            kind: FileKind::Absent,
            mtime: NO_TIMESTAMP,
            hash: [0u8; HASH_LEN],
        }
    }

    pub fn hash_hex(&self) -> String {
        let mut s = String::with_capacity(HASH_LEN * 2);
        for b in &self.hash {
            s.push_str(&format!("{b:02x}"));
        }
        s
    }
}

/// Compute the current signature of `name`.
///
/// Never fails: a path that cannot be lstat'ed is Absent with a zero hash.
/// When `prior` carries the same timestamp as the file currently has, its
/// hash is reused without re-reading the file contents (trust-mtime).
fn examine(name: &str, prior: Option<&Signature>) -> Signature {
    let meta = match Path::new(name).symlink_metadata() {
        Ok(m) => m,
        Err(_) => return Signature::absent(),
    };
    let mtime = meta.mtime();
    if meta.file_type().is_file() {
        let hash = match prior {
            Some(old) if old.mtime == mtime => old.hash,
            _ => hash_file(name),
        };
        Signature {
            kind: FileKind::RegularFile,
            mtime,
            hash,
        }
    } else {
        let kind = if meta.file_type().is_dir() {
            FileKind::Directory
        } else {
            FileKind::Special
        };
        Signature {
            kind,
            mtime,
            hash: [0u8; HASH_LEN],
        }
    }
}

/// blake3 over the full file contents; unreadable files hash as empty.
fn hash_file(name: &str) -> [u8; HASH_LEN] {
    let mut hasher = Hasher::new();
    if let Ok(mut file) = File::open(name) {
        let mut buf = [0u8; 8192];
        while let Ok(n) = file.read(&mut buf) {
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
    }
    *hasher.finalize().as_bytes()
}

/// Signature cache owned by one orchestrator run.
///
/// Each path is examined at most once per invocation, except where
/// `invalidate` is called right before a freshly built target's database is
/// promoted so a later check in the same run sees the new state.
#[derive(Debug, Default)]
pub struct SignatureStore {
    cache: HashMap<String, Signature>,
}

impl SignatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signature(&mut self, name: &str, prior: Option<&Signature>) -> Signature {
        if let Some(sig) = self.cache.get(name) {
            return *sig;
        }
        let sig = examine(name, prior);
        trace!(name, kind = ?sig.kind, "examined path");
        self.cache.insert(name.to_string(), sig);
        sig
    }

    pub fn invalidate(&mut self, name: &str) {
        self.cache.remove(name);
    }
}
