// src/testutil.rs

//! Test-only helpers.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock};

static CWD_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

/// Tests that rely on relative paths must serialize their use of the
/// process-wide working directory. The guard restores the prior directory
/// on drop.
pub struct CwdGuard {
    prior: PathBuf,
    _lock: MutexGuard<'static, ()>,
}

pub fn cwd_guard(dir: &Path) -> CwdGuard {
    let lock = CWD_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let prior = std::env::current_dir().unwrap();
    std::env::set_current_dir(dir).unwrap();
    CwdGuard { prior, _lock: lock }
}

impl Drop for CwdGuard {
    fn drop(&mut self) {
        let _ = std::env::set_current_dir(&self.prior);
    }
}
