// src/config.rs

//! Per-invocation build options.
//!
//! The original suite kept these as process-wide globals; here they are an
//! explicit value constructed once in `main` and threaded through the
//! orchestrator, oracle and scheduler. Nothing in this struct persists
//! across invocations.

/// How many nested script-search levels may themselves chase dependencies
/// via ifchange. Beyond this bound a nested lookup is treated as already
/// satisfied, which also serves as the cycle guard for the lazily
/// discovered dependency graph.
pub const DEFAULT_META_DEPTH_LIMIT: u32 = 1;

#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Suppress per-target success notices.
    pub silent: bool,
    /// Explain rebuild decisions.
    pub verbose: bool,
    /// Trace internal flow (jobserver, scheduler states).
    pub debug: bool,
    /// Attempt every independent target even after a failure.
    pub keep_going: bool,
    /// Recursion bound for nested script-search dependency chasing.
    pub meta_depth_limit: u32,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            silent: false,
            verbose: false,
            debug: false,
            keep_going: false,
            meta_depth_limit: DEFAULT_META_DEPTH_LIMIT,
        }
    }
}

impl BuildOptions {
    /// The flag words propagated to child scripts through `REDOFLAGS`.
    ///
    /// Descriptor options (`--redoparent-fd`, `--jobserver-fds`) are
    /// appended per job by the scheduler; this is only the invariant part.
    pub fn propagated_flags(&self) -> Vec<String> {
        let mut flags = Vec::new();
        if self.keep_going {
            flags.push("--keep-going".to_string());
        }
        if self.debug {
            flags.push("--debug".to_string());
        }
        if self.silent {
            flags.push("--silent".to_string());
        }
        if self.verbose {
            flags.push("--verbose".to_string());
        }
        flags
    }
}
