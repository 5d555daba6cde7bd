// src/engine/mod.rs

//! The orchestrator: turns a list of requested targets into jobs, runs
//! them, and records prerequisites on behalf of the calling script.

use std::collections::HashSet;

use tracing::debug;

use crate::config::BuildOptions;
use crate::db::PrereqSink;
use crate::db::codec::encode_record;
use crate::db::signature::{Signature, SignatureStore};
use crate::errors::RedoError;
use crate::exec::job::Job;
use crate::exec::jobserver::Jobserver;
use crate::exec::scheduler;
use crate::stale;

/// Everything one invocation threads through the build: options, the
/// memoized signature cache, the job-slot source, and (when running
/// inside a script) the parent's dependency database.
pub struct BuildContext {
    pub opts: BuildOptions,
    pub sigs: SignatureStore,
    pub jobserver: Jobserver,
    pub parent: Option<PrereqSink>,
    /// Targets whose staleness check is currently on the stack; guards
    /// against cyclic dependency records.
    pub visiting: HashSet<String>,
}

impl BuildContext {
    pub fn new(opts: BuildOptions, jobserver: Jobserver, parent: Option<PrereqSink>) -> Self {
        Self {
            opts,
            sigs: SignatureStore::new(),
            jobserver,
            parent,
            visiting: HashSet::new(),
        }
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self::new(BuildOptions::default(), Jobserver::serial(), None)
    }
}

/// Bring `targets` up to date, unconditionally or only where stale.
/// Returns false if any requested target could not be built.
///
/// At or beyond the meta-depth bound everything is treated as already
/// satisfied; this is what keeps the lazily discovered graph finite.
pub fn redo(ctx: &mut BuildContext, targets: &[String], unconditional: bool, meta_depth: u32) -> bool {
    if meta_depth >= ctx.opts.meta_depth_limit {
        debug!(meta_depth, "treating targets as satisfied at the recursion bound");
        return true;
    }
    let mut jobs = Vec::new();
    for target in targets {
        if stale::is_source(target) {
            debug!(target, "is a source file; not building");
            continue;
        }
        if !unconditional && stale::is_up_to_date(ctx, target, meta_depth) {
            debug!(target, "is up to date");
            continue;
        }
        jobs.push(Job::new(target, !unconditional));
    }
    scheduler::run_jobs(ctx, jobs, meta_depth)
}

/// `redo-ifchange`: rebuild stale targets, then record each of them as a
/// prerequisite of the calling script's target.
pub fn redo_ifchange(
    ctx: &mut BuildContext,
    targets: &[String],
    meta_depth: u32,
) -> Result<bool, RedoError> {
    if !redo(ctx, targets, false, meta_depth) {
        return Ok(false);
    }
    record_prerequisites(ctx, targets)?;
    Ok(true)
}

/// `redo-ifcreate`: record each name as a nonexistence prerequisite, so
/// the calling script's target is rebuilt once the file appears. A name
/// that already exists is an error.
pub fn redo_ifcreate(ctx: &mut BuildContext, targets: &[String]) -> Result<(), RedoError> {
    for target in targets {
        if std::path::Path::new(target).symlink_metadata().is_ok() {
            return Err(RedoError::AlreadyExists(target.clone()));
        }
    }
    let parent = ctx.parent.as_ref().ok_or(RedoError::NoParentDatabase)?;
    let mut records = String::new();
    for target in targets {
        records.push_str(&encode_record(&Signature::absent(), target));
    }
    parent
        .append(records.as_bytes())
        .map_err(|e| RedoError::io("parent database", e))
}

/// Capture the present signature of each target and append it to the
/// parent's database in one write.
fn record_prerequisites(ctx: &mut BuildContext, targets: &[String]) -> Result<(), RedoError> {
    let BuildContext { sigs, parent, .. } = ctx;
    let parent = parent.as_ref().ok_or(RedoError::NoParentDatabase)?;
    let mut records = String::new();
    for target in targets {
        let sig = sigs.signature(target, None);
        records.push_str(&encode_record(&sig, target));
    }
    parent
        .append(records.as_bytes())
        .map_err(|e| RedoError::io("parent database", e))
}

/// `redo-hash`: print the database record for each name to stdout, for
/// scripts that want to capture signatures themselves.
pub fn hash_dump(ctx: &mut BuildContext, targets: &[String]) {
    for target in targets {
        let sig = ctx.sigs.signature(target, None);
        print!("{}", encode_record(&sig, target));
    }
}
