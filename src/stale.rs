// src/stale.rs

//! The staleness oracle: decide whether a target needs its script re-run.
//!
//! The dependency graph is never materialized; it is discovered by
//! recursing into each recorded prerequisite that is itself a target,
//! bounded by the meta-depth counter carried through `engine::redo`.

use std::path::Path;

use tracing::{debug, warn};

use crate::db::{self, codec, signature::FileKind};
use crate::engine::BuildContext;

/// A source file exists and has no dependency database in any recognized
/// form; it is never rebuilt.
pub fn is_source(name: &str) -> bool {
    exists(name) && !db::has_any_database(name)
}

/// Full conditional check for one target: it exists, its buildable
/// prerequisites are themselves up to date, it still exists, and every
/// recorded prerequisite signature matches the present state.
pub fn is_up_to_date(ctx: &mut BuildContext, target: &str, meta_depth: u32) -> bool {
    // A target already on the checking stack means the recorded databases
    // form a cycle; settle the repeated occurrence instead of descending
    // forever.
    if !ctx.visiting.insert(target.to_string()) {
        warn!(target, "dependency records form a cycle");
        return true;
    }
    let fresh = satisfies_existence(target)
        && recurse_prerequisites(ctx, target, meta_depth)
        && satisfies_existence(target)
        && records_satisfied(ctx, target);
    ctx.visiting.remove(target);
    fresh
}

/// Record-level comparison only, no recursion. Also used for the
/// post-lock re-check in the scheduler, where the prerequisites have
/// already been dealt with.
pub fn records_satisfied(ctx: &mut BuildContext, target: &str) -> bool {
    let Some(records) = codec::read_records(Path::new(&db::database_path(target))) else {
        return false;
    };
    let mut satisfied = true;
    for rec in &records {
        let current = ctx.sigs.signature(&rec.name, Some(&rec.sig));
        let reason = if current.kind != rec.sig.kind {
            if current.kind == FileKind::Absent {
                Some("it no longer exists")
            } else {
                Some("its type changed")
            }
        } else if rec.sig.kind != FileKind::Absent && current.mtime != rec.sig.mtime {
            match rec.sig.kind {
                FileKind::Special | FileKind::Directory => Some("its timestamp changed"),
                FileKind::RegularFile if current.hash != rec.sig.hash => {
                    Some("its contents changed")
                }
                _ => None,
            }
        } else {
            None
        };
        if let Some(reason) = reason {
            debug!(target, prerequisite = %rec.name, "needs rebuilding because {reason}");
            satisfied = false;
            // Keep-going keeps scanning purely for the diagnostics.
            if !ctx.opts.keep_going {
                break;
            }
        }
    }
    satisfied
}

fn satisfies_existence(target: &str) -> bool {
    if !exists(target) {
        debug!(target, "needs rebuilding because it does not exist");
        return false;
    }
    true
}

/// Bring every recorded prerequisite that is itself a target (it has a
/// database of its own) up to date. This nested call is how the graph is
/// walked. Databaseless prerequisites are left to the record comparison.
fn recurse_prerequisites(ctx: &mut BuildContext, target: &str, meta_depth: u32) -> bool {
    let Some(records) = codec::read_records(Path::new(&db::database_path(target))) else {
        return false;
    };
    let files: Vec<String> = records
        .into_iter()
        .filter(|r| r.sig.kind != FileKind::Absent && db::has_any_database(&r.name))
        .map(|r| r.name)
        .collect();
    files.is_empty() || crate::engine::redo(ctx, &files, false, meta_depth)
}

fn exists(name: &str) -> bool {
    Path::new(name).exists()
}
