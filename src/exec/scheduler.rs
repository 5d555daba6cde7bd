// src/exec/scheduler.rs

//! The job loop: start pending jobs while tokens allow, reap any child,
//! finalize, release.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use nix::fcntl::{Flock, FlockArg, OFlag, open};
use nix::sys::stat::Mode;
use tracing::{debug, error, info, warn};

use crate::db::codec::encode_record;
use crate::db::PrereqSink;
use crate::engine::{self, BuildContext};
use crate::errors::RedoError;
use crate::exec::job::{Job, JobState, remove_any};
use crate::exec::process::{self, ChildStatus, ScriptInvocation};
use crate::resolve;
use crate::stale;

enum SpawnOutcome {
    Started(i32),
    /// Another invocation committed the target while we waited on the
    /// lock; nothing to run.
    AlreadyUpToDate,
}

/// Run one invocation's job set to completion. Returns false if any job
/// failed or was skipped after a fatal failure.
pub fn run_jobs(ctx: &mut BuildContext, mut jobs: Vec<Job>, meta_depth: u32) -> bool {
    if jobs.is_empty() {
        return true;
    }
    let mut ok = true;
    loop {
        if !ok && !ctx.opts.keep_going {
            skip_pending(&mut jobs);
        }

        // Start phase: commit to a job only after a non-blocking token
        // probe succeeds, so no slot is procured without a runnable job.
        while ok || ctx.opts.keep_going {
            if next_pending(&jobs).is_none() || !ctx.jobserver.try_acquire() {
                break;
            }
            start_next(ctx, &mut jobs, meta_depth, &mut ok);
        }

        if jobs.iter().any(|j| j.spawned_pid().is_some()) {
            reap_one(ctx, &mut jobs, &mut ok);
        } else if next_pending(&jobs).is_some() {
            if !ok && !ctx.opts.keep_going {
                continue;
            }
            // Nothing of ours is running; wait for a token held elsewhere
            // in the process tree.
            if ctx.jobserver.acquire() {
                start_next(ctx, &mut jobs, meta_depth, &mut ok);
            } else {
                error!("jobserver pipe unusable; failing remaining targets");
                for job in jobs.iter_mut().filter(|j| j.is_pending()) {
                    job.state = JobState::Finalized { ok: false };
                }
                ok = false;
            }
        } else {
            debug_assert!(jobs.iter().all(|j| j.is_finalized()));
            break;
        }
    }
    ok
}

fn next_pending(jobs: &[Job]) -> Option<usize> {
    jobs.iter().position(|j| j.is_pending())
}

fn skip_pending(jobs: &mut [Job]) {
    for job in jobs.iter_mut().filter(|j| j.is_pending()) {
        warn!(target = %job.target, "not started after earlier failure");
        job.state = JobState::Finalized { ok: false };
    }
}

/// Start the first pending job with the token the caller just procured.
/// Any failure releases that token immediately.
fn start_next(ctx: &mut BuildContext, jobs: &mut [Job], meta_depth: u32, ok: &mut bool) {
    let Some(index) = next_pending(jobs) else {
        ctx.jobserver.release();
        return;
    };
    let job = &mut jobs[index];
    match spawn(ctx, job, meta_depth) {
        Ok(SpawnOutcome::Started(pid)) => {
            job.state = JobState::Spawned(pid);
        }
        Ok(SpawnOutcome::AlreadyUpToDate) => {
            info!(target = %job.target, "already done by a concurrent build");
            job.state = JobState::Finalized { ok: true };
            ctx.jobserver.release();
        }
        Err(err) => {
            job.state = JobState::FailedToSpawn;
            error!(target = %job.target, error = %err, "failed to start build script");
            job.discard_temp();
            job.state = JobState::Finalized { ok: false };
            ctx.jobserver.release();
            *ok = false;
        }
    }
}

/// Block until some child exits, then finalize the matching job. An
/// unmatched pid is logged and ignored.
fn reap_one(ctx: &mut BuildContext, jobs: &mut [Job], ok: &mut bool) {
    match process::reap_any() {
        Ok((pid, status)) => {
            let Some(job) = jobs.iter_mut().find(|j| j.spawned_pid() == Some(pid)) else {
                warn!(pid, "unknown child process; ignoring");
                return;
            };
            let done = finalize(ctx, job, status);
            job.state = JobState::Finalized { ok: done };
            ctx.jobserver.release();
            if !done {
                *ok = false;
            }
        }
        Err(err) => {
            // wait() can only fail here if our child bookkeeping is wrong;
            // fail the outstanding jobs rather than spin forever.
            error!(error = %err, "waiting for child processes failed");
            for job in jobs.iter_mut() {
                if job.spawned_pid().is_some() {
                    job.discard_temp();
                    job.lock = None;
                    job.state = JobState::Finalized { ok: false };
                    ctx.jobserver.release();
                }
            }
            *ok = false;
        }
    }
}

/// Lock, resolve, record, exec.
fn spawn(ctx: &mut BuildContext, job: &mut Job, meta_depth: u32) -> Result<SpawnOutcome, RedoError> {
    if let Some(parent) = Path::new(&job.database).parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| RedoError::io(parent.display().to_string(), e))?;
    }

    debug!(target = %job.target, lock = %job.lock_file, "locking");
    let lock = acquire_lock(&job.lock_file)?;

    if job.verify_after_lock {
        ctx.sigs.invalidate(&job.target);
        // The target itself must exist for the records to mean anything;
        // a job queued because the file was deleted still has a database
        // full of matching prerequisites.
        if Path::new(&job.target).exists() && stale::records_satisfied(ctx, &job.target) {
            drop(lock);
            return Ok(SpawnOutcome::AlreadyUpToDate);
        }
    }

    // The temp database is opened without close-on-exec so the script can
    // record its own prerequisites through the inherited descriptor.
    let db_fd = open(
        Path::new(&job.tmp_database),
        OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC | OFlag::O_NOCTTY,
        Mode::from_bits_truncate(0o666),
    )
    .map_err(|e| RedoError::io(job.tmp_database.clone(), io::Error::from(e)))?;
    let sink = PrereqSink::from_owned(db_fd);

    let resolution = resolve::find_script(&job.target);
    if let Err(err) = record_probes(ctx, &sink, &resolution, meta_depth) {
        job.discard_temp();
        return Err(RedoError::io(job.tmp_database.clone(), err));
    }
    let Some(script) = resolution.script else {
        job.discard_temp();
        return Err(RedoError::ScriptNotFound(job.target.clone()));
    };

    remove_any(&job.tmp_target).map_err(|e| RedoError::io(job.tmp_target.clone(), e))?;

    let invocation = ScriptInvocation {
        script: &script.script,
        fullbase: &script.fullbase,
        ext: &script.ext,
        tmp_target: &job.tmp_target,
        redoflags: process::render_redoflags(&ctx.opts, sink.raw_fd(), ctx.jobserver.pipe_fds()),
    };
    debug!(
        script = %script.script,
        base = %script.fullbase,
        ext = %script.ext,
        out = %job.tmp_target,
        "spawning build script"
    );
    let pid = spawn_script_checked(&invocation, job)?;

    job.lock = Some(lock);
    Ok(SpawnOutcome::Started(pid))
}

fn spawn_script_checked(
    invocation: &ScriptInvocation<'_>,
    job: &Job,
) -> Result<i32, RedoError> {
    match process::spawn_script(invocation) {
        Ok(pid) => Ok(pid),
        Err(err) => {
            job.discard_temp();
            Err(RedoError::io(invocation.script.to_string(), err))
        }
    }
}

/// Record the resolver's probes into the job's temp database: every miss
/// as a negative prerequisite, the hit (rebuilt first, within the
/// meta-depth bound) as a positive one.
fn record_probes(
    ctx: &mut BuildContext,
    sink: &PrereqSink,
    resolution: &resolve::Resolution,
    meta_depth: u32,
) -> io::Result<()> {
    let mut records = String::new();
    for miss in &resolution.misses {
        let sig = ctx.sigs.signature(miss, None);
        records.push_str(&encode_record(&sig, miss));
    }
    if let Some(script) = &resolution.script {
        // The script is itself a target; bring it up to date before
        // capturing its signature. A failure here means running the stale
        // script, same as not having chased it at all.
        let rebuilt = engine::redo(
            ctx,
            std::slice::from_ref(&script.script),
            false,
            meta_depth + 1,
        );
        if !rebuilt {
            warn!(script = %script.script, "failed to refresh build script; using it as-is");
        }
        let sig = ctx.sigs.signature(&script.script, None);
        records.push_str(&encode_record(&sig, &script.script));
    }
    sink.append(records.as_bytes())
}

fn acquire_lock(lock_file: &str) -> Result<Flock<File>, RedoError> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(lock_file)
        .map_err(|e| RedoError::io(lock_file.to_string(), e))?;
    Flock::lock(file, FlockArg::LockExclusive)
        .map_err(|(_, errno)| RedoError::io(lock_file.to_string(), io::Error::from(errno)))
}

/// Promote or discard a finished job's temp artifacts.
fn finalize(ctx: &mut BuildContext, job: &mut Job, status: ChildStatus) -> bool {
    let lock = job.lock.take();
    if !status.success() {
        error!(target = %job.target, ?status, "not done");
        job.discard_temp();
        drop(lock);
        return false;
    }

    // A script may legitimately produce no output; the target is then an
    // empty file.
    if Path::new(&job.tmp_target).symlink_metadata().is_err() {
        if let Err(err) = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&job.tmp_target)
        {
            error!(target = %job.target, error = %err, "cannot create empty output");
            job.discard_temp();
            return false;
        }
    }

    // A directory cannot be renamed over; clear it out first.
    let target_meta = Path::new(&job.target).symlink_metadata();
    if target_meta.map(|m| m.is_dir()).unwrap_or(false) {
        if let Err(err) = remove_any(&job.target) {
            error!(target = %job.target, error = %err, "unable to remove target directory");
            job.discard_temp();
            return false;
        }
    }

    // The signature cache must not serve the pre-build state for the rest
    // of this run.
    ctx.sigs.invalidate(&job.target);

    if let Err(err) = std::fs::rename(&job.tmp_database, &job.database) {
        error!(target = %job.target, error = %err, "unable to commit database");
        job.discard_temp();
        return false;
    }
    if let Err(err) = std::fs::rename(&job.tmp_target, &job.target) {
        error!(target = %job.target, error = %err, "unable to commit output");
        job.discard_temp();
        return false;
    }
    info!(target = %job.target, "redone");
    true
}
