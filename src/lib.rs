// src/lib.rs

//! A small dependency-driven rebuilder in the djb `redo` family.
//!
//! Targets are built by `.do` shell scripts; each run records the
//! signatures of everything the script depended on into a per-target
//! database, and later invocations re-run the script only when a recorded
//! signature no longer matches. Parallelism is governed by a
//! make-compatible jobserver token pipe shared across the whole process
//! tree.

pub mod cli;
pub mod config;
pub mod db;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod resolve;
pub mod stale;

#[cfg(test)]
pub mod testutil;

use anyhow::Context as _;
use clap::Parser;
use tracing::warn;

use crate::cli::{CliArgs, EnvFlags, Invocation};
use crate::config::BuildOptions;
use crate::engine::BuildContext;
use crate::errors::RedoError;
use crate::exec::jobserver::Jobserver;

/// Entry point shared by all four installed names. Returns the process
/// exit code.
pub fn cli_main() -> i32 {
    let mut argv = std::env::args();
    let argv0 = argv.next().unwrap_or_else(|| "redo".to_string());
    let invocation = match Invocation::from_program_name(&argv0) {
        Ok(inv) => inv,
        Err(err) => {
            eprintln!("redo: {err}");
            return 2;
        }
    };
    let args = CliArgs::parse_from(std::iter::once(argv0).chain(argv));
    let env = match cli::env_flags() {
        Ok(env) => env,
        Err(err) => {
            eprintln!("redo: {err}");
            return 2;
        }
    };

    let opts = BuildOptions {
        silent: args.silent || env.silent,
        verbose: args.verbose || env.verbose,
        debug: args.debug || env.debug,
        keep_going: args.keep_going || env.keep_going,
        ..BuildOptions::default()
    };
    logging::init_logging(&opts);

    match run(invocation, args, env, opts) {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(err) => {
            eprintln!("redo: {err}");
            1
        }
    }
}

/// Execute one invocation. `Ok(false)` means a build failed; `Err` means
/// the invocation itself was unusable.
pub fn run(
    invocation: Invocation,
    args: CliArgs,
    env: EnvFlags,
    opts: BuildOptions,
) -> Result<bool, RedoError> {
    if let Some(dir) = &args.directory {
        std::env::set_current_dir(dir)
            .with_context(|| format!("cannot change to directory {}", dir.display()))?;
    }
    if args.targets.is_empty() {
        return Err(RedoError::NoFilenames);
    }

    // An inherited jobserver always wins: the token pool belongs to the
    // outermost invocation, and a nested -j would over-subscribe it.
    let jobserver = match env.jobserver_fds {
        Some((r, w)) => {
            if args.jobs.is_some() {
                warn!("-j ignored; joining the inherited jobserver");
            }
            Jobserver::from_inherited(r, w).map_err(|e| RedoError::io("jobserver pipe", e))?
        }
        None => match args.jobs {
            Some(0) => return Err(RedoError::InvalidJobLimit),
            Some(n) => Jobserver::with_limit(n).map_err(|e| RedoError::io("jobserver pipe", e))?,
            None => Jobserver::serial(),
        },
    };
    let parent = env.parent_fd.map(db::PrereqSink::from_inherited_fd);
    let mut ctx = BuildContext::new(opts, jobserver, parent);

    match invocation {
        Invocation::Redo => {
            let ok = engine::redo(&mut ctx, &args.targets, true, 0);
            ctx.jobserver.reclaim();
            Ok(ok)
        }
        Invocation::IfChange => {
            let result = engine::redo_ifchange(&mut ctx, &args.targets, 0);
            ctx.jobserver.reclaim();
            result
        }
        Invocation::IfCreate => {
            engine::redo_ifcreate(&mut ctx, &args.targets)?;
            Ok(true)
        }
        Invocation::HashDump => {
            engine::hash_dump(&mut ctx, &args.targets);
            Ok(true)
        }
    }
}
