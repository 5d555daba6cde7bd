// src/cli.rs

//! Command-line and environment parsing.
//!
//! One binary body serves four identities, selected by the program name it
//! was invoked under. Flags also arrive through the environment: a parent
//! `redo` hands its children `REDOFLAGS`, and make-driven builds may carry
//! `MAKEFLAGS`/`MFLAGS` instead.

use std::os::fd::RawFd;
use std::path::PathBuf;

use clap::Parser;

use crate::errors::RedoError;

/// Which of the command personalities this process was started as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invocation {
    /// `redo`: rebuild the named targets unconditionally.
    Redo,
    /// `redo-ifchange`: rebuild where stale, then record prerequisites.
    IfChange,
    /// `redo-ifcreate`: record nonexistence prerequisites.
    IfCreate,
    /// `redo-hash`: print database records for the named paths.
    HashDump,
}

impl Invocation {
    /// Identify from the program basename, as installed under its four
    /// names (hard links or copies).
    pub fn from_program_name(argv0: &str) -> Result<Self, RedoError> {
        let base = argv0.rsplit('/').next().unwrap_or(argv0);
        match base {
            "redo" => Ok(Invocation::Redo),
            "redo-ifchange" => Ok(Invocation::IfChange),
            "redo-ifcreate" => Ok(Invocation::IfCreate),
            "redo-hash" => Ok(Invocation::HashDump),
            other => Err(RedoError::UnknownIdentity(other.to_string())),
        }
    }
}

#[derive(Parser, Debug, Default)]
#[command(
    about = "rebuild files from .do scripts when their recorded prerequisites change",
    disable_help_subcommand = true
)]
pub struct CliArgs {
    /// Suppress per-target success notices.
    #[arg(short = 's', long, visible_alias = "quiet")]
    pub silent: bool,

    /// Explain why each target is considered stale.
    #[arg(short = 'p', long, visible_alias = "print")]
    pub verbose: bool,

    /// Trace scheduler and jobserver internals.
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Keep building independent targets after a failure.
    #[arg(short = 'k', long)]
    pub keep_going: bool,

    /// Run up to N build scripts in parallel.
    #[arg(short = 'j', long, value_name = "N")]
    pub jobs: Option<u32>,

    /// Change to this directory before doing anything.
    #[arg(short = 'C', long = "directory", value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Targets to build (or paths to examine, for redo-hash).
    pub targets: Vec<String>,
}

/// Flags recovered from the environment a parent invocation left behind.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct EnvFlags {
    pub silent: bool,
    pub verbose: bool,
    pub debug: bool,
    pub keep_going: bool,
    /// Descriptor of the parent target's temp database.
    pub parent_fd: Option<RawFd>,
    /// Jobserver pipe ends shared by the whole build.
    pub jobserver_fds: Option<(RawFd, RawFd)>,
}

/// Read flags from `REDOFLAGS`, falling back to `MAKEFLAGS` then `MFLAGS`
/// so scripts driven from make recipes still join the jobserver. Only the
/// first variable present is consulted.
pub fn env_flags() -> Result<EnvFlags, RedoError> {
    for (var, from_make) in [("REDOFLAGS", false), ("MAKEFLAGS", true), ("MFLAGS", false)] {
        if let Ok(value) = std::env::var(var) {
            return parse_flag_words(&value, from_make);
        }
    }
    Ok(EnvFlags::default())
}

/// Parse one environment variable's worth of flag words. Unrecognized
/// words are ignored; the variable may carry flags meant for make.
fn parse_flag_words(value: &str, from_make: bool) -> Result<EnvFlags, RedoError> {
    let mut flags = EnvFlags::default();
    let mut words = tokenize(value);
    if from_make {
        // make's first MAKEFLAGS word is a dashless clump of single-letter
        // flags; put the dash back so it parses like the rest. Macro
        // definitions (name=value) are make's business, not ours.
        if let Some(first) = words.first_mut() {
            if !first.starts_with('-') && !first.contains('=') && !first.is_empty() {
                first.insert(0, '-');
            }
        }
        words.retain(|w| !w.contains('=') || w.starts_with("--jobserver"));
    }
    for word in &words {
        match word.as_str() {
            "--silent" | "--quiet" => flags.silent = true,
            "--verbose" | "--print" => flags.verbose = true,
            "--debug" => flags.debug = true,
            "--keep-going" => flags.keep_going = true,
            _ => {
                if let Some(list) = word
                    .strip_prefix("--jobserver-fds=")
                    .or_else(|| word.strip_prefix("--jobserver-auth="))
                {
                    flags.jobserver_fds = Some(parse_fd_list(list)?);
                } else if let Some(fd) = word.strip_prefix("--redoparent-fd=") {
                    let fd = fd.parse::<RawFd>().map_err(|_| RedoError::BadFdList {
                        value: word.clone(),
                        reason: "descriptor is not a number".to_string(),
                    })?;
                    flags.parent_fd = Some(fd);
                } else if let Some(clump) = word.strip_prefix('-') {
                    if !clump.starts_with('-') {
                        for c in clump.chars() {
                            match c {
                                's' => flags.silent = true,
                                'p' => flags.verbose = true,
                                'd' => flags.debug = true,
                                'k' => flags.keep_going = true,
                                _ => {}
                            }
                        }
                    }
                }
            }
        }
    }
    Ok(flags)
}

/// `R,W` or a single number meaning both ends share one descriptor.
pub fn parse_fd_list(value: &str) -> Result<(RawFd, RawFd), RedoError> {
    let bad = |reason: &str| RedoError::BadFdList {
        value: value.to_string(),
        reason: reason.to_string(),
    };
    let mut parts = value.splitn(2, ',');
    let read = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| bad("empty"))?
        .parse::<RawFd>()
        .map_err(|_| bad("read descriptor is not a number"))?;
    let write = match parts.next() {
        Some(w) => w
            .parse::<RawFd>()
            .map_err(|_| bad("write descriptor is not a number"))?,
        None => read,
    };
    if read < 0 || write < 0 {
        return Err(bad("negative descriptor"));
    }
    Ok((read, write))
}

/// Shell-ish word splitting for flag variables: whitespace separates,
/// quotes group, backslash escapes the next character.
fn tokenize(value: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => word.push(c),
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    in_word = true;
                }
                '\\' => {
                    if let Some(next) = chars.next() {
                        word.push(next);
                        in_word = true;
                    }
                }
                c if c.is_whitespace() => {
                    if in_word {
                        words.push(std::mem::take(&mut word));
                        in_word = false;
                    }
                }
                c => {
                    word.push(c);
                    in_word = true;
                }
            },
        }
    }
    if in_word {
        words.push(word);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_comes_from_the_basename() {
        assert_eq!(
            Invocation::from_program_name("/usr/bin/redo-ifchange").unwrap(),
            Invocation::IfChange
        );
        assert_eq!(
            Invocation::from_program_name("redo").unwrap(),
            Invocation::Redo
        );
        assert!(matches!(
            Invocation::from_program_name("make"),
            Err(RedoError::UnknownIdentity(_))
        ));
    }

    #[test]
    fn redoflags_words_parse_into_flags_and_descriptors() {
        let flags = parse_flag_words(
            "--keep-going --silent --redoparent-fd=7 --jobserver-fds=3,4",
            false,
        )
        .unwrap();
        assert!(flags.keep_going);
        assert!(flags.silent);
        assert!(!flags.verbose);
        assert_eq!(flags.parent_fd, Some(7));
        assert_eq!(flags.jobserver_fds, Some((3, 4)));
    }

    #[test]
    fn makeflags_leading_clump_gets_its_dash_back() {
        let flags = parse_flag_words("ks --jobserver-fds=5,6 CC=gcc", true).unwrap();
        assert!(flags.keep_going);
        assert!(flags.silent);
        assert_eq!(flags.jobserver_fds, Some((5, 6)));
    }

    #[test]
    fn fd_lists_accept_one_or_two_numbers() {
        assert_eq!(parse_fd_list("3,4").unwrap(), (3, 4));
        assert_eq!(parse_fd_list("9").unwrap(), (9, 9));
        assert!(parse_fd_list("3,x").is_err());
        assert!(parse_fd_list("").is_err());
        assert!(parse_fd_list("-1,4").is_err());
    }

    #[test]
    fn tokenizer_honors_quotes_and_escapes() {
        assert_eq!(
            tokenize(r#"--silent 'a b' c\ d"#),
            vec!["--silent", "a b", "c d"]
        );
        assert_eq!(tokenize("   "), Vec::<String>::new());
    }

    #[test]
    fn cli_accepts_the_documented_flags() {
        let args =
            CliArgs::try_parse_from(["redo", "-k", "--quiet", "-j", "4", "all", "docs"]).unwrap();
        assert!(args.keep_going);
        assert!(args.silent);
        assert_eq!(args.jobs, Some(4));
        assert_eq!(args.targets, vec!["all", "docs"]);
    }
}
