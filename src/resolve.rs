// src/resolve.rs

//! Build-script search.
//!
//! For a target `dir/name.a.b` the probe order is:
//!
//! 1. `dir/name.a.b.do`
//! 2. `dir/default.a.b.do`, `dir/default.b.do`, `dir/default.do`
//!    (suffixes truncate at each successive `.`, first dot onward)
//! 3. the same sequence one directory level up, until no path separator
//!    remains.
//!
//! Every probe that does not exist is a negative prerequisite of the
//! target being built (if the script later appears, rebuild); the first
//! existing probe is a positive prerequisite and stops the walk.

use std::path::Path;

use tracing::trace;

/// A successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedScript {
    /// Path of the script to execute, relative to the working directory.
    pub script: String,
    /// `$1`: the target's own directory plus its basename with the matched
    /// suffix removed.
    pub fullbase: String,
    /// `$2`: the matched suffix including its leading dot; empty for a
    /// direct `<name>.do` hit.
    pub ext: String,
}

/// Outcome of the script search for one target.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Probed script paths that did not exist, in probe order.
    pub misses: Vec<String>,
    /// The first probe that existed, if any.
    pub script: Option<ResolvedScript>,
}

pub fn find_script(target: &str) -> Resolution {
    find_script_in(Path::new("."), target)
}

/// Search with existence probes anchored at `root` (targets and probe
/// names stay relative, as they are recorded in databases verbatim).
pub fn find_script_in(root: &Path, target: &str) -> Resolution {
    let split = target.rfind('/').map(|i| i + 1).unwrap_or(0);
    let target_dir = &target[..split];
    let basename = &target[split..];
    let first_dot = basename.find('.').unwrap_or(basename.len());

    let mut misses = Vec::new();
    let mut dir = target_dir.to_string();
    loop {
        // Direct script for the full name.
        let probe = format!("{dir}{basename}.do");
        if root.join(&probe).exists() {
            trace!(target, script = %probe, "script resolved");
            return Resolution {
                misses,
                script: Some(ResolvedScript {
                    script: probe,
                    fullbase: format!("{target_dir}{basename}"),
                    ext: String::new(),
                }),
            };
        }
        misses.push(probe);

        // default<suffix>.do for every suffix truncation, ending with the
        // bare default.do.
        let mut e = first_dot;
        loop {
            let base = &basename[..e];
            let ext = &basename[e..];
            let probe = format!("{dir}default{ext}.do");
            if root.join(&probe).exists() {
                trace!(target, script = %probe, "script resolved");
                return Resolution {
                    misses,
                    script: Some(ResolvedScript {
                        script: probe,
                        fullbase: format!("{target_dir}{base}"),
                        ext: ext.to_string(),
                    }),
                };
            }
            misses.push(probe);
            if e == basename.len() {
                break;
            }
            e = basename[e + 1..]
                .find('.')
                .map(|i| e + 1 + i)
                .unwrap_or(basename.len());
        }

        // Strip one path component and retry; stop when no separator
        // remains.
        if dir.len() < 2 {
            return Resolution {
                misses,
                script: None,
            };
        }
        dir = match dir[..dir.len() - 1].rfind('/') {
            Some(slash) => dir[..slash + 1].to_string(),
            None => String::new(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn probe_order_walks_extensions_then_directories() {
        let dir = tempfile::tempdir().unwrap();
        let res = find_script_in(dir.path(), "sub/foo.a.b");
        assert!(res.script.is_none());
        assert_eq!(
            res.misses,
            vec![
                "sub/foo.a.b.do",
                "sub/default.a.b.do",
                "sub/default.b.do",
                "sub/default.do",
                "foo.a.b.do",
                "default.a.b.do",
                "default.b.do",
                "default.do",
            ]
        );
    }

    #[test]
    fn direct_hit_has_empty_extension() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("foo.out.do"), "").unwrap();
        let res = find_script_in(dir.path(), "foo.out");
        let hit = res.script.unwrap();
        assert_eq!(hit.script, "foo.out.do");
        assert_eq!(hit.fullbase, "foo.out");
        assert_eq!(hit.ext, "");
        assert_eq!(res.misses, Vec::<String>::new());
    }

    #[test]
    fn default_hit_in_ancestor_keeps_target_directory_in_base() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("default.out.do"), "").unwrap();
        let res = find_script_in(dir.path(), "sub/foo.out");
        let hit = res.script.unwrap();
        assert_eq!(hit.script, "default.out.do");
        assert_eq!(hit.fullbase, "sub/foo");
        assert_eq!(hit.ext, ".out");
        // Everything probed before the hit is a recorded miss.
        assert_eq!(
            res.misses,
            vec![
                "sub/foo.out.do",
                "sub/default.out.do",
                "sub/default.do",
                "foo.out.do",
            ]
        );
    }

    #[test]
    fn no_extension_target_probes_bare_default() {
        let dir = tempfile::tempdir().unwrap();
        let res = find_script_in(dir.path(), "all");
        assert!(res.script.is_none());
        assert_eq!(res.misses, vec!["all.do", "default.do"]);
    }
}
