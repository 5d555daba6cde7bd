// tests/incremental.rs

//! Change detection across repeated builds: content hashes decide, not
//! timestamps, and script-search misses are remembered.

mod common;

use std::fs;
use std::thread::sleep;
use std::time::Duration;

use common::*;

/// Timestamps are recorded in whole seconds; a pause guarantees a rewrite
/// gets a new one.
fn tick() {
    sleep(Duration::from_millis(1100));
}

#[test]
fn unchanged_inputs_do_not_rerun_the_script() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("foo.in"), "v1\n").unwrap();
    write_script(dir.path(), "all.do", "redo-ifchange foo.out");
    write_script(
        dir.path(),
        "foo.out.do",
        r#"echo run >> foo.runs
redo-ifchange foo.in
cat foo.in > "$3""#,
    );

    assert_success(&redo(dir.path(), &["all"]));
    assert_eq!(run_count(dir.path(), "foo.runs"), 1);
    assert_eq!(read(dir.path(), "foo.out"), "v1\n");

    assert_success(&redo(dir.path(), &["all"]));
    assert_eq!(run_count(dir.path(), "foo.runs"), 1);
}

#[test]
fn touching_without_changing_content_does_not_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("foo.in"), "same\n").unwrap();
    write_script(dir.path(), "all.do", "redo-ifchange foo.out");
    write_script(
        dir.path(),
        "foo.out.do",
        r#"echo run >> foo.runs
redo-ifchange foo.in
cat foo.in > "$3""#,
    );

    assert_success(&redo(dir.path(), &["all"]));
    assert_eq!(run_count(dir.path(), "foo.runs"), 1);

    // Same bytes, fresh timestamp.
    tick();
    fs::write(dir.path().join("foo.in"), "same\n").unwrap();
    assert_success(&redo(dir.path(), &["all"]));
    assert_eq!(run_count(dir.path(), "foo.runs"), 1);
}

#[test]
fn changed_content_rebuilds_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("foo.in"), "v1\n").unwrap();
    write_script(dir.path(), "all.do", "redo-ifchange foo.out");
    write_script(
        dir.path(),
        "foo.out.do",
        r#"echo run >> foo.runs
redo-ifchange foo.in
cat foo.in > "$3""#,
    );

    assert_success(&redo(dir.path(), &["all"]));
    tick();
    fs::write(dir.path().join("foo.in"), "v2\n").unwrap();

    assert_success(&redo(dir.path(), &["all"]));
    assert_eq!(run_count(dir.path(), "foo.runs"), 2);
    assert_eq!(read(dir.path(), "foo.out"), "v2\n");

    assert_success(&redo(dir.path(), &["all"]));
    assert_eq!(run_count(dir.path(), "foo.runs"), 2);
}

#[test]
fn a_deleted_target_is_rebuilt() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("foo.in"), "v1\n").unwrap();
    write_script(dir.path(), "all.do", "redo-ifchange foo.out");
    write_script(
        dir.path(),
        "foo.out.do",
        r#"echo run >> foo.runs
redo-ifchange foo.in
cat foo.in > "$3""#,
    );

    assert_success(&redo(dir.path(), &["all"]));
    assert_eq!(run_count(dir.path(), "foo.runs"), 1);

    // The database still exists and every record in it still matches;
    // only the target file itself is gone.
    fs::remove_file(dir.path().join("foo.out")).unwrap();
    assert_success(&redo(dir.path(), &["all"]));
    assert_eq!(run_count(dir.path(), "foo.runs"), 2);
    assert_eq!(read(dir.path(), "foo.out"), "v1\n");
}

#[test]
fn a_more_specific_script_appearing_triggers_a_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    write_script(dir.path(), "all.do", "redo-ifchange foo.out");
    write_script(dir.path(), "default.out.do", r#"echo generic > "$3""#);

    assert_success(&redo(dir.path(), &["all"]));
    assert_eq!(read(dir.path(), "foo.out"), "generic\n");

    // The earlier probe miss for foo.out.do was recorded; creating the
    // script invalidates the target.
    write_script(dir.path(), "foo.out.do", r#"echo specific > "$3""#);
    assert_success(&redo(dir.path(), &["all"]));
    assert_eq!(read(dir.path(), "foo.out"), "specific\n");
}

#[test]
fn ifcreate_rebuilds_when_the_watched_file_appears() {
    let dir = tempfile::tempdir().unwrap();
    write_script(dir.path(), "all.do", "redo-ifchange gen.out");
    write_script(
        dir.path(),
        "gen.out.do",
        r#"echo run >> gen.runs
if [ -e extra.cfg ]; then
    redo-ifchange extra.cfg
    cat extra.cfg > "$3"
else
    redo-ifcreate extra.cfg
    echo defaults > "$3"
fi"#,
    );

    assert_success(&redo(dir.path(), &["all"]));
    assert_eq!(run_count(dir.path(), "gen.runs"), 1);
    assert_eq!(read(dir.path(), "gen.out"), "defaults\n");

    // Still satisfied while the file stays absent.
    assert_success(&redo(dir.path(), &["all"]));
    assert_eq!(run_count(dir.path(), "gen.runs"), 1);

    fs::write(dir.path().join("extra.cfg"), "tuned\n").unwrap();
    assert_success(&redo(dir.path(), &["all"]));
    assert_eq!(run_count(dir.path(), "gen.runs"), 2);
    assert_eq!(read(dir.path(), "gen.out"), "tuned\n");
}
