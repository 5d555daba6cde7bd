// src/db/codec.rs

//! Reading and writing dependency-database records.
//!
//! One record per line, tag-prefixed:
//!
//! ```text
//! a<name>                          absent
//! s<mtime-hex> <name>              special
//! d<mtime-hex> <name>              directory
//! f<hash 64 hex><sp><mtime-hex> <name>   regular file
//! ```
//!
//! A legacy whitespace-led format (`name mtime-hex digest`, 16-byte digest)
//! still decodes for compatibility but is never written. Decoding is
//! permissive: a malformed, short or unrecognized record degrades to an
//! Absent record rather than failing, which conservatively forces a rebuild.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::db::signature::{FileKind, HASH_LEN, NO_TIMESTAMP, Signature};

/// One prerequisite as captured when the owning target was last built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrereqRecord {
    pub name: String,
    pub sig: Signature,
}

/// Encode one record in the current on-disk format, newline included.
pub fn encode_record(sig: &Signature, name: &str) -> String {
    let mut line = String::new();
    match sig.kind {
        FileKind::Absent => {
            let _ = write!(line, "a{name}");
        }
        FileKind::Special => {
            let _ = write!(line, "s{:x} {name}", sig.mtime);
        }
        FileKind::Directory => {
            let _ = write!(line, "d{:x} {name}", sig.mtime);
        }
        FileKind::RegularFile => {
            let _ = write!(line, "f{} {:x} {name}", sig.hash_hex(), sig.mtime);
        }
    }
    line.push('\n');
    line
}

/// Decode one line. Returns `None` only for blank lines.
pub fn decode_line(line: &str) -> Option<PrereqRecord> {
    if line.is_empty() {
        return None;
    }
    let mut chars = line.char_indices();
    let (_, tag) = chars.next()?;
    let rest = &line[tag.len_utf8()..];
    let record = match tag {
        'a' => absent_record(rest),
        's' => timed_record(FileKind::Special, rest),
        'd' => timed_record(FileKind::Directory, rest),
        'f' => file_record(rest),
        c if c.is_whitespace() => legacy_record(line),
        _ => absent_record(rest),
    };
    Some(record)
}

/// Load every record of a committed database, or `None` when the database
/// cannot be opened (the target's status is then unknown).
pub fn read_records(path: &Path) -> Option<Vec<PrereqRecord>> {
    let file = File::open(path).ok()?;
    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.ok()?;
        if let Some(rec) = decode_line(&line) {
            records.push(rec);
        }
    }
    Some(records)
}

fn absent_record(rest: &str) -> PrereqRecord {
    PrereqRecord {
        name: rest.trim_start().to_string(),
        sig: Signature::absent(),
    }
}

/// `s`/`d` payload: hex mtime, whitespace, name.
fn timed_record(kind: FileKind, rest: &str) -> PrereqRecord {
    match split_hex_field(rest) {
        Some((mtime, name)) => PrereqRecord {
            name: name.to_string(),
            sig: Signature {
                kind,
                mtime,
                hash: [0u8; HASH_LEN],
            },
        },
        None => absent_record(rest),
    }
}

/// `f` payload: 64 hex hash digits, whitespace, hex mtime, whitespace, name.
fn file_record(rest: &str) -> PrereqRecord {
    let payload = rest.trim_start();
    let Some(hash) = parse_hash(payload) else {
        return absent_record(rest);
    };
    match split_hex_field(&payload[HASH_LEN * 2..]) {
        Some((mtime, name)) => PrereqRecord {
            name: name.to_string(),
            sig: Signature {
                kind: FileKind::RegularFile,
                mtime,
                hash,
            },
        },
        None => absent_record(rest),
    }
}

/// Legacy five-field shim: `name mtime-hex digest(16 bytes hex)`.
///
/// The digest belongs to an older, shorter hash scheme; it is validated and
/// discarded, leaving a zero hash. A record whose mtime still matches is
/// trusted; any other state mismatches the zero hash and forces a rebuild.
fn legacy_record(line: &str) -> PrereqRecord {
    let mut fields = line.split_whitespace();
    let (Some(name), Some(mtime_s), Some(digest)) = (fields.next(), fields.next(), fields.next())
    else {
        return absent_record(line);
    };
    let Ok(mtime) = i64::from_str_radix(mtime_s, 16) else {
        return absent_record(line);
    };
    if digest.len() != 32 || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
        return absent_record(line);
    }
    PrereqRecord {
        name: name.to_string(),
        sig: Signature {
            kind: FileKind::RegularFile,
            mtime,
            hash: [0u8; HASH_LEN],
        },
    }
}

/// Parse a leading hex integer, then skip whitespace; the remainder is the
/// record name.
fn split_hex_field(s: &str) -> Option<(i64, &str)> {
    let s = s.trim_start();
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_hexdigit())
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    let value = i64::from_str_radix(&s[..end], 16).ok()?;
    Some((value, s[end..].trim_start()))
}

fn parse_hash(s: &str) -> Option<[u8; HASH_LEN]> {
    let digits = s.as_bytes().get(..HASH_LEN * 2)?;
    let mut hash = [0u8; HASH_LEN];
    for (i, pair) in digits.chunks_exact(2).enumerate() {
        let hi = (pair[0] as char).to_digit(16)?;
        let lo = (pair[1] as char).to_digit(16)?;
        hash[i] = ((hi << 4) | lo) as u8;
    }
    Some(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn file_sig(mtime: i64, byte: u8) -> Signature {
        Signature {
            kind: FileKind::RegularFile,
            mtime,
            hash: [byte; HASH_LEN],
        }
    }

    #[test]
    fn roundtrip_every_kind() {
        let cases = [
            ("gone.txt", Signature::absent()),
            (
                "dev node",
                Signature {
                    kind: FileKind::Special,
                    mtime: 0x1234,
                    hash: [0u8; HASH_LEN],
                },
            ),
            (
                "some/dir",
                Signature {
                    kind: FileKind::Directory,
                    mtime: 0x5af3_107a,
                    hash: [0u8; HASH_LEN],
                },
            ),
            ("name with spaces.o", file_sig(0x66aa_bb01, 0x7f)),
        ];
        for (name, sig) in cases {
            let line = encode_record(&sig, name);
            assert!(line.ends_with('\n'));
            let rec = decode_line(line.trim_end_matches('\n')).unwrap();
            assert_eq!(rec.name, name);
            assert_eq!(rec.sig.kind, sig.kind);
            if sig.kind != FileKind::Absent {
                assert_eq!(rec.sig.mtime, sig.mtime);
            }
            if sig.kind == FileKind::RegularFile {
                assert_eq!(rec.sig.hash, sig.hash);
            }
        }
    }

    #[test]
    fn legacy_line_decodes_with_zero_hash() {
        let line = "\tsub/input.c 5af3107a 0123456789abcdef0123456789abcdef";
        let rec = decode_line(line).unwrap();
        assert_eq!(rec.name, "sub/input.c");
        assert_eq!(rec.sig.kind, FileKind::RegularFile);
        assert_eq!(rec.sig.mtime, 0x5af3107a);
        assert_eq!(rec.sig.hash, [0u8; HASH_LEN]);
    }

    #[test]
    fn malformed_records_degrade_to_absent() {
        // Truncated hash.
        let rec = decode_line("fdeadbeef 5af3107a foo").unwrap();
        assert_eq!(rec.sig.kind, FileKind::Absent);
        // Missing timestamp.
        let rec = decode_line("s name-only").unwrap();
        assert_eq!(rec.sig.kind, FileKind::Absent);
        // Unknown tag.
        let rec = decode_line("z whatever").unwrap();
        assert_eq!(rec.sig.kind, FileKind::Absent);
        assert_eq!(rec.name, "whatever");
        // Legacy with a short digest.
        let rec = decode_line(" foo 10 abcd").unwrap();
        assert_eq!(rec.sig.kind, FileKind::Absent);
        // Absent never loses the name.
        assert_eq!(decode_line("amissing.do").unwrap().name, "missing.do");
    }

    #[test]
    fn blank_lines_are_skipped() {
        assert!(decode_line("").is_none());
    }

    proptest! {
        /// The decoder must accept arbitrary garbage without panicking.
        #[test]
        fn decode_never_panics(line in ".*") {
            let _ = decode_line(&line);
        }

        #[test]
        fn file_records_roundtrip(mtime in 0i64..=i64::MAX / 2, byte in any::<u8>(), name in "[a-z./ -]{1,40}") {
            // Names are stored verbatim after the payload; leading spaces
            // would be eaten by the whitespace skip, so trim like a caller.
            let name = name.trim().to_string();
            prop_assume!(!name.is_empty());
            let sig = file_sig(mtime, byte);
            let rec = decode_line(encode_record(&sig, &name).trim_end_matches('\n')).unwrap();
            prop_assert_eq!(rec.name, name);
            prop_assert_eq!(rec.sig, sig);
        }
    }
}
