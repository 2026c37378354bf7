//! Validation for untrusted strings
//!
//! Transfer ids and filenames end up in filesystem paths, so everything
//! arriving from a client goes through here first.

use crate::transfer::constants::{FALLBACK_FILENAME, MAX_FILENAME_LENGTH};
use regex::Regex;
use std::sync::LazyLock;

/// Wormhole codes are number-word-word, e.g. "7-guitarist-revenge"
static EXCHANGE_CODE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+-[A-Za-z]+-[A-Za-z]+$").expect("valid regex"));

/// Transfer ids are send-{n} or recv-{n}
static TRANSFER_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(send|recv)-[0-9]+$").expect("valid regex"));

/// Check that a code has the `<digits>-<letters>-<letters>` shape
pub fn is_valid_exchange_code(code: &str) -> bool {
    EXCHANGE_CODE_PATTERN.is_match(code)
}

/// Check that an id has the `send-<digits>` / `recv-<digits>` shape
pub fn is_valid_transfer_id(id: &str) -> bool {
    TRANSFER_ID_PATTERN.is_match(id)
}

/// Sanitize a client-supplied file name so it is safe to use as a single
/// path component.
pub fn sanitize_filename(raw: &str) -> String {
    // Only the last component survives, for both separator styles
    let leaf = raw.rsplit(['/', '\\']).next().unwrap_or_default();

    let mut name: String = leaf
        .chars()
        .filter(|c| (*c as u32) >= 32 && *c != '\u{7f}')
        .collect();

    if name.len() > MAX_FILENAME_LENGTH {
        name = truncate_keeping_extension(&name, MAX_FILENAME_LENGTH);
    }

    if name.is_empty() || name == "." || name == ".." {
        return FALLBACK_FILENAME.to_string();
    }
    name
}

/// Sanitize every `/`-separated segment of a relative path independently.
pub fn sanitize_relative_path(path: &str) -> String {
    path.split('/')
        .map(sanitize_filename)
        .collect::<Vec<_>>()
        .join("/")
}

fn truncate_keeping_extension(name: &str, max_len: usize) -> String {
    let ext_start = name.rfind('.').filter(|&idx| idx > 0);
    match ext_start {
        Some(idx) if name.len() - idx < max_len => {
            let ext = &name[idx..];
            let base = &name[..floor_char_boundary(name, max_len - ext.len())];
            format!("{base}{ext}")
        }
        _ => name[..floor_char_boundary(name, max_len)].to_string(),
    }
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}
