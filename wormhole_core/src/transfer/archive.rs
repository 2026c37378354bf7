//! Packs a multi-file upload into one zip archive
//!
//! Blocking; callers run it on `spawn_blocking`.

use super::constants::DEFAULT_ARCHIVE_NAME;
use super::upload::StagedPart;
use crate::error::StorageError;
use crate::validate::{sanitize_filename, sanitize_relative_path};
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;

/// A finished archive on disk
#[derive(Debug, Clone)]
pub struct Archive {
    pub path: PathBuf,
    pub name: String,
    /// Entry paths, in upload order
    pub entries: Vec<String>,
    /// Sum of the uncompressed entry sizes
    pub bytes_written: u64,
    /// Size of the archive file itself
    pub size: u64,
}

/// Write `parts` into `<dir>/<archive name>`.
///
/// `paths[i]`, when present and non-empty, is the relative path of
/// `parts[i]` inside the archive. On failure the partial archive is removed.
pub fn package(dir: &Path, parts: &[StagedPart], paths: &[String]) -> Result<Archive, StorageError> {
    std::fs::create_dir_all(dir).map_err(|source| StorageError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let name = archive_name(paths);
    let path = dir.join(&name);

    match write_archive(&path, parts, paths) {
        Ok((entries, bytes_written)) => {
            let size = std::fs::metadata(&path)?.len();
            tracing::debug!(
                archive = %name,
                entries = entries.len(),
                bytes_written,
                size,
                "Archive created"
            );
            Ok(Archive {
                path,
                name,
                entries,
                bytes_written,
                size,
            })
        }
        Err(e) => {
            if let Err(rm) = std::fs::remove_file(&path) {
                if rm.kind() != io::ErrorKind::NotFound {
                    tracing::warn!("Failed to remove partial archive {}: {}", path.display(), rm);
                }
            }
            Err(e)
        }
    }
}

fn write_archive(
    path: &Path,
    parts: &[StagedPart],
    paths: &[String],
) -> Result<(Vec<String>, u64), StorageError> {
    let file = File::create(path)?;
    let mut writer = zip::ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut taken = HashSet::new();
    let mut entries = Vec::with_capacity(parts.len());
    let mut bytes_written = 0u64;

    for (i, part) in parts.iter().enumerate() {
        let wanted = match paths.get(i).filter(|p| !p.is_empty()) {
            Some(relative) => sanitize_relative_path(relative),
            None => sanitize_filename(&part.original_name),
        };
        let entry = unique_entry_path(&wanted, &mut taken);

        let mut source = File::open(&part.path)?;
        writer.start_file(
            entry.as_str(),
            options.large_file(part.size >= u64::from(u32::MAX)),
        )?;
        bytes_written += io::copy(&mut source, &mut writer)?;
        entries.push(entry);
    }

    writer.finish()?.flush()?;
    Ok((entries, bytes_written))
}

/// `files.zip`, unless every supplied path sits under the same leading
/// folder as the first one, in which case the folder names the archive.
fn archive_name(paths: &[String]) -> String {
    let folder = paths
        .first()
        .and_then(|first| first.split_once('/'))
        .map(|(folder, _)| folder)
        .filter(|folder| !folder.is_empty());

    match folder {
        Some(folder)
            if paths
                .iter()
                .all(|p| p.split_once('/').is_some_and(|(f, _)| f == folder)) =>
        {
            format!("{}.zip", sanitize_filename(folder))
        }
        _ => DEFAULT_ARCHIVE_NAME.to_string(),
    }
}

/// Suffix repeated entry paths: `a.txt`, `a-2.txt`, `a-3.txt`, ...
fn unique_entry_path(wanted: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(wanted.to_string()) {
        return wanted.to_string();
    }

    let (parent, leaf) = match wanted.rsplit_once('/') {
        Some((parent, leaf)) => (Some(parent), leaf),
        None => (None, wanted),
    };
    let (stem, ext) = match leaf.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, Some(ext)),
        _ => (leaf, None),
    };

    let mut idx = 2usize;
    loop {
        let candidate_leaf = match ext {
            Some(ext) => format!("{stem}-{idx}.{ext}"),
            None => format!("{stem}-{idx}"),
        };
        let candidate = match parent {
            Some(parent) => format!("{parent}/{candidate_leaf}"),
            None => candidate_leaf,
        };
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        idx += 1;
    }
}
