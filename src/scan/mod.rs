//! Locating files inside a captured cluster snapshot.
//!
//! A snapshot root holds one directory per namespace plus a few cluster-wide
//! files. Every helper here treats a missing root as "nothing captured" and
//! returns an empty result rather than an error.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;
use time::OffsetDateTime;
use walkdir::WalkDir;

use crate::error::{AnalysisError, Result};

pub const SNAPSHOT_DIR_PATTERN: &str = "cluster-snapshot$";
pub const METADATA_FILE: &str = "metadata.json";
pub const POD_LOG_FILE: &str = "logs.txt";

pub fn find_matching_files(root: &Path, pattern: &Regex) -> Result<Vec<PathBuf>> {
    walk_matching(root, pattern, |ft| ft.is_file())
}

pub fn find_matching_directories(root: &Path, pattern: &Regex) -> Result<Vec<PathBuf>> {
    walk_matching(root, pattern, |ft| ft.is_dir())
}

fn walk_matching(
    root: &Path,
    pattern: &Regex,
    keep: impl Fn(&std::fs::FileType) -> bool,
) -> Result<Vec<PathBuf>> {
    if root.as_os_str().is_empty() {
        return Err(AnalysisError::Configuration(
            "a snapshot root directory is required".to_string(),
        ));
    }
    if !root.exists() {
        log::debug!("snapshot root {} does not exist", root.display());
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
    {
        let entry = entry.map_err(|err| {
            let path = err
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| root.to_path_buf());
            AnalysisError::io(path, std::io::Error::from(err))
        })?;
        if !keep(&entry.file_type()) {
            continue;
        }
        if pattern.is_match(&entry.path().to_string_lossy()) {
            out.push(entry.into_path());
        }
    }
    Ok(out)
}

/// Names of the immediate subdirectories of `root`, sorted.
pub fn find_namespaces(root: &Path) -> Result<Vec<String>> {
    if root.as_os_str().is_empty() {
        return Err(AnalysisError::Configuration(
            "a snapshot root directory is required".to_string(),
        ));
    }
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(AnalysisError::io(root, err)),
    };

    let mut namespaces = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| AnalysisError::io(root, err))?;
        let is_dir = entry
            .file_type()
            .map_err(|err| AnalysisError::io(entry.path(), err))?
            .is_dir();
        if is_dir {
            namespaces.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    namespaces.sort();
    Ok(namespaces)
}

pub fn path_in_namespace(root: &Path, namespace: &str, file: &str) -> PathBuf {
    root.join(namespace).join(file)
}

pub fn path_in_root(root: &Path, file: &str) -> PathBuf {
    root.join(file)
}

pub fn pod_log_path(root: &Path, namespace: &str, pod: &str) -> PathBuf {
    root.join(namespace).join(pod).join(POD_LOG_FILE)
}

#[derive(Debug, Deserialize)]
struct CaptureMetadata {
    #[serde(with = "time::serde::rfc3339")]
    time: OffsetDateTime,
}

/// The capture time recorded in `metadata.json`, if the snapshot has one.
pub fn time_of_capture(root: &Path) -> Result<Option<OffsetDateTime>> {
    let path = path_in_root(root, METADATA_FILE);
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(AnalysisError::io(path, err)),
    };
    let meta: CaptureMetadata =
        serde_json::from_slice(&bytes).map_err(|err| AnalysisError::decode(&path, err))?;
    Ok(Some(meta.time))
}
