//! Structured log lines written by the Verrazzano platform operator.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::error::{AnalysisError, Result};
use crate::scan;

static OPERATOR_LOG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"verrazzano-install/verrazzano-platform-operator-[^/]*/logs\.txt$")
        .expect("operator log regex")
});

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogMessage {
    pub level: String,
    #[serde(rename = "@timestamp")]
    pub timestamp: String,
    pub message: String,
    pub component: String,
}

/// First platform operator log captured under `root`.
pub fn find_operator_log(root: &Path) -> Result<Option<PathBuf>> {
    Ok(scan::find_matching_files(root, &OPERATOR_LOG_RE)?
        .into_iter()
        .next())
}

/// Decodes every JSON line of the log. Lines that are not JSON objects are
/// skipped.
pub fn read_log_messages(path: &Path) -> Result<Vec<LogMessage>> {
    let file = std::fs::File::open(path).map_err(|err| AnalysisError::io(path, err))?;
    let mut out = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|err| AnalysisError::io(path, err))?;
        let line = line.trim();
        if !line.starts_with('{') {
            continue;
        }
        match serde_json::from_str::<LogMessage>(line) {
            Ok(msg) => out.push(msg),
            Err(err) => log::trace!("skipping operator log line in {}: {err}", path.display()),
        }
    }
    Ok(out)
}

/// Messages at `level` (case-insensitive) for `component`. An empty component
/// matches every message.
pub fn filter_by_level_component<'a>(
    messages: &'a [LogMessage],
    level: &str,
    component: &str,
) -> Vec<&'a LogMessage> {
    messages
        .iter()
        .filter(|m| m.level.eq_ignore_ascii_case(level))
        .filter(|m| component.is_empty() || m.component == component)
        .collect()
}

/// The last `n` lines of a text file.
pub fn last_lines(path: &Path, n: usize) -> Result<Vec<String>> {
    let file = std::fs::File::open(path).map_err(|err| AnalysisError::io(path, err))?;
    let mut tail = VecDeque::with_capacity(n);
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|err| AnalysisError::io(path, err))?;
        if tail.len() == n {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    Ok(tail.into())
}
