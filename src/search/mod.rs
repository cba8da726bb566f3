//! Line-oriented regex search over captured text files (mostly pod logs).

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::{AnalysisError, Result};

static TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:\d{2})")
        .expect("timestamp regex")
});

/// Inclusive time window. A missing bound leaves that side open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<OffsetDateTime>,
    pub end: Option<OffsetDateTime>,
}

impl TimeRange {
    pub fn new(start: Option<OffsetDateTime>, end: Option<OffsetDateTime>) -> Self {
        Self { start, end }
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TextMatch {
    pub file_name: String,
    pub line_number: usize,
    pub matched_text: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub timestamp: Option<OffsetDateTime>,
}

pub fn parse_timestamp(s: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(s.trim(), &Rfc3339).ok()
}

/// First RFC 3339 timestamp found anywhere in the line.
pub fn extract_timestamp(line: &str) -> Option<OffsetDateTime> {
    TIMESTAMP_RE
        .find(line)
        .and_then(|m| parse_timestamp(m.as_str()))
}

pub fn is_in_time_range(timestamp: Option<OffsetDateTime>, range: Option<&TimeRange>) -> bool {
    let Some(range) = range else {
        return true;
    };
    if range.is_unbounded() {
        return true;
    }
    let Some(ts) = timestamp else {
        return false;
    };
    if let Some(start) = range.start {
        if ts < start {
            return false;
        }
    }
    if let Some(end) = range.end {
        if ts > end {
            return false;
        }
    }
    true
}

/// Streams `path` line by line and returns every line matching `pattern`.
///
/// Directories and other non-regular files yield no matches; a path that
/// cannot be opened is an error.
pub fn search_file(
    path: &Path,
    pattern: &Regex,
    range: Option<&TimeRange>,
) -> Result<Vec<TextMatch>> {
    let meta = std::fs::metadata(path).map_err(|err| AnalysisError::io(path, err))?;
    if !meta.is_file() {
        return Ok(Vec::new());
    }

    let file = std::fs::File::open(path).map_err(|err| AnalysisError::io(path, err))?;
    let mut reader = BufReader::new(file);
    let file_name = path.display().to_string();

    let mut out = Vec::new();
    let mut buf = Vec::new();
    let mut line_number = 0usize;
    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(|err| AnalysisError::io(path, err))?;
        if n == 0 {
            break;
        }
        line_number += 1;

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        if !pattern.is_match(line) {
            continue;
        }
        let timestamp = extract_timestamp(line);
        if !is_in_time_range(timestamp, range) {
            continue;
        }
        out.push(TextMatch {
            file_name: file_name.clone(),
            line_number,
            matched_text: line.to_string(),
            timestamp,
        });
    }
    Ok(out)
}

pub fn search_files(
    files: &[PathBuf],
    pattern: &Regex,
    range: Option<&TimeRange>,
) -> Result<Vec<TextMatch>> {
    let mut out = Vec::new();
    for file in files {
        out.extend(search_file(file, pattern, range)?);
    }
    Ok(out)
}

pub fn find_files_and_search(
    root: &Path,
    file_pattern: &Regex,
    search_pattern: &Regex,
    range: Option<&TimeRange>,
) -> Result<Vec<TextMatch>> {
    let files = crate::scan::find_matching_files(root, file_pattern)?;
    search_files(&files, search_pattern, range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use time::macros::datetime;

    fn make_temp_dir() -> PathBuf {
        static SEQ: AtomicU64 = AtomicU64::new(0);
        let seq = SEQ.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!(
            "vzanalyze-search-test-{}-{seq}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("create dir");
        dir
    }

    #[test]
    fn time_range_edges() {
        let t = datetime!(2023-01-01 12:00:00 UTC);
        assert!(is_in_time_range(None, None));
        assert!(is_in_time_range(None, Some(&TimeRange::default())));
        assert!(!is_in_time_range(
            None,
            Some(&TimeRange::new(Some(t), None))
        ));
        assert!(is_in_time_range(
            Some(t),
            Some(&TimeRange::new(Some(t), Some(t)))
        ));
        assert!(!is_in_time_range(
            Some(t),
            Some(&TimeRange::new(Some(datetime!(2023-01-01 12:00:01 UTC)), None))
        ));
        assert!(!is_in_time_range(
            Some(t),
            Some(&TimeRange::new(None, Some(datetime!(2023-01-01 11:59:59 UTC))))
        ));
    }

    #[test]
    fn search_reports_line_numbers_and_timestamps() {
        let dir = make_temp_dir();
        let log = dir.join("logs.txt");
        std::fs::write(
            &log,
            "2023-01-01T10:00:00Z starting\n\
             2023-01-01T10:00:01Z error: boom\n\
             no timestamp error here\n",
        )
        .expect("write");

        let re = Regex::new("error").expect("regex");
        let matches = search_file(&log, &re, None).expect("search");
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].line_number, 2);
        assert_eq!(
            matches[0].timestamp,
            Some(datetime!(2023-01-01 10:00:01 UTC))
        );
        assert_eq!(matches[1].line_number, 3);
        assert_eq!(matches[1].timestamp, None);

        let range = TimeRange::new(Some(datetime!(2023-01-01 10:00:00 UTC)), None);
        let matches = search_file(&log, &re, Some(&range)).expect("search");
        assert_eq!(matches.len(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn directories_are_skipped_and_missing_files_fail() {
        let dir = make_temp_dir();
        let re = Regex::new(".*").expect("regex");
        assert!(search_file(&dir, &re, None).expect("dir").is_empty());
        assert!(search_file(&dir.join("nope.txt"), &re, None).is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn find_and_search_combines_locator_and_search() {
        let dir = make_temp_dir();
        std::fs::create_dir_all(dir.join("ns/pod-a")).expect("mkdirs");
        std::fs::write(dir.join("ns/pod-a/logs.txt"), "ok\nfailed to start\n").expect("write");
        std::fs::write(dir.join("ns/pods.json"), "failed").expect("write");

        let files = Regex::new(r"logs\.txt$").expect("regex");
        let needle = Regex::new("failed").expect("regex");
        let matches = find_files_and_search(&dir, &files, &needle, None).expect("search");
        assert_eq!(matches.len(), 1);
        assert!(matches[0].file_name.ends_with("logs.txt"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
