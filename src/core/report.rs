use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::Write as _;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::core::{Issue, ReportFormat};
use crate::error::Result;

pub const SCHEMA_VERSION: &str = "1.0";
pub const LINE_SEPARATOR: char = '-';

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportOptions {
    pub format: ReportFormat,
    pub include_info: bool,
    pub include_support: bool,
    pub include_actions: bool,
    pub min_confidence: u8,
    pub min_impact: u8,
    pub live: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            format: ReportFormat::Summary,
            include_info: true,
            include_support: true,
            include_actions: true,
            min_confidence: 0,
            min_impact: 0,
            live: false,
        }
    }
}

impl ReportOptions {
    pub fn keeps(&self, issue: &Issue) -> bool {
        !((issue.informational && !self.include_info)
            || issue.confidence < self.min_confidence
            || issue.impact < self.min_impact)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub issues: Vec<Issue>,
}

/// Machine readable form of a filtered report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportDocument {
    pub schema_version: String,
    pub tool_version: String,
    pub generated_at: String,
    pub sources: Vec<SourceReport>,
    pub clean_sources: Vec<String>,
}

#[derive(Debug, Default)]
struct StoreState {
    reports: BTreeMap<String, Vec<Issue>>,
    analyzed: BTreeSet<String>,
}

/// Issues contributed during one analysis session, keyed by source.
#[derive(Debug, Default)]
pub struct ReportStore {
    state: Mutex<StoreState>,
}

impl ReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validates every issue against `source` and appends them all, or none.
    pub fn contribute_issues(&self, source: &str, mut issues: Vec<Issue>) -> Result<()> {
        for issue in &mut issues {
            issue.validate(Some(source))?;
            issue.dedup_support_data();
        }
        if issues.is_empty() {
            return Ok(());
        }
        self.lock()
            .reports
            .entry(source.to_string())
            .or_default()
            .extend(issues);
        Ok(())
    }

    pub fn contribute_issue(&self, issue: Issue) -> Result<()> {
        let source = issue.source.clone();
        self.contribute_issues(&source, vec![issue])
    }

    pub fn add_source_analyzed(&self, source: &str) {
        self.lock().analyzed.insert(source.to_string());
    }

    pub fn sources_analyzed(&self) -> Vec<String> {
        self.lock().analyzed.iter().cloned().collect()
    }

    /// Every contributed issue for `source`, unfiltered.
    pub fn issues(&self, source: &str) -> Vec<Issue> {
        self.lock().reports.get(source).cloned().unwrap_or_default()
    }

    /// Issues surviving `opts`, deduplicated and ordered worst first, for every
    /// source that has any. Sources are in lexical order.
    pub fn filtered(&self, opts: &ReportOptions) -> Vec<SourceReport> {
        let state = self.lock();
        state
            .reports
            .iter()
            .filter_map(|(source, issues)| {
                let issues = prioritize(issues, opts);
                (!issues.is_empty()).then(|| SourceReport {
                    source: source.clone(),
                    issues,
                })
            })
            .collect()
    }

    /// Analyzed sources with no issue surviving `opts`.
    pub fn clean_sources(&self, opts: &ReportOptions) -> Vec<String> {
        let state = self.lock();
        state
            .analyzed
            .iter()
            .filter(|source| {
                state
                    .reports
                    .get(*source)
                    .is_none_or(|issues| issues.iter().all(|i| !opts.keeps(i)))
            })
            .cloned()
            .collect()
    }

    pub fn generate(&self, opts: &ReportOptions) -> String {
        let reports = self.filtered(opts);
        let clean = self.clean_sources(opts);

        let mut out = String::new();
        for report in &reports {
            let header = if opts.live {
                format!("Detected {} issues in the cluster:", report.issues.len())
            } else {
                format!(
                    "Detected {} issues for {}:",
                    report.issues.len(),
                    report.source
                )
            };
            let _ = writeln!(out);
            let _ = writeln!(out, "{header}");
            let _ = writeln!(
                out,
                "{}",
                LINE_SEPARATOR.to_string().repeat(header.chars().count())
            );
            for issue in &report.issues {
                match opts.format {
                    ReportFormat::Summary => write_summary(&mut out, issue, opts),
                    ReportFormat::Detailed => write_detailed(&mut out, issue, opts),
                }
            }
        }

        if !clean.is_empty() {
            let _ = writeln!(out);
        }
        for source in &clean {
            if opts.live {
                let _ = writeln!(
                    out,
                    "Verrazzano analysis CLI did not detect any issue in the cluster"
                );
            } else {
                let _ = writeln!(
                    out,
                    "Verrazzano analysis CLI did not detect any issue in {source}"
                );
            }
        }
        out
    }

    pub fn document(
        &self,
        opts: &ReportOptions,
        tool_version: &str,
        generated_at: &str,
    ) -> ReportDocument {
        let mut sources = self.filtered(opts);
        for report in &mut sources {
            for issue in &mut report.issues {
                if !opts.include_actions {
                    issue.actions.clear();
                }
                if !opts.include_support {
                    issue.supporting_data.clear();
                }
            }
        }
        ReportDocument {
            schema_version: SCHEMA_VERSION.to_string(),
            tool_version: tool_version.to_string(),
            generated_at: generated_at.to_string(),
            sources,
            clean_sources: self.clean_sources(opts),
        }
    }
}

fn prioritize(issues: &[Issue], opts: &ReportOptions) -> Vec<Issue> {
    let mut seen = HashSet::new();
    let mut kept: Vec<Issue> = issues
        .iter()
        .filter(|issue| opts.keeps(issue))
        .filter(|issue| seen.insert(*issue))
        .cloned()
        .collect();
    kept.sort_by(|a, b| {
        b.impact
            .cmp(&a.impact)
            .then(b.confidence.cmp(&a.confidence))
            .then_with(|| a.issue_type.cmp(&b.issue_type))
    });
    kept
}

fn write_summary(out: &mut String, issue: &Issue, opts: &ReportOptions) {
    let _ = writeln!(out);
    let _ = writeln!(out, "\tISSUE ({}): {}", issue.issue_type, issue.summary);
    if opts.include_actions {
        for action in &issue.actions {
            let _ = writeln!(out, "\t{}", action.summary);
        }
    }
}

fn write_detailed(out: &mut String, issue: &Issue, opts: &ReportOptions) {
    let _ = writeln!(out);
    let _ = writeln!(out, "\tISSUE ({})", issue.issue_type);
    let _ = writeln!(out, "\t\tsummary: {}", issue.summary);

    if opts.include_actions && !issue.actions.is_empty() {
        let _ = writeln!(out, "\t\tactions:");
        for action in &issue.actions {
            let _ = writeln!(out, "\t\t\taction: {}", action.summary);
            if !action.steps.is_empty() {
                let _ = writeln!(out, "\t\t\t\tSteps:");
                for (i, step) in action.steps.iter().enumerate() {
                    let _ = writeln!(out, "\t\t\t\t\tStep {}: {step}", i + 1);
                }
            }
            if !action.links.is_empty() {
                let _ = writeln!(out, "\t\t\t\tLinks:");
                for link in &action.links {
                    let _ = writeln!(out, "\t\t\t\t\t{link}");
                }
            }
        }
    }

    if !opts.include_support || issue.supporting_data.is_empty() {
        return;
    }
    let _ = writeln!(out, "\t\tsupportingData:");
    for data in &issue.supporting_data {
        if !data.messages.is_empty() {
            let _ = writeln!(out, "\t\t\tmessages:");
            for message in &data.messages {
                let _ = writeln!(out, "\t\t\t\t{message}");
            }
        }
        if !data.text_matches.is_empty() {
            let _ = writeln!(out, "\t\t\tsearch matches:");
            for m in &data.text_matches {
                if opts.live {
                    let _ = writeln!(out, "\t\t\t\t{}", m.matched_text);
                } else {
                    let _ = writeln!(
                        out,
                        "\t\t\t\t{}:{}: {}",
                        m.file_name, m.line_number, m.matched_text
                    );
                }
            }
        }
        if !data.json_paths.is_empty() {
            let _ = writeln!(out, "\t\t\trelated json:");
            for p in &data.json_paths {
                let _ = writeln!(out, "\t\t\t\t{}: {}", p.file, p.path);
            }
        }
        if !data.related_files.is_empty() {
            let _ = writeln!(out, "\t\t\trelated resource(s):");
            for file in &data.related_files {
                let _ = writeln!(out, "\t\t\t\t{file}");
            }
        }
    }
}
