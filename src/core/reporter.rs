use std::collections::BTreeMap;

use crate::core::{Issue, ReportStore, SupportData, catalog};
use crate::error::Result;
use crate::search::TextMatch;

/// Accumulates issues while analyzers run over one snapshot root.
///
/// The first occurrence of an issue type is instantiated from the catalog;
/// later occurrences append their supporting data to the same issue.
#[derive(Debug, Default)]
pub struct IssueReporter {
    pending: BTreeMap<String, Issue>,
}

impl IssueReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Panics
    ///
    /// Panics if `issue_type` is not a registered known issue type.
    pub fn add_known_issue(&mut self, issue_type: &str, source: &str, data: SupportData) {
        let issue = self
            .pending
            .entry(issue_type.to_string())
            .or_insert_with(|| catalog::known_issue(issue_type, source));
        issue.supporting_data.push(data);
    }

    pub fn add_known_issue_messages_files(
        &mut self,
        issue_type: &str,
        source: &str,
        messages: Vec<String>,
        files: Vec<String>,
    ) {
        self.add_known_issue(
            issue_type,
            source,
            SupportData::messages_and_files(messages, files),
        );
    }

    pub fn add_known_issue_messages_matches(
        &mut self,
        issue_type: &str,
        source: &str,
        messages: Vec<String>,
        matches: Vec<TextMatch>,
    ) {
        self.add_known_issue(
            issue_type,
            source,
            SupportData::messages_and_matches(messages, matches),
        );
    }

    /// Adds an issue that is not in the catalog. Issues of the same type are
    /// merged by appending their supporting data.
    pub fn add_issue(&mut self, issue: Issue) {
        match self.pending.get_mut(&issue.issue_type) {
            Some(existing) => existing.supporting_data.extend(issue.supporting_data),
            None => {
                self.pending.insert(issue.issue_type.clone(), issue);
            }
        }
    }

    pub fn contains(&self, issue_type: &str) -> bool {
        self.pending.contains_key(issue_type)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Validates the pending issues, hands them to `store` under `source` and
    /// resets the reporter. Nothing is stored if any issue is invalid.
    pub fn contribute(&mut self, store: &ReportStore, source: &str) -> Result<usize> {
        let pending = std::mem::take(&mut self.pending);
        let issues: Vec<Issue> = pending.into_values().collect();
        let count = issues.len();
        store.contribute_issues(source, issues)?;
        Ok(count)
    }
}
