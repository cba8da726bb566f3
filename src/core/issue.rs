use serde::Serialize;

use crate::core::Action;
use crate::error::{AnalysisError, Result};
use crate::search::TextMatch;

pub const MAX_CONFIDENCE: u8 = 10;
pub const MAX_IMPACT: u8 = 10;

/// Reference to a value inside a captured JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct JsonPathRef {
    pub file: String,
    pub path: String,
}

/// Evidence backing an issue. One entry per finding that raised the issue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct SupportData {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub related_files: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub text_matches: Vec<TextMatch>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub json_paths: Vec<JsonPathRef>,
}

impl SupportData {
    pub fn messages_and_files(messages: Vec<String>, related_files: Vec<String>) -> Self {
        Self {
            messages,
            related_files,
            ..Self::default()
        }
    }

    pub fn messages_and_matches(messages: Vec<String>, text_matches: Vec<TextMatch>) -> Self {
        Self {
            messages,
            text_matches,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
            && self.related_files.is_empty()
            && self.text_matches.is_empty()
            && self.json_paths.is_empty()
    }

    /// Drops repeated entries within each list, keeping first occurrences.
    pub fn dedup(&mut self) {
        dedup_in_order(&mut self.messages);
        dedup_in_order(&mut self.related_files);
        dedup_in_order(&mut self.text_matches);
        dedup_in_order(&mut self.json_paths);
    }
}

fn dedup_in_order<T: Eq + std::hash::Hash + Clone>(items: &mut Vec<T>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Issue {
    #[serde(rename = "type")]
    pub issue_type: String,
    pub source: String,
    pub informational: bool,
    pub summary: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub supporting_data: Vec<SupportData>,
    pub confidence: u8,
    pub impact: u8,
}

impl Issue {
    /// Checks the issue is complete. When `map_source` is given the issue must
    /// belong to that source.
    pub fn validate(&self, map_source: Option<&str>) -> Result<()> {
        if self.issue_type.is_empty() {
            return Err(invalid("a Type is required for an Issue"));
        }
        if self.source.is_empty() {
            return Err(invalid("a Source is required for an Issue"));
        }
        if let Some(map_source) = map_source {
            if map_source != self.source {
                return Err(invalid(format!(
                    "the issue source {} doesn't match the map source supplied {map_source}",
                    self.source
                )));
            }
        }
        if self.summary.is_empty() {
            return Err(invalid("a Summary is required for an Issue"));
        }
        for action in &self.actions {
            action.validate()?;
        }
        if self.confidence > MAX_CONFIDENCE {
            return Err(invalid(format!(
                "confidence {} is out of range, it must be between 0 and {MAX_CONFIDENCE}",
                self.confidence
            )));
        }
        if self.impact > MAX_IMPACT {
            return Err(invalid(format!(
                "impact {} is out of range, it must be between 0 and {MAX_IMPACT}",
                self.impact
            )));
        }
        Ok(())
    }

    pub fn dedup_support_data(&mut self) {
        for data in &mut self.supporting_data {
            data.dedup();
        }
    }
}

fn invalid(message: impl Into<String>) -> AnalysisError {
    AnalysisError::InvalidIssue(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue() -> Issue {
        Issue {
            issue_type: "Custom".to_string(),
            source: "/snap/cluster-snapshot".to_string(),
            informational: false,
            summary: "something broke".to_string(),
            actions: vec![Action::new("fix it")],
            supporting_data: Vec::new(),
            confidence: 5,
            impact: 5,
        }
    }

    #[test]
    fn complete_issue_validates() {
        issue().validate(None).expect("valid");
        issue()
            .validate(Some("/snap/cluster-snapshot"))
            .expect("valid with source");
    }

    #[test]
    fn each_missing_field_is_rejected() {
        let mut i = issue();
        i.issue_type.clear();
        assert!(i.validate(None).unwrap_err().to_string().contains("Type"));

        let mut i = issue();
        i.source.clear();
        assert!(i.validate(None).unwrap_err().to_string().contains("Source"));

        let mut i = issue();
        i.summary.clear();
        assert!(i.validate(None).unwrap_err().to_string().contains("Summary"));

        let mut i = issue();
        i.actions.push(Action::new(""));
        assert!(i.validate(None).is_err());

        let mut i = issue();
        i.confidence = 11;
        assert!(i.validate(None).unwrap_err().to_string().contains("confidence"));
    }

    #[test]
    fn source_must_match_map_source() {
        let err = issue().validate(Some("/other")).unwrap_err();
        assert!(err.to_string().contains("doesn't match"), "{err}");
    }

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        let mut data = SupportData::messages_and_files(
            vec!["b".into(), "a".into(), "b".into()],
            vec!["f".into(), "f".into()],
        );
        data.dedup();
        assert_eq!(data.messages, vec!["b", "a"]);
        assert_eq!(data.related_files, vec!["f"]);
    }
}
