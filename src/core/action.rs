use serde::Serialize;

use crate::error::{AnalysisError, Result};

/// A remediation suggestion attached to an issue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Action {
    pub summary: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<String>,
}

impl Action {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            ..Self::default()
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.links.push(link.into());
        self
    }

    pub fn with_steps(mut self, steps: Vec<String>) -> Self {
        self.steps = steps;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.summary.trim().is_empty() {
            return Err(AnalysisError::InvalidIssue(
                "an Action summary is required".to_string(),
            ));
        }
        Ok(())
    }
}
