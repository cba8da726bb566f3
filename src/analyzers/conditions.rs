//! Turning status conditions into human readable problem descriptions.
//!
//! Each resource kind has a fixed table mapping condition types to a short
//! description of the problem. Condition types missing from the table are
//! ignored.

use std::path::PathBuf;

use serde_json::Value;

use crate::analyzers::SnapshotContext;
use crate::jsonpath;
use crate::k8s::Condition;
use crate::scan;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemWhen {
    /// Healthy conditions are `True` (`Ready`, `Provisioned`, ...).
    NotTrue,
    /// The condition itself names a problem (`NamespaceContentRemaining`).
    True,
}

#[derive(Debug, Clone, Copy)]
pub struct ConditionTable {
    pub problem_when: ProblemWhen,
    pub entries: &'static [(&'static str, &'static str)],
}

impl ConditionTable {
    pub const fn healthy_when_true(entries: &'static [(&'static str, &'static str)]) -> Self {
        Self {
            problem_when: ProblemWhen::NotTrue,
            entries,
        }
    }

    pub const fn problem_when_true(entries: &'static [(&'static str, &'static str)]) -> Self {
        Self {
            problem_when: ProblemWhen::True,
            entries,
        }
    }

    fn describe(&self, condition: &Condition) -> Option<&'static str> {
        let is_problem = match self.problem_when {
            ProblemWhen::NotTrue => condition.status != "True",
            ProblemWhen::True => condition.status == "True",
        };
        if !is_problem {
            return None;
        }
        self.entries
            .iter()
            .find(|(ty, _)| *ty == condition.condition_type)
            .map(|(_, text)| *text)
    }
}

/// One description per problem condition, in condition order.
pub fn walk(conditions: &[Condition], table: &ConditionTable) -> Vec<String> {
    conditions
        .iter()
        .filter_map(|c| {
            let text = table.describe(c)?;
            Some(match (c.reason.is_empty(), c.message.is_empty()) {
                (_, false) => format!("{text}: {}", c.message),
                (false, true) => format!("{text}: {}", c.reason),
                (true, true) => text.to_string(),
            })
        })
        .collect()
}

/// Conditions under `status.conditions` of an untyped resource.
pub fn from_json(resource: &Value) -> Vec<Condition> {
    jsonpath::query_array(resource, "status.conditions")
        .into_iter()
        .filter_map(|c| serde_json::from_value(c).ok())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Cluster,
    Namespaced,
}

/// A captured custom resource kind that is checked by walking its conditions.
#[derive(Debug, Clone, Copy)]
pub struct ResourceKind {
    pub file: &'static str,
    pub label: &'static str,
    pub scope: Scope,
    pub table: ConditionTable,
}

#[derive(Debug, Default)]
pub struct WalkFindings {
    pub messages: Vec<String>,
    pub files: Vec<String>,
}

/// Walks the conditions of every captured resource of `kinds`. `product`
/// prefixes each message (`Rancher`, `Cluster API`).
///
/// Files that fail to decode are logged and skipped.
pub fn walk_resource_files(
    ctx: &SnapshotContext<'_>,
    product: &str,
    kinds: &[ResourceKind],
) -> crate::error::Result<WalkFindings> {
    let namespaces = ctx.namespaces()?;
    let mut findings = WalkFindings::default();

    for kind in kinds {
        let paths: Vec<PathBuf> = match kind.scope {
            Scope::Cluster => vec![scan::path_in_root(ctx.root(), kind.file)],
            Scope::Namespaced => namespaces
                .iter()
                .map(|ns| ctx.namespace_file(ns, kind.file))
                .collect(),
        };

        for path in paths {
            let doc = match ctx.cache().json(&path) {
                Ok(Some(doc)) => doc,
                Ok(None) => continue,
                Err(err) => {
                    log::warn!("skipping {}: {err}", path.display());
                    continue;
                }
            };

            let before = findings.messages.len();
            for item in jsonpath::query_array(&doc, "items") {
                let name = jsonpath::query_str(&item, "metadata.name").unwrap_or_default();
                let location = match jsonpath::query_str(&item, "metadata.namespace") {
                    Some(ns) if !ns.is_empty() => format!(" in namespace \"{ns}\""),
                    _ => String::new(),
                };
                for problem in walk(&from_json(&item), &kind.table) {
                    findings.messages.push(format!(
                        "{product} {} resource \"{name}\"{location} {problem}",
                        kind.label
                    ));
                }
            }
            if findings.messages.len() > before {
                findings.files.push(path.display().to_string());
            }
        }
    }
    Ok(findings)
}
