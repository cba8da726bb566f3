//! MySQL InnoDB clusters that are not online or are stuck deleting.
//!
//! The captured `InnoDBCluster` list is read untyped and addressed with
//! JSON paths so each finding can point at the value that raised it.

use serde_json::Value;

use crate::analyzers::pods::DELETION_THRESHOLD;
use crate::analyzers::{Analyzer, SnapshotContext, elapsed_at_capture, minutes_and_seconds};
use crate::core::catalog::{INNODB_CLUSTER_NOT_ONLINE, INNODB_CLUSTER_TERMINATING};
use crate::core::{IssueReporter, JsonPathRef, SupportData};
use crate::jsonpath;
use crate::search::parse_timestamp;

pub const INNODB_CLUSTER_FILE: &str = "inno-db-cluster.json";

const ONLINE: &str = "ONLINE";

pub struct MySqlAnalyzer;

impl Analyzer for MySqlAnalyzer {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn analyze(
        &self,
        ctx: &SnapshotContext<'_>,
        reporter: &mut IssueReporter,
    ) -> anyhow::Result<()> {
        for ns in ctx.namespaces()? {
            let path = ctx.namespace_file(&ns, INNODB_CLUSTER_FILE);
            let doc = match ctx.cache().json(&path) {
                Ok(Some(doc)) => doc,
                Ok(None) => continue,
                Err(err) => {
                    log::warn!("skipping {}: {err}", path.display());
                    continue;
                }
            };
            let file = path.display().to_string();

            for (i, cluster) in jsonpath::query_array(&doc, "items").iter().enumerate() {
                let name = jsonpath::query_str(cluster, "metadata.name").unwrap_or_default();
                check_online(reporter, ctx.source(), cluster, &name, &ns, &file, i);
                check_terminating(ctx, reporter, cluster, &name, &ns, &file, i);
            }
        }
        Ok(())
    }
}

fn check_online(
    reporter: &mut IssueReporter,
    source: &str,
    cluster: &Value,
    name: &str,
    ns: &str,
    file: &str,
    index: usize,
) {
    let status = jsonpath::query_str(cluster, "status.cluster.status").unwrap_or_default();
    if status == ONLINE {
        return;
    }
    let shown = if status.is_empty() { "unknown" } else { status.as_str() };
    reporter.add_known_issue(
        INNODB_CLUSTER_NOT_ONLINE,
        source,
        SupportData {
            messages: vec![format!(
                "InnoDBCluster {name} in namespace {ns} has status {shown}, expected {ONLINE}"
            )],
            related_files: vec![file.to_string()],
            json_paths: vec![JsonPathRef {
                file: file.to_string(),
                path: format!("items[{index}].status.cluster.status"),
            }],
            ..SupportData::default()
        },
    );
}

fn check_terminating(
    ctx: &SnapshotContext<'_>,
    reporter: &mut IssueReporter,
    cluster: &Value,
    name: &str,
    ns: &str,
    file: &str,
    index: usize,
) {
    let deleted_at = jsonpath::query_str(cluster, "metadata.deletionTimestamp")
        .as_deref()
        .and_then(parse_timestamp);
    let Some(elapsed) = elapsed_at_capture(ctx, deleted_at) else {
        return;
    };
    if elapsed < DELETION_THRESHOLD {
        return;
    }

    let mut messages = vec![format!(
        "InnoDBCluster {name} in namespace {ns} has spent {} terminating",
        minutes_and_seconds(elapsed)
    )];
    let finalizers: Vec<String> = jsonpath::query_array(cluster, "metadata.finalizers")
        .into_iter()
        .filter_map(|f| f.as_str().map(str::to_string))
        .collect();
    if !finalizers.is_empty() {
        messages.push(format!(
            "InnoDBCluster {name} still has finalizers: {}",
            finalizers.join(", ")
        ));
    }
    reporter.add_known_issue(
        INNODB_CLUSTER_TERMINATING,
        ctx.source(),
        SupportData {
            messages,
            related_files: vec![file.to_string()],
            json_paths: vec![JsonPathRef {
                file: file.to_string(),
                path: format!("items[{index}].metadata.deletionTimestamp"),
            }],
            ..SupportData::default()
        },
    );
}
