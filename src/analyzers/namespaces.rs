//! Namespaces stuck in `Terminating`.

use crate::analyzers::conditions::{self, ConditionTable};
use crate::analyzers::{Analyzer, SnapshotContext, elapsed_at_capture, minutes_and_seconds};
use crate::core::IssueReporter;
use crate::core::catalog::{NAMESPACE_TERMINATING, NAMESPACE_TERMINATING_UNDETERMINED};
use crate::k8s::Namespace;
use crate::loader;

pub const NAMESPACE_FILE: &str = "namespace.json";

const TERMINATING: &str = "Terminating";

const NAMESPACE_CONDITIONS: ConditionTable = ConditionTable::problem_when_true(&[
    (
        "NamespaceContentRemaining",
        "Some resources remain in the namespace",
    ),
    (
        "NamespaceFinalizersRemaining",
        "Some finalizers remain in the namespace",
    ),
    (
        "NamespaceDeletionContentFailure",
        "Failed to delete the content of the namespace",
    ),
    (
        "NamespaceDeletionDiscoveryFailure",
        "Failed to discover the content of the namespace",
    ),
    (
        "NamespaceDeletionGroupVersionParsingFailure",
        "Failed to parse the group versions of the namespace content",
    ),
]);

pub struct NamespacesAnalyzer;

impl Analyzer for NamespacesAnalyzer {
    fn name(&self) -> &'static str {
        "namespaces"
    }

    fn analyze(
        &self,
        ctx: &SnapshotContext<'_>,
        reporter: &mut IssueReporter,
    ) -> anyhow::Result<()> {
        for ns in ctx.namespaces()? {
            let path = ctx.namespace_file(&ns, NAMESPACE_FILE);
            let namespace = match loader::load_list::<Namespace>(&path) {
                Ok(Some(namespace)) => namespace,
                Ok(None) => continue,
                Err(err) => {
                    log::warn!("skipping {}: {err}", path.display());
                    continue;
                }
            };
            if namespace.status.phase != TERMINATING {
                continue;
            }

            let name = if namespace.metadata.name.is_empty() {
                ns.as_str()
            } else {
                namespace.metadata.name.as_str()
            };
            let elapsed = elapsed_at_capture(ctx, namespace.metadata.deletion_time());
            let (issue_type, headline) = match elapsed {
                Some(elapsed) => (
                    NAMESPACE_TERMINATING,
                    format!(
                        "The namespace {name} has spent {} terminating",
                        minutes_and_seconds(elapsed)
                    ),
                ),
                None => (
                    NAMESPACE_TERMINATING_UNDETERMINED,
                    format!(
                        "The namespace {name} has been terminating for an undetermined amount of time"
                    ),
                ),
            };

            let mut messages = vec![headline];
            messages.extend(
                conditions::walk(&namespace.status.conditions, &NAMESPACE_CONDITIONS)
                    .into_iter()
                    .map(|problem| format!("Namespace {name}: {problem}")),
            );
            reporter.add_known_issue_messages_files(
                issue_type,
                ctx.source(),
                messages,
                vec![path.display().to_string()],
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::SnapshotCache;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicU64, Ordering};

    fn make_root() -> PathBuf {
        static SEQ: AtomicU64 = AtomicU64::new(0);
        let seq = SEQ.fetch_add(1, Ordering::Relaxed);
        let root = std::env::temp_dir().join(format!(
            "vzanalyze-ns-test-{}-{seq}/cluster-snapshot",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&root);
        std::fs::create_dir_all(&root).expect("mkdirs");
        root
    }

    fn write(path: &Path, body: &str) {
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdirs");
        std::fs::write(path, body).expect("write");
    }

    const TERMINATING_NS: &str = r#"{
        "metadata": {"name": "stuck", "deletionTimestamp": "2024-01-01T00:00:00Z"},
        "status": {"phase": "Terminating", "conditions": [
            {"type": "NamespaceContentRemaining", "status": "True", "message": "Some resources are remaining: pods. has 1 resource instances"},
            {"type": "NamespaceDeletionDiscoveryFailure", "status": "False"}
        ]}
    }"#;

    #[test]
    fn reports_time_spent_terminating() {
        let root = make_root();
        write(&root.join("metadata.json"), r#"{"time":"2024-01-01T00:02:05Z"}"#);
        write(&root.join("stuck").join(NAMESPACE_FILE), TERMINATING_NS);
        write(
            &root.join("fine").join(NAMESPACE_FILE),
            r#"{"metadata":{"name":"fine"},"status":{"phase":"Active"}}"#,
        );

        let cache = SnapshotCache::new();
        let ctx = SnapshotContext::new(&root, &cache);
        let mut reporter = IssueReporter::new();
        NamespacesAnalyzer
            .analyze(&ctx, &mut reporter)
            .expect("analyze");

        let store = crate::core::ReportStore::new();
        reporter.contribute(&store, ctx.source()).expect("contribute");
        let issues = store.issues(ctx.source());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].issue_type, NAMESPACE_TERMINATING);
        let messages = &issues[0].supporting_data[0].messages;
        assert_eq!(
            messages[0],
            "The namespace stuck has spent 2 minutes and 5 seconds terminating"
        );
        assert_eq!(messages.len(), 2);
        assert!(messages[1].contains("Some resources remain in the namespace"));
        let _ = std::fs::remove_dir_all(root.parent().expect("parent"));
    }

    #[test]
    fn unknown_capture_time_is_undetermined() {
        let root = make_root();
        write(&root.join("stuck").join(NAMESPACE_FILE), TERMINATING_NS);

        let cache = SnapshotCache::new();
        let ctx = SnapshotContext::new(&root, &cache);
        let mut reporter = IssueReporter::new();
        NamespacesAnalyzer
            .analyze(&ctx, &mut reporter)
            .expect("analyze");
        assert!(reporter.contains(NAMESPACE_TERMINATING_UNDETERMINED));
        assert!(!reporter.contains(NAMESPACE_TERMINATING));
        let _ = std::fs::remove_dir_all(root.parent().expect("parent"));
    }

    #[test]
    fn missing_deletion_timestamp_is_undetermined() {
        let root = make_root();
        write(&root.join("metadata.json"), r#"{"time":"2024-01-01T00:02:05Z"}"#);
        write(
            &root.join("stuck").join(NAMESPACE_FILE),
            r#"{"metadata":{"name":"stuck"},"status":{"phase":"Terminating"}}"#,
        );

        let cache = SnapshotCache::new();
        let ctx = SnapshotContext::new(&root, &cache);
        let mut reporter = IssueReporter::new();
        NamespacesAnalyzer
            .analyze(&ctx, &mut reporter)
            .expect("analyze");

        let store = crate::core::ReportStore::new();
        reporter.contribute(&store, ctx.source()).expect("contribute");
        let issues = store.issues(ctx.source());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].issue_type, NAMESPACE_TERMINATING_UNDETERMINED);
        assert_eq!(
            issues[0].supporting_data[0].messages,
            vec!["The namespace stuck has been terminating for an undetermined amount of time"]
        );
        let _ = std::fs::remove_dir_all(root.parent().expect("parent"));
    }
}
