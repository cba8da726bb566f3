//! Rancher custom resources reporting unhealthy conditions.

use crate::analyzers::conditions::{self, ConditionTable, ResourceKind, Scope};
use crate::analyzers::{Analyzer, SnapshotContext};
use crate::core::IssueReporter;
use crate::core::catalog::RANCHER_ISSUES;

const MANAGEMENT_CLUSTER_CONDITIONS: ConditionTable = ConditionTable::healthy_when_true(&[
    ("Ready", "is not ready"),
    ("Provisioned", "is not provisioned"),
    ("Connected", "is not connected"),
    ("AgentDeployed", "agent is not deployed"),
    ("Updated", "is not updated"),
    ("Waiting", "is waiting"),
    ("NoDiskPressure", "has disk pressure"),
    ("NoMemoryPressure", "has memory pressure"),
]);

const PROVISIONING_CLUSTER_CONDITIONS: ConditionTable = ConditionTable::healthy_when_true(&[
    ("Ready", "is not ready"),
    ("Provisioned", "is not provisioned"),
    ("Updated", "is not updated"),
    ("Created", "is not created"),
    ("RKECluster", "RKE cluster is not ready"),
]);

const BUNDLE_DEPLOYMENT_CONDITIONS: ConditionTable = ConditionTable::healthy_when_true(&[
    ("Ready", "is not ready"),
    ("Deployed", "is not deployed"),
    ("Installed", "is not installed"),
    ("Monitored", "is not monitored"),
]);

const CLUSTER_REPO_CONDITIONS: ConditionTable = ConditionTable::healthy_when_true(&[
    ("OCIDownloaded", "OCI artifact is not downloaded"),
    ("FollowerDownloaded", "follower index is not downloaded"),
    ("Downloaded", "index is not downloaded"),
]);

const NODE_CONDITIONS: ConditionTable = ConditionTable::healthy_when_true(&[
    ("Ready", "is not ready"),
    ("Registered", "is not registered"),
    ("Provisioned", "is not provisioned"),
    ("Initialized", "is not initialized"),
    ("Updated", "is not updated"),
]);

const KONTAINER_DRIVER_CONDITIONS: ConditionTable = ConditionTable::healthy_when_true(&[
    ("Active", "is not active"),
    ("Downloaded", "is not downloaded"),
    ("Installed", "is not installed"),
]);

const MANAGED_CHART_CONDITIONS: ConditionTable = ConditionTable::healthy_when_true(&[
    ("Ready", "is not ready"),
    ("Processed", "is not processed"),
    ("Defined", "is not defined"),
]);

pub const RANCHER_KINDS: &[ResourceKind] = &[
    ResourceKind {
        file: "clusters.management.cattle.io.json",
        label: "Cluster",
        scope: Scope::Cluster,
        table: MANAGEMENT_CLUSTER_CONDITIONS,
    },
    ResourceKind {
        file: "clusterrepos.catalog.cattle.io.json",
        label: "ClusterRepo",
        scope: Scope::Cluster,
        table: CLUSTER_REPO_CONDITIONS,
    },
    ResourceKind {
        file: "kontainerdrivers.management.cattle.io.json",
        label: "KontainerDriver",
        scope: Scope::Cluster,
        table: KONTAINER_DRIVER_CONDITIONS,
    },
    ResourceKind {
        file: "clusters.provisioning.cattle.io.json",
        label: "provisioning Cluster",
        scope: Scope::Namespaced,
        table: PROVISIONING_CLUSTER_CONDITIONS,
    },
    ResourceKind {
        file: "bundledeployments.fleet.cattle.io.json",
        label: "BundleDeployment",
        scope: Scope::Namespaced,
        table: BUNDLE_DEPLOYMENT_CONDITIONS,
    },
    ResourceKind {
        file: "nodes.management.cattle.io.json",
        label: "Node",
        scope: Scope::Namespaced,
        table: NODE_CONDITIONS,
    },
    ResourceKind {
        file: "managedcharts.management.cattle.io.json",
        label: "ManagedChart",
        scope: Scope::Namespaced,
        table: MANAGED_CHART_CONDITIONS,
    },
];

pub struct RancherAnalyzer;

impl Analyzer for RancherAnalyzer {
    fn name(&self) -> &'static str {
        "rancher"
    }

    fn analyze(
        &self,
        ctx: &SnapshotContext<'_>,
        reporter: &mut IssueReporter,
    ) -> anyhow::Result<()> {
        let findings = conditions::walk_resource_files(ctx, "Rancher", RANCHER_KINDS)?;
        if !findings.messages.is_empty() {
            reporter.add_known_issue_messages_files(
                RANCHER_ISSUES,
                ctx.source(),
                findings.messages,
                findings.files,
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ReportStore;
    use crate::loader::SnapshotCache;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicU64, Ordering};

    fn make_root() -> PathBuf {
        static SEQ: AtomicU64 = AtomicU64::new(0);
        let seq = SEQ.fetch_add(1, Ordering::Relaxed);
        let root = std::env::temp_dir().join(format!(
            "vzanalyze-rancher-test-{}-{seq}/cluster-snapshot",
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

    #[test]
    fn collects_cluster_and_namespaced_problems_into_one_issue() {
        let root = make_root();
        write(
            &root.join("clusters.management.cattle.io.json"),
            r#"{"items":[{"metadata":{"name":"c-abc"},"status":{"conditions":[
                {"type":"Ready","status":"False","message":"Cluster agent is not connected"},
                {"type":"Provisioned","status":"True"}
            ]}}]}"#,
        );
        write(
            &root
                .join("fleet-default")
                .join("bundledeployments.fleet.cattle.io.json"),
            r#"{"items":[{"metadata":{"name":"mcc-agent","namespace":"fleet-default"},
                "status":{"conditions":[{"type":"Deployed","status":"False","reason":"Error"}]}}]}"#,
        );

        let cache = SnapshotCache::new();
        let ctx = SnapshotContext::new(&root, &cache);
        let mut reporter = IssueReporter::new();
        RancherAnalyzer
            .analyze(&ctx, &mut reporter)
            .expect("analyze");

        let store = ReportStore::new();
        reporter.contribute(&store, ctx.source()).expect("contribute");
        let issues = store.issues(ctx.source());
        assert_eq!(issues.len(), 1);
        let data = &issues[0].supporting_data[0];
        assert_eq!(
            data.messages,
            vec![
                "Rancher Cluster resource \"c-abc\" is not ready: Cluster agent is not connected",
                "Rancher BundleDeployment resource \"mcc-agent\" in namespace \"fleet-default\" is not deployed: Error",
            ]
        );
        assert_eq!(data.related_files.len(), 2);
        let _ = std::fs::remove_dir_all(root.parent().expect("parent"));
    }

    #[test]
    fn healthy_resources_raise_nothing() {
        let root = make_root();
        write(
            &root.join("clusters.management.cattle.io.json"),
            r#"{"items":[{"metadata":{"name":"local"},"status":{"conditions":[
                {"type":"Ready","status":"True"}]}}]}"#,
        );

        let cache = SnapshotCache::new();
        let ctx = SnapshotContext::new(&root, &cache);
        let mut reporter = IssueReporter::new();
        RancherAnalyzer
            .analyze(&ctx, &mut reporter)
            .expect("analyze");
        assert!(reporter.is_empty());
        let _ = std::fs::remove_dir_all(root.parent().expect("parent"));
    }
}
