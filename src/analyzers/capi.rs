use crate::analyzers::conditions::{self, ConditionTable, ResourceKind, Scope};
use crate::analyzers::{Analyzer, SnapshotContext};
use crate::core::IssueReporter;
use crate::core::catalog::CLUSTER_API_ISSUES;

const CLUSTER_CONDITIONS: ConditionTable = ConditionTable::healthy_when_true(&[
    ("Ready", "is not ready"),
    ("ControlPlaneInitialized", "control plane is not initialized"),
    ("ControlPlaneReady", "control plane is not ready"),
    ("InfrastructureReady", "infrastructure is not ready"),
]);

const MACHINE_CONDITIONS: ConditionTable = ConditionTable::healthy_when_true(&[
    ("Ready", "is not ready"),
    ("BootstrapReady", "bootstrap is not ready"),
    ("InfrastructureReady", "infrastructure is not ready"),
    ("NodeHealthy", "node is not healthy"),
    ("DrainingSucceeded", "draining did not succeed"),
]);

const MACHINE_DEPLOYMENT_CONDITIONS: ConditionTable = ConditionTable::healthy_when_true(&[
    ("Ready", "is not ready"),
    ("Available", "is not available"),
    ("MachineSetReady", "machine set is not ready"),
]);

const CONTROL_PLANE_CONDITIONS: ConditionTable = ConditionTable::healthy_when_true(&[
    ("Ready", "is not ready"),
    ("Available", "is not available"),
    ("CertificatesAvailable", "certificates are not available"),
    ("MachinesReady", "machines are not ready"),
    ("MachinesCreated", "machines are not created"),
    ("Resized", "is not resized"),
]);

pub const CLUSTER_API_KINDS: &[ResourceKind] = &[
    ResourceKind {
        file: "clusters.cluster.x-k8s.io.json",
        label: "Cluster",
        scope: Scope::Namespaced,
        table: CLUSTER_CONDITIONS,
    },
    ResourceKind {
        file: "machines.cluster.x-k8s.io.json",
        label: "Machine",
        scope: Scope::Namespaced,
        table: MACHINE_CONDITIONS,
    },
    ResourceKind {
        file: "machinedeployments.cluster.x-k8s.io.json",
        label: "MachineDeployment",
        scope: Scope::Namespaced,
        table: MACHINE_DEPLOYMENT_CONDITIONS,
    },
    ResourceKind {
        file: "kubeadmcontrolplanes.controlplane.cluster.x-k8s.io.json",
        label: "KubeadmControlPlane",
        scope: Scope::Namespaced,
        table: CONTROL_PLANE_CONDITIONS,
    },
];

/// Cluster API clusters, machines and control planes with failing conditions.
pub struct ClusterApiAnalyzer;

impl Analyzer for ClusterApiAnalyzer {
    fn name(&self) -> &'static str {
        "cluster-api"
    }

    fn analyze(
        &self,
        ctx: &SnapshotContext<'_>,
        reporter: &mut IssueReporter,
    ) -> anyhow::Result<()> {
        let findings = conditions::walk_resource_files(ctx, "Cluster API", CLUSTER_API_KINDS)?;
        if !findings.messages.is_empty() {
            reporter.add_known_issue_messages_files(
                CLUSTER_API_ISSUES,
                ctx.source(),
                findings.messages,
                findings.files,
            );
        }
        Ok(())
    }
}
