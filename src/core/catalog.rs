//! Registry of known issue types and their templates.

use crate::core::{Action, Issue};
use crate::error::ProgrammerError;

pub const RUNBOOK_BASE: &str =
    "https://verrazzano.io/latest/docs/troubleshooting/diagnostictools/analysisadvice";

pub const IMAGE_PULL_BACK_OFF: &str = "ImagePullBackOff";
pub const IMAGE_PULL_RATE_LIMIT: &str = "ImagePullRateLimit";
pub const IMAGE_PULL_NOT_FOUND: &str = "ImagePullNotFound";
pub const IMAGE_PULL_SERVICE: &str = "ImagePullService";
pub const INSUFFICIENT_MEMORY: &str = "InsufficientMemory";
pub const INSUFFICIENT_CPU: &str = "InsufficientCPU";
pub const INGRESS_INSTALL_FAILURE: &str = "IngressInstallFailure";
pub const INGRESS_LB_LIMIT_EXCEEDED: &str = "IngressLBLimitExceeded";
pub const INGRESS_NO_LOAD_BALANCER_IP: &str = "IngressNoLoadBalancerIP";
pub const INGRESS_OCI_IP_LIMIT_EXCEEDED: &str = "IngressOciIPLimitExceeded";
pub const INGRESS_NO_IP_FOUND: &str = "IngressNoIPFound";
pub const ISTIO_INGRESS_NO_IP: &str = "IstioIngressNoIP";
pub const INGRESS_SHAPE_INVALID: &str = "IngressShapeInvalid";
pub const ISTIO_INGRESS_PRIVATE_SUBNET: &str = "IstioIngressPrivateSubnet";
pub const NGINX_INGRESS_PRIVATE_SUBNET: &str = "NginxIngressPrivateSubnet";
pub const EXTERNAL_DNS_CONFIGURE_ISSUE: &str = "ExternalDNSConfigureIssue";
pub const KEYCLOAK_DATA_MIGRATION_FAILURE: &str = "KeycloakDataMigrationFailure";
pub const BLOCK_STORAGE_LIMIT_EXCEEDED: &str = "BlockStorageLimitExceeded";
pub const INSTALL_FAILURE: &str = "InstallFailure";
pub const COMPONENTS_NOT_READY: &str = "ComponentsNotReady";
pub const COMPONENTS_UNAVAILABLE: &str = "ComponentsUnavailable";
pub const PENDING_PODS: &str = "PendingPods";
pub const POD_PROBLEMS_NOT_REPORTED: &str = "PodProblemsNotReported";
pub const POD_HANGING_ON_DELETION: &str = "PodHangingOnDeletion";
pub const POD_WAITING_ON_READINESS_GATES: &str = "PodWaitingOnReadinessGates";
pub const CERTIFICATE_EXPIRED: &str = "CertificateExpired";
pub const CERTIFICATE_NOT_READY: &str = "CertificateExperiencingIssuesInCluster";
pub const VPO_HANGING_ON_CERTIFICATE: &str = "VPOHangingIssueDueToLongCertificateApproval";
pub const CA_CRT_EXPIRED: &str = "CaCrtExpiredInCluster";
pub const NAMESPACE_TERMINATING: &str = "NamespaceCurrentlyTerminating";
pub const NAMESPACE_TERMINATING_UNDETERMINED: &str = "NamespaceTerminatingUndeterminedDuration";
pub const RANCHER_ISSUES: &str = "RancherIssues";
pub const CLUSTER_API_ISSUES: &str = "ClusterAPIClusterIssues";
pub const INNODB_CLUSTER_NOT_ONLINE: &str = "InnoDBClusterNotOnline";
pub const INNODB_CLUSTER_TERMINATING: &str =
    "InnoDBClusterResourceCurrentlyInTerminatingStateForLongDuration";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownIssue {
    pub issue_type: &'static str,
    pub summary: &'static str,
    pub informational: bool,
    pub impact: u8,
    pub confidence: u8,
}

const fn known(issue_type: &'static str, summary: &'static str, impact: u8, confidence: u8) -> KnownIssue {
    KnownIssue {
        issue_type,
        summary,
        informational: false,
        impact,
        confidence,
    }
}

const fn informational(
    issue_type: &'static str,
    summary: &'static str,
    impact: u8,
    confidence: u8,
) -> KnownIssue {
    KnownIssue {
        issue_type,
        summary,
        informational: true,
        impact,
        confidence,
    }
}

static KNOWN_ISSUES: &[KnownIssue] = &[
    known(
        IMAGE_PULL_BACK_OFF,
        "Failure(s) pulling images have been detected, however a specific root cause was not identified",
        10,
        10,
    ),
    known(
        IMAGE_PULL_RATE_LIMIT,
        "Failure(s) pulling images have been detected due to an image pull rate limit",
        10,
        10,
    ),
    known(
        IMAGE_PULL_NOT_FOUND,
        "Failure(s) pulling images have been detected due to the image not being found",
        10,
        10,
    ),
    known(
        IMAGE_PULL_SERVICE,
        "Failure(s) pulling images have been detected due to the service not being available, the service may be unreachable or may be incorrectly specified",
        10,
        10,
    ),
    known(
        INSUFFICIENT_MEMORY,
        "Failure(s) due to insufficient memory on nodes have been detected",
        10,
        10,
    ),
    known(
        INSUFFICIENT_CPU,
        "Failure(s) due to insufficient CPU on nodes have been detected",
        10,
        10,
    ),
    known(
        INGRESS_INSTALL_FAILURE,
        "Verrazzano install failed while installing the NGINX Ingress Controller, however a specific root cause was not identified",
        10,
        10,
    ),
    known(
        INGRESS_LB_LIMIT_EXCEEDED,
        "Verrazzano install failed while installing the NGINX Ingress Controller, the root cause appears to be an LB limit was exceeded",
        10,
        10,
    ),
    known(
        INGRESS_NO_LOAD_BALANCER_IP,
        "Verrazzano install failed while installing the NGINX Ingress Controller, the root cause appears to be that the load balancer is either missing or doesn't yet have an IP address",
        10,
        10,
    ),
    known(
        INGRESS_OCI_IP_LIMIT_EXCEEDED,
        "Verrazzano install failed while installing the NGINX Ingress Controller, the root cause appears to be an OCI IP non-ephemeral limit was exceeded",
        10,
        10,
    ),
    known(
        INGRESS_NO_IP_FOUND,
        "Verrazzano install failed as no IP was found for the NGINX Ingress Controller service of type LoadBalancer",
        10,
        10,
    ),
    known(
        ISTIO_INGRESS_NO_IP,
        "Verrazzano install failed as no IP was found for the Istio ingress gateway service of type LoadBalancer",
        10,
        10,
    ),
    known(
        INGRESS_SHAPE_INVALID,
        "Verrazzano install failed as the load balancer shape requested for the NGINX Ingress Controller is invalid",
        10,
        10,
    ),
    known(
        ISTIO_INGRESS_PRIVATE_SUBNET,
        "Verrazzano install failed as a public load balancer for the Istio ingress gateway was requested on a private subnet",
        10,
        10,
    ),
    known(
        NGINX_INGRESS_PRIVATE_SUBNET,
        "Verrazzano install failed as a public load balancer for the NGINX Ingress Controller was requested on a private subnet",
        10,
        10,
    ),
    known(
        EXTERNAL_DNS_CONFIGURE_ISSUE,
        "Failure(s) configuring external DNS have been detected, the DNS zone, compartment or credentials may be incorrect",
        10,
        10,
    ),
    known(
        KEYCLOAK_DATA_MIGRATION_FAILURE,
        "Failure(s) migrating Keycloak data to MySQL have been detected",
        10,
        10,
    ),
    known(
        BLOCK_STORAGE_LIMIT_EXCEEDED,
        "Failure(s) creating persistent volumes have been detected, the block volume service limit was exceeded",
        10,
        10,
    ),
    known(
        INSTALL_FAILURE,
        "Verrazzano install failed, however a specific root cause was not identified",
        10,
        10,
    ),
    known(
        COMPONENTS_NOT_READY,
        "Verrazzano install failed, one or more components did not reach Ready state",
        10,
        10,
    ),
    known(
        COMPONENTS_UNAVAILABLE,
        "One or more Verrazzano components are Ready but not available",
        10,
        10,
    ),
    informational(
        PENDING_PODS,
        "Pods in a Pending state were detected. These may come up normally or there may be specific issues preventing them from coming up",
        0,
        1,
    ),
    informational(
        POD_PROBLEMS_NOT_REPORTED,
        "Problem pods were detected, but no issues were detected",
        0,
        10,
    ),
    known(
        POD_HANGING_ON_DELETION,
        "One or more pods have been stuck deleting for longer than expected",
        5,
        10,
    ),
    known(
        POD_WAITING_ON_READINESS_GATES,
        "One or more pods are waiting on readiness gates that have not been satisfied",
        5,
        10,
    ),
    known(
        CERTIFICATE_EXPIRED,
        "One or more certificates in the cluster have expired",
        10,
        10,
    ),
    known(
        CERTIFICATE_NOT_READY,
        "One or more certificates in the cluster are not in a Ready state",
        10,
        8,
    ),
    known(
        VPO_HANGING_ON_CERTIFICATE,
        "The Verrazzano platform operator appears to be waiting on certificates that have since become ready",
        10,
        9,
    ),
    known(
        CA_CRT_EXPIRED,
        "One or more CA certificates in the cluster have expired",
        10,
        10,
    ),
    known(
        NAMESPACE_TERMINATING,
        "One or more namespaces have been terminating for longer than expected",
        5,
        10,
    ),
    known(
        NAMESPACE_TERMINATING_UNDETERMINED,
        "One or more namespaces have been terminating for an undetermined amount of time",
        5,
        7,
    ),
    known(
        RANCHER_ISSUES,
        "One or more Rancher resources are reporting problems",
        10,
        10,
    ),
    known(
        CLUSTER_API_ISSUES,
        "One or more Cluster API resources are reporting problems",
        10,
        10,
    ),
    known(
        INNODB_CLUSTER_NOT_ONLINE,
        "The MySQL InnoDB cluster is not online",
        10,
        10,
    ),
    known(
        INNODB_CLUSTER_TERMINATING,
        "The MySQL InnoDB cluster resource has been terminating for longer than expected",
        10,
        10,
    ),
];

impl KnownIssue {
    pub fn runbook(&self) -> String {
        format!("{RUNBOOK_BASE}/{}", self.issue_type.to_ascii_lowercase())
    }

    pub fn action(&self) -> Action {
        let link = self.runbook();
        Action::new(format!(
            "Consult {link} using supporting details identified in the report"
        ))
        .with_link(link)
    }

    /// Fresh issue for `source` with no supporting data yet.
    pub fn to_issue(&self, source: &str) -> Issue {
        Issue {
            issue_type: self.issue_type.to_string(),
            source: source.to_string(),
            informational: self.informational,
            summary: self.summary.to_string(),
            actions: vec![self.action()],
            supporting_data: Vec::new(),
            confidence: self.confidence,
            impact: self.impact,
        }
    }
}

pub fn all() -> &'static [KnownIssue] {
    KNOWN_ISSUES
}

pub fn lookup(issue_type: &str) -> Option<&'static KnownIssue> {
    KNOWN_ISSUES.iter().find(|k| k.issue_type == issue_type)
}

/// Builds the template issue for `issue_type`.
///
/// # Panics
///
/// Panics with [`ProgrammerError::UnknownIssueType`] when the type is not
/// registered.
pub fn known_issue(issue_type: &str, source: &str) -> Issue {
    match lookup(issue_type) {
        Some(known) => known.to_issue(source),
        None => panic!("{}", ProgrammerError::UnknownIssueType(issue_type.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_template_validates() {
        for known in all() {
            known_issue(known.issue_type, "/snap")
                .validate(Some("/snap"))
                .unwrap_or_else(|err| panic!("{} invalid: {err}", known.issue_type));
        }
    }

    #[test]
    fn issue_types_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for known in all() {
            assert!(seen.insert(known.issue_type), "duplicate {}", known.issue_type);
        }
    }

    #[test]
    #[should_panic(expected = "not a registered known issue type")]
    fn unknown_type_panics() {
        let _ = known_issue("NoSuchIssue", "/snap");
    }

    #[test]
    fn pending_pods_is_informational() {
        let issue = known_issue(PENDING_PODS, "/snap");
        assert!(issue.informational);
        assert_eq!(issue.impact, 0);
        assert_eq!(issue.confidence, 1);
    }

    #[test]
    fn actions_link_to_runbook() {
        let issue = known_issue(IMAGE_PULL_RATE_LIMIT, "/snap");
        assert_eq!(
            issue.actions[0].links,
            vec![format!("{RUNBOOK_BASE}/imagepullratelimit")]
        );
    }
}
