use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::analyzers::{Analyzer, InstallStatus, SERVICES_FILE, SnapshotContext, events};
use crate::core::IssueReporter;
use crate::core::catalog::{
    BLOCK_STORAGE_LIMIT_EXCEEDED, EXTERNAL_DNS_CONFIGURE_ISSUE, INGRESS_INSTALL_FAILURE,
    INGRESS_LB_LIMIT_EXCEEDED, INGRESS_NO_IP_FOUND, INGRESS_NO_LOAD_BALANCER_IP,
    INGRESS_OCI_IP_LIMIT_EXCEEDED, INGRESS_SHAPE_INVALID, ISTIO_INGRESS_NO_IP,
    ISTIO_INGRESS_PRIVATE_SUBNET, NGINX_INGRESS_PRIVATE_SUBNET,
};
use crate::k8s::{Service, ServiceList};
use crate::{loader, search};

pub const NGINX_NAMESPACE: &str = "verrazzano-ingress-nginx";
pub const LEGACY_NGINX_NAMESPACE: &str = "ingress-nginx";
pub const NGINX_CONTROLLER_SERVICE: &str = "ingress-controller-ingress-nginx-controller";
pub const ISTIO_NAMESPACE: &str = "istio-system";
pub const ISTIO_GATEWAY_PREFIX: &str = "istio-ingressgateway";
pub const KEYCLOAK_NAMESPACE: &str = "keycloak";

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("ingress regex")
}

static OCI_IP_LIMIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    re(r"Limit for non-ephemeral regional public IP per tenant of .* has been already reached")
});
static LB_LIMIT_RE: LazyLock<Regex> =
    LazyLock::new(|| re(r"The following service limits were exceeded: lb-"));
static LB_AWAITING_RE: LazyLock<Regex> =
    LazyLock::new(|| re(r"failed to ensure load balancer: awaiting load balancer"));
static INVALID_SHAPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    re(r"Service error:InvalidParameter\. Limits-Service returned 400.*Invalid service/quota load-balancer")
});
static PRIVATE_SUBNET_RE: LazyLock<Regex> =
    LazyLock::new(|| re(r"Private subnet.* is not allowed in a public loadbalancer"));
static NGINX_NO_IP_RE: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)no IP found for service ingress-controller-ingress-nginx-controller")
});
static ISTIO_NO_IP_RE: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)no IP found for service istio-ingressgateway"));
static BLOCK_STORAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)volume.*would exceed the limit|block volume.*limit"));
static EXTERNAL_DNS_LOG_RE: LazyLock<Regex> =
    LazyLock::new(|| re(r"/external-dns-[^/]*/logs\.txt$"));
static EXTERNAL_DNS_ERROR_RE: LazyLock<Regex> =
    LazyLock::new(|| re(r"NotAuthorizedOrNotFound"));
static LOG_FILES_RE: LazyLock<Regex> = LazyLock::new(|| re(r"logs\.txt$"));
static ERROR_LINE_RE: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)\berror\b"));

/// Ordered dispatch from a load balancer failure message to its issue type.
fn classify_load_balancer_failure(message: &str) -> Option<&'static str> {
    if OCI_IP_LIMIT_RE.is_match(message) {
        Some(INGRESS_OCI_IP_LIMIT_EXCEEDED)
    } else if LB_LIMIT_RE.is_match(message) {
        Some(INGRESS_LB_LIMIT_EXCEEDED)
    } else if LB_AWAITING_RE.is_match(message) || NGINX_NO_IP_RE.is_match(message) {
        Some(INGRESS_NO_IP_FOUND)
    } else if INVALID_SHAPE_RE.is_match(message) {
        Some(INGRESS_SHAPE_INVALID)
    } else if PRIVATE_SUBNET_RE.is_match(message) {
        Some(NGINX_INGRESS_PRIVATE_SUBNET)
    } else {
        None
    }
}

/// Explains a failed install through its ingress, DNS and storage
/// dependencies. Does nothing unless the status analyzer found components
/// that did not reach Ready.
pub struct IngressAnalyzer;

impl Analyzer for IngressAnalyzer {
    fn name(&self) -> &'static str {
        "install-failure"
    }

    fn analyze(
        &self,
        ctx: &SnapshotContext<'_>,
        reporter: &mut IssueReporter,
    ) -> anyhow::Result<()> {
        let Some(status) = ctx.install_status() else {
            return Ok(());
        };
        if !status.failed() {
            return Ok(());
        }

        analyze_istio(ctx, reporter, status);
        if let Err(err) = analyze_external_dns(ctx, reporter) {
            log::warn!("skipping external-dns check for {}: {err:#}", ctx.source());
        }
        analyze_block_storage(ctx, reporter);

        let nginx_suspect = status.component_not_ready("ingress-controller")
            || status
                .operator_errors
                .iter()
                .any(|m| classify_load_balancer_failure(m).is_some());
        if nginx_suspect {
            analyze_nginx(ctx, reporter, status)?;
        }
        Ok(())
    }
}

/// Services captured in `namespace`. An unreadable file is logged and
/// treated as empty.
fn load_services(ctx: &SnapshotContext<'_>, namespace: &str) -> Vec<Service> {
    let path = ctx.namespace_file(namespace, SERVICES_FILE);
    match loader::load_list::<ServiceList>(&path) {
        Ok(list) => list.map(|list| list.items).unwrap_or_default(),
        Err(err) => {
            log::warn!("skipping {}: {err}", path.display());
            Vec::new()
        }
    }
}

fn analyze_istio(ctx: &SnapshotContext<'_>, reporter: &mut IssueReporter, status: &InstallStatus) {
    let services_file = ctx
        .namespace_file(ISTIO_NAMESPACE, SERVICES_FILE)
        .display()
        .to_string();
    let gateway_without_ip = load_services(ctx, ISTIO_NAMESPACE)
        .iter()
        .any(|s| s.metadata.name.starts_with(ISTIO_GATEWAY_PREFIX) && !s.has_external_address());
    if gateway_without_ip {
        let errors: Vec<String> = status
            .operator_errors
            .iter()
            .filter(|m| ISTIO_NO_IP_RE.is_match(m))
            .cloned()
            .collect();
        if !errors.is_empty() {
            reporter.add_known_issue_messages_files(
                ISTIO_INGRESS_NO_IP,
                ctx.source(),
                errors,
                vec![services_file.clone()],
            );
        }
    }

    let private: Vec<String> = events::events_matching(ctx, ISTIO_NAMESPACE, &PRIVATE_SUBNET_RE)
        .iter()
        .map(events::describe)
        .collect();
    if !private.is_empty() {
        reporter.add_known_issue_messages_files(
            ISTIO_INGRESS_PRIVATE_SUBNET,
            ctx.source(),
            private,
            vec![ctx
                .namespace_file(ISTIO_NAMESPACE, crate::analyzers::EVENTS_FILE)
                .display()
                .to_string()],
        );
    }
}

fn analyze_external_dns(
    ctx: &SnapshotContext<'_>,
    reporter: &mut IssueReporter,
) -> anyhow::Result<()> {
    let matches = search::find_files_and_search(
        ctx.root(),
        &EXTERNAL_DNS_LOG_RE,
        &EXTERNAL_DNS_ERROR_RE,
        None,
    )?;
    if !matches.is_empty() {
        reporter.add_known_issue_messages_matches(
            EXTERNAL_DNS_CONFIGURE_ISSUE,
            ctx.source(),
            vec!["external-dns was not authorized to manage the configured DNS zone".to_string()],
            matches,
        );
    }
    Ok(())
}

fn analyze_block_storage(ctx: &SnapshotContext<'_>, reporter: &mut IssueReporter) {
    let messages: Vec<String> = events::events_matching(ctx, KEYCLOAK_NAMESPACE, &BLOCK_STORAGE_RE)
        .iter()
        .map(events::describe)
        .collect();
    if !messages.is_empty() {
        reporter.add_known_issue_messages_files(
            BLOCK_STORAGE_LIMIT_EXCEEDED,
            ctx.source(),
            messages,
            vec![ctx
                .namespace_file(KEYCLOAK_NAMESPACE, crate::analyzers::EVENTS_FILE)
                .display()
                .to_string()],
        );
    }
}

fn nginx_namespace(ctx: &SnapshotContext<'_>) -> &'static str {
    if ctx.root().join(NGINX_NAMESPACE).is_dir() {
        NGINX_NAMESPACE
    } else {
        LEGACY_NGINX_NAMESPACE
    }
}

fn analyze_nginx(
    ctx: &SnapshotContext<'_>,
    reporter: &mut IssueReporter,
    status: &InstallStatus,
) -> anyhow::Result<()> {
    let ns = nginx_namespace(ctx);
    let services_file = ctx.namespace_file(ns, SERVICES_FILE).display().to_string();
    let mut related = vec![services_file];
    if let Some(log_file) = &status.operator_log {
        related.push(log_file.display().to_string());
    }

    // Each issue type is raised at most once, however many messages match.
    let mut found: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
    let service_events = events::events_for_object(ctx, ns, "Service", NGINX_CONTROLLER_SERVICE);
    let candidates = status
        .operator_errors
        .iter()
        .cloned()
        .chain(service_events.iter().map(events::describe));
    for message in candidates {
        if let Some(issue_type) = classify_load_balancer_failure(&message) {
            found.entry(issue_type).or_default().push(message);
        }
    }

    if !found.is_empty() {
        for (issue_type, messages) in found {
            reporter.add_known_issue_messages_files(
                issue_type,
                ctx.source(),
                messages,
                related.clone(),
            );
        }
        return Ok(());
    }

    let controller = load_services(ctx, ns)
        .into_iter()
        .find(|s| s.metadata.name == NGINX_CONTROLLER_SERVICE);
    if let Some(svc) = controller {
        if svc.status.load_balancer.ingress.is_empty() {
            reporter.add_known_issue_messages_files(
                INGRESS_NO_LOAD_BALANCER_IP,
                ctx.source(),
                vec![format!(
                    "The NGINX Ingress Controller service {ns}/{} has no load balancer ingress address",
                    svc.metadata.name
                )],
                related,
            );
            return Ok(());
        }
    }

    let matches =
        search::find_files_and_search(&ctx.root().join(ns), &LOG_FILES_RE, &ERROR_LINE_RE, None)?;
    reporter.add_known_issue_messages_matches(
        INGRESS_INSTALL_FAILURE,
        ctx.source(),
        vec![format!(
            "The NGINX Ingress Controller in namespace {ns} did not install, no specific cause was identified"
        )],
        matches,
    );
    Ok(())
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
            "vzanalyze-ingress-test-{}-{seq}/cluster-snapshot",
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

    fn failed_status(errors: &[&str]) -> InstallStatus {
        InstallStatus {
            not_ready: vec!["ingress-controller".to_string()],
            operator_errors: errors.iter().map(|s| s.to_string()).collect(),
            ..InstallStatus::default()
        }
    }

    #[test]
    fn classification_order() {
        assert_eq!(
            classify_load_balancer_failure(
                "Limit for non-ephemeral regional public IP per tenant of 50 has been already reached"
            ),
            Some(INGRESS_OCI_IP_LIMIT_EXCEEDED)
        );
        assert_eq!(
            classify_load_balancer_failure("The following service limits were exceeded: lb-100mbps-count"),
            Some(INGRESS_LB_LIMIT_EXCEEDED)
        );
        assert_eq!(
            classify_load_balancer_failure("failed to ensure load balancer: awaiting load balancer: ..."),
            Some(INGRESS_NO_IP_FOUND)
        );
        assert_eq!(
            classify_load_balancer_failure(
                "Private subnet with id ocid1.subnet is not allowed in a public loadbalancer"
            ),
            Some(NGINX_INGRESS_PRIVATE_SUBNET)
        );
        assert_eq!(classify_load_balancer_failure("all good"), None);
    }

    #[test]
    fn no_op_without_failed_install() {
        let root = make_root();
        let cache = SnapshotCache::new();
        let ctx = SnapshotContext::new(&root, &cache);
        let mut reporter = IssueReporter::new();
        IngressAnalyzer.analyze(&ctx, &mut reporter).expect("analyze");
        ctx.record_install_status(InstallStatus::default());
        IngressAnalyzer.analyze(&ctx, &mut reporter).expect("analyze");
        assert!(reporter.is_empty());
        let _ = std::fs::remove_dir_all(root.parent().expect("parent"));
    }

    #[test]
    fn service_event_selects_lb_limit_once() {
        let root = make_root();
        write(
            &root.join(NGINX_NAMESPACE).join("events.json"),
            r#"{"items":[
              {"involvedObject":{"kind":"Service","name":"ingress-controller-ingress-nginx-controller"},"reason":"SyncLoadBalancerFailed",
               "message":"Error syncing load balancer: The following service limits were exceeded: lb-100mbps-count"},
              {"involvedObject":{"kind":"Service","name":"ingress-controller-ingress-nginx-controller"},"reason":"SyncLoadBalancerFailed",
               "message":"Error syncing load balancer: The following service limits were exceeded: lb-100mbps-count again"}
            ]}"#,
        );
        let cache = SnapshotCache::new();
        let ctx = SnapshotContext::new(&root, &cache);
        ctx.record_install_status(failed_status(&[]));
        let mut reporter = IssueReporter::new();
        IngressAnalyzer.analyze(&ctx, &mut reporter).expect("analyze");
        assert_eq!(reporter.len(), 1);
        assert!(reporter.contains(INGRESS_LB_LIMIT_EXCEEDED));
        let _ = std::fs::remove_dir_all(root.parent().expect("parent"));
    }

    #[test]
    fn controller_without_address_means_no_load_balancer_ip() {
        let root = make_root();
        write(
            &root.join(NGINX_NAMESPACE).join(SERVICES_FILE),
            r#"{"items":[{"metadata":{"name":"ingress-controller-ingress-nginx-controller"},
                "spec":{"type":"LoadBalancer"},"status":{"loadBalancer":{}}}]}"#,
        );
        let cache = SnapshotCache::new();
        let ctx = SnapshotContext::new(&root, &cache);
        ctx.record_install_status(failed_status(&[]));
        let mut reporter = IssueReporter::new();
        IngressAnalyzer.analyze(&ctx, &mut reporter).expect("analyze");
        assert!(reporter.contains(INGRESS_NO_LOAD_BALANCER_IP));
        let _ = std::fs::remove_dir_all(root.parent().expect("parent"));
    }

    #[test]
    fn istio_gateway_without_ip_uses_operator_error() {
        let root = make_root();
        write(
            &root.join(ISTIO_NAMESPACE).join(SERVICES_FILE),
            r#"{"items":[{"metadata":{"name":"istio-ingressgateway"},"spec":{"type":"LoadBalancer"}}]}"#,
        );
        let cache = SnapshotCache::new();
        let ctx = SnapshotContext::new(&root, &cache);
        ctx.record_install_status(InstallStatus {
            not_ready: vec!["istio".to_string()],
            operator_errors: vec![
                "Failed getting DNS suffix: No IP found for service istio-ingressgateway with type LoadBalancer"
                    .to_string(),
            ],
            ..InstallStatus::default()
        });
        let mut reporter = IssueReporter::new();
        IngressAnalyzer.analyze(&ctx, &mut reporter).expect("analyze");
        assert!(reporter.contains(ISTIO_INGRESS_NO_IP));
        assert!(!reporter.contains(INGRESS_INSTALL_FAILURE));
        let _ = std::fs::remove_dir_all(root.parent().expect("parent"));
    }

    #[test]
    fn malformed_istio_services_do_not_hide_nginx_checks() {
        let root = make_root();
        write(&root.join(ISTIO_NAMESPACE).join(SERVICES_FILE), "{truncated");
        write(&root.join(ISTIO_NAMESPACE).join("events.json"), "{truncated");
        write(
            &root.join(NGINX_NAMESPACE).join(SERVICES_FILE),
            r#"{"items":[{"metadata":{"name":"ingress-controller-ingress-nginx-controller"},
                "spec":{"type":"LoadBalancer"},"status":{"loadBalancer":{}}}]}"#,
        );
        let cache = SnapshotCache::new();
        let ctx = SnapshotContext::new(&root, &cache);
        ctx.record_install_status(failed_status(&[]));
        let mut reporter = IssueReporter::new();
        IngressAnalyzer.analyze(&ctx, &mut reporter).expect("analyze");
        assert!(reporter.contains(INGRESS_NO_LOAD_BALANCER_IP));
        assert!(!reporter.contains(ISTIO_INGRESS_NO_IP));
        let _ = std::fs::remove_dir_all(root.parent().expect("parent"));
    }
}
