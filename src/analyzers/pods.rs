use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::Context;
use regex::Regex;

use crate::analyzers::{Analyzer, SnapshotContext, elapsed_at_capture, events, minutes_and_seconds};
use crate::core::catalog::{
    IMAGE_PULL_BACK_OFF, IMAGE_PULL_NOT_FOUND, IMAGE_PULL_RATE_LIMIT, IMAGE_PULL_SERVICE,
    INSUFFICIENT_CPU, INSUFFICIENT_MEMORY, PENDING_PODS, POD_HANGING_ON_DELETION,
    POD_PROBLEMS_NOT_REPORTED, POD_WAITING_ON_READINESS_GATES,
};
use crate::core::{IssueReporter, SupportData};
use crate::k8s::{ContainerStatus, Pod};
use crate::{scan, search};

static POD_FILES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"pods\.json$").expect("pod files regex"));
static RATE_LIMIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)pull rate limit").expect("rate limit regex"));
static SERVICE_UNAVAILABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Service Unavailable").expect("service regex"));
static IMAGE_NOT_FOUND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"name unknown|not found").expect("not found regex"));
static WIDE_ERROR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\berror\b|\bfailed\b|\bfailure\b").expect("error regex"));

pub const DELETION_THRESHOLD: time::Duration = time::Duration::minutes(10);

const HELM_OPERATION_PREFIX: &str = "helm-operation-";
const RANCHER_NAMESPACE: &str = "cattle-system";

pub struct PodsAnalyzer;

impl Analyzer for PodsAnalyzer {
    fn name(&self) -> &'static str {
        "pods"
    }

    fn analyze(
        &self,
        ctx: &SnapshotContext<'_>,
        reporter: &mut IssueReporter,
    ) -> anyhow::Result<()> {
        let files = scan::find_matching_files(ctx.root(), &POD_FILES_RE)
            .with_context(|| format!("locating pod lists under {}", ctx.source()))?;
        for file in files {
            if let Err(err) = analyze_pod_file(ctx, reporter, &file) {
                log::warn!("skipping {}: {err:#}", file.display());
            }
        }
        Ok(())
    }
}

/// A pod needs attention unless it is running or finished and every container
/// is ready or completed.
pub fn is_pod_problematic(pod: &Pod) -> bool {
    if pod.status.phase != "Running" && pod.status.phase != "Succeeded" {
        return true;
    }
    pod.status
        .init_container_statuses
        .iter()
        .chain(&pod.status.container_statuses)
        .any(container_has_problem)
}

fn container_has_problem(status: &ContainerStatus) -> bool {
    if status.state.waiting.is_some() {
        return true;
    }
    if let Some(terminated) = &status.state.terminated {
        if terminated.reason != "Completed" {
            return true;
        }
    }
    status.state.running.is_some() && !status.ready
}

fn analyze_pod_file(
    ctx: &SnapshotContext<'_>,
    reporter: &mut IssueReporter,
    file: &Path,
) -> anyhow::Result<()> {
    let Some(pods) = ctx.cache().pod_list(file)? else {
        return Ok(());
    };
    let file_name = file.display().to_string();

    let mut found = 0;
    let mut problematic = Vec::new();
    for pod in &pods.items {
        found += deletion_issues(ctx, reporter, pod, &file_name);
        found += readiness_gate_issues(ctx, reporter, pod, &file_name);
        if !is_pod_problematic(pod) {
            continue;
        }
        log::debug!(
            "problem pod {}/{}",
            pod.metadata.namespace,
            pod.metadata.name
        );
        found += image_pull_issues(ctx, reporter, pod, &file_name);
        found += resource_shortage_issues(ctx, reporter, pod, &file_name);
        problematic.push(pod);
    }

    if found == 0 && !problematic.is_empty() {
        report_problem_pods_no_issues(ctx, reporter, &problematic, &file_name);
    }
    Ok(())
}

fn classify_pull_failure(message: &str) -> Option<&'static str> {
    if RATE_LIMIT_RE.is_match(message) {
        Some(IMAGE_PULL_RATE_LIMIT)
    } else if SERVICE_UNAVAILABLE_RE.is_match(message) {
        Some(IMAGE_PULL_SERVICE)
    } else if IMAGE_NOT_FOUND_RE.is_match(message) {
        Some(IMAGE_PULL_NOT_FOUND)
    } else {
        None
    }
}

/// Drills into containers stuck in `ImagePullBackOff`, classifying the cause
/// from the pod's `Failed` events. Each category is raised at most once per
/// pod.
fn image_pull_issues(
    ctx: &SnapshotContext<'_>,
    reporter: &mut IssueReporter,
    pod: &Pod,
    file: &str,
) -> usize {
    let ns = &pod.metadata.namespace;
    let name = &pod.metadata.name;
    let mut categories: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
    let mut pod_events = None;

    let containers = pod
        .status
        .init_container_statuses
        .iter()
        .map(|s| ("InitContainer", s))
        .chain(
            pod.status
                .container_statuses
                .iter()
                .map(|s| ("Container", s)),
        );
    for (kind, status) in containers {
        let Some(waiting) = &status.state.waiting else {
            continue;
        };
        if waiting.reason != "ImagePullBackOff" {
            continue;
        }
        let base = format!(
            "Namespace {ns}, Pod {name}, {kind} {}, Message {}",
            status.name, waiting.message
        );

        if pod_events.is_none() {
            pod_events = Some(events::events_for_object(ctx, ns, "Pod", name));
        }
        let mut classified = false;
        for ev in pod_events.iter().flatten() {
            if ev.reason != "Failed" {
                continue;
            }
            if !status.image.is_empty() && !ev.message.contains(&status.image) {
                continue;
            }
            if let Some(issue_type) = classify_pull_failure(&ev.message) {
                let messages = categories.entry(issue_type).or_default();
                messages.push(base.clone());
                messages.push(ev.message.clone());
                classified = true;
            }
        }
        if !classified {
            categories.entry(IMAGE_PULL_BACK_OFF).or_default().push(base);
        }
    }

    let count = categories.len();
    for (issue_type, messages) in categories {
        reporter.add_known_issue_messages_files(
            issue_type,
            ctx.source(),
            messages,
            vec![file.to_string()],
        );
    }
    count
}

fn resource_shortage_issues(
    ctx: &SnapshotContext<'_>,
    reporter: &mut IssueReporter,
    pod: &Pod,
    file: &str,
) -> usize {
    let mut count = 0;
    for (needle, issue_type) in [
        ("Insufficient memory", INSUFFICIENT_MEMORY),
        ("Insufficient cpu", INSUFFICIENT_CPU),
    ] {
        let messages: Vec<String> = pod
            .status
            .conditions
            .iter()
            .filter(|c| c.message.contains(needle))
            .map(|c| {
                format!(
                    "Namespace {}, Pod {}, Status {}, Reason {}, Message {}",
                    pod.metadata.namespace, pod.metadata.name, c.status, c.reason, c.message
                )
            })
            .collect();
        if messages.is_empty() {
            continue;
        }
        reporter.add_known_issue_messages_files(
            issue_type,
            ctx.source(),
            messages,
            vec![file.to_string()],
        );
        count += 1;
    }
    count
}

fn deletion_issues(
    ctx: &SnapshotContext<'_>,
    reporter: &mut IssueReporter,
    pod: &Pod,
    file: &str,
) -> usize {
    let Some(elapsed) = elapsed_at_capture(ctx, pod.metadata.deletion_time()) else {
        return 0;
    };
    if elapsed < DELETION_THRESHOLD {
        return 0;
    }
    reporter.add_known_issue_messages_files(
        POD_HANGING_ON_DELETION,
        ctx.source(),
        vec![format!(
            "The pod {} in namespace {} has spent {} deleting",
            pod.metadata.name,
            pod.metadata.namespace,
            minutes_and_seconds(elapsed)
        )],
        vec![file.to_string()],
    );
    1
}

fn readiness_gate_issues(
    ctx: &SnapshotContext<'_>,
    reporter: &mut IssueReporter,
    pod: &Pod,
    file: &str,
) -> usize {
    let pending: Vec<&str> = pod
        .spec
        .readiness_gates
        .iter()
        .map(|g| g.condition_type.as_str())
        .filter(|gate| {
            !pod.status
                .conditions
                .iter()
                .any(|c| c.condition_type == *gate && c.status == "True")
        })
        .collect();
    if pending.is_empty() {
        return 0;
    }
    reporter.add_known_issue_messages_files(
        POD_WAITING_ON_READINESS_GATES,
        ctx.source(),
        vec![format!(
            "Namespace {}, Pod {} is waiting on readiness gate(s): {}",
            pod.metadata.namespace,
            pod.metadata.name,
            pending.join(", ")
        )],
        vec![file.to_string()],
    );
    1
}

fn is_helm_operation_pod(pod: &Pod) -> bool {
    pod.metadata.namespace == RANCHER_NAMESPACE
        && pod.metadata.name.starts_with(HELM_OPERATION_PREFIX)
}

/// Problem pods with no specific issue still get reported, as pending pods
/// when every one of them is pending.
fn report_problem_pods_no_issues(
    ctx: &SnapshotContext<'_>,
    reporter: &mut IssueReporter,
    problematic: &[&Pod],
    file: &str,
) {
    // Helm operation pods only matter when Rancher itself is unhealthy.
    let rancher_unhealthy = problematic
        .iter()
        .any(|p| p.metadata.namespace == RANCHER_NAMESPACE && !is_helm_operation_pod(p));
    let considered: Vec<&Pod> = problematic
        .iter()
        .copied()
        .filter(|p| rancher_unhealthy || !is_helm_operation_pod(p))
        .collect();
    if considered.is_empty() {
        return;
    }

    let mut messages = Vec::new();
    let mut matches = Vec::new();
    let mut pending = 0;
    for pod in &considered {
        if pod.status.phase == "Pending" {
            pending += 1;
        }
        messages.push(format!(
            "Namespace {}, Pod {}, Phase {}, Reason {}, Message {}",
            pod.metadata.namespace,
            pod.metadata.name,
            pod.status.phase,
            pod.status.reason,
            pod.status.message
        ));
        for c in pod.status.conditions.iter().filter(|c| c.status != "True") {
            messages.push(format!(
                "\t Condition {}, Status {}, Reason {}, Message {}",
                c.condition_type, c.status, c.reason, c.message
            ));
        }

        let log = scan::pod_log_path(ctx.root(), &pod.metadata.namespace, &pod.metadata.name);
        if log.is_file() {
            match search::search_file(&log, &WIDE_ERROR_RE, None) {
                Ok(found) => matches.extend(found),
                Err(err) => log::warn!("searching {}: {err}", log.display()),
            }
        }
    }

    let issue_type = if pending == considered.len() {
        PENDING_PODS
    } else {
        POD_PROBLEMS_NOT_REPORTED
    };
    reporter.add_known_issue(
        issue_type,
        ctx.source(),
        SupportData {
            messages,
            related_files: vec![file.to_string()],
            text_matches: matches,
            ..SupportData::default()
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ReportStore;
    use crate::loader::SnapshotCache;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn pod(json: &str) -> Pod {
        serde_json::from_str(json).expect("pod json")
    }

    fn make_root() -> PathBuf {
        static SEQ: AtomicU64 = AtomicU64::new(0);
        let seq = SEQ.fetch_add(1, Ordering::Relaxed);
        let root = std::env::temp_dir().join(format!(
            "vzanalyze-pods-test-{}-{seq}/cluster-snapshot",
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

    fn run(root: &Path) -> Vec<crate::core::Issue> {
        let cache = SnapshotCache::new();
        let ctx = SnapshotContext::new(root, &cache);
        let mut reporter = IssueReporter::new();
        PodsAnalyzer.analyze(&ctx, &mut reporter).expect("analyze");
        let store = ReportStore::new();
        reporter.contribute(&store, ctx.source()).expect("contribute");
        store.issues(ctx.source())
    }

    #[test]
    fn running_ready_pod_is_fine() {
        let p = pod(r#"{"status":{"phase":"Running","containerStatuses":[
            {"name":"c","ready":true,"state":{"running":{}}}]}}"#);
        assert!(!is_pod_problematic(&p));
    }

    #[test]
    fn problem_predicate_cases() {
        assert!(is_pod_problematic(&pod(r#"{"status":{"phase":"Pending"}}"#)));
        assert!(is_pod_problematic(&pod(
            r#"{"status":{"phase":"Running","containerStatuses":[
                {"name":"c","ready":false,"state":{"running":{}}}]}}"#
        )));
        assert!(is_pod_problematic(&pod(
            r#"{"status":{"phase":"Running","containerStatuses":[
                {"name":"c","state":{"terminated":{"reason":"Error"}}}]}}"#
        )));
        assert!(!is_pod_problematic(&pod(
            r#"{"status":{"phase":"Succeeded","initContainerStatuses":[
                {"name":"i","state":{"terminated":{"reason":"Completed"}}}]}}"#
        )));
    }

    #[test]
    fn running_pod_with_waiting_container_is_problematic() {
        assert!(is_pod_problematic(&pod(
            r#"{"status":{"phase":"Running","containerStatuses":[
                {"name":"c","ready":false,"state":{"waiting":{"reason":"CrashLoopBackOff"}}}]}}"#
        )));
        assert!(!is_pod_problematic(&pod(
            r#"{"status":{"phase":"Running","containerStatuses":[
                {"name":"a","ready":true,"state":{"running":{}}},
                {"name":"b","ready":true,"state":{"running":{}}}]}}"#
        )));
    }

    #[test]
    fn classifies_pull_failures_in_priority_order() {
        assert_eq!(
            classify_pull_failure("toomanyrequests: You have reached your pull rate limit"),
            Some(IMAGE_PULL_RATE_LIMIT)
        );
        assert_eq!(
            classify_pull_failure("503 Service Unavailable, manifest not found"),
            Some(IMAGE_PULL_SERVICE)
        );
        assert_eq!(
            classify_pull_failure("manifest unknown: name unknown"),
            Some(IMAGE_PULL_NOT_FOUND)
        );
        assert_eq!(classify_pull_failure("connection reset"), None);
    }

    #[test]
    fn rate_limited_init_container_is_one_issue() {
        let root = make_root();
        write(
            &root.join("ns1/pods.json"),
            r#"{"items":[{"metadata":{"name":"app-0","namespace":"ns1"},
                "status":{"phase":"Pending","initContainerStatuses":[
                  {"name":"init","image":"docker.io/busybox:1","state":{"waiting":{"reason":"ImagePullBackOff","message":"Back-off pulling image"}}}
                ]}}]}"#,
        );
        write(
            &root.join("ns1/events.json"),
            r#"{"items":[
                {"involvedObject":{"kind":"Pod","name":"app-0","namespace":"ns1"},"reason":"Failed",
                 "message":"Failed to pull image \"docker.io/busybox:1\": toomanyrequests: You have reached your pull rate limit."},
                {"involvedObject":{"kind":"Pod","name":"app-0","namespace":"ns1"},"reason":"Failed",
                 "message":"Failed to pull image \"docker.io/busybox:1\": too many requests, pull rate limit"}
            ]}"#,
        );

        let issues = run(&root);
        assert_eq!(issues.len(), 1, "{issues:?}");
        assert_eq!(issues[0].issue_type, IMAGE_PULL_RATE_LIMIT);
        assert_eq!(issues[0].supporting_data.len(), 1);
        let data = &issues[0].supporting_data[0];
        assert_eq!(
            data.related_files,
            vec![root.join("ns1/pods.json").display().to_string()]
        );
        assert!(data.messages[0].contains("InitContainer init"));

        let _ = std::fs::remove_dir_all(root.parent().expect("parent"));
    }

    #[test]
    fn malformed_events_keep_pod_findings() {
        let root = make_root();
        write(
            &root.join("ns1/pods.json"),
            r#"{"items":[{"metadata":{"name":"app-0","namespace":"ns1"},
                "status":{"phase":"Pending","containerStatuses":[
                  {"name":"c","image":"img:1","state":{"waiting":{"reason":"ImagePullBackOff"}}}
                ]}}]}"#,
        );
        write(&root.join("ns1/events.json"), "{truncated");
        let issues = run(&root);
        assert_eq!(issues.len(), 1, "{issues:?}");
        assert_eq!(issues[0].issue_type, IMAGE_PULL_BACK_OFF);
        let _ = std::fs::remove_dir_all(root.parent().expect("parent"));
    }

    #[test]
    fn unexplained_pull_failure_falls_back_to_backoff() {
        let root = make_root();
        write(
            &root.join("ns1/pods.json"),
            r#"{"items":[{"metadata":{"name":"app-0","namespace":"ns1"},
                "status":{"phase":"Pending","containerStatuses":[
                  {"name":"c","image":"img:1","state":{"waiting":{"reason":"ImagePullBackOff"}}}
                ]}}]}"#,
        );
        let issues = run(&root);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].issue_type, IMAGE_PULL_BACK_OFF);
        let _ = std::fs::remove_dir_all(root.parent().expect("parent"));
    }

    #[test]
    fn pending_pods_without_cause_are_informational() {
        let root = make_root();
        write(
            &root.join("ns1/pods.json"),
            r#"{"items":[{"metadata":{"name":"p","namespace":"ns1"},
                "status":{"phase":"Pending","conditions":[
                  {"type":"PodScheduled","status":"False","reason":"Unschedulable","message":"0/3 nodes available"}]}}]}"#,
        );
        write(&root.join("ns1/p/logs.txt"), "starting\nerror: cannot bind\n");

        let issues = run(&root);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].issue_type, PENDING_PODS);
        let data = &issues[0].supporting_data[0];
        assert_eq!(data.text_matches.len(), 1);
        assert!(data.messages.iter().any(|m| m.contains("PodScheduled")));
        let _ = std::fs::remove_dir_all(root.parent().expect("parent"));
    }

    #[test]
    fn insufficient_memory_is_detected() {
        let root = make_root();
        write(
            &root.join("ns1/pods.json"),
            r#"{"items":[{"metadata":{"name":"p","namespace":"ns1"},
                "status":{"phase":"Pending","conditions":[
                  {"type":"PodScheduled","status":"False","message":"0/1 nodes are available: 1 Insufficient memory."}]}}]}"#,
        );
        let issues = run(&root);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].issue_type, INSUFFICIENT_MEMORY);
        let _ = std::fs::remove_dir_all(root.parent().expect("parent"));
    }

    #[test]
    fn pod_stuck_deleting_is_reported() {
        let root = make_root();
        write(
            &root.join("metadata.json"),
            r#"{"time":"2023-05-01T10:12:05Z"}"#,
        );
        write(
            &root.join("ns1/pods.json"),
            r#"{"items":[{"metadata":{"name":"p","namespace":"ns1","deletionTimestamp":"2023-05-01T10:00:00Z"},
                "status":{"phase":"Running","containerStatuses":[{"name":"c","ready":true,"state":{"running":{}}}]}}]}"#,
        );
        let issues = run(&root);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].issue_type, POD_HANGING_ON_DELETION);
        assert!(
            issues[0].supporting_data[0].messages[0].contains("12 minutes and 5 seconds"),
            "{:?}",
            issues[0].supporting_data
        );
        let _ = std::fs::remove_dir_all(root.parent().expect("parent"));
    }

    #[test]
    fn helm_operation_pods_alone_are_not_reported() {
        let root = make_root();
        write(
            &root.join("cattle-system/pods.json"),
            r#"{"items":[{"metadata":{"name":"helm-operation-abcde","namespace":"cattle-system"},
                "status":{"phase":"Failed"}}]}"#,
        );
        assert!(run(&root).is_empty());
        let _ = std::fs::remove_dir_all(root.parent().expect("parent"));
    }
}
