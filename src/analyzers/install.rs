use std::sync::LazyLock;

use anyhow::Context;
use regex::Regex;

use crate::analyzers::oplog::{self, LogMessage};
use crate::analyzers::{Analyzer, InstallStatus, SnapshotContext, Stage, events};
use crate::core::IssueReporter;
use crate::core::catalog::{
    COMPONENTS_NOT_READY, COMPONENTS_UNAVAILABLE, INSTALL_FAILURE,
    KEYCLOAK_DATA_MIGRATION_FAILURE,
};
use crate::k8s::{Verrazzano, VerrazzanoResources};
use crate::{loader, scan};

pub const VERRAZZANO_RESOURCES_FILE: &str = "verrazzano-resources.json";

static DB_LOAD_JOB_FAILED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"DB load job has failed").expect("db load regex"));
static DB_MIGRATED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Keycloak DB successfully migrated").expect("db migrated regex")
});

/// Namespaces whose warning events are worth quoting when a component is not
/// ready and its own log is silent.
const COMPONENT_NAMESPACES: &[(&str, &str)] = &[
    ("cert-manager", "cert-manager"),
    ("external-dns", "verrazzano-system"),
    ("ingress-controller", "verrazzano-ingress-nginx"),
    ("istio", "istio-system"),
    ("keycloak", "keycloak"),
    ("mysql", "keycloak"),
    ("mysql-operator", "mysql-operator"),
    ("rancher", "cattle-system"),
    ("verrazzano", "verrazzano-system"),
    ("verrazzano-monitoring-operator", "verrazzano-monitoring"),
];

const MAX_EVENTS_PER_NAMESPACE: usize = 5;

/// Reads the Verrazzano custom resource and the platform operator log.
pub struct VerrazzanoStatusAnalyzer;

impl Analyzer for VerrazzanoStatusAnalyzer {
    fn name(&self) -> &'static str {
        "verrazzano-status"
    }

    fn stage(&self) -> Stage {
        Stage::InstallStatus
    }

    fn analyze(
        &self,
        ctx: &SnapshotContext<'_>,
        reporter: &mut IssueReporter,
    ) -> anyhow::Result<()> {
        let path = scan::path_in_root(ctx.root(), VERRAZZANO_RESOURCES_FILE);
        let Some(resources) = loader::load_list::<VerrazzanoResources>(&path)
            .with_context(|| format!("loading {}", path.display()))?
        else {
            log::debug!("no Verrazzano resource captured in {}", ctx.source());
            return Ok(());
        };

        let operator_log = oplog::find_operator_log(ctx.root())?;
        let messages = match &operator_log {
            Some(log_file) => oplog::read_log_messages(log_file).unwrap_or_else(|err| {
                log::warn!("skipping operator log {}: {err}", log_file.display());
                Vec::new()
            }),
            None => Vec::new(),
        };

        let mut files = vec![path.display().to_string()];
        if let Some(log_file) = &operator_log {
            files.push(log_file.display().to_string());
        }

        let mut status = InstallStatus {
            operator_errors: oplog::filter_by_level_component(&messages, "error", "")
                .into_iter()
                .map(|m| m.message.clone())
                .collect(),
            operator_log: operator_log.clone(),
            ..InstallStatus::default()
        };

        for vz in resources.into_items() {
            let not_ready = components_where(&vz, |c| !c.is_ready() && !c.is_disabled());
            let unavailable = components_where(&vz, |c| c.is_ready() && c.is_unavailable());

            if !not_ready.is_empty() {
                report_components_not_ready(ctx, reporter, &not_ready, &messages, &files);
                check_keycloak_migration(ctx, reporter, &not_ready, &messages, &files);
            } else if vz.status.state == "Failed" {
                let mut detail = vec![format!(
                    "Verrazzano resource {} is in state Failed",
                    vz.metadata.name
                )];
                detail.extend(status.operator_errors.iter().rev().take(5).rev().cloned());
                reporter.add_known_issue_messages_files(
                    INSTALL_FAILURE,
                    ctx.source(),
                    detail,
                    files.clone(),
                );
            }

            if !unavailable.is_empty() {
                let mut detail = vec![
                    "One or more components listed below are Ready but not available:".to_string(),
                ];
                detail.extend(unavailable.iter().map(|c| format!("\t {c}")));
                reporter.add_known_issue_messages_files(
                    COMPONENTS_UNAVAILABLE,
                    ctx.source(),
                    detail,
                    files.clone(),
                );
            }

            status.not_ready.extend(not_ready);
            status.unavailable.extend(unavailable);
        }

        log::info!(
            "{}: {} component(s) not ready, {} unavailable",
            ctx.source(),
            status.not_ready.len(),
            status.unavailable.len()
        );
        ctx.record_install_status(status);
        Ok(())
    }
}

fn components_where(
    vz: &Verrazzano,
    keep: impl Fn(&crate::k8s::ComponentStatus) -> bool,
) -> Vec<String> {
    vz.status
        .components
        .iter()
        .filter(|(_, c)| keep(c))
        .map(|(key, c)| {
            if c.name.is_empty() {
                key.clone()
            } else {
                c.name.clone()
            }
        })
        .collect()
}

fn report_components_not_ready(
    ctx: &SnapshotContext<'_>,
    reporter: &mut IssueReporter,
    not_ready: &[String],
    messages: &[LogMessage],
    files: &[String],
) {
    let mut detail =
        vec!["One or more components listed below did not reach Ready state:".to_string()];
    let mut silent = Vec::new();
    for component in not_ready {
        match oplog::filter_by_level_component(messages, "error", component).last() {
            Some(last) => detail.push(format!("\t {component}: {}", last.message)),
            None => silent.push(component.as_str()),
        }
    }

    if !silent.is_empty() {
        detail.push(format!(
            "\t Component specific error(s) not found in the Verrazzano install log for - {}",
            silent.join(", ")
        ));
        for component in &silent {
            let Some((_, ns)) = COMPONENT_NAMESPACES.iter().find(|(c, _)| c == component) else {
                continue;
            };
            for ev in events::warning_events(ctx, ns)
                .iter()
                .take(MAX_EVENTS_PER_NAMESPACE)
            {
                detail.push(format!("\t {}", events::describe(ev)));
            }
        }
    }

    reporter.add_known_issue_messages_files(
        COMPONENTS_NOT_READY,
        ctx.source(),
        detail,
        files.to_vec(),
    );
}

fn check_keycloak_migration(
    ctx: &SnapshotContext<'_>,
    reporter: &mut IssueReporter,
    not_ready: &[String],
    messages: &[LogMessage],
    files: &[String],
) {
    if !not_ready.iter().any(|c| c == "keycloak" || c == "mysql") {
        return;
    }
    let migrated = messages.iter().any(|m| DB_MIGRATED_RE.is_match(&m.message));
    if migrated {
        return;
    }
    let failures: Vec<String> = messages
        .iter()
        .filter(|m| DB_LOAD_JOB_FAILED_RE.is_match(&m.message))
        .map(|m| m.message.clone())
        .collect();
    if failures.is_empty() {
        return;
    }
    reporter.add_known_issue_messages_files(
        KEYCLOAK_DATA_MIGRATION_FAILURE,
        ctx.source(),
        failures,
        files.to_vec(),
    );
}
