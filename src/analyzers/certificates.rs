use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::analyzers::{Analyzer, SnapshotContext, oplog};
use crate::core::IssueReporter;
use crate::core::catalog::{
    CA_CRT_EXPIRED, CERTIFICATE_EXPIRED, CERTIFICATE_NOT_READY, VPO_HANGING_ON_CERTIFICATE,
};
use crate::k8s::{CaCrtInfo, Certificate, CertificateList};
use crate::loader;

pub const CERTIFICATES_FILE: &str = "certificates.json";
pub const CA_CRT_INFO_FILE: &str = "caCrtInfo.json";

/// Number of trailing operator log lines inspected for pending certificates.
pub const OPERATOR_LOG_TAIL: usize = 10;

const PENDING_CERT_MARKER: &str = "Issuing certificate as Secret does not exist";

static PENDING_CERT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Certificate (?P<namespace>[^/\s]+)/(?P<name>[^\s:]+)")
        .expect("pending certificate regex")
});

pub struct CertificatesAnalyzer;

#[derive(Default)]
struct Findings {
    messages: Vec<String>,
    files: Vec<String>,
}

impl Findings {
    fn push(&mut self, message: String, file: &Path) {
        self.messages.push(message);
        self.files.push(file.display().to_string());
    }

    fn report(self, reporter: &mut IssueReporter, issue_type: &str, source: &str) {
        if !self.messages.is_empty() {
            reporter.add_known_issue_messages_files(issue_type, source, self.messages, self.files);
        }
    }
}

impl Analyzer for CertificatesAnalyzer {
    fn name(&self) -> &'static str {
        "certificates"
    }

    fn analyze(
        &self,
        ctx: &SnapshotContext<'_>,
        reporter: &mut IssueReporter,
    ) -> anyhow::Result<()> {
        let pending = pending_certificates(ctx)?;
        let capture = ctx.capture_time();

        let mut found = CertificateFindings::default();

        for ns in ctx.namespaces()? {
            let path = ctx.namespace_file(&ns, CERTIFICATES_FILE);
            match loader::load_list::<CertificateList>(&path) {
                Ok(Some(list)) => {
                    for cert in &list.items {
                        found.classify(cert, &ns, capture, &pending, &path);
                    }
                }
                Ok(None) => {}
                Err(err) => log::warn!("skipping {}: {err}", path.display()),
            }

            let ca_path = ctx.namespace_file(&ns, CA_CRT_INFO_FILE);
            match loader::load_list::<Vec<CaCrtInfo>>(&ca_path) {
                Ok(Some(infos)) => {
                    for info in infos.iter().filter(|i| i.expired) {
                        found.ca_expired.push(
                            format!(
                                "The CA certificate in secret {} in namespace {ns} has expired",
                                info.name
                            ),
                            &ca_path,
                        );
                    }
                }
                Ok(None) => {}
                Err(err) => log::warn!("skipping {}: {err}", ca_path.display()),
            }
        }

        found.expired.report(reporter, CERTIFICATE_EXPIRED, ctx.source());
        found.not_ready.report(reporter, CERTIFICATE_NOT_READY, ctx.source());
        found.hanging.report(reporter, VPO_HANGING_ON_CERTIFICATE, ctx.source());
        found.ca_expired.report(reporter, CA_CRT_EXPIRED, ctx.source());
        Ok(())
    }
}

#[derive(Default)]
struct CertificateFindings {
    expired: Findings,
    not_ready: Findings,
    hanging: Findings,
    ca_expired: Findings,
}

impl CertificateFindings {
    /// Expiry wins over readiness; a ready certificate is only checked
    /// against the operator's pending list.
    fn classify(
        &mut self,
        cert: &Certificate,
        ns: &str,
        capture: Option<time::OffsetDateTime>,
        pending: &HashMap<String, String>,
        file: &Path,
    ) {
        let name = &cert.metadata.name;
        if let (Some(expiry), Some(capture)) = (cert.expiry(), capture) {
            if expiry < capture {
                self.expired.push(
                    format!(
                        "The certificate {name} in namespace {ns} expired at {}",
                        cert.status.not_after.as_deref().unwrap_or_default()
                    ),
                    file,
                );
                return;
            }
        }

        if !cert.is_ready() {
            let reason = cert
                .status
                .conditions
                .iter()
                .find(|c| c.condition_type == "Ready")
                .map(|c| c.message.as_str())
                .filter(|m| !m.is_empty())
                .unwrap_or("no Ready condition recorded");
            self.not_ready.push(
                format!("The certificate {name} in namespace {ns} is not ready: {reason}"),
                file,
            );
            return;
        }

        if pending.get(name).is_some_and(|pending_ns| pending_ns == ns) {
            self.hanging.push(
                format!(
                    "The Verrazzano platform operator last reported the certificate {name} in namespace {ns} as not ready, but it is now ready"
                ),
                file,
            );
        }
    }
}

/// Certificates the operator last reported as not ready, name to namespace.
fn pending_certificates(ctx: &SnapshotContext<'_>) -> anyhow::Result<HashMap<String, String>> {
    let Some(log_file) = oplog::find_operator_log(ctx.root())? else {
        return Ok(HashMap::new());
    };
    let mut pending = HashMap::new();
    for line in oplog::last_lines(&log_file, OPERATOR_LOG_TAIL)? {
        if let Some((name, namespace)) = pending_certificate(&line) {
            pending.insert(name, namespace);
        }
    }
    Ok(pending)
}

/// Name and namespace of the certificate an operator log line reports as
/// waiting for its secret. JSON lines are matched on their `message`.
fn pending_certificate(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    let message = if line.starts_with('{') {
        serde_json::from_str::<oplog::LogMessage>(line).ok()?.message
    } else {
        line.to_string()
    };
    if !message.contains(PENDING_CERT_MARKER) {
        return None;
    }
    let caps = PENDING_CERT_RE.captures(&message)?;
    Some((caps["name"].to_string(), caps["namespace"].to_string()))
}
