//! Analyzers inspect one snapshot root and raise known issues through an
//! [`IssueReporter`].
//!
//! Analyzers run in [`Stage`] order. The Verrazzano status analyzer runs in
//! [`Stage::InstallStatus`] and records an [`InstallStatus`] on the context;
//! analyzers that depend on it run in [`Stage::Resources`].

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use time::OffsetDateTime;

use crate::core::IssueReporter;
use crate::error::Result;
use crate::k8s::{EventList, PodList};
use crate::loader::SnapshotCache;
use crate::scan;

pub mod capi;
pub mod certificates;
pub mod conditions;
pub mod events;
pub mod ingress;
pub mod install;
pub mod mysql;
pub mod namespaces;
pub mod oplog;
pub mod pods;
pub mod rancher;

pub const PODS_FILE: &str = "pods.json";
pub const EVENTS_FILE: &str = "events.json";
pub const SERVICES_FILE: &str = "services.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    InstallStatus,
    Resources,
}

pub trait Analyzer: Send + Sync {
    fn name(&self) -> &'static str;

    fn stage(&self) -> Stage {
        Stage::Resources
    }

    fn analyze(&self, ctx: &SnapshotContext<'_>, reporter: &mut IssueReporter)
    -> anyhow::Result<()>;
}

/// Ordered set of analyzers. Registration order is kept within a stage.
#[derive(Default)]
pub struct AnalyzerRegistry {
    analyzers: Vec<Box<dyn Analyzer>>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every analyzer for a captured cluster snapshot.
    pub fn cluster() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(install::VerrazzanoStatusAnalyzer));
        registry.register(Box::new(ingress::IngressAnalyzer));
        registry.register(Box::new(pods::PodsAnalyzer));
        registry.register(Box::new(certificates::CertificatesAnalyzer));
        registry.register(Box::new(namespaces::NamespacesAnalyzer));
        registry.register(Box::new(rancher::RancherAnalyzer));
        registry.register(Box::new(capi::ClusterApiAnalyzer));
        registry.register(Box::new(mysql::MySqlAnalyzer));
        registry
    }

    pub fn register(&mut self, analyzer: Box<dyn Analyzer>) {
        let stage = analyzer.stage();
        let at = self
            .analyzers
            .iter()
            .position(|a| a.stage() > stage)
            .unwrap_or(self.analyzers.len());
        self.analyzers.insert(at, analyzer);
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Analyzer> {
        self.analyzers.iter().map(|a| a.as_ref())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.iter().map(|a| a.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }
}

/// What the status analyzer learned about the install.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallStatus {
    pub not_ready: Vec<String>,
    pub unavailable: Vec<String>,
    pub operator_errors: Vec<String>,
    pub operator_log: Option<PathBuf>,
}

impl InstallStatus {
    pub fn failed(&self) -> bool {
        !self.not_ready.is_empty()
    }

    pub fn component_not_ready(&self, component: &str) -> bool {
        self.not_ready.iter().any(|c| c == component)
    }
}

/// Per-root state shared by the analyzers of one run.
pub struct SnapshotContext<'a> {
    root: PathBuf,
    source: String,
    cache: &'a SnapshotCache,
    capture_time: OnceLock<Option<OffsetDateTime>>,
    install_status: OnceLock<InstallStatus>,
}

impl<'a> SnapshotContext<'a> {
    pub fn new(root: &Path, cache: &'a SnapshotCache) -> Self {
        Self {
            root: root.to_path_buf(),
            source: root.display().to_string(),
            cache,
            capture_time: OnceLock::new(),
            install_status: OnceLock::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Identifier under which this root's issues are reported.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn cache(&self) -> &SnapshotCache {
        self.cache
    }

    pub fn capture_time(&self) -> Option<OffsetDateTime> {
        *self
            .capture_time
            .get_or_init(|| match scan::time_of_capture(&self.root) {
                Ok(t) => t,
                Err(err) => {
                    log::warn!("capture time unavailable for {}: {err}", self.source);
                    None
                }
            })
    }

    pub fn namespaces(&self) -> Result<Vec<String>> {
        scan::find_namespaces(&self.root)
    }

    pub fn namespace_file(&self, namespace: &str, file: &str) -> PathBuf {
        scan::path_in_namespace(&self.root, namespace, file)
    }

    pub fn pods(&self, namespace: &str) -> Result<Option<Arc<PodList>>> {
        self.cache.pod_list(&self.namespace_file(namespace, PODS_FILE))
    }

    pub fn events(&self, namespace: &str) -> Result<Option<Arc<EventList>>> {
        self.cache
            .event_list(&self.namespace_file(namespace, EVENTS_FILE))
    }

    pub fn record_install_status(&self, status: InstallStatus) {
        if self.install_status.set(status).is_err() {
            log::warn!("install status for {} already recorded", self.source);
        }
    }

    pub fn install_status(&self) -> Option<&InstallStatus> {
        self.install_status.get()
    }
}

/// Renders a duration as `N minutes and S seconds`.
pub fn minutes_and_seconds(elapsed: time::Duration) -> String {
    let secs = elapsed.whole_seconds().max(0);
    format!("{} minutes and {} seconds", secs / 60, secs % 60)
}

/// Time between `since` and the capture, when both are known.
pub fn elapsed_at_capture(
    ctx: &SnapshotContext<'_>,
    since: Option<OffsetDateTime>,
) -> Option<time::Duration> {
    Some(ctx.capture_time()? - since?)
}
