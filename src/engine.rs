use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::analyzers::{AnalyzerRegistry, SnapshotContext};
use crate::core::{IssueReporter, ReportDocument, ReportOptions, ReportStore};
use crate::error::AnalysisError;
use crate::loader::SnapshotCache;
use crate::scan;

static SNAPSHOT_DIR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(scan::SNAPSHOT_DIR_PATTERN).expect("snapshot dir regex"));

/// State of one analysis run: the load cache and the collected reports.
///
/// Independent runs use independent sessions, so nothing needs resetting.
#[derive(Default)]
pub struct AnalysisSession {
    cache: SnapshotCache,
    store: ReportStore,
}

impl AnalysisSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    pub fn store(&self) -> &ReportStore {
        &self.store
    }

    pub fn generate(&self, opts: &ReportOptions) -> String {
        self.store.generate(opts)
    }

    pub fn document(&self, opts: &ReportOptions) -> ReportDocument {
        let generated_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "unknown".to_string());
        self.store
            .document(opts, env!("CARGO_PKG_VERSION"), &generated_at)
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub show_progress: bool,
}

pub struct Engine {
    opts: EngineOptions,
    registry: AnalyzerRegistry,
}

impl Engine {
    pub fn new(opts: EngineOptions) -> Self {
        Self::with_registry(opts, AnalyzerRegistry::cluster())
    }

    pub fn with_registry(opts: EngineOptions, registry: AnalyzerRegistry) -> Self {
        Self { opts, registry }
    }

    pub fn registry(&self) -> &AnalyzerRegistry {
        &self.registry
    }

    /// Analyzes every snapshot root found under `capture_dir` and returns the
    /// roots in the order they were analyzed.
    ///
    /// Fails when no snapshot root exists or the directory cannot be walked.
    /// Analyzer failures are logged and never fail the run.
    pub fn run_analysis(
        &self,
        session: &AnalysisSession,
        capture_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        let roots = scan::find_matching_directories(capture_dir, &SNAPSHOT_DIR_RE)
            .with_context(|| format!("searching {} for snapshots", capture_dir.display()))?;
        if roots.is_empty() {
            return Err(AnalysisError::NoSnapshotFound(capture_dir.to_path_buf()).into());
        }

        for root in &roots {
            self.analyze_root(session, root);
        }
        Ok(roots)
    }

    /// Runs the whole registry over one snapshot root and flushes its issues
    /// into the session's report store.
    pub fn analyze_root(&self, session: &AnalysisSession, root: &Path) {
        use std::io::IsTerminal;
        let progress_enabled = self.opts.show_progress && std::io::stderr().is_terminal();
        let pb = if progress_enabled {
            let pb = indicatif::ProgressBar::new_spinner();
            pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
            pb.set_message(format!("Analyzing {}", root.display()));
            pb.enable_steady_tick(Duration::from_millis(120));
            Some(pb)
        } else {
            None
        };

        let ctx = SnapshotContext::new(root, session.cache());
        session.store().add_source_analyzed(ctx.source());
        log::info!("analyzing {}", ctx.source());

        let mut reporter = IssueReporter::new();
        for analyzer in self.registry.iter() {
            if let Some(pb) = &pb {
                pb.set_message(format!("Analyzing {} ({})", root.display(), analyzer.name()));
            }
            log::debug!("running analyzer {} on {}", analyzer.name(), ctx.source());
            if let Err(err) = analyzer.analyze(&ctx, &mut reporter) {
                log::error!(
                    "analyzer {} failed on {}: {err:#}",
                    analyzer.name(),
                    ctx.source()
                );
            }
        }

        match reporter.contribute(session.store(), ctx.source()) {
            Ok(n) => log::info!("{n} issues detected in {}", ctx.source()),
            Err(err) => log::error!("failed to record issues for {}: {err}", ctx.source()),
        }

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }
    }
}
