use std::io;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand, ValueEnum};

use crate::config::EffectiveConfig;
use crate::core::{MAX_CONFIDENCE, MAX_IMPACT, ReportFormat, ReportOptions};
use crate::engine::{AnalysisSession, Engine, EngineOptions};
use crate::ui::UiConfig;

#[derive(Debug, Parser)]
#[command(
    name = "vzanalyze",
    version,
    about = "Analyze a captured Verrazzano cluster snapshot and report known issues"
)]
pub struct Cli {
    /// Emit machine readable JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Analyze every cluster snapshot under a capture directory.
    Analyze(AnalyzeArgs),
    /// Print a shell completion script.
    Completion(CompletionArgs),
    Config(ConfigArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AnalyzerKind {
    Cluster,
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Directory holding one or more `cluster-snapshot` directories.
    #[arg(long)]
    pub capture_dir: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = AnalyzerKind::Cluster)]
    pub analyzer: AnalyzerKind,
    /// Write the report to this file instead of stdout.
    #[arg(long)]
    pub report_file: Option<PathBuf>,
    /// summary or detailed.
    #[arg(long)]
    pub report_format: Option<String>,
    #[arg(long, value_parser = parse_bool_flag)]
    pub include_info: Option<bool>,
    #[arg(long, value_parser = parse_bool_flag)]
    pub include_support: Option<bool>,
    #[arg(long, value_parser = parse_bool_flag)]
    pub include_actions: Option<bool>,
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=MAX_CONFIDENCE as i64))]
    pub min_confidence: Option<u8>,
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=MAX_IMPACT as i64))]
    pub min_impact: Option<u8>,
    /// Word the report for a live cluster rather than a captured snapshot.
    #[arg(long)]
    pub live: bool,
}

#[derive(Debug, Args)]
pub struct CompletionArgs {
    pub shell: String,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[arg(long)]
    pub show: bool,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let ui_cfg = UiConfig {
        stderr_is_tty: io::stderr().is_terminal(),
        quiet: cli.quiet,
    };

    let home_dir = std::env::var_os("HOME").map(PathBuf::from);
    let env_config_path = std::env::var_os(crate::config::CONFIG_ENV).map(PathBuf::from);
    let cfg = crate::config::load(
        cli.config.as_deref().or(env_config_path.as_deref()),
        home_dir.as_deref(),
    )
    .map_err(crate::exit::invalid_args_err)?;
    log::debug!("effective config: {cfg:?}");

    match cli.command {
        Commands::Analyze(args) => {
            let opts = report_options(&cfg, &args)?;
            let capture_dir = args
                .capture_dir
                .as_deref()
                .filter(|p| !p.as_os_str().is_empty())
                .ok_or_else(|| crate::exit::invalid_args("--capture-dir is required"))?;

            let engine = match args.analyzer {
                AnalyzerKind::Cluster => Engine::new(EngineOptions {
                    show_progress: ui_cfg.stderr_is_tty && !cli.quiet && !cli.json,
                }),
            };
            let session = AnalysisSession::new();
            analyze(&engine, &session, capture_dir)?;

            if cli.json {
                write_json(&session.document(&opts))?;
            } else {
                let report = session.generate(&opts);
                crate::ui::write_report(&report, args.report_file.as_deref(), &ui_cfg)?;
            }
        }
        Commands::Completion(args) => {
            let shell = parse_shell(&args.shell)?;
            let mut cmd = Cli::command();
            let mut out = std::io::stdout().lock();
            clap_complete::generate(shell, &mut cmd, "vzanalyze", &mut out);
        }
        Commands::Config(args) => {
            if args.show {
                if cli.json {
                    write_json(&cfg)?;
                } else {
                    println!("{}", toml::to_string_pretty(&cfg)?);
                }
            } else if !ui_cfg.quiet {
                eprintln!("config: use `vzanalyze config --show`");
            }
        }
    }

    Ok(())
}

fn analyze(engine: &Engine, session: &AnalysisSession, capture_dir: &Path) -> Result<()> {
    let roots = engine.run_analysis(session, capture_dir)?;
    log::info!(
        "analyzed {} snapshot(s) with {} analyzers",
        roots.len(),
        engine.registry().len()
    );
    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    let mut builder = env_logger::Builder::from_default_env();
    if let Some(level) = default_log_level(verbose, std::env::var_os("RUST_LOG").is_some()) {
        builder.filter_level(level);
    }
    builder.init();
}

/// Level implied by `-v` flags. `RUST_LOG` wins when it is set.
fn default_log_level(verbose: u8, rust_log_set: bool) -> Option<log::LevelFilter> {
    if rust_log_set {
        return None;
    }
    Some(match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    })
}

/// Flags win over the environment and config file.
fn report_options(cfg: &EffectiveConfig, args: &AnalyzeArgs) -> Result<ReportOptions> {
    let mut opts = cfg.report.to_options();
    if let Some(format) = &args.report_format {
        opts.format = format
            .parse::<ReportFormat>()
            .map_err(crate::exit::invalid_args)?;
    }
    if let Some(v) = args.include_info {
        opts.include_info = v;
    }
    if let Some(v) = args.include_support {
        opts.include_support = v;
    }
    if let Some(v) = args.include_actions {
        opts.include_actions = v;
    }
    if let Some(v) = args.min_confidence {
        opts.min_confidence = v;
    }
    if let Some(v) = args.min_impact {
        opts.min_impact = v;
    }
    opts.live = args.live;
    Ok(opts)
}

fn parse_bool_flag(s: &str) -> std::result::Result<bool, String> {
    crate::config::parse_bool(s).map_err(|err| err.to_string())
}

fn write_json<T: serde::Serialize>(value: &T) -> Result<()> {
    use std::io::Write;

    let buf = serde_json::to_vec_pretty(value)?;

    let mut stdout = std::io::stdout().lock();
    match stdout.write_all(&buf) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => return Ok(()),
        Err(err) => return Err(err.into()),
    }
    match stdout.write_all(b"\n") {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn parse_shell(s: &str) -> Result<clap_complete::Shell> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "bash" => Ok(clap_complete::Shell::Bash),
        "zsh" => Ok(clap_complete::Shell::Zsh),
        "fish" => Ok(clap_complete::Shell::Fish),
        "powershell" => Ok(clap_complete::Shell::PowerShell),
        "elvish" => Ok(clap_complete::Shell::Elvish),
        other => Err(crate::exit::invalid_args(format!(
            "unsupported shell: {other} (expected bash|zsh|fish|powershell|elvish)"
        ))),
    }
}
