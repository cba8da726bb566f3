use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::{MAX_CONFIDENCE, MAX_IMPACT, ReportFormat, ReportOptions};
use crate::error::AnalysisError;

pub const CONFIG_ENV: &str = "VZANALYZE_CONFIG";

#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub report: ReportConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportConfig {
    pub format: ReportFormat,
    pub include_info: bool,
    pub include_support: bool,
    pub include_actions: bool,
    pub min_confidence: u8,
    pub min_impact: u8,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            report: ReportConfig {
                format: ReportFormat::Summary,
                include_info: true,
                include_support: true,
                include_actions: true,
                min_confidence: 0,
                min_impact: 0,
            },
            config_path: None,
        }
    }
}

impl ReportConfig {
    pub fn to_options(&self) -> ReportOptions {
        ReportOptions {
            format: self.format,
            include_info: self.include_info,
            include_support: self.include_support,
            include_actions: self.include_actions,
            min_confidence: self.min_confidence,
            min_impact: self.min_impact,
            live: false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    report: Option<RawReportConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawReportConfig {
    format: Option<String>,
    include_info: Option<bool>,
    include_support: Option<bool>,
    include_actions: Option<bool>,
    min_confidence: Option<i64>,
    min_impact: Option<i64>,
}

pub fn default_config_path(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/vzanalyze/config.toml")
}

/// Built-in defaults, then the config file, then `VZANALYZE_*` variables.
/// Command line flags are applied on top by the caller.
///
/// An explicitly named config file must exist; the default one may not.
pub fn load(config_path: Option<&Path>, home_dir: Option<&Path>) -> Result<EffectiveConfig> {
    let mut cfg = EffectiveConfig::default();

    let path = match (config_path, home_dir) {
        (Some(path), _) => {
            if !path.exists() {
                return Err(AnalysisError::Configuration(format!(
                    "config file {} does not exist",
                    path.display()
                ))
                .into());
            }
            Some(path.to_path_buf())
        }
        (None, Some(home)) => Some(default_config_path(home)).filter(|p| p.exists()),
        (None, None) => None,
    };

    if let Some(path) = path {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let raw: RawConfig = toml::from_str(&s)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        apply_raw_config(&mut cfg, raw)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        cfg.config_path = Some(path.display().to_string());
    }

    apply_env_overrides(&mut cfg)?;

    Ok(cfg)
}

fn apply_raw_config(cfg: &mut EffectiveConfig, raw: RawConfig) -> Result<()> {
    let Some(report) = raw.report else {
        return Ok(());
    };
    if let Some(format) = report.format {
        cfg.report.format = parse_format(&format)?;
    }
    if let Some(include_info) = report.include_info {
        cfg.report.include_info = include_info;
    }
    if let Some(include_support) = report.include_support {
        cfg.report.include_support = include_support;
    }
    if let Some(include_actions) = report.include_actions {
        cfg.report.include_actions = include_actions;
    }
    if let Some(min_confidence) = report.min_confidence {
        cfg.report.min_confidence = threshold("min_confidence", min_confidence, MAX_CONFIDENCE)?;
    }
    if let Some(min_impact) = report.min_impact {
        cfg.report.min_impact = threshold("min_impact", min_impact, MAX_IMPACT)?;
    }
    Ok(())
}

fn apply_env_overrides(cfg: &mut EffectiveConfig) -> Result<()> {
    if let Ok(v) = std::env::var("VZANALYZE_REPORT_FORMAT") {
        cfg.report.format = parse_format(&v).context("VZANALYZE_REPORT_FORMAT")?;
    }
    if let Ok(v) = std::env::var("VZANALYZE_REPORT_INCLUDE_INFO") {
        cfg.report.include_info = parse_bool(&v).context("VZANALYZE_REPORT_INCLUDE_INFO")?;
    }
    if let Ok(v) = std::env::var("VZANALYZE_REPORT_INCLUDE_SUPPORT") {
        cfg.report.include_support =
            parse_bool(&v).context("VZANALYZE_REPORT_INCLUDE_SUPPORT")?;
    }
    if let Ok(v) = std::env::var("VZANALYZE_REPORT_INCLUDE_ACTIONS") {
        cfg.report.include_actions =
            parse_bool(&v).context("VZANALYZE_REPORT_INCLUDE_ACTIONS")?;
    }
    if let Ok(v) = std::env::var("VZANALYZE_REPORT_MIN_CONFIDENCE") {
        cfg.report.min_confidence = parse_threshold("min confidence", &v, MAX_CONFIDENCE)
            .context("VZANALYZE_REPORT_MIN_CONFIDENCE")?;
    }
    if let Ok(v) = std::env::var("VZANALYZE_REPORT_MIN_IMPACT") {
        cfg.report.min_impact = parse_threshold("min impact", &v, MAX_IMPACT)
            .context("VZANALYZE_REPORT_MIN_IMPACT")?;
    }

    Ok(())
}

fn parse_format(s: &str) -> Result<ReportFormat> {
    s.parse::<ReportFormat>()
        .map_err(|msg| AnalysisError::Configuration(msg).into())
}

fn parse_threshold(name: &str, s: &str, max: u8) -> Result<u8> {
    let value = s.trim().parse::<i64>().map_err(|_| {
        AnalysisError::Configuration(format!("{name} must be an integer, got \"{}\"", s.trim()))
    })?;
    threshold(name, value, max)
}

fn threshold(name: &str, value: i64, max: u8) -> Result<u8> {
    u8::try_from(value)
        .ok()
        .filter(|v| *v <= max)
        .ok_or_else(|| {
            AnalysisError::Configuration(format!(
                "{name} must be between 0 and {max}, got {value}"
            ))
            .into()
        })
}

pub fn parse_bool(s: &str) -> Result<bool> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AnalysisError::Configuration(format!(
            "invalid boolean: {s} (expected one of true|false|1|0|yes|no|on|off)"
        ))
        .into()),
    }
}
