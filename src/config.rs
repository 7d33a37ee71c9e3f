use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use digbin_core::pipeline::PipelinePolicy;
use digbin_core::scoring::{CommitRule, AUTO_COMMIT_THRESHOLD};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub lookup: LookupConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_commit_threshold")]
    pub commit_threshold: i32,
    #[serde(default = "default_commit_rule")]
    pub commit_rule: String,
    #[serde(default = "default_min_gap")]
    pub min_gap: i32,
    #[serde(default = "default_batch_limit")]
    pub batch_limit: i64,
    #[serde(default)]
    pub ocr_retry_delay_secs: Option<u64>,
    #[serde(default)]
    pub ocr_stale_after_secs: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            commit_threshold: AUTO_COMMIT_THRESHOLD,
            commit_rule: default_commit_rule(),
            min_gap: default_min_gap(),
            batch_limit: default_batch_limit(),
            ocr_retry_delay_secs: None,
            ocr_stale_after_secs: None,
        }
    }
}

fn default_commit_threshold() -> i32 {
    AUTO_COMMIT_THRESHOLD
}
fn default_commit_rule() -> String {
    "threshold".to_string()
}
fn default_min_gap() -> i32 {
    10
}
fn default_batch_limit() -> i64 {
    25
}

impl PipelineConfig {
    /// Orchestrator policy for these settings. Call after validation.
    pub fn policy(&self) -> PipelinePolicy {
        let commit_rule = match self.commit_rule.as_str() {
            "gap" => CommitRule::Gap {
                min_gap: self.min_gap,
            },
            _ => CommitRule::Threshold,
        };
        PipelinePolicy {
            commit_threshold: self.commit_threshold,
            commit_rule,
            ocr_retry_delay_ms: self.ocr_retry_delay_secs.map(secs_to_millis),
            ocr_stale_after_ms: self.ocr_stale_after_secs.map(secs_to_millis),
        }
    }
}

fn secs_to_millis(secs: u64) -> i64 {
    (secs as i64).saturating_mul(1000)
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcrConfig {
    #[serde(default = "default_ocr_engine")]
    pub engine: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            engine: default_ocr_engine(),
        }
    }
}

fn default_ocr_engine() -> String {
    "sidecar".to_string()
}

impl OcrConfig {
    pub fn is_enabled(&self) -> bool {
        self.engine != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LookupConfig {
    #[serde(default = "default_lookup_provider")]
    pub provider: String,
    #[serde(default)]
    pub fixtures_path: Option<PathBuf>,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            provider: default_lookup_provider(),
            fixtures_path: None,
        }
    }
}

fn default_lookup_provider() -> String {
    "disabled".to_string()
}

impl LookupConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Seconds between background scan passes in `dig serve`; 0 disables them.
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            scan_interval_secs: default_scan_interval_secs(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}
fn default_scan_interval_secs() -> u64 {
    30
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate pipeline
    if !(1..=100).contains(&config.pipeline.commit_threshold) {
        anyhow::bail!("pipeline.commit_threshold must be in [1, 100]");
    }

    match config.pipeline.commit_rule.as_str() {
        "threshold" | "gap" => {}
        other => anyhow::bail!(
            "Unknown pipeline.commit_rule: '{}'. Must be threshold or gap.",
            other
        ),
    }

    if config.pipeline.min_gap < 0 {
        anyhow::bail!("pipeline.min_gap must be >= 0");
    }

    if config.pipeline.batch_limit < 1 {
        anyhow::bail!("pipeline.batch_limit must be >= 1");
    }

    if config.pipeline.ocr_stale_after_secs == Some(0) {
        anyhow::bail!("pipeline.ocr_stale_after_secs must be > 0 when set");
    }

    // Validate collaborators
    match config.ocr.engine.as_str() {
        "disabled" | "sidecar" => {}
        other => anyhow::bail!(
            "Unknown ocr engine: '{}'. Must be disabled or sidecar.",
            other
        ),
    }

    match config.lookup.provider.as_str() {
        "disabled" => {}
        "fixtures" => {
            if config.lookup.fixtures_path.is_none() {
                anyhow::bail!("lookup.fixtures_path must be specified when provider is 'fixtures'");
            }
        }
        other => anyhow::bail!(
            "Unknown lookup provider: '{}'. Must be disabled or fixtures.",
            other
        ),
    }

    Ok(config)
}
