use crate::calendar::{DEFAULT_OPENING_HOUR, MAX_OFFSET_MINUTES};
use crate::compare::CompareStrategy;
use crate::models::FieldId;
use crate::scraper::cleaner::{DEFAULT_DOWN_MARKER, DEFAULT_VALUE_UNIT};
use crate::scraper::parsers::{default_selectors, FieldSelector};
use crate::storage::ColumnSpec;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Page source configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    #[serde(default = "default_url")]
    pub url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Fields not listed here are reported as not configured.
    #[serde(default = "default_selectors")]
    pub selectors: BTreeMap<FieldId, FieldSelector>,
}

/// Table configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_table_path")]
    pub table_path: PathBuf,

    /// Preset name (`english`, `vietnamese`, `japanese`) or nine labels.
    #[serde(default)]
    pub columns: ColumnSpec,
}

/// Parsing and duplicate-detection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Keep this fixed for the lifetime of a table.
    #[serde(default)]
    pub strategy: CompareStrategy,

    #[serde(default = "default_value_unit")]
    pub value_unit: String,

    #[serde(default = "default_direction_marker")]
    pub direction_marker: String,

    #[serde(default = "default_opening_hour")]
    pub opening_hour: u32,

    /// Market wall clock as a fixed UTC offset; host local time when unset.
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_url() -> String {
    "https://banggia.vndirect.com.vn/chung-khoan/hose".to_string()
}
fn default_timeout_secs() -> u64 {
    20
}
fn default_user_agent() -> String {
    "vnindex-snapshot/0.1 (market summary recorder)".to_string()
}
fn default_table_path() -> PathBuf {
    PathBuf::from("data/VNDirect_data.csv")
}
fn default_value_unit() -> String {
    DEFAULT_VALUE_UNIT.to_string()
}
fn default_direction_marker() -> String {
    DEFAULT_DOWN_MARKER.to_string()
}
fn default_opening_hour() -> u32 {
    DEFAULT_OPENING_HOUR
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            selectors: default_selectors(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            table_path: default_table_path(),
            columns: ColumnSpec::default(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            strategy: CompareStrategy::default(),
            value_unit: default_value_unit(),
            direction_marker: default_direction_marker(),
            opening_hour: default_opening_hour(),
            utc_offset_minutes: None,
        }
    }
}

impl SourceConfig {
    pub fn parsed_url(&self) -> Result<url::Url> {
        url::Url::parse(&self.url).with_context(|| format!("Invalid source url {:?}", self.url))
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("VNI").separator("__"))
            .build()
            .context("Failed to assemble configuration")?;

        let app_cfg: AppConfig = cfg.try_deserialize().context("Invalid configuration")?;
        app_cfg.validate()?;
        Ok(app_cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.source.parsed_url()?;
        self.storage
            .columns
            .labels()
            .context("Invalid storage.columns")?;
        if self.pipeline.opening_hour > 23 {
            anyhow::bail!("pipeline.opening_hour must be 0-23, got {}", self.pipeline.opening_hour);
        }
        if let Some(m) = self.pipeline.utc_offset_minutes {
            if !(-MAX_OFFSET_MINUTES..=MAX_OFFSET_MINUTES).contains(&m) {
                anyhow::bail!(
                    "pipeline.utc_offset_minutes must be within ±{}, got {}",
                    MAX_OFFSET_MINUTES,
                    m
                );
            }
        }
        Ok(())
    }
}
