use std::{fs, path::PathBuf};

use anyhow::{bail, Context};
use serde::Deserialize;

use crate::aggregate::{check_percentile, HourWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Csv,
    Database,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub csv_path: Option<PathBuf>,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

fn default_delimiter() -> char {
    ','
}

impl SourceConfig {
    pub fn delimiter_byte(&self) -> anyhow::Result<u8> {
        u8::try_from(self.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .with_context(|| {
                format!(
                    "source.delimiter '{}' must be a single ASCII character",
                    self.delimiter
                )
            })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub uri: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
    #[serde(default = "default_row_limit")]
    pub row_limit: i64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_lookback_days() -> i64 {
    30
}

fn default_row_limit() -> i64 {
    200_000
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub busy_hour_percentile: f64,
    pub prime_time: HourWindow,
    pub top_n: usize,
    pub congestion_threshold_pct: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            busy_hour_percentile: 0.95,
            prime_time: HourWindow::default(),
            top_n: 10,
            congestion_threshold_pct: 80.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub server: ServerConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path =
            env::var("ANALYTICS_CONFIG").unwrap_or_else(|_| "analytics-config.toml".to_string());
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file '{path}'"))?;
        Self::from_toml_str(&contents).with_context(|| format!("invalid config file '{path}'"))
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        check_percentile(self.analysis.busy_hour_percentile)?;
        if !(0.0..=100.0).contains(&self.analysis.congestion_threshold_pct) {
            bail!(
                "analysis.congestion_threshold_pct {} outside [0, 100]",
                self.analysis.congestion_threshold_pct
            );
        }
        self.source.delimiter_byte()?;

        match self.source.kind {
            SourceKind::Csv if self.source.csv_path.is_none() => {
                bail!("source.csv_path is required when source.kind = \"csv\"")
            }
            SourceKind::Database if self.database.is_none() => {
                bail!("[database] section is required when source.kind = \"database\"")
            }
            _ => {}
        }

        if let Some(db) = &self.database {
            if db.lookback_days <= 0 || db.row_limit <= 0 {
                bail!("database.lookback_days and database.row_limit must be positive");
            }
        }

        Ok(())
    }
}
