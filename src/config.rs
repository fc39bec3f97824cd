//! Configuration module for the tick archiver
//!
//! This module defines the run configuration: the instrument universe, the
//! date span and partition granularity, retrieval-CLI flags, publish
//! behavior and the S3 destination.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::PipelineError;
use crate::partition::{DateSpan, Granularity};

fn default_true() -> bool {
    true
}

fn default_data_type() -> String {
    "tick".to_string()
}

fn default_format() -> String {
    "csv".to_string()
}

fn default_download_dir() -> String {
    "download".to_string()
}

fn default_fetch_command() -> String {
    "npx".to_string()
}

fn default_fetch_args() -> Vec<String> {
    vec!["dukascopy-node".to_string()]
}

/// Retrieval-CLI configuration. The flags are pass-through switches on the
/// external command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Program used to launch the retrieval CLI (e.g. "npx")
    #[serde(default = "default_fetch_command")]
    pub command: String,
    /// Leading arguments placed before the per-unit flags (e.g. ["dukascopy-node"])
    #[serde(default = "default_fetch_args")]
    pub args: Vec<String>,
    /// Include volume columns in the retrieved data
    #[serde(default = "default_true")]
    pub volumes: bool,
    /// Include flat (no price movement) periods
    #[serde(default = "default_true")]
    pub flats: bool,
    /// Reuse the retrieval CLI's local download cache
    #[serde(default = "default_true")]
    pub use_cache: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            command: default_fetch_command(),
            args: default_fetch_args(),
            volumes: true,
            flats: true,
            use_cache: true,
        }
    }
}

/// Publish behavior for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Upload normalized artifacts to the object store
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Consult the remote store before fetching and skip units that were
    /// already published by an earlier run
    #[serde(default = "default_true")]
    pub check_remote: bool,
    /// Remove local artifacts after a successful upload (best-effort)
    #[serde(default = "default_true")]
    pub delete_local: bool,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_remote: true,
            delete_local: true,
        }
    }
}

/// S3-compatible storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// Provider type: "aws", "b2" (Backblaze B2), "r2" (Cloudflare R2), or "generic"
    pub provider: String,
    /// S3 bucket name
    pub bucket: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Region (optional, will use provider defaults if not specified)
    #[serde(default)]
    pub region: Option<String>,
    /// Custom endpoint URL for S3-compatible services
    /// Examples:
    /// - Backblaze B2: "https://s3.us-west-002.backblazeb2.com"
    /// - Cloudflare R2: "https://<account-id>.r2.cloudflarestorage.com"
    /// - MinIO: "http://localhost:9000"
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Force path-style addressing (true for most S3-compatible services)
    /// AWS S3 uses virtual-hosted-style by default (false)
    #[serde(default)]
    pub force_path_style: Option<bool>,
    /// Base path prefix inside the bucket (e.g. "dukascopy/forexv2")
    #[serde(default)]
    pub base_path: Option<String>,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Instrument universe to retrieve (e.g. ["eurusd", "gbpusd"])
    pub instruments: Vec<String>,
    /// Explicit date span; takes precedence over `year`
    #[serde(default)]
    pub span: Option<DateSpan>,
    /// Shorthand for a full calendar-year span
    #[serde(default)]
    pub year: Option<i32>,
    /// Partition granularity for the span
    pub granularity: Granularity,
    /// Tick type passed to the retrieval CLI
    #[serde(default = "default_data_type")]
    pub data_type: String,
    /// Output format of the retrieval CLI
    #[serde(default = "default_format")]
    pub format: String,
    /// Local staging directory for raw and normalized artifacts
    #[serde(default = "default_download_dir")]
    pub download_dir: String,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    /// S3 destination; required when publishing is enabled
    #[serde(default)]
    pub s3: Option<S3Config>,
}

impl Config {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .context(format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config =
            serde_yaml::from_str(&content).context("Failed to parse config YAML")?;

        Ok(config)
    }

    /// The date span of this run, from `span` or the `year` shorthand.
    pub fn resolve_span(&self) -> Result<DateSpan, PipelineError> {
        if let Some(span) = self.span {
            return DateSpan::new(span.start, span.end);
        }
        if let Some(year) = self.year {
            return DateSpan::full_year(year);
        }
        Err(PipelineError::Config(
            "either `span` or `year` must be set".to_string(),
        ))
    }

    /// Reject configurations that cannot start a run.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.instruments.is_empty() {
            return Err(PipelineError::Config(
                "instrument set is empty".to_string(),
            ));
        }
        if self.publish.enabled && self.s3.is_none() {
            return Err(PipelineError::Config(
                "publish.enabled requires an `s3` section".to_string(),
            ));
        }
        self.resolve_span()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_config_parsing() {
        let yaml = r#"
instruments: [eurusd, gbpusd]
year: 2014
granularity: quarterly
download_dir: download
fetch:
  volumes: true
  flats: true
  use_cache: true
publish:
  enabled: true
  check_remote: true
  delete_local: true
s3:
  provider: "aws"
  bucket: "market-replay"
  access_key_id: "AKIA..."
  secret_access_key: "secret"
  base_path: "dukascopy/forexv2"
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.instruments.len(), 2);
        assert_eq!(config.granularity, Granularity::Quarterly);
        assert_eq!(config.data_type, "tick");
        assert_eq!(config.format, "csv");
        assert_eq!(config.fetch.command, "npx");
        assert_eq!(config.fetch.args, vec!["dukascopy-node"]);
        assert_eq!(
            config.s3.as_ref().unwrap().base_path.as_deref(),
            Some("dukascopy/forexv2")
        );
        config.validate().unwrap();

        let span = config.resolve_span().unwrap();
        assert_eq!(span.start, NaiveDate::from_ymd_opt(2014, 1, 1).unwrap());
        assert_eq!(span.end, NaiveDate::from_ymd_opt(2014, 12, 31).unwrap());
    }

    #[test]
    fn test_explicit_span_takes_precedence_over_year() {
        let yaml = r#"
instruments: [eurusd]
span:
  start: 2024-04-01
  end: 2024-04-30
year: 2014
granularity: monthly
publish:
  enabled: false
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();
        let span = config.resolve_span().unwrap();
        assert_eq!(span.start, NaiveDate::from_ymd_opt(2024, 4, 1).unwrap());
        assert_eq!(span.end, NaiveDate::from_ymd_opt(2024, 4, 30).unwrap());
    }

    #[test]
    fn test_empty_instruments_rejected() {
        let yaml = r#"
instruments: []
year: 2022
granularity: daily
publish:
  enabled: false
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_publish_without_s3_rejected() {
        let yaml = r#"
instruments: [eurusd]
year: 2022
granularity: daily
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.publish.enabled);
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_missing_span_and_year_rejected() {
        let yaml = r#"
instruments: [eurusd]
granularity: daily
publish:
  enabled: false
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(
            config.resolve_span(),
            Err(PipelineError::Config(_))
        ));
    }
}
