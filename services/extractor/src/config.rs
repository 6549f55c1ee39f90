//! Extractor configuration.
//!
//! Loaded from an optional YAML file, then overridden by environment
//! variables, then completed with credentials from `~/.cdsapirc`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use grid_processor::ProcessingConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Default CDS API root.
pub const DEFAULT_CDS_URL: &str = "https://cds.climate.copernicus.eu/api";
/// Dataset queried for every request.
pub const DEFAULT_DATASET: &str = "reanalysis-era5-land";

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub provider: ProviderConfig,
    pub retry: RetryConfig,
    pub poll: PollConfig,
    pub processing: ProcessingConfig,
    /// Scratch directory for downloaded NetCDF files.
    pub work_dir: PathBuf,
}

/// Climate Data Store endpoint and credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub url: String,
    /// Personal access token, sent as `PRIVATE-TOKEN`.
    #[serde(skip_serializing)]
    pub key: Option<String>,
    pub dataset: String,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_CDS_URL.to_string(),
            key: None,
            dataset: DEFAULT_DATASET.to_string(),
            request_timeout_secs: 600,
            connect_timeout_secs: 30,
        }
    }
}

impl ProviderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Retry policy for transient provider and network failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay_ms: 2_000,
            max_delay_ms: 120_000,
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Status polling schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    /// Overall deadline for the provider to finish the job.
    pub max_wait_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: 1_000,
            max_interval_ms: 60_000,
            max_wait_secs: 6 * 3600,
        }
    }
}

impl PollConfig {
    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

impl ExtractorConfig {
    /// Load a configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: ExtractorConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        debug!(path = %path.display(), "Loaded extractor config");
        Ok(config)
    }

    /// Override fields from environment variables.
    pub fn apply_env(&mut self) {
        if let Ok(val) = std::env::var("CDSAPI_URL") {
            self.provider.url = val;
        }

        if let Ok(val) = std::env::var("CDSAPI_KEY") {
            self.provider.key = Some(val);
        }

        if let Ok(val) = std::env::var("ERA5_DATASET") {
            self.provider.dataset = val;
        }

        if let Ok(val) = std::env::var("ERA5_WORK_DIR") {
            self.work_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("ERA5_MAX_RETRIES") {
            if let Ok(n) = val.parse() {
                self.retry.max_retries = n;
            }
        }

        if let Ok(val) = std::env::var("ERA5_MAX_WAIT_SECS") {
            if let Ok(secs) = val.parse() {
                self.poll.max_wait_secs = secs;
            }
        }

        self.processing.apply_env();
    }

    /// Fill missing credentials from a cdsapirc file (`url:` and `key:` lines).
    ///
    /// Values already set are kept.
    pub fn apply_cdsapirc(&mut self, path: &Path) -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let (url, key) = parse_cdsapirc(&content);

        if self.provider.key.is_none() {
            self.provider.key = key;
        }
        if self.provider.url == DEFAULT_CDS_URL {
            if let Some(url) = url {
                self.provider.url = url;
            }
        }
        info!(path = %path.display(), "Loaded CDS credentials");
        Ok(true)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.provider.url.trim().is_empty() {
            return Err("provider.url must not be empty".to_string());
        }
        if !self.provider.url.starts_with("http://") && !self.provider.url.starts_with("https://") {
            return Err(format!("provider.url is not an HTTP URL: {}", self.provider.url));
        }
        if self.provider.key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            return Err(
                "No CDS API key: set CDSAPI_KEY or add a 'key:' line to ~/.cdsapirc".to_string(),
            );
        }
        if self.provider.dataset.is_empty() {
            return Err("provider.dataset must not be empty".to_string());
        }
        if self.poll.initial_interval_ms == 0 {
            return Err("poll.initial_interval_ms must be positive".to_string());
        }
        if self.poll.max_interval_ms < self.poll.initial_interval_ms {
            return Err("poll.max_interval_ms must be >= poll.initial_interval_ms".to_string());
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            return Err("retry.max_delay_ms must be >= retry.initial_delay_ms".to_string());
        }
        self.processing.validate()
    }

    /// Scratch directory, falling back to the system temp dir.
    pub fn resolved_work_dir(&self) -> PathBuf {
        if self.work_dir.as_os_str().is_empty() {
            std::env::temp_dir().join("era5-extractor")
        } else {
            self.work_dir.clone()
        }
    }
}

/// Default location of the cdsapirc file.
pub fn default_cdsapirc_path() -> Option<PathBuf> {
    std::env::var_os("CDSAPI_RC")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cdsapirc")))
}

fn parse_cdsapirc(content: &str) -> (Option<String>, Option<String>) {
    let mut url = None;
    let mut key = None;
    for line in content.lines() {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().to_string();
        match name.trim() {
            "url" if !value.is_empty() => url = Some(value),
            "key" if !value.is_empty() => key = Some(value),
            _ => {}
        }
    }
    (url, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use grid_processor::BoundaryPolicy;

    #[test]
    fn test_parse_yaml_config() {
        let yaml = r#"
provider:
  url: "https://cds.example.org/api"
  key: "abc-123"
poll:
  initial_interval_ms: 500
  max_interval_ms: 5000
processing:
  boundary: open
work_dir: /tmp/era5
"#;
        let config: ExtractorConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.provider.url, "https://cds.example.org/api");
        assert_eq!(config.provider.dataset, DEFAULT_DATASET);
        assert_eq!(config.poll.initial_interval(), Duration::from_millis(500));
        assert_eq!(config.retry, RetryConfig::default());
        assert_eq!(config.processing.boundary, BoundaryPolicy::Open);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_key() {
        let config = ExtractorConfig::default();
        let err = config.validate().unwrap_err();
        assert!(err.contains("CDSAPI_KEY"));
    }

    #[test]
    fn test_cdsapirc_fills_missing_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".cdsapirc");
        std::fs::write(&path, "url: https://cds.example.org/api\nkey: secret\n").unwrap();

        let mut config = ExtractorConfig::default();
        assert!(config.apply_cdsapirc(&path).unwrap());
        assert_eq!(config.provider.url, "https://cds.example.org/api");
        assert_eq!(config.provider.key.as_deref(), Some("secret"));

        let mut explicit = ExtractorConfig::default();
        explicit.provider.key = Some("from-env".to_string());
        explicit.apply_cdsapirc(&path).unwrap();
        assert_eq!(explicit.provider.key.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_missing_cdsapirc_is_not_an_error() {
        let mut config = ExtractorConfig::default();
        assert!(!config
            .apply_cdsapirc(Path::new("/nonexistent/.cdsapirc"))
            .unwrap());
    }

    #[test]
    fn test_cdsapirc_parsing_ignores_noise() {
        let (url, key) = parse_cdsapirc("# comment\nurl:\nkey: k:with:colons\nverify: 0\n");
        assert_eq!(url, None);
        assert_eq!(key.as_deref(), Some("k:with:colons"));
    }
}
