use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::analysis::{AnalysisParams, Metric};
use crate::api::status::StatusVocabulary;
use crate::polling::PollPolicy;

/// Configuration for the VOD chat analyzer client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend connection settings
    pub server: ServerConfig,

    /// Status contract the backend speaks
    pub contract: ContractConfig,

    /// Task polling settings
    pub polling: PollingConfig,

    /// Background worker-status display
    pub worker_status: WorkerStatusConfig,

    /// Default analytics form
    pub analysis: AnalysisDefaults,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the analytics server
    pub base_url: String,

    /// Timeout for a single request (seconds)
    pub request_timeout_seconds: u64,

    /// Connection timeout (seconds)
    pub connect_timeout_seconds: u64,

    pub user_agent: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractConfig {
    pub vocabulary: StatusVocabulary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Delay between status checks (milliseconds)
    pub interval_ms: u64,

    /// Give up after this many status checks (unset = poll until terminal)
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerStatusConfig {
    pub enabled: bool,

    /// Refresh interval (milliseconds)
    pub interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisDefaults {
    pub metrics: Vec<Metric>,
    pub top_chatters_count: u32,
    pub top_pastes_count: u32,
    pub emoticons_count: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            request_timeout_seconds: 30,
            connect_timeout_seconds: 10,
            user_agent: format!("vod-chat-analyzer/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            max_attempts: None,
        }
    }
}

impl Default for WorkerStatusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 5000, // server rate-limits this route to 12/min
        }
    }
}

impl Default for AnalysisDefaults {
    fn default() -> Self {
        let params = AnalysisParams::default();
        Self {
            metrics: params.metrics,
            top_chatters_count: params.top_chatters_count,
            top_pastes_count: params.top_pastes_count,
            emoticons_count: params.emoticons_count,
        }
    }
}

impl PollingConfig {
    pub fn policy(&self) -> PollPolicy {
        PollPolicy::new(Duration::from_millis(self.interval_ms))
            .with_max_attempts(self.max_attempts)
    }
}

impl WorkerStatusConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl AnalysisDefaults {
    /// Analytics form pre-filled from these defaults
    pub fn params(&self) -> AnalysisParams {
        AnalysisParams {
            metrics: self.metrics.clone(),
            top_chatters_count: self.top_chatters_count,
            top_pastes_count: self.top_pastes_count,
            emoticons_count: self.emoticons_count,
            keywords: String::new(),
        }
    }
}

impl Config {
    /// Load configuration from the first config file found, then apply
    /// environment overrides. Falls back to defaults when no file exists.
    pub fn load() -> Result<Self> {
        let config_paths = ["vod-analyzer.toml", "config/vod-analyzer.toml"];

        let mut config = None;
        for path in &config_paths {
            if Path::new(path).exists() {
                config = Some(Self::load_from(path)?);
                tracing::info!("📄 Loaded configuration from: {}", path);
                break;
            }
        }

        let mut config = config.unwrap_or_default();
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Override with environment variables
    pub fn apply_env(&mut self) {
        if let Ok(base_url) = std::env::var("VOD_ANALYZER_BASE_URL") {
            self.server.base_url = base_url;
        }

        if let Ok(interval) = std::env::var("VOD_ANALYZER_POLL_INTERVAL_MS") {
            match interval.parse() {
                Ok(ms) => self.polling.interval_ms = ms,
                Err(_) => {
                    tracing::warn!("Ignoring invalid VOD_ANALYZER_POLL_INTERVAL_MS={}", interval)
                }
            }
        }

        if let Ok(attempts) = std::env::var("VOD_ANALYZER_MAX_ATTEMPTS") {
            match attempts.parse() {
                Ok(n) => self.polling.max_attempts = Some(n),
                Err(_) => tracing::warn!("Ignoring invalid VOD_ANALYZER_MAX_ATTEMPTS={}", attempts),
            }
        }

        if let Ok(vocabulary) = std::env::var("VOD_ANALYZER_CONTRACT") {
            match vocabulary.parse() {
                Ok(v) => self.contract.vocabulary = v,
                Err(e) => tracing::warn!("Ignoring VOD_ANALYZER_CONTRACT: {}", e),
            }
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        crate::api::http::base_url(&self.server.base_url)
            .map_err(|e| anyhow!("invalid base_url {:?}: {}", self.server.base_url, e))?;

        if self.polling.interval_ms == 0 {
            return Err(anyhow!("polling.interval_ms must be greater than 0"));
        }

        if self.polling.max_attempts == Some(0) {
            return Err(anyhow!("polling.max_attempts must be greater than 0 when set"));
        }

        if self.worker_status.enabled && self.worker_status.interval_ms == 0 {
            return Err(anyhow!("worker_status.interval_ms must be greater than 0"));
        }

        if self.analysis.metrics.is_empty() {
            return Err(anyhow!("analysis.metrics must name at least one metric"));
        }

        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "VOD Analyzer Configuration:\n\
            - Server: {}\n\
            - Contract: {:?}\n\
            - Poll Interval: {}ms\n\
            - Max Attempts: {}\n\
            - Worker Status: {}",
            self.server.base_url,
            self.contract.vocabulary,
            self.polling.interval_ms,
            self.polling
                .max_attempts
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unbounded".to_string()),
            if self.worker_status.enabled {
                format!("every {}ms", self.worker_status.interval_ms)
            } else {
                "off".to_string()
            }
        )
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.server.base_url = url.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.config.polling.interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_max_attempts(mut self, attempts: Option<u32>) -> Self {
        self.config.polling.max_attempts = attempts;
        self
    }

    pub fn with_vocabulary(mut self, vocabulary: StatusVocabulary) -> Self {
        self.config.contract.vocabulary = vocabulary;
        self
    }

    pub fn enable_worker_status(mut self, enable: bool) -> Self {
        self.config.worker_status.enabled = enable;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
