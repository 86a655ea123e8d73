use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SwitchyardError};

/// Top-level Switchyard configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub webhooks: WebhookConfig,
    #[serde(default)]
    pub log: Option<LogConfig>,
}

/// Traversal limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Deepest edge chain a single run may follow before it is aborted.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Upper bound for delay nodes, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Latency bounds for the simulated providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_min_latency_ms")]
    pub min_latency_ms: u64,
    #[serde(default = "default_max_latency_ms")]
    pub max_latency_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            min_latency_ms: default_min_latency_ms(),
            max_latency_ms: default_max_latency_ms(),
        }
    }
}

impl SimulationConfig {
    /// A configuration with no artificial latency (tests, dry runs).
    pub fn instant() -> Self {
        Self {
            min_latency_ms: 0,
            max_latency_ms: 0,
        }
    }
}

/// HTTP transport settings for the API service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Maximum number of history entries retained (oldest dropped first).
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
        }
    }
}

/// JSONL run logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Enable run logging (default: true when section is present).
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// Directory for run log files.
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
        }
    }
}

fn default_max_depth() -> usize { 256 }
fn default_max_delay_ms() -> u64 { 60_000 }
fn default_min_latency_ms() -> u64 { 100 }
fn default_max_latency_ms() -> u64 { 500 }
fn default_http_timeout() -> u64 { 30 }
fn default_user_agent() -> String { format!("switchyard/{}", env!("CARGO_PKG_VERSION")) }
fn default_history_limit() -> usize { 1_000 }
fn default_log_enabled() -> bool { true }
fn default_log_dir() -> String { "~/.switchyard/runs".to_string() }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| SwitchyardError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        let config: Self =
            toml::from_str(&expanded).map_err(|e| SwitchyardError::Config(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    /// Reject settings that would make the engine misbehave.
    pub fn check(&self) -> Result<()> {
        if self.simulation.min_latency_ms > self.simulation.max_latency_ms {
            return Err(SwitchyardError::Config(format!(
                "simulation.min_latency_ms ({}) exceeds simulation.max_latency_ms ({})",
                self.simulation.min_latency_ms, self.simulation.max_latency_ms
            )));
        }
        if self.engine.max_depth == 0 {
            return Err(SwitchyardError::Config(
                "engine.max_depth must be at least 1".to_string(),
            ));
        }
        if self.webhooks.history_limit == 0 {
            return Err(SwitchyardError::Config(
                "webhooks.history_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the run log directory (expand ~). `None` when logging is off.
    pub fn log_dir(&self) -> Option<PathBuf> {
        let log = self.log.as_ref().filter(|l| l.enabled)?;
        if let Some(rest) = log.log_dir.strip_prefix("~/") {
            if let Some(home) = dirs_home() {
                return Some(home.join(rest));
            }
        }
        Some(PathBuf::from(&log.log_dir))
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
