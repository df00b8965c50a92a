use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Launcher configuration. Read-only: loaded from TOML, never written back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Manual binary paths
    #[serde(default)]
    pub binaries: BinariesConfig,

    /// Inference form defaults
    #[serde(default)]
    pub inference: InferenceConfig,

    /// Server form defaults
    #[serde(default)]
    pub server: ServerConfig,

    /// Process supervision settings
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Health polling settings
    #[serde(default)]
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BinariesConfig {
    /// Path to llama-cli; skips auto-detection when set
    #[serde(default)]
    pub cli: Option<PathBuf>,

    /// Path to llama-server; skips auto-detection when set
    #[serde(default)]
    pub server: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_top_k")]
    pub top_k: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_ctx_size")]
    pub ctx_size: u32,

    #[serde(default = "default_threads")]
    pub threads: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// How long a child gets to exit after SIGTERM before it is killed
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,

    /// Output lines buffered between the relay and the consumer
    #[serde(default = "default_output_buffer")]
    pub output_buffer: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Delay before the first poll
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,
}

fn default_max_tokens() -> u32 {
    512
}

fn default_temperature() -> f32 {
    0.8
}

fn default_top_p() -> f32 {
    0.95
}

fn default_top_k() -> u32 {
    40
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_ctx_size() -> u32 {
    4096
}

fn default_threads() -> u32 {
    8
}

fn default_grace_period_secs() -> u64 {
    5
}

fn default_output_buffer() -> usize {
    256
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_timeout_secs() -> u64 {
    2
}

fn default_initial_delay_secs() -> u64 {
    2
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            temperature: default_temperature(),
            ctx_size: default_ctx_size(),
            threads: default_threads(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace_period_secs(),
            output_buffer: default_output_buffer(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            timeout_secs: default_timeout_secs(),
            initial_delay_secs: default_initial_delay_secs(),
        }
    }
}

impl SupervisorConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }
}

impl Config {
    /// Load config from an explicit file, or from the default location if
    /// one exists there. Falls back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => match Self::config_path() {
                Some(path) if path.exists() => Self::load_from(&path),
                _ => Ok(Config::default()),
            },
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::parse(&content).with_context(|| format!("Invalid config file {:?}", path))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Default config file path: <config_dir>/llama-launcher/config.toml
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("llama-launcher").join("config.toml"))
    }

    /// Look up a dotted key, e.g. `server.port`
    pub fn get(&self, key: &str) -> Result<String> {
        let display_path = |path: &Option<PathBuf>| {
            path.as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        };

        match key {
            "binaries.cli" => Ok(display_path(&self.binaries.cli)),
            "binaries.server" => Ok(display_path(&self.binaries.server)),
            "inference.max_tokens" => Ok(self.inference.max_tokens.to_string()),
            "inference.temperature" => Ok(self.inference.temperature.to_string()),
            "inference.top_p" => Ok(self.inference.top_p.to_string()),
            "inference.top_k" => Ok(self.inference.top_k.to_string()),
            "server.host" => Ok(self.server.host.clone()),
            "server.port" => Ok(self.server.port.to_string()),
            "server.temperature" => Ok(self.server.temperature.to_string()),
            "server.ctx_size" => Ok(self.server.ctx_size.to_string()),
            "server.threads" => Ok(self.server.threads.to_string()),
            "supervisor.grace_period_secs" => Ok(self.supervisor.grace_period_secs.to_string()),
            "supervisor.output_buffer" => Ok(self.supervisor.output_buffer.to_string()),
            "monitor.poll_interval_secs" => Ok(self.monitor.poll_interval_secs.to_string()),
            "monitor.timeout_secs" => Ok(self.monitor.timeout_secs.to_string()),
            "monitor.initial_delay_secs" => Ok(self.monitor.initial_delay_secs.to_string()),
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.inference.max_tokens, 512);
        assert_eq!(config.supervisor.grace_period(), Duration::from_secs(5));
        assert_eq!(config.monitor.interval(), Duration::from_secs(5));
        assert_eq!(config.monitor.timeout(), Duration::from_secs(2));
        assert!(config.binaries.server.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::parse(
            r#"
            [binaries]
            server = "/opt/llama/llama-server"

            [server]
            port = 9001
            threads = 16
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9001);
        assert_eq!(config.server.threads, 16);
        assert_eq!(config.server.ctx_size, 4096);
        assert_eq!(
            config.binaries.server,
            Some(PathBuf::from("/opt/llama/llama-server"))
        );
    }

    #[test]
    fn test_invalid_toml() {
        assert!(Config::parse("[server]\nport = \"not a port\"").is_err());
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("launcher.toml");
        fs::write(&path, "[inference]\ntop_k = 20\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.inference.top_k, 20);

        assert!(Config::load(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn test_get_keys() {
        let config = Config::default();
        assert_eq!(config.get("server.port").unwrap(), "8080");
        assert_eq!(config.get("inference.temperature").unwrap(), "0.8");
        assert_eq!(config.get("binaries.cli").unwrap(), "");
        assert!(config.get("daemon.port").is_err());
    }
}
