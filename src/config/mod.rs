use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Upper bound on a single request's handling time in seconds (default: 30)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            api_port: default_api_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.api_port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file, created on first start
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./data/scheduler.db")
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Base URL of the Prometheus server holding host load samples
    #[serde(default = "default_prometheus_url")]
    pub prometheus_url: String,
    /// Instant query returning one load sample per host
    #[serde(default = "default_load_query")]
    pub load_query: String,
    /// How long a placement answer stays fresh in seconds (default: 15)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_metrics_timeout")]
    pub timeout_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            prometheus_url: default_prometheus_url(),
            load_query: default_load_query(),
            poll_interval_secs: default_poll_interval(),
            timeout_secs: default_metrics_timeout(),
        }
    }
}

fn default_prometheus_url() -> String {
    "http://127.0.0.1:9090".to_string()
}

fn default_load_query() -> String {
    "node_load1".to_string()
}

fn default_poll_interval() -> u64 {
    15
}

fn default_metrics_timeout() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Port the per-host agent listens on
    #[serde(default = "default_agent_port")]
    pub port: u16,
    #[serde(default = "default_agent_scheme")]
    pub scheme: String,
    /// Hard ceiling on a single agent call in seconds (default: 10)
    #[serde(default = "default_agent_timeout")]
    pub timeout_secs: u64,
    /// Send create/delete operations to the host agent. When off the
    /// scheduler only records intent and waits for status reports.
    #[serde(default)]
    pub dispatch: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            port: default_agent_port(),
            scheme: default_agent_scheme(),
            timeout_secs: default_agent_timeout(),
            dispatch: false,
        }
    }
}

impl AgentConfig {
    /// Base URL of the agent running on the host at `ip`. IPv6 literals are
    /// bracketed so the port stays separable.
    pub fn base_url(&self, ip: &str) -> String {
        match ip.parse::<IpAddr>() {
            Ok(IpAddr::V6(v6)) => format!("{}://[{}]:{}", self.scheme, v6, self.port),
            _ => format!("{}://{}:{}", self.scheme, ip, self.port),
        }
    }
}

fn default_agent_port() -> u16 {
    8443
}

fn default_agent_scheme() -> String {
    "http".to_string()
}

fn default_agent_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse configuration file")
    }
}
