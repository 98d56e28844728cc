//! Configuration management for httmcp
//!
//! Default config location: ./httmcp.toml

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub mcp: McpConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default)]
    pub cors: CorsConfig,
    /// Maximum request body size in bytes (default: 4MB)
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_max_body_size() -> usize {
    4 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            cors: CorsConfig::default(),
            max_body_size: default_max_body_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct CorsConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Allowed origins. Use "*" for any origin, or list specific origins.
    #[serde(default)]
    pub origins: Vec<String>,
}

/// Identity of this MCP server and where its session traffic goes.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct McpConfig {
    /// Server name, reported by `initialize` and used in redirect and publish paths
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    /// Route prefix. Defaults to `/mcp/{name}` when unset or empty.
    #[serde(default)]
    pub api_prefix: Option<String>,
    /// Base URL of the publish/subscribe server (e.g. nchan)
    #[serde(default)]
    pub publish_server: Option<String>,
    /// Internal location the reverse proxy serves session streams from
    #[serde(default = "default_redirect_base")]
    pub redirect_base: String,
}

fn default_name() -> String {
    "httmcp".to_string()
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_redirect_base() -> String {
    "/internal".to_string()
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            version: default_version(),
            api_prefix: None,
            publish_server: None,
            redirect_base: default_redirect_base(),
        }
    }
}

impl McpConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Effective route prefix, without a trailing slash
    pub fn prefix(&self) -> String {
        match self.api_prefix.as_deref().map(|p| p.trim_end_matches('/')) {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => format!("/mcp/{}", self.name),
        }
    }

    /// Path handed to clients as their per-session callback endpoint
    pub fn session_endpoint(&self, session_id: &str) -> String {
        format!("{}/{}", self.prefix(), session_id)
    }

    /// Internal redirect target for a session's stream
    pub fn redirect_target(&self, session_id: &str) -> String {
        format!(
            "{}/{}/{}",
            self.redirect_base.trim_end_matches('/'),
            self.name,
            session_id
        )
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PublishConfig {
    /// Timeout for a single publish attempt in milliseconds
    #[serde(default = "default_publish_timeout")]
    pub timeout_ms: u64,
}

fn default_publish_timeout() -> u64 {
    5000
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_publish_timeout(),
        }
    }
}

impl PublishConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct DispatchConfig {
    /// Deadline for a single handler invocation; the call is aborted once it passes
    #[serde(default)]
    pub handler_timeout_ms: Option<u64>,
}

impl DispatchConfig {
    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LoggingConfig {
    /// Append logs to this file instead of stderr
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log output format: "pretty" or "json"
    /// Override with LOG_FORMAT env var
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter string
    /// Override with RUST_LOG env var
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable Prometheus metrics at GET /metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_log_level() -> String {
    "info,httmcp=debug".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: default_log_format(),
            log_level: default_log_level(),
            metrics_enabled: true,
        }
    }
}

/// Characters the router reads as path parameters or wildcards
const ROUTE_SYNTAX: &[char] = &[':', '*', '{', '}'];

/// Expand ~ to home directory in path
pub fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
        Ok(home.join(rest))
    } else if s == "~" {
        dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))
    } else {
        Ok(path.to_path_buf())
    }
}

impl Config {
    /// Load config from file path, or create default
    pub fn load_or_create(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = fs::read_to_string(config_path)?;
            let mut config: Config = toml::from_str(&content)?;
            config.expand_paths()?;
            Ok(config)
        } else {
            let config = Config::default();
            // Try to save default config
            if let Some(parent) = config_path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            if let Err(e) = config.save(config_path) {
                tracing::warn!("Could not write default config to {:?}: {}", config_path, e);
            }
            Ok(config)
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    fn expand_paths(&mut self) -> Result<()> {
        if let Some(ref f) = self.logging.file {
            self.logging.file = Some(expand_tilde(f)?);
        }
        Ok(())
    }

    /// Reject configurations the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.mcp.name.is_empty() {
            return Err(anyhow!("mcp.name must not be empty"));
        }
        if self.mcp.name.contains('/') {
            return Err(anyhow!("mcp.name must not contain '/': {}", self.mcp.name));
        }
        if self.mcp.name.contains(ROUTE_SYNTAX) {
            return Err(anyhow!(
                "mcp.name must not contain route syntax (: * {{ }}): {}",
                self.mcp.name
            ));
        }
        if let Some(ref prefix) = self.mcp.api_prefix {
            if !prefix.is_empty() && !prefix.starts_with('/') {
                return Err(anyhow!("mcp.api_prefix must start with '/': {}", prefix));
            }
            if prefix.contains(ROUTE_SYNTAX) {
                return Err(anyhow!(
                    "mcp.api_prefix must not contain route syntax (: * {{ }}): {}",
                    prefix
                ));
            }
        }
        if let Some(ref server) = self.mcp.publish_server {
            if !(server.starts_with("http://") || server.starts_with("https://")) {
                return Err(anyhow!("mcp.publish_server must be an http(s) URL: {}", server));
            }
        }
        Ok(())
    }
}
