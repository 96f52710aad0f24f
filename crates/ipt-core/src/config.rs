use crate::capture::{CaptureError, CapturePattern, DEFAULT_CAPTURE_PATTERN};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExporterConfig {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub source: SourceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebConfig {
    /// `host:port`, or `:port` to listen on every interface
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    #[serde(default = "default_telemetry_path")]
    pub telemetry_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_capture_pattern")]
    pub pattern: String,
    /// Joins capturing groups when the pattern defines more than one
    #[serde(default)]
    pub separator: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_listen_address() -> String {
    ":9455".to_string()
}

fn default_telemetry_path() -> String {
    "/metrics".to_string()
}

fn default_capture_pattern() -> String {
    DEFAULT_CAPTURE_PATTERN.to_string()
}

fn default_program() -> String {
    "iptables-save".to_string()
}

fn default_args() -> Vec<String> {
    vec!["-c".to_string()]
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            telemetry_path: default_telemetry_path(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            pattern: default_capture_pattern(),
            separator: String::new(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ExporterConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).context("Failed to parse exporter config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read exporter config from {:?}", path))?;
        Self::from_yaml(&content)
    }

    pub fn validate(&self) -> Result<()> {
        let path = &self.web.telemetry_path;
        if !path.starts_with('/') || path == "/" {
            anyhow::bail!("Telemetry path must start with '/' and not be the root: {}", path);
        }
        if self.source.program.trim().is_empty() {
            anyhow::bail!("Rule source program must not be empty");
        }
        if self.source.timeout_secs == 0 {
            anyhow::bail!("Rule source timeout must be at least one second");
        }
        self.listen_socket_addr()?;
        Ok(())
    }

    /// Resolve the listen address, expanding `:port` to all interfaces
    pub fn listen_socket_addr(&self) -> Result<SocketAddr> {
        let addr = self.web.listen_address.trim();
        if let Some(port) = addr.strip_prefix(':') {
            let port: u16 = port
                .parse()
                .context(format!("Invalid port in listen address: {}", addr))?;
            return Ok(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)));
        }
        addr.parse::<SocketAddr>()
            .context(format!("Invalid listen address: {}", addr))
    }

    /// Compile the configured capture expression
    pub fn capture_pattern(&self) -> Result<CapturePattern, CaptureError> {
        CapturePattern::with_separator(&self.capture.pattern, &self.capture.separator)
    }
}
