//! Configuration management for the gateway.
//!
//! This module handles loading and parsing configuration from YAML files,
//! with support for environment variable expansion and overrides.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::sync::OnceLock;
use std::time::Duration;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port)
    #[serde(default)]
    pub server: ServerConfig,

    /// Whether to verify SSL certificates for upstream requests
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,

    /// Bound on a single upstream call (and stream set-up), in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Capacity of the relay hand-off channel
    #[serde(default = "default_relay_buffer_size")]
    pub relay_buffer_size: usize,

    /// Model prefix routing rules; the first matching prefix wins
    #[serde(default)]
    pub routes: Vec<RouteRule>,

    #[serde(default)]
    pub openai: VendorConfig,

    #[serde(default)]
    pub gemini: VendorConfig,
}

/// Route models starting with `prefix` to the provider registered as `provider`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    pub prefix: String,
    pub provider: String,
}

impl RouteRule {
    pub fn new(prefix: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            provider: provider.into(),
        }
    }
}

/// Per-vendor settings. An empty `api_key` disables the vendor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VendorConfig {
    #[serde(default)]
    pub api_key: String,

    /// Overrides the vendor's public endpoint when non-empty
    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub default_model: String,
}

impl VendorConfig {
    pub fn is_enabled(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// Server-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            verify_ssl: default_verify_ssl(),
            request_timeout_secs: default_request_timeout(),
            relay_buffer_size: default_relay_buffer_size(),
            routes: Vec::new(),
            openai: VendorConfig::default(),
            gemini: VendorConfig::default(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_verify_ssl() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    300
}

fn default_relay_buffer_size() -> usize {
    8
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use letllm_rust::core::config::AppConfig;
    ///
    /// let config = AppConfig::load("config.yaml").expect("Failed to load config");
    /// ```
    pub fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let mut config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse YAML content after expanding `${VAR}` references.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        let config: AppConfig = serde_yaml::from_str(&expanded)?;
        Ok(config)
    }

    /// Apply environment variable overrides (env vars take precedence).
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.is_empty() {
                self.openai.api_key = key;
            }
        }

        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            if !key.is_empty() {
                self.gemini.api_key = key;
            }
        }

        if let Ok(host) = std::env::var("HOST") {
            self.server.host = host;
        }

        if let Ok(port_str) = std::env::var("PORT") {
            if let Ok(port) = port_str.parse::<u16>() {
                self.server.port = port;
            }
        }

        if let Ok(verify_ssl_str) = std::env::var("VERIFY_SSL") {
            self.verify_ssl = str_to_bool(&verify_ssl_str);
        }

        if let Ok(timeout_str) = std::env::var("REQUEST_TIMEOUT_SECS") {
            if let Ok(timeout) = timeout_str.parse::<u64>() {
                self.request_timeout_secs = timeout;
            }
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([^}:]+)(?::-?([^}]*))?\}").expect("env var pattern is valid")
    })
}

/// Expand environment variables in configuration content.
///
/// Supports patterns: ${VAR}, ${VAR:-default}, ${VAR:default}
fn expand_env_vars(content: &str) -> String {
    env_var_pattern()
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            std::env::var(var_name).unwrap_or_else(|_| default_value.to_string())
        })
        .to_string()
}

/// Convert string to boolean.
///
/// Accepts: "true", "1", "yes", "on" (case-insensitive)
fn str_to_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}
