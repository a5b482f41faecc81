//! Configuration management for the OpenRouter proxy.
//!
//! Configuration is read once from environment variables at process start
//! (a `.env` file is loaded first by the binary) and then shared by reference
//! with every request handler.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default upstream base URL.
pub const DEFAULT_UPSTREAM_BASE_URL: &str = "https://openrouter.ai";

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port)
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream provider configuration
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Optional path to a line-delimited model allow-list
    #[serde(default)]
    pub model_filter_file: Option<PathBuf>,
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

/// Settings for the single upstream provider.
#[derive(Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL, without the `/api/v1` suffix
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Server-held API key injected as a bearer credential
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Whether to verify TLS certificates for upstream requests
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,

    /// Per-call timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Connection establishment timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

// Hand-written so the credential never reaches a log line through `{:?}`.
impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("verify_ssl", &self.verify_ssl)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            verify_ssl: default_verify_ssl(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
            model_filter_file: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_base_url() -> String {
    DEFAULT_UPSTREAM_BASE_URL.to_string()
}

fn default_verify_ssl() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    300
}

fn default_connect_timeout() -> u64 {
    10
}

impl AppConfig {
    /// Load configuration from the process environment.
    ///
    /// Recognized variables: `OPENROUTER_API_KEY`, `DISABLE_SSL_VERIFY`,
    /// `MODEL_FILTER_FILE`, `HOST`, `PORT`, `OPENROUTER_BASE_URL`,
    /// `REQUEST_TIMEOUT_SECS` and `CONNECT_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = AppConfig::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(host) = non_empty("HOST") {
            config.server.host = host;
        }

        if let Some(port) = non_empty("PORT") {
            config.server.port = port
                .trim()
                .parse::<u16>()
                .with_context(|| format!("Invalid PORT value: {}", port))?;
        }

        config.upstream.api_key = non_empty("OPENROUTER_API_KEY");

        if let Some(disable) = non_empty("DISABLE_SSL_VERIFY") {
            config.upstream.verify_ssl = !str_to_bool(&disable);
        }

        if let Some(base_url) = non_empty("OPENROUTER_BASE_URL") {
            config.upstream.base_url = base_url.trim().trim_end_matches('/').to_string();
        }

        if let Some(timeout) = non_empty("REQUEST_TIMEOUT_SECS") {
            config.upstream.request_timeout_secs = timeout
                .trim()
                .parse::<u64>()
                .with_context(|| format!("Invalid REQUEST_TIMEOUT_SECS value: {}", timeout))?;
        }

        if let Some(timeout) = non_empty("CONNECT_TIMEOUT_SECS") {
            config.upstream.connect_timeout_secs = timeout
                .trim()
                .parse::<u64>()
                .with_context(|| format!("Invalid CONNECT_TIMEOUT_SECS value: {}", timeout))?;
        }

        config.model_filter_file = non_empty("MODEL_FILTER_FILE").map(PathBuf::from);

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the proxy cannot run with.
    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.upstream.base_url)
            .with_context(|| format!("Invalid upstream base URL: {}", self.upstream.base_url))?;
        if url.host_str().is_none() {
            return Err(anyhow!(
                "Upstream base URL has no host: {}",
                self.upstream.base_url
            ));
        }
        if self.upstream.request_timeout_secs == 0 {
            return Err(anyhow!("REQUEST_TIMEOUT_SECS must be greater than zero"));
        }
        Ok(())
    }

    /// Hostname used for the outbound `Host` header.
    ///
    /// Includes the port when the base URL names a non-default one.
    pub fn upstream_host(&self) -> String {
        match reqwest::Url::parse(&self.upstream.base_url) {
            Ok(url) => {
                let host = url.host_str().unwrap_or_default().to_string();
                match url.port() {
                    Some(port) => format!("{}:{}", host, port),
                    None => host,
                }
            }
            Err(_) => String::new(),
        }
    }
}

/// Convert string to boolean.
///
/// Accepts: "true", "1", "yes", "on" (case-insensitive)
pub fn str_to_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}
