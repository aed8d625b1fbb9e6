//! Client configuration

use std::fmt;
use std::time::Duration;

use crate::error::{EyeError, Result};

/// Connection settings for the Eye service
#[derive(Clone)]
pub struct ClientConfig {
    /// Service origin, e.g. `https://eye.example.com`
    pub host: String,
    /// Bearer token sent with every request
    pub bearer: String,
    /// API version, part of the base path
    pub version: u32,
    /// Upper bound for one request/response exchange
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            bearer: String::new(),
            version: 2,
            request_timeout: Duration::from_secs(30),
            user_agent: concat!("eye-client/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, bearer: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            bearer: bearer.into(),
            ..Default::default()
        }
    }

    /// Set the API version
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Read the configuration from `EYE_HOST`, `EYE_TOKEN`,
    /// `EYE_API_VERSION` and `EYE_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("EYE_HOST")
            .ok_or_else(|| EyeError::Config("EYE_HOST is not set".to_string()))?;
        let bearer = lookup("EYE_TOKEN")
            .ok_or_else(|| EyeError::Config("EYE_TOKEN is not set".to_string()))?;
        let mut config = Self::new(host, bearer);

        if let Some(raw) = lookup("EYE_API_VERSION") {
            config.version = raw.trim().parse().map_err(|_| {
                EyeError::Config(format!("EYE_API_VERSION is not a number: {}", raw))
            })?;
        }
        if let Some(raw) = lookup("EYE_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                EyeError::Config(format!("EYE_TIMEOUT_SECS is not a number: {}", raw))
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that the settings can produce a working client
    pub fn validate(&self) -> Result<()> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(EyeError::Config("host is empty".to_string()));
        }
        if !host.starts_with("http://") && !host.starts_with("https://") {
            return Err(EyeError::Config(format!(
                "host must start with http:// or https://: {}",
                host
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(EyeError::Config("request timeout is zero".to_string()));
        }
        Ok(())
    }

    /// `{host}/api/v{version}`
    pub fn base_uri(&self) -> String {
        format!(
            "{}/api/v{}",
            self.host.trim().trim_end_matches('/'),
            self.version
        )
    }
}

// The token stays out of logs
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("host", &self.host)
            .field("bearer", &"<redacted>")
            .field("version", &self.version)
            .field("request_timeout", &self.request_timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}
