use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::io::ConfigError;
use crate::core::stream_client::ClientConfig;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434/api/generate";
pub const DEFAULT_MODEL: &str = "llama3:8b";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 300;

pub const ENV_ENDPOINT: &str = "LLAMACHAT_ENDPOINT";
pub const ENV_MODEL: &str = "LLAMACHAT_MODEL";

/// On-disk configuration. Every key is optional; unset keys fall back to the
/// built-in defaults when resolved.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    /// Full URL of the generate endpoint
    pub endpoint: Option<String>,
    /// Model identifier sent with every request
    pub model: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    /// Longest silence tolerated between two reads of the response body
    pub read_timeout_secs: Option<u64>,
}

/// Values supplied on the command line. They win over the file and the
/// environment.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub read_timeout_secs: Option<u64>,
}

impl Config {
    /// A config with every key spelled out, used by `config init`.
    pub fn with_defaults() -> Self {
        Config {
            endpoint: Some(DEFAULT_ENDPOINT.to_string()),
            model: Some(DEFAULT_MODEL.to_string()),
            connect_timeout_secs: Some(DEFAULT_CONNECT_TIMEOUT_SECS),
            read_timeout_secs: Some(DEFAULT_READ_TIMEOUT_SECS),
        }
    }

    pub fn resolve(&self, overrides: &Overrides) -> Result<ClientConfig, ConfigError> {
        self.resolve_with_env(overrides, |key| std::env::var(key).ok())
    }

    pub fn resolve_with_env<F>(
        &self,
        overrides: &Overrides,
        env: F,
    ) -> Result<ClientConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = overrides
            .endpoint
            .clone()
            .or_else(|| env(ENV_ENDPOINT).filter(|v| !v.trim().is_empty()))
            .or_else(|| self.endpoint.clone())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let model = overrides
            .model
            .clone()
            .or_else(|| env(ENV_MODEL).filter(|v| !v.trim().is_empty()))
            .or_else(|| self.model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let connect_timeout_secs = overrides
            .connect_timeout_secs
            .or(self.connect_timeout_secs)
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);
        let read_timeout_secs = overrides
            .read_timeout_secs
            .or(self.read_timeout_secs)
            .unwrap_or(DEFAULT_READ_TIMEOUT_SECS);

        validate_endpoint(&endpoint)?;
        if model.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "model",
                reason: "must not be empty".to_string(),
            });
        }
        if connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "connect_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if read_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "read_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(ClientConfig {
            endpoint,
            model: model.trim().to_string(),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            read_timeout: Duration::from_secs(read_timeout_secs),
        })
    }

    pub fn print_all(&self) {
        println!("Current configuration:");
        match &self.endpoint {
            Some(endpoint) => println!("  endpoint: {endpoint}"),
            None => println!("  endpoint: (unset, default {DEFAULT_ENDPOINT})"),
        }
        match &self.model {
            Some(model) => println!("  model: {model}"),
            None => println!("  model: (unset, default {DEFAULT_MODEL})"),
        }
        match self.connect_timeout_secs {
            Some(secs) => println!("  connect-timeout: {secs}s"),
            None => println!("  connect-timeout: (unset, default {DEFAULT_CONNECT_TIMEOUT_SECS}s)"),
        }
        match self.read_timeout_secs {
            Some(secs) => println!("  read-timeout: {secs}s"),
            None => println!("  read-timeout: (unset, default {DEFAULT_READ_TIMEOUT_SECS}s)"),
        }
    }
}

fn validate_endpoint(endpoint: &str) -> Result<(), ConfigError> {
    let url = reqwest::Url::parse(endpoint).map_err(|err| ConfigError::Invalid {
        key: "endpoint",
        reason: format!("{endpoint:?} is not a valid URL ({err})"),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::Invalid {
            key: "endpoint",
            reason: format!("unsupported scheme {other:?}, expected http or https"),
        }),
    }
}

/// Display a path relative to the home directory when possible.
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
