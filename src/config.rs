//! Application-level configuration loading.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "TEAMFINDER_BACK_CONFIG_PATH";
/// Environment variable holding the HS256 secret used to verify bearer tokens.
const JWT_SECRET_ENV: &str = "JWT_SECRET";
/// Development-only secret used when `JWT_SECRET` is unset.
const DEV_JWT_SECRET: &str = "teamfinder-dev-secret";

const DEFAULT_MESSAGE_PAGE_SIZE: usize = 50;
const DEFAULT_TOKEN_LEEWAY_SECS: u64 = 30;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Number of most recent messages returned by a conversation history read.
    pub message_page_size: usize,
    /// Clock skew tolerated when checking token expiry.
    pub token_leeway_secs: u64,
    /// Secret bearer tokens are signed with.
    pub jwt_secret: String,
}

impl AppConfig {
    /// Load the configuration from disk and the environment, falling back to defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let mut config = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    info!(path = %path.display(), "loaded application config");
                    raw.into()
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };

        match env::var(JWT_SECRET_ENV) {
            Ok(secret) if !secret.is_empty() => config.jwt_secret = secret,
            _ if config.jwt_secret == DEV_JWT_SECRET => {
                warn!("JWT_SECRET is not set; using the development secret");
            }
            _ => {}
        }

        config
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            message_page_size: DEFAULT_MESSAGE_PAGE_SIZE,
            token_leeway_secs: DEFAULT_TOKEN_LEEWAY_SECS,
            jwt_secret: DEV_JWT_SECRET.to_owned(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    message_page_size: Option<usize>,
    token_leeway_secs: Option<u64>,
    jwt_secret: Option<String>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = Self::default();
        Self {
            message_page_size: value
                .message_page_size
                .filter(|size| *size > 0)
                .unwrap_or(defaults.message_page_size),
            token_leeway_secs: value.token_leeway_secs.unwrap_or(defaults.token_leeway_secs),
            jwt_secret: value
                .jwt_secret
                .filter(|secret| !secret.is_empty())
                .unwrap_or(defaults.jwt_secret),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let raw: RawConfig = serde_json::from_str(r#"{"message_page_size": 20}"#).unwrap();
        let config = AppConfig::from(raw);
        assert_eq!(config.message_page_size, 20);
        assert_eq!(config.token_leeway_secs, DEFAULT_TOKEN_LEEWAY_SECS);
        assert_eq!(config.jwt_secret, DEV_JWT_SECRET);
    }

    #[test]
    fn zero_page_size_is_ignored() {
        let raw: RawConfig = serde_json::from_str(r#"{"message_page_size": 0}"#).unwrap();
        assert_eq!(
            AppConfig::from(raw).message_page_size,
            DEFAULT_MESSAGE_PAGE_SIZE
        );
    }
}
