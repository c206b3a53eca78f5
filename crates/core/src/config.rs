//! Synchronization configuration.
//!
//! Credentials follow the `_env` pattern: the config file names an
//! environment variable holding the access token, and the secret is
//! resolved at runtime via [`SyncConfig::resolve_env_vars`]. Configuration
//! is an explicit struct handed to the orchestrator -- there is no ambient
//! global state.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::ConfigError;
use crate::git::client::Credentials;

/// Settings for one synchronization target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Username presented to the remote, when credentials are needed.
    #[serde(default)]
    pub username: Option<String>,

    /// Access token, resolved from `token_env` or set directly by the
    /// caller. Never written back to disk.
    #[serde(skip)]
    pub token: Option<String>,

    /// Environment variable holding the access token.
    #[serde(default)]
    pub token_env: Option<String>,

    /// Whether `commit_local_changes` defaults to amending the tip.
    #[serde(default)]
    pub amend: bool,

    /// Bound on fetch/push duration before the operation fails with a
    /// network error.
    #[serde(default = "default_network_timeout")]
    pub network_timeout_secs: u64,
}

fn default_network_timeout() -> u64 {
    30
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            username: None,
            token: None,
            token_env: None,
            amend: false,
            network_timeout_secs: default_network_timeout(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;
        let config: SyncConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        debug!(path = %path.display(), "loaded sync configuration");
        Ok(config)
    }

    /// Resolve the access token from `token_env` if it has not been set
    /// directly.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        if self.token.is_none() {
            if let Some(var) = &self.token_env {
                let value =
                    std::env::var(var).map_err(|_| ConfigError::EnvVarMissing(var.clone()))?;
                self.token = Some(value);
            }
        }
        Ok(())
    }

    /// Credentials for the repository client, if a token is available.
    pub fn credentials(&self) -> Option<Credentials> {
        self.token.as_ref().map(|token| Credentials {
            username: self.username.clone(),
            token: token.clone(),
        })
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SyncConfig::default();
        assert!(!config.amend);
        assert_eq!(config.network_timeout(), Duration::from_secs(30));
        assert!(config.credentials().is_none());
    }

    #[test]
    fn parses_toml() {
        let config: SyncConfig = toml::from_str(
            r#"
            username = "alice"
            token_env = "BIBSYNC_TOKEN"
            amend = true
            network_timeout_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.username.as_deref(), Some("alice"));
        assert_eq!(config.token_env.as_deref(), Some("BIBSYNC_TOKEN"));
        assert!(config.amend);
        assert_eq!(config.network_timeout_secs, 5);
    }

    #[test]
    fn missing_env_var_is_an_error() {
        let mut config = SyncConfig {
            token_env: Some("BIBSYNC_DEFINITELY_UNSET".into()),
            ..Default::default()
        };
        assert!(matches!(
            config.resolve_env_vars(),
            Err(ConfigError::EnvVarMissing(_))
        ));
    }

    #[test]
    fn direct_token_wins_over_env() {
        let mut config = SyncConfig {
            token: Some("direct".into()),
            token_env: Some("BIBSYNC_DEFINITELY_UNSET".into()),
            ..Default::default()
        };
        config.resolve_env_vars().unwrap();
        assert_eq!(config.credentials().unwrap().token, "direct");
    }
}
