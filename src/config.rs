//! Configuration system for twarchive.
//!
//! Provides layered configuration from multiple sources:
//!
//! 1. **Compiled defaults** - Sensible defaults built into the binary
//! 2. **User config file** - `~/.config/twarchive/config.toml`
//! 3. **Environment variables** - `TWARCHIVE_*` prefix
//! 4. **CLI arguments** - Highest priority, always wins
//!
//! # Example Configuration File
//!
//! ```toml
//! [paths]
//! site = "~/src/blog"
//!
//! [api]
//! bearer_token = "AAAA..."
//!
//! [walk]
//! max_recurse = 20
//! page_size = 200
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::DEFAULT_MAX_RECURSE;
use crate::api::{DEFAULT_BASE_URL, MAX_TIMELINE_PAGE};

/// Main configuration structure for twarchive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path-related configuration.
    pub paths: PathsConfig,
    /// Live API access.
    pub api: ApiConfig,
    /// Recursive walk behavior.
    pub walk: WalkConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Hugo site root.
    /// Environment variable: `TWARCHIVE_SITE`
    pub site: Option<PathBuf>,
}

/// Live API credentials and endpoint.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Environment variable: `TWARCHIVE_CONSUMER_KEY`
    pub consumer_key: Option<String>,
    /// Environment variable: `TWARCHIVE_CONSUMER_SECRET`
    pub consumer_secret: Option<String>,
    /// App-only bearer token; takes precedence over consumer credentials.
    /// Environment variable: `TWARCHIVE_BEARER_TOKEN`
    pub bearer_token: Option<String>,
    /// Environment variable: `TWARCHIVE_API_BASE_URL`
    pub base_url: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkConfig {
    /// How many quote/reply/retweet hops to follow.
    /// Environment variable: `TWARCHIVE_MAX_RECURSE`
    pub max_recurse: usize,
    /// Tweets per timeline request, at most 200.
    /// Environment variable: `TWARCHIVE_PAGE_SIZE`
    pub page_size: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            consumer_key: None,
            consumer_secret: None,
            bearer_token: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: format!("twarchive/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("consumer_key", &redact(self.consumer_key.as_deref()))
            .field("consumer_secret", &redact(self.consumer_secret.as_deref()))
            .field("bearer_token", &redact(self.bearer_token.as_deref()))
            .field("base_url", &self.base_url)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Show whether a secret is set without showing it.
#[must_use]
pub fn redact(secret: Option<&str>) -> &'static str {
    match secret {
        Some(s) if !s.is_empty() => "<set>",
        _ => "<unset>",
    }
}

impl ApiConfig {
    /// Whether any form of credentials is configured.
    #[must_use]
    pub const fn has_credentials(&self) -> bool {
        self.bearer_token.is_some()
            || (self.consumer_key.is_some() && self.consumer_secret.is_some())
    }
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            max_recurse: DEFAULT_MAX_RECURSE,
            page_size: MAX_TIMELINE_PAGE,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. User config file (~/.config/twarchive/config.toml)
    /// 3. Compiled defaults
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        config.apply_env_overrides(|key| std::env::var(key).ok());

        debug!("Configuration loaded: {:?}", config);
        config
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            debug!("Config file not found: {}", path.display());
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    info!("Loaded config from: {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            }
        }
    }

    fn load_user_config() -> Option<Self> {
        let config_path = Self::user_config_path()?;
        Self::load_from_file(&config_path)
    }

    /// Get the path to the user configuration file.
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("twarchive").join("config.toml"))
    }

    /// Apply environment overrides, reading variables through `lookup`.
    fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(site) = lookup("TWARCHIVE_SITE") {
            self.paths.site = Some(PathBuf::from(site));
        }

        if let Some(key) = lookup("TWARCHIVE_CONSUMER_KEY") {
            self.api.consumer_key = Some(key);
        }
        if let Some(secret) = lookup("TWARCHIVE_CONSUMER_SECRET") {
            self.api.consumer_secret = Some(secret);
        }
        if let Some(token) = lookup("TWARCHIVE_BEARER_TOKEN") {
            self.api.bearer_token = Some(token);
        }
        if let Some(url) = lookup("TWARCHIVE_API_BASE_URL") {
            self.api.base_url = url;
        }

        if let Some(n) = lookup("TWARCHIVE_MAX_RECURSE").and_then(|v| v.parse().ok()) {
            self.walk.max_recurse = n;
        }
        if let Some(n) = lookup("TWARCHIVE_PAGE_SIZE").and_then(|v| v.parse().ok()) {
            self.walk.page_size = n;
        }
    }

    /// Merge another config into this one (other takes precedence).
    fn merge(&mut self, other: Self) {
        if other.paths.site.is_some() {
            self.paths.site = other.paths.site;
        }

        if other.api.consumer_key.is_some() {
            self.api.consumer_key = other.api.consumer_key;
        }
        if other.api.consumer_secret.is_some() {
            self.api.consumer_secret = other.api.consumer_secret;
        }
        if other.api.bearer_token.is_some() {
            self.api.bearer_token = other.api.bearer_token;
        }
        self.api.base_url = other.api.base_url;
        self.api.user_agent = other.api.user_agent;

        self.walk.max_recurse = other.walk.max_recurse;
        self.walk.page_size = other.walk.page_size;
    }

    /// Site root, defaulting to the current directory.
    #[must_use]
    pub fn site_path(&self) -> PathBuf {
        self.paths.site.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Save the current configuration to the user config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined,
    /// the parent directory cannot be created, or the file cannot be written.
    pub fn save(&self) -> std::io::Result<PathBuf> {
        let config_path = Self::user_config_path().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine config directory",
            )
        })?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        std::fs::write(&config_path, content)?;
        info!("Saved config to: {}", config_path.display());
        Ok(config_path)
    }

    /// Generate a default configuration file content.
    #[must_use]
    pub fn default_config_content() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.walk.max_recurse, 20);
        assert_eq!(config.walk.page_size, 200);
        assert_eq!(config.api.base_url, "https://api.twitter.com");
        assert!(!config.api.has_credentials());
        assert_eq!(config.site_path(), PathBuf::from("."));
    }

    #[test]
    fn test_config_from_toml() {
        let parsed: Config = toml::from_str(
            r#"
[paths]
site = "/srv/blog"

[api]
consumer_key = "k"
consumer_secret = "s"

[walk]
max_recurse = 5
"#,
        )
        .unwrap();
        assert_eq!(parsed.paths.site, Some(PathBuf::from("/srv/blog")));
        assert!(parsed.api.has_credentials());
        assert_eq!(parsed.walk.max_recurse, 5);
        assert_eq!(parsed.walk.page_size, 200);
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config::default();
        base.api.bearer_token = Some("keep".into());
        let mut other = Config::default();
        other.walk.max_recurse = 3;
        other.paths.site = Some(PathBuf::from("/custom/site"));

        base.merge(other);

        assert_eq!(base.walk.max_recurse, 3);
        assert_eq!(base.paths.site, Some(PathBuf::from("/custom/site")));
        assert_eq!(base.api.bearer_token.as_deref(), Some("keep"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("TWARCHIVE_SITE", "/env/site"),
            ("TWARCHIVE_BEARER_TOKEN", "tok"),
            ("TWARCHIVE_MAX_RECURSE", "7"),
            ("TWARCHIVE_PAGE_SIZE", "not a number"),
        ]);
        let mut config = Config::default();
        config.apply_env_overrides(|key| env.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.site_path(), PathBuf::from("/env/site"));
        assert_eq!(config.api.bearer_token.as_deref(), Some("tok"));
        assert_eq!(config.walk.max_recurse, 7);
        assert_eq!(config.walk.page_size, 200);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = Config::default();
        config.api.consumer_secret = Some("hunter2".into());
        let shown = format!("{config:?}");
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("<set>"));
    }

    #[test]
    fn test_default_config_content() {
        let content = Config::default_config_content();
        assert!(content.contains("[api]"));
        assert!(content.contains("[walk]"));
    }
}
