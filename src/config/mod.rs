use crate::controller::SENTINEL_MODEL;
use crate::core::error::ChatError;
use crate::session::PerformanceMode;
use crate::stream::DEFAULT_COALESCE_THRESHOLD;
use crate::transport::ollama::DEFAULT_USER_AGENT;
use crate::transport::{RetryPolicy, TransportSettings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the inference server URL.
pub const BASE_URL_ENV: &str = "OLLAMA_API_BASE_URL";

/// Only used when local development is explicitly requested.
pub const LOCAL_DEV_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub user_agent: String,
    pub list_timeout_secs: u64,
    pub generate_timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_backoff_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            list_timeout_secs: 10,
            generate_timeout_secs: 30,
            max_attempts: 3,
            retry_backoff_secs: 2,
        }
    }
}

impl TransportConfig {
    pub fn settings(&self) -> TransportSettings {
        TransportSettings {
            user_agent: self.user_agent.clone(),
            list_timeout: Duration::from_secs(self.list_timeout_secs),
            generate_timeout: Duration::from_secs(self.generate_timeout_secs),
            retry: RetryPolicy::new(
                self.max_attempts,
                Duration::from_secs(self.retry_backoff_secs),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: Option<String>,
    pub default_model: String,
    pub performance_mode: PerformanceMode,
    pub history_dir: Option<PathBuf>,
    pub coalesce_threshold: usize,
    pub transport: TransportConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: None,
            default_model: SENTINEL_MODEL.to_string(),
            performance_mode: PerformanceMode::default(),
            history_dir: None,
            coalesce_threshold: DEFAULT_COALESCE_THRESHOLD,
            transport: TransportConfig::default(),
        }
    }
}

impl Config {
    fn config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".ochat")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.yaml")
    }

    pub fn input_history_path() -> PathBuf {
        Self::config_dir().join("input_history.txt")
    }

    /// Loads `~/.ochat/config.yaml`, writing the defaults out if it does not exist.
    pub fn load() -> Result<Config, ChatError> {
        let path = Self::config_path();
        if path.exists() {
            return Self::load_from(&path);
        }

        let config = Config::default();
        // A read-only home must not prevent startup.
        let _ = config.save_to(&path);
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Config, ChatError> {
        let contents = fs::read_to_string(path)?;
        serde_yml::from_str::<Config>(&contents)
            .map_err(|e| ChatError::Configuration(format!("Parse {}: {}", path.display(), e)))
    }

    pub fn save(&self) -> Result<(), ChatError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ChatError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let yaml_content = serde_yml::to_string(self)?;
        fs::write(path, yaml_content)?;
        Ok(())
    }

    /// Where transcripts are written; the working directory unless configured.
    pub fn history_dir(&self) -> PathBuf {
        self.history_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Picks the server URL: flag, then environment, then config file. The
    /// local development default applies only when `allow_local` is set.
    pub fn resolve_base_url(
        &self,
        flag: Option<&str>,
        env: Option<String>,
        allow_local: bool,
    ) -> Result<String, ChatError> {
        let candidate = flag
            .map(str::to_string)
            .or(env)
            .or_else(|| self.base_url.clone())
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());

        let url = match candidate {
            Some(url) => url,
            None if allow_local => LOCAL_DEV_BASE_URL.to_string(),
            None => {
                return Err(ChatError::Configuration(format!(
                    "{} is not set (use --base-url, set it in {}, or pass --local for {})",
                    BASE_URL_ENV,
                    Self::config_path().display(),
                    LOCAL_DEV_BASE_URL
                )));
            }
        };

        let parsed = reqwest::Url::parse(&url)
            .map_err(|e| ChatError::Configuration(format!("invalid base URL '{}': {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ChatError::Configuration(format!(
                "base URL must use http or https: {}",
                url
            )));
        }

        Ok(url.trim_end_matches('/').to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_wins_over_env_and_file() {
        let config = Config {
            base_url: Some("http://file:1".into()),
            ..Default::default()
        };
        let url = config
            .resolve_base_url(Some("http://flag:1/"), Some("http://env:1".into()), false)
            .unwrap();
        assert_eq!(url, "http://flag:1");
    }

    #[test]
    fn env_wins_over_file() {
        let config = Config {
            base_url: Some("http://file:1".into()),
            ..Default::default()
        };
        let url = config
            .resolve_base_url(None, Some("https://abc.ngrok-free.app".into()), false)
            .unwrap();
        assert_eq!(url, "https://abc.ngrok-free.app");
    }

    #[test]
    fn missing_url_is_a_configuration_error() {
        let err = Config::default()
            .resolve_base_url(None, None, false)
            .unwrap_err();
        assert!(matches!(err, ChatError::Configuration(_)));
        assert!(err.to_string().contains(BASE_URL_ENV));
    }

    #[test]
    fn blank_env_counts_as_missing() {
        assert!(
            Config::default()
                .resolve_base_url(None, Some("  ".into()), false)
                .is_err()
        );
    }

    #[test]
    fn local_default_requires_opt_in() {
        let url = Config::default().resolve_base_url(None, None, true).unwrap();
        assert_eq!(url, LOCAL_DEV_BASE_URL);
    }

    #[test]
    fn rejects_non_http_urls() {
        let config = Config::default();
        assert!(config.resolve_base_url(Some("ftp://host"), None, false).is_err());
        assert!(config.resolve_base_url(Some("not a url"), None, false).is_err());
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "default_model: llama3\nperformance_mode: quality_first\ntransport:\n  max_attempts: 5\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.default_model, "llama3");
        assert_eq!(config.performance_mode, PerformanceMode::QualityFirst);
        assert_eq!(config.transport.max_attempts, 5);
        assert_eq!(config.transport.list_timeout_secs, 10);
        assert_eq!(config.coalesce_threshold, 50);
    }

    #[test]
    fn save_then_load_is_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        let config = Config {
            base_url: Some("http://gpu-box:11434".into()),
            history_dir: Some(PathBuf::from("/tmp/chats")),
            ..Default::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn malformed_yaml_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "transport: [unclosed").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ChatError::Configuration(_))
        ));
    }

    #[test]
    fn transport_settings_follow_config() {
        let settings = TransportConfig::default().settings();
        assert_eq!(settings.list_timeout, Duration::from_secs(10));
        assert_eq!(settings.generate_timeout, Duration::from_secs(30));
        assert_eq!(settings.retry, RetryPolicy::default());
    }
}
