use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::AppError;
use crate::sync::RetryPolicy;

pub const DEFAULT_GRAPH_URL: &str = "https://graph.microsoft.com/v1.0";
pub const DEFAULT_TASK_LIST_NAME: &str = "Canvas Assignments";
pub const DEFAULT_DATABASE_PATH: &str = "data/sync_state.db";

#[derive(Clone)]
pub struct CanvasConfig {
    pub base_url: String,
    pub access_token: String,
}

impl fmt::Debug for CanvasConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CanvasConfig")
            .field("base_url", &self.base_url)
            .field("access_token", &"***REDACTED***")
            .finish()
    }
}

#[derive(Clone)]
pub struct OutlookConfig {
    pub graph_url: String,
    pub access_token: String,
}

impl fmt::Debug for OutlookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutlookConfig")
            .field("graph_url", &self.graph_url)
            .field("access_token", &"***REDACTED***")
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub task_list_name: String,
    pub dry_run: bool,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl SyncConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            base_delay: self.retry_delay,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub canvas: CanvasConfig,
    pub outlook: OutlookConfig,
    pub sync: SyncConfig,
    pub database_path: PathBuf,
    pub http_timeout: Duration,
}

/// Loads `.env` (or `env_file`) into the process environment.
pub fn load_env(env_file: Option<&Path>) -> Result<(), AppError> {
    match env_file {
        Some(path) => {
            dotenvy::from_path(path).map_err(|e| {
                AppError::Config(format!("Failed to load {}: {}", path.display(), e))
            })?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }
    Ok(())
}

impl Settings {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds settings from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| AppError::Config(format!("{} is not set", key)))
        };
        let optional = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let base_url = required("CANVAS_BASE_URL")?.trim_end_matches('/').to_string();
        if !base_url.starts_with("https://") {
            return Err(AppError::Config("CANVAS_BASE_URL must use HTTPS".to_string()));
        }

        let canvas = CanvasConfig {
            base_url,
            access_token: required("CANVAS_ACCESS_TOKEN")?,
        };

        let outlook = OutlookConfig {
            graph_url: optional("MICROSOFT_GRAPH_URL", DEFAULT_GRAPH_URL)
                .trim_end_matches('/')
                .to_string(),
            access_token: required("MICROSOFT_ACCESS_TOKEN")?,
        };

        let max_retries = optional("SYNC_MAX_RETRIES", "3")
            .parse::<u32>()
            .map_err(|e| AppError::Config(format!("SYNC_MAX_RETRIES is invalid: {}", e)))?;
        if max_retries == 0 {
            return Err(AppError::Config("SYNC_MAX_RETRIES must be at least 1".to_string()));
        }

        let retry_delay = optional("SYNC_RETRY_DELAY", "1.0")
            .parse::<f64>()
            .ok()
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .ok_or_else(|| {
                AppError::Config("SYNC_RETRY_DELAY must be a non-negative number".to_string())
            })?;

        let sync = SyncConfig {
            task_list_name: optional("SYNC_TASK_LIST_NAME", DEFAULT_TASK_LIST_NAME),
            dry_run: optional("SYNC_DRY_RUN", "false").eq_ignore_ascii_case("true"),
            max_retries,
            retry_delay,
        };

        let http_timeout = optional("HTTP_TIMEOUT_SECS", "30")
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| AppError::Config(format!("HTTP_TIMEOUT_SECS is invalid: {}", e)))?;

        Ok(Self {
            canvas,
            outlook,
            sync,
            database_path: PathBuf::from(optional("STORAGE_DATABASE_PATH", DEFAULT_DATABASE_PATH)),
            http_timeout,
        })
    }
}

/// Path-only settings for commands that never reach the network.
pub fn database_path_from_env() -> PathBuf {
    env::var("STORAGE_DATABASE_PATH")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("CANVAS_BASE_URL", "https://canvas.example.com/"),
        ("CANVAS_ACCESS_TOKEN", "canvas-secret"),
        ("MICROSOFT_ACCESS_TOKEN", "graph-secret"),
    ];

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup_from(REQUIRED)).expect("settings");

        assert_eq!(settings.canvas.base_url, "https://canvas.example.com");
        assert_eq!(settings.outlook.graph_url, DEFAULT_GRAPH_URL);
        assert_eq!(settings.sync.task_list_name, "Canvas Assignments");
        assert!(!settings.sync.dry_run);
        assert_eq!(settings.sync.max_retries, 3);
        assert_eq!(settings.sync.retry_delay, Duration::from_secs(1));
        assert_eq!(settings.database_path, PathBuf::from("data/sync_state.db"));
        assert_eq!(settings.http_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_overrides() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("SYNC_DRY_RUN", "TRUE"),
            ("SYNC_MAX_RETRIES", "5"),
            ("SYNC_RETRY_DELAY", "0.25"),
            ("SYNC_TASK_LIST_NAME", "School"),
        ]);
        let settings = Settings::from_lookup(lookup_from(&pairs)).expect("settings");

        assert!(settings.sync.dry_run);
        assert_eq!(settings.sync.retry_policy().max_attempts, 5);
        assert_eq!(settings.sync.retry_policy().base_delay, Duration::from_millis(250));
        assert_eq!(settings.sync.task_list_name, "School");
    }

    #[test]
    fn test_missing_token_is_config_error() {
        let pairs = [("CANVAS_BASE_URL", "https://canvas.example.com")];
        let err = Settings::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(matches!(err, AppError::Config(msg) if msg.contains("CANVAS_ACCESS_TOKEN")));
    }

    #[test]
    fn test_rejects_plain_http_and_zero_retries() {
        let mut pairs = REQUIRED.to_vec();
        pairs[0] = ("CANVAS_BASE_URL", "http://canvas.example.com");
        assert!(Settings::from_lookup(lookup_from(&pairs)).is_err());

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("SYNC_MAX_RETRIES", "0"));
        assert!(Settings::from_lookup(lookup_from(&pairs)).is_err());

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("SYNC_RETRY_DELAY", "-1"));
        assert!(Settings::from_lookup(lookup_from(&pairs)).is_err());
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let settings = Settings::from_lookup(lookup_from(REQUIRED)).expect("settings");
        let rendered = format!("{:?}", settings);
        assert!(!rendered.contains("canvas-secret"));
        assert!(!rendered.contains("graph-secret"));
        assert!(rendered.contains("REDACTED"));
    }
}
