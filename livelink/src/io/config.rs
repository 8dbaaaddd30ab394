//! Settings resolution: TOML config file merged with environment overrides.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Environment variable overriding `api_url`.
pub const ENV_API_URL: &str = "IMMICH_URL";
/// Environment variable overriding `api_key`.
pub const ENV_API_KEY: &str = "IMMICH_API_KEY";

/// Default config file path used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// On-disk configuration (TOML).
///
/// Every field is optional in the file; missing fields fall back to defaults
/// and `api_url`/`api_key` may come from the environment instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    /// Server base URL, e.g. `http://immich.local:2283`.
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    /// Directory receiving ledger CSV files.
    pub output_dir: String,
    /// Maximum creation-time gap between a photo and its video, in seconds.
    pub match_tolerance_secs: f64,
    /// Assets requested per listing page.
    pub page_size: u32,
    pub request_timeout_secs: u64,
    /// Pause before the single retry of a transient failure.
    pub retry_backoff_ms: u64,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            output_dir: "output".to_string(),
            match_tolerance_secs: 3.0,
            page_size: 1000,
            request_timeout_secs: 30,
            retry_backoff_ms: 1000,
        }
    }
}

/// Fully resolved, immutable settings passed to every component.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_url: String,
    pub api_key: String,
    pub output_dir: std::path::PathBuf,
    pub match_tolerance: Duration,
    pub page_size: u32,
    pub request_timeout: Duration,
    pub retry_backoff: Duration,
}

impl FileConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.match_tolerance_secs.is_finite() || self.match_tolerance_secs < 0.0 {
            return Err(anyhow!("match_tolerance_secs must be a non-negative number"));
        }
        if self.page_size == 0 {
            return Err(anyhow!("page_size must be > 0"));
        }
        if self.request_timeout_secs == 0 {
            return Err(anyhow!("request_timeout_secs must be > 0"));
        }
        if self.output_dir.trim().is_empty() {
            return Err(anyhow!("output_dir must not be empty"));
        }
        Ok(())
    }
}

/// Load the config file.
///
/// If the file is missing, returns `FileConfig::default()`.
pub fn load_file_config(path: &Path) -> Result<FileConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config file missing, using defaults");
        return Ok(FileConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: FileConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

/// Merge file values with environment overrides and validate the result.
///
/// `env` is the variable lookup (normally `std::env::var(..).ok()`); a
/// non-empty environment value wins over the file.
pub fn resolve_settings<F>(file: FileConfig, env: F) -> Result<Settings>
where
    F: Fn(&str) -> Option<String>,
{
    file.validate()?;

    let pick = |name: &str, from_file: Option<String>| -> Option<String> {
        env(name)
            .filter(|value| !value.trim().is_empty())
            .or(from_file)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    let api_url = pick(ENV_API_URL, file.api_url)
        .ok_or_else(|| anyhow!("missing api_url (set it in the config file or {ENV_API_URL})"))?;
    let api_key = pick(ENV_API_KEY, file.api_key)
        .ok_or_else(|| anyhow!("missing api_key (set it in the config file or {ENV_API_KEY})"))?;

    let match_tolerance = Duration::try_from_secs_f64(file.match_tolerance_secs)
        .map_err(|err| anyhow!("match_tolerance_secs out of range: {err}"))?;

    Ok(Settings {
        api_url: api_url.trim_end_matches('/').to_string(),
        api_key,
        output_dir: file.output_dir.into(),
        match_tolerance,
        page_size: file.page_size,
        request_timeout: Duration::from_secs(file.request_timeout_secs),
        retry_backoff: Duration::from_millis(file.retry_backoff_ms),
    })
}

/// Load `path` and resolve it against `env`.
pub fn load_settings<F>(path: &Path, env: F) -> Result<Settings>
where
    F: Fn(&str) -> Option<String>,
{
    let file = load_file_config(path)?;
    resolve_settings(file, env).with_context(|| format!("resolve settings from {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_file_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, FileConfig::default());
    }

    #[test]
    fn file_values_resolve_into_settings() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "api_url = \"http://immich.local:2283/\"\napi_key = \"secret\"\nmatch_tolerance_secs = 1.5\n",
        )
        .expect("write config");

        let settings = load_settings(&path, no_env).expect("settings");
        assert_eq!(settings.api_url, "http://immich.local:2283");
        assert_eq!(settings.api_key, "secret");
        assert_eq!(settings.match_tolerance, Duration::from_millis(1500));
        assert_eq!(settings.output_dir, std::path::PathBuf::from("output"));
        assert_eq!(settings.page_size, 1000);
    }

    #[test]
    fn environment_overrides_file() {
        let file = FileConfig {
            api_url: Some("http://from-file".to_string()),
            api_key: Some("file-key".to_string()),
            ..FileConfig::default()
        };
        let settings = resolve_settings(file, |name| match name {
            ENV_API_KEY => Some("env-key".to_string()),
            ENV_API_URL => Some("   ".to_string()),
            _ => None,
        })
        .expect("settings");
        assert_eq!(settings.api_key, "env-key");
        assert_eq!(settings.api_url, "http://from-file");
    }

    #[test]
    fn missing_credentials_are_rejected() {
        let err = resolve_settings(FileConfig::default(), no_env).expect_err("no url");
        assert!(err.to_string().contains("api_url"));

        let file = FileConfig {
            api_url: Some("http://x".to_string()),
            ..FileConfig::default()
        };
        let err = resolve_settings(file, no_env).expect_err("no key");
        assert!(err.to_string().contains("api_key"));
    }

    #[test]
    fn invalid_values_fail_validation() {
        let file = FileConfig {
            page_size: 0,
            ..FileConfig::default()
        };
        assert!(file.validate().is_err());

        let file = FileConfig {
            match_tolerance_secs: -1.0,
            ..FileConfig::default()
        };
        assert!(file.validate().is_err());
    }

    #[test]
    fn huge_tolerance_is_an_error_not_a_panic() {
        let file = FileConfig {
            api_url: Some("http://x".to_string()),
            api_key: Some("k".to_string()),
            match_tolerance_secs: 1e30,
            ..FileConfig::default()
        };
        let err = resolve_settings(file, no_env).expect_err("out of range");
        assert!(err.to_string().contains("match_tolerance_secs"), "{err}");
    }

    #[test]
    fn malformed_file_reports_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "page_size = \"many\"\n").expect("write config");
        let err = load_file_config(&path).expect_err("bad toml");
        assert!(format!("{err:#}").contains("config.toml"));
    }
}
