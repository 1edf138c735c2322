//! Application configuration.
//!
//! Settings come from a TOML file (default `./config/kbsync.toml`) and a few
//! environment variables, usually loaded from `.env`:
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `OPENWEBUI_API_KEY` | Bearer token for the remote service (required for remote commands) |
//! | `OPENWEBUI_BASE_URL` | Overrides `remote.base_url` |
//! | `KBSYNC_REFRESH_INTERVAL` | Overrides `monitor.refresh_interval` |
//!
//! Every section is optional and falls back to the defaults below.
//!
//! ```toml
//! [paths]
//! root = "knowledge_bases"
//! config_file_name = "kbconfig.yaml"
//!
//! [remote]
//! base_url = "http://localhost:3000"
//!
//! [monitor]
//! refresh_interval = 60
//! poll_interval_secs = 2
//! max_poll_attempts = 10
//!
//! [server]
//! program = "open-webui"
//! args = ["serve", "--host", "0.0.0.0", "--port", "3000"]
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 60;

pub const API_KEY_ENV: &str = "OPENWEBUI_API_KEY";
pub const BASE_URL_ENV: &str = "OPENWEBUI_BASE_URL";
pub const REFRESH_INTERVAL_ENV: &str = "KBSYNC_REFRESH_INTERVAL";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    /// Directory holding one subfolder per knowledge base.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Where the per-unit lock files live.
    #[serde(default = "default_lock_dir")]
    pub lock_dir: PathBuf,
    #[serde(default = "default_config_file_name")]
    pub config_file_name: String,
    /// Extra glob patterns (matched against file names) that are never uploaded.
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            lock_dir: default_lock_dir(),
            config_file_name: default_config_file_name(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("knowledge_bases")
}
fn default_lock_dir() -> PathBuf {
    std::env::temp_dir()
}
fn default_config_file_name() -> String {
    "kbconfig.yaml".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Never read from the file; filled from `OPENWEBUI_API_KEY`.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            api_key: None,
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    /// Seconds between cycles. Kept as a raw value so that a malformed
    /// setting degrades to the default instead of failing startup.
    #[serde(default)]
    pub refresh_interval: Option<toml::Value>,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
    #[serde(default = "default_max_concurrent_uploads")]
    pub max_concurrent_uploads: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            refresh_interval: None,
            poll_interval_secs: default_poll_interval_secs(),
            max_poll_attempts: default_max_poll_attempts(),
            max_concurrent_uploads: default_max_concurrent_uploads(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    2
}
fn default_max_poll_attempts() -> u32 {
    10
}
fn default_max_concurrent_uploads() -> usize {
    4
}

impl MonitorConfig {
    /// Effective pause between cycles.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(refresh_interval_secs(self.refresh_interval.as_ref()))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Interpret a raw refresh interval. Missing, non-numeric, or non-positive
/// values fall back to [`DEFAULT_REFRESH_INTERVAL_SECS`].
pub fn refresh_interval_secs(raw: Option<&toml::Value>) -> u64 {
    let parsed = match raw {
        Some(toml::Value::Integer(n)) => u64::try_from(*n).ok(),
        Some(toml::Value::Float(f)) => whole_seconds(*f),
        Some(toml::Value::String(s)) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(whole_seconds))
        }
        _ => None,
    };
    match parsed {
        Some(secs) if secs > 0 => secs,
        _ => DEFAULT_REFRESH_INTERVAL_SECS,
    }
}

fn whole_seconds(f: f64) -> Option<u64> {
    (f.is_finite() && f >= 1.0).then(|| f.round() as u64)
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    #[serde(default = "default_restart_cooldown_secs")]
    pub restart_cooldown_secs: u64,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            restart_cooldown_secs: default_restart_cooldown_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

fn default_program() -> String {
    "open-webui".to_string()
}
fn default_args() -> Vec<String> {
    ["serve", "--host", "0.0.0.0", "--port", "3000"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_restart_cooldown_secs() -> u64 {
    5
}
fn default_shutdown_grace_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_file_size_limit_mb")]
    pub file_size_limit_mb: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            file_size_limit_mb: default_file_size_limit_mb(),
        }
    }
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}
fn default_file_size_limit_mb() -> u64 {
    10
}

impl LoggingConfig {
    pub fn file_size_limit_bytes(&self) -> u64 {
        self.file_size_limit_mb.saturating_mul(1024 * 1024)
    }
}

impl Config {
    /// Apply environment overrides using `lookup` to read variables.
    ///
    /// Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get(API_KEY_ENV) {
            self.remote.api_key = Some(key.trim().to_string());
        }
        if let Some(url) = get(BASE_URL_ENV) {
            self.remote.base_url = url.trim().to_string();
        }
        if let Some(raw) = get(REFRESH_INTERVAL_ENV) {
            self.monitor.refresh_interval = Some(toml::Value::String(raw));
        }
    }

    /// The bearer token, or an error naming the variable to set.
    pub fn api_key(&self) -> Result<&str> {
        self.remote
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("{} environment variable not set", API_KEY_ENV))
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.remote.base_url.starts_with("http://")
            || self.remote.base_url.starts_with("https://"))
        {
            bail!(
                "remote.base_url must start with http:// or https://, got '{}'",
                self.remote.base_url
            );
        }
        if self.monitor.max_poll_attempts == 0 {
            bail!("monitor.max_poll_attempts must be >= 1");
        }
        if self.monitor.max_concurrent_uploads == 0 {
            bail!("monitor.max_concurrent_uploads must be >= 1");
        }
        if self.paths.config_file_name.trim().is_empty() {
            bail!("paths.config_file_name must not be empty");
        }
        if self.server.program.trim().is_empty() {
            bail!("server.program must not be empty");
        }
        if self.logging.file_size_limit_mb == 0 {
            bail!("logging.file_size_limit_mb must be > 0");
        }
        Ok(())
    }
}

/// Read, parse, apply process environment, and validate.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    config.apply_env(|key| std::env::var(key).ok());
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn parse(src: &str) -> Config {
        toml::from_str(src).unwrap()
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let cfg = parse("");
        assert_eq!(cfg.paths.root, PathBuf::from("knowledge_bases"));
        assert_eq!(cfg.paths.config_file_name, "kbconfig.yaml");
        assert_eq!(cfg.remote.base_url, "http://localhost:3000");
        assert_eq!(cfg.monitor.refresh_interval(), Duration::from_secs(60));
        assert_eq!(cfg.monitor.poll_interval(), Duration::from_secs(2));
        assert_eq!(cfg.monitor.max_poll_attempts, 10);
        assert_eq!(cfg.server.program, "open-webui");
        assert_eq!(cfg.server.restart_cooldown_secs, 5);
        assert_eq!(cfg.logging.file_size_limit_bytes(), 10 * 1024 * 1024);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_refresh_interval_numeric() {
        let cfg = parse("[monitor]\nrefresh_interval = 15\n");
        assert_eq!(cfg.monitor.refresh_interval(), Duration::from_secs(15));
    }

    #[test]
    fn test_refresh_interval_numeric_string() {
        let cfg = parse("[monitor]\nrefresh_interval = \"30\"\n");
        assert_eq!(cfg.monitor.refresh_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_refresh_interval_fractional() {
        let cfg = parse("[monitor]\nrefresh_interval = 30.5\n");
        assert_eq!(cfg.monitor.refresh_interval(), Duration::from_secs(31));
        let cfg = parse("[monitor]\nrefresh_interval = \"30.5\"\n");
        assert_eq!(cfg.monitor.refresh_interval(), Duration::from_secs(31));
    }

    #[test]
    fn test_refresh_interval_env_fractional() {
        let mut cfg = parse("[monitor]\nrefresh_interval = 10\n");
        cfg.apply_env(|k| (k == REFRESH_INTERVAL_ENV).then(|| "30.5".to_string()));
        assert_eq!(cfg.monitor.refresh_interval(), Duration::from_secs(31));
    }

    #[test]
    fn test_refresh_interval_fallbacks() {
        for raw in ["\"soon\"", "0", "-5", "true", "\"\"", "0.5", "\"0.5\"", "\"NaN\"", "\"inf\""] {
            let cfg = parse(&format!("[monitor]\nrefresh_interval = {}\n", raw));
            assert_eq!(
                cfg.monitor.refresh_interval(),
                Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
                "value {} should fall back",
                raw
            );
        }
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (API_KEY_ENV, "sk-test"),
            (BASE_URL_ENV, "https://webui.example.com"),
            (REFRESH_INTERVAL_ENV, "abc"),
        ]
        .into_iter()
        .collect();

        let mut cfg = parse("[monitor]\nrefresh_interval = 10\n");
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.api_key().unwrap(), "sk-test");
        assert_eq!(cfg.remote.base_url, "https://webui.example.com");
        // non-numeric override falls back to the default, not to the file value
        assert_eq!(cfg.monitor.refresh_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_empty_env_values_ignored() {
        let mut cfg = parse("");
        cfg.apply_env(|_| Some("  ".to_string()));
        assert!(cfg.api_key().is_err());
        assert_eq!(cfg.remote.base_url, "http://localhost:3000");
    }

    #[test]
    fn test_api_key_not_read_from_file() {
        let cfg = parse("[remote]\napi_key = \"from-file\"\n");
        assert!(cfg.remote.api_key.is_none());
    }

    #[test]
    fn test_validation_errors() {
        let cfg = parse("[remote]\nbase_url = \"localhost:3000\"\n");
        assert!(cfg.validate().is_err());

        let cfg = parse("[monitor]\nmax_poll_attempts = 0\n");
        assert!(cfg.validate().is_err());

        let cfg = parse("[monitor]\nmax_concurrent_uploads = 0\n");
        assert!(cfg.validate().is_err());

        let cfg = parse("[server]\nprogram = \"\"\n");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Path::new("/nonexistent/kbsync.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
