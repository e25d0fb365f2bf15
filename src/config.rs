use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{FormPilotError, FormPilotResult};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub fill: FillConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Remote analysis is skipped entirely when false.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_backend_url")]
    pub url: String,
    /// Path of the duplex channel, joined onto `url` with a ws/wss scheme.
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Upper bound on instructions accepted from one remote plan.
    #[serde(default = "default_max_remote_instructions")]
    pub max_remote_instructions: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_backend_url(),
            ws_path: default_ws_path(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            max_remote_instructions: default_max_remote_instructions(),
        }
    }
}

impl BackendConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// `http://host:port` → `ws://host:port/ws`.
    /// The service URL with a trailing slash, so relative joins keep any
    /// path prefix.
    pub fn base_url(&self) -> FormPilotResult<url::Url> {
        let mut base = url::Url::parse(&self.url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(base)
    }

    pub fn ws_url(&self) -> FormPilotResult<url::Url> {
        let mut base = self.base_url()?;
        let scheme = if base.scheme() == "https" { "wss" } else { "ws" };
        base.set_scheme(scheme)
            .map_err(|_| FormPilotError::Config(format!("cannot derive ws url from '{}'", self.url)))?;
        Ok(base.join(self.ws_path.trim_start_matches('/'))?)
    }
}

/// Pacing of a fill batch. All values are milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillConfig {
    /// Uniform pause between instructions.
    #[serde(default = "default_field_delay_ms")]
    pub field_delay_ms: u64,
    /// Pause after scrolling a target into view.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_focus_delay_ms")]
    pub focus_delay_ms: u64,
    #[serde(default = "default_clear_delay_ms")]
    pub clear_delay_ms: u64,
    #[serde(default = "default_click_delay_ms")]
    pub click_delay_ms: u64,
    /// Wait for a custom dropdown to render its options after opening it.
    #[serde(default = "default_dropdown_open_delay_ms")]
    pub dropdown_open_delay_ms: u64,
}

impl Default for FillConfig {
    fn default() -> Self {
        Self {
            field_delay_ms: default_field_delay_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            focus_delay_ms: default_focus_delay_ms(),
            clear_delay_ms: default_clear_delay_ms(),
            click_delay_ms: default_click_delay_ms(),
            dropdown_open_delay_ms: default_dropdown_open_delay_ms(),
        }
    }
}

impl FillConfig {
    /// No pauses at all. Used by tests and by callers driving their own pacing.
    pub fn immediate() -> Self {
        Self {
            field_delay_ms: 0,
            settle_delay_ms: 0,
            focus_delay_ms: 0,
            clear_delay_ms: 0,
            click_delay_ms: 0,
            dropdown_open_delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Maximum nesting of shadow roots and iframes visited by a search.
    #[serde(default = "default_max_traversal_depth")]
    pub max_traversal_depth: usize,
    /// Re-run detection when the mutation watcher sees new form controls.
    #[serde(default = "default_true")]
    pub auto_detect: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            max_traversal_depth: default_max_traversal_depth(),
            auto_detect: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Overrides the platform data directory for profile and settings files.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_backend_url() -> String {
    "http://localhost:8000".into()
}

fn default_ws_path() -> String {
    "/ws".into()
}

fn default_reconnect_delay_ms() -> u64 {
    3000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_remote_instructions() -> usize {
    200
}

fn default_field_delay_ms() -> u64 {
    800
}

fn default_settle_delay_ms() -> u64 {
    300
}

fn default_focus_delay_ms() -> u64 {
    100
}

fn default_clear_delay_ms() -> u64 {
    50
}

fn default_click_delay_ms() -> u64 {
    200
}

fn default_dropdown_open_delay_ms() -> u64 {
    500
}

fn default_max_traversal_depth() -> usize {
    16
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Some(candidate);
            }
        }
    }

    let candidate = std::env::current_dir().ok()?.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Some(candidate);
    }
    None
}

/// Loads `config.toml`, or the built-in defaults when no file exists.
/// `FORMPILOT_BACKEND_URL` overrides the backend URL either way.
pub fn load_config() -> FormPilotResult<AppConfig> {
    let mut config = match resolve_config_path() {
        Some(path) => load_config_from(&path)?,
        None => {
            tracing::info!("no config.toml found; using defaults");
            AppConfig::default()
        }
    };
    if let Ok(url) = std::env::var("FORMPILOT_BACKEND_URL") {
        tracing::debug!(url = %url, "backend url overridden from environment");
        config.backend.url = url;
    }
    Ok(config)
}

pub fn load_config_from(path: &std::path::Path) -> FormPilotResult<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), backend = %config.backend.url, "config loaded");
    Ok(config)
}

pub fn save_config(config: &AppConfig) -> FormPilotResult<()> {
    let path = match resolve_config_path() {
        Some(p) => p,
        None => std::env::current_dir()?.join("config.toml"),
    };
    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}
