use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::config::StorageConfig;
use crate::errors::{FormPilotError, FormPilotResult};
use crate::profile::types::{Settings, UserProfile};

const PROFILE_FILE: &str = "profile.json";
const SETTINGS_FILE: &str = "settings.json";

/// Whole-record persistence for the profile and settings. No partial writes,
/// no schema versioning.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// `None` when nothing has been saved yet.
    async fn load_profile(&self) -> FormPilotResult<Option<UserProfile>>;

    async fn save_profile(&self, profile: &UserProfile) -> FormPilotResult<()>;

    async fn load_settings(&self) -> FormPilotResult<Option<Settings>>;

    async fn save_settings(&self, settings: &Settings) -> FormPilotResult<()>;
}

/// The stored profile, or the first-run defaults when the store is empty or unreadable.
pub async fn profile_or_first_run(store: &dyn ProfileStore) -> UserProfile {
    match store.load_profile().await {
        Ok(Some(profile)) => profile,
        Ok(None) => UserProfile::first_run(),
        Err(e) => {
            tracing::error!(error = %e, "failed to load profile; using first-run defaults");
            UserProfile::first_run()
        }
    }
}

pub async fn settings_or_default(store: &dyn ProfileStore) -> Settings {
    match store.load_settings().await {
        Ok(Some(settings)) => settings,
        Ok(None) => Settings::default(),
        Err(e) => {
            tracing::error!(error = %e, "failed to load settings; using defaults");
            Settings::default()
        }
    }
}

/// JSON files in a data directory: `profile.json` and `settings.json`.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Uses `storage.data_dir` when set, otherwise the platform data directory.
    pub fn from_config(storage: &StorageConfig) -> Self {
        let dir = storage.data_dir.clone().unwrap_or_else(data_dir_or_cwd);
        tracing::debug!(dir = %dir.display(), "profile store directory");
        Self::new(dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn read_json<T: serde::de::DeserializeOwned>(&self, name: &str) -> FormPilotResult<Option<T>> {
        let path = self.dir.join(name);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let value = serde_json::from_str(&content).map_err(|e| {
            FormPilotError::Storage(format!("{} is not valid: {e}", path.display()))
        })?;
        Ok(Some(value))
    }

    /// Write to a sibling temp file, then rename over the target.
    async fn write_json<T: serde::Serialize>(&self, name: &str, value: &T) -> FormPilotResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(name);
        let tmp = self.dir.join(format!("{name}.tmp"));
        let content = serde_json::to_string_pretty(value)?;
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::debug!(path = %path.display(), "record saved");
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for JsonFileStore {
    async fn load_profile(&self) -> FormPilotResult<Option<UserProfile>> {
        self.read_json(PROFILE_FILE).await
    }

    async fn save_profile(&self, profile: &UserProfile) -> FormPilotResult<()> {
        self.write_json(PROFILE_FILE, profile).await
    }

    async fn load_settings(&self) -> FormPilotResult<Option<Settings>> {
        self.read_json(SETTINGS_FILE).await
    }

    async fn save_settings(&self, settings: &Settings) -> FormPilotResult<()> {
        self.write_json(SETTINGS_FILE, settings).await
    }
}

/// Process-local store for tests and embedding hosts that persist elsewhere.
#[derive(Default)]
pub struct MemoryStore {
    profile: RwLock<Option<UserProfile>>,
    settings: RwLock<Option<Settings>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(profile: UserProfile) -> Self {
        Self {
            profile: RwLock::new(Some(profile)),
            settings: RwLock::new(None),
        }
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn load_profile(&self) -> FormPilotResult<Option<UserProfile>> {
        Ok(self.profile.read().await.clone())
    }

    async fn save_profile(&self, profile: &UserProfile) -> FormPilotResult<()> {
        *self.profile.write().await = Some(profile.clone());
        Ok(())
    }

    async fn load_settings(&self) -> FormPilotResult<Option<Settings>> {
        Ok(self.settings.read().await.clone())
    }

    async fn save_settings(&self, settings: &Settings) -> FormPilotResult<()> {
        *self.settings.write().await = Some(settings.clone());
        Ok(())
    }
}

/// `~/.local/share/formpilot` (or the platform equivalent), falling back to
/// the current working directory.
fn data_dir_or_cwd() -> PathBuf {
    if let Some(base) = dirs::data_local_dir() {
        return base.join("formpilot");
    }
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}
