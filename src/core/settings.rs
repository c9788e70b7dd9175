use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "config.json";

/// Everything the browser needs to talk to the registry and place files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Root of the host webui installation; folder conventions hang off it.
    pub base_dir: PathBuf,
    pub endpoint: String,
    pub page_limit: u32,
    pub api_key: Option<String>,
    pub show_nsfw: bool,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            endpoint: crate::registry::DEFAULT_ENDPOINT.into(),
            page_limit: 50,
            api_key: None,
            show_nsfw: true,
            max_retries: 5,
            retry_delay_secs: 10,
        }
    }
}

pub struct SettingsManager {
    path: PathBuf,
    inner: RwLock<Settings>,
}

impl SettingsManager {
    pub fn new() -> Result<Self> {
        Self::from_path(resolve_config_path()?)
    }

    /// Back the manager with an explicit file instead of the platform config
    /// directory.
    pub fn from_path(path: PathBuf) -> Result<Self> {
        let settings = load_settings(&path)?;
        Ok(Self {
            path,
            inner: RwLock::new(settings),
        })
    }

    #[must_use]
    pub fn read(&self) -> Settings {
        self.inner.read().clone()
    }

    pub fn write(&self, settings: Settings) -> Result<()> {
        let mut guard = self.inner.write();
        *guard = settings;
        persist_settings(self.path.as_path(), &guard)
    }
}

fn resolve_config_path() -> Result<PathBuf> {
    let project_dirs = ProjectDirs::from("com", "CivitaiBrowser", "CivitaiBrowser")
        .context("missing project directories")?;
    let dir = project_dirs.config_dir();
    fs::create_dir_all(dir).context("creating config directory failed")?;
    Ok(dir.join(CONFIG_FILE))
}

fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let bytes = fs::read(path).with_context(|| format!("failed reading {path:?}"))?;
    serde_json::from_slice(&bytes).context("config json could not be parsed")
}

fn persist_settings(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create dir {parent:?}"))?;
    }
    let serialized =
        serde_json::to_vec_pretty(settings).context("serialize settings to json failed")?;
    fs::write(path, serialized).with_context(|| format!("write settings to {path:?}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SettingsManager::from_path(dir.path().join("config.json")).unwrap();
        let settings = manager.read();
        assert_eq!(settings.page_limit, 50);
        assert_eq!(settings.max_retries, 5);
        assert!(settings.show_nsfw);
        assert_eq!(settings.endpoint, crate::registry::DEFAULT_ENDPOINT);
    }

    #[test]
    fn settings_survive_a_write_read_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let manager = SettingsManager::from_path(path.clone()).unwrap();
        let mut settings = manager.read();
        settings.base_dir = PathBuf::from("/srv/webui");
        settings.api_key = Some("secret".into());
        settings.show_nsfw = false;
        manager.write(settings).unwrap();

        let reloaded = SettingsManager::from_path(path).unwrap().read();
        assert_eq!(reloaded.base_dir, PathBuf::from("/srv/webui"));
        assert_eq!(reloaded.api_key.as_deref(), Some("secret"));
        assert!(!reloaded.show_nsfw);
    }

    #[test]
    fn partial_config_files_keep_defaults_for_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"pageLimit": 20}"#).unwrap();

        let settings = SettingsManager::from_path(path).unwrap().read();
        assert_eq!(settings.page_limit, 20);
        assert_eq!(settings.max_retries, 5);
    }
}
