use anyhow::{bail, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::scan::policy::{
    DecisionPolicy, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_FRESHNESS_THRESHOLD,
};

pub const DATA_DIR_ENV: &str = "FRUITSCAN_DATA_DIR";
pub const SETTINGS_FILE: &str = "settings.json";
pub const DATABASE_FILE: &str = "fruitscan.sqlite3";

const SPECIES_MODEL_FILE: &str = "fruits_vegetables_51.onnx";
const FRESHNESS_MODEL_FILE: &str = "banana_freshness_mobilenet.onnx";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScannerSettings {
    /// Relative paths resolve against the data directory.
    pub species_model: PathBuf,
    pub freshness_model: PathBuf,
    pub confidence_threshold: f32,
    pub freshness_threshold: f32,
    /// How long a capture waits for a decoded frame before giving up.
    pub frame_wait_ms: u64,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            species_model: Path::new("models").join(SPECIES_MODEL_FILE),
            freshness_model: Path::new("models").join(FRESHNESS_MODEL_FILE),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            freshness_threshold: DEFAULT_FRESHNESS_THRESHOLD,
            frame_wait_ms: 2_000,
        }
    }
}

impl ScannerSettings {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("confidenceThreshold", self.confidence_threshold),
            ("freshnessThreshold", self.freshness_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("{name} must be within [0, 1], got {value}");
            }
        }
        Ok(())
    }

    pub fn policy(&self) -> DecisionPolicy {
        DecisionPolicy {
            confidence_threshold: self.confidence_threshold,
            freshness_threshold: self.freshness_threshold,
            ..DecisionPolicy::default()
        }
    }
}

/// `$FRUITSCAN_DATA_DIR`, else the platform data directory.
pub fn resolve_data_dir(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir);
    }
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    dirs::data_dir()
        .map(|dir| dir.join("fruitscan"))
        .context("could not determine a data directory; set FRUITSCAN_DATA_DIR")
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<ScannerSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            match serde_json::from_str::<ScannerSettings>(&contents) {
                Ok(settings) if settings.validate().is_ok() => settings,
                Ok(_) | Err(_) => {
                    warn!(
                        "Ignoring invalid settings file {}; using defaults",
                        path.display()
                    );
                    ScannerSettings::default()
                }
            }
        } else {
            ScannerSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current(&self) -> ScannerSettings {
        self.read().clone()
    }

    pub fn update(&self, settings: ScannerSettings) -> Result<()> {
        settings.validate()?;
        let mut guard = self.write();
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    /// Resolves a configured model path against the settings directory.
    pub fn model_path(&self, configured: &Path) -> PathBuf {
        if configured.is_absolute() {
            return configured.to_path_buf();
        }
        match self.path.parent() {
            Some(dir) => dir.join(configured),
            None => configured.to_path_buf(),
        }
    }

    fn persist(&self, data: &ScannerSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, ScannerSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, ScannerSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join(SETTINGS_FILE)).unwrap();
        assert_eq!(store.current(), ScannerSettings::default());
        assert_eq!(store.current().policy().confidence_threshold, 0.70);
    }

    #[test]
    fn update_persists_and_reloads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        let store = SettingsStore::new(path.clone()).unwrap();

        let mut settings = store.current();
        settings.confidence_threshold = 0.8;
        store.update(settings.clone()).unwrap();

        let reloaded = SettingsStore::new(path).unwrap();
        assert_eq!(reloaded.current(), settings);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(&path, r#"{ "freshnessThreshold": 0.6 }"#).unwrap();

        let settings = SettingsStore::new(path).unwrap().current();
        assert_eq!(settings.freshness_threshold, 0.6);
        assert_eq!(settings.frame_wait_ms, 2_000);
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let dir = tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join(SETTINGS_FILE)).unwrap();
        let mut settings = store.current();
        settings.confidence_threshold = 1.2;
        assert!(store.update(settings).is_err());
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(
            SettingsStore::new(path).unwrap().current(),
            ScannerSettings::default()
        );
    }

    #[test]
    fn relative_model_paths_resolve_against_settings_dir() {
        let dir = tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join(SETTINGS_FILE)).unwrap();
        let resolved = store.model_path(&store.current().species_model);
        assert!(resolved.starts_with(dir.path()));
        assert!(resolved.ends_with("models/fruits_vegetables_51.onnx"));
    }

    #[test]
    fn explicit_data_dir_wins() {
        let dir = resolve_data_dir(Some(PathBuf::from("/tmp/scans"))).unwrap();
        assert_eq!(dir, PathBuf::from("/tmp/scans"));
    }
}
