//! Vault settings management
//!
//! Stores non-sensitive configuration in a plain JSON file next to the
//! vault records. Settings are readable while the vault is locked.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::biometry::PromptInfo;
use crate::storage::StorageResult;

const SETTINGS_FILE: &str = "settings.json";

/// Default text of the biometric prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PromptSettings {
    pub title: String,
    pub subtitle: Option<String>,
    /// Label of the dismiss button
    pub negative_text: String,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            title: "Unlock vault".to_string(),
            subtitle: None,
            negative_text: "Cancel".to_string(),
        }
    }
}

impl PromptSettings {
    /// Prompt text for one call, with `title`, `subtitle` and `negativeText`
    /// string keys in `options` taking precedence
    pub fn resolve(&self, options: Option<&Value>) -> PromptInfo {
        let text = |key: &str| {
            options
                .and_then(|options| options.get(key))
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        PromptInfo {
            title: text("title").unwrap_or_else(|| self.title.clone()),
            subtitle: text("subtitle").or_else(|| self.subtitle.clone()),
            negative_text: text("negativeText").unwrap_or_else(|| self.negative_text.clone()),
        }
    }
}

/// Vault settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VaultSettings {
    /// Settings file version
    pub version: u32,
    /// Failed unlocks (code and biometry combined) before lockout
    pub max_unlock_attempts: u32,
    /// Destroy the vault when the code gate locks out
    pub clean_on_code_lockout: bool,
    /// Per-operation timeout in seconds (`None` = wait forever)
    pub operation_timeout_secs: Option<u64>,
    pub prompt: PromptSettings,
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            version: 1,
            max_unlock_attempts: 3,
            clean_on_code_lockout: true,
            operation_timeout_secs: None,
            prompt: PromptSettings::default(),
        }
    }
}

impl VaultSettings {
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_secs.map(Duration::from_secs)
    }
}

/// Settings manager
pub struct SettingsManager {
    settings_file: PathBuf,
    settings: VaultSettings,
}

impl SettingsManager {
    /// Load settings from `storage_dir`, falling back to defaults
    pub fn new(storage_dir: &Path) -> Self {
        let settings_file = storage_dir.join(SETTINGS_FILE);
        let settings = Self::load_from_file(&settings_file).unwrap_or_else(|e| {
            warn!("Ignoring unreadable settings file {:?}: {}", settings_file, e);
            VaultSettings::default()
        });

        Self {
            settings_file,
            settings,
        }
    }

    fn load_from_file(path: &Path) -> StorageResult<VaultSettings> {
        if !path.exists() {
            debug!("No settings file found, using defaults");
            return Ok(VaultSettings::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let settings: VaultSettings = serde_json::from_str(&contents)?;
        debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Save settings to file
    pub async fn save(&self) -> StorageResult<()> {
        let contents = serde_json::to_string_pretty(&self.settings)?;

        if let Some(parent) = self.settings_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write atomically using temp file
        let temp_path = self.settings_file.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents).await?;
        tokio::fs::rename(&temp_path, &self.settings_file).await?;

        debug!("Saved settings to {:?}", self.settings_file);
        Ok(())
    }

    pub fn get(&self) -> &VaultSettings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut VaultSettings {
        &mut self.settings
    }

    /// Replace settings and save
    pub async fn update(&mut self, settings: VaultSettings) -> StorageResult<()> {
        self.settings = settings;
        self.save().await
    }

    /// Reset settings to defaults and delete the settings file
    pub async fn reset(&mut self) -> StorageResult<()> {
        self.settings = VaultSettings::default();

        if self.settings_file.exists() {
            tokio::fs::remove_file(&self.settings_file).await?;
        }

        Ok(())
    }
}
