// src/infrastructure/config.rs
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::domain::SyncError;

/// TOML configuration for a synchronized vault/store pair.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub vault: VaultConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct VaultConfig {
    /// Root folder of the synchronized notes.
    #[serde(default = "default_root")]
    pub root: String,
    #[serde(default = "default_templates_folder")]
    pub templates_folder: String,
    #[serde(default = "default_trash_folder")]
    pub trash_folder: String,
    #[serde(default = "default_attachments_folder")]
    pub attachments_folder: String,
    /// Markdown heading level used for field names inside note files.
    #[serde(default = "default_heading_level")]
    pub heading_level: u8,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StoreConfig {
    /// Path to the structured store database file.
    #[serde(default = "default_store_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SyncConfig {
    #[serde(default = "default_deck")]
    pub default_deck: String,
    /// Copy attachments missing on the file side into the attachment
    /// folder instead of failing resolution.
    #[serde(default = "default_true")]
    pub create_missing_attachments: bool,
    /// Inject a link-back field of this name into every model and
    /// template; removed again when disabled.
    #[serde(default = "default_linkback_field")]
    pub linkback_field: String,
    #[serde(default)]
    pub linkback_enabled: bool,
}

fn default_root() -> String {
    String::new()
}
fn default_templates_folder() -> String {
    "templates".to_string()
}
fn default_trash_folder() -> String {
    "trash".to_string()
}
fn default_attachments_folder() -> String {
    "attachments".to_string()
}
fn default_heading_level() -> u8 {
    2
}
fn default_store_path() -> String {
    String::new()
}
fn default_deck() -> String {
    "Default".to_string()
}
fn default_true() -> bool {
    true
}
fn default_linkback_field() -> String {
    "Source".to_string()
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            templates_folder: default_templates_folder(),
            trash_folder: default_trash_folder(),
            attachments_folder: default_attachments_folder(),
            heading_level: default_heading_level(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_deck: default_deck(),
            create_missing_attachments: default_true(),
            linkback_field: default_linkback_field(),
            linkback_enabled: false,
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read config file")?;

        let config: Config = toml::from_str(&content).context("Failed to parse TOML config")?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let toml_string =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        std::fs::write(path.as_ref(), toml_string).context("Failed to write config file")?;

        Ok(())
    }

    /// Create default configuration file at path
    pub fn create_default(path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::default();
        config.save(path)?;
        Ok(config)
    }

    /// Checked before a pass begins; a violation blocks the pass with an
    /// actionable message instead of failing somewhere mid-write.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.vault.root.trim().is_empty() {
            return Err(SyncError::ConfigError(
                "vault.root is not set; point it at your notes folder".to_string(),
            ));
        }
        if self.store.path.trim().is_empty() {
            return Err(SyncError::ConfigError(
                "store.path is not set; point it at the structured store database".to_string(),
            ));
        }
        if !(1..=6).contains(&self.vault.heading_level) {
            return Err(SyncError::ConfigError(format!(
                "vault.heading_level must be between 1 and 6, got {}",
                self.vault.heading_level
            )));
        }
        if self.sync.linkback_enabled && self.sync.linkback_field.trim().is_empty() {
            return Err(SyncError::ConfigError(
                "sync.linkback_field must be set when sync.linkback_enabled is true".to_string(),
            ));
        }
        Ok(())
    }

    pub fn vault_root(&self) -> PathBuf {
        PathBuf::from(&self.vault.root)
    }

    pub fn store_path(&self) -> PathBuf {
        PathBuf::from(&self.store.path)
    }

    /// The link-back field name, when the feature is on.
    pub fn active_linkback(&self) -> Option<&str> {
        if self.sync.linkback_enabled {
            Some(self.sync.linkback_field.as_str())
        } else {
            None
        }
    }
}
