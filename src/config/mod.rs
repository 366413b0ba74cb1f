//! Configuration module for bookhub
//!
//! Manages loading behavior, history thresholds and the default session memento.
//! Configuration is stored in the user's config directory
//! (`~/.config/bookhub/config.toml` on Linux).
//!
//! The orchestrator never mutates configuration. Each command takes an
//! `Arc<BookHubConfig>` snapshot when it starts, so editing the file (or calling
//! `BookHub::set_config`) only affects later loads.

use crate::memento::{HistoryMementoFilter, SessionMemento};
use config::{Config, ConfigError, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// How nested containers are folded into one book
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveRecursionMode {
    /// Archives inside archives belong to the outer book; place is the root archive's folder
    #[default]
    IncludeSubArchives,
    /// Only directories are folded; place is the nearest directory-like container
    IncludeSubDirectories,
}

/// Book opening behavior
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct BookConfig {
    pub archive_recursion_mode: ArchiveRecursionMode,

    /// Reopen recursively when a folder holds exactly one sub-folder
    pub is_auto_recursive: bool,

    /// Offer a recursive open when a folder has no pages but has sub-folders
    pub is_confirm_recursive: bool,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            archive_recursion_mode: ArchiveRecursionMode::default(),
            is_auto_recursive: false,
            is_confirm_recursive: true,
        }
    }
}

/// History recording behavior
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct HistoryConfig {
    /// Page changes required before a book enters history
    pub entry_page_count: i32,

    /// Update history even when the load asked to keep history order
    pub is_force_update_history: bool,

    pub is_inner_archive_history_enabled: bool,

    pub is_unc_history_enabled: bool,

    /// Maximum number of persisted entries (0 = unbounded)
    pub limit: usize,

    /// Fields restored from history without `RESUME`
    pub memento_filter: HistoryMementoFilter,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            entry_page_count: 0,
            is_force_update_history: false,
            is_inner_archive_history_enabled: true,
            is_unc_history_enabled: true,
            limit: 1000,
            memento_filter: HistoryMementoFilter::default(),
        }
    }
}

/// Application configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct BookHubConfig {
    /// History/bookmark database directory
    pub database_path: Option<PathBuf>,

    pub book: BookConfig,

    pub history: HistoryConfig,

    /// Template applied to books without saved settings
    pub default_memento: SessionMemento,

    /// Link offered when a page needs a missing image codec
    pub codec_store_uri: String,
}

impl Default for BookHubConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            book: BookConfig::default(),
            history: HistoryConfig::default(),
            default_memento: SessionMemento::default(),
            codec_store_uri: "ms-windows-store://pdp/?ProductId=9pmmsr1cgpwg".to_string(),
        }
    }
}

impl BookHubConfig {
    /// Get the path to the config file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the system config directory cannot be determined.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ConfigError::Message("Could not determine config directory".to_string()))?;

        Ok(config_dir.join("bookhub").join("config.toml"))
    }

    /// Load configuration from file, creating default if it doesn't exist
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the config file cannot be read, parsed, or created.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            let default_config = Self::default();
            default_config.save_to(&config_path)?;
            return Ok(default_config);
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific TOML file
    ///
    /// Missing keys fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml))
            .build()?;

        settings.try_deserialize()
    }

    /// Save configuration to the default location
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration cannot be serialized or written.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to `path`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the config directory cannot be created, the configuration
    /// cannot be serialized to TOML, or the file cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ConfigError::Message(format!("Failed to create config directory: {e}")))?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Message(format!("Failed to serialize config: {e}")))?;

        fs::write(path, toml_string)
            .map_err(|e| ConfigError::Message(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Database directory, falling back to the user's data directory
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if no path is configured and the data directory is unknown.
    pub fn database_path_or_default(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.database_path {
            return Ok(path.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| ConfigError::Message("Could not determine data directory".to_string()))?;
        Ok(data_dir.join("bookhub").join("db"))
    }
}
