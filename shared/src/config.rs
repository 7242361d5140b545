//! Configuration for the core and the reference shell.
//!
//! Every field has a default, so an empty TOML document is a valid config.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::capabilities::{ValidatedUrl, MAX_TIMEOUT_MS};
use crate::catalog::CatalogConfig;
use crate::{MAX_VISIBLE_PAGES, PAGE_SIZE};

pub const DEFAULT_PAGE_CACHE_SIZE: usize = 64;
pub const DEFAULT_RECORD_CACHE_SIZE: usize = 128;
pub const DEFAULT_REPORTS_FILE: &str = "wanted-reports.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub pagination: PaginationConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Items per server page.
    pub page_size: u32,
    /// Width of the page-number window.
    pub max_visible_pages: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
            max_visible_pages: MAX_VISIBLE_PAGES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_pages: usize,
    pub max_records: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_PAGE_CACHE_SIZE,
            max_records: DEFAULT_RECORD_CACHE_SIZE,
        }
    }
}

impl CacheConfig {
    pub fn page_capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_pages).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn record_capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_records).unwrap_or(NonZeroUsize::MIN)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// File backing the reports slot.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_REPORTS_FILE),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a value is out of range.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Validation(msg));

        if self.pagination.page_size == 0 {
            return invalid("pagination.page_size must be at least 1".into());
        }
        if self.pagination.max_visible_pages == 0 {
            return invalid("pagination.max_visible_pages must be at least 1".into());
        }
        if self.cache.max_pages == 0 || self.cache.max_records == 0 {
            return invalid("cache sizes must be at least 1".into());
        }
        if self.catalog.timeout_ms == 0 || self.catalog.timeout_ms > MAX_TIMEOUT_MS {
            return invalid(format!("catalog.timeout_ms must be between 1 and {MAX_TIMEOUT_MS}"));
        }
        for (field, url) in [
            ("catalog.list_url", &self.catalog.list_url),
            ("catalog.detail_url", &self.catalog.detail_url),
        ] {
            if let Err(e) = ValidatedUrl::new(url.clone()) {
                return invalid(format!("{field}: {e}"));
            }
        }
        if self.storage.path.as_os_str().is_empty() {
            return invalid("storage.path must not be empty".into());
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("configuration validation failed: {0}")]
    Validation(String),
}
