use anyhow::{Context, Result, anyhow, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::key::DEFAULT_REFERENCE_YEAR;

/// Local scoring service started alongside the app.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:5000/predict_all";

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// endpoint = "http://127.0.0.1:5000/predict_all"
/// reference_year = 2026
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// URL the prediction request is POSTed to.
    pub endpoint: String,

    /// Year the date picker's month/day are resolved in.
    pub reference_year: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            reference_year: DEFAULT_REFERENCE_YEAR,
        }
    }
}

impl Config {
    /// Load config from disk, or return the defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, use defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-risk", "weather-risk")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        let endpoint = self.endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            bail!(
                "Invalid prediction endpoint '{}': expected an http:// or https:// URL.\n\
                 Hint: run `weather-risk configure` or pass --endpoint.",
                self.endpoint
            );
        }

        if !(1000..=9999).contains(&self.reference_year) {
            bail!(
                "Reference year {} must have four digits to fit a YYYYMMDD date stamp.",
                self.reference_year
            );
        }

        Ok(())
    }

    /// Replace the endpoint, e.g. from a command-line override.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}
