//! CLI configuration management.

use cachet_s3::S3Settings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CLI configuration.
///
/// Values set here override the `CACHET_S3_*` environment.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CliConfig {
    /// S3-compatible endpoint URL.
    pub endpoint_url: Option<String>,
    /// Region override.
    pub region: Option<String>,
    /// Use path-style addressing.
    #[serde(default)]
    pub force_path_style: bool,
    /// Multipart part size in bytes.
    pub part_size: Option<usize>,
}

impl CliConfig {
    /// Load configuration from file.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(serde_yaml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the configuration file path.
    pub fn config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let dirs = directories::ProjectDirs::from("dev", "cachet", "cachet")
            .ok_or("Could not determine config directory")?;
        Ok(dirs.config_dir().join("config.yaml"))
    }

    /// Set a configuration value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "endpoint_url" => self.endpoint_url = Some(value.to_string()),
            "region" => self.region = Some(value.to_string()),
            "force_path_style" => {
                self.force_path_style = match value {
                    "true" | "yes" | "1" => true,
                    "false" | "no" | "0" => false,
                    _ => return Err(format!("Invalid boolean: {}", value)),
                };
            }
            "part_size" => {
                let size = value
                    .parse()
                    .map_err(|_| format!("Invalid part size: {}", value))?;
                self.part_size = Some(size);
            }
            _ => return Err(format!("Unknown config key: {}", key)),
        }
        Ok(())
    }

    /// S3 client settings: the environment, overridden by this file.
    pub fn s3_settings(&self) -> S3Settings {
        let mut settings = S3Settings::from_env();
        if let Some(url) = &self.endpoint_url {
            settings = settings.with_endpoint_url(url.clone());
        }
        if let Some(region) = &self.region {
            settings = settings.with_region(region.clone());
        }
        if self.force_path_style {
            settings = settings.with_force_path_style(true);
        }
        if let Some(size) = self.part_size {
            settings = settings.with_part_size(size);
        }
        settings
    }
}
