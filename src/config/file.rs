// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Configuration file provider.
//!
//! Reads a JSON, TOML, or YAML file once at construction, normalizes it to a
//! JSON tree, and answers dot-separated key lookups against that tree
//! (`server.port` walks into the `server` table).

use std::fs;
use std::path::Path;

use super::ConfigError;
use super::ConfigProvider;

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Toml,
    Yaml,
}

impl FileFormat {
    /// Pick the format from the file extension, case-insensitive.
    fn from_path(path: &Path) -> Option<Self> {
        match path
            .extension()?
            .to_string_lossy()
            .to_lowercase()
            .as_str()
        {
            "json" => Some(FileFormat::Json),
            "toml" => Some(FileFormat::Toml),
            "yaml" | "yml" => Some(FileFormat::Yaml),
            _ => None,
        }
    }
}

/// Configuration provider backed by a file on disk.
///
/// The file is parsed eagerly; a provider that constructed successfully can
/// never fail a later lookup.
#[derive(Debug)]
pub struct FileConfigProvider {
    root: serde_json::Value,
}

impl FileConfigProvider {
    /// Load the file at `path`, detecting the format from its extension.
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let path = Path::new(path);
        let format = FileFormat::from_path(path).ok_or_else(|| {
            ConfigError::provider_error("file", "unsupported file format")
        })?;

        let content = fs::read_to_string(path)?;
        let root = Self::parse(&content, format)?;

        if !root.is_object() {
            return Err(ConfigError::provider_error(
                "file",
                "root of the configuration must be a table",
            ));
        }

        log::debug!("Loaded configuration from {}", path.display());

        Ok(Self { root })
    }

    /// Parse raw file content into a JSON tree.
    ///
    /// TOML and YAML values are re-serialized through `serde_json` so every
    /// provider hands out the same value type.
    fn parse(content: &str, format: FileFormat) -> Result<serde_json::Value, ConfigError> {
        match format {
            FileFormat::Json => serde_json::from_str(content)
                .map_err(|e| ConfigError::ParseError(format!("invalid JSON: {e}"))),
            FileFormat::Toml => {
                let value: toml::Value = toml::from_str(content)
                    .map_err(|e| ConfigError::ParseError(format!("invalid TOML: {e}")))?;
                serde_json::to_value(value)
                    .map_err(|e| ConfigError::ParseError(format!("unrepresentable TOML: {e}")))
            }
            FileFormat::Yaml => {
                let value: serde_yaml::Value = serde_yaml::from_str(content)
                    .map_err(|e| ConfigError::ParseError(format!("invalid YAML: {e}")))?;
                serde_json::to_value(value)
                    .map_err(|e| ConfigError::ParseError(format!("unrepresentable YAML: {e}")))
            }
        }
    }

    /// Walk the tree along a dot-separated key path.
    fn lookup(&self, key: &str) -> Option<&serde_json::Value> {
        key.split('.')
            .try_fold(&self.root, |node, part| node.get(part))
    }
}

impl ConfigProvider for FileConfigProvider {
    fn has(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    fn provider_name(&self) -> &str {
        "file"
    }

    fn get_raw(&self, key: &str) -> Result<Option<serde_json::Value>, ConfigError> {
        Ok(self.lookup(key).cloned())
    }
}
