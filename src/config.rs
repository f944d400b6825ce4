//! Persistent cover-art configuration model and defaults.

use std::path::Path;

use log::{info, warn};

use crate::image_pipeline::mb_to_bytes;

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Cover resolution and caching preferences.
    pub cover_art: CoverArtConfig,
}

/// Cover resolution, caching, and persistence tuning.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CoverArtConfig {
    /// Longest side of stored full-size covers.
    #[serde(default = "default_max_cover_edge_px")]
    pub max_cover_edge_px: u32,
    /// In-memory pixmap cache budget.
    #[serde(default = "default_memory_cache_max_size_mb")]
    pub memory_cache_max_size_mb: u32,
    /// Pending cover updates collected before a batched write.
    #[serde(default = "default_update_batch_size")]
    pub update_batch_size: usize,
}

impl Default for CoverArtConfig {
    fn default() -> Self {
        Self {
            max_cover_edge_px: default_max_cover_edge_px(),
            memory_cache_max_size_mb: default_memory_cache_max_size_mb(),
            update_batch_size: default_update_batch_size(),
        }
    }
}

impl CoverArtConfig {
    pub fn memory_cache_budget_bytes(&self) -> u64 {
        mb_to_bytes(self.memory_cache_max_size_mb)
    }
}

fn default_max_cover_edge_px() -> u32 {
    300
}

fn default_memory_cache_max_size_mb() -> u32 {
    20
}

fn default_update_batch_size() -> usize {
    500
}

/// Clamps user-edited values into workable ranges.
pub fn sanitize_config(config: Config) -> Config {
    Config {
        cover_art: CoverArtConfig {
            max_cover_edge_px: config.cover_art.max_cover_edge_px.clamp(16, 4096),
            memory_cache_max_size_mb: config.cover_art.memory_cache_max_size_mb.max(1),
            update_batch_size: config.cover_art.update_batch_size.max(1),
        },
    }
}

/// Loads `config.toml`, writing defaults first when the file is missing.
///
/// Unreadable or malformed files fall back to defaults.
pub fn load_or_create_config(config_file: &Path) -> Config {
    if !config_file.exists() {
        let default_config = sanitize_config(Config::default());
        info!(
            "Config file not found. Creating default config. path={}",
            config_file.display()
        );
        if let Err(err) = write_config(config_file, &default_config) {
            warn!(
                "Failed to write default config {}: {}",
                config_file.display(),
                err
            );
        }
        return default_config;
    }

    let config_content = match std::fs::read_to_string(config_file) {
        Ok(content) => content,
        Err(err) => {
            warn!(
                "Failed to read config {}: {}. Using defaults",
                config_file.display(),
                err
            );
            return sanitize_config(Config::default());
        }
    };
    let parsed = toml::from_str::<Config>(&config_content).unwrap_or_else(|err| {
        warn!(
            "Failed to parse config {}: {}. Using defaults",
            config_file.display(),
            err
        );
        Config::default()
    });
    sanitize_config(parsed)
}

fn write_config(config_file: &Path, config: &Config) -> Result<(), String> {
    if let Some(parent) = config_file.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|err| format!("Failed to create {}: {}", parent.display(), err))?;
    }
    let text = toml::to_string(config).map_err(|err| format!("Failed to serialize: {}", err))?;
    std::fs::write(config_file, text).map_err(|err| format!("Failed to write: {}", err))
}
