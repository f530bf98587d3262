//! TOML configuration file loading
//!
//! Supports `~/.config/voice-agent/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ClientConfigFile {
    /// Backend connection settings
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Audio playback settings
    #[serde(default)]
    pub playback: PlaybackFileConfig,
}

/// Backend connection configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// HTTP base URL of the backend (e.g. "http://localhost:8000")
    pub url: Option<String>,

    /// WebSocket URL, derived from `url` when absent
    pub ws_url: Option<String>,

    /// REST request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Playback configuration
#[derive(Debug, Default, Deserialize)]
pub struct PlaybackFileConfig {
    /// Sample rate of the PCM stream the backend sends
    pub sample_rate: Option<u32>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ClientConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ClientConfigFile {
    config_file_path().map_or_else(ClientConfigFile::default, |path| load_config_from(&path))
}

/// Load a TOML config file from an explicit path
///
/// Returns `ClientConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_from(path: &Path) -> ClientConfigFile {
    if !path.exists() {
        return ClientConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ClientConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ClientConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/voice-agent/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("voice-agent").join("config.toml"))
}
