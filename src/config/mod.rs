//! Configuration management for the voice agent client

pub mod file;

use std::time::Duration;

use url::Url;

use crate::voice::DEFAULT_SAMPLE_RATE;
use crate::{Error, Result};

use self::file::ClientConfigFile;

/// Backend the client talks to when nothing else is configured
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000";

/// Default REST request timeout
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Voice agent client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP base URL for the REST endpoints
    pub server_url: Url,

    /// WebSocket endpoint for the voice session
    pub ws_url: Url,

    /// Timeout applied to REST requests
    pub request_timeout: Duration,

    /// Playback configuration
    pub playback: PlaybackConfig,
}

/// Audio playback configuration
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Sample rate of the backend's PCM stream and of the output device
    pub sample_rate: u32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

impl Config {
    /// Load configuration (CLI override > env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if a configured URL or number is invalid
    pub fn load(server_override: Option<&str>) -> Result<Self> {
        let fc = file::load_config_file();
        Self::resolve(fc, |key| std::env::var(key).ok(), server_override)
    }

    /// Resolve configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a configured URL or number is invalid
    pub fn resolve(
        fc: ClientConfigFile,
        env: impl Fn(&str) -> Option<String>,
        server_override: Option<&str>,
    ) -> Result<Self> {
        let server = server_override
            .map(ToString::to_string)
            .or_else(|| env("VOICE_AGENT_URL"))
            .or(fc.server.url)
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        let server_url = parse_url(&server)?;

        let ws_url = match env("VOICE_AGENT_WS_URL").or(fc.server.ws_url) {
            Some(ws) => parse_url(&ws)?,
            None => derive_ws_url(&server_url)?,
        };

        let timeout_secs = match env("VOICE_AGENT_TIMEOUT_SECS") {
            Some(raw) => parse_number("VOICE_AGENT_TIMEOUT_SECS", &raw)?,
            None => fc.server.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
        };

        let sample_rate = match env("VOICE_AGENT_SAMPLE_RATE") {
            Some(raw) => parse_number("VOICE_AGENT_SAMPLE_RATE", &raw)?,
            None => fc.playback.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE),
        };
        if sample_rate == 0 {
            return Err(Error::Config("sample rate must be positive".to_string()));
        }

        Ok(Self {
            server_url,
            ws_url,
            request_timeout: Duration::from_secs(timeout_secs),
            playback: PlaybackConfig { sample_rate },
        })
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| Error::Config(format!("invalid URL '{raw}': {e}")))
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("{key} must be a number, got '{raw}'")))
}

/// Derive the `/ws` endpoint from the HTTP base URL
///
/// # Errors
///
/// Returns error if the base URL is not http(s)
pub fn derive_ws_url(server_url: &Url) -> Result<Url> {
    let scheme = match server_url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => {
            return Err(Error::Config(format!(
                "cannot derive WebSocket URL from '{other}' scheme"
            )));
        }
    };

    let mut ws_url = server_url
        .join("ws")
        .map_err(|e| Error::Config(format!("invalid WebSocket path: {e}")))?;
    ws_url
        .set_scheme(scheme)
        .map_err(|()| Error::Config(format!("cannot switch scheme to {scheme}")))?;
    Ok(ws_url)
}
