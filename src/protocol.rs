//! Wire messages exchanged with the voice agent backend over WebSocket
//!
//! The backend mixes JSON frames (audio, response text, errors) with plain
//! text frames (live transcripts and status strings).

use serde::{Deserialize, Serialize};

/// Marker the backend sends when the user's turn has ended
pub const TURN_ENDED: &str = "turn_ended";

/// Status strings the backend sends as plain text
const STATUS_PREFIXES: &[&str] = &[
    "Started transcription",
    "Stopped transcription",
    "Already transcribing",
    "Unknown command:",
];

/// Plain text frames that report failures
const ERROR_PREFIXES: &[&str] = &["Error:", "Transcription error:"];

/// JSON frames sent by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsJson {
    /// Base64 PCM audio chunk
    Audio {
        data: String,
        #[serde(default)]
        is_final: bool,
    },
    /// Complete AI response text
    Response { data: String },
    /// Backend error
    Error { data: String },
}

/// Parsed inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Encoded audio chunk to hand to the playback scheduler
    Audio { data: String, is_final: bool },
    /// AI response text
    Response(String),
    /// Error reported by the backend
    Error(String),
    /// Live transcription of the user's speech
    Transcript(String),
    /// The user's turn ended
    TurnEnded,
    /// Status update such as "Started transcription"
    Status(String),
}

impl ServerEvent {
    /// Parse a text frame from the backend
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();

        if trimmed.starts_with('{') {
            match serde_json::from_str::<WsJson>(trimmed) {
                Ok(msg) => return msg.into(),
                Err(e) => {
                    tracing::debug!(error = %e, "text frame looked like JSON but did not parse");
                }
            }
        }

        if trimmed == TURN_ENDED {
            return Self::TurnEnded;
        }
        if STATUS_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
            return Self::Status(trimmed.to_string());
        }
        if ERROR_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
            return Self::Error(trimmed.to_string());
        }

        Self::Transcript(trimmed.to_string())
    }
}

impl From<WsJson> for ServerEvent {
    fn from(msg: WsJson) -> Self {
        match msg {
            WsJson::Audio { data, is_final } => Self::Audio { data, is_final },
            WsJson::Response { data } => Self::Response(data),
            WsJson::Error { data } => Self::Error(data),
        }
    }
}

/// Control commands sent to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCommand {
    /// Begin microphone transcription
    Start,
    /// End transcription and let the agent respond
    Stop,
}

impl ClientCommand {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }
}

impl std::fmt::Display for ClientCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
