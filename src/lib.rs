//! Voice Agent Client - native front end for a voice-driven assistant
//!
//! This library provides the client side of a voice agent backend:
//! - WebSocket session control (start/stop transcription)
//! - Gapless playback of streamed TTS audio chunks
//! - REST access to chat history and API key management
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                       CLI                            │
//! │   talk  │  history  │  keys  │  test-speaker         │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │   Session (WebSocket)        │   BackendClient (REST)│
//! │   protocol → scheduler       │   history / keys      │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │   PlaybackScheduler  →  OutputDevice (cpal)          │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod history;
pub mod protocol;
pub mod session;
pub mod voice;

pub use api::{ApiKeyUpdate, BackendClient, ChatEntry, KeyStatus, KeyTestResult};
pub use config::Config;
pub use error::{Error, Result};
pub use protocol::{ClientCommand, ServerEvent};
pub use session::{SessionEvent, VoiceSession};
pub use voice::{
    AudioBuffer, CpalOutput, DeviceEvent, OutputDevice, PlaybackEvent, PlaybackId,
    PlaybackScheduler, SchedulerState,
};
