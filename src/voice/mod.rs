//! Voice playback module
//!
//! Decodes streamed TTS chunks and plays them back gaplessly.

mod chunk;
mod output;
mod scheduler;
mod wav;

pub use chunk::{AudioBuffer, AudioChunk, WAV_HEADER_LEN, decode_chunk, pcm16_to_f32};
pub use output::{CpalOutput, DeviceEvent, OutputDevice, PlaybackId};
pub use scheduler::{PlaybackEvent, PlaybackScheduler, SchedulerState};
pub use wav::{samples_to_wav, stream_chunks};

/// Output rate of the backend's TTS stream
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;
