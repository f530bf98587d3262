//! Decoding of encoded audio chunks into playable buffers

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::{Error, Result};

/// Length of the WAV container header carried by the first chunk of an utterance
pub const WAV_HEADER_LEN: usize = 44;

/// Bytes per 16-bit PCM sample
const BYTES_PER_SAMPLE: usize = 2;

/// Immutable block of mono samples in [-1.0, 1.0]
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Wrap decoded samples at the given rate
    #[must_use]
    pub const fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of sample frames
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback duration in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }
}

/// One queued unit of playback
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub buffer: AudioBuffer,
    pub is_final: bool,
    /// Sequence number of the utterance this chunk belongs to
    pub utterance: u64,
}

/// Decode a base64 payload into raw bytes
///
/// # Errors
///
/// Returns `Error::Decode` if the payload is not valid base64
pub fn decode_payload(encoded: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(encoded.trim())
        .map_err(|e| Error::Decode(format!("invalid base64 payload: {e}")))
}

/// Drop the container header from the first chunk of an utterance
///
/// Payloads shorter than the header yield no bytes.
#[must_use]
pub fn strip_header(bytes: &[u8]) -> &[u8] {
    bytes.get(WAV_HEADER_LEN..).unwrap_or_default()
}

/// Convert signed 16-bit little-endian PCM into normalized f32 samples
///
/// # Errors
///
/// Returns `Error::Decode` if the byte count is not a whole number of samples
pub fn pcm16_to_f32(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % BYTES_PER_SAMPLE != 0 {
        return Err(Error::Decode(format!(
            "PCM payload of {} bytes is not aligned to {BYTES_PER_SAMPLE}-byte samples",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect())
}

/// Decode one encoded chunk into a buffer
///
/// # Errors
///
/// Returns `Error::Decode` if the payload is malformed
pub fn decode_chunk(encoded: &str, strip: bool, sample_rate: u32) -> Result<AudioBuffer> {
    let bytes = decode_payload(encoded)?;
    let pcm = if strip { strip_header(&bytes) } else { &bytes };
    let samples = pcm16_to_f32(pcm)?;
    Ok(AudioBuffer::new(samples, sample_rate))
}
