//! WAV encoding and stream chunking for locally generated audio

use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use super::chunk::WAV_HEADER_LEN;
use crate::{Error, Result};

/// Quantize a sample in [-1.0, 1.0] to signed 16-bit
#[allow(clippy::cast_possible_truncation)]
fn to_pcm16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16
}

/// Encode mono samples as a 16-bit PCM WAV file in memory
///
/// # Errors
///
/// Returns `Error::Audio` if the samples do not fit in one WAV file or
/// encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let frames = u32::try_from(samples.len())
        .map_err(|_| Error::Audio(format!("{} samples exceed one WAV file", samples.len())))?;
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut wav = Cursor::new(Vec::with_capacity(WAV_HEADER_LEN + samples.len() * 2));
    let mut writer = hound::WavWriter::new(&mut wav, spec)?;
    let mut pcm = writer.get_i16_writer(frames);
    for &sample in samples {
        pcm.write_sample(to_pcm16(sample));
    }
    pcm.flush()?;
    writer.finalize()?;

    Ok(wav.into_inner())
}

/// Split a WAV file into base64 chunks the way the backend streams them
///
/// The first chunk carries the header plus the first slice of PCM; the rest
/// are raw PCM. Slices are `pcm_bytes_per_chunk` long, rounded down to whole
/// samples, and the last chunk is flagged final.
#[must_use]
pub fn stream_chunks(wav: &[u8], pcm_bytes_per_chunk: usize) -> Vec<(String, bool)> {
    let split = WAV_HEADER_LEN.min(wav.len());
    let (header, pcm) = wav.split_at(split);
    let step = (pcm_bytes_per_chunk & !1).max(2);

    let mut slices: Vec<&[u8]> = pcm.chunks(step).collect();
    if slices.is_empty() {
        slices.push(&[]);
    }

    let last = slices.len() - 1;
    slices
        .into_iter()
        .enumerate()
        .map(|(i, slice)| {
            let encoded = if i == 0 {
                BASE64.encode([header, slice].concat())
            } else {
                BASE64.encode(slice)
            };
            (encoded, i == last)
        })
        .collect()
}
