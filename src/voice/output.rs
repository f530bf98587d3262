//! Audio output devices for scheduled playback

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use tokio::sync::mpsc;

use super::chunk::AudioBuffer;
use crate::{Error, Result};

/// Identifies one scheduled buffer; reported back when it finishes playing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackId(pub u64);

/// Reports from a running output device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// A scheduled buffer finished playing
    Finished(PlaybackId),
    /// The output stream broke; buffers still on the device will not finish
    Failed(String),
}

/// Capability the scheduler needs from an audio output
///
/// The concrete device hands out a channel of [`DeviceEvent`]s: each
/// scheduled buffer comes back as `Finished` with the `PlaybackId` returned
/// from [`OutputDevice::schedule`], and stream faults come back as `Failed`.
pub trait OutputDevice {
    /// Current audio clock in seconds
    fn current_time(&self) -> f64;

    /// Schedule a buffer to start at `start_time` on the audio clock
    ///
    /// # Errors
    ///
    /// Returns `Error::PlaybackDevice` if the device is closed or broken
    fn schedule(&mut self, buffer: &AudioBuffer, start_time: f64) -> Result<PlaybackId>;

    /// Release the device
    fn close(&mut self);
}

/// Buffer waiting on, or currently being rendered by, the audio callback
struct Scheduled {
    id: PlaybackId,
    start_frame: u64,
    samples: Vec<f32>,
}

impl Scheduled {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }

    /// The last frame has been rendered (or the buffer is empty and due)
    fn finished_at(&self, frame: u64) -> bool {
        frame + 1 >= self.end_frame().max(self.start_frame + 1)
    }
}

/// Buffers shared between the scheduling side and the audio callback
#[derive(Default)]
struct Timeline {
    scheduled: VecDeque<Scheduled>,
}

impl Timeline {
    /// Mix the sample for `frame` and collect buffers that just finished
    #[allow(clippy::cast_possible_truncation)]
    fn render(&mut self, frame: u64, done: &mut Vec<PlaybackId>) -> f32 {
        let mut value = 0.0;
        self.scheduled.retain(|s| {
            if frame >= s.start_frame && frame < s.end_frame() {
                value += s.samples[(frame - s.start_frame) as usize];
            }
            if frame >= s.start_frame && s.finished_at(frame) {
                done.push(s.id);
                return false;
            }
            true
        });
        value
    }
}

/// Plays scheduled buffers on the default output device via cpal
///
/// The audio clock is the count of frames rendered by the output stream.
pub struct CpalOutput {
    stream: Option<Stream>,
    sample_rate: u32,
    timeline: Arc<Mutex<Timeline>>,
    frames: Arc<AtomicU64>,
    failed: Arc<AtomicBool>,
    next_id: u64,
}

impl CpalOutput {
    /// Open the default output device at `sample_rate`
    ///
    /// Returns the device and the receiver for its [`DeviceEvent`]s.
    ///
    /// # Errors
    ///
    /// Returns error if no usable output device or stream configuration exists
    pub fn open(sample_rate: u32) -> Result<(Self, mpsc::UnboundedReceiver<DeviceEvent>)> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::PlaybackDevice("no output device available".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::PlaybackDevice(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
            .or_else(|| {
                // Fallback: stereo, mono sample duplicated per channel
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(sample_rate)
                        && c.max_sample_rate() >= SampleRate(sample_rate)
                })
            })
            .ok_or_else(|| Error::PlaybackDevice("no suitable output config found".to_string()))?;

        let config: StreamConfig = supported_config
            .with_sample_rate(SampleRate(sample_rate))
            .config();
        let channels = usize::from(config.channels);

        let timeline = Arc::new(Mutex::new(Timeline::default()));
        let frames = Arc::new(AtomicU64::new(0));
        let failed = Arc::new(AtomicBool::new(false));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let fault_tx = events_tx.clone();

        let cb_timeline = Arc::clone(&timeline);
        let cb_frames = Arc::clone(&frames);
        let cb_failed = Arc::clone(&failed);
        let mut done = Vec::new();

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut frame = cb_frames.load(Ordering::Acquire);
                    match cb_timeline.lock() {
                        Ok(mut timeline) => {
                            for out in data.chunks_mut(channels) {
                                let sample = timeline.render(frame, &mut done);
                                out.fill(sample);
                                frame += 1;
                            }
                        }
                        Err(_) => {
                            data.fill(0.0);
                            frame += (data.len() / channels.max(1)) as u64;
                        }
                    }
                    cb_frames.store(frame, Ordering::Release);

                    for id in done.drain(..) {
                        let _ = events_tx.send(DeviceEvent::Finished(id));
                    }
                },
                move |err| {
                    tracing::error!(error = %err, "audio output stream error");
                    // Report the first fault only; the stream does not recover
                    if !cb_failed.swap(true, Ordering::AcqRel) {
                        let _ = fault_tx.send(DeviceEvent::Failed(err.to_string()));
                    }
                },
                None,
            )
            .map_err(|e| Error::PlaybackDevice(e.to_string()))?;

        stream
            .play()
            .map_err(|e| Error::PlaybackDevice(e.to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels = config.channels,
            "audio output initialized"
        );

        Ok((
            Self {
                stream: Some(stream),
                sample_rate,
                timeline,
                frames,
                failed,
                next_id: 0,
            },
            events_rx,
        ))
    }
}

impl OutputDevice for CpalOutput {
    #[allow(clippy::cast_precision_loss)]
    fn current_time(&self) -> f64 {
        self.frames.load(Ordering::Acquire) as f64 / f64::from(self.sample_rate)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn schedule(&mut self, buffer: &AudioBuffer, start_time: f64) -> Result<PlaybackId> {
        if self.stream.is_none() {
            return Err(Error::PlaybackDevice("output device closed".to_string()));
        }
        if self.failed.load(Ordering::Acquire) {
            return Err(Error::PlaybackDevice("output stream failed".to_string()));
        }
        if buffer.sample_rate() != self.sample_rate {
            return Err(Error::PlaybackDevice(format!(
                "buffer rate {} Hz does not match device rate {} Hz",
                buffer.sample_rate(),
                self.sample_rate
            )));
        }

        let requested = (start_time.max(0.0) * f64::from(self.sample_rate)).round() as u64;
        let start_frame = requested.max(self.frames.load(Ordering::Acquire));

        let id = PlaybackId(self.next_id);
        self.next_id += 1;

        self.timeline
            .lock()
            .map_err(|_| Error::PlaybackDevice("output timeline poisoned".to_string()))?
            .scheduled
            .push_back(Scheduled {
                id,
                start_frame,
                samples: buffer.samples().to_vec(),
            });

        tracing::trace!(id = id.0, start_frame, frames = buffer.len(), "buffer scheduled");
        Ok(id)
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            if let Ok(mut timeline) = self.timeline.lock() {
                timeline.scheduled.clear();
            }
            tracing::debug!("audio output closed");
        }
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.close();
    }
}
