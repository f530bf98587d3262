//! Shared test utilities

#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::sync::mpsc;
use voice_agent_client::{AudioBuffer, DeviceEvent, Error, OutputDevice, PlaybackId, Result};

/// A buffer handed to [`FakeOutput`]
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub id: PlaybackId,
    pub start: f64,
    pub duration: f64,
    pub samples: usize,
}

impl Slot {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub now: f64,
    pub slots: Vec<Slot>,
    pub fail_with: Option<String>,
    pub closed: bool,
}

/// Output device with a hand-driven clock that records what it is asked to play
///
/// Clones share state, so a test can keep a handle after moving the device
/// into a scheduler or session.
#[derive(Clone, Default)]
pub struct FakeOutput {
    state: Arc<Mutex<FakeState>>,
    events: Option<mpsc::UnboundedSender<DeviceEvent>>,
    auto_complete: bool,
}

impl FakeOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Device that reports every buffer finished as soon as it is scheduled
    pub fn auto_completing() -> (Self, mpsc::UnboundedReceiver<DeviceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let device = Self {
            events: Some(tx),
            auto_complete: true,
            ..Self::default()
        };
        (device, rx)
    }

    /// Device whose reports are sent by the test through [`finish`](Self::finish)
    /// and [`break_stream`](Self::break_stream)
    pub fn manual() -> (Self, mpsc::UnboundedReceiver<DeviceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let device = Self {
            events: Some(tx),
            ..Self::default()
        };
        (device, rx)
    }

    /// Report a scheduled buffer finished
    pub fn finish(&self, id: PlaybackId) {
        if let Some(tx) = &self.events {
            let _ = tx.send(DeviceEvent::Finished(id));
        }
    }

    /// Fail the stream: report the fault and reject further buffers
    pub fn break_stream(&self, reason: &str) {
        self.fail_with(reason);
        if let Some(tx) = &self.events {
            let _ = tx.send(DeviceEvent::Failed(reason.to_string()));
        }
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake output state poisoned")
    }

    pub fn slots(&self) -> Vec<Slot> {
        self.state().slots.clone()
    }

    pub fn set_time(&self, now: f64) {
        self.state().now = now;
    }

    pub fn fail_with(&self, reason: &str) {
        self.state().fail_with = Some(reason.to_string());
    }

    pub fn recover(&self) {
        self.state().fail_with = None;
    }
}

impl OutputDevice for FakeOutput {
    fn current_time(&self) -> f64 {
        self.state().now
    }

    fn schedule(&mut self, buffer: &AudioBuffer, start_time: f64) -> Result<PlaybackId> {
        let id = {
            let mut state = self.state();
            if state.closed {
                return Err(Error::PlaybackDevice("fake output closed".to_string()));
            }
            if let Some(reason) = &state.fail_with {
                return Err(Error::PlaybackDevice(reason.clone()));
            }
            let id = PlaybackId(state.slots.len() as u64);
            state.slots.push(Slot {
                id,
                start: start_time,
                duration: buffer.duration(),
                samples: buffer.len(),
            });
            id
        };

        if self.auto_complete {
            self.finish(id);
        }
        Ok(id)
    }

    fn close(&mut self) {
        self.state().closed = true;
    }
}

/// Base64 payload of `len` zero bytes
pub fn zero_payload(len: usize) -> String {
    BASE64.encode(vec![0u8; len])
}

/// Base64 payload of little-endian 16-bit samples
pub fn pcm_payload(samples: &[i16]) -> String {
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    BASE64.encode(bytes)
}

/// Base64 payload of a 44-byte header followed by `samples`
pub fn header_payload(samples: &[i16]) -> String {
    let mut bytes = vec![0u8; 44];
    bytes.extend(samples.iter().flat_map(|s| s.to_le_bytes()));
    BASE64.encode(bytes)
}

/// Sine wave at `frequency` Hz
pub fn sine(frequency: f32, sample_rate: u32, duration_secs: f32) -> Vec<f32> {
    let num_samples = (sample_rate as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            0.5 * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}
