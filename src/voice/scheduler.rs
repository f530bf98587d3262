//! Gapless playback scheduling for streamed audio chunks
//!
//! Chunks arrive one by one over the transport, are decoded into buffers and
//! queued, then handed to the output device strictly one at a time. Each
//! buffer starts at `max(next_start_time, audio clock)` so consecutive chunks
//! line up end to start on the device clock. When the final chunk of an
//! utterance finishes playing, timing and header state reset for the next one.

use std::collections::VecDeque;

use tokio::sync::mpsc;

use super::chunk::{AudioChunk, decode_chunk};
use super::output::{DeviceEvent, OutputDevice, PlaybackId};
use crate::{Error, Result};

/// Notifications raised by the scheduler for the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// The final chunk of an utterance finished playing
    PlaybackComplete,
    /// A chunk could not be decoded, or the device failed
    Error(String),
}

/// Snapshot of the scheduler's timing state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerState {
    pub is_playing: bool,
    pub next_start_time: f64,
    pub is_first_chunk_of_utterance: bool,
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self {
            is_playing: false,
            next_start_time: 0.0,
            is_first_chunk_of_utterance: true,
        }
    }
}

/// The chunk currently handed to the device
#[derive(Debug, Clone, Copy)]
struct InFlight {
    id: PlaybackId,
    is_final: bool,
    utterance: u64,
}

/// Sequential, gapless scheduler over an [`OutputDevice`]
///
/// Owned by a single event loop; every method runs to completion, so the
/// queue has exactly one consumer and at most one chunk is in flight.
pub struct PlaybackScheduler<D: OutputDevice> {
    device: D,
    sample_rate: u32,
    queue: VecDeque<AudioChunk>,
    state: SchedulerState,
    in_flight: Option<InFlight>,
    /// Utterance number assigned to submitted chunks
    utterance: u64,
    /// A final chunk was submitted; the next submission opens a new utterance
    boundary_pending: bool,
    /// Completions of chunks from utterances below this are stale
    discard_before: u64,
    halted: Option<String>,
    closed: bool,
    events: mpsc::UnboundedSender<PlaybackEvent>,
}

impl<D: OutputDevice> PlaybackScheduler<D> {
    /// Create a scheduler playing through `device` at `sample_rate`
    ///
    /// Returns the scheduler and the receiver for its [`PlaybackEvent`]s.
    pub fn new(device: D, sample_rate: u32) -> (Self, mpsc::UnboundedReceiver<PlaybackEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            device,
            sample_rate,
            queue: VecDeque::new(),
            state: SchedulerState::default(),
            in_flight: None,
            utterance: 0,
            boundary_pending: false,
            discard_before: 0,
            halted: None,
            closed: false,
            events,
        };
        (scheduler, events_rx)
    }

    /// Decode an encoded chunk, queue it, and dispatch if the device is free
    ///
    /// # Errors
    ///
    /// Returns `Error::Decode` if the payload is malformed; the chunk is
    /// dropped and scheduler state is untouched. Returns
    /// `Error::PlaybackDevice` if the scheduler is closed or the device has
    /// failed; in the latter case the chunk is still queued.
    pub fn submit_chunk(&mut self, encoded: &str, is_final: bool) -> Result<()> {
        if self.closed {
            return Err(Error::PlaybackDevice("scheduler closed".to_string()));
        }

        let strip = self.state.is_first_chunk_of_utterance || self.boundary_pending;
        let buffer = match decode_chunk(encoded, strip, self.sample_rate) {
            Ok(buffer) => buffer,
            Err(e) => {
                tracing::warn!(error = %e, "dropping undecodable audio chunk");
                self.emit(PlaybackEvent::Error(e.to_string()));
                return Err(e);
            }
        };

        if self.boundary_pending {
            self.utterance += 1;
            self.boundary_pending = false;
        }
        self.state.is_first_chunk_of_utterance = false;
        if is_final {
            self.boundary_pending = true;
        }

        tracing::debug!(
            samples = buffer.len(),
            stripped_header = strip,
            is_final,
            utterance = self.utterance,
            queued = self.queue.len(),
            "audio chunk queued"
        );

        self.queue.push_back(AudioChunk {
            buffer,
            is_final,
            utterance: self.utterance,
        });

        if let Some(reason) = &self.halted {
            return Err(Error::PlaybackDevice(reason.clone()));
        }

        self.dispatch_next()
    }

    /// Handle the device reporting that a scheduled buffer finished
    ///
    /// Unknown or stale ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns `Error::PlaybackDevice` if dispatching the next chunk fails
    pub fn on_playback_finished(&mut self, id: PlaybackId) -> Result<()> {
        let Some(chunk) = self.in_flight.filter(|c| c.id == id) else {
            tracing::debug!(id = id.0, "ignoring completion for unknown buffer");
            return Ok(());
        };
        self.in_flight = None;
        self.state.is_playing = false;

        if chunk.utterance < self.discard_before {
            tracing::debug!(id = id.0, "discarded buffer finished");
            if self.queue.is_empty() {
                self.state.next_start_time = 0.0;
            }
        } else if chunk.is_final {
            self.finish_utterance(chunk.utterance);
        }

        self.dispatch_next()
    }

    /// Handle the output stream failing
    ///
    /// The buffer on the device is lost and dispatching halts; queued chunks
    /// are kept for after a [`reset`](Self::reset).
    ///
    /// # Errors
    ///
    /// Always returns `Error::PlaybackDevice` carrying `reason`
    pub fn on_device_error(&mut self, reason: &str) -> Result<()> {
        let err = Error::PlaybackDevice(reason.to_string());
        if self.closed || self.halted.is_some() {
            return Err(err);
        }

        tracing::error!(
            error = %err,
            in_flight = self.in_flight.map(|c| c.id.0),
            queued = self.queue.len(),
            "output device failed, halting playback"
        );
        self.in_flight = None;
        self.state.is_playing = false;
        self.halted = Some(err.to_string());
        self.emit(PlaybackEvent::Error(err.to_string()));
        Err(err)
    }

    /// Route one report from the output device
    ///
    /// # Errors
    ///
    /// Returns `Error::PlaybackDevice` if the device failed or the next
    /// chunk could not be dispatched
    pub fn on_device_event(&mut self, event: DeviceEvent) -> Result<()> {
        match event {
            DeviceEvent::Finished(id) => self.on_playback_finished(id),
            DeviceEvent::Failed(reason) => self.on_device_error(&reason),
        }
    }

    /// Drop queued audio and start over with a fresh utterance
    ///
    /// A buffer already handed to the device plays out; the next one is
    /// scheduled after it.
    pub fn reset(&mut self) {
        let dropped = self.queue.len();
        self.queue.clear();
        self.halted = None;
        self.utterance += 1;
        self.discard_before = self.utterance;
        self.boundary_pending = false;
        self.state.is_first_chunk_of_utterance = true;
        if self.in_flight.is_none() {
            self.state.next_start_time = 0.0;
        }
        tracing::debug!(dropped, "playback scheduler reset");
    }

    /// Stop playback for good and release the output device
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.queue.clear();
        self.in_flight = None;
        self.state.is_playing = false;
        self.device.close();
        tracing::debug!("playback scheduler closed");
    }

    /// Current timing state
    #[must_use]
    pub const fn state(&self) -> SchedulerState {
        self.state
    }

    /// Number of chunks waiting behind the one in flight
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Nothing is playing and nothing more can be dispatched
    #[must_use]
    pub fn is_idle(&self) -> bool {
        !self.state.is_playing && (self.queue.is_empty() || self.halted.is_some() || self.closed)
    }

    /// Device failure that halted dispatching, if any
    #[must_use]
    pub fn fault(&self) -> Option<&str> {
        self.halted.as_deref()
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    #[must_use]
    pub const fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    fn finish_utterance(&mut self, utterance: u64) {
        self.state.next_start_time = 0.0;
        if utterance == self.utterance {
            self.state.is_first_chunk_of_utterance = true;
            self.boundary_pending = false;
        }
        tracing::debug!(utterance, "utterance playback complete");
        self.emit(PlaybackEvent::PlaybackComplete);
    }

    fn dispatch_next(&mut self) -> Result<()> {
        if self.state.is_playing || self.halted.is_some() || self.closed {
            return Ok(());
        }
        let Some(chunk) = self.queue.pop_front() else {
            return Ok(());
        };

        self.state.is_playing = true;
        let start = self.state.next_start_time.max(self.device.current_time());

        match self.device.schedule(&chunk.buffer, start) {
            Ok(id) => {
                self.state.next_start_time = start + chunk.buffer.duration();
                self.in_flight = Some(InFlight {
                    id,
                    is_final: chunk.is_final,
                    utterance: chunk.utterance,
                });
                tracing::trace!(
                    id = id.0,
                    start,
                    end = self.state.next_start_time,
                    "chunk dispatched"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "output device rejected chunk, halting playback");
                self.state.is_playing = false;
                self.queue.push_front(chunk);
                self.halted = Some(e.to_string());
                self.emit(PlaybackEvent::Error(e.to_string()));
                Err(e)
            }
        }
    }

    fn emit(&self, event: PlaybackEvent) {
        // Receiver may be gone during shutdown
        let _ = self.events.send(event);
    }
}
