//! WebSocket voice session: forwards commands, routes backend events, and
//! feeds audio chunks to the playback scheduler

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use crate::protocol::{ClientCommand, ServerEvent};
use crate::voice::{CpalOutput, DeviceEvent, OutputDevice, PlaybackEvent, PlaybackScheduler};
use crate::{Error, Result};

/// WebSocket connection to the backend
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Events surfaced to the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Live transcript of the user's speech
    Transcript(String),
    /// The user's turn ended
    TurnEnded,
    /// AI response text
    Response(String),
    /// Backend status line
    Status(String),
    /// Backend, decode, or device error
    Error(String),
    /// The agent finished speaking an utterance
    PlaybackComplete,
    /// The backend closed the connection
    Disconnected,
}

impl From<PlaybackEvent> for SessionEvent {
    fn from(event: PlaybackEvent) -> Self {
        match event {
            PlaybackEvent::PlaybackComplete => Self::PlaybackComplete,
            PlaybackEvent::Error(msg) => Self::Error(msg),
        }
    }
}

/// Connect to the backend's voice WebSocket
///
/// # Errors
///
/// Returns `Error::Transport` if the handshake fails
pub async fn connect(url: &Url) -> Result<WsStream> {
    let (ws, response) = connect_async(url.as_str()).await?;
    tracing::info!(url = %url, status = %response.status(), "connected to voice agent");
    Ok(ws)
}

/// One voice session over a WebSocket connection
pub struct VoiceSession<D: OutputDevice> {
    scheduler: PlaybackScheduler<D>,
    playback_events: mpsc::UnboundedReceiver<PlaybackEvent>,
    device_events: mpsc::UnboundedReceiver<DeviceEvent>,
}

impl VoiceSession<CpalOutput> {
    /// Create a session playing through the default output device
    ///
    /// # Errors
    ///
    /// Returns `Error::PlaybackDevice` if the device cannot be opened
    pub fn with_default_output(sample_rate: u32) -> Result<Self> {
        let (device, device_events) = CpalOutput::open(sample_rate)?;
        Ok(Self::new(device, sample_rate, device_events))
    }
}

impl<D: OutputDevice> VoiceSession<D> {
    /// Create a session over `device`, which reports on `device_events`
    pub fn new(
        device: D,
        sample_rate: u32,
        device_events: mpsc::UnboundedReceiver<DeviceEvent>,
    ) -> Self {
        let (scheduler, playback_events) = PlaybackScheduler::new(device, sample_rate);
        Self {
            scheduler,
            playback_events,
            device_events,
        }
    }

    /// The session's playback scheduler
    #[must_use]
    pub const fn scheduler(&self) -> &PlaybackScheduler<D> {
        &self.scheduler
    }

    /// Drive the session until the user quits or the backend disconnects
    ///
    /// Commands from `commands` are sent to the backend; closing the command
    /// channel ends the session immediately. When the backend disconnects,
    /// queued audio is allowed to finish first. The output device is closed
    /// on return.
    ///
    /// # Errors
    ///
    /// Returns `Error::Transport` if the WebSocket fails
    pub async fn run<S>(
        mut self,
        mut ws: S,
        mut commands: mpsc::Receiver<ClientCommand>,
        ui: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<()>
    where
        S: Stream<Item = std::result::Result<Message, tungstenite::Error>>
            + Sink<Message, Error = tungstenite::Error>
            + Unpin,
    {
        let mut ws_open = true;

        let outcome = loop {
            if !ws_open && self.scheduler.is_idle() {
                break Ok(());
            }

            tokio::select! {
                frame = ws.next(), if ws_open => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_text(text.as_str(), &ui),
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "backend closed the connection");
                        ws_open = false;
                        let _ = ui.send(SessionEvent::Disconnected);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Err(Error::from(e)),
                    None => {
                        ws_open = false;
                        let _ = ui.send(SessionEvent::Disconnected);
                    }
                },
                Some(event) = self.device_events.recv() => {
                    if let Err(e) = self.scheduler.on_device_event(event) {
                        tracing::warn!(error = %e, "playback halted");
                    }
                }
                Some(event) = self.playback_events.recv() => {
                    let _ = ui.send(event.into());
                }
                command = commands.recv() => match command {
                    Some(command) => {
                        if command == ClientCommand::Start {
                            self.scheduler.reset();
                        }
                        if !ws_open {
                            let _ = ui.send(SessionEvent::Error(format!(
                                "not connected, cannot send '{command}'"
                            )));
                            continue;
                        }
                        tracing::debug!(%command, "sending command");
                        if let Err(e) = ws.send(Message::Text(command.to_string().into())).await {
                            break Err(Error::from(e));
                        }
                    }
                    None => {
                        tracing::debug!("command channel closed, ending session");
                        if ws_open {
                            let _ = ws.close().await;
                        }
                        break Ok(());
                    }
                },
            }
        };

        self.scheduler.close();
        while let Ok(event) = self.playback_events.try_recv() {
            let _ = ui.send(event.into());
        }
        outcome
    }

    fn handle_text(&mut self, text: &str, ui: &mpsc::UnboundedSender<SessionEvent>) {
        let event = match ServerEvent::parse(text) {
            ServerEvent::Audio { data, is_final } => {
                if let Err(e) = self.scheduler.submit_chunk(&data, is_final) {
                    // Decode and device failures are already reported as playback events
                    tracing::debug!(error = %e, is_final, "audio chunk not scheduled");
                }
                return;
            }
            ServerEvent::Transcript(text) => SessionEvent::Transcript(text),
            ServerEvent::TurnEnded => SessionEvent::TurnEnded,
            ServerEvent::Response(text) => SessionEvent::Response(text),
            ServerEvent::Status(text) => SessionEvent::Status(text),
            ServerEvent::Error(text) => SessionEvent::Error(text),
        };
        let _ = ui.send(event);
    }
}
