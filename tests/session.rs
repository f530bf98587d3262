//! Voice session integration tests against a mock WebSocket backend

use std::time::Duration;

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::routing::get;
use serde_json::json;
use tokio::sync::mpsc;
use url::Url;
use voice_agent_client::session::{self, SessionEvent};
use voice_agent_client::{ClientCommand, PlaybackId, VoiceSession};

mod common;
use common::{FakeOutput, header_payload, pcm_payload};

const RATE: u32 = 16000;

/// Frames the mock backend sends in reply to "start"
fn utterance_frames() -> Vec<String> {
    vec![
        "Started transcription".to_string(),
        "what's the weather".to_string(),
        "turn_ended".to_string(),
        json!({"type": "response", "data": "Sunny and 24 degrees."}).to_string(),
        json!({"type": "audio", "data": header_payload(&[100; 160]), "is_final": false}).to_string(),
        json!({"type": "audio", "data": pcm_payload(&[-100; 320]), "is_final": false}).to_string(),
        json!({"type": "audio", "data": pcm_payload(&[50; 80]), "is_final": true}).to_string(),
    ]
}

/// Mock backend: answers each "start" with the next script, closing after the last
async fn scripted_backend(mut socket: WebSocket, scripts: Vec<Vec<String>>) {
    let mut scripts = scripts.into_iter().peekable();
    while let Some(Ok(msg)) = socket.recv().await {
        let Message::Text(text) = msg else { continue };
        match text.as_str() {
            "start" => {
                let Some(frames) = scripts.next() else {
                    let reply = "Already transcribing".to_string();
                    let _ = socket.send(Message::Text(reply.into())).await;
                    continue;
                };
                for frame in frames {
                    if socket.send(Message::Text(frame.into())).await.is_err() {
                        return;
                    }
                }
                if scripts.peek().is_none() {
                    let _ = socket.send(Message::Close(None)).await;
                    return;
                }
            }
            "stop" => {
                let reply = "Stopped transcription (saved: recording_20250810.wav)".to_string();
                let _ = socket.send(Message::Text(reply.into())).await;
            }
            other => {
                let reply = format!("Unknown command: {other}");
                let _ = socket.send(Message::Text(reply.into())).await;
            }
        }
    }
}

async fn spawn_backend(scripts: Vec<Vec<String>>) -> Url {
    let app = Router::new().route(
        "/ws",
        get(move |ws: WebSocketUpgrade| {
            let scripts = scripts.clone();
            async move { ws.on_upgrade(move |socket| scripted_backend(socket, scripts)) }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Url::parse(&format!("ws://{addr}/ws")).unwrap()
}

async fn collect(mut ui_rx: mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Some(event) = ui_rx.recv().await {
        events.push(event);
    }
    events
}

/// Receive events into `seen` until one matches `pred`
async fn wait_for(
    ui_rx: &mut mpsc::UnboundedReceiver<SessionEvent>,
    seen: &mut Vec<SessionEvent>,
    pred: impl Fn(&SessionEvent) -> bool,
) {
    loop {
        let event = ui_rx.recv().await.expect("session ended early");
        let done = pred(&event);
        seen.push(event);
        if done {
            return;
        }
    }
}

async fn wait_for_slots(output: &FakeOutput, count: usize) {
    while output.slots().len() < count {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_full_turn_plays_audio_and_reports_events() {
    let url = spawn_backend(vec![utterance_frames()]).await;
    let (device, completions) = FakeOutput::auto_completing();
    let output = device.clone();
    let session = VoiceSession::new(device, RATE, completions);
    let ws = session::connect(&url).await.unwrap();

    let (command_tx, command_rx) = mpsc::channel(4);
    let (ui_tx, ui_rx) = mpsc::unbounded_channel();
    command_tx.send(ClientCommand::Start).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), session.run(ws, command_rx, ui_tx))
        .await
        .expect("session did not finish")
        .unwrap();
    let events = collect(ui_rx).await;

    let text_events: Vec<&SessionEvent> = events
        .iter()
        .filter(|e| !matches!(e, SessionEvent::PlaybackComplete))
        .collect();
    assert_eq!(
        text_events,
        vec![
            &SessionEvent::Status("Started transcription".to_string()),
            &SessionEvent::Transcript("what's the weather".to_string()),
            &SessionEvent::TurnEnded,
            &SessionEvent::Response("Sunny and 24 degrees.".to_string()),
            &SessionEvent::Disconnected,
        ]
    );
    let completes = events
        .iter()
        .filter(|e| matches!(e, SessionEvent::PlaybackComplete))
        .count();
    assert_eq!(completes, 1);

    let slots = output.slots();
    let samples: Vec<usize> = slots.iter().map(|s| s.samples).collect();
    assert_eq!(samples, vec![160, 320, 80]);
    for pair in slots.windows(2) {
        assert_eq!(pair[1].start, pair[0].end());
    }
    assert!(output.state().closed);
}

#[tokio::test]
async fn test_undecodable_audio_is_reported_and_skipped() {
    let frames = vec![
        json!({"type": "audio", "data": "*** not base64 ***", "is_final": true}).to_string(),
        json!({"type": "error", "data": "TTS service unavailable"}).to_string(),
    ];
    let url = spawn_backend(vec![frames]).await;
    let (device, completions) = FakeOutput::auto_completing();
    let output = device.clone();
    let session = VoiceSession::new(device, RATE, completions);
    let ws = session::connect(&url).await.unwrap();

    let (command_tx, command_rx) = mpsc::channel(4);
    let (ui_tx, ui_rx) = mpsc::unbounded_channel();
    command_tx.send(ClientCommand::Start).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), session.run(ws, command_rx, ui_tx))
        .await
        .expect("session did not finish")
        .unwrap();
    let events = collect(ui_rx).await;

    assert!(output.slots().is_empty());
    assert!(!events.contains(&SessionEvent::PlaybackComplete));
    assert!(events.iter().any(
        |e| matches!(e, SessionEvent::Error(msg) if msg.starts_with("decode error"))
    ));
    assert!(events.contains(&SessionEvent::Error("TTS service unavailable".to_string())));
    assert!(events.contains(&SessionEvent::Disconnected));
}

#[tokio::test]
async fn test_closing_command_channel_ends_session() {
    let url = spawn_backend(vec![utterance_frames()]).await;
    let (device, completions) = FakeOutput::auto_completing();
    let output = device.clone();
    let session = VoiceSession::new(device, RATE, completions);
    let ws = session::connect(&url).await.unwrap();

    let (command_tx, command_rx) = mpsc::channel(4);
    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
    command_tx.send(ClientCommand::Stop).await.unwrap();

    let user = async move {
        let status = ui_rx.recv().await;
        drop(command_tx);
        status
    };

    let (result, status) = tokio::time::timeout(
        Duration::from_secs(5),
        async { tokio::join!(session.run(ws, command_rx, ui_tx), user) },
    )
    .await
    .expect("session did not finish");

    result.unwrap();
    assert_eq!(
        status,
        Some(SessionEvent::Status(
            "Stopped transcription (saved: recording_20250810.wav)".to_string()
        ))
    );
    assert!(output.slots().is_empty());
    assert!(output.state().closed);
}

#[tokio::test]
async fn test_new_start_drops_queued_audio() {
    let first = vec![
        "Started transcription".to_string(),
        json!({"type": "audio", "data": header_payload(&[1; 160]), "is_final": false}).to_string(),
        json!({"type": "audio", "data": pcm_payload(&[2; 320]), "is_final": false}).to_string(),
        json!({"type": "audio", "data": pcm_payload(&[3; 80]), "is_final": true}).to_string(),
        json!({"type": "response", "data": "First answer."}).to_string(),
    ];
    let second = vec![
        "Started transcription".to_string(),
        json!({"type": "audio", "data": header_payload(&[4; 40]), "is_final": true}).to_string(),
    ];
    let url = spawn_backend(vec![first, second]).await;
    let (device, device_events) = FakeOutput::manual();
    let output = device.clone();
    let session = VoiceSession::new(device, RATE, device_events);
    let ws = session::connect(&url).await.unwrap();

    let (command_tx, command_rx) = mpsc::channel(4);
    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
    command_tx.send(ClientCommand::Start).await.unwrap();

    let user = {
        let output = output.clone();
        async move {
            let mut events = Vec::new();
            // All of the first answer has arrived; only its first chunk is on the device
            wait_for(&mut ui_rx, &mut events, |e| {
                matches!(e, SessionEvent::Response(_))
            })
            .await;
            assert_eq!(output.slots().len(), 1);

            command_tx.send(ClientCommand::Start).await.unwrap();
            wait_for(&mut ui_rx, &mut events, |e| {
                matches!(e, SessionEvent::Status(_))
            })
            .await;

            output.finish(PlaybackId(0));
            wait_for_slots(&output, 2).await;
            output.finish(PlaybackId(1));

            while let Some(event) = ui_rx.recv().await {
                events.push(event);
            }
            (events, command_tx)
        }
    };

    let (result, (events, _command_tx)) = tokio::time::timeout(
        Duration::from_secs(5),
        async { tokio::join!(session.run(ws, command_rx, ui_tx), user) },
    )
    .await
    .expect("session did not finish");
    result.unwrap();

    let samples: Vec<usize> = output.slots().iter().map(|s| s.samples).collect();
    assert_eq!(samples, vec![160, 40]);
    let completes = events
        .iter()
        .filter(|e| matches!(e, SessionEvent::PlaybackComplete))
        .count();
    assert_eq!(completes, 1);
    assert!(events.contains(&SessionEvent::Disconnected));
}

#[tokio::test]
async fn test_stream_failure_ends_playback_and_session() {
    let url = spawn_backend(vec![utterance_frames()]).await;
    let (device, device_events) = FakeOutput::manual();
    let output = device.clone();
    let session = VoiceSession::new(device, RATE, device_events);
    let ws = session::connect(&url).await.unwrap();

    let (command_tx, command_rx) = mpsc::channel(4);
    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
    command_tx.send(ClientCommand::Start).await.unwrap();

    let user = {
        let output = output.clone();
        async move {
            wait_for_slots(&output, 1).await;
            output.break_stream("device unplugged");

            let mut events = Vec::new();
            while let Some(event) = ui_rx.recv().await {
                events.push(event);
            }
            (events, command_tx)
        }
    };

    let (result, (events, _command_tx)) = tokio::time::timeout(
        Duration::from_secs(5),
        async { tokio::join!(session.run(ws, command_rx, ui_tx), user) },
    )
    .await
    .expect("session hung after the output stream failed");
    result.unwrap();

    assert!(events.contains(&SessionEvent::Error(
        "playback device error: device unplugged".to_string()
    )));
    assert!(!events.contains(&SessionEvent::PlaybackComplete));
    assert_eq!(output.slots().len(), 1);
    assert!(output.state().closed);
}
