use std::io::BufRead;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use voice_agent_client::api::SERVICES;
use voice_agent_client::history::render_history;
use voice_agent_client::session::{self, SessionEvent};
use voice_agent_client::voice::{
    CpalOutput, DeviceEvent, PlaybackEvent, PlaybackScheduler, samples_to_wav, stream_chunks,
};
use voice_agent_client::{ApiKeyUpdate, BackendClient, ClientCommand, Config, VoiceSession};

/// Voice Agent - talk to a voice assistant backend from the terminal
#[derive(Parser)]
#[command(name = "voice-agent", version, about)]
struct Cli {
    /// Backend base URL (e.g., "http://localhost:8000")
    #[arg(short, long, env = "VOICE_AGENT_URL")]
    server: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start an interactive voice session (default)
    Talk,
    /// Show the chat history
    History {
        /// Delete the history instead of showing it
        #[arg(long)]
        clear: bool,
    },
    /// Manage the backend's third-party API keys
    Keys {
        #[command(subcommand)]
        action: KeysCommand,
    },
    /// Play a test tone through the playback scheduler
    TestSpeaker,
}

#[derive(Subcommand)]
enum KeysCommand {
    /// Show which keys are configured
    Status,
    /// Set one or more keys
    Set(KeyArgs),
    /// Check one or more keys against their services
    Test(KeyArgs),
}

#[derive(Args)]
struct KeyArgs {
    /// AssemblyAI (speech-to-text) key
    #[arg(long)]
    aai: Option<String>,
    /// Gemini (LLM) key
    #[arg(long)]
    gemini: Option<String>,
    /// Murf (text-to-speech) key
    #[arg(long)]
    murf: Option<String>,
    /// OpenWeather key
    #[arg(long)]
    openweather: Option<String>,
}

impl From<KeyArgs> for ApiKeyUpdate {
    fn from(args: KeyArgs) -> Self {
        Self {
            aai: args.aai,
            gemini: args.gemini,
            murf: args.murf,
            openweather: args.openweather,
        }
    }
}

/// A line typed during a voice session
enum Input {
    Command(ClientCommand),
    History,
    Help,
    Quit,
    Unknown(String),
}

impl Input {
    fn parse(line: &str) -> Option<Self> {
        let word = line.trim().to_ascii_lowercase();
        let input = match word.as_str() {
            "" => return None,
            "start" | "s" => Self::Command(ClientCommand::Start),
            "stop" | "x" => Self::Command(ClientCommand::Stop),
            "history" | "h" => Self::History,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            _ => Self::Unknown(word),
        };
        Some(input)
    }
}

const SESSION_HELP: &str = "commands: start | stop | history | help | quit";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,voice_agent_client=info",
        1 => "info,voice_agent_client=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.server.as_deref())?;
    tracing::debug!(?config, "loaded configuration");

    match cli.command.unwrap_or(Command::Talk) {
        Command::Talk => talk(&config).await,
        Command::History { clear } => history(&config, clear).await,
        Command::Keys { action } => keys(&config, action).await,
        Command::TestSpeaker => test_speaker(config.playback.sample_rate).await,
    }
}

/// Interactive voice session
#[allow(clippy::future_not_send)]
async fn talk(config: &Config) -> anyhow::Result<()> {
    let backend = BackendClient::new(config.server_url.clone(), config.request_timeout)?;
    let session = VoiceSession::with_default_output(config.playback.sample_rate)?;
    let ws = session::connect(&config.ws_url).await?;

    let (command_tx, command_rx) = mpsc::channel(8);
    let (ui_tx, ui_rx) = mpsc::unbounded_channel();
    let (input_tx, input_rx) = mpsc::unbounded_channel();

    // Blocking stdin reads stay off the runtime so shutdown never waits on them
    std::thread::spawn(move || read_stdin(&input_tx));
    let router = tokio::spawn(route_input(input_rx, command_tx, backend));
    let printer = tokio::spawn(print_events(ui_rx));

    println!("Connected to {}", config.ws_url);
    println!("{SESSION_HELP}");

    let result = tokio::select! {
        result = session.run(ws, command_rx, ui_tx) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
            Ok(())
        }
    };

    router.abort();
    let _ = printer.await;
    result?;
    Ok(())
}

fn read_stdin(input_tx: &mpsc::UnboundedSender<Input>) {
    for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else { break };
        let Some(input) = Input::parse(&line) else {
            continue;
        };
        let quit = matches!(input, Input::Quit);
        if input_tx.send(input).is_err() || quit {
            break;
        }
    }
}

async fn route_input(
    mut input_rx: mpsc::UnboundedReceiver<Input>,
    command_tx: mpsc::Sender<ClientCommand>,
    backend: BackendClient,
) {
    while let Some(input) = input_rx.recv().await {
        match input {
            Input::Command(command) => {
                if command_tx.send(command).await.is_err() {
                    break;
                }
            }
            Input::History => match backend.chat_history().await {
                Ok(entries) => print!("{}", render_history(&entries)),
                Err(e) => eprintln!("error: failed to load chat history: {e}"),
            },
            Input::Help => println!("{SESSION_HELP}"),
            Input::Quit => break,
            Input::Unknown(word) => println!("unknown command '{word}' ({SESSION_HELP})"),
        }
    }
}

async fn print_events(mut ui_rx: mpsc::UnboundedReceiver<SessionEvent>) {
    while let Some(event) = ui_rx.recv().await {
        match event {
            SessionEvent::Transcript(text) => println!("  you> {text}"),
            SessionEvent::TurnEnded => println!("  -- turn ended, waiting for the agent --"),
            SessionEvent::Response(text) => println!("agent> {text}"),
            SessionEvent::Status(text) => println!("[{text}]"),
            SessionEvent::Error(text) => eprintln!("error: {text}"),
            SessionEvent::PlaybackComplete => println!("[playback complete]"),
            SessionEvent::Disconnected => println!("[disconnected]"),
        }
    }
}

/// Show or clear the chat history
async fn history(config: &Config, clear: bool) -> anyhow::Result<()> {
    let backend = BackendClient::new(config.server_url.clone(), config.request_timeout)?;

    if clear {
        let message = backend.clear_chat_history().await?;
        println!("{message}");
    } else {
        let entries = backend.chat_history().await?;
        print!("{}", render_history(&entries));
    }

    Ok(())
}

/// API key management
async fn keys(config: &Config, action: KeysCommand) -> anyhow::Result<()> {
    let backend = BackendClient::new(config.server_url.clone(), config.request_timeout)?;

    match action {
        KeysCommand::Status => {
            let status = backend.key_status().await?;
            for service in SERVICES {
                let configured = status.get(*service).is_some_and(|s| s.configured);
                let state = if configured { "configured" } else { "missing" };
                println!("{service:<12} {state}");
            }
        }
        KeysCommand::Set(args) => {
            let update = ApiKeyUpdate::from(args);
            if update.is_empty() {
                anyhow::bail!("no keys given (use --aai, --gemini, --murf or --openweather)");
            }
            let response = backend.update_keys(&update).await?;
            if response.updated {
                println!("{}", response.message.as_deref().unwrap_or("API keys updated"));
            } else {
                println!("No keys were changed");
            }
        }
        KeysCommand::Test(args) => {
            let update = ApiKeyUpdate::from(args);
            if update.is_empty() {
                anyhow::bail!("no keys given (use --aai, --gemini, --murf or --openweather)");
            }
            for (service, result) in backend.test_keys(&update).await? {
                let mark = if result.valid { "ok" } else { "FAILED" };
                println!("{service:<12} {mark:<6} {}", result.message);
            }
        }
    }

    Ok(())
}

/// Test speaker output by streaming a tone through the scheduler
#[allow(clippy::future_not_send)]
async fn test_speaker(sample_rate: u32) -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a steady 440Hz tone for 2 seconds, split into chunks\n");

    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let num_samples = (sample_rate as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    let wav = samples_to_wav(&samples, sample_rate)?;
    let chunks = stream_chunks(&wav, wav.len() / 4);

    let (device, mut device_events) = CpalOutput::open(sample_rate)?;
    let (mut scheduler, mut events) = PlaybackScheduler::new(device, sample_rate);

    println!("Streaming {} chunks at {} Hz...", chunks.len(), sample_rate);
    for (data, is_final) in &chunks {
        scheduler.submit_chunk(data, *is_final)?;
    }

    let deadline = Duration::from_secs_f32(duration_secs + 3.0);
    let outcome = tokio::time::timeout(
        deadline,
        drain_playback(&mut scheduler, &mut device_events, &mut events),
    )
    .await;
    scheduler.close();

    match outcome {
        Ok(result) => result?,
        Err(_) => anyhow::bail!("playback did not complete within {deadline:?}"),
    }

    println!("\n---");
    println!("If you heard one continuous tone, gapless playback is working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}

/// Feed device reports to the scheduler until the utterance finishes
async fn drain_playback(
    scheduler: &mut PlaybackScheduler<CpalOutput>,
    device_events: &mut mpsc::UnboundedReceiver<DeviceEvent>,
    events: &mut mpsc::UnboundedReceiver<PlaybackEvent>,
) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            Some(event) = device_events.recv() => scheduler.on_device_event(event)?,
            Some(event) = events.recv() => match event {
                PlaybackEvent::PlaybackComplete => return Ok(()),
                PlaybackEvent::Error(msg) => anyhow::bail!("playback failed: {msg}"),
            },
            else => anyhow::bail!("audio output stopped reporting"),
        }
    }
}
