//! Campus Assistant - college information chat with voice input

mod app;
mod chat;
mod config;
mod input_utils;
mod llm;
mod server;
mod ui;
mod voice;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{BackendKind, LlmConfig, VoiceConfig, DEFAULT_MODEL, DEFAULT_SERVER_URL};
use crate::llm::GeminiClient;
use crate::voice::{
    AudioCaptureSession, CpalInput, DirectTranscriber, Transcriber, UploadTranscriber,
    VoiceInputController,
};

#[derive(Parser, Debug)]
#[command(name = "campus-assistant")]
#[command(about = "College information assistant with voice input")]
#[command(version)]
struct Args {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP relay in front of the LLM API
    Serve {
        /// Address to listen on
        #[arg(short, long, env = "CAMPUS_BIND", default_value = "127.0.0.1:3000")]
        bind: SocketAddr,

        /// Gemini model name
        #[arg(short, long, env = "GEMINI_MODEL", default_value = DEFAULT_MODEL)]
        model: String,
    },

    /// Open the terminal chat widget
    Chat {
        /// Relay server base URL
        #[arg(short, long, env = "CAMPUS_SERVER_URL", default_value = DEFAULT_SERVER_URL)]
        server: String,

        /// Transcription backend
        #[arg(short, long, value_enum, default_value_t = BackendKind::Upload)]
        backend: BackendKind,

        /// Gemini model name (direct backend only)
        #[arg(short, long, env = "GEMINI_MODEL", default_value = DEFAULT_MODEL)]
        model: String,

        /// Give up on a transcription after this many seconds
        #[arg(long, default_value_t = 15)]
        transcribe_timeout_secs: u64,

        /// Capture chunk interval in milliseconds
        #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
        chunk_ms: u64,

        /// Input device name (defaults to the system default microphone)
        #[arg(long)]
        device: Option<String>,
    },

    /// Check microphone support and permission, then exit
    Diagnose {
        /// Input device name (defaults to the system default microphone)
        #[arg(long)]
        device: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // The chat widget owns the terminal, so it only logs when asked to
    let quiet = matches!(args.command, Command::Chat { .. }) && !args.debug;
    let filter = if quiet {
        EnvFilter::new("off")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(if args.debug { "debug" } else { "info" })
        })
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match args.command {
        Command::Serve { bind, model } => {
            let client = GeminiClient::new(LlmConfig::from_env(model))
                .context("failed to build LLM client")?;
            tracing::info!("Relaying to model {}", client.model());
            let state = server::AppState::new(Arc::new(client));
            server::serve(bind, state).await
        }
        Command::Chat {
            server,
            backend,
            model,
            transcribe_timeout_secs,
            chunk_ms,
            device,
        } => {
            let config = VoiceConfig {
                backend,
                server_url: server,
                transcribe_timeout: Duration::from_secs(transcribe_timeout_secs),
                chunk_interval: Duration::from_millis(chunk_ms),
                ..VoiceConfig::default()
            };
            run_chat(config, model, device).await
        }
        Command::Diagnose { device } => {
            let report = voice::diagnose(&CpalInput::new(device)).await;
            println!("{}", report);
            Ok(())
        }
    }
}

async fn run_chat(config: VoiceConfig, model: String, device: Option<String>) -> Result<()> {
    let transcriber: Arc<dyn Transcriber> = match config.backend {
        BackendKind::Upload => Arc::new(UploadTranscriber::new(config.speech_endpoint())),
        BackendKind::Direct => {
            let client = GeminiClient::new(LlmConfig::from_env(model))
                .context("failed to build LLM client")?;
            Arc::new(DirectTranscriber::new(Arc::new(client)))
        }
    };
    tracing::info!("Using {} transcription", transcriber.name());

    let capture = AudioCaptureSession::new(
        Box::new(CpalInput::new(device)),
        config.chunk_interval,
        config.target_sample_rate,
    );

    let (voice_tx, voice_rx) = mpsc::channel(8);
    let controller = VoiceInputController::new(
        capture,
        transcriber.clone(),
        voice_tx,
        config.transcribe_timeout,
    );

    let session = chat::ChatSession::new(&config.server_url);
    let backend_label = transcriber.name().to_string();

    let mut app = app::App::new(session, controller, voice_rx, config.server_url, backend_label)?;
    app.run().await
}
