//! Command-line front end for the parley orchestration layer.
//!
//! Backend locations come from `PARLEY_*` environment variables and can be
//! overridden per invocation.
//!
//! # Examples
//!
//! ```sh
//! # One turn, printed as the reply text
//! parley send "Summarize the plot of Dune"
//!
//! # Code mode, then dump the conversation as Markdown
//! parley send --mode code "Write a binary search" --export markdown
//!
//! # Which provider would handle this?
//! parley route "debug this function"
//!
//! # Follow a room's realtime events until Ctrl-C
//! parley listen --room demo
//!
//! # Render an ePub, wait for it, and save the file
//! parley export-job --kind epub --payload book.json --out book.epub
//!
//! # Summarize a document
//! parley analyze notes.txt
//! ```

use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use parley::api::jobs::{ExportKind, PollConfig};
use parley::api::providers::SendOptions;
use parley::api::retry::{RetryConfig, TokioSleeper};
use parley::channel::{ChannelEvent, ChannelState, EventKind};
use parley::config::PlatformConfig;
use parley::conversation::{ExportFormat, Mode};
use parley::services::Services;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "parley", version)]
struct Cli {
    // ── Backends ───────────────────────────────────────────────
    /// Chat backend base URL (overrides PARLEY_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Media backend base URL (overrides PARLEY_MEDIA_URL)
    #[arg(long, global = true)]
    media_url: Option<String>,

    /// Realtime WebSocket URL (overrides PARLEY_WS_URL)
    #[arg(long, global = true)]
    ws_url: Option<String>,

    /// Bearer token (overrides PARLEY_AUTH_TOKEN)
    #[arg(long, global = true)]
    token: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Total attempts per provider call
    #[arg(long, global = true, default_value_t = 3)]
    attempts: u32,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send one message and print the reply
    Send {
        text: String,

        /// Conversation mode (chat, documents, code, audio)
        #[arg(long, default_value = "chat")]
        mode: Mode,

        /// Synthesize speech for audio-mode replies
        #[arg(long)]
        audio: bool,

        /// Maximum tokens in the reply
        #[arg(long)]
        max_tokens: Option<u32>,

        /// Print the conversation afterwards (json, markdown, text)
        #[arg(long)]
        export: Option<ExportFormat>,
    },

    /// Print which provider a message would be routed to
    Route {
        text: String,

        #[arg(long, default_value = "chat")]
        mode: Mode,
    },

    /// Join a room and print realtime events until Ctrl-C
    Listen {
        /// Room to join (defaults to PARLEY_ROOM)
        #[arg(long)]
        room: Option<String>,

        /// Send this message once the channel is open
        #[arg(long)]
        say: Option<String>,
    },

    /// Check both backends
    Health,

    /// Submit an export job and wait for it to finish
    ExportJob {
        /// Export kind (epub, mobile, animation)
        #[arg(long)]
        kind: ExportKind,

        /// JSON file with the job payload
        #[arg(long)]
        payload: PathBuf,

        /// Seconds between status polls
        #[arg(long, default_value_t = 2)]
        interval_secs: u64,

        /// Give up after this many seconds
        #[arg(long, default_value_t = 300)]
        deadline_secs: u64,

        /// Download the finished artifact to this path
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// List the voices available for speech synthesis
    Voices,

    /// Send a document for analysis and print the result
    Analyze {
        /// File to analyze
        file: PathBuf,

        /// Document type reported to the backend
        #[arg(long, default_value = "text")]
        kind: String,
    },
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(level);
    tracing_subscriber::registry().with(layer).init();
}

fn build_config(cli: &Cli) -> PlatformConfig {
    let mut config = PlatformConfig::from_env()
        .with_retry(RetryConfig::with_attempts(cli.attempts));
    if let Some(url) = &cli.api_url {
        config = config.with_api_url(url);
    }
    if let Some(url) = &cli.media_url {
        config = config.with_media_url(url);
    }
    if let Some(url) = &cli.ws_url {
        config = config.with_ws_url(url);
    }
    if let Some(token) = &cli.token {
        config = config.with_auth_token(token);
    }
    if let Some(secs) = cli.timeout_secs {
        config = config.with_request_timeout(Duration::from_secs(secs));
    }
    config
}

/// Read and parse a JSON job payload.
fn load_payload(path: &Path) -> Result<Value, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    serde_json::from_str(&text).map_err(|e| format!("invalid JSON in {}: {e}", path.display()))
}

/// Write a downloaded artifact, creating parent directories as needed.
fn save_artifact(path: &Path, bytes: &[u8]) -> Result<(), String> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("failed to create {}: {e}", parent.display()))?;
    }
    std::fs::write(path, bytes).map_err(|e| format!("failed to write {}: {e}", path.display()))
}

fn describe(event: &ChannelEvent) -> String {
    match event {
        ChannelEvent::JoinRoom { room_id } => format!("join-room {room_id}"),
        ChannelEvent::Message { data } => format!("message [{}] {}", data.mode, data.message),
        ChannelEvent::MessageProcessing { data } => format!("processing ({})", data.status),
        ChannelEvent::MessageResponse { data } => match data.mode {
            Some(mode) => format!("response [{mode}] {}", data.response),
            None => format!("response {}", data.response),
        },
        ChannelEvent::Error { data } => format!("error {}", data.message),
        ChannelEvent::Unknown { kind, data } => format!("{kind} {data}"),
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let config = build_config(&cli);
    let services = Services::from_config(config).map_err(|e| e.to_string())?;

    match cli.command {
        Command::Send {
            text,
            mode,
            audio,
            max_tokens,
            export,
        } => {
            let orchestrator = services.orchestrator();
            let mut options = SendOptions::default().with_audio(audio);
            options.max_tokens = max_tokens;

            let reply = orchestrator.send_message(&text, mode, &options).await;
            if reply.is_error() {
                return Err(reply.text);
            }
            println!("{}", reply.text);
            if let Some(meta) = &reply.metadata {
                info!("model: {} | {}", meta.model, orchestrator.usage_summary());
            }
            if reply.audio_data.is_some() {
                println!("[audio attached: {:.1}s]", reply.audio_duration.unwrap_or(0.0));
            }
            if let Some(format) = export {
                println!("\n{}", orchestrator.export(format).map_err(|e| e.to_string())?);
            }
        }

        Command::Route { text, mode } => {
            let (provider, reason) = services.router.route(&text, mode);
            println!("{provider} ({reason:?})");
        }

        Command::Listen { room, say } => {
            let room = room.unwrap_or_else(|| services.config.default_room.clone());
            let channel = services.channel.clone();
            for kind in [
                EventKind::JoinRoom,
                EventKind::Message,
                EventKind::MessageProcessing,
                EventKind::MessageResponse,
                EventKind::Error,
                EventKind::Unknown,
            ] {
                channel.subscribe(kind, |event| println!("{}", describe(event)));
            }

            channel.connect(room.clone()).await;
            if let Some(text) = say {
                channel.wait_for_state(ChannelState::Open).await;
                channel.send(&text, Mode::Chat, &room);
            }
            tokio::signal::ctrl_c()
                .await
                .map_err(|e| format!("failed to wait for Ctrl-C: {e}"))?;
            channel.disconnect().await;
        }

        Command::Health => {
            let health = services.health().await;
            let json = serde_json::to_string_pretty(&health).map_err(|e| e.to_string())?;
            println!("{json}");
            if !health.all_healthy() {
                return Err("one or more backends are unhealthy".into());
            }
        }

        Command::ExportJob {
            kind,
            payload,
            interval_secs,
            deadline_secs,
            out,
        } => {
            let payload = load_payload(&payload)?;
            let ticket = services
                .jobs
                .submit(kind, &payload)
                .await
                .map_err(|e| e.to_string())?;
            println!("submitted {kind} job {}", ticket.task_id);

            let poll = PollConfig {
                interval: Duration::from_secs(interval_secs),
                deadline: Duration::from_secs(deadline_secs),
            };
            let report = services
                .jobs
                .wait_for_completion(kind, &ticket.task_id, &poll, &TokioSleeper, &CancellationToken::new())
                .await
                .map_err(|e| e.to_string())?;
            let details = serde_json::to_string_pretty(&report.details).map_err(|e| e.to_string())?;
            println!("{:?}\n{details}", report.status);
            if let Some(error) = report.error {
                return Err(error);
            }
            if let Some(path) = out {
                let bytes = services
                    .jobs
                    .download(kind, &ticket.task_id)
                    .await
                    .map_err(|e| e.to_string())?;
                save_artifact(&path, &bytes)?;
                println!("saved {} bytes to {}", bytes.len(), path.display());
            }
        }

        Command::Voices => {
            let voices = services.speech.voices().await.map_err(|e| e.to_string())?;
            for voice in voices {
                let language = voice.language.as_deref().unwrap_or("-");
                println!("{:<10} {:<10} {language}", voice.id, voice.name);
            }
        }

        Command::Analyze { file, kind } => {
            let content = std::fs::read_to_string(&file)
                .map_err(|e| format!("failed to read {}: {e}", file.display()))?;
            let analysis = services
                .documents
                .analyze_document(&content, &kind)
                .await
                .map_err(|e| e.to_string())?;
            let json = serde_json::to_string_pretty(&analysis).map_err(|e| e.to_string())?;
            println!("{json}");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn payload_loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"title": "Dune", "chapters": []}}"#).unwrap();
        let payload = load_payload(file.path()).unwrap();
        assert_eq!(payload["title"], "Dune");
    }

    #[test]
    fn invalid_payload_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = load_payload(file.path()).unwrap_err();
        assert!(err.contains("invalid JSON"));
    }

    #[test]
    fn artifact_is_saved_under_new_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exports").join("book.epub");
        save_artifact(&path, b"PK\x03\x04").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"PK\x03\x04");
    }

    #[test]
    fn export_job_accepts_out_path() {
        let cli = Cli::try_parse_from([
            "parley", "export-job", "--kind", "epub", "--payload", "book.json", "--out", "book.epub",
        ])
        .unwrap();
        match cli.command {
            Command::ExportJob { kind, out, .. } => {
                assert_eq!(kind, ExportKind::Epub);
                assert_eq!(out, Some(PathBuf::from("book.epub")));
            }
            _ => panic!("expected export-job"),
        }
    }

    #[test]
    fn cli_parses_send_with_technical_alias() {
        let cli = Cli::try_parse_from(["parley", "send", "--mode", "technical", "hello"]).unwrap();
        match cli.command {
            Command::Send { mode, text, .. } => {
                assert_eq!(mode, Mode::Code);
                assert_eq!(text, "hello");
            }
            _ => panic!("expected send"),
        }
    }

    #[test]
    fn flags_override_environment() {
        let cli = Cli::try_parse_from([
            "parley",
            "--api-url",
            "http://api.test/api",
            "--attempts",
            "5",
            "health",
        ])
        .unwrap();
        let config = build_config(&cli);
        assert_eq!(config.api_base_url, "http://api.test/api");
        assert_eq!(config.retry.max_attempts, 5);
    }
}
