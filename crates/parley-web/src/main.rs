//! Run the parley room relay.
//!
//! By default each room's messages are answered through a parley
//! orchestrator configured from `PARLEY_*` environment variables.
//!
//! ```sh
//! parley-web --port 5000
//! parley-web --echo --token secret
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use parley::api::providers::SendOptions;
use parley::config::PlatformConfig;
use parley::services::Services;
use parley_web::{EchoResponder, OrchestratorResponder, Responder, WebConfig, spawn_web};
use tracing::info;
use tracing_subscriber::Layer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "parley-web", about = "Realtime room relay for parley")]
struct Args {
    /// Port to listen on
    #[arg(long, default_value_t = 5000)]
    port: u16,

    /// Require this token on WebSocket connections
    #[arg(long)]
    token: Option<String>,

    /// Answer with canned replies instead of calling the backends
    #[arg(long)]
    echo: bool,

    /// Delay before each canned reply, in milliseconds (with --echo)
    #[arg(long, default_value_t = 0)]
    echo_delay_ms: u64,

    /// Synthesize speech for audio-mode replies
    #[arg(long)]
    audio: bool,

    /// Serve static front-end files from this directory
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let args = Args::parse();

    let level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(level))
        .init();

    let responder: Arc<dyn Responder> = if args.echo {
        Arc::new(EchoResponder::new(Duration::from_millis(args.echo_delay_ms)))
    } else {
        let services = Services::from_config(PlatformConfig::from_env()).map_err(|e| e.to_string())?;
        Arc::new(
            OrchestratorResponder::new(services)
                .with_options(SendOptions::default().with_audio(args.audio)),
        )
    };

    let config = WebConfig {
        bind_addr: ([127, 0, 0, 1], args.port).into(),
        auth_token: args.token,
        static_dir: args.static_dir,
        ..Default::default()
    };
    let addr = spawn_web(config, responder)
        .await
        .map_err(|e| format!("failed to bind: {e}"))?;
    info!("Relay listening on ws://{addr}/ws");
    println!("Relay: ws://{addr}/ws");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("failed to wait for Ctrl-C: {e}"))?;
    info!("Shutting down");
    Ok(())
}
