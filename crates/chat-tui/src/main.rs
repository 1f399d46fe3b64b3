use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chat_core::config::{ConnectOptions, DEFAULT_HOST, DEFAULT_PORT, Endpoint, SessionConfig};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod client;
mod tui;

#[derive(Parser)]
#[command(name = "chat")]
#[command(about = "Connect to a line-based chat server", long_about = None)]
struct Cli {
    /// Server host name or IP address
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Nickname prefixed to every message
    #[arg(short, long)]
    nick: String,

    /// Connect timeout in seconds (0 waits forever)
    #[arg(long, default_value_t = 10)]
    connect_timeout: u64,

    /// Give up if the server is silent this many seconds (0 never)
    #[arg(long, default_value_t = 0)]
    read_timeout: u64,

    /// Write logs here; the terminal itself is taken by the UI
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn session_config(&self) -> SessionConfig {
        let seconds = |s: u64| (s > 0).then(|| Duration::from_secs(s));
        SessionConfig::new(self.nick.as_str())
            .with_endpoint(Endpoint::new(self.host.as_str(), self.port))
            .with_options(ConnectOptions {
                connect_timeout: seconds(self.connect_timeout),
                read_timeout: seconds(self.read_timeout),
            })
    }
}

fn init_logging(path: &Path) -> std::io::Result<()> {
    let file = File::create(path)?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Some(path) = &cli.log_file
        && let Err(e) = init_logging(path)
    {
        eprintln!("Cannot open log file {}: {}", path.display(), e);
    }

    let config = cli.session_config();
    println!(
        "Connecting to {} as '{}'...",
        config.endpoint, config.nickname
    );

    if let Err(e) = client::start_client(config).await {
        eprintln!("Error: {}", e);
    }
}
