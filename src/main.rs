mod analytics;
mod db;
mod enrollment;
mod ipc;
mod model;
mod relay;
mod report;
mod store;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Attendance tracking sidecar speaking JSON lines over stdin/stdout.
#[derive(Parser, Debug)]
#[command(name = "attendanced", version, about)]
struct Cli {
    /// Workspace directory to open on startup.
    #[arg(long, env = "ATTENDANCED_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Tracing filter directive, e.g. `info` or `attendanced=debug`.
    #[arg(long, env = "ATTENDANCED_LOG", default_value = "info")]
    log_level: String,

    /// Base URL of the Telegram Bot API.
    #[arg(long, env = "ATTENDANCED_TELEGRAM_API", default_value = relay::DEFAULT_TELEGRAM_API)]
    telegram_api_base: String,

    /// Timeout for outbound relay requests, in seconds.
    #[arg(long, default_value_t = 10)]
    relay_timeout_secs: u64,
}

// stdout carries the protocol, so logs go to stderr.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let mut state = ipc::AppState {
        workspace: None,
        db: None,
        relay: ipc::RelayConfig {
            telegram_api_base: cli.telegram_api_base,
            timeout: Duration::from_secs(cli.relay_timeout_secs),
        },
    };

    if let Some(path) = cli.workspace {
        if let Err(e) = ipc::select_workspace(&mut state, path.clone()) {
            tracing::error!(workspace = %path.display(), error = ?e, "startup workspace could not be opened");
        }
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "attendanced ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to echo back.
                tracing::warn!(error = %e, "unparseable request line");
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    tracing::info!("stdin closed, shutting down");
}
