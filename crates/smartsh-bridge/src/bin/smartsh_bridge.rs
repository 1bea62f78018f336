//! Bridge entrypoint: parse CLI flags, ensure a daemon is reachable
//! (autostarting one if not), then serve the stdio JSON-RPC loop.
//!
//! Tracing is configured to write to stderr only -- stdout is reserved for
//! protocol frames, the same separation `smartsh-daemon`'s own entrypoint
//! draws between its HTTP responses and its log stream.

use clap::Parser;
use smartsh_bridge::{autostart, Bridge, BridgeState, DaemonClient};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "smartsh-bridge", about = "smartsh stdio tool-protocol bridge")]
struct Cli {
    /// Base URL of the smartsh daemon to talk to.
    #[arg(long, env = "SMARTSH_DAEMON_URL", default_value = "http://127.0.0.1:8787")]
    daemon_url: String,

    /// Bind address passed to an autostarted daemon.
    #[arg(long, env = "SMARTSH_DAEMON_BIND", default_value = "127.0.0.1:8787")]
    daemon_bind: String,

    /// Shared bearer token, if the daemon requires one.
    #[arg(long, env = "SMARTSH_DAEMON_TOKEN")]
    auth_token: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let client = DaemonClient::new(cli.daemon_url, cli.auth_token);
    if let Err(e) = autostart::ensure_running(&client, &cli.daemon_bind).await {
        tracing::error!(error = %e, "could not reach or start smartsh-daemon");
        return Err(e.to_string().into());
    }

    let bridge = Bridge::new(BridgeState::new(client));
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    bridge.serve(stdin).await?;
    Ok(())
}
