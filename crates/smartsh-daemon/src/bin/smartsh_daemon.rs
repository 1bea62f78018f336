//! Daemon entrypoint: parse CLI flags, acquire the startup lock, open the
//! job store, install the metrics recorder, and serve HTTP until a shutdown
//! signal arrives.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use smartsh_daemon::{AppState, DaemonConfig};
use smartsh_summarize::Provider;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "smartsh-daemon", about = "smartsh execution broker daemon")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Address to bind the HTTP server to.
    #[arg(long, env = "SMARTSH_DAEMON_BIND")]
    bind: Option<SocketAddr>,

    /// Directory holding the job store, lock file, and terminal session
    /// artifacts.
    #[arg(long, env = "SMARTSH_DAEMON_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Shared bearer token required on every request. Unset disables auth.
    #[arg(long, env = "SMARTSH_DAEMON_TOKEN")]
    auth_token: Option<String>,

    /// Output summarizer provider.
    #[arg(long, value_enum, default_value = "deterministic")]
    summarizer: SummarizerArg,

    /// Ollama HTTP endpoint, used when `--summarizer` is `ollama`/`hybrid`.
    #[arg(long, env = "SMARTSH_OLLAMA_ENDPOINT")]
    ollama_endpoint: Option<String>,

    /// Ollama model name.
    #[arg(long, env = "SMARTSH_OLLAMA_MODEL")]
    ollama_model: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum SummarizerArg {
    Deterministic,
    Ollama,
    Hybrid,
}

impl From<SummarizerArg> for Provider {
    fn from(value: SummarizerArg) -> Self {
        match value {
            SummarizerArg::Deterministic => Self::Deterministic,
            SummarizerArg::Ollama => Self::Ollama,
            SummarizerArg::Hybrid => Self::Hybrid,
        }
    }
}

#[derive(clap::Subcommand)]
enum Command {
    /// Register the daemon as a platform service (systemd/launchd/Windows
    /// service manager, as appropriate for the host).
    InstallService,
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    if matches!(cli.command, Some(Command::InstallService)) {
        eprintln!("install-service is not implemented on this platform; run the daemon directly under your service manager of choice");
        return Ok(());
    }

    let mut config = DaemonConfig::default();
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    config.auth_token = cli.auth_token;
    config.summarizer = cli.summarizer.into();
    if let Some(endpoint) = cli.ollama_endpoint {
        config.ollama_endpoint = endpoint;
    }
    if let Some(model) = cli.ollama_model {
        config.ollama_model = model;
    }

    let lock_path = config.lock_path();
    let bind_str = config.bind_addr.to_string();
    let _lock = match smartsh_daemon::lock::acquire(&lock_path, &bind_str).await {
        Ok(lock) => lock,
        Err(e) => {
            error!(error = %e, "could not acquire daemon lock");
            return Err(e.to_string().into());
        },
    };

    let store = smartsh_store::JobStore::open(&config.data_dir).await?;
    let metrics = smartsh_metrics::init_metrics()?;
    let bind_addr = config.bind_addr;
    let state = AppState::new(config, store, metrics);

    let app = smartsh_daemon::routes::router(state);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = %bind_addr, "smartsh-daemon listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("smartsh-daemon shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let Ok(mut sigterm) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        else {
            std::future::pending::<()>().await;
            return;
        };
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
