//! CLI entrypoint: parse flags, resolve the command (literal or via
//! `--agent`), ensure a daemon is reachable, run it to a terminal result,
//! and exit with the contract's status code.

use clap::{Parser, ValueEnum};
use smartsh_bridge::{autostart, DaemonClient};
use smartsh_cli::instruction;
use smartsh_cli::orchestrate::{self, CliOutcome};
use smartsh_cli::planner::{EnvironmentProbe, NullEnvironmentProbe, PassthroughPlanner, Planner};
use smartsh_core::{AllowlistMode, RunRequest};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "smartsh", about = "smartsh: a planner-driven single-shot command runner")]
struct Cli {
    /// Skip the safety pipeline's confirmation gate entirely.
    #[arg(long = "unsafe")]
    r#unsafe: bool,

    /// Auto-approve any risky command instead of prompting.
    #[arg(long)]
    yes: bool,

    /// Emit the RunResponse as JSON instead of human-readable lines.
    #[arg(long)]
    json: bool,

    /// Resolve and report the command without executing it.
    #[arg(long = "dry-run")]
    dry_run: bool,

    /// Treat the trailing arguments (or stdin) as a natural-language
    /// instruction for the planner, instead of a literal command.
    #[arg(long)]
    agent: bool,

    /// Working directory for the resolved command.
    #[arg(long)]
    cwd: Option<String>,

    /// Print planner diagnostics to stderr.
    #[arg(long = "debug-ai")]
    debug_ai: bool,

    #[arg(long = "allowlist-mode", value_enum, default_value = "off")]
    allowlist_mode: AllowlistModeArg,

    #[arg(long = "allowlist-file")]
    allowlist_file: Option<String>,

    #[arg(long, env = "SMARTSH_DAEMON_URL", default_value = "http://127.0.0.1:8787")]
    daemon_url: String,

    #[arg(long, env = "SMARTSH_DAEMON_BIND", default_value = "127.0.0.1:8787")]
    daemon_bind: String,

    #[arg(long, env = "SMARTSH_DAEMON_TOKEN")]
    auth_token: Option<String>,

    #[arg(long, default_value = "info")]
    log_level: String,

    /// The literal command (without `--agent`) or the instruction text
    /// (with `--agent`); falls back to stdin in `--agent` mode when empty.
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum AllowlistModeArg {
    Off,
    Warn,
    Enforce,
}

impl From<AllowlistModeArg> for AllowlistMode {
    fn from(value: AllowlistModeArg) -> Self {
        match value {
            AllowlistModeArg::Off => Self::Off,
            AllowlistModeArg::Warn => Self::Warn,
            AllowlistModeArg::Enforce => Self::Enforce,
        }
    }
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let interrupted = tokio::signal::ctrl_c();
    tokio::select! {
        () = async { let _ = interrupted.await; } => {
            std::process::exit(130);
        }
        code = run(cli) => {
            std::process::exit(code);
        }
    }
}

async fn run(cli: Cli) -> i32 {
    let environment = NullEnvironmentProbe.detect();

    let instruction = if cli.agent {
        match instruction::resolve(&cli.args, std::io::stdin()) {
            Ok(instruction) => instruction,
            Err(e) => {
                eprintln!("error: {e}");
                return 1;
            },
        }
    } else if cli.args.is_empty() {
        eprintln!("error: no command given");
        return 1;
    } else {
        cli.args.join(" ")
    };

    let plan = PassthroughPlanner.plan(&instruction, &environment);
    if cli.debug_ai {
        eprintln!("planner: {plan:?}");
    }
    if !cli.json {
        smartsh_cli::prompt::print_plan(&plan);
    }

    let mut request = RunRequest::new(plan.command.clone());
    request.cwd = cli.cwd.clone();
    request.r#unsafe = cli.r#unsafe;
    request.require_approval = true;
    request.dry_run = cli.dry_run;
    request.allowlist_mode = cli.allowlist_mode.into();
    request.allowlist_file = cli.allowlist_file.clone();

    let client = DaemonClient::new(cli.daemon_url.clone(), cli.auth_token.clone());
    if let Err(e) = autostart::ensure_running(&client, &cli.daemon_bind).await {
        eprintln!("error: {e}");
        return 1;
    }

    let outcome = orchestrate::run_once(&client, request, cli.yes, smartsh_cli::prompt::ask_yes_no).await;

    let CliOutcome { response, exit_code } = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("error: {e}");
            return 1;
        },
    };

    if cli.json {
        match serde_json::to_string(&response) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("error: could not serialize response: {e}"),
        }
    } else {
        smartsh_cli::prompt::print_result(&response);
    }

    exit_code
}
