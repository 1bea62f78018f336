//! Resolved-command execution with merged, size-bounded output capture.
//!
//! Process spawning follows `moltis-tools::exec::exec_command`
//! (`tokio::process::Command`, explicit `stdin` null, `tokio::time::timeout`
//! around the wait), but the output sink is a true ring (`ring_sink`) rather
//! than a truncate-after-the-fact string trim, and resource ceilings are
//! injected as `ulimit` builtins ahead of the resolved command instead of
//! being left to a container sandbox.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use smartsh_core::{Error, Result};

use crate::ring_sink::RingSink;

/// A year is "no timeout" for our purposes; avoids an `Option`-threaded
/// select arm for the common case.
const NO_TIMEOUT: Duration = Duration::from_secs(365 * 24 * 3600);

#[derive(Debug, Clone)]
pub struct ExecOpts {
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
    pub max_output_bytes: usize,
    pub isolated: bool,
    pub max_cpu_seconds: Option<u64>,
    pub max_memory_mb: Option<u64>,
}

impl Default for ExecOpts {
    fn default() -> Self {
        Self {
            cwd: None,
            env: BTreeMap::new(),
            timeout: None,
            max_output_bytes: 256 * 1024,
            isolated: false,
            max_cpu_seconds: None,
            max_memory_mb: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub output: String,
    pub truncated: bool,
    pub exit_code: i32,
    pub duration: Duration,
}

/// Prefix the command with `ulimit` builtins when isolation was requested
/// and we're on a POSIX shell. Non-POSIX targets have no equivalent and
/// silently run unconstrained, matching spec's "on POSIX with isolation".
fn resolve_command(command: &str, opts: &ExecOpts) -> String {
    if !opts.isolated || !cfg!(unix) {
        return command.to_string();
    }
    let mut prefix = String::new();
    if let Some(cpu) = opts.max_cpu_seconds {
        prefix.push_str(&format!("ulimit -t {cpu}; "));
    }
    if let Some(mem_mb) = opts.max_memory_mb {
        prefix.push_str(&format!("ulimit -v {}; ", mem_mb * 1024));
    }
    format!("{prefix}{command}")
}

fn build_command(resolved: &str, opts: &ExecOpts) -> Command {
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(resolved);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(resolved);
        c
    };

    if let Some(dir) = &opts.cwd {
        cmd.current_dir(dir);
    }

    // The subprocess inherits the explicit environment only, never the
    // ambient one -- policy narrowing must actually narrow.
    cmd.env_clear();
    for (k, v) in &opts.env {
        cmd.env(k, v);
    }

    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd
}

async fn pump(mut reader: impl tokio::io::AsyncRead + Unpin, sink: Arc<RingSink>) {
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => sink.push(&buf[..n]),
        }
    }
}

/// Run `command` to completion (or until timeout/cancellation), returning
/// merged stdout+stderr bounded to `opts.max_output_bytes`.
pub async fn run(command: &str, opts: &ExecOpts, cancel: CancellationToken) -> Result<ExecOutcome> {
    let resolved = resolve_command(command, opts);
    debug!(command = %resolved, "spawning exec");

    let mut cmd = build_command(&resolved, opts);
    let started = Instant::now();

    let mut child = cmd.spawn().map_err(|e| {
        Error::message(if e.kind() == std::io::ErrorKind::NotFound {
            "failed to start command: shell not found".to_string()
        } else {
            format!("failed to start command: {e}")
        })
    })?;

    let stdout = child.stdout.take().ok_or_else(|| Error::message("missing piped stdout"))?;
    let stderr = child.stderr.take().ok_or_else(|| Error::message("missing piped stderr"))?;

    let sink = Arc::new(RingSink::new(opts.max_output_bytes));
    let out_task = tokio::spawn(pump(stdout, sink.clone()));
    let err_task = tokio::spawn(pump(stderr, sink.clone()));

    let timeout = opts.timeout.unwrap_or(NO_TIMEOUT);

    let status = tokio::select! {
        result = tokio::time::timeout(timeout, child.wait()) => {
            match result {
                Ok(Ok(status)) => Some(status),
                Ok(Err(e)) => return Err(Error::message(format!("waiting for command failed: {e}"))),
                Err(_elapsed) => {
                    warn!(command = %resolved, "command timed out");
                    let _ = child.start_kill();
                    None
                },
            }
        },
        () = cancel.cancelled() => {
            let _ = child.start_kill();
            None
        },
    };

    let _ = out_task.await;
    let _ = err_task.await;

    let (output, truncated) = match Arc::try_unwrap(sink) {
        Ok(sink) => sink.into_output(),
        Err(_) => {
            // Both pump tasks were awaited above, so this arm shouldn't be
            // reachable; fail safe with empty output rather than panic.
            warn!("ring sink still had outstanding references after join");
            (String::new(), false)
        },
    };

    let exit_code = match status {
        Some(status) => exit_code_of(&status),
        None if cancel.is_cancelled() => 130,
        None => 1,
    };

    Ok(ExecOutcome {
        output,
        truncated,
        exit_code,
        duration: started.elapsed(),
    })
}

#[cfg(unix)]
fn exit_code_of(status: &std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.code().unwrap_or_else(|| {
        // Killed by signal: no structured exit status to report.
        let _ = status.signal();
        1
    })
}

#[cfg(not(unix))]
fn exit_code_of(status: &std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}
