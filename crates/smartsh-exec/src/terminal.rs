//! External-terminal execution: run a command inside a GUI terminal window
//! the user can see, reusing one window per session key.
//!
//! Window reuse is built on `tmux`, the same dependency the host-terminal
//! feature in the broader pack reaches for (`which::which("tmux")`,
//! a named session per logical window) -- but unlike that feature, which
//! streams a live PTY over a WebSocket, this one is fire-and-forget: a
//! launcher script records its PID, runs the command, and leaves behind an
//! output file and an exit-status sentinel that the broker polls.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use smartsh_core::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(300);

/// Process-wide registry of per-session-key mutexes, so two runs sharing a
/// `terminal_session_key` serialize onto the same window instead of racing.
static SESSION_LOCKS: LazyLock<std::sync::Mutex<HashMap<String, Arc<AsyncMutex<()>>>>> =
    LazyLock::new(|| std::sync::Mutex::new(HashMap::new()));

#[allow(clippy::unwrap_used)]
fn session_lock(key: &str) -> Arc<AsyncMutex<()>> {
    let mut registry = SESSION_LOCKS.lock().unwrap();
    registry
        .entry(key.to_string())
        .or_insert_with(|| Arc::new(AsyncMutex::new(())))
        .clone()
}

fn sanitize_session_key(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn tmux_session_name(session_key: &str) -> String {
    format!("smartsh-{}", sanitize_session_key(session_key))
}

/// Paths for one external-terminal invocation's on-disk artifacts.
pub struct TerminalFiles {
    pub script: PathBuf,
    pub pid_file: PathBuf,
    pub output_file: PathBuf,
    pub exit_file: PathBuf,
}

impl TerminalFiles {
    fn new(dir: &Path) -> Self {
        Self {
            script: dir.join("run.sh"),
            pid_file: dir.join("pid"),
            output_file: dir.join("output"),
            exit_file: dir.join("exit_code"),
        }
    }
}

fn write_launcher_script(files: &TerminalFiles, command: &str, cwd: Option<&Path>) -> Result<()> {
    let cd_line = cwd
        .map(|d| format!("cd {:?} || exit 1\n", d))
        .unwrap_or_default();
    let script = format!(
        "#!/bin/sh\necho $$ > {pid:?}\n{cd}{command} > {out:?} 2>&1\necho $? > {exit:?}\n",
        pid = files.pid_file,
        cd = cd_line,
        command = command,
        out = files.output_file,
        exit = files.exit_file,
    );
    std::fs::write(&files.script, script)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(&files.script)?.permissions();
        perms.set_mode(0o700);
        std::fs::set_permissions(&files.script, perms)?;
    }
    Ok(())
}

fn tmux_available() -> bool {
    !cfg!(windows) && which::which("tmux").is_ok()
}

fn ensure_tmux_session(session_name: &str) -> Result<()> {
    let has_session = std::process::Command::new("tmux")
        .args(["has-session", "-t", session_name])
        .status()
        .map(|s| s.success())
        .unwrap_or(false);

    if has_session {
        return Ok(());
    }

    let status = std::process::Command::new("tmux")
        .args(["new-session", "-d", "-s", session_name])
        .status()
        .map_err(|e| Error::message(format!("failed to start tmux session: {e}")))?;
    if !status.success() {
        return Err(Error::message("tmux new-session did not exit successfully"));
    }

    // Best-effort: open a visible terminal window attached to the session.
    // Failure here is non-fatal -- the command still runs headlessly inside
    // tmux and can be inspected with `tmux attach`.
    let attach_cmd = format!("tmux -L smartsh attach -t {session_name}");
    let opened = if cfg!(target_os = "macos") {
        std::process::Command::new("osascript")
            .args([
                "-e",
                &format!("tell application \"Terminal\" to do script \"{attach_cmd}\""),
            ])
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    } else {
        ["x-terminal-emulator", "gnome-terminal", "konsole", "xterm"]
            .iter()
            .any(|term| {
                which::which(term).is_ok()
                    && std::process::Command::new(term)
                        .arg("-e")
                        .arg(&attach_cmd)
                        .spawn()
                        .is_ok()
            })
    };
    if !opened {
        debug!(session_name, "could not open a visible terminal window; session runs headlessly");
    }
    Ok(())
}

fn send_to_tmux(session_name: &str, script_path: &Path) -> Result<()> {
    let status = std::process::Command::new("tmux")
        .args(["send-keys", "-t", session_name, &format!("sh {script_path:?}"), "Enter"])
        .status()
        .map_err(|e| Error::message(format!("failed to send command to tmux: {e}")))?;
    if !status.success() {
        return Err(Error::message("tmux send-keys did not exit successfully"));
    }
    Ok(())
}

/// Outcome of an external-terminal run.
pub struct TerminalOutcome {
    pub output: String,
    pub exit_code: i32,
}

/// Launch `command` in a reused terminal window keyed by `session_key`,
/// poll for completion, and return its captured output.
///
/// Returns an error on non-POSIX platforms, where no `tmux`/GUI-scripting
/// equivalent is wired up.
pub async fn run(
    command: &str,
    cwd: Option<&Path>,
    session_key: &str,
    work_dir: &Path,
    mut cancel: tokio::sync::watch::Receiver<bool>,
) -> Result<TerminalOutcome> {
    if !tmux_available() {
        return Err(Error::message(
            "external-terminal execution requires tmux and is unavailable on this platform",
        ));
    }

    let lock = session_lock(session_key);
    let _guard = lock.lock().await;

    std::fs::create_dir_all(work_dir)?;
    let files = TerminalFiles::new(work_dir);
    write_launcher_script(&files, command, cwd)?;

    let session_name = tmux_session_name(session_key);
    ensure_tmux_session(&session_name)?;
    send_to_tmux(&session_name, &files.script)?;

    loop {
        if files.exit_file.is_file() {
            let code = std::fs::read_to_string(&files.exit_file)
                .ok()
                .and_then(|s| s.trim().parse::<i32>().ok())
                .unwrap_or(1);
            let output = std::fs::read_to_string(&files.output_file).unwrap_or_default();
            return Ok(TerminalOutcome { output, exit_code: code });
        }

        tokio::select! {
            () = tokio::time::sleep(POLL_INTERVAL) => {},
            changed = cancel.changed() => {
                if changed.is_ok() && *cancel.borrow() {
                    kill_by_pid_file(&files.pid_file);
                    let output = std::fs::read_to_string(&files.output_file).unwrap_or_default();
                    return Ok(TerminalOutcome { output, exit_code: 130 });
                }
            },
        }
    }
}

fn kill_by_pid_file(pid_file: &Path) {
    let Ok(contents) = std::fs::read_to_string(pid_file) else { return };
    let Ok(pid) = contents.trim().parse::<i32>() else { return };
    #[cfg(unix)]
    {
        let _ = std::process::Command::new("kill")
            .arg("-TERM")
            .arg(pid.to_string())
            .status();
    }
    #[cfg(not(unix))]
    {
        warn!(pid, "process termination by pid is unsupported on this platform");
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_unsafe_characters_in_session_key() {
        assert_eq!(sanitize_session_key("agent:42/run"), "agent_42_run");
        assert_eq!(tmux_session_name("agent:42"), "smartsh-agent_42");
    }

    #[test]
    fn launcher_script_embeds_all_sentinel_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let files = TerminalFiles::new(dir.path());
        write_launcher_script(&files, "echo hi", None).expect("write script");

        let script = std::fs::read_to_string(&files.script).expect("read script");
        assert!(script.contains("echo $$"));
        assert!(script.contains("echo hi"));
        assert!(script.contains("echo $?"));
    }

    #[test]
    fn launcher_script_includes_cd_when_cwd_given() {
        let dir = tempfile::tempdir().expect("tempdir");
        let files = TerminalFiles::new(dir.path());
        write_launcher_script(&files, "pwd", Some(Path::new("/tmp"))).expect("write script");

        let script = std::fs::read_to_string(&files.script).expect("read script");
        assert!(script.contains("cd "));
    }
}
