//! Interactive PTY sessions.
//!
//! Grounded directly on `moltis-web::terminal`'s `HostTerminalPtyRuntime`:
//! a `native_pty_system()` pair, a blocking reader thread forwarding output
//! chunks over an unbounded channel, and a writer half for input. The
//! daemon crate owns the session registry and SSE fan-out on top of this.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::PathBuf;

use portable_pty::{native_pty_system, CommandBuilder, PtyPair, PtySize};
use tokio::sync::mpsc::UnboundedReceiver;

use smartsh_core::{Error, Result};

/// One chunk of output, or a terminal event, from a running PTY.
pub enum PtyEvent {
    Output(Vec<u8>),
    Error(String),
    Closed,
}

pub struct PtySpawnOpts {
    pub command: String,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub cols: u16,
    pub rows: u16,
}

/// A live PTY process: a writer half for input and a handle for resize/kill.
/// Output arrives on the channel returned alongside this from [`spawn`].
pub struct PtyProcess {
    master: Box<dyn portable_pty::MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    child: Box<dyn portable_pty::Child + Send + Sync>,
}

/// Spawn a command under a PTY, returning the process handle and a channel
/// of output events from a dedicated reader thread.
///
/// Interactive PTYs have no portable analogue outside POSIX-shaped
/// platforms in this crate's target set; callers on unsupported platforms
/// should surface that as a client error rather than attempt a fallback.
pub fn spawn(opts: &PtySpawnOpts) -> Result<(PtyProcess, UnboundedReceiver<PtyEvent>)> {
    let pty_system = native_pty_system();
    let PtyPair { master, slave } = pty_system
        .openpty(PtySize {
            rows: opts.rows.max(1),
            cols: opts.cols.max(2),
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|e| Error::message(format!("failed to allocate pty: {e}")))?;

    let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
    let mut cmd = CommandBuilder::new(shell);
    cmd.arg("-c");
    cmd.arg(&opts.command);
    if let Some(cwd) = &opts.cwd {
        cmd.cwd(cwd);
    }
    cmd.env("TERM", "xterm-256color");
    for (k, v) in &opts.env {
        cmd.env(k, v);
    }

    let child = slave
        .spawn_command(cmd)
        .map_err(|e| Error::message(format!("failed to spawn pty shell: {e}")))?;
    drop(slave);

    let writer = master
        .take_writer()
        .map_err(|e| Error::message(format!("failed to open pty writer: {e}")))?;
    let reader = master
        .try_clone_reader()
        .map_err(|e| Error::message(format!("failed to open pty reader: {e}")))?;

    let rx = spawn_reader(reader);

    Ok((PtyProcess { master, writer, child }, rx))
}

fn spawn_reader(mut reader: Box<dyn Read + Send>) -> UnboundedReceiver<PtyEvent> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let spawned = std::thread::Builder::new()
        .name("smartsh-pty-reader".to_string())
        .spawn(move || {
            let mut buf = vec![0_u8; 16 * 1024];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => {
                        let _ = tx.send(PtyEvent::Closed);
                        break;
                    },
                    Ok(n) => {
                        if tx.send(PtyEvent::Output(buf[..n].to_vec())).is_err() {
                            return;
                        }
                    },
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        let _ = tx.send(PtyEvent::Error(format!("pty read error: {e}")));
                        let _ = tx.send(PtyEvent::Closed);
                        break;
                    },
                }
            }
        });
    if let Err(e) = spawned {
        tracing::warn!("failed to launch pty reader thread: {e}");
    }
    rx
}

impl PtyProcess {
    pub fn write_input(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        self.master
            .resize(PtySize {
                rows: rows.max(1),
                cols: cols.max(2),
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| Error::message(format!("failed to resize pty: {e}")))
    }

    /// Returns the child's exit code if it has already exited.
    pub fn try_exit_code(&mut self) -> Option<i32> {
        self.child
            .try_wait()
            .ok()
            .flatten()
            .map(|status| status.exit_code() as i32)
    }

    pub fn kill(&mut self) -> Result<()> {
        self.child
            .kill()
            .map_err(|e| Error::message(format!("failed to kill pty child: {e}")))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawns_and_reads_output() {
        let opts = PtySpawnOpts {
            command: "echo pty-hello".to_string(),
            cwd: None,
            env: BTreeMap::new(),
            cols: 80,
            rows: 24,
        };
        let (mut process, mut rx) = spawn(&opts).expect("spawn pty");

        let mut collected = Vec::new();
        while let Some(event) = rx.recv().await {
            match event {
                PtyEvent::Output(bytes) => collected.extend(bytes),
                PtyEvent::Closed | PtyEvent::Error(_) => break,
            }
        }
        let output = String::from_utf8_lossy(&collected);
        assert!(output.contains("pty-hello"));
        let _ = process.kill();
    }
}
