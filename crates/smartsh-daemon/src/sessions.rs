//! Interactive PTY session registry.
//!
//! Each session wraps a `smartsh_exec::pty::PtyProcess` plus the wire-facing
//! state (`PtySessionView`) and a set of SSE subscriber channels. The
//! registry itself is a lock-protected map keyed by session id, per the
//! concurrency note in spec's data model for `PTYSession`.

use std::collections::HashMap;
use std::sync::Arc;

use smartsh_core::{ids, PtySessionView, RunStatus};
use smartsh_exec::pty::{self, PtyEvent, PtyProcess, PtySpawnOpts};
use smartsh_exec::Result as ExecResult;
use tokio::sync::{mpsc, RwLock};

use crate::state::SUBSCRIBER_CAPACITY;

const MAX_TAIL: usize = 1200;

/// A live interactive session: the spawn handle plus fan-out subscribers.
pub struct Session {
    pub process: PtyProcess,
    pub view: PtySessionView,
    subscribers: Vec<mpsc::Sender<Vec<u8>>>,
}

impl Session {
    fn publish(&mut self, chunk: &[u8]) {
        self.subscribers.retain(|tx| tx.try_send(chunk.to_vec()).is_ok() || !tx.is_closed());
    }

    pub fn subscribe(&mut self) -> mpsc::Receiver<Vec<u8>> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        self.subscribers.push(tx);
        rx
    }
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
}

fn now_ms() -> i64 {
    i64::try_from(ids::next_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

impl SessionRegistry {
    /// Spawn a new PTY session, register it under a lock-protected shared
    /// registry, and start a reader task that feeds output chunks back into
    /// that same registry.
    pub async fn create(registry: &Arc<RwLock<Self>>, opts: PtySpawnOpts) -> ExecResult<String> {
        let id = format!("session_{}", ids::next_nanos());
        let command = opts.command.clone();
        let cwd = opts.cwd.clone().map_or_else(String::new, |p| p.display().to_string());
        let (process, mut rx) = pty::spawn(&opts)?;

        let now = now_ms();
        let view = PtySessionView {
            id: id.clone(),
            command,
            cwd,
            status: RunStatus::Running,
            exit_code: None,
            started_at: now,
            updated_at: now,
            output_tail: String::new(),
            resolved_summary: None,
        };

        {
            let mut guard = registry.write().await;
            guard.sessions.insert(id.clone(), Session { process, view, subscribers: Vec::new() });
        }

        let reader_id = id.clone();
        let reader_registry = Arc::clone(registry);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    PtyEvent::Output(bytes) => {
                        reader_registry.write().await.record_output(&reader_id, &bytes);
                    },
                    PtyEvent::Closed | PtyEvent::Error(_) => {
                        reader_registry.write().await.mark_closed(&reader_id);
                        break;
                    },
                }
            }
        });

        Ok(id)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&PtySessionView> {
        self.sessions.get(id).map(|s| &s.view)
    }

    pub fn write_input(&mut self, id: &str, data: &[u8]) -> ExecResult<()> {
        let session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| smartsh_core::Error::message(format!("no such session: {id}")))?;
        session.process.write_input(data)
    }

    pub fn subscribe(&mut self, id: &str) -> Option<mpsc::Receiver<Vec<u8>>> {
        self.sessions.get_mut(id).map(Session::subscribe)
    }

    pub fn close(&mut self, id: &str) -> ExecResult<()> {
        if let Some(session) = self.sessions.get_mut(id) {
            session.process.kill()?;
            session.view.status = RunStatus::Completed;
        }
        Ok(())
    }

    fn record_output(&mut self, id: &str, chunk: &[u8]) {
        if let Some(session) = self.sessions.get_mut(id) {
            session.view.output_tail.push_str(&String::from_utf8_lossy(chunk));
            if session.view.output_tail.len() > MAX_TAIL {
                let start = session.view.output_tail.len() - MAX_TAIL;
                session.view.output_tail = session.view.output_tail[start..].to_string();
            }
            session.view.updated_at = now_ms();
            session.publish(chunk);
        }
    }

    fn mark_closed(&mut self, id: &str) {
        if let Some(session) = self.sessions.get_mut(id) {
            let exit_code = session.process.try_exit_code();
            session.view.exit_code = exit_code;
            session.view.status = RunStatus::Completed;
            session.view.updated_at = now_ms();
        }
    }
}
