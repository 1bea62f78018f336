//! Shared daemon state: the job store, subscriber registry, and PTY session
//! registry all live behind one cloneable handle injected into every axum
//! handler via `State<AppState>`.
//!
//! Split of concerns mirrors `moltis-gateway::state::GatewayState`: a
//! `Arc`-wrapped inner struct behind async locks, cloned cheaply per
//! request.

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Client;
use smartsh_core::{Job, RunStatus};
use smartsh_store::JobStore;
use tokio::sync::{mpsc, Mutex, RwLock};

use crate::config::DaemonConfig;
use crate::sessions::SessionRegistry;

/// One job's live subscribers: each gets a bounded channel of JSON status
/// events. Capacity 8, drop-when-full, per spec's ordering guarantees.
pub const SUBSCRIBER_CAPACITY: usize = 8;

pub type SubscriberMap = HashMap<String, Vec<mpsc::Sender<Job>>>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<DaemonConfig>,
    pub store: Arc<JobStore>,
    pub http_client: Client,
    pub metrics: smartsh_metrics::MetricsHandle,
    subscribers: Arc<Mutex<SubscriberMap>>,
    pub sessions: Arc<RwLock<SessionRegistry>>,
}

impl AppState {
    #[must_use]
    pub fn new(
        config: DaemonConfig,
        store: JobStore,
        metrics: smartsh_metrics::MetricsHandle,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            http_client: Client::new(),
            metrics,
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            sessions: Arc::new(RwLock::new(SessionRegistry::default())),
        }
    }

    /// Register a new subscriber for `job_id`, returning the receiving end.
    pub async fn subscribe(&self, job_id: &str) -> mpsc::Receiver<Job> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let mut subs = self.subscribers.lock().await;
        subs.entry(job_id.to_string()).or_default().push(tx);
        rx
    }

    /// Publish a job update to every live subscriber of its id, dropping
    /// (not blocking on) any subscriber whose channel is full or closed.
    pub async fn publish(&self, job: &Job) {
        let mut subs = self.subscribers.lock().await;
        if let Some(senders) = subs.get_mut(&job.id) {
            senders.retain(|tx| tx.try_send(job.clone()).is_ok() || !tx.is_closed());
            if matches!(
                job.result.as_ref().map(|r| r.status),
                Some(RunStatus::Completed | RunStatus::Failed | RunStatus::Blocked)
            ) {
                subs.remove(&job.id);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::OnceLock;

    use smartsh_store::JobStore;

    use super::{AppState, DaemonConfig};

    /// The Prometheus recorder can only be installed once per test binary;
    /// every test that needs a handle shares this one.
    static METRICS: OnceLock<smartsh_metrics::MetricsHandle> = OnceLock::new();

    pub async fn dummy_state(auth_token: Option<String>) -> AppState {
        let dir = tempfile::tempdir().expect("tempdir");
        // Leak the tempdir so the store directory outlives the test's state.
        let path = Box::leak(Box::new(dir)).path().to_path_buf();
        let store = JobStore::open(&path).await.expect("open store");
        let config = DaemonConfig { auth_token, data_dir: path, ..DaemonConfig::default() };
        let metrics = METRICS
            .get_or_init(|| smartsh_metrics::init_metrics().expect("install test metrics recorder"))
            .clone();
        AppState::new(config, store, metrics)
    }
}
