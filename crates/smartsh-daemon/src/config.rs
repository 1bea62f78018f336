//! Daemon startup configuration.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use smartsh_summarize::Provider;

/// Resolved configuration for one daemon process.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub auth_token: Option<String>,
    pub summarizer: Provider,
    pub ollama_endpoint: String,
    pub ollama_model: String,
}

impl DaemonConfig {
    /// The data directory used when the caller doesn't override it:
    /// the user's local data directory under a fixed app name.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        directories::ProjectDirs::from("", "", "smartsh")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".smartsh"))
    }

    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.data_dir.join("daemon.lock")
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8787)),
            data_dir: Self::default_data_dir(),
            auth_token: None,
            summarizer: Provider::Deterministic,
            ollama_endpoint: "http://127.0.0.1:11434/api/generate".to_string(),
            ollama_model: "llama3".to_string(),
        }
    }
}
