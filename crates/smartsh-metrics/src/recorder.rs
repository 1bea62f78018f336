//! Metrics recorder initialization, following the teacher's split between
//! "install a global recorder once at startup" and "hand callers a cheap
//! handle to render the exposition text on demand."

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use smartsh_core::{Error, Result};
use tracing::info;

/// Handle to the installed Prometheus recorder, cloneable and cheap.
#[derive(Clone)]
pub struct MetricsHandle {
    prometheus_handle: PrometheusHandle,
}

impl MetricsHandle {
    /// Render the current metrics snapshot in Prometheus text exposition
    /// format, for the `/metrics` route.
    #[must_use]
    pub fn render(&self) -> String {
        self.prometheus_handle.render()
    }
}

/// Install the global recorder. Must be called once, at daemon startup,
/// before any counter/histogram macro call runs.
pub fn init_metrics() -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::message(format!("failed to install metrics recorder: {e}")))?;
    info!("metrics recorder installed");
    Ok(MetricsHandle { prometheus_handle: handle })
}
