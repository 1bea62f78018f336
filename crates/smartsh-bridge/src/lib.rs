//! The smartsh tool-protocol bridge: a stdio JSON-RPC 2.0 server speaking
//! the model-context-protocol method set, translating `smartsh_run`/
//! `smartsh_approve` tool calls into HTTP requests against a smartsh
//! daemon (autostarting one if none is reachable).

pub mod autostart;
pub mod bridge;
pub mod client;
pub mod framing;
pub mod rpc;
pub mod tools;

pub use bridge::Bridge;
pub use client::DaemonClient;
pub use tools::BridgeState;
