//! Output summarization: a deterministic classifier that always runs, plus
//! an optional model-backed pass over an Ollama-compatible endpoint.

pub mod deterministic;
pub mod extractors;
pub mod llm;
pub mod redact;

pub use deterministic::classify;
pub use llm::{summarize, OllamaConfig, Provider};
pub use redact::redact;
