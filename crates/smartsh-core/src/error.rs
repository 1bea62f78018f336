use thiserror::Error;

/// Shared error type for the smartsh workspace.
///
/// Mirrors the shape used across the crate family: a plain message variant
/// for "this should never surface to a caller as anything but text", an
/// `Io` passthrough, and an opaque `Other` for wrapping foreign errors
/// without pulling their types into every signature.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("internal error")]
    Other {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    #[must_use]
    pub fn other(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Other {
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
