use std::path::PathBuf;

/// Errors raised by the host side of the engine (configuration, history
/// persistence). Faults raised by the script under test are not errors; see
/// [`crate::fault::ExecutionFault`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration in {}: {reason}", path.display())]
    Config { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
