use dino_state::{DecodeError, RegionError};
use thiserror::Error;

/// Failure to bring a producer up. The connection stays uninitialized.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to load library: {0}")]
    LoadError(#[from] libloading::Error),

    #[error("producer library not found: {0}")]
    LibraryNotFound(String),

    #[error("failed to find symbol '{0}': {1}")]
    SymbolNotFound(String, libloading::Error),

    #[error("unsupported producer: {0}")]
    Unsupported(String),

    #[error("producer init failed: {0}")]
    InitFailed(String),

    #[error("state region allocation failed: {0}")]
    Region(#[from] RegionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid frame on line {line}: {reason}")]
    InvalidFrame { line: usize, reason: String },
}

/// Why no snapshot is available for the current frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("bridge is not ready")]
    NotReady,

    #[error("producer returned no state buffer")]
    NullBuffer,

    #[error("corrupt state header: {0}")]
    Decode(#[from] DecodeError),
}
