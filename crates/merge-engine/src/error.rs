use thiserror::Error;

/// Result alias for the engine core.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the engine core.
///
/// Only `IndexCorruption` is fatal: it means the lookup structures of this
/// process have desynchronized and every future lookup is suspect. Stale
/// proposals and malformed messages are *not* errors — they are counted and
/// dropped inside the loops.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A catalog or accelerator invariant was violated, or a removal was
    /// requested for an id that is not live.
    #[error("index corruption: {0}")]
    IndexCorruption(String),

    /// The external eigensolver reported non-success. The affected pair is
    /// rejected as if the spectral gate had failed.
    #[error("eigensolver failure: {0}")]
    Eigensolver(String),

    /// A message payload could not be decoded or named an impossible pair.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
