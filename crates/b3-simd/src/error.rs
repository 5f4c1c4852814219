use thiserror::Error;

use crate::Backend;

/// Errors raised by the hashing engine.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum EngineError {
    /// Extended output was requested with a length of zero bytes.
    #[error("requested output length must be at least one byte")]
    InvalidOutputLength,
    /// The requested backend needs CPU features the host lacks.
    #[error("backend {backend} is not supported by this CPU")]
    UnsupportedBackend {
        /// Backend that failed its feature check.
        backend: Backend,
    },
}
