use std::io;
use std::path::PathBuf;

use b3_simd::EngineError;
use thiserror::Error;

/// Errors returned by [`Blake3`](crate::Blake3) operations.
#[derive(Debug, Error)]
pub enum DigestError {
    /// A file could not be opened or read.
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        /// File being hashed when the failure occurred.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// A caller-supplied reader failed.
    #[error("failed to read input: {0}")]
    Read(#[source] io::Error),
    /// The configured read buffer has no capacity.
    #[error("reader buffer length must be non-zero")]
    InvalidBufferSize,
    /// The hashing engine rejected the request.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl DigestError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Underlying I/O error, if this failure came from reading input.
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            Self::Io { source, .. } | Self::Read(source) => Some(source),
            Self::InvalidBufferSize | Self::Engine(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_names_the_path() {
        let err = DigestError::io(
            "/no/such/file",
            io::Error::new(io::ErrorKind::NotFound, "missing"),
        );
        assert_eq!(err.to_string(), "failed to read /no/such/file: missing");
        assert_eq!(
            err.io_error().map(io::Error::kind),
            Some(io::ErrorKind::NotFound)
        );
    }

    #[test]
    fn engine_errors_convert() {
        let err: DigestError = EngineError::InvalidOutputLength.into();
        assert!(matches!(err, DigestError::Engine(EngineError::InvalidOutputLength)));
        assert!(err.io_error().is_none());
        assert_eq!(
            err.to_string(),
            "requested output length must be at least one byte"
        );
    }
}
