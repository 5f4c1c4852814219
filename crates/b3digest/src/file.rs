//! Bounded, chunked reading of files and readers into a hash state.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use b3_simd::HashState;

use crate::error::DigestError;

/// Controls how [`Blake3`](crate::Blake3) reads files and readers.
///
/// # Examples
///
/// ```
/// use b3digest::ReaderConfig;
///
/// let config = ReaderConfig::new().with_buffer_len(4096).unwrap();
/// assert_eq!(config.buffer_len(), 4096);
/// assert!(ReaderConfig::new().with_buffer_len(0).is_err());
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReaderConfig {
    buffer_len: usize,
}

impl ReaderConfig {
    /// Default number of bytes requested per read.
    pub const DEFAULT_BUFFER_LEN: usize = 64 * 1024;

    /// Configuration with the default buffer length.
    pub const fn new() -> Self {
        Self {
            buffer_len: Self::DEFAULT_BUFFER_LEN,
        }
    }

    /// Use reads of at most `buffer_len` bytes. Zero is rejected.
    pub fn with_buffer_len(self, buffer_len: usize) -> Result<Self, DigestError> {
        if buffer_len == 0 {
            return Err(DigestError::InvalidBufferSize);
        }
        Ok(Self { buffer_len })
    }

    /// Number of bytes requested per read.
    pub const fn buffer_len(&self) -> usize {
        self.buffer_len
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Feed `reader` into `state` until end of input, retrying interrupted reads.
///
/// The bytes are absorbed into a copy of `state` that replaces it only once
/// the reader is exhausted, so a failed read leaves `state` untouched.
pub(crate) fn feed_reader<R: Read>(
    state: &mut HashState,
    reader: &mut R,
    buffer: &mut [u8],
) -> io::Result<u64> {
    let mut scratch = state.clone();
    let total = absorb(&mut scratch, reader, buffer)?;
    *state = scratch;
    Ok(total)
}

fn absorb<R: Read>(state: &mut HashState, reader: &mut R, buffer: &mut [u8]) -> io::Result<u64> {
    let mut total = 0u64;
    loop {
        match reader.read(buffer) {
            Ok(0) => break,
            Ok(n) => {
                state.update(&buffer[..n]);
                total = total.saturating_add(n as u64);
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(total)
}

/// Feed the file at `path` into `state` using reads bounded by `config`.
///
/// `state` only changes when the whole file was read.
pub(crate) fn feed_file(
    state: &mut HashState,
    path: &Path,
    config: ReaderConfig,
) -> Result<u64, DigestError> {
    let mut file = File::open(path).map_err(|err| DigestError::io(path, err))?;
    let mut buffer = vec![0u8; config.buffer_len()];
    let read =
        feed_reader(state, &mut file, &mut buffer).map_err(|err| DigestError::io(path, err))?;
    #[cfg(feature = "tracing")]
    tracing::debug!(path = %path.display(), bytes = read, "file absorbed");
    Ok(read)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct InterruptOnce<'a> {
        data: &'a [u8],
        interrupted: bool,
    }

    impl Read for InterruptOnce<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(io::Error::new(io::ErrorKind::Interrupted, "signal"));
            }
            self.data.read(buf)
        }
    }

    #[test]
    fn default_buffer_is_64_kib() {
        assert_eq!(ReaderConfig::default().buffer_len(), 64 * 1024);
    }

    #[test]
    fn zero_buffer_is_rejected() {
        assert!(matches!(
            ReaderConfig::new().with_buffer_len(0),
            Err(DigestError::InvalidBufferSize)
        ));
    }

    #[test]
    fn interrupted_reads_are_retried() {
        let mut reader = InterruptOnce {
            data: b"hoge",
            interrupted: false,
        };
        let mut state = HashState::new();
        let mut buffer = [0u8; 3];
        let total = feed_reader(&mut state, &mut reader, &mut buffer).expect("read succeeds");
        assert_eq!(total, 4);
        assert_eq!(state.finalize(), b3_simd::hash(b"hoge"));
    }

    struct FailAfter<'a> {
        prefix: &'a [u8],
    }

    impl Read for FailAfter<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.prefix.is_empty() {
                return Err(io::Error::other("disk error"));
            }
            self.prefix.read(buf)
        }
    }

    #[test]
    fn failed_read_leaves_state_untouched() {
        let mut state = HashState::new();
        state.update(b"kept");
        let before = state.finalize();

        let mut reader = FailAfter { prefix: b"junk" };
        let mut buffer = [0u8; 2];
        let err = feed_reader(&mut state, &mut reader, &mut buffer).expect_err("read fails");
        assert_eq!(err.to_string(), "disk error");
        assert_eq!(state.len(), 4);
        assert_eq!(state.finalize(), before);
    }

    #[test]
    fn missing_file_reports_path() {
        let mut state = HashState::new();
        let path = Path::new("definitely/not/here.bin");
        let err = feed_file(&mut state, path, ReaderConfig::new()).expect_err("missing file");
        match err {
            DigestError::Io { path: reported, source } => {
                assert_eq!(reported, path);
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(state.is_empty());
    }
}
