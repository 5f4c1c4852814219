//! The [`Blake3`] digest object.

use std::fmt;
use std::io::{self, Read};
use std::path::Path;

use b3_simd::{Backend, HashState, KEY_LEN, OutputReader};
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::encoding::{to_base64, to_hex};
use crate::error::DigestError;
use crate::file::{self, ReaderConfig};

/// A BLAKE3 digest object.
///
/// Bytes are fed with [`update`](Self::update) (or through
/// [`io::Write`]), files with [`update_file`](Self::update_file). Any of the
/// digest accessors can be called at any time without disturbing the object,
/// so hashing can continue afterwards. The `_and_reset` variants return the
/// digest and then start over.
///
/// # Examples
///
/// ```
/// use b3digest::Blake3;
///
/// let mut hasher = Blake3::new();
/// hasher.update("ho").update("ge");
/// assert_eq!(
///     hasher.hexdigest(),
///     "77412ee5089c51bcf6568c621aa3a83081a6477b576ff19bfb31e9d657acd91a"
/// );
/// assert_eq!(hasher, "77412ee5089c51bcf6568c621aa3a83081a6477b576ff19bfb31e9d657acd91a");
/// ```
#[derive(Clone, Default)]
pub struct Blake3 {
    state: HashState,
}

impl Blake3 {
    /// Bytes consumed by one compression.
    pub const BLOCK_LENGTH: usize = b3_simd::BLOCK_LEN;

    /// Length of [`digest`](Self::digest) in bytes.
    pub const DIGEST_LENGTH: usize = b3_simd::OUT_LEN;

    /// Create an object holding the hash of the empty input.
    pub fn new() -> Self {
        Self {
            state: HashState::new(),
        }
    }

    /// Create an object for keyed hashing under `key`.
    pub fn new_keyed(key: &[u8; KEY_LEN]) -> Self {
        Self {
            state: HashState::new_keyed(key),
        }
    }

    /// Create an object that derives a key from the material fed to it,
    /// under a hardcoded, application-specific `context`.
    pub fn new_derive_key(context: &str) -> Self {
        Self {
            state: HashState::new_derive_key(context),
        }
    }

    /// Create an object pinned to `backend` instead of the detected one.
    pub fn with_backend(backend: Backend) -> Result<Self, DigestError> {
        Ok(Self {
            state: HashState::with_backend(backend)?,
        })
    }

    /// Create an object and feed it the contents of the file at `path`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DigestError> {
        let mut hasher = Self::new();
        hasher.update_file(path)?;
        Ok(hasher)
    }

    /// Append `data` to the hashed input.
    pub fn update(&mut self, data: impl AsRef<[u8]>) -> &mut Self {
        self.state.update(data.as_ref());
        self
    }

    /// Append the contents of the file at `path`, read in bounded chunks.
    ///
    /// The object only changes when the whole file was read; on failure it
    /// still holds the digest it had before the call.
    pub fn update_file(&mut self, path: impl AsRef<Path>) -> Result<&mut Self, DigestError> {
        self.update_file_with_config(path, ReaderConfig::default())
    }

    /// Like [`update_file`](Self::update_file) with an explicit read size.
    #[cfg_attr(
        feature = "tracing",
        instrument(skip_all, fields(path = %path.as_ref().display()), err, name = "update_file")
    )]
    pub fn update_file_with_config(
        &mut self,
        path: impl AsRef<Path>,
        config: ReaderConfig,
    ) -> Result<&mut Self, DigestError> {
        file::feed_file(&mut self.state, path.as_ref(), config)?;
        Ok(self)
    }

    /// Append everything `reader` yields, returning the number of bytes read.
    pub fn update_reader<R: Read>(&mut self, reader: R) -> Result<u64, DigestError> {
        let mut buffer = vec![0u8; ReaderConfig::DEFAULT_BUFFER_LEN];
        self.update_reader_with_buffer(reader, &mut buffer)
    }

    /// Append everything `reader` yields using the caller's scratch buffer.
    ///
    /// A failing reader leaves the object as it was before the call.
    pub fn update_reader_with_buffer<R: Read>(
        &mut self,
        mut reader: R,
        buffer: &mut [u8],
    ) -> Result<u64, DigestError> {
        if buffer.is_empty() {
            return Err(DigestError::InvalidBufferSize);
        }
        file::feed_reader(&mut self.state, &mut reader, buffer).map_err(DigestError::Read)
    }

    /// Raw 32-byte digest.
    pub fn digest(&self) -> [u8; b3_simd::OUT_LEN] {
        self.state.finalize()
    }

    /// Lowercase hexadecimal digest.
    pub fn hexdigest(&self) -> String {
        to_hex(&self.digest())
    }

    /// Padded, standard-alphabet base64 digest.
    pub fn base64digest(&self) -> String {
        to_base64(&self.digest())
    }

    /// Extended output of `len` bytes. The first 32 bytes equal
    /// [`digest`](Self::digest).
    pub fn digest_len(&self, len: usize) -> Result<Vec<u8>, DigestError> {
        Ok(self.state.finalize_len(len)?)
    }

    /// Seekable reader over the extended output.
    pub fn output_reader(&self) -> OutputReader {
        self.state.finalize_xof()
    }

    /// Return the raw digest, then reset.
    pub fn digest_and_reset(&mut self) -> [u8; b3_simd::OUT_LEN] {
        let digest = self.digest();
        self.reset();
        digest
    }

    /// Return the hex digest, then reset.
    pub fn hexdigest_and_reset(&mut self) -> String {
        to_hex(&self.digest_and_reset())
    }

    /// Return the base64 digest, then reset.
    pub fn base64digest_and_reset(&mut self) -> String {
        to_base64(&self.digest_and_reset())
    }

    /// Forget all input, keeping the mode, key and backend.
    pub fn reset(&mut self) -> &mut Self {
        self.state.reset();
        self
    }

    /// `#<Blake3: hexdigest>`.
    pub fn inspect(&self) -> String {
        format!("#<Blake3: {}>", self.hexdigest())
    }

    /// Same as [`BLOCK_LENGTH`](Self::BLOCK_LENGTH).
    pub const fn block_length(&self) -> usize {
        Self::BLOCK_LENGTH
    }

    /// Same as [`DIGEST_LENGTH`](Self::DIGEST_LENGTH).
    pub const fn digest_length(&self) -> usize {
        Self::DIGEST_LENGTH
    }

    /// Alias of [`digest_length`](Self::digest_length).
    pub const fn size(&self) -> usize {
        Self::DIGEST_LENGTH
    }

    /// Number of input bytes absorbed since creation or the last reset.
    pub const fn len(&self) -> u64 {
        self.state.len()
    }

    /// Whether nothing has been absorbed yet.
    pub const fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Compression backend this object uses.
    pub const fn backend(&self) -> Backend {
        self.state.backend()
    }
}

impl PartialEq for Blake3 {
    fn eq(&self, other: &Self) -> bool {
        self.digest() == other.digest()
    }
}

impl Eq for Blake3 {}

impl PartialEq<str> for Blake3 {
    fn eq(&self, other: &str) -> bool {
        self.hexdigest() == other
    }
}

impl PartialEq<&str> for Blake3 {
    fn eq(&self, other: &&str) -> bool {
        self.hexdigest() == *other
    }
}

impl PartialEq<String> for Blake3 {
    fn eq(&self, other: &String) -> bool {
        self.hexdigest() == *other
    }
}

impl PartialEq<[u8]> for Blake3 {
    fn eq(&self, other: &[u8]) -> bool {
        self.hexdigest().as_bytes() == other
    }
}

impl fmt::Debug for Blake3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inspect())
    }
}

impl fmt::Display for Blake3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hexdigest())
    }
}

impl io::Write for Blake3 {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.state.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOGE_HEX: &str = "77412ee5089c51bcf6568c621aa3a83081a6477b576ff19bfb31e9d657acd91a";
    const EMPTY_HEX: &str = "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262";

    #[test]
    fn new_object_holds_empty_digest() {
        let hasher = Blake3::new();
        assert_eq!(hasher.hexdigest(), EMPTY_HEX);
        assert!(hasher.is_empty());
    }

    #[test]
    fn accessors_do_not_mutate() {
        let mut hasher = Blake3::new();
        hasher.update(b"hoge");
        assert_eq!(hasher.hexdigest(), HOGE_HEX);
        assert_eq!(hasher.hexdigest(), HOGE_HEX);
        assert_eq!(hasher.base64digest(), "d0Eu5QicUbz2VoxiGqOoMIGmR3tXb/Gb+zHp1les2Ro=");
        assert_eq!(hex::encode(hasher.digest()), HOGE_HEX);
        assert_eq!(hasher.len(), 4);
    }

    #[test]
    fn and_reset_variants_return_previous_value() {
        let mut hasher = Blake3::new();
        hasher.update("hoge");
        assert_eq!(hasher.hexdigest_and_reset(), HOGE_HEX);
        assert_eq!(hasher.hexdigest(), EMPTY_HEX);

        hasher.update("hoge");
        assert_eq!(
            hasher.base64digest_and_reset(),
            "d0Eu5QicUbz2VoxiGqOoMIGmR3tXb/Gb+zHp1les2Ro="
        );
        hasher.update("hoge");
        assert_eq!(hex::encode(hasher.digest_and_reset()), HOGE_HEX);
        assert!(hasher.is_empty());
    }

    #[test]
    fn equality_against_text_is_exact() {
        let mut hasher = Blake3::new();
        hasher.update("hoge");
        assert_eq!(hasher, HOGE_HEX);
        assert_eq!(hasher, *HOGE_HEX);
        assert_eq!(hasher, HOGE_HEX.to_string());
        assert_eq!(hasher, *HOGE_HEX.as_bytes());
        assert_ne!(hasher, HOGE_HEX.to_uppercase());
        assert_ne!(hasher, &HOGE_HEX[..10]);
    }

    #[test]
    fn inspect_and_display() {
        let hasher = Blake3::new();
        assert_eq!(hasher.inspect(), format!("#<Blake3: {EMPTY_HEX}>"));
        assert_eq!(format!("{hasher:?}"), hasher.inspect());
        assert_eq!(hasher.to_string(), EMPTY_HEX);
    }

    #[test]
    fn lengths() {
        let hasher = Blake3::new();
        assert_eq!(Blake3::BLOCK_LENGTH, 64);
        assert_eq!(Blake3::DIGEST_LENGTH, 32);
        assert_eq!(hasher.block_length(), 64);
        assert_eq!(hasher.digest_length(), 32);
        assert_eq!(hasher.size(), 32);
    }

    #[test]
    fn zero_length_extended_output_is_an_error() {
        let hasher = Blake3::new();
        assert!(matches!(hasher.digest_len(0), Err(DigestError::Engine(_))));
        assert_eq!(hasher.digest_len(40).expect("non-empty")[..32], hasher.digest());
    }

    #[test]
    fn empty_reader_buffer_is_rejected() {
        let mut hasher = Blake3::new();
        let result = hasher.update_reader_with_buffer(&b"hoge"[..], &mut []);
        assert!(matches!(result, Err(DigestError::InvalidBufferSize)));
        assert!(hasher.is_empty());
    }
}
