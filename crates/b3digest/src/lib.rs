#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

mod digest;
mod encoding;
mod error;
mod file;

#[cfg(feature = "parallel")]
#[cfg_attr(docsrs, doc(cfg(feature = "parallel")))]
pub mod parallel;

use std::path::Path;

pub use b3_simd::{Backend, KEY_LEN, OutputReader, active_backend};
pub use digest::Blake3;
pub use error::DigestError;
pub use file::ReaderConfig;

/// Raw digest of `data`.
pub fn digest(data: impl AsRef<[u8]>) -> [u8; Blake3::DIGEST_LENGTH] {
    b3_simd::hash(data.as_ref())
}

/// Lowercase hexadecimal digest of `data`.
///
/// ```
/// assert_eq!(
///     b3digest::hexdigest(""),
///     "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
/// );
/// ```
pub fn hexdigest(data: impl AsRef<[u8]>) -> String {
    encoding::to_hex(&digest(data))
}

/// Padded, standard-alphabet base64 digest of `data`.
pub fn base64digest(data: impl AsRef<[u8]>) -> String {
    encoding::to_base64(&digest(data))
}

/// Digest object holding the contents of the file at `path`.
pub fn file(path: impl AsRef<Path>) -> Result<Blake3, DigestError> {
    Blake3::from_file(path)
}
