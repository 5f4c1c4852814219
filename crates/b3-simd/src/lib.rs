//! Incremental BLAKE3 hashing with runtime-selected SIMD compression backends.
//!
//! The crate keeps one [`HashState`] per logical hash computation and routes
//! every compression through the [`Backend`] chosen once per process by the
//! capability detector in [`dispatcher`].
//!
//! # Example
//!
//! ```
//! use b3_simd::{HashState, hash};
//!
//! let mut state = HashState::new();
//! state.update(b"ho").update(b"ge");
//!
//! // Finalizing does not consume the state.
//! assert_eq!(state.finalize(), hash(b"hoge"));
//! state.update(b"!");
//! assert_eq!(state.finalize(), hash(b"hoge!"));
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

/// Emits a `tracing` debug event when the `tracing` feature is enabled.
macro_rules! debug_event {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        ::tracing::debug!(target: "b3_simd", $($arg)*);
    };
}
pub(crate) use debug_event;

pub mod dispatcher;
mod error;
mod output;
mod portable;
mod simd;
mod state;

pub use dispatcher::{BACKEND_ENV, Backend};
pub use error::EngineError;
pub use output::OutputReader;
pub use state::HashState;

/// Default digest length in bytes.
pub const OUT_LEN: usize = 32;

/// Key length for keyed hashing, in bytes.
pub const KEY_LEN: usize = 32;

/// Bytes consumed by one compression.
pub const BLOCK_LEN: usize = 64;

/// Bytes per leaf of the hash tree.
pub const CHUNK_LEN: usize = 1024;

/// BLAKE3 digest type (32 bytes / 256 bits).
pub type Digest = [u8; OUT_LEN];

pub(crate) const CHUNK_START: u8 = 1 << 0;
pub(crate) const CHUNK_END: u8 = 1 << 1;
pub(crate) const PARENT: u8 = 1 << 2;
pub(crate) const ROOT: u8 = 1 << 3;
pub(crate) const KEYED_HASH: u8 = 1 << 4;
pub(crate) const DERIVE_KEY_CONTEXT: u8 = 1 << 5;
pub(crate) const DERIVE_KEY_MATERIAL: u8 = 1 << 6;

pub(crate) const IV: [u32; 8] = [
    0x6A09_E667,
    0xBB67_AE85,
    0x3C6E_F372,
    0xA54F_F53A,
    0x510E_527F,
    0x9B05_688C,
    0x1F83_D9AB,
    0x5BE0_CD19,
];

/// Message word order for each of the seven rounds.
pub(crate) const MSG_SCHEDULE: [[usize; 16]; 7] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15],
    [2, 6, 3, 10, 7, 0, 4, 13, 1, 11, 12, 5, 9, 14, 15, 8],
    [3, 4, 10, 12, 13, 2, 7, 14, 6, 5, 9, 0, 11, 15, 8, 1],
    [10, 7, 12, 9, 14, 3, 13, 15, 4, 0, 11, 2, 5, 8, 1, 6],
    [12, 13, 9, 11, 15, 10, 14, 8, 7, 2, 5, 3, 0, 1, 6, 4],
    [9, 14, 11, 5, 8, 12, 15, 1, 13, 3, 0, 10, 2, 6, 4, 7],
    [11, 15, 5, 0, 1, 9, 8, 6, 14, 10, 2, 12, 3, 4, 7, 13],
];

/// Compute the BLAKE3 digest of `input` in one shot.
pub fn hash(input: &[u8]) -> Digest {
    let mut state = HashState::new();
    state.update(input);
    state.finalize()
}

/// Compute the keyed BLAKE3 digest of `input`.
pub fn keyed_hash(key: &[u8; KEY_LEN], input: &[u8]) -> Digest {
    let mut state = HashState::new_keyed(key);
    state.update(input);
    state.finalize()
}

/// Derive a 32-byte key from `key_material` under a hardcoded, globally unique
/// `context` string.
pub fn derive_key(context: &str, key_material: &[u8]) -> [u8; KEY_LEN] {
    let mut state = HashState::new_derive_key(context);
    state.update(key_material);
    state.finalize()
}

/// Get the backend selected for this process.
///
/// Useful for logging or diagnostics.
pub fn active_backend() -> Backend {
    dispatcher::global().backend()
}
