//! Runtime CPU detection and backend dispatch.
//!
//! The backend is probed once per process, on first use, and cached in a
//! [`OnceLock`]. Setting [`BACKEND_ENV`] to a backend name before that first
//! use narrows the choice, which is how the test suite and operators pin a
//! specific implementation. A request for a backend the host cannot run is
//! ignored and normal detection proceeds.

use std::fmt;
use std::sync::OnceLock;

use crate::{BLOCK_LEN, CHUNK_LEN, OUT_LEN, debug_event, portable};

#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
use crate::simd;

/// Environment variable consulted once by the detector.
///
/// Accepted values are the [`Backend::name`] strings, case-insensitively.
pub const BACKEND_ENV: &str = "B3DIGEST_BACKEND";

/// Available compression backends.
///
/// Every variant produces bit-identical output; they differ only in the
/// instructions used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// AVX2 for 8-way chunk hashing, SSE4.1 for single compressions.
    #[cfg(target_arch = "x86_64")]
    Avx2,
    /// SSE4.1 row compression and 4-way chunk hashing.
    #[cfg(target_arch = "x86_64")]
    Sse41,
    /// ARM NEON row compression.
    #[cfg(target_arch = "aarch64")]
    Neon,
    /// Scalar fallback, available everywhere.
    Portable,
}

impl Backend {
    /// Every backend compiled for this target, most specialized first.
    #[cfg(target_arch = "x86_64")]
    pub const ALL: &'static [Self] = &[Self::Avx2, Self::Sse41, Self::Portable];

    /// Every backend compiled for this target, most specialized first.
    #[cfg(target_arch = "aarch64")]
    pub const ALL: &'static [Self] = &[Self::Neon, Self::Portable];

    /// Every backend compiled for this target, most specialized first.
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    pub const ALL: &'static [Self] = &[Self::Portable];

    /// Stable lowercase name, also accepted by [`BACKEND_ENV`].
    pub const fn name(self) -> &'static str {
        match self {
            #[cfg(target_arch = "x86_64")]
            Self::Avx2 => "avx2",
            #[cfg(target_arch = "x86_64")]
            Self::Sse41 => "sse41",
            #[cfg(target_arch = "aarch64")]
            Self::Neon => "neon",
            Self::Portable => "portable",
        }
    }

    /// Look up a backend compiled for this target by name.
    ///
    /// Surrounding whitespace and case are ignored. Names of backends that
    /// exist only on other architectures return `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|backend| backend.name().eq_ignore_ascii_case(name))
    }

    /// Number of whole chunks hashed in parallel by [`hash_many`](Self::hash_many).
    pub const fn degree(self) -> usize {
        match self {
            #[cfg(target_arch = "x86_64")]
            Self::Avx2 => simd::avx2::DEGREE,
            #[cfg(target_arch = "x86_64")]
            Self::Sse41 => simd::sse41::DEGREE,
            #[cfg(target_arch = "aarch64")]
            Self::Neon => 1,
            Self::Portable => 1,
        }
    }

    /// Whether the running CPU has the features this backend requires.
    pub fn is_supported(self) -> bool {
        match self {
            #[cfg(target_arch = "x86_64")]
            Self::Avx2 => is_x86_feature_detected!("avx2") && is_x86_feature_detected!("sse4.1"),
            #[cfg(target_arch = "x86_64")]
            Self::Sse41 => is_x86_feature_detected!("sse4.1"),
            #[cfg(target_arch = "aarch64")]
            Self::Neon => std::arch::is_aarch64_feature_detected!("neon"),
            Self::Portable => true,
        }
    }

    /// Backends compiled for this target that the running CPU supports.
    pub fn available() -> Vec<Self> {
        Self::ALL
            .iter()
            .copied()
            .filter(|backend| backend.is_supported())
            .collect()
    }

    /// Compress one block into `cv`.
    #[inline]
    pub(crate) fn compress_in_place(
        self,
        cv: &mut [u32; 8],
        block: &[u8; BLOCK_LEN],
        block_len: u8,
        counter: u64,
        flags: u8,
    ) {
        match self {
            #[cfg(target_arch = "x86_64")]
            Self::Avx2 | Self::Sse41 => {
                // SAFETY: a Backend only reaches a HashState after is_supported().
                unsafe {
                    simd::sse41::compress_in_place(cv, block, block_len, counter, flags);
                }
            }
            #[cfg(target_arch = "aarch64")]
            Self::Neon => {
                // SAFETY: a Backend only reaches a HashState after is_supported().
                unsafe {
                    simd::neon::compress_in_place(cv, block, block_len, counter, flags);
                }
            }
            Self::Portable => portable::compress_in_place(cv, block, block_len, counter, flags),
        }
    }

    /// Compress one block and return all 64 output bytes.
    #[inline]
    pub(crate) fn compress_xof(
        self,
        cv: &[u32; 8],
        block: &[u8; BLOCK_LEN],
        block_len: u8,
        counter: u64,
        flags: u8,
    ) -> [u8; 2 * OUT_LEN] {
        match self {
            #[cfg(target_arch = "x86_64")]
            Self::Avx2 | Self::Sse41 => {
                // SAFETY: a Backend only reaches a HashState after is_supported().
                unsafe {
                    simd::sse41::compress_xof(cv, block, block_len, counter, flags)
                }
            }
            #[cfg(target_arch = "aarch64")]
            Self::Neon => {
                // SAFETY: a Backend only reaches a HashState after is_supported().
                unsafe {
                    simd::neon::compress_xof(cv, block, block_len, counter, flags)
                }
            }
            Self::Portable => portable::compress_xof(cv, block, block_len, counter, flags),
        }
    }

    /// Hash whole chunks with consecutive counters starting at `counter`,
    /// writing one 32-byte chaining value per chunk into `out`.
    #[inline]
    pub(crate) fn hash_many(
        self,
        chunks: &[&[u8; CHUNK_LEN]],
        key: &[u32; 8],
        counter: u64,
        flags: u8,
        out: &mut [u8],
    ) {
        match self {
            #[cfg(target_arch = "x86_64")]
            Self::Avx2 => {
                // SAFETY: a Backend only reaches a HashState after is_supported().
                unsafe {
                    simd::avx2::hash_many(chunks, key, counter, flags, out);
                }
            }
            #[cfg(target_arch = "x86_64")]
            Self::Sse41 => {
                // SAFETY: a Backend only reaches a HashState after is_supported().
                unsafe {
                    simd::sse41::hash_many(chunks, key, counter, flags, out);
                }
            }
            #[cfg(target_arch = "aarch64")]
            Self::Neon => {
                // SAFETY: a Backend only reaches a HashState after is_supported().
                unsafe {
                    simd::neon::hash_many(chunks, key, counter, flags, out);
                }
            }
            Self::Portable => portable::hash_many(chunks, key, counter, flags, out),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Dispatcher that selects the optimal backend at runtime.
#[derive(Debug)]
pub struct Dispatcher {
    backend: Backend,
}

impl Dispatcher {
    /// Detect CPU features and select the best available backend, honoring
    /// [`BACKEND_ENV`] when it names a supported backend.
    pub fn detect() -> Self {
        let requested = std::env::var(BACKEND_ENV).ok();
        Self::resolve(requested.as_deref())
    }

    /// Select a backend, preferring `requested` when it names a supported one.
    pub fn resolve(requested: Option<&str>) -> Self {
        if let Some(name) = requested {
            match Backend::from_name(name) {
                Some(backend) if backend.is_supported() => {
                    debug_event!(backend = backend.name(), "backend pinned by environment");
                    return Self { backend };
                }
                Some(_unsupported) => {
                    debug_event!(
                        backend = _unsupported.name(),
                        "requested backend unsupported on this CPU, detecting"
                    );
                }
                None => {
                    debug_event!(requested = name, "unknown backend requested, detecting");
                }
            }
        }

        let backend = Self::detect_backend();
        debug_event!(
            backend = backend.name(),
            degree = backend.degree(),
            "selected compression backend"
        );
        Self { backend }
    }

    fn detect_backend() -> Backend {
        Backend::ALL
            .iter()
            .copied()
            .find(|backend| backend.is_supported())
            .unwrap_or(Backend::Portable)
    }

    /// Get the selected backend.
    pub const fn backend(&self) -> Backend {
        self.backend
    }
}

/// Global dispatcher instance, initialized on first use.
pub fn global() -> &'static Dispatcher {
    static DISPATCHER: OnceLock<Dispatcher> = OnceLock::new();
    DISPATCHER.get_or_init(Dispatcher::detect)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portable_is_always_available() {
        assert!(Backend::Portable.is_supported());
        assert!(Backend::available().contains(&Backend::Portable));
        assert_eq!(Backend::ALL.last(), Some(&Backend::Portable));
    }

    #[test]
    fn names_round_trip() {
        for &backend in Backend::ALL {
            assert_eq!(Backend::from_name(backend.name()), Some(backend));
            assert_eq!(backend.to_string(), backend.name());
        }
        assert_eq!(Backend::from_name("  PORTABLE "), Some(Backend::Portable));
        assert_eq!(Backend::from_name("avx512"), None);
        assert_eq!(Backend::from_name(""), None);
    }

    #[test]
    fn degree_matches_lane_count() {
        assert_eq!(Backend::Portable.degree(), 1);
        #[cfg(target_arch = "x86_64")]
        {
            assert_eq!(Backend::Sse41.degree(), 4);
            assert_eq!(Backend::Avx2.degree(), 8);
        }
        #[cfg(target_arch = "aarch64")]
        assert_eq!(Backend::Neon.degree(), 1);
    }

    #[test]
    fn detection_picks_most_specialized_supported_backend() {
        let expected = Backend::available()[0];
        assert_eq!(Dispatcher::resolve(None).backend(), expected);
    }

    #[test]
    fn override_selects_supported_backend() {
        for backend in Backend::available() {
            assert_eq!(Dispatcher::resolve(Some(backend.name())).backend(), backend);
        }
    }

    #[test]
    fn unknown_override_falls_back_to_detection() {
        let detected = Dispatcher::resolve(None).backend();
        assert_eq!(Dispatcher::resolve(Some("quantum")).backend(), detected);
    }

    #[test]
    fn detected_backend_is_supported() {
        assert!(global().backend().is_supported());
    }

    #[test]
    fn global_dispatcher_is_consistent() {
        let d1 = global();
        let d2 = global();
        assert_eq!(d1.backend(), d2.backend());
        assert!(std::ptr::eq(d1, d2));
    }
}
