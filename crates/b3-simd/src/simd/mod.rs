//! Accelerated BLAKE3 compression backends.
//!
//! Every module exposes the same three entry points as the portable backend:
//! `compress_in_place`, `compress_xof` and `hash_many`. They differ only in
//! the instructions used and must stay bit-identical to the scalar code.
//!
//! ## x86_64 Implementations
//!
//! - **SSE4.1**: one block per compression using four 128-bit row vectors,
//!   4-way parallel for whole chunks.
//! - **AVX2**: 8-way parallel for whole chunks, SSE4.1 row compression for
//!   everything else.
//!
//! ## ARM Implementations
//!
//! - **NEON**: row compression on 128-bit vectors.
//!
//! # Safety
//!
//! All functions in this module are `unsafe` because they use
//! architecture-specific intrinsics. Callers must verify CPU feature support
//! before invoking them; the dispatcher only hands out a [`Backend`] after that
//! check.
//!
//! [`Backend`]: crate::Backend

#[cfg(target_arch = "x86_64")]
pub mod sse41;

#[cfg(target_arch = "x86_64")]
pub mod avx2;

#[cfg(target_arch = "aarch64")]
pub mod neon;
