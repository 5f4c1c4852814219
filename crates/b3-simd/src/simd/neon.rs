//! ARM NEON BLAKE3 compression.
//!
//! # Safety
//!
//! This module contains `unsafe` code for SIMD operations. NEON availability
//! is checked via `std::arch::is_aarch64_feature_detected!("neon")` by the
//! dispatcher before any function here is reached. `vld1q_u32` and
//! `vst1q_u32` have no alignment requirement, so loads straight from the
//! chaining value and message arrays are fine.
//!
//! # SIMD Strategy
//!
//! The state is held as four row vectors, the same layout the SSE4.1 row
//! compression uses. Lane rotations for the diagonal step use `vextq_u32`.
//! Whole chunks are folded one at a time through the row compression.

#![allow(unsafe_code)]
#![allow(unsafe_op_in_unsafe_fn)]

use core::arch::aarch64::{
    uint32x4_t, vaddq_u32, veorq_u32, vextq_u32, vld1q_u32, vorrq_u32, vreinterpretq_u16_u32,
    vreinterpretq_u32_u16, vrev32q_u16, vshlq_n_u32, vshrq_n_u32, vst1q_u32,
};

use crate::portable::{self, le_bytes_from_words_32, words_from_le_bytes_64};
use crate::{BLOCK_LEN, CHUNK_LEN, IV, MSG_SCHEDULE, OUT_LEN};

#[inline(always)]
unsafe fn set4(a: u32, b: u32, c: u32, d: u32) -> uint32x4_t {
    let words = [a, b, c, d];
    vld1q_u32(words.as_ptr())
}

#[inline(always)]
unsafe fn rot16(x: uint32x4_t) -> uint32x4_t {
    vreinterpretq_u32_u16(vrev32q_u16(vreinterpretq_u16_u32(x)))
}

#[inline(always)]
unsafe fn rot12(x: uint32x4_t) -> uint32x4_t {
    vorrq_u32(vshrq_n_u32::<12>(x), vshlq_n_u32::<20>(x))
}

#[inline(always)]
unsafe fn rot8(x: uint32x4_t) -> uint32x4_t {
    vorrq_u32(vshrq_n_u32::<8>(x), vshlq_n_u32::<24>(x))
}

#[inline(always)]
unsafe fn rot7(x: uint32x4_t) -> uint32x4_t {
    vorrq_u32(vshrq_n_u32::<7>(x), vshlq_n_u32::<25>(x))
}

#[inline(always)]
unsafe fn g1(rows: &mut [uint32x4_t; 4], m: uint32x4_t) {
    rows[0] = vaddq_u32(vaddq_u32(rows[0], m), rows[1]);
    rows[3] = rot16(veorq_u32(rows[3], rows[0]));
    rows[2] = vaddq_u32(rows[2], rows[3]);
    rows[1] = rot12(veorq_u32(rows[1], rows[2]));
}

#[inline(always)]
unsafe fn g2(rows: &mut [uint32x4_t; 4], m: uint32x4_t) {
    rows[0] = vaddq_u32(vaddq_u32(rows[0], m), rows[1]);
    rows[3] = rot8(veorq_u32(rows[3], rows[0]));
    rows[2] = vaddq_u32(rows[2], rows[3]);
    rows[1] = rot7(veorq_u32(rows[1], rows[2]));
}

// Row 1 stays put; lane i of the other rows moves so that lane i holds the
// diagonal whose b-word is v[4 + i].
#[inline(always)]
unsafe fn diagonalize(rows: &mut [uint32x4_t; 4]) {
    rows[0] = vextq_u32::<3>(rows[0], rows[0]);
    rows[3] = vextq_u32::<2>(rows[3], rows[3]);
    rows[2] = vextq_u32::<1>(rows[2], rows[2]);
}

#[inline(always)]
unsafe fn undiagonalize(rows: &mut [uint32x4_t; 4]) {
    rows[0] = vextq_u32::<1>(rows[0], rows[0]);
    rows[3] = vextq_u32::<2>(rows[3], rows[3]);
    rows[2] = vextq_u32::<3>(rows[2], rows[2]);
}

#[inline(always)]
unsafe fn compress_rows(
    cv: &[u32; 8],
    block: &[u8; BLOCK_LEN],
    block_len: u8,
    counter: u64,
    flags: u8,
) -> [uint32x4_t; 4] {
    let m = words_from_le_bytes_64(block);
    let mut rows = [
        vld1q_u32(cv.as_ptr()),
        vld1q_u32(cv.as_ptr().add(4)),
        vld1q_u32(IV.as_ptr()),
        set4(
            counter as u32,
            (counter >> 32) as u32,
            u32::from(block_len),
            u32::from(flags),
        ),
    ];

    for s in &MSG_SCHEDULE {
        g1(&mut rows, set4(m[s[0]], m[s[2]], m[s[4]], m[s[6]]));
        g2(&mut rows, set4(m[s[1]], m[s[3]], m[s[5]], m[s[7]]));
        diagonalize(&mut rows);
        g1(&mut rows, set4(m[s[14]], m[s[8]], m[s[10]], m[s[12]]));
        g2(&mut rows, set4(m[s[15]], m[s[9]], m[s[11]], m[s[13]]));
        undiagonalize(&mut rows);
    }

    rows
}

/// Compress one block into `cv`.
///
/// # Safety
///
/// Caller must ensure NEON is available.
#[target_feature(enable = "neon")]
pub unsafe fn compress_in_place(
    cv: &mut [u32; 8],
    block: &[u8; BLOCK_LEN],
    block_len: u8,
    counter: u64,
    flags: u8,
) {
    let rows = compress_rows(cv, block, block_len, counter, flags);
    vst1q_u32(cv.as_mut_ptr(), veorq_u32(rows[0], rows[2]));
    vst1q_u32(cv.as_mut_ptr().add(4), veorq_u32(rows[1], rows[3]));
}

/// Compress one block and return the full 64-byte extended output.
///
/// # Safety
///
/// Caller must ensure NEON is available.
#[target_feature(enable = "neon")]
pub unsafe fn compress_xof(
    cv: &[u32; 8],
    block: &[u8; BLOCK_LEN],
    block_len: u8,
    counter: u64,
    flags: u8,
) -> [u8; 2 * OUT_LEN] {
    let rows = compress_rows(cv, block, block_len, counter, flags);
    let mut words = [0u32; 16];
    vst1q_u32(words.as_mut_ptr(), veorq_u32(rows[0], rows[2]));
    vst1q_u32(words.as_mut_ptr().add(4), veorq_u32(rows[1], rows[3]));
    vst1q_u32(
        words.as_mut_ptr().add(8),
        veorq_u32(rows[2], vld1q_u32(cv.as_ptr())),
    );
    vst1q_u32(
        words.as_mut_ptr().add(12),
        veorq_u32(rows[3], vld1q_u32(cv.as_ptr().add(4))),
    );

    let mut out = [0u8; 2 * OUT_LEN];
    for (chunk, word) in out.as_chunks_mut::<4>().0.iter_mut().zip(words.iter()) {
        *chunk = word.to_le_bytes();
    }
    out
}

/// Hash whole chunks one after another through the row compression.
///
/// # Safety
///
/// Caller must ensure NEON is available.
#[target_feature(enable = "neon")]
pub unsafe fn hash_many(
    chunks: &[&[u8; CHUNK_LEN]],
    key: &[u32; 8],
    counter: u64,
    flags: u8,
    out: &mut [u8],
) {
    debug_assert!(out.len() >= chunks.len() * OUT_LEN);
    for ((i, chunk), dest) in chunks
        .iter()
        .enumerate()
        .zip(out.as_chunks_mut::<OUT_LEN>().0.iter_mut())
    {
        let cv = portable::hash_one_chunk(
            chunk,
            key,
            counter + i as u64,
            flags,
            |cv, block, block_len, chunk_counter, block_flags| {
                // SAFETY: only reached from NEON-enabled callers.
                unsafe { compress_in_place(cv, block, block_len, chunk_counter, block_flags) }
            },
        );
        *dest = le_bytes_from_words_32(&cv);
    }
}
