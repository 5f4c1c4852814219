//! SSE4.1 BLAKE3 compression.
//!
//! # CPU Feature Requirements
//!
//! - **SSE4.1** (which implies SSSE3 for `pshufb`): Intel Penryn (2007+),
//!   AMD Bulldozer (2011+) or newer
//! - Must be verified at runtime using `is_x86_feature_detected!("sse4.1")`
//!
//! # SIMD Strategy
//!
//! Single compressions keep the 4x4 state as four row vectors. A round runs
//! the column step on the rows as loaded, rotates rows 0, 2 and 3 so the
//! diagonals line up under row 1, runs the same step again and rotates back.
//!
//! Whole chunks are hashed four at a time with the state transposed, so each
//! lane carries an independent chunk and no shuffles are needed inside a
//! round.

#![allow(unsafe_code)]
#![allow(unsafe_op_in_unsafe_fn)]
#![allow(clippy::many_single_char_names)]

use std::arch::x86_64::*;

use crate::portable::{self, words_from_le_bytes_64};
use crate::{BLOCK_LEN, CHUNK_END, CHUNK_LEN, CHUNK_START, IV, MSG_SCHEDULE, OUT_LEN};

/// Number of chunks hashed in parallel by [`hash4`].
pub const DEGREE: usize = 4;

#[inline(always)]
unsafe fn loadu(src: *const u8) -> __m128i {
    _mm_loadu_si128(src.cast())
}

#[inline(always)]
unsafe fn storeu(src: __m128i, dest: *mut u8) {
    _mm_storeu_si128(dest.cast(), src);
}

#[inline(always)]
unsafe fn add(a: __m128i, b: __m128i) -> __m128i {
    _mm_add_epi32(a, b)
}

#[inline(always)]
unsafe fn xor(a: __m128i, b: __m128i) -> __m128i {
    _mm_xor_si128(a, b)
}

#[inline(always)]
unsafe fn set1(x: u32) -> __m128i {
    _mm_set1_epi32(x as i32)
}

#[inline(always)]
unsafe fn set4(a: u32, b: u32, c: u32, d: u32) -> __m128i {
    _mm_setr_epi32(a as i32, b as i32, c as i32, d as i32)
}

#[inline(always)]
unsafe fn rot16(a: __m128i) -> __m128i {
    _mm_shuffle_epi8(
        a,
        _mm_setr_epi8(2, 3, 0, 1, 6, 7, 4, 5, 10, 11, 8, 9, 14, 15, 12, 13),
    )
}

#[inline(always)]
unsafe fn rot12(a: __m128i) -> __m128i {
    _mm_or_si128(_mm_srli_epi32(a, 12), _mm_slli_epi32(a, 20))
}

#[inline(always)]
unsafe fn rot8(a: __m128i) -> __m128i {
    _mm_shuffle_epi8(
        a,
        _mm_setr_epi8(1, 2, 3, 0, 5, 6, 7, 4, 9, 10, 11, 8, 13, 14, 15, 12),
    )
}

#[inline(always)]
unsafe fn rot7(a: __m128i) -> __m128i {
    _mm_or_si128(_mm_srli_epi32(a, 7), _mm_slli_epi32(a, 25))
}

#[inline(always)]
const fn counter_low(counter: u64) -> u32 {
    counter as u32
}

#[inline(always)]
const fn counter_high(counter: u64) -> u32 {
    (counter >> 32) as u32
}

// ---------------------------------------------------------------------------
// Row-oriented single compression
// ---------------------------------------------------------------------------

#[inline(always)]
unsafe fn g1(
    row0: &mut __m128i,
    row1: &mut __m128i,
    row2: &mut __m128i,
    row3: &mut __m128i,
    m: __m128i,
) {
    *row0 = add(add(*row0, m), *row1);
    *row3 = rot16(xor(*row3, *row0));
    *row2 = add(*row2, *row3);
    *row1 = rot12(xor(*row1, *row2));
}

#[inline(always)]
unsafe fn g2(
    row0: &mut __m128i,
    row1: &mut __m128i,
    row2: &mut __m128i,
    row3: &mut __m128i,
    m: __m128i,
) {
    *row0 = add(add(*row0, m), *row1);
    *row3 = rot8(xor(*row3, *row0));
    *row2 = add(*row2, *row3);
    *row1 = rot7(xor(*row1, *row2));
}

// Row 1 stays put; lane i of the other rows moves so that lane i holds the
// diagonal whose b-word is v[4 + i].
#[inline(always)]
unsafe fn diagonalize(row0: &mut __m128i, row2: &mut __m128i, row3: &mut __m128i) {
    *row0 = _mm_shuffle_epi32(*row0, 0x93);
    *row3 = _mm_shuffle_epi32(*row3, 0x4E);
    *row2 = _mm_shuffle_epi32(*row2, 0x39);
}

#[inline(always)]
unsafe fn undiagonalize(row0: &mut __m128i, row2: &mut __m128i, row3: &mut __m128i) {
    *row0 = _mm_shuffle_epi32(*row0, 0x39);
    *row3 = _mm_shuffle_epi32(*row3, 0x4E);
    *row2 = _mm_shuffle_epi32(*row2, 0x93);
}

#[inline(always)]
unsafe fn compress_rows(
    cv: &[u32; 8],
    block: &[u8; BLOCK_LEN],
    block_len: u8,
    counter: u64,
    flags: u8,
) -> [__m128i; 4] {
    let m = words_from_le_bytes_64(block);
    let mut row0 = loadu(cv.as_ptr().cast());
    let mut row1 = loadu(cv.as_ptr().add(4).cast());
    let mut row2 = set4(IV[0], IV[1], IV[2], IV[3]);
    let mut row3 = set4(
        counter_low(counter),
        counter_high(counter),
        u32::from(block_len),
        u32::from(flags),
    );

    for s in &MSG_SCHEDULE {
        g1(
            &mut row0,
            &mut row1,
            &mut row2,
            &mut row3,
            set4(m[s[0]], m[s[2]], m[s[4]], m[s[6]]),
        );
        g2(
            &mut row0,
            &mut row1,
            &mut row2,
            &mut row3,
            set4(m[s[1]], m[s[3]], m[s[5]], m[s[7]]),
        );
        diagonalize(&mut row0, &mut row2, &mut row3);
        g1(
            &mut row0,
            &mut row1,
            &mut row2,
            &mut row3,
            set4(m[s[14]], m[s[8]], m[s[10]], m[s[12]]),
        );
        g2(
            &mut row0,
            &mut row1,
            &mut row2,
            &mut row3,
            set4(m[s[15]], m[s[9]], m[s[11]], m[s[13]]),
        );
        undiagonalize(&mut row0, &mut row2, &mut row3);
    }

    [row0, row1, row2, row3]
}

/// Compress one block into `cv`.
///
/// # Safety
///
/// Caller must ensure SSE4.1 is available.
#[target_feature(enable = "sse4.1")]
pub unsafe fn compress_in_place(
    cv: &mut [u32; 8],
    block: &[u8; BLOCK_LEN],
    block_len: u8,
    counter: u64,
    flags: u8,
) {
    let [row0, row1, row2, row3] = compress_rows(cv, block, block_len, counter, flags);
    storeu(xor(row0, row2), cv.as_mut_ptr().cast());
    storeu(xor(row1, row3), cv.as_mut_ptr().add(4).cast());
}

/// Compress one block and return the full 64-byte extended output.
///
/// # Safety
///
/// Caller must ensure SSE4.1 is available.
#[target_feature(enable = "sse4.1")]
pub unsafe fn compress_xof(
    cv: &[u32; 8],
    block: &[u8; BLOCK_LEN],
    block_len: u8,
    counter: u64,
    flags: u8,
) -> [u8; 2 * OUT_LEN] {
    let [row0, row1, row2, row3] = compress_rows(cv, block, block_len, counter, flags);
    let mut out = [0u8; 2 * OUT_LEN];
    let dest = out.as_mut_ptr();
    storeu(xor(row0, row2), dest);
    storeu(xor(row1, row3), dest.add(16));
    storeu(xor(row2, loadu(cv.as_ptr().cast())), dest.add(32));
    storeu(xor(row3, loadu(cv.as_ptr().add(4).cast())), dest.add(48));
    out
}

// ---------------------------------------------------------------------------
// Transposed 4-way chunk hashing
// ---------------------------------------------------------------------------

#[inline(always)]
unsafe fn g(
    v: &mut [__m128i; 16],
    a: usize,
    b: usize,
    c: usize,
    d: usize,
    x: __m128i,
    y: __m128i,
) {
    v[a] = add(add(v[a], v[b]), x);
    v[d] = rot16(xor(v[d], v[a]));
    v[c] = add(v[c], v[d]);
    v[b] = rot12(xor(v[b], v[c]));
    v[a] = add(add(v[a], v[b]), y);
    v[d] = rot8(xor(v[d], v[a]));
    v[c] = add(v[c], v[d]);
    v[b] = rot7(xor(v[b], v[c]));
}

#[inline(always)]
unsafe fn round(v: &mut [__m128i; 16], m: &[__m128i; 16], r: usize) {
    let s = &MSG_SCHEDULE[r];
    g(v, 0, 4, 8, 12, m[s[0]], m[s[1]]);
    g(v, 1, 5, 9, 13, m[s[2]], m[s[3]]);
    g(v, 2, 6, 10, 14, m[s[4]], m[s[5]]);
    g(v, 3, 7, 11, 15, m[s[6]], m[s[7]]);
    g(v, 0, 5, 10, 15, m[s[8]], m[s[9]]);
    g(v, 1, 6, 11, 12, m[s[10]], m[s[11]]);
    g(v, 2, 7, 8, 13, m[s[12]], m[s[13]]);
    g(v, 3, 4, 9, 14, m[s[14]], m[s[15]]);
}

// Rows in, columns out: vecs[i] lane j becomes vecs[j] lane i.
#[inline(always)]
unsafe fn transpose(vecs: &mut [__m128i; DEGREE]) {
    let ab_01 = _mm_unpacklo_epi32(vecs[0], vecs[1]);
    let ab_23 = _mm_unpackhi_epi32(vecs[0], vecs[1]);
    let cd_01 = _mm_unpacklo_epi32(vecs[2], vecs[3]);
    let cd_23 = _mm_unpackhi_epi32(vecs[2], vecs[3]);

    vecs[0] = _mm_unpacklo_epi64(ab_01, cd_01);
    vecs[1] = _mm_unpackhi_epi64(ab_01, cd_01);
    vecs[2] = _mm_unpacklo_epi64(ab_23, cd_23);
    vecs[3] = _mm_unpackhi_epi64(ab_23, cd_23);
}

#[inline(always)]
unsafe fn transpose_msg_vecs(
    inputs: &[&[u8; CHUNK_LEN]; DEGREE],
    block_offset: usize,
) -> [__m128i; 16] {
    let mut out = [_mm_setzero_si128(); 16];
    for quarter in 0..4 {
        let offset = block_offset + quarter * 16;
        let mut vecs = [
            loadu(inputs[0].as_ptr().add(offset)),
            loadu(inputs[1].as_ptr().add(offset)),
            loadu(inputs[2].as_ptr().add(offset)),
            loadu(inputs[3].as_ptr().add(offset)),
        ];
        transpose(&mut vecs);
        out[quarter * 4..quarter * 4 + 4].copy_from_slice(&vecs);
    }
    out
}

/// Hash four whole chunks in parallel, writing four chaining values to `out`.
///
/// Lane `i` uses chunk counter `counter + i`.
///
/// # Safety
///
/// Caller must ensure SSE4.1 is available.
#[target_feature(enable = "sse4.1")]
pub unsafe fn hash4(
    inputs: &[&[u8; CHUNK_LEN]; DEGREE],
    key: &[u32; 8],
    counter: u64,
    flags: u8,
    out: &mut [u8; DEGREE * OUT_LEN],
) {
    let mut h = [
        set1(key[0]),
        set1(key[1]),
        set1(key[2]),
        set1(key[3]),
        set1(key[4]),
        set1(key[5]),
        set1(key[6]),
        set1(key[7]),
    ];
    let counter_lo = set4(
        counter_low(counter),
        counter_low(counter + 1),
        counter_low(counter + 2),
        counter_low(counter + 3),
    );
    let counter_hi = set4(
        counter_high(counter),
        counter_high(counter + 1),
        counter_high(counter + 2),
        counter_high(counter + 3),
    );

    let blocks = CHUNK_LEN / BLOCK_LEN;
    for block in 0..blocks {
        let mut block_flags = flags;
        if block == 0 {
            block_flags |= CHUNK_START;
        }
        if block + 1 == blocks {
            block_flags |= CHUNK_END;
        }

        let m = transpose_msg_vecs(inputs, block * BLOCK_LEN);
        let mut v = [
            h[0],
            h[1],
            h[2],
            h[3],
            h[4],
            h[5],
            h[6],
            h[7],
            set1(IV[0]),
            set1(IV[1]),
            set1(IV[2]),
            set1(IV[3]),
            counter_lo,
            counter_hi,
            set1(BLOCK_LEN as u32),
            set1(u32::from(block_flags)),
        ];
        for r in 0..7 {
            round(&mut v, &m, r);
        }
        for i in 0..8 {
            h[i] = xor(v[i], v[i + 8]);
        }
    }

    let mut lo = [h[0], h[1], h[2], h[3]];
    let mut hi = [h[4], h[5], h[6], h[7]];
    transpose(&mut lo);
    transpose(&mut hi);

    let dest = out.as_mut_ptr();
    for lane in 0..DEGREE {
        storeu(lo[lane], dest.add(lane * OUT_LEN));
        storeu(hi[lane], dest.add(lane * OUT_LEN + 16));
    }
}

/// Hash whole chunks, four at a time where possible.
///
/// # Safety
///
/// Caller must ensure SSE4.1 is available.
#[target_feature(enable = "sse4.1")]
pub unsafe fn hash_many(
    chunks: &[&[u8; CHUNK_LEN]],
    key: &[u32; 8],
    counter: u64,
    flags: u8,
    out: &mut [u8],
) {
    debug_assert!(out.len() >= chunks.len() * OUT_LEN);
    let (groups, rest) = chunks.as_chunks::<DEGREE>();
    let (out_groups, out_rest) = out.split_at_mut(groups.len() * DEGREE * OUT_LEN);

    let mut chunk_counter = counter;
    for (group, dest) in groups
        .iter()
        .zip(out_groups.as_chunks_mut::<{ DEGREE * OUT_LEN }>().0.iter_mut())
    {
        hash4(group, key, chunk_counter, flags, dest);
        chunk_counter += DEGREE as u64;
    }

    hash_rest(rest, key, chunk_counter, flags, out_rest);
}

/// Hash a handful of chunks one at a time with the row compression.
///
/// # Safety
///
/// Caller must ensure SSE4.1 is available.
#[target_feature(enable = "sse4.1")]
pub(crate) unsafe fn hash_rest(
    chunks: &[&[u8; CHUNK_LEN]],
    key: &[u32; 8],
    counter: u64,
    flags: u8,
    out: &mut [u8],
) {
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
                // SAFETY: only reached from SSE4.1-enabled callers.
                unsafe { compress_in_place(cv, block, block_len, chunk_counter, block_flags) }
            },
        );
        *dest = portable::le_bytes_from_words_32(&cv);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CHUNK_END, CHUNK_START, ROOT};

    fn sse41_available() -> bool {
        is_x86_feature_detected!("sse4.1")
    }

    fn block_from_seed(seed: u8) -> [u8; BLOCK_LEN] {
        std::array::from_fn(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
    }

    #[test]
    fn row_compression_matches_portable() {
        if !sse41_available() {
            return;
        }
        let block = block_from_seed(7);
        for (len, counter, flags) in [
            (64u8, 0u64, CHUNK_START),
            (17, 3, CHUNK_END | ROOT),
            (0, u64::from(u32::MAX) + 5, CHUNK_START | CHUNK_END),
        ] {
            let mut expected = IV;
            portable::compress_in_place(&mut expected, &block, len, counter, flags);
            let mut actual = IV;
            unsafe { compress_in_place(&mut actual, &block, len, counter, flags) };
            assert_eq!(actual, expected);

            let expected_xof = portable::compress_xof(&IV, &block, len, counter, flags);
            let actual_xof = unsafe { compress_xof(&IV, &block, len, counter, flags) };
            assert_eq!(actual_xof, expected_xof);
        }
    }

    #[test]
    fn hash_many_matches_portable_for_uneven_counts() {
        if !sse41_available() {
            return;
        }
        let storage: Vec<[u8; CHUNK_LEN]> = (0..7u8)
            .map(|seed| std::array::from_fn(|i| (i as u8) ^ seed.wrapping_mul(13)))
            .collect();
        let chunks: Vec<&[u8; CHUNK_LEN]> = storage.iter().collect();

        let mut expected = vec![0u8; chunks.len() * OUT_LEN];
        portable::hash_many(&chunks, &IV, 40, 0, &mut expected);
        let mut actual = vec![0u8; chunks.len() * OUT_LEN];
        unsafe { hash_many(&chunks, &IV, 40, 0, &mut actual) };
        assert_eq!(actual, expected);
    }
}
