//! AVX2 8-lane parallel BLAKE3 chunk hashing.
//!
//! # CPU Feature Requirements
//!
//! - **AVX2**: Intel Haswell (2013+), AMD Excavator (2015+) or newer
//! - Must be verified at runtime using `is_x86_feature_detected!("avx2")`
//!
//! AVX2 only pays off when eight independent chunks are available, so single
//! compressions and leftover chunks go through the SSE4.1 code. The dispatcher
//! requires both features before selecting this backend.

#![allow(unsafe_code)]
#![allow(unsafe_op_in_unsafe_fn)]

use std::arch::x86_64::*;

use super::sse41;
use crate::{BLOCK_LEN, CHUNK_END, CHUNK_LEN, CHUNK_START, IV, MSG_SCHEDULE, OUT_LEN};

/// Number of chunks hashed in parallel by [`hash8`].
pub const DEGREE: usize = 8;

#[inline(always)]
unsafe fn loadu(src: *const u8) -> __m256i {
    _mm256_loadu_si256(src.cast())
}

#[inline(always)]
unsafe fn storeu(src: __m256i, dest: *mut u8) {
    _mm256_storeu_si256(dest.cast(), src);
}

#[inline(always)]
unsafe fn add(a: __m256i, b: __m256i) -> __m256i {
    _mm256_add_epi32(a, b)
}

#[inline(always)]
unsafe fn xor(a: __m256i, b: __m256i) -> __m256i {
    _mm256_xor_si256(a, b)
}

#[inline(always)]
unsafe fn set1(x: u32) -> __m256i {
    _mm256_set1_epi32(x as i32)
}

#[inline(always)]
unsafe fn rot16(x: __m256i) -> __m256i {
    _mm256_or_si256(_mm256_srli_epi32(x, 16), _mm256_slli_epi32(x, 16))
}

#[inline(always)]
unsafe fn rot12(x: __m256i) -> __m256i {
    _mm256_or_si256(_mm256_srli_epi32(x, 12), _mm256_slli_epi32(x, 20))
}

#[inline(always)]
unsafe fn rot8(x: __m256i) -> __m256i {
    _mm256_or_si256(_mm256_srli_epi32(x, 8), _mm256_slli_epi32(x, 24))
}

#[inline(always)]
unsafe fn rot7(x: __m256i) -> __m256i {
    _mm256_or_si256(_mm256_srli_epi32(x, 7), _mm256_slli_epi32(x, 25))
}

#[inline(always)]
unsafe fn g(
    v: &mut [__m256i; 16],
    a: usize,
    b: usize,
    c: usize,
    d: usize,
    x: __m256i,
    y: __m256i,
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
unsafe fn round(v: &mut [__m256i; 16], m: &[__m256i; 16], r: usize) {
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

#[inline(always)]
unsafe fn interleave128(a: __m256i, b: __m256i) -> (__m256i, __m256i) {
    (
        _mm256_permute2x128_si256(a, b, 0x20),
        _mm256_permute2x128_si256(a, b, 0x31),
    )
}

// 8x8 transpose of 32-bit words: vecs[i] lane j becomes vecs[j] lane i.
#[inline(always)]
unsafe fn transpose(vecs: &mut [__m256i; DEGREE]) {
    let ab_0145 = _mm256_unpacklo_epi32(vecs[0], vecs[1]);
    let ab_2367 = _mm256_unpackhi_epi32(vecs[0], vecs[1]);
    let cd_0145 = _mm256_unpacklo_epi32(vecs[2], vecs[3]);
    let cd_2367 = _mm256_unpackhi_epi32(vecs[2], vecs[3]);
    let ef_0145 = _mm256_unpacklo_epi32(vecs[4], vecs[5]);
    let ef_2367 = _mm256_unpackhi_epi32(vecs[4], vecs[5]);
    let gh_0145 = _mm256_unpacklo_epi32(vecs[6], vecs[7]);
    let gh_2367 = _mm256_unpackhi_epi32(vecs[6], vecs[7]);

    let abcd_04 = _mm256_unpacklo_epi64(ab_0145, cd_0145);
    let abcd_15 = _mm256_unpackhi_epi64(ab_0145, cd_0145);
    let abcd_26 = _mm256_unpacklo_epi64(ab_2367, cd_2367);
    let abcd_37 = _mm256_unpackhi_epi64(ab_2367, cd_2367);
    let efgh_04 = _mm256_unpacklo_epi64(ef_0145, gh_0145);
    let efgh_15 = _mm256_unpackhi_epi64(ef_0145, gh_0145);
    let efgh_26 = _mm256_unpacklo_epi64(ef_2367, gh_2367);
    let efgh_37 = _mm256_unpackhi_epi64(ef_2367, gh_2367);

    (vecs[0], vecs[4]) = interleave128(abcd_04, efgh_04);
    (vecs[1], vecs[5]) = interleave128(abcd_15, efgh_15);
    (vecs[2], vecs[6]) = interleave128(abcd_26, efgh_26);
    (vecs[3], vecs[7]) = interleave128(abcd_37, efgh_37);
}

#[inline(always)]
unsafe fn transpose_msg_vecs(
    inputs: &[&[u8; CHUNK_LEN]; DEGREE],
    block_offset: usize,
) -> [__m256i; 16] {
    let mut out = [_mm256_setzero_si256(); 16];
    for half in 0..2 {
        let offset = block_offset + half * 32;
        let mut vecs = [
            loadu(inputs[0].as_ptr().add(offset)),
            loadu(inputs[1].as_ptr().add(offset)),
            loadu(inputs[2].as_ptr().add(offset)),
            loadu(inputs[3].as_ptr().add(offset)),
            loadu(inputs[4].as_ptr().add(offset)),
            loadu(inputs[5].as_ptr().add(offset)),
            loadu(inputs[6].as_ptr().add(offset)),
            loadu(inputs[7].as_ptr().add(offset)),
        ];
        transpose(&mut vecs);
        out[half * DEGREE..(half + 1) * DEGREE].copy_from_slice(&vecs);
    }
    out
}

/// Hash eight whole chunks in parallel, writing eight chaining values to
/// `out`. Lane `i` uses chunk counter `counter + i`.
///
/// # Safety
///
/// Caller must ensure AVX2 is available.
#[target_feature(enable = "avx2")]
pub unsafe fn hash8(
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
    let counter_lo = _mm256_setr_epi32(
        (counter) as i32,
        (counter + 1) as i32,
        (counter + 2) as i32,
        (counter + 3) as i32,
        (counter + 4) as i32,
        (counter + 5) as i32,
        (counter + 6) as i32,
        (counter + 7) as i32,
    );
    let counter_hi = _mm256_setr_epi32(
        (counter >> 32) as i32,
        ((counter + 1) >> 32) as i32,
        ((counter + 2) >> 32) as i32,
        ((counter + 3) >> 32) as i32,
        ((counter + 4) >> 32) as i32,
        ((counter + 5) >> 32) as i32,
        ((counter + 6) >> 32) as i32,
        ((counter + 7) >> 32) as i32,
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

    // h[k] holds word k of every lane; after the transpose h[lane] holds the
    // whole chaining value of that lane.
    transpose(&mut h);
    let dest = out.as_mut_ptr();
    for (lane, cv) in h.iter().enumerate() {
        storeu(*cv, dest.add(lane * OUT_LEN));
    }
}

/// Hash whole chunks eight at a time, handing the remainder to SSE4.1.
///
/// # Safety
///
/// Caller must ensure AVX2 and SSE4.1 are available.
#[target_feature(enable = "avx2,sse4.1")]
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
        hash8(group, key, chunk_counter, flags, dest);
        chunk_counter += DEGREE as u64;
    }

    sse41::hash_many(rest, key, chunk_counter, flags, out_rest);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portable;

    fn avx2_available() -> bool {
        is_x86_feature_detected!("avx2") && is_x86_feature_detected!("sse4.1")
    }

    #[test]
    fn hash_many_matches_portable_across_group_boundaries() {
        if !avx2_available() {
            return;
        }
        for count in [1usize, 4, 8, 11, 16, 19] {
            let storage: Vec<[u8; CHUNK_LEN]> = (0..count)
                .map(|seed| std::array::from_fn(|i| (i as u8).wrapping_add(seed as u8 * 3)))
                .collect();
            let chunks: Vec<&[u8; CHUNK_LEN]> = storage.iter().collect();

            let mut expected = vec![0u8; count * OUT_LEN];
            portable::hash_many(&chunks, &IV, (1 << 32) - 3, 0, &mut expected);
            let mut actual = vec![0u8; count * OUT_LEN];
            unsafe { hash_many(&chunks, &IV, (1 << 32) - 3, 0, &mut actual) };
            assert_eq!(actual, expected, "mismatch for {count} chunks");
        }
    }
}
