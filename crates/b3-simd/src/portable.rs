//! Scalar BLAKE3 compression.
//!
//! This is the backend every other backend is checked against, and the one
//! used on targets without an accelerated implementation.

use crate::{BLOCK_LEN, CHUNK_END, CHUNK_LEN, CHUNK_START, IV, MSG_SCHEDULE, OUT_LEN};

#[inline(always)]
const fn counter_low(counter: u64) -> u32 {
    counter as u32
}

#[inline(always)]
const fn counter_high(counter: u64) -> u32 {
    (counter >> 32) as u32
}

#[inline(always)]
pub(crate) fn words_from_le_bytes_64(block: &[u8; BLOCK_LEN]) -> [u32; 16] {
    let mut words = [0u32; 16];
    for (word, bytes) in words.iter_mut().zip(block.as_chunks::<4>().0) {
        *word = u32::from_le_bytes(*bytes);
    }
    words
}

#[inline(always)]
pub(crate) fn words_from_le_bytes_32(bytes: &[u8; OUT_LEN]) -> [u32; 8] {
    let mut words = [0u32; 8];
    for (word, chunk) in words.iter_mut().zip(bytes.as_chunks::<4>().0) {
        *word = u32::from_le_bytes(*chunk);
    }
    words
}

#[inline(always)]
pub(crate) fn le_bytes_from_words_32(words: &[u32; 8]) -> [u8; OUT_LEN] {
    let mut out = [0u8; OUT_LEN];
    for (chunk, word) in out.as_chunks_mut::<4>().0.iter_mut().zip(words) {
        *chunk = word.to_le_bytes();
    }
    out
}

#[inline(always)]
fn g(state: &mut [u32; 16], a: usize, b: usize, c: usize, d: usize, mx: u32, my: u32) {
    state[a] = state[a].wrapping_add(state[b]).wrapping_add(mx);
    state[d] = (state[d] ^ state[a]).rotate_right(16);
    state[c] = state[c].wrapping_add(state[d]);
    state[b] = (state[b] ^ state[c]).rotate_right(12);
    state[a] = state[a].wrapping_add(state[b]).wrapping_add(my);
    state[d] = (state[d] ^ state[a]).rotate_right(8);
    state[c] = state[c].wrapping_add(state[d]);
    state[b] = (state[b] ^ state[c]).rotate_right(7);
}

#[inline(always)]
fn round(state: &mut [u32; 16], m: &[u32; 16], r: usize) {
    let s = &MSG_SCHEDULE[r];
    // Columns.
    g(state, 0, 4, 8, 12, m[s[0]], m[s[1]]);
    g(state, 1, 5, 9, 13, m[s[2]], m[s[3]]);
    g(state, 2, 6, 10, 14, m[s[4]], m[s[5]]);
    g(state, 3, 7, 11, 15, m[s[6]], m[s[7]]);
    // Diagonals.
    g(state, 0, 5, 10, 15, m[s[8]], m[s[9]]);
    g(state, 1, 6, 11, 12, m[s[10]], m[s[11]]);
    g(state, 2, 7, 8, 13, m[s[12]], m[s[13]]);
    g(state, 3, 4, 9, 14, m[s[14]], m[s[15]]);
}

/// Run the seven rounds and the output feed-forward, returning all 16 words.
#[inline(always)]
fn compress(
    cv: &[u32; 8],
    block: &[u8; BLOCK_LEN],
    block_len: u8,
    counter: u64,
    flags: u8,
) -> [u32; 16] {
    let m = words_from_le_bytes_64(block);
    let mut state = [
        cv[0],
        cv[1],
        cv[2],
        cv[3],
        cv[4],
        cv[5],
        cv[6],
        cv[7],
        IV[0],
        IV[1],
        IV[2],
        IV[3],
        counter_low(counter),
        counter_high(counter),
        u32::from(block_len),
        u32::from(flags),
    ];

    for r in 0..7 {
        round(&mut state, &m, r);
    }

    for i in 0..8 {
        state[i] ^= state[i + 8];
        state[i + 8] ^= cv[i];
    }
    state
}

pub(crate) fn compress_in_place(
    cv: &mut [u32; 8],
    block: &[u8; BLOCK_LEN],
    block_len: u8,
    counter: u64,
    flags: u8,
) {
    let state = compress(cv, block, block_len, counter, flags);
    cv.copy_from_slice(&state[..8]);
}

pub(crate) fn compress_xof(
    cv: &[u32; 8],
    block: &[u8; BLOCK_LEN],
    block_len: u8,
    counter: u64,
    flags: u8,
) -> [u8; 2 * OUT_LEN] {
    let state = compress(cv, block, block_len, counter, flags);
    let mut out = [0u8; 2 * OUT_LEN];
    for (chunk, word) in out.as_chunks_mut::<4>().0.iter_mut().zip(state.iter()) {
        *chunk = word.to_le_bytes();
    }
    out
}

/// Hash whole chunks one after another. Chunk `i` uses counter `counter + i`
/// and its chaining value lands in `out[i * OUT_LEN..][..OUT_LEN]`.
pub(crate) fn hash_many(
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
        let cv = hash_one_chunk(chunk, key, counter + i as u64, flags, compress_in_place);
        *dest = le_bytes_from_words_32(&cv);
    }
}

/// Fold one whole chunk block by block through `compress`.
#[inline(always)]
pub(crate) fn hash_one_chunk(
    chunk: &[u8; CHUNK_LEN],
    key: &[u32; 8],
    counter: u64,
    flags: u8,
    compress: impl Fn(&mut [u32; 8], &[u8; BLOCK_LEN], u8, u64, u8),
) -> [u32; 8] {
    let (blocks, _) = chunk.as_chunks::<BLOCK_LEN>();
    let last = blocks.len() - 1;
    let mut cv = *key;
    for (index, block) in blocks.iter().enumerate() {
        let mut block_flags = flags;
        if index == 0 {
            block_flags |= CHUNK_START;
        }
        if index == last {
            block_flags |= CHUNK_END;
        }
        compress(&mut cv, block, BLOCK_LEN as u8, counter, block_flags);
    }
    cv
}
