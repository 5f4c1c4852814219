//! Incremental hash state.
//!
//! Input is split into 1 KiB chunks. Each chunk is folded block by block into
//! a chaining value, and chunk chaining values are merged pairwise into a
//! binary tree whose unmerged left subtrees live on a small stack. A chunk is
//! only pushed once more input has arrived after it, so the last chunk (and
//! the last block inside it) stays available for the root flag at
//! finalization.

use std::fmt;
use std::io;

use crate::dispatcher::{self, Backend};
use crate::error::EngineError;
use crate::output::{Output, OutputReader};
use crate::portable::{le_bytes_from_words_32, words_from_le_bytes_32};
use crate::{
    BLOCK_LEN, CHUNK_END, CHUNK_LEN, CHUNK_START, DERIVE_KEY_CONTEXT, DERIVE_KEY_MATERIAL, IV,
    KEY_LEN, KEYED_HASH, OUT_LEN, PARENT,
};

/// Subtree depth reachable with 2^64 bytes of input.
const MAX_DEPTH: usize = 54;

/// Whole chunks handed to [`Backend::hash_many`] per call. A multiple of
/// every backend's [`Backend::degree`].
const BATCH_CHUNKS: usize = 16;

static ZERO_CHUNK: [u8; CHUNK_LEN] = [0; CHUNK_LEN];

#[derive(Clone, Copy, Debug)]
struct ChunkState {
    cv: [u32; 8],
    chunk_counter: u64,
    buf: [u8; BLOCK_LEN],
    buf_len: u8,
    blocks_compressed: u8,
    flags: u8,
    backend: Backend,
}

impl ChunkState {
    fn new(key: &[u32; 8], chunk_counter: u64, flags: u8, backend: Backend) -> Self {
        Self {
            cv: *key,
            chunk_counter,
            buf: [0; BLOCK_LEN],
            buf_len: 0,
            blocks_compressed: 0,
            flags,
            backend,
        }
    }

    fn len(&self) -> usize {
        BLOCK_LEN * usize::from(self.blocks_compressed) + usize::from(self.buf_len)
    }

    fn start_flag(&self) -> u8 {
        if self.blocks_compressed == 0 {
            CHUNK_START
        } else {
            0
        }
    }

    fn fill_buf(&mut self, input: &mut &[u8]) {
        let start = usize::from(self.buf_len);
        let take = (BLOCK_LEN - start).min(input.len());
        self.buf[start..start + take].copy_from_slice(&input[..take]);
        self.buf_len += take as u8;
        *input = &input[take..];
    }

    fn compress_block(&mut self, block: &[u8; BLOCK_LEN]) {
        let flags = self.flags | self.start_flag();
        self.backend.compress_in_place(
            &mut self.cv,
            block,
            BLOCK_LEN as u8,
            self.chunk_counter,
            flags,
        );
        self.blocks_compressed += 1;
    }

    /// Absorb `input`, which must fit in the remainder of this chunk.
    fn update(&mut self, mut input: &[u8]) {
        debug_assert!(self.len() + input.len() <= CHUNK_LEN);

        // A full buffer is only compressed once we know it is not the last
        // block of the chunk.
        if self.buf_len > 0 {
            self.fill_buf(&mut input);
            if !input.is_empty() {
                let block = self.buf;
                self.compress_block(&block);
                self.buf = [0; BLOCK_LEN];
                self.buf_len = 0;
            }
        }

        if input.len() > BLOCK_LEN {
            let whole = (input.len() - 1) / BLOCK_LEN;
            let (blocks, _) = input[..whole * BLOCK_LEN].as_chunks::<BLOCK_LEN>();
            for block in blocks {
                self.compress_block(block);
            }
            input = &input[whole * BLOCK_LEN..];
        }

        self.fill_buf(&mut input);
        debug_assert!(input.is_empty());
    }

    fn output(&self) -> Output {
        Output {
            input_cv: self.cv,
            block: self.buf,
            block_len: self.buf_len,
            counter: self.chunk_counter,
            flags: self.flags | self.start_flag() | CHUNK_END,
            backend: self.backend,
        }
    }
}

fn parent_output(
    left: &[u32; 8],
    right: &[u32; 8],
    key: &[u32; 8],
    flags: u8,
    backend: Backend,
) -> Output {
    let mut block = [0u8; BLOCK_LEN];
    block[..OUT_LEN].copy_from_slice(&le_bytes_from_words_32(left));
    block[OUT_LEN..].copy_from_slice(&le_bytes_from_words_32(right));
    Output {
        input_cv: *key,
        block,
        block_len: BLOCK_LEN as u8,
        counter: 0,
        flags: flags | PARENT,
        backend,
    }
}

/// Incremental BLAKE3 state.
///
/// Feed bytes with [`update`](Self::update) in any number of pieces and read
/// the digest with [`finalize`](Self::finalize) as often as needed; finalizing
/// never disturbs the state.
pub struct HashState {
    key: [u32; 8],
    flags: u8,
    chunk_state: ChunkState,
    cv_stack: [[u32; 8]; MAX_DEPTH],
    cv_stack_len: u8,
    total_len: u64,
    backend: Backend,
}

impl HashState {
    fn with_key_flags(key: [u32; 8], flags: u8, backend: Backend) -> Self {
        Self {
            key,
            flags,
            chunk_state: ChunkState::new(&key, 0, flags, backend),
            cv_stack: [[0; 8]; MAX_DEPTH],
            cv_stack_len: 0,
            total_len: 0,
            backend,
        }
    }

    /// Create a state for plain hashing using the process-wide backend.
    pub fn new() -> Self {
        Self::with_key_flags(IV, 0, dispatcher::global().backend())
    }

    /// Create a state for keyed hashing (a MAC) under a 32-byte key.
    pub fn new_keyed(key: &[u8; KEY_LEN]) -> Self {
        Self::with_key_flags(
            words_from_le_bytes_32(key),
            KEYED_HASH,
            dispatcher::global().backend(),
        )
    }

    /// Create a state for key derivation under `context`.
    ///
    /// The context string should be hardcoded, globally unique and
    /// application specific.
    pub fn new_derive_key(context: &str) -> Self {
        let backend = dispatcher::global().backend();
        let mut context_state = Self::with_key_flags(IV, DERIVE_KEY_CONTEXT, backend);
        context_state.update(context.as_bytes());
        let context_key = context_state.finalize();
        Self::with_key_flags(
            words_from_le_bytes_32(&context_key),
            DERIVE_KEY_MATERIAL,
            backend,
        )
    }

    /// Create a plain hashing state pinned to `backend`.
    ///
    /// Fails when the running CPU lacks the features `backend` needs.
    pub fn with_backend(backend: Backend) -> Result<Self, EngineError> {
        if !backend.is_supported() {
            return Err(EngineError::UnsupportedBackend { backend });
        }
        Ok(Self::with_key_flags(IV, 0, backend))
    }

    /// Backend used for every compression of this state.
    pub const fn backend(&self) -> Backend {
        self.backend
    }

    /// Total number of input bytes absorbed since creation or the last reset.
    pub const fn len(&self) -> u64 {
        self.total_len
    }

    /// Whether no input has been absorbed yet.
    pub const fn is_empty(&self) -> bool {
        self.total_len == 0
    }

    fn push_cv(&mut self, cv: [u32; 8]) {
        let len = usize::from(self.cv_stack_len);
        debug_assert!(len < MAX_DEPTH, "chaining value stack overflow");
        self.cv_stack[len] = cv;
        self.cv_stack_len += 1;
    }

    fn pop_cv(&mut self) -> [u32; 8] {
        self.cv_stack_len -= 1;
        self.cv_stack[usize::from(self.cv_stack_len)]
    }

    // `total_chunks` counts chunks including the one being added. Each
    // trailing zero bit marks a completed subtree to merge with its left
    // sibling.
    fn add_chunk_cv(&mut self, mut new_cv: [u32; 8], mut total_chunks: u64) {
        while total_chunks & 1 == 0 {
            let left = self.pop_cv();
            new_cv = parent_output(&left, &new_cv, &self.key, self.flags, self.backend)
                .chaining_value();
            total_chunks >>= 1;
        }
        self.push_cv(new_cv);
    }

    /// Absorb `input`. Zero-length input is a no-op.
    pub fn update(&mut self, mut input: &[u8]) -> &mut Self {
        if input.is_empty() {
            return self;
        }
        self.total_len += input.len() as u64;

        if self.chunk_state.len() > 0 {
            let take = (CHUNK_LEN - self.chunk_state.len()).min(input.len());
            self.chunk_state.update(&input[..take]);
            input = &input[take..];
            if input.is_empty() {
                return self;
            }
            let cv = self.chunk_state.output().chaining_value();
            let total_chunks = self.chunk_state.chunk_counter + 1;
            self.add_chunk_cv(cv, total_chunks);
            self.chunk_state = ChunkState::new(&self.key, total_chunks, self.flags, self.backend);
        }

        // Whole chunks are batched while at least one byte follows them.
        while input.len() > CHUNK_LEN {
            let count = ((input.len() - 1) / CHUNK_LEN).min(BATCH_CHUNKS);
            let (chunks, _) = input[..count * CHUNK_LEN].as_chunks::<CHUNK_LEN>();
            let mut refs = [&ZERO_CHUNK; BATCH_CHUNKS];
            for (slot, chunk) in refs.iter_mut().zip(chunks) {
                *slot = chunk;
            }

            let counter = self.chunk_state.chunk_counter;
            let mut cvs = [0u8; BATCH_CHUNKS * OUT_LEN];
            self.backend.hash_many(
                &refs[..count],
                &self.key,
                counter,
                self.flags,
                &mut cvs[..count * OUT_LEN],
            );
            for (i, cv) in cvs[..count * OUT_LEN]
                .as_chunks::<OUT_LEN>()
                .0
                .iter()
                .enumerate()
            {
                self.add_chunk_cv(words_from_le_bytes_32(cv), counter + i as u64 + 1);
            }

            let next = counter + count as u64;
            self.chunk_state = ChunkState::new(&self.key, next, self.flags, self.backend);
            input = &input[count * CHUNK_LEN..];
        }

        self.chunk_state.update(input);
        self
    }

    fn final_output(&self) -> Output {
        let mut output = self.chunk_state.output();
        for left in self.cv_stack[..usize::from(self.cv_stack_len)].iter().rev() {
            output = parent_output(
                left,
                &output.chaining_value(),
                &self.key,
                self.flags,
                self.backend,
            );
        }
        output
    }

    /// Return the 32-byte digest of everything absorbed so far.
    pub fn finalize(&self) -> [u8; OUT_LEN] {
        self.final_output().root_hash()
    }

    /// Return a reader over the extended output of everything absorbed so far.
    pub fn finalize_xof(&self) -> OutputReader {
        OutputReader::new(self.final_output())
    }

    /// Fill `out` with extended output. An empty `out` is rejected.
    pub fn fill_output(&self, out: &mut [u8]) -> Result<(), EngineError> {
        if out.is_empty() {
            return Err(EngineError::InvalidOutputLength);
        }
        self.finalize_xof().fill(out);
        Ok(())
    }

    /// Return `len` bytes of extended output.
    pub fn finalize_len(&self, len: usize) -> Result<Vec<u8>, EngineError> {
        let mut out = vec![0u8; len];
        self.fill_output(&mut out)?;
        Ok(out)
    }

    /// Return to the freshly created state, keeping the key, mode and backend.
    pub fn reset(&mut self) -> &mut Self {
        self.chunk_state = ChunkState::new(&self.key, 0, self.flags, self.backend);
        self.cv_stack = [[0; 8]; MAX_DEPTH];
        self.cv_stack_len = 0;
        self.total_len = 0;
        self
    }
}

impl Default for HashState {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for HashState {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            flags: self.flags,
            chunk_state: self.chunk_state,
            cv_stack: self.cv_stack,
            cv_stack_len: self.cv_stack_len,
            total_len: self.total_len,
            backend: self.backend,
        }
    }
}

impl fmt::Debug for HashState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashState")
            .field("backend", &self.backend)
            .field("flags", &self.flags)
            .field("len", &self.total_len)
            .field("stack_depth", &self.cv_stack_len)
            .finish_non_exhaustive()
    }
}

impl io::Write for HashState {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn batch_fills_whole_lane_groups() {
        for &backend in Backend::ALL {
            assert_eq!(BATCH_CHUNKS % backend.degree(), 0, "backend {backend}");
        }
    }

    #[test]
    fn empty_input_matches_known_digest() {
        let state = HashState::new();
        let expected = [
            0xaf, 0x13, 0x49, 0xb9, 0xf5, 0xf9, 0xa1, 0xa6, 0xa0, 0x40, 0x4d, 0xea, 0x36, 0xdc,
            0xc9, 0x49, 0x9b, 0xcb, 0x25, 0xc9, 0xad, 0xc1, 0x12, 0xb7, 0xcc, 0x9a, 0x93, 0xca,
            0xe4, 0x1f, 0x32, 0x62,
        ];
        assert_eq!(state.finalize(), expected);
        assert!(state.is_empty());
    }

    #[test]
    fn boundary_lengths_match_reference() {
        for len in [
            1,
            63,
            64,
            65,
            1023,
            1024,
            1025,
            2048,
            2049,
            3072,
            8 * 1024 + 1,
            17 * 1024,
            31 * 1024 + 7,
        ] {
            let input = pattern(len);
            for backend in Backend::available() {
                let mut state = HashState::with_backend(backend).expect("supported backend");
                state.update(&input);
                assert_eq!(
                    state.finalize(),
                    *blake3::hash(&input).as_bytes(),
                    "len {len} on {backend}"
                );
            }
        }
    }

    #[test]
    fn byte_at_a_time_matches_one_shot() {
        let input = pattern(3 * CHUNK_LEN + 5);
        let mut state = HashState::new();
        for byte in &input {
            state.update(std::slice::from_ref(byte));
        }
        assert_eq!(state.finalize(), crate::hash(&input));
        assert_eq!(state.len(), input.len() as u64);
    }

    #[test]
    fn finalize_does_not_disturb_state() {
        let mut state = HashState::new();
        state.update(b"ho");
        let first = state.finalize();
        assert_eq!(state.finalize(), first);
        state.update(b"ge");
        assert_eq!(state.finalize(), *blake3::hash(b"hoge").as_bytes());
    }

    #[test]
    fn clone_is_independent() {
        let mut original = HashState::new();
        original.update(&pattern(1500));
        let mut fork = original.clone();
        fork.update(b"tail");
        assert_eq!(original.finalize(), crate::hash(&pattern(1500)));
        assert_ne!(original.finalize(), fork.finalize());
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut state = HashState::new_keyed(&[7; KEY_LEN]);
        let fresh = state.finalize();
        state.update(&pattern(5000)).reset();
        assert_eq!(state.finalize(), fresh);
        assert_eq!(state.len(), 0);
    }

    #[test]
    fn keyed_and_derive_modes_match_reference() {
        let key = [0x42; KEY_LEN];
        let input = pattern(2500);
        let mut keyed = HashState::new_keyed(&key);
        keyed.update(&input);
        assert_eq!(keyed.finalize(), *blake3::keyed_hash(&key, &input).as_bytes());

        let context = "b3-simd 2024-01-01 test context";
        let mut derived = HashState::new_derive_key(context);
        derived.update(&input);
        assert_eq!(derived.finalize(), blake3::derive_key(context, &input));
    }

    #[test]
    fn zero_length_output_is_rejected() {
        let state = HashState::new();
        assert_eq!(state.finalize_len(0), Err(EngineError::InvalidOutputLength));
        assert_eq!(
            state.fill_output(&mut []),
            Err(EngineError::InvalidOutputLength)
        );
    }

    #[test]
    fn unsupported_backend_is_refused() {
        for &backend in Backend::ALL {
            let result = HashState::with_backend(backend);
            if backend.is_supported() {
                assert_eq!(result.map(|state| state.backend()).ok(), Some(backend));
            } else {
                assert!(matches!(
                    result,
                    Err(EngineError::UnsupportedBackend { backend: b }) if b == backend
                ));
            }
        }
    }

    #[test]
    fn write_impl_feeds_state() {
        use std::io::Write;

        let mut state = HashState::new();
        state.write_all(b"hoge").expect("write to hash state");
        state.flush().expect("flush");
        assert_eq!(state.finalize(), crate::hash(b"hoge"));
    }
}
