//! Root output and the extendable-output reader.

use std::io;

use crate::{BLOCK_LEN, Backend, OUT_LEN, ROOT, portable};

/// The last compression of a tree node, held back until the caller decides
/// whether it is the root.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Output {
    pub(crate) input_cv: [u32; 8],
    pub(crate) block: [u8; BLOCK_LEN],
    pub(crate) block_len: u8,
    pub(crate) counter: u64,
    pub(crate) flags: u8,
    pub(crate) backend: Backend,
}

impl Output {
    /// Chaining value of a non-root node.
    pub(crate) fn chaining_value(&self) -> [u32; 8] {
        let mut cv = self.input_cv;
        self.backend
            .compress_in_place(&mut cv, &self.block, self.block_len, self.counter, self.flags);
        cv
    }

    /// 64 bytes of root output. The counter position carries the output block
    /// index instead of the chunk counter.
    pub(crate) fn root_output_block(&self, output_block: u64) -> [u8; 2 * OUT_LEN] {
        self.backend.compress_xof(
            &self.input_cv,
            &self.block,
            self.block_len,
            output_block,
            self.flags | ROOT,
        )
    }

    pub(crate) fn root_hash(&self) -> [u8; OUT_LEN] {
        let mut cv = self.input_cv;
        self.backend.compress_in_place(
            &mut cv,
            &self.block,
            self.block_len,
            0,
            self.flags | ROOT,
        );
        portable::le_bytes_from_words_32(&cv)
    }
}

/// Reader over the unbounded extended output of a finalized hash.
///
/// The first 32 bytes equal the regular digest. The reader can be
/// repositioned anywhere in the 2^64-byte output stream.
#[derive(Clone, Debug)]
pub struct OutputReader {
    inner: Output,
    position_within_block: u8,
}

impl OutputReader {
    pub(crate) fn new(inner: Output) -> Self {
        Self {
            inner,
            position_within_block: 0,
        }
    }

    /// Fill `buf` with the next bytes of output and advance past them.
    pub fn fill(&mut self, mut buf: &mut [u8]) {
        while !buf.is_empty() {
            let block = self.inner.root_output_block(self.inner.counter);
            let available = &block[usize::from(self.position_within_block)..];
            let take = available.len().min(buf.len());
            buf[..take].copy_from_slice(&available[..take]);
            buf = &mut buf[take..];
            self.position_within_block += take as u8;
            if usize::from(self.position_within_block) == BLOCK_LEN {
                self.inner.counter += 1;
                self.position_within_block = 0;
            }
        }
    }

    /// Current offset into the output stream, in bytes.
    pub fn position(&self) -> u64 {
        self.inner.counter * BLOCK_LEN as u64 + u64::from(self.position_within_block)
    }

    /// Move to `position` bytes from the start of the output stream.
    pub fn set_position(&mut self, position: u64) {
        self.inner.counter = position / BLOCK_LEN as u64;
        self.position_within_block = (position % BLOCK_LEN as u64) as u8;
    }
}

impl io::Read for OutputReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.fill(buf);
        Ok(buf.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HashState;

    #[test]
    fn reader_prefix_matches_digest() {
        let mut state = HashState::new();
        state.update(b"hoge");
        let mut reader = state.finalize_xof();
        let mut out = [0u8; OUT_LEN];
        reader.fill(&mut out);
        assert_eq!(out, state.finalize());
        assert_eq!(reader.position(), OUT_LEN as u64);
    }

    #[test]
    fn split_reads_match_one_read() {
        let state = HashState::new();
        let mut whole = [0u8; 200];
        state.finalize_xof().fill(&mut whole);

        let mut reader = state.finalize_xof();
        let mut pieces = [0u8; 200];
        for piece in pieces.chunks_mut(23) {
            reader.fill(piece);
        }
        assert_eq!(pieces, whole);
    }

    #[test]
    fn set_position_seeks_within_stream() {
        let state = HashState::new();
        let mut whole = [0u8; 300];
        state.finalize_xof().fill(&mut whole);

        let mut reader = state.finalize_xof();
        reader.set_position(130);
        assert_eq!(reader.position(), 130);
        let mut tail = [0u8; 170];
        reader.fill(&mut tail);
        assert_eq!(tail[..], whole[130..]);
    }
}
