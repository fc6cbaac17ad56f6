//! Fixed-size chunking of byte streams.
//!
//! Readers may return fewer bytes than asked for, even far from the end of
//! the stream. [`ChunkReader`] keeps reading until a chunk is full, so every
//! chunk it yields is exactly `N` bytes long, except possibly the last one.

use arrayvec::ArrayVec;
use std::io;

/// Splits a reader into chunks of `N` bytes.
#[derive(Debug)]
pub struct ChunkReader<R, const N: usize> {
    reader: R,
    finished: bool,
    total: u64,
}

impl<R: io::Read, const N: usize> ChunkReader<R, N> {
    #[inline(always)]
    pub const fn new(reader: R) -> Self {
        Self {
            reader,
            finished: false,
            total: 0,
        }
    }

    /// Number of bytes yielded so far.
    #[inline(always)]
    pub const fn bytes_read(&self) -> u64 {
        self.total
    }

    /// Returns `true` once end-of-stream has been observed.
    #[inline(always)]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Reads the next chunk.
    ///
    /// Returns `Ok(None)` at end-of-stream. A chunk shorter than `N` is only ever
    /// returned right before end-of-stream.
    pub fn next_chunk(&mut self) -> io::Result<Option<ArrayVec<u8, N>>> {
        if self.finished {
            return Ok(None);
        }

        let mut buf = [0u8; N];
        let mut filled = 0;

        while filled < N {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => {
                    self.finished = true;
                    break;
                }
                Ok(n) => filled = filled.strict_add(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        if filled == 0 {
            return Ok(None);
        }

        self.total = self.total.strict_add(u64::try_from(filled).unwrap());

        let mut chunk = ArrayVec::new_const();
        // filled <= N
        chunk.try_extend_from_slice(&buf[..filled]).unwrap();

        Ok(Some(chunk))
    }

    #[inline(always)]
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: io::Read, const N: usize> Iterator for ChunkReader<R, N> {
    type Item = io::Result<ArrayVec<u8, N>>;

    #[inline(always)]
    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk().transpose()
    }
}
