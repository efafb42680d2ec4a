//! Byte source and sink for the transferred file.
//!
//! The sender reads the file as a sequence of [`PAYLOAD_CAPACITY`]-byte chunks
//! addressed by index; the last chunk may be shorter.  Chunk `k` always
//! travels with sequence number `k mod MAX_SEQ`, so rewinding the source to a
//! chunk index is how the sender goes back N.
//!
//! The receiver appends delivered payloads to a [`ChunkSink`] in order.

use std::io::{self, Read, Seek, SeekFrom, Write};

use thiserror::Error;

use crate::frame::PAYLOAD_CAPACITY;

/// Errors raised by a [`ChunkSource`].
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source I/O error: {0}")]
    Io(#[from] io::Error),
    /// A read returned no bytes although the source claims more chunks.
    #[error("source truncated: no bytes for chunk {index} of {count}")]
    Truncated { index: u64, count: u64 },
    #[error("cannot seek to chunk {index}: source has {count} chunks")]
    SeekOutOfRange { index: u64, count: u64 },
}

/// One step of reading a [`ChunkSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// The next chunk; `last` is set on the final one.
    Data { bytes: Vec<u8>, last: bool },
    /// Every chunk has been handed out.
    Exhausted,
}

/// Supplies the file as indexed, fixed-size chunks.
pub trait ChunkSource {
    /// Read the chunk at the cursor and advance the cursor by one.
    fn next_chunk(&mut self) -> Result<Chunk, SourceError>;

    /// Move the cursor so the next [`ChunkSource::next_chunk`] returns chunk `index`.
    ///
    /// Seeking to exactly the chunk count is allowed and leaves the source exhausted.
    fn seek_to_chunk(&mut self, index: u64) -> Result<(), SourceError>;
}

/// Receives delivered payloads in order.
pub trait ChunkSink {
    fn append(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Flush anything buffered.  Called once when the transfer ends.
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ReaderSource
// ---------------------------------------------------------------------------

/// A [`ChunkSource`] over any seekable reader (a file, an in-memory cursor).
///
/// The chunk count is fixed from the reader's length at construction.
#[derive(Debug)]
pub struct ReaderSource<R> {
    inner: R,
    count: u64,
    cursor: u64,
}

impl<R: Read + Seek> ReaderSource<R> {
    pub fn new(mut inner: R) -> Result<Self, SourceError> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        let count = len.div_ceil(PAYLOAD_CAPACITY as u64);
        Ok(Self {
            inner,
            count,
            cursor: 0,
        })
    }

    /// Number of chunks the source will produce.
    pub fn chunk_count(&self) -> u64 {
        self.count
    }

    /// Index of the chunk the next read returns.
    pub fn position(&self) -> u64 {
        self.cursor
    }
}

impl ReaderSource<io::Cursor<Vec<u8>>> {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        let len = bytes.len() as u64;
        Self {
            inner: io::Cursor::new(bytes),
            count: len.div_ceil(PAYLOAD_CAPACITY as u64),
            cursor: 0,
        }
    }
}

impl<R: Read + Seek> ChunkSource for ReaderSource<R> {
    fn next_chunk(&mut self) -> Result<Chunk, SourceError> {
        if self.cursor >= self.count {
            return Ok(Chunk::Exhausted);
        }

        let mut buf = [0u8; PAYLOAD_CAPACITY];
        let mut filled = 0;
        while filled < PAYLOAD_CAPACITY {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if filled == 0 {
            return Err(SourceError::Truncated {
                index: self.cursor,
                count: self.count,
            });
        }

        self.cursor += 1;
        Ok(Chunk::Data {
            bytes: buf[..filled].to_vec(),
            last: self.cursor == self.count,
        })
    }

    fn seek_to_chunk(&mut self, index: u64) -> Result<(), SourceError> {
        if index > self.count {
            return Err(SourceError::SeekOutOfRange {
                index,
                count: self.count,
            });
        }
        self.inner
            .seek(SeekFrom::Start(index * PAYLOAD_CAPACITY as u64))?;
        self.cursor = index;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

impl ChunkSink for Vec<u8> {
    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

/// A [`ChunkSink`] over any writer; flushed by [`ChunkSink::finish`].
#[derive(Debug)]
pub struct WriterSink<W> {
    inner: W,
    written: u64,
}

impl<W: Write> WriterSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> ChunkSink for WriterSink<W> {
    fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(src: &mut impl ChunkSource) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            match src.next_chunk().unwrap() {
                Chunk::Data { bytes, last } => {
                    out.push(bytes);
                    if last {
                        assert_eq!(src.next_chunk().unwrap(), Chunk::Exhausted);
                        return out;
                    }
                }
                Chunk::Exhausted => return out,
            }
        }
    }

    #[test]
    fn splits_into_fixed_chunks_with_short_tail() {
        let data: Vec<u8> = (0..70u8).collect();
        let mut src = ReaderSource::from_bytes(data.clone());
        assert_eq!(src.chunk_count(), 3);

        let chunks = drain(&mut src);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], &data[0..30]);
        assert_eq!(chunks[1], &data[30..60]);
        assert_eq!(chunks[2], &data[60..70]);
    }

    #[test]
    fn exact_multiple_marks_last_full_chunk() {
        let mut src = ReaderSource::from_bytes(vec![7u8; 60]);
        assert!(matches!(src.next_chunk().unwrap(), Chunk::Data { last: false, .. }));
        match src.next_chunk().unwrap() {
            Chunk::Data { bytes, last } => {
                assert_eq!(bytes.len(), 30);
                assert!(last);
            }
            other => panic!("expected data, got {other:?}"),
        }
        assert_eq!(src.next_chunk().unwrap(), Chunk::Exhausted);
    }

    #[test]
    fn empty_source_is_exhausted_immediately() {
        let mut src = ReaderSource::from_bytes(Vec::new());
        assert_eq!(src.chunk_count(), 0);
        assert_eq!(src.next_chunk().unwrap(), Chunk::Exhausted);
    }

    #[test]
    fn seek_rewinds_to_chunk_boundary() {
        let data: Vec<u8> = (0..100u8).collect();
        let mut src = ReaderSource::from_bytes(data.clone());
        for _ in 0..3 {
            src.next_chunk().unwrap();
        }
        src.seek_to_chunk(1).unwrap();
        assert_eq!(src.position(), 1);
        match src.next_chunk().unwrap() {
            Chunk::Data { bytes, .. } => assert_eq!(bytes, &data[30..60]),
            other => panic!("expected data, got {other:?}"),
        }
    }

    #[test]
    fn seek_to_count_leaves_source_exhausted() {
        let mut src = ReaderSource::from_bytes(vec![1u8; 45]);
        src.seek_to_chunk(2).unwrap();
        assert_eq!(src.next_chunk().unwrap(), Chunk::Exhausted);
        assert!(matches!(
            src.seek_to_chunk(3),
            Err(SourceError::SeekOutOfRange { index: 3, count: 2 })
        ));
    }

    /// Reports a length but yields nothing, like a file truncated under us.
    struct Shrunk;

    impl Read for Shrunk {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Ok(0)
        }
    }

    impl Seek for Shrunk {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            Ok(match pos {
                SeekFrom::End(_) => 90,
                _ => 0,
            })
        }
    }

    #[test]
    fn zero_length_read_while_chunks_remain_is_an_error() {
        let mut src = ReaderSource::new(Shrunk).unwrap();
        assert_eq!(src.chunk_count(), 3);
        assert!(matches!(
            src.next_chunk(),
            Err(SourceError::Truncated { index: 0, count: 3 })
        ));
    }

    #[test]
    fn writer_sink_counts_and_flushes() {
        let mut sink = WriterSink::new(Vec::new());
        sink.append(b"abc").unwrap();
        sink.append(b"de").unwrap();
        sink.finish().unwrap();
        assert_eq!(sink.bytes_written(), 5);
        assert_eq!(sink.into_inner(), b"abcde");
    }
}
