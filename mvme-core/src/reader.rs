//! Sequential word reader over a listfile byte stream.

use crate::decoder::DecodeError;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Read, Seek, SeekFrom};

/// Size of one listfile word in bytes.
pub const WORD_SIZE: u64 = 4;

/// Cursor over a listfile that reads exact-width little-endian words.
///
/// The stream length is taken once at construction. Every read or seek is
/// checked against it, so crossing the end of the stream is reported as
/// [`DecodeError::TruncatedStream`] before any byte is consumed.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    position: u64,
    len: u64,
}

impl<R: Read + Seek> FrameReader<R> {
    /// Wraps a stream, starting at its current position.
    pub fn new(mut inner: R) -> Result<Self, DecodeError> {
        let position = inner.stream_position()?;
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(position))?;
        Ok(Self {
            inner,
            position,
            len,
        })
    }

    /// Current byte offset from the start of the stream.
    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Total stream length in bytes.
    #[inline]
    pub fn stream_len(&self) -> u64 {
        self.len
    }

    /// Bytes left between the cursor and the end of the stream.
    #[inline]
    pub fn remaining(&self) -> u64 {
        self.len.saturating_sub(self.position)
    }

    #[inline]
    pub fn at_end(&self) -> bool {
        self.position >= self.len
    }

    /// Reads one little-endian 32-bit word.
    pub fn read_word(&mut self) -> Result<u32, DecodeError> {
        self.ensure_available(WORD_SIZE)?;
        let word = self
            .inner
            .read_u32::<LittleEndian>()
            .map_err(|e| self.truncated_or_io(e, WORD_SIZE))?;
        self.position += WORD_SIZE;
        Ok(word)
    }

    /// Fills `buf` completely from the stream.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), DecodeError> {
        let needed = buf.len() as u64;
        self.ensure_available(needed)?;
        self.inner
            .read_exact(buf)
            .map_err(|e| self.truncated_or_io(e, needed))?;
        self.position += needed;
        Ok(())
    }

    /// Moves the cursor by `bytes` relative to the current position.
    pub fn seek_relative(&mut self, bytes: i64) -> Result<(), DecodeError> {
        if bytes > 0 {
            self.ensure_available(bytes as u64)?;
        } else if bytes.unsigned_abs() > self.position {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "seek by {} bytes from offset {} lands before stream start",
                    bytes, self.position
                ),
            )
            .into());
        }
        self.inner.seek(SeekFrom::Current(bytes))?;
        self.position = self.position.wrapping_add_signed(bytes);
        Ok(())
    }

    /// Moves the cursor to an absolute byte offset.
    pub fn seek_to(&mut self, offset: u64) -> Result<(), DecodeError> {
        if offset > self.len {
            return Err(DecodeError::TruncatedStream {
                offset: self.position,
                needed: offset.saturating_sub(self.position),
                available: self.remaining(),
            });
        }
        self.inner.seek(SeekFrom::Start(offset))?;
        self.position = offset;
        Ok(())
    }

    /// Skips `words` 32-bit words without reading them.
    pub fn skip_words(&mut self, words: u32) -> Result<(), DecodeError> {
        self.seek_relative(words as i64 * WORD_SIZE as i64)
    }

    fn ensure_available(&self, needed: u64) -> Result<(), DecodeError> {
        let available = self.remaining();
        if available < needed {
            return Err(DecodeError::TruncatedStream {
                offset: self.position,
                needed,
                available,
            });
        }
        Ok(())
    }

    // The stream may shrink under us; an EOF past the length check is still truncation.
    fn truncated_or_io(&self, err: io::Error, needed: u64) -> DecodeError {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            DecodeError::TruncatedStream {
                offset: self.position,
                needed,
                available: 0,
            }
        } else {
            DecodeError::Io(err)
        }
    }
}
