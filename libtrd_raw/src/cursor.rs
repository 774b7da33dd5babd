use byteorder::{ByteOrder, LittleEndian};

use super::constants::WORD_SIZE_BYTES;
use super::error::CursorError;

/// A bounds checked read position over a borrowed byte slice.
///
/// All multi-byte reads are little endian. Every read either succeeds completely or
/// returns a CursorError without moving the position.
#[derive(Debug, Clone)]
pub struct WordCursor<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> WordCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn remaining_words(&self) -> usize {
        self.remaining() / WORD_SIZE_BYTES
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn check(&self, requested: usize) -> Result<(), CursorError> {
        if requested > self.remaining() {
            Err(CursorError::OutOfData {
                requested,
                offset: self.position,
                remaining: self.remaining(),
            })
        } else {
            Ok(())
        }
    }

    pub fn read_u32(&mut self) -> Result<u32, CursorError> {
        let word = self.peek_u32(0)?;
        self.position += WORD_SIZE_BYTES;
        Ok(word)
    }

    /// Look at the word `words_ahead` words past the current position without consuming anything
    pub fn peek_u32(&self, words_ahead: usize) -> Result<u32, CursorError> {
        let offset = words_ahead * WORD_SIZE_BYTES;
        self.check(offset + WORD_SIZE_BYTES)?;
        let start = self.position + offset;
        Ok(LittleEndian::read_u32(
            &self.data[start..start + WORD_SIZE_BYTES],
        ))
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], CursorError> {
        self.check(count)?;
        let bytes = &self.data[self.position..self.position + count];
        self.position += count;
        Ok(bytes)
    }

    pub fn skip(&mut self, count: usize) -> Result<(), CursorError> {
        self.check(count)?;
        self.position += count;
        Ok(())
    }

    /// Consume everything that is left, returning it
    pub fn rest(&mut self) -> &'a [u8] {
        let bytes = &self.data[self.position..];
        self.position = self.data.len();
        bytes
    }
}

/// An owned, capacity limited buffer used to assemble a payload that arrives in pieces.
#[derive(Debug, Clone, Default)]
pub struct PayloadBuffer {
    bytes: Vec<u8>,
    capacity: usize,
}

impl PayloadBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: Vec::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    pub fn extend(&mut self, data: &[u8]) -> Result<(), CursorError> {
        let requested = self.bytes.len() + data.len();
        if requested > self.capacity {
            return Err(CursorError::Overflow {
                capacity: self.capacity,
                requested,
            });
        }
        self.bytes.extend_from_slice(data);
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}
