//! Fixed-size byte page and its big-endian integer / length-prefixed string
//! codec. Bounds checks are hard errors: a caller that walks off the end
//! of a page has a decoding bug, not a retryable condition.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{DbError, DbResult};

const INT_SIZE: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    buf: Vec<u8>,
}

impl Page {
    /// A zero-filled scratch buffer of `len` bytes (used for log records,
    /// which are far smaller than a whole block).
    pub fn new(len: usize) -> Self {
        Page { buf: vec![0u8; len] }
    }

    /// Wrap already-filled bytes (e.g. a record read back out of the log).
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Page { buf: bytes }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn contents(&self) -> Vec<u8> {
        self.buf.clone()
    }

    fn check_bound(&self, offset: usize, needed: usize) -> DbResult<()> {
        if offset + needed > self.buf.len() {
            return Err(DbError::Decoding(format!(
                "offset {offset} + {needed} bytes exceeds page of length {}",
                self.buf.len()
            )));
        }
        Ok(())
    }

    pub fn get_int(&self, offset: usize) -> DbResult<i32> {
        self.check_bound(offset, INT_SIZE)?;
        Ok(BigEndian::read_i32(&self.buf[offset..offset + INT_SIZE]))
    }

    pub fn set_int(&mut self, offset: usize, value: i32) -> DbResult<()> {
        self.check_bound(offset, INT_SIZE)?;
        BigEndian::write_i32(&mut self.buf[offset..offset + INT_SIZE], value);
        Ok(())
    }

    pub fn get_bytes(&self, offset: usize) -> DbResult<Vec<u8>> {
        let length = self.get_int(offset)? as usize;
        let start = offset + INT_SIZE;
        self.check_bound(start, length)?;
        Ok(self.buf[start..start + length].to_vec())
    }

    pub fn set_bytes(&mut self, offset: usize, bytes: &[u8]) -> DbResult<()> {
        self.check_bound(offset, INT_SIZE + bytes.len())?;
        self.set_int(offset, bytes.len() as i32)?;
        let start = offset + INT_SIZE;
        self.buf[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    pub fn get_string(&self, offset: usize) -> DbResult<String> {
        let bytes = self.get_bytes(offset)?;
        String::from_utf8(bytes)
            .map_err(|e| DbError::Decoding(format!("non-ASCII string at offset {offset}: {e}")))
    }

    pub fn set_string(&mut self, offset: usize, s: &str) -> DbResult<()> {
        self.set_bytes(offset, s.as_bytes())
    }

    /// Number of bytes a `VARCHAR(n)` slot must reserve to hold up to `n`
    /// ASCII characters: a 4-byte length prefix plus `n` bytes.
    pub fn max_length(n: usize) -> usize {
        INT_SIZE + n
    }
}
