//! Growable binary buffer with separate read/write cursors and a
//! configurable byte order.

use crate::byte_order::{ByteOrder, hton_u16, hton_u32, hton_u64, ntoh_u16, ntoh_u32, ntoh_u64};
use crate::error::{Error, Result};

/// Growable binary buffer with typed reads and writes.
///
/// Writes append at the write cursor; reads consume from the read cursor.
/// With [`ByteOrder::Network`], 16/32/64-bit typed values are converted
/// to/from big-endian on every put and get. Over-reads and cursor
/// violations fail with [`Error::AccessViolation`].
pub struct ByteStream {
    data: Vec<u8>,
    read_idx: usize,
    write_idx: usize,
    byte_order: ByteOrder,
}

impl Default for ByteStream {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Clone for ByteStream {
    fn clone(&self) -> Self {
        ByteStream {
            data: self.data.clone(),
            read_idx: self.read_idx,
            write_idx: self.write_idx,
            byte_order: self.byte_order,
        }
    }
}

impl ByteStream {
    /// Create a stream with an initial capacity of `size` bytes.
    pub fn new(size: usize) -> Self {
        ByteStream {
            data: vec![0; size],
            read_idx: 0,
            write_idx: 0,
            byte_order: ByteOrder::Host,
        }
    }

    /// Create a stream holding a copy of `data`, write cursor at the end.
    pub fn from_slice(data: &[u8]) -> Self {
        let mut stream = Self::new(data.len());
        stream.append(data);
        stream
    }

    /// Set the byte order applied by subsequent typed reads and writes.
    pub fn set_byte_order(&mut self, byte_order: ByteOrder) {
        self.byte_order = byte_order;
    }

    /// Current byte order.
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// True once the read cursor has caught up with the write cursor.
    pub fn eof(&self) -> bool {
        self.read_idx == self.write_idx
    }

    /// True when no unread bytes remain.
    pub fn is_empty(&self) -> bool {
        self.eof()
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.write_idx - self.read_idx
    }

    /// Allocated capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Read cursor position.
    pub fn read_idx(&self) -> usize {
        self.read_idx
    }

    /// Write cursor position.
    pub fn write_idx(&self) -> usize {
        self.write_idx
    }

    /// The written region of the buffer.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.write_idx]
    }

    /// Move the read cursor. Fails with `AccessViolation` past the write
    /// cursor.
    pub fn set_read_idx(&mut self, read_idx: usize) -> Result<()> {
        if read_idx > self.write_idx {
            return Err(Error::AccessViolation(format!(
                "read cursor {read_idx} beyond write cursor {}",
                self.write_idx
            )));
        }
        self.read_idx = read_idx;
        Ok(())
    }

    /// Move the write cursor; positions beyond capacity are clamped to it.
    pub fn set_write_idx(&mut self, write_idx: usize) {
        self.write_idx = write_idx.min(self.data.len());
        self.read_idx = self.read_idx.min(self.write_idx);
    }

    /// Reset both cursors without releasing the allocation.
    pub fn clear(&mut self) {
        self.read_idx = 0;
        self.write_idx = 0;
    }

    /// Discard consumed bytes: copy the unread region to the front, reset
    /// the read cursor to zero and the write cursor to the prior difference.
    pub fn compact(&mut self) {
        if self.read_idx == 0 {
            return;
        }
        self.data.copy_within(self.read_idx..self.write_idx, 0);
        self.write_idx -= self.read_idx;
        self.read_idx = 0;
    }

    /// Append raw bytes, growing the buffer as needed.
    pub fn append(&mut self, data: &[u8]) -> &mut Self {
        if data.is_empty() {
            return self;
        }
        self.reserve(self.write_idx + data.len());
        self.data[self.write_idx..self.write_idx + data.len()].copy_from_slice(data);
        self.write_idx += data.len();
        self
    }

    /// Append the bytes of a string, without a trailing NUL.
    pub fn append_str(&mut self, s: &str) -> &mut Self {
        self.append(s.as_bytes())
    }

    /// Append the written region of another stream.
    pub fn append_stream(&mut self, other: &ByteStream) -> &mut Self {
        self.append(other.as_slice())
    }

    /// Read exactly `out.len()` bytes into `out`.
    pub fn get(&mut self, out: &mut [u8]) -> Result<()> {
        if self.read_idx + out.len() > self.write_idx {
            return Err(Error::AccessViolation(format!(
                "read of {} bytes at {} overruns write cursor {}",
                out.len(),
                self.read_idx,
                self.write_idx
            )));
        }
        out.copy_from_slice(&self.data[self.read_idx..self.read_idx + out.len()]);
        self.read_idx += out.len();
        Ok(())
    }

    // ── Typed puts ───────────────────────────────────────────────────

    pub fn put_i8(&mut self, v: i8) {
        self.append(&[v as u8]);
    }

    pub fn put_u8(&mut self, v: u8) {
        self.append(&[v]);
    }

    pub fn put_i16(&mut self, v: i16) {
        self.put_u16(v as u16);
    }

    pub fn put_u16(&mut self, v: u16) {
        let v = match self.byte_order {
            ByteOrder::Host => v,
            ByteOrder::Network => hton_u16(v),
        };
        self.append(&v.to_ne_bytes());
    }

    pub fn put_i32(&mut self, v: i32) {
        self.put_u32(v as u32);
    }

    pub fn put_u32(&mut self, v: u32) {
        let v = match self.byte_order {
            ByteOrder::Host => v,
            ByteOrder::Network => hton_u32(v),
        };
        self.append(&v.to_ne_bytes());
    }

    pub fn put_i64(&mut self, v: i64) {
        self.put_u64(v as u64);
    }

    pub fn put_u64(&mut self, v: u64) {
        let v = match self.byte_order {
            ByteOrder::Host => v,
            ByteOrder::Network => hton_u64(v),
        };
        self.append(&v.to_ne_bytes());
    }

    // ── Typed gets ───────────────────────────────────────────────────

    pub fn get_i8(&mut self) -> Result<i8> {
        Ok(self.get_u8()? as i8)
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        let mut b = [0u8; 1];
        self.get(&mut b)?;
        Ok(b[0])
    }

    pub fn get_i16(&mut self) -> Result<i16> {
        Ok(self.get_u16()? as i16)
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        let mut b = [0u8; 2];
        self.get(&mut b)?;
        let v = u16::from_ne_bytes(b);
        Ok(match self.byte_order {
            ByteOrder::Host => v,
            ByteOrder::Network => ntoh_u16(v),
        })
    }

    pub fn get_i32(&mut self) -> Result<i32> {
        Ok(self.get_u32()? as i32)
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        let mut b = [0u8; 4];
        self.get(&mut b)?;
        let v = u32::from_ne_bytes(b);
        Ok(match self.byte_order {
            ByteOrder::Host => v,
            ByteOrder::Network => ntoh_u32(v),
        })
    }

    pub fn get_i64(&mut self) -> Result<i64> {
        Ok(self.get_u64()? as i64)
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        let mut b = [0u8; 8];
        self.get(&mut b)?;
        let v = u64::from_ne_bytes(b);
        Ok(match self.byte_order {
            ByteOrder::Host => v,
            ByteOrder::Network => ntoh_u64(v),
        })
    }

    // ── Strings and blocks ───────────────────────────────────────────

    /// Append the bytes of a string followed by a NUL terminator.
    pub fn put_cstr(&mut self, s: &str) {
        self.append(s.as_bytes());
        self.put_u8(0);
    }

    /// Read bytes up to a NUL terminator (consumed) or the end of the
    /// stream, and return them as a string. Non-UTF-8 bytes are replaced.
    pub fn get_cstr(&mut self) -> Result<String> {
        let mut bytes = Vec::new();
        while !self.eof() {
            let c = self.get_u8()?;
            if c == 0 {
                break;
            }
            bytes.push(c);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Append another stream's written region prefixed with its u32 length.
    pub fn put_block(&mut self, block: &ByteStream) {
        self.put_u32(block.write_idx() as u32);
        self.append_stream(block);
    }

    /// Read a u32-length-prefixed block into a fresh stream.
    pub fn get_block(&mut self) -> Result<ByteStream> {
        let len = self.get_u32()? as usize;
        let mut block = ByteStream::new(len);
        if len > 0 {
            if self.read_idx + len > self.write_idx {
                return Err(Error::AccessViolation(format!(
                    "block of {len} bytes overruns write cursor"
                )));
            }
            block.append(&self.data[self.read_idx..self.read_idx + len]);
            self.read_idx += len;
        }
        Ok(block)
    }

    /// Ensure capacity for at least `new_size` bytes. Below the current
    /// capacity this is a no-op; otherwise the new capacity is
    /// `max(new_size, old + 1024, old + old/16)`.
    pub fn reserve(&mut self, new_size: usize) {
        let old = self.data.len();
        if new_size <= old {
            return;
        }
        let grown = new_size.max(old + 1024).max(old + old / 16);
        self.data.resize(grown, 0);
    }
}

impl std::ops::Index<usize> for ByteStream {
    type Output = u8;

    fn index(&self, idx: usize) -> &u8 {
        &self.data[idx]
    }
}

impl std::fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteStream")
            .field("read_idx", &self.read_idx)
            .field("write_idx", &self.write_idx)
            .field("capacity", &self.data.len())
            .field("byte_order", &self.byte_order)
            .finish()
    }
}
