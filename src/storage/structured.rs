//! Structured binary I/O for little-endian records.
//!
//! `StructWriter` and `StructReader` wrap any `Write`/`BufRead` and keep track
//! of the byte position, which the journal and the spans and positions writers
//! use to hand out record offsets.

use std::io::{BufRead, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{PilumError, Result};
use crate::util::varint;

/// A structured writer for binary data.
pub struct StructWriter<W: Write> {
    writer: W,
    position: u64,
}

impl<W: Write> StructWriter<W> {
    /// Create a new structured writer starting at position 0.
    pub fn new(writer: W) -> Self {
        Self::with_position(writer, 0)
    }

    /// Create a structured writer whose first byte lands at `position`,
    /// e.g. when appending to an existing file.
    pub fn with_position(writer: W, position: u64) -> Self {
        StructWriter { writer, position }
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.writer.write_u8(value)?;
        self.position += 1;
        Ok(())
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.writer.write_u16::<LittleEndian>(value)?;
        self.position += 2;
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.writer.write_u32::<LittleEndian>(value)?;
        self.position += 4;
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.writer.write_u64::<LittleEndian>(value)?;
        self.position += 8;
        Ok(())
    }

    /// Write a variable-length integer.
    pub fn write_varint(&mut self, value: u64) -> Result<()> {
        let written = varint::write_u64(&mut self.writer, value)?;
        self.position += written as u64;
        Ok(())
    }

    /// Write raw bytes without length prefix.
    pub fn write_raw(&mut self, value: &[u8]) -> Result<()> {
        self.writer.write_all(value)?;
        self.position += value.len() as u64;
        Ok(())
    }

    /// Write `count` zero bytes.
    pub fn pad(&mut self, count: usize) -> Result<()> {
        const ZEROS: [u8; 256] = [0u8; 256];
        let mut left = count;
        while left > 0 {
            let n = left.min(ZEROS.len());
            self.write_raw(&ZEROS[..n])?;
            left -= n;
        }
        Ok(())
    }

    /// Current byte position.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// A structured reader for binary data.
pub struct StructReader<R: BufRead> {
    reader: R,
    position: u64,
}

impl<R: BufRead> StructReader<R> {
    pub fn new(reader: R) -> Self {
        StructReader {
            reader,
            position: 0,
        }
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let value = self.reader.read_u8()?;
        self.position += 1;
        Ok(value)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let value = self.reader.read_u16::<LittleEndian>()?;
        self.position += 2;
        Ok(value)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let value = self.reader.read_u32::<LittleEndian>()?;
        self.position += 4;
        Ok(value)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let value = self.reader.read_u64::<LittleEndian>()?;
        self.position += 8;
        Ok(value)
    }

    /// Read a variable-length integer.
    pub fn read_varint(&mut self) -> Result<u64> {
        let mut bytes = Vec::with_capacity(10);
        loop {
            let byte = self.reader.read_u8()?;
            bytes.push(byte);
            if byte & 0x80 == 0 || bytes.len() > 10 {
                break;
            }
        }

        let (value, _) = varint::decode_u64(&bytes)?;
        self.position += bytes.len() as u64;
        Ok(value)
    }

    /// Read a varint that must fit in `u32`.
    pub fn read_varint_u32(&mut self) -> Result<u32> {
        let value = self.read_varint()?;
        u32::try_from(value).map_err(|_| PilumError::corruption(format!("{value} exceeds u32")))
    }

    /// Read exact number of raw bytes.
    pub fn read_raw(&mut self, length: usize) -> Result<Vec<u8>> {
        let mut bytes = vec![0u8; length];
        self.reader.read_exact(&mut bytes)?;
        self.position += length as u64;
        Ok(bytes)
    }

    /// True when no further bytes can be read.
    pub fn is_eof(&mut self) -> Result<bool> {
        Ok(self.reader.fill_buf()?.is_empty())
    }

    /// Current byte position.
    pub fn position(&self) -> u64 {
        self.position
    }
}
