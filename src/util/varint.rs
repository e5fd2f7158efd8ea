//! Variable-length integer encoding utilities.
//!
//! LEB128-style varints (7 bits per byte, high bit as continuation) used by the
//! journal and the positions store, plus helpers for delta-coded ascending
//! integer lists.

use std::io::{Read, Write};

use byteorder::ReadBytesExt;

use crate::error::{PilumError, Result};

/// Append the varint encoding of `value` to `out`.
pub fn encode_u64_into(value: u64, out: &mut Vec<u8>) {
    let mut val = value;

    loop {
        let mut byte = (val & 0x7F) as u8;
        val >>= 7;

        if val != 0 {
            byte |= 0x80; // Set continuation bit
        }

        out.push(byte);

        if val == 0 {
            break;
        }
    }
}

/// Encode a u32 value using variable-length encoding.
pub fn encode_u32(value: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(5);
    encode_u64_into(value as u64, &mut bytes);
    bytes
}

/// Encode a u64 value using variable-length encoding.
pub fn encode_u64(value: u64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(10);
    encode_u64_into(value, &mut bytes);
    bytes
}

/// Decode a u64 value from variable-length encoding.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_u64(bytes: &[u8]) -> Result<(u64, usize)> {
    let mut result = 0u64;
    let mut shift = 0;
    let mut bytes_read = 0;

    for &byte in bytes {
        bytes_read += 1;

        if shift >= 64 {
            return Err(PilumError::corruption("VarInt overflow"));
        }

        result |= ((byte & 0x7F) as u64) << shift;

        if (byte & 0x80) == 0 {
            return Ok((result, bytes_read));
        }

        shift += 7;
    }

    Err(PilumError::corruption("Incomplete VarInt"))
}

/// Decode a u32 value from variable-length encoding.
pub fn decode_u32(bytes: &[u8]) -> Result<(u32, usize)> {
    let (value, read) = decode_u64(bytes)?;
    if read > 5 || value > u32::MAX as u64 {
        return Err(PilumError::corruption("VarInt overflow"));
    }
    Ok((value as u32, read))
}

/// Write a variable-length encoded u64 to a writer.
pub fn write_u64<W: Write>(writer: &mut W, value: u64) -> Result<usize> {
    let bytes = encode_u64(value);
    writer.write_all(&bytes)?;
    Ok(bytes.len())
}

/// Write a variable-length encoded u32 to a writer.
pub fn write_u32<W: Write>(writer: &mut W, value: u32) -> Result<usize> {
    write_u64(writer, value as u64)
}

/// Read a variable-length encoded u64 from a reader.
pub fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut result = 0u64;
    let mut shift = 0;

    loop {
        let byte = reader.read_u8()?;

        if shift >= 64 {
            return Err(PilumError::corruption("VarInt overflow"));
        }

        result |= ((byte & 0x7F) as u64) << shift;

        if (byte & 0x80) == 0 {
            return Ok(result);
        }

        shift += 7;
    }
}

/// Read a variable-length encoded u32 from a reader.
pub fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let value = read_u64(reader)?;
    u32::try_from(value).map_err(|_| PilumError::corruption("VarInt overflow"))
}

/// Append an ascending list as a count followed by varint deltas.
///
/// The first delta is taken against zero. Input that is not ascending is
/// rejected rather than silently wrapped.
pub fn encode_ascending(values: &[u32], out: &mut Vec<u8>) -> Result<()> {
    encode_u64_into(values.len() as u64, out);
    let mut prev = 0u32;
    for &v in values {
        if v < prev {
            return Err(PilumError::invalid_argument(format!(
                "list is not ascending: {v} after {prev}"
            )));
        }
        encode_u64_into((v - prev) as u64, out);
        prev = v;
    }
    Ok(())
}

/// Decode a list written by [`encode_ascending`].
///
/// Returns the list and the number of bytes consumed.
pub fn decode_ascending(bytes: &[u8]) -> Result<(Vec<u32>, usize)> {
    let (count, mut pos) = decode_u64(bytes)?;
    let mut values = Vec::with_capacity(count.min(4096) as usize);
    let mut prev = 0u32;
    for _ in 0..count {
        let (delta, read) = decode_u32(&bytes[pos..])?;
        pos += read;
        prev = prev
            .checked_add(delta)
            .ok_or_else(|| PilumError::corruption("delta list overflows u32"))?;
        values.push(prev);
    }
    Ok((values, pos))
}
