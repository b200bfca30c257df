// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Tag-prefixed binary items used for transport payloads and for D6
//! typed objects embedded as strings.
//!
//! ```text
//! 0x02 <len> <msb..lsb>            signed integer (len in 1..=4)
//! 0x05 0x00                        empty string
//! 0x16 <length-prefix> <bytes>     string, optionally NUL-terminated
//! 0x30 0x82 <hi> <lo> <ints...>    integer array
//! 0x36 0x80 <strings...> 0x00 0x00 array of strings
//! ```

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::codec::ProtocolError;

pub const INTEGER_START: u8 = 0x02;
pub const EMPTY_STRING_START: u8 = 0x05;
pub const NULL_BYTE: u8 = 0x00;
pub const STRING_START: u8 = 0x16;
pub const INT_ARRAY_START: u8 = 0x30;
pub const LONG_LENGTH_START: u8 = 0x82;
pub const STRING_ARRAY_START: u8 = 0x36;

// Integer and length encodings are hot-path (every frame header and every
// item prefix), so small values are memoized process-wide.
static INTEGERS: Lazy<DashMap<i64, Vec<u8>>> = Lazy::new(DashMap::new);
static LENGTHS: Lazy<DashMap<u64, Vec<u8>>> = Lazy::new(DashMap::new);

fn serialize_integer_uncached(value: i64) -> Vec<u8> {
    let mut payload = Vec::with_capacity(8);
    let mut v = value;
    while !(-0x80..0x80).contains(&v) {
        payload.push((v & 0xff) as u8);
        v >>= 8;
    }
    payload.push((v & 0xff) as u8);

    let mut out = Vec::with_capacity(payload.len() + 2);
    out.push(INTEGER_START);
    out.push(payload.len() as u8);
    out.extend(payload.iter().rev());
    out
}

/// Encode a signed integer as a 0x02 item.
pub fn serialize_integer(value: i64) -> Vec<u8> {
    if (-0xffff..=0xffff).contains(&value) {
        return INTEGERS
            .entry(value)
            .or_insert_with(|| serialize_integer_uncached(value))
            .clone();
    }
    serialize_integer_uncached(value)
}

fn serialize_length_uncached(value: u64) -> Vec<u8> {
    let mut payload = Vec::with_capacity(8);
    let mut v = value;
    while v >= 0x80 {
        payload.push((v & 0xff) as u8);
        v >>= 8;
    }
    payload.push(v as u8);

    let mut out = Vec::with_capacity(payload.len() + 1);
    if payload.len() > 1 {
        out.push(0x80 | payload.len() as u8);
    }
    out.extend(payload.iter().rev());
    out
}

/// Encode a length prefix: one byte below 0x80, otherwise a count byte
/// with the high bit set followed by MSB-first length bytes.
pub fn serialize_length(value: u64) -> Vec<u8> {
    if value <= 0xffff {
        return LENGTHS
            .entry(value)
            .or_insert_with(|| serialize_length_uncached(value))
            .clone();
    }
    serialize_length_uncached(value)
}

/// Encode raw bytes as a 0x16 item; `as_string` appends a terminating NUL.
pub fn serialize_array(value: &[u8], as_string: bool) -> Vec<u8> {
    if value.is_empty() {
        return vec![EMPTY_STRING_START, NULL_BYTE];
    }
    let content_len = value.len() + usize::from(as_string);
    let prefix = serialize_length(content_len as u64);
    let mut out = Vec::with_capacity(1 + prefix.len() + content_len);
    out.push(STRING_START);
    out.extend_from_slice(&prefix);
    out.extend_from_slice(value);
    if as_string {
        out.push(NULL_BYTE);
    }
    out
}

pub fn serialize_string(value: &str) -> Vec<u8> {
    serialize_array(value.as_bytes(), true)
}

pub fn serialize_integer_array(values: &[i64]) -> Vec<u8> {
    let mut body = Vec::with_capacity(values.len() * 4);
    for v in values {
        body.extend_from_slice(&serialize_integer(*v));
    }
    let mut out = Vec::with_capacity(body.len() + 4);
    out.push(INT_ARRAY_START);
    out.push(LONG_LENGTH_START);
    out.push((body.len() >> 8) as u8);
    out.push((body.len() & 0xff) as u8);
    out.extend_from_slice(&body);
    out
}

fn need(data: &[u8], offset: usize, count: usize, what: &'static str) -> Result<(), ProtocolError> {
    if data.len() < offset + count {
        return Err(ProtocolError::Truncated(what));
    }
    Ok(())
}

/// Decode a 0x02 integer, sign-extending a payload whose top bit is set.
/// Returns the value and the offset one past the item.
pub fn read_integer(data: &[u8], offset: usize) -> Result<(i64, usize), ProtocolError> {
    need(data, offset, 3, "integer")?;
    let header = data[offset];
    if header != INTEGER_START {
        return Err(ProtocolError::UnexpectedTag {
            expected: INTEGER_START,
            found: header,
        });
    }
    let length = data[offset + 1] as usize;
    need(data, offset, 2 + length, "integer payload")?;

    let mut value = data[offset + 2] as i64;
    if value > 0x7f {
        value -= 0x100;
    }
    for i in 1..length {
        value = (value << 8) | data[offset + 2 + i] as i64;
    }
    Ok((value, offset + 2 + length))
}

/// Decode a length prefix (see [`serialize_length`]).
pub fn read_length(data: &[u8], offset: usize) -> Result<(u64, usize), ProtocolError> {
    need(data, offset, 1, "length")?;
    let first = data[offset] as u64;
    let offset = offset + 1;
    if first < 0x80 {
        return Ok((first, offset));
    }
    let count = (first & 0x7f) as usize;
    need(data, offset, count, "length payload")?;
    let mut value = 0u64;
    for i in 0..count {
        value = (value << 8) | data[offset + i] as u64;
    }
    Ok((value, offset + count))
}

pub fn read_integer_array(data: &[u8], offset: usize) -> Result<(Vec<i64>, usize), ProtocolError> {
    need(data, offset, 1, "integer array")?;
    if data[offset] != INT_ARRAY_START {
        return Err(ProtocolError::UnexpectedTag {
            expected: INT_ARRAY_START,
            found: data[offset],
        });
    }
    let (length, mut offset) = read_length(data, offset + 1)?;
    let stop = offset + length as usize;
    let mut result = Vec::new();
    while offset < stop {
        let (value, next) = read_integer(data, offset)?;
        result.push(value);
        offset = next;
    }
    Ok((result, offset))
}

/// Decode a 0x05/0x16/0x36 item into raw bytes. With `as_string`, a
/// trailing NUL inside a 0x16 item is stripped.
pub fn read_array(
    data: &[u8],
    offset: usize,
    as_string: bool,
) -> Result<(Vec<u8>, usize), ProtocolError> {
    need(data, offset, 2, "array")?;
    let tag = data[offset];
    if tag == EMPTY_STRING_START && data[offset + 1] == NULL_BYTE {
        return Ok((Vec::new(), offset + 2));
    }
    if tag == STRING_START {
        let (length, offset) = read_length(data, offset + 1)?;
        let length = length as usize;
        need(data, offset, length, "string payload")?;
        let end = offset + length;
        let payload = if as_string && length > 0 && data[end - 1] == NULL_BYTE {
            &data[offset..end - 1]
        } else {
            &data[offset..end]
        };
        return Ok((payload.to_vec(), end));
    }
    if tag == STRING_ARRAY_START && data[offset + 1] == 0x80 {
        let mut offset = offset + 2;
        let mut result = Vec::new();
        loop {
            need(data, offset, 2, "string array")?;
            if data[offset] == NULL_BYTE && data[offset + 1] == NULL_BYTE {
                return Ok((result, offset + 2));
            }
            let (chunk, next) = read_array(data, offset, as_string)?;
            result.extend_from_slice(&chunk);
            offset = next;
        }
    }
    Err(ProtocolError::UnknownSequence(tag))
}

pub fn read_string(data: &[u8], offset: usize) -> Result<(Vec<u8>, usize), ProtocolError> {
    read_array(data, offset, true)
}

pub fn read_binary(data: &[u8], offset: usize) -> Result<(Vec<u8>, usize), ProtocolError> {
    read_array(data, offset, false)
}
