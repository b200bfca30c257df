// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Tokenizer for the typed-object text stream. Tokens are separated by
//! whitespace; string payloads are length-counted raw bytes, so the reader
//! must be able to switch between token scanning and exact-byte consumption
//! (with a controlled amount of separator trimming in between).

use bytes::{Buf, Bytes};

use crate::codec::{ParserError, ValueType, base64, time};

/// Trim every whitespace byte after the consumed region.
const TRIM_ALL: i32 = -1;
/// Trim at most one separator byte. Used before length-counted payloads,
/// which may themselves start with whitespace-looking bytes.
const TRIM_ONE: i32 = 1;

fn is_space(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

pub struct TokenStream {
    buf: Bytes,
}

impl TokenStream {
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Hand back whatever has not been consumed yet.
    pub fn into_remaining(self) -> Bytes {
        self.buf
    }

    fn substr(&mut self, length: usize, mut trim: i32) -> Result<Vec<u8>, ParserError> {
        if self.buf.len() < length {
            return Err(ParserError::UnexpectedEof);
        }
        let result = self.buf.split_to(length).to_vec();
        while let Some(&c) = self.buf.first() {
            if trim == 0 || !is_space(c) {
                break;
            }
            self.buf.advance(1);
            trim -= 1;
        }
        Ok(result)
    }

    fn next_token_trim(&mut self, trim: i32) -> Result<String, ParserError> {
        let length = self.buf.iter().take_while(|c| !is_space(**c)).count();
        let raw = self.substr(length, trim)?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    /// Next whitespace-delimited token; empty string at end of stream.
    pub fn next_token(&mut self) -> Result<String, ParserError> {
        self.next_token_trim(TRIM_ALL)
    }

    pub fn next_validated(
        &mut self,
        valid: fn(&str) -> bool,
        expected: &'static str,
    ) -> Result<String, ParserError> {
        let token = self.next_token()?;
        if !valid(&token) {
            return Err(ParserError::InvalidToken { token, expected });
        }
        Ok(token)
    }

    fn read_int_trim(&mut self, trim: i32) -> Result<i64, ParserError> {
        let token = self.next_token_trim(trim)?;
        if !is_integer(&token) {
            return Err(ParserError::InvalidToken {
                token,
                expected: "integer",
            });
        }
        token.parse().map_err(|_| ParserError::InvalidToken {
            token: String::new(),
            expected: "integer",
        })
    }

    pub fn read_int(&mut self) -> Result<i64, ParserError> {
        self.read_int_trim(TRIM_ALL)
    }

    pub fn read_base64_int(&mut self) -> Result<i64, ParserError> {
        let token = self.next_validated(base64::is_pseudo_base64, "pseudo-base64 integer")?;
        base64::pseudo_base64_to_int(&token).ok_or_else(|| ParserError::InvalidToken {
            token,
            expected: "pseudo-base64 integer",
        })
    }

    /// Type-descriptor marker: one of BOOL/INT/STRING/ID/TIME/DOUBLE/UNDEFINED.
    pub fn read_type_marker(&mut self) -> Result<ValueType, ParserError> {
        let token = self.next_token()?;
        ValueType::from_marker(&token).ok_or_else(|| ParserError::InvalidToken {
            token,
            expected: "type marker",
        })
    }

    /// Repeating marker: `R` repeating, `S` single.
    pub fn read_repeating_marker(&mut self) -> Result<bool, ParserError> {
        let token = self.next_validated(|t| t == "R" || t == "S", "repeating marker")?;
        Ok(token == "R")
    }

    /// Encoded string: an `A` (ascii) or `H` (hex) marker, a byte count, one
    /// separator, then exactly that many raw bytes (twice as many for hex).
    pub fn read_string(&mut self) -> Result<Vec<u8>, ParserError> {
        let encoding = self.next_validated(|t| t == "A" || t == "H", "encoding marker")?;
        let mut length = self.read_int_trim(TRIM_ONE)? as usize;
        if encoding == "H" {
            length *= 2;
        }
        let raw = self.substr(length, TRIM_ALL)?;
        if encoding == "H" {
            let text = String::from_utf8_lossy(&raw);
            return hex::decode(text.as_ref()).map_err(|_| ParserError::InvalidToken {
                token: text.into_owned(),
                expected: "hex string",
            });
        }
        Ok(raw)
    }

    /// Time value: a single token, except the `xxx` marker which announces a
    /// 20-byte date stamp to be consumed verbatim.
    pub fn read_time(&mut self) -> Result<Option<i64>, ParserError> {
        let mut value = self.next_token()?;
        if value == "xxx" {
            value = String::from_utf8_lossy(&self.substr(20, TRIM_ALL)?).into_owned();
        }
        time::parse_time(value.trim_end())
    }

    pub fn read_boolean(&mut self) -> Result<bool, ParserError> {
        let token =
            self.next_validated(|t| matches!(t, "T" | "F" | "1" | "0"), "boolean marker")?;
        Ok(token == "T" || token == "1")
    }

    pub fn read_double(&mut self) -> Result<f64, ParserError> {
        let token = self.next_token()?;
        token.parse().map_err(|_| ParserError::InvalidToken {
            token,
            expected: "double",
        })
    }
}

pub fn is_integer(token: &str) -> bool {
    let digits = token.strip_prefix('-').unwrap_or(token);
    !digits.is_empty() && digits.bytes().all(|c| c.is_ascii_digit())
}

pub fn is_attribute_name(token: &str) -> bool {
    !token.is_empty()
}
