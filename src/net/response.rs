// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Incoming frame bodies: a cursor over tag-encoded items. Content
//! download frames read their string items as raw binary (no NUL strip);
//! everything else reads them as text.

use anyhow::{Result, bail};
use bytes::Bytes;

use crate::codec::{ProtocolError, binary};

#[derive(Debug, Clone)]
pub enum Item {
    Int(i64),
    Bytes(Vec<u8>),
    IntArray(Vec<i64>),
}

impl Item {
    pub fn into_int(self) -> Result<i64> {
        match self {
            Item::Int(v) => Ok(v),
            other => bail!("expected integer item, got {other:?}"),
        }
    }

    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            Item::Bytes(v) => Ok(v),
            other => bail!("expected string item, got {other:?}"),
        }
    }

    pub fn into_int_array(self) -> Result<Vec<i64>> {
        match self {
            Item::IntArray(v) => Ok(v),
            other => bail!("expected integer array item, got {other:?}"),
        }
    }
}

#[derive(Debug)]
pub struct Response {
    body: Bytes,
    offset: usize,
    binary: bool,
}

impl Response {
    pub(crate) fn new(body: Bytes, binary: bool) -> Self {
        Self {
            body,
            offset: 0,
            binary,
        }
    }

    /// Next body item, or `None` once the body is exhausted.
    pub fn next(&mut self) -> Result<Option<Item>, ProtocolError> {
        if self.body.len() <= self.offset {
            return Ok(None);
        }
        let tag = self.body[self.offset];
        let item = match tag {
            binary::INTEGER_START => {
                let (value, next) = binary::read_integer(&self.body, self.offset)?;
                self.offset = next;
                Item::Int(value)
            }
            binary::INT_ARRAY_START => {
                let (value, next) = binary::read_integer_array(&self.body, self.offset)?;
                self.offset = next;
                Item::IntArray(value)
            }
            binary::EMPTY_STRING_START | binary::STRING_START | binary::STRING_ARRAY_START => {
                let (value, next) = binary::read_array(&self.body, self.offset, !self.binary)?;
                self.offset = next;
                Item::Bytes(value)
            }
            other => return Err(ProtocolError::UnknownSequence(other)),
        };
        Ok(Some(item))
    }

    fn next_required(&mut self) -> Result<Item> {
        match self.next()? {
            Some(item) => Ok(item),
            None => bail!("response body exhausted"),
        }
    }

    pub fn next_int(&mut self) -> Result<i64> {
        self.next_required()?.into_int()
    }

    pub fn next_bytes(&mut self) -> Result<Vec<u8>> {
        self.next_required()?.into_bytes()
    }

    pub fn next_string(&mut self) -> Result<String> {
        Ok(String::from_utf8_lossy(&self.next_bytes()?).into_owned())
    }

    pub fn next_int_array(&mut self) -> Result<Vec<i64>> {
        self.next_required()?.into_int_array()
    }
}

/// A server-initiated frame observed during an upload: the server's own
/// sequence number and the callback rpc selecting the chunk size.
#[derive(Debug)]
pub struct CallbackFrame {
    pub sequence: i64,
    pub rpc: i64,
    pub response: Response,
}
