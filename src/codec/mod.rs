// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod base64;
pub mod binary;
pub mod obfuscate;
pub mod text;
pub mod time;

use core::fmt;

use thiserror::Error;

/// The null object id: 16 ASCII zeroes.
pub const NULL_ID: &str = "0000000000000000";

/// Single-valued attribute marker on the wire.
pub const SINGLE: &str = "S";
/// Repeating attribute marker on the wire.
pub const REPEATING: &str = "R";

/// Semantic type of an attribute value as spelled in typed-object streams.
///
/// The wire carries either the textual marker (`BOOL`, `INT`, ...) inside
/// type descriptors, or a small integer in D6 attribute blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Bool,
    Int,
    String,
    Id,
    Time,
    Double,
    Undefined,
}

impl ValueType {
    pub fn from_marker(marker: &str) -> Option<Self> {
        Some(match marker {
            "BOOL" => Self::Bool,
            "INT" => Self::Int,
            "STRING" => Self::String,
            "ID" => Self::Id,
            "TIME" => Self::Time,
            "DOUBLE" => Self::Double,
            "UNDEFINED" => Self::Undefined,
            _ => return None,
        })
    }

    /// D6 attribute blocks re-state the value type as a small integer.
    pub fn from_wire_id(id: i64) -> Option<Self> {
        Some(match id {
            0 => Self::Bool,
            1 => Self::Int,
            2 => Self::String,
            3 => Self::Id,
            4 => Self::Time,
            5 => Self::Double,
            6 => Self::Undefined,
            _ => return None,
        })
    }

    pub fn marker(&self) -> &'static str {
        match self {
            Self::Bool => "BOOL",
            Self::Int => "INT",
            Self::String => "STRING",
            Self::Id => "ID",
            Self::Time => "TIME",
            Self::Double => "DOUBLE",
            Self::Undefined => "UNDEFINED",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.marker())
    }
}

/// Violations of the framed binary layer: bad tag bytes, short reads,
/// sequence/status mismatches. Fatal to the connection that produced them.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unexpected tag byte 0x{found:02X}, expected 0x{expected:02X}")]
    UnexpectedTag { expected: u8, found: u8 },
    #[error("truncated frame while reading {0}")]
    Truncated(&'static str),
    #[error("wrong protocol byte 0x{0:02X}, expected 0x30")]
    WrongProtocol(u8),
    #[error("invalid sequence {got}, expected {expected}")]
    SequenceMismatch { expected: i64, got: i64 },
    #[error("bad status: 0x{0:X}")]
    BadStatus(i64),
    #[error("unknown callback rpc: 0x{0:X}")]
    UnknownCallback(i64),
    #[error("unknown value sequence: 0x{0:02X}")]
    UnknownSequence(u8),
}

/// Malformed typed-object text or binary stream. Surfaced to the caller;
/// the session stays usable as long as the framing itself was intact.
#[derive(Debug, Error)]
pub enum ParserError {
    #[error("empty data")]
    EmptyData,
    #[error("invalid string {token:?} for {expected}")]
    InvalidToken { token: String, expected: &'static str },
    #[error("invalid header, expected {expected}, got: {got}")]
    InvalidHeader { expected: &'static str, got: String },
    #[error("invalid serialization version {got}, expected {expected}")]
    SerVersionMismatch { expected: i64, got: i64 },
    #[error("no type info for {0}")]
    TypeMissing(String),
    #[error("unknown type")]
    UnknownType,
    #[error("empty position")]
    EmptyPosition,
    #[error("no attribute at position {0}")]
    UnknownAttribute(i64),
    #[error("invalid date: {0}")]
    InvalidDate(String),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("unexpected end of stream")]
    UnexpectedEof,
}
