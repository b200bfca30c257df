// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Outgoing frame assembly. A frame is a 4-byte big-endian length followed
//! by the protocol byte, a one-byte header length, the header integers, and
//! zero or more tag-encoded body items.

use crate::codec::binary;
use crate::net::PROTOCOL_VERSION;

/// One argument of an RPC request, encoded as a tagged body item.
#[derive(Debug, Clone)]
pub enum Arg {
    Int(i64),
    Str(String),
    /// Raw bytes, serialized without the string NUL terminator.
    Raw(Vec<u8>),
    IntArray(Vec<i64>),
}

impl Arg {
    fn serialize(&self) -> Vec<u8> {
        match self {
            Arg::Int(v) => binary::serialize_integer(*v),
            Arg::Str(v) => binary::serialize_string(v),
            Arg::Raw(v) => binary::serialize_array(v, false),
            Arg::IntArray(v) => binary::serialize_integer_array(v),
        }
    }
}

/// Which header variant a frame carries.
///
/// A client-initiated request announces (version, release, inumber) after
/// the sequence and rpc type. A reply to a server-driven upload callback
/// carries only the sequence and type, because there the client acts as
/// the server side of the exchange.
#[derive(Debug, Clone, Copy)]
pub enum HeaderKind {
    Hello {
        version: i64,
        release: i64,
        inumber: i64,
    },
    CallbackReply,
}

pub(crate) fn serialize_args(args: &[Arg]) -> Vec<u8> {
    let mut body = Vec::new();
    for arg in args {
        body.extend_from_slice(&arg.serialize());
    }
    body
}

fn build_header(kind: HeaderKind, sequence: i64, rpc_type: i64) -> Vec<u8> {
    let mut header = vec![PROTOCOL_VERSION, 0];
    header.extend_from_slice(&binary::serialize_integer(sequence));
    header.extend_from_slice(&binary::serialize_integer(rpc_type));
    if let HeaderKind::Hello {
        version,
        release,
        inumber,
    } = kind
    {
        header.extend_from_slice(&binary::serialize_integer(version));
        header.extend_from_slice(&binary::serialize_integer(release));
        header.extend_from_slice(&binary::serialize_integer(inumber));
    }
    header[1] = (header.len() - 2) as u8;
    header
}

/// Assemble a complete frame ready for the socket.
pub(crate) fn build_frame(kind: HeaderKind, sequence: i64, rpc_type: i64, args: &[Arg]) -> Vec<u8> {
    let header = build_header(kind, sequence, rpc_type);
    let body = serialize_args(args);
    let length = header.len() + body.len();
    let mut frame = Vec::with_capacity(4 + length);
    frame.extend_from_slice(&(length as u32).to_be_bytes());
    frame.extend_from_slice(&header);
    frame.extend_from_slice(&body);
    frame
}
