// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A tiny in-process content server: just enough framing to script
//! request/response exchanges against the real client.

use anyhow::{Context, Result, bail};
use dctm_client_rs::codec::binary;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// One parsed client frame.
#[derive(Debug)]
pub struct Frame {
    pub sequence: i64,
    pub rpc: i64,
    /// Remaining header integers (version, release, inumber) when present.
    pub hello: Vec<i64>,
    pub items: Vec<OutItem>,
}

/// Wire item used both for decoded request bodies and scripted replies.
#[derive(Debug, Clone, PartialEq)]
pub enum OutItem {
    Int(i64),
    Str(String),
    Raw(Vec<u8>),
    IntArray(Vec<i64>),
}

impl OutItem {
    pub fn as_int(&self) -> i64 {
        match self {
            OutItem::Int(v) => *v,
            other => panic!("expected int item, got {other:?}"),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            OutItem::Str(v) => v,
            other => panic!("expected string item, got {other:?}"),
        }
    }

    fn encode(&self) -> Vec<u8> {
        match self {
            OutItem::Int(v) => binary::serialize_integer(*v),
            OutItem::Str(v) => binary::serialize_string(v),
            OutItem::Raw(v) => binary::serialize_array(v, false),
            OutItem::IntArray(v) => binary::serialize_integer_array(v),
        }
    }
}

fn parse_items(body: &[u8]) -> Result<Vec<OutItem>> {
    let mut items = Vec::new();
    let mut offset = 0;
    while offset < body.len() {
        match body[offset] {
            0x02 => {
                let (v, next) = binary::read_integer(body, offset)?;
                items.push(OutItem::Int(v));
                offset = next;
            }
            0x30 => {
                let (v, next) = binary::read_integer_array(body, offset)?;
                items.push(OutItem::IntArray(v));
                offset = next;
            }
            0x05 | 0x16 | 0x36 => {
                let (v, next) = binary::read_string(body, offset)?;
                items.push(OutItem::Str(String::from_utf8_lossy(&v).into_owned()));
                offset = next;
            }
            other => bail!("unknown tag 0x{other:02X} at {offset}"),
        }
    }
    Ok(items)
}

/// Read one frame; `None` on clean EOF before the length prefix.
pub async fn read_frame(stream: &mut TcpStream) -> Result<Option<Frame>> {
    let mut length_bytes = [0u8; 4];
    match stream.read_exact(&mut length_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let total = u32::from_be_bytes(length_bytes) as usize;

    let mut payload = vec![0u8; total];
    stream.read_exact(&mut payload).await?;
    if payload[0] != 0x30 {
        bail!("wrong protocol byte 0x{:02X}", payload[0]);
    }
    let header_length = payload[1] as usize;
    let header = &payload[2..2 + header_length];

    let mut header_ints = Vec::new();
    let mut offset = 0;
    while offset < header.len() {
        let (v, next) = binary::read_integer(header, offset)?;
        header_ints.push(v);
        offset = next;
    }
    if header_ints.len() < 2 {
        bail!("short header: {header_ints:?}");
    }

    let items = parse_items(&payload[2 + header_length..])?;
    Ok(Some(Frame {
        sequence: header_ints[0],
        rpc: header_ints[1],
        hello: header_ints[2..].to_vec(),
        items,
    }))
}

fn build_frame(header_ints: &[i64], items: &[OutItem]) -> Vec<u8> {
    let mut header = vec![0x30u8, 0];
    for v in header_ints {
        header.extend_from_slice(&binary::serialize_integer(*v));
    }
    header[1] = (header.len() - 2) as u8;

    let mut body = Vec::new();
    for item in items {
        body.extend_from_slice(&item.encode());
    }

    let total = header.len() + body.len();
    let mut frame = Vec::with_capacity(4 + total);
    frame.extend_from_slice(&(total as u32).to_be_bytes());
    frame.extend_from_slice(&header);
    frame.extend_from_slice(&body);
    frame
}

/// Answer a client frame: echo its sequence with a zero status.
pub async fn respond(stream: &mut TcpStream, sequence: i64, items: &[OutItem]) -> Result<()> {
    let frame = build_frame(&[sequence, 0], items);
    stream.write_all(&frame).await.context("write response")
}

/// Push a server-initiated callback frame (upload role inversion).
pub async fn send_callback(
    stream: &mut TcpStream,
    sequence: i64,
    rpc: i64,
    items: &[OutItem],
) -> Result<()> {
    let frame = build_frame(&[sequence, rpc], items);
    stream.write_all(&frame).await.context("write callback")
}

/// Entry-point table advertised by the scripted server.
pub const ENTRY_POINTS: &[(&str, i64)] = &[
    ("ENTRY_POINTS", 0),
    ("GET_ERRORS", 558),
    ("EXEC", 223),
    ("SET_LOCALE", 115),
    ("DO_METHOD", 300),
    ("SET_PUSH_OBJECT_STATUS", 301),
    ("SERVER_VERSION", 305),
];

/// Legacy-text ENTRY_POINTS reply object.
pub fn entry_points_text() -> String {
    let mut text = String::from(
        "TYPE GeneratedType 0000000000000000 NULL\n2\nname STRING R 64\npos INT R 0\nOBJ GeneratedType\n2\n",
    );
    text.push_str(&format!("{}\n", ENTRY_POINTS.len()));
    for (name, _) in ENTRY_POINTS {
        text.push_str(&format!("A {} {}\n", name.len(), name));
    }
    text.push_str(&format!("{}\n", ENTRY_POINTS.len()));
    for (_, pos) in ENTRY_POINTS {
        text.push_str(&format!("{pos}\n"));
    }
    text.push_str("0\n");
    text
}

/// Serve the connect handshake on an accepted socket: NEW_SESSION_BY_ADDR,
/// ENTRY_POINTS and SET_LOCALE. Returns the session id it granted.
pub async fn serve_handshake(stream: &mut TcpStream) -> Result<String> {
    let session_id = "0123456789abcdef".to_string();

    let frame = read_frame(stream).await?.context("expected NEW_SESSION")?;
    assert_eq!(frame.rpc, 51, "expected NEW_SESSION_BY_ADDR");
    // reason, server version array (slot 7 = 0 -> legacy text), session id
    respond(
        stream,
        frame.sequence,
        &[
            OutItem::Str(String::new()),
            OutItem::IntArray(vec![0, 2, -1, 2, 0, 0, 0, 0, 0, 0]),
            OutItem::Str(session_id.clone()),
        ],
    )
    .await?;

    let frame = read_frame(stream).await?.context("expected ENTRY_POINTS")?;
    assert_eq!(frame.rpc, 62, "expected APPLY_FOR_OBJECT for ENTRY_POINTS");
    assert_eq!(frame.items[0].as_str(), session_id);
    respond(
        stream,
        frame.sequence,
        &[
            OutItem::Str(entry_points_text()),
            OutItem::Int(1),
            OutItem::Int(0),
            OutItem::Int(0),
        ],
    )
    .await?;

    let frame = read_frame(stream).await?.context("expected SET_LOCALE")?;
    assert_eq!(frame.rpc, 59, "expected APPLY_FOR_BOOL for SET_LOCALE");
    respond(
        stream,
        frame.sequence,
        &[OutItem::Int(1), OutItem::Int(1), OutItem::Int(0)],
    )
    .await?;

    Ok(session_id)
}

/// Config pointed at the mock listener; no credentials, known docbase id.
pub fn test_config(port: u16) -> dctm_client_rs::cfg::config::Config {
    use dctm_client_rs::cfg::config::*;
    Config {
        connection: ConnectionConfig {
            host: "127.0.0.1".to_string(),
            port,
            secure: false,
            timeout_secs: 5,
        },
        docbase: DocbaseConfig {
            docbaseid: 1,
            username: None,
            password: None,
            trusted: false,
            hostname: None,
            ser_version: None,
        },
        locale: LocaleConfig::default(),
        runtime: RuntimeConfig::default(),
    }
}
