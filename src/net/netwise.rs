// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! One Netwise connection: a TCP (optionally TLS) stream plus the
//! request/response pump. The protocol is strictly serial: every frame the
//! client sends carries a fresh sequence number, the server echoes it, and
//! nothing is ever in flight concurrently.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::codec::{ProtocolError, binary};
use crate::net::request::{Arg, HeaderKind, build_frame};
use crate::net::response::{CallbackFrame, Response};
use crate::net::{NetStream, PROTOCOL_VERSION, io_with_timeout};
use crate::rpc;

#[derive(Debug, Clone)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub secure: bool,
}

pub struct Netwise {
    endpoint: Endpoint,
    version: i64,
    release: i64,
    inumber: i64,
    timeout: Duration,
    sequence: i64,
    stream: Option<Box<dyn NetStream>>,
    broken: bool,
    cancel: CancellationToken,
}

impl Netwise {
    pub fn new(
        endpoint: Endpoint,
        version: i64,
        release: i64,
        inumber: i64,
        timeout: Duration,
    ) -> Self {
        Self {
            endpoint,
            version,
            release,
            inumber,
            timeout,
            sequence: 0,
            stream: None,
            broken: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Token for caller-driven cancellation: cancelling fails every pending
    /// and future I/O on this connection, after which the session is dead.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn open_stream(endpoint: &Endpoint) -> Result<Box<dyn NetStream>> {
        let tcp = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
            .await
            .with_context(|| format!("connect {}:{}", endpoint.host, endpoint.port))?;
        tcp.set_nodelay(true)?;

        if !endpoint.secure {
            return Ok(Box::new(tcp));
        }

        use rustls_platform_verifier::BuilderVerifierExt;
        let config = rustls::ClientConfig::builder()
            .with_platform_verifier()
            .with_no_client_auth();
        let server_name = rustls::pki_types::ServerName::try_from(endpoint.host.clone())
            .with_context(|| format!("invalid TLS server name {}", endpoint.host))?;
        let tls = TlsConnector::from(Arc::new(config))
            .connect(server_name, tcp)
            .await
            .context("TLS handshake")?;
        Ok(Box::new(tls))
    }

    async fn stream(&mut self) -> Result<&mut Box<dyn NetStream>> {
        if self.broken {
            bail!("connection is broken");
        }
        if self.stream.is_none() {
            let stream = Self::open_stream(&self.endpoint).await?;
            debug!(
                host = %self.endpoint.host,
                port = self.endpoint.port,
                secure = self.endpoint.secure,
                "connected"
            );
            self.stream = Some(stream);
        }
        // just ensured above
        self.stream.as_mut().context("not connected")
    }

    /// Tear the stream down for good: a failed or timed-out exchange leaves
    /// the connection in an unknown framing state and it must not be reused.
    fn mark_broken(&mut self) {
        self.broken = true;
        self.stream = None;
    }

    /// Drop the stream. Idempotent; a later request reconnects.
    pub async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
            debug!("disconnected");
        }
    }

    pub fn next_sequence(&mut self) -> i64 {
        self.sequence += 1;
        self.sequence
    }

    async fn send_frame(
        &mut self,
        kind: HeaderKind,
        sequence: i64,
        rpc_type: i64,
        args: &[Arg],
    ) -> Result<()> {
        let frame = build_frame(kind, sequence, rpc_type, args);
        trace!(sequence, rpc_type, len = frame.len(), "send frame");
        let timeout = self.timeout;
        let cancel = self.cancel.clone();
        let stream = self.stream().await?;
        let result = io_with_timeout("write frame", stream.write_all(&frame), timeout, &cancel).await;
        if result.is_err() {
            self.mark_broken();
        }
        result
    }

    fn hello(&self) -> HeaderKind {
        HeaderKind::Hello {
            version: self.version,
            release: self.release,
            inumber: self.inumber,
        }
    }

    async fn read_exact(&mut self, len: usize, label: &'static str) -> Result<Vec<u8>> {
        let timeout = self.timeout;
        let cancel = self.cancel.clone();
        let stream = self.stream().await?;
        let mut buf = vec![0u8; len];
        let result = io_with_timeout(label, stream.read_exact(&mut buf), timeout, &cancel).await;
        if result.is_err() {
            self.mark_broken();
            result?;
        }
        Ok(buf)
    }

    /// Read one frame: 4-byte length, protocol byte, header, body.
    async fn receive_parts(&mut self) -> Result<(Vec<u8>, Bytes)> {
        let length_bytes = self.read_exact(4, "read frame length").await?;
        let total = u32::from_be_bytes([
            length_bytes[0],
            length_bytes[1],
            length_bytes[2],
            length_bytes[3],
        ]) as usize;
        if total < 2 {
            return Err(ProtocolError::Truncated("frame header").into());
        }

        let prefix = self.read_exact(2, "read protocol byte").await?;
        if prefix[0] != PROTOCOL_VERSION {
            self.mark_broken();
            return Err(ProtocolError::WrongProtocol(prefix[0]).into());
        }
        let header_length = prefix[1] as usize;
        if total < 2 + header_length {
            return Err(ProtocolError::Truncated("frame body").into());
        }

        let header = self.read_exact(header_length, "read frame header").await?;
        let body = self
            .read_exact(total - 2 - header_length, "read frame body")
            .await?;
        trace!(header_len = header_length, body_len = body.len(), "recv frame");
        Ok((header, Bytes::from(body)))
    }

    async fn receive_response(&mut self, expected_sequence: i64, binary: bool) -> Result<Response> {
        let (header, body) = self.receive_parts().await?;
        let (sequence, offset) = binary::read_integer(&header, 0)?;
        if sequence != expected_sequence {
            self.mark_broken();
            return Err(ProtocolError::SequenceMismatch {
                expected: expected_sequence,
                got: sequence,
            }
            .into());
        }
        let (status, _) = binary::read_integer(&header, offset)?;
        if status != 0 {
            self.mark_broken();
            return Err(ProtocolError::BadStatus(status).into());
        }
        Ok(Response::new(body, binary))
    }

    /// A server-driven frame: the header carries the server's own sequence
    /// and a callback rpc from the chunk-size table instead of a status.
    async fn receive_callback(&mut self) -> Result<CallbackFrame> {
        let (header, body) = self.receive_parts().await?;
        let (sequence, offset) = binary::read_integer(&header, 0)?;
        let (callback_rpc, _) = binary::read_integer(&header, offset)?;
        if rpc::chunk_size(callback_rpc).is_none() {
            return Err(ProtocolError::UnknownCallback(callback_rpc).into());
        }
        Ok(CallbackFrame {
            sequence,
            rpc: callback_rpc,
            response: Response::new(body, true),
        })
    }

    /// Standard request/response exchange.
    pub async fn request(&mut self, rpc_type: i64, args: &[Arg]) -> Result<Response> {
        let sequence = self.next_sequence();
        self.send_frame(self.hello(), sequence, rpc_type, args)
            .await?;
        self.receive_response(sequence, false).await
    }

    /// Like [`Netwise::request`], but body strings come back as raw binary
    /// chunks instead of NUL-stripped text.
    pub async fn request_download(&mut self, rpc_type: i64, args: &[Arg]) -> Result<Response> {
        let sequence = self.next_sequence();
        self.send_frame(self.hello(), sequence, rpc_type, args)
            .await?;
        self.receive_response(sequence, true).await
    }

    /// Open an upload exchange: send a normal request, then wait for the
    /// server to come back with its own (sequence, rpc) callback frame.
    pub async fn request_callback(&mut self, rpc_type: i64, args: &[Arg]) -> Result<CallbackFrame> {
        let sequence = self.next_sequence();
        self.send_frame(self.hello(), sequence, rpc_type, args)
            .await?;
        self.receive_callback().await
    }

    /// Answer a server callback on the server's sequence and wait for the
    /// next callback frame.
    pub async fn reply_callback(
        &mut self,
        server_sequence: i64,
        args: &[Arg],
    ) -> Result<CallbackFrame> {
        self.send_frame(HeaderKind::CallbackReply, server_sequence, 0, args)
            .await?;
        self.receive_callback().await
    }

    /// Fire a request without reading anything back. CLOSE_SESSION is the
    /// one call the server answers by dropping the connection.
    pub async fn send_only(&mut self, rpc_type: i64, args: &[Arg]) -> Result<()> {
        let sequence = self.next_sequence();
        self.send_frame(self.hello(), sequence, rpc_type, args).await
    }

    /// Terminate an upload after the server signalled stop: one empty frame
    /// on the client's own sequence, with nothing to read back.
    pub async fn finish_callback(&mut self) -> Result<()> {
        self.send_only(0, &[]).await
    }
}

impl std::fmt::Debug for Netwise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Netwise")
            .field("endpoint", &self.endpoint)
            .field("sequence", &self.sequence)
            .field("connected", &self.stream.is_some())
            .finish()
    }
}
