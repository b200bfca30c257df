// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Minimal docbroker client: the same framed transport with its own hello
//! triple, legacy text serialization only, and exactly one request per
//! connection. After replying, the broker drops the socket; that is
//! normal here, not an error.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use bytes::Bytes;

use crate::net::netwise::{Endpoint, Netwise};
use crate::net::request::Arg;
use crate::obj::docbroker::{DocbaseMap, parse_address};
use crate::rpc::commands::docbroker as requests;

const NETWISE_VERSION: i64 = 1;
const NETWISE_RELEASE: i64 = 0;
const NETWISE_INUMBER: i64 = 1094;

/// Request handle reported to the broker.
const HANDLE: &str = "localhost";

pub struct DocbrokerClient {
    net: Netwise,
}

impl DocbrokerClient {
    pub fn new(host: &str, port: u16, secure: bool, timeout: Duration) -> Self {
        let endpoint = Endpoint {
            host: host.to_string(),
            port,
            secure,
        };
        Self {
            net: Netwise::new(
                endpoint,
                NETWISE_VERSION,
                NETWISE_RELEASE,
                NETWISE_INUMBER,
                timeout,
            ),
        }
    }

    /// Known docbases with their host addresses.
    pub async fn get_docbase_map(&mut self) -> Result<DocbaseMap> {
        let data = self
            .request_object(requests::docbase_map(HANDLE).serialize())
            .await?;
        DocbaseMap::parse(data).map_err(Into::into)
    }

    /// Content Server endpoints for one docbase.
    pub async fn get_server_map(&mut self, docbase: &str) -> Result<DocbaseMap> {
        let data = self
            .request_object(requests::server_map(HANDLE, docbase).serialize())
            .await?;
        let map = DocbaseMap::parse(data)?;
        if !map.obj.contains("r_host_name") {
            let broker = map
                .host_addr()
                .and_then(|addr| parse_address(&addr).ok())
                .map(|(host, port)| format!("{host}:{port}"))
                .unwrap_or_else(|| "unknown broker".to_string());
            bail!("no servers for docbase {docbase} on {broker}");
        }
        Ok(map)
    }

    /// Each query is one request/response; the broker closes the socket
    /// afterwards, so the client does too.
    async fn request_object(&mut self, request: String) -> Result<Bytes> {
        let result = async {
            let mut resp = self.net.request(1, &[Arg::Str(request)]).await?;
            resp.next_bytes().context("empty docbroker reply")
        }
        .await;
        self.net.disconnect().await;
        result.map(Bytes::from)
    }
}

/// Resolved endpoint of one content server from a server map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    pub server_name: String,
    pub docbase_id: i64,
    pub host: String,
    pub port: u16,
    pub last_status: String,
}

/// Pair up the repeating attributes of a server map.
pub fn server_endpoints(map: &DocbaseMap) -> Result<Vec<ServerEndpoint>> {
    let names = map.obj.strings("r_server_name");
    let statuses = map.obj.strings("r_last_status");
    let ids = map.obj.ints("i_docbase_id");
    let addresses = map.obj.strings("i_server_connection_address");

    let mut endpoints = Vec::with_capacity(names.len());
    for (i, name) in names.iter().enumerate() {
        let address = addresses
            .get(i)
            .with_context(|| format!("server {name} has no connection address"))?;
        let (host, port) = parse_address(address)?;
        endpoints.push(ServerEndpoint {
            server_name: name.clone(),
            docbase_id: ids.get(i).copied().unwrap_or(-1),
            host,
            port,
            last_status: statuses.get(i).cloned().unwrap_or_default(),
        });
    }
    Ok(endpoints)
}
