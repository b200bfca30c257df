// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::{Context, Result};
use dctm_client_rs::{
    cfg::{cli::resolve_config_path, config::Config, logger::init_logger},
    client::{docbase::DocbaseClient, docbroker::{DocbrokerClient, server_endpoints}},
};
use tokio::time::timeout;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let _init_logger = init_logger("tests/config_logger.yaml")?;

    // Load config
    let cfg = resolve_config_path("tests/config.yaml")
        .and_then(Config::load_from_file)
        .context("failed to resolve or load config")?;

    // Discovery: ask the broker which docbases it knows and where their
    // servers live
    let mut broker = DocbrokerClient::new(
        &cfg.connection.host,
        cfg.connection.port,
        cfg.connection.secure,
        cfg.connection.timeout(),
    );
    if let Ok(map) = broker.get_docbase_map().await {
        for name in map.docbase_names() {
            info!("docbase {name}");
            if let Ok(servers) = broker.get_server_map(&name).await {
                for endpoint in server_endpoints(&servers).unwrap_or_default() {
                    info!(
                        "  {} -> {}:{} ({})",
                        endpoint.server_name, endpoint.host, endpoint.port, endpoint.last_status
                    );
                }
            }
        }
    }

    // Open a session and poke the server a little
    let mut session = timeout(Duration::from_secs(30), DocbaseClient::connect(&cfg))
        .await
        .context("connect timeout")??;
    info!("session {}", session.session_id());
    info!("server version: {}", session.server_version().await?);

    let mut cabinets = session
        .query("select r_object_id, object_name from dm_cabinet")
        .await?;
    while let Some(record) = cabinets.next_record(&mut session).await? {
        info!(
            "cabinet {} {}",
            record.string("r_object_id").unwrap_or_default(),
            record.string("object_name").unwrap_or_default()
        );
    }

    session.disconnect().await?;
    Ok(())
}
