// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

/// Everything a session needs, grouped by concern: where to connect, who
/// to be, and which locale integers to advertise.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Transport endpoint and timeouts.
    pub connection: ConnectionConfig,
    /// Repository identity and credentials.
    pub docbase: DocbaseConfig,
    /// Integers embedded in SET_LOCALE. Probing the process locale is the
    /// original behavior; here they are plain configuration.
    #[serde(default)]
    pub locale: LocaleConfig,
    /// Client-side knobs that never travel on the wire.
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    /// Wrap the socket in TLS before speaking the protocol.
    #[serde(default)]
    pub secure: bool,
    /// Per-operation I/O timeout, seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ConnectionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_timeout_secs() -> u64 {
    60
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct DocbaseConfig {
    /// −1 asks the server which id it expects and reconnects with it.
    #[serde(default = "default_docbaseid")]
    pub docbaseid: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Trusted (SSO) authentication instead of a password.
    #[serde(default)]
    pub trusted: bool,
    /// Hostname reported inside the trusted-auth blob; defaults to the
    /// machine hostname at connect time.
    #[serde(default)]
    pub hostname: Option<String>,
    /// Force a typed-object serialization version instead of negotiating.
    #[serde(default)]
    pub ser_version: Option<i64>,
}

fn default_docbaseid() -> i64 {
    -1
}

/// Locale integers for SET_LOCALE, named after the wire attributes they
/// feed. Defaults describe a Linux client in English with UTF-8.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LocaleConfig {
    #[serde(default = "default_language", rename = "LANGUAGE")]
    pub language: i64,
    #[serde(default = "default_charset", rename = "CHARACTER_SET")]
    pub charset: i64,
    #[serde(default = "default_platform", rename = "PLATFORM_ENUM")]
    pub platform: i64,
    #[serde(default, rename = "UTC_OFFSET")]
    pub utc_offset: i64,
}

/// English_US in the server's locale table.
fn default_language() -> i64 {
    2
}

/// UTF-8 in the server's charset table.
pub fn default_charset() -> i64 {
    16
}

/// LINUX in the server's platform table.
fn default_platform() -> i64 {
    8201
}

impl Default for LocaleConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            charset: default_charset(),
            platform: default_platform(),
            utc_offset: 0,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RuntimeConfig {
    /// Rows requested per collection batch.
    #[serde(default = "default_batch_hint")]
    pub batch_hint: i64,
}

fn default_batch_hint() -> i64 {
    20
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            batch_hint: default_batch_hint(),
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let cfg: Config = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.connection.host.is_empty(), "connection.host is empty");
        ensure!(self.connection.port > 0, "connection.port is zero");
        ensure!(
            self.docbase.ser_version.is_none_or(|v| matches!(v, 0 | 1 | 2)),
            "docbase.ser_version must be 0, 1 or 2"
        );
        if self.docbase.trusted {
            ensure!(
                self.docbase.username.is_some(),
                "trusted auth needs docbase.username"
            );
        }
        Ok(())
    }
}
