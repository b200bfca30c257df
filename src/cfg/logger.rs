// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Tracing setup driven by a small yaml file, so the same binary can log
//! human-readable text during development and JSON lines in harnesses.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fastrace::collector::{Config as FastraceConfig, ConsoleReporter};
use serde::Deserialize;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};

#[derive(Debug, Deserialize, Clone)]
struct LoggerFile {
    logger: LoggerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "lowercase")]
enum Output {
    Stdout,
    Stderr,
    File,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "lowercase")]
enum Format {
    Text,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "lowercase")]
enum RotationFreq {
    Minutely,
    Hourly,
    Daily,
    Never,
}

#[derive(Debug, Deserialize, Clone)]
struct FileConfig {
    path: String,
    #[serde(default)]
    rotation_frequency: Option<RotationFreq>,
}

#[derive(Debug, Deserialize, Clone)]
struct LoggerConfig {
    level: String,
    output: Output,
    #[serde(default)]
    format: Option<Format>,
    #[serde(default)]
    file: Option<FileConfig>,
}

fn make_writer(cfg: &LoggerConfig) -> Result<(BoxMakeWriter, WorkerGuard)> {
    Ok(match cfg.output {
        Output::Stdout => {
            let (w, g) = tracing_appender::non_blocking(std::io::stdout());
            (BoxMakeWriter::new(w), g)
        }
        Output::Stderr => {
            let (w, g) = tracing_appender::non_blocking(std::io::stderr());
            (BoxMakeWriter::new(w), g)
        }
        Output::File => {
            let file = cfg
                .file
                .clone()
                .context("logger.file is required for output=file")?;
            let path = PathBuf::from(&file.path);
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .context("logger.file.path has no file name")?;
            let rotation = match file.rotation_frequency.unwrap_or(RotationFreq::Never) {
                RotationFreq::Minutely => Rotation::MINUTELY,
                RotationFreq::Hourly => Rotation::HOURLY,
                RotationFreq::Daily => Rotation::DAILY,
                RotationFreq::Never => Rotation::NEVER,
            };
            let appender = RollingFileAppender::new(rotation, dir, name);
            let (w, g) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(w), g)
        }
    })
}

/// Install the global subscriber. The returned guard must be kept alive
/// for the life of the process or buffered lines are lost.
pub fn init_logger(config_path: &str) -> Result<WorkerGuard> {
    let raw = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read logger config {config_path}"))?;
    let config: LoggerFile = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to parse logger config {config_path}"))?;
    let config = config.logger;

    let (writer, guard) = make_writer(&config)?;

    fastrace::set_reporter(ConsoleReporter, FastraceConfig::default());
    let compat_layer = fastrace_tracing::FastraceCompatLayer::new();

    let env_filter = EnvFilter::try_new(&config.level)
        .or_else(|_| EnvFilter::try_from_default_env())
        .context("failed to parse log level from config or env")?;

    match config.format.unwrap_or(Format::Text) {
        Format::Text => {
            let layer = fmt::layer().with_writer(writer).with_target(true);
            let subscriber = Registry::default()
                .with(env_filter)
                .with(compat_layer)
                .with(layer);
            tracing::subscriber::set_global_default(subscriber)
                .context("failed to set global default subscriber")?;
        }
        Format::Json => {
            let layer = fmt::layer().with_writer(writer).with_ansi(false).json();
            let subscriber = Registry::default()
                .with(env_filter)
                .with(compat_layer)
                .with(layer);
            tracing::subscriber::set_global_default(subscriber)
                .context("failed to set global default subscriber")?;
        }
    }

    Ok(guard)
}
