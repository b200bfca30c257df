// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};

/// Resolve a config path against the working directory and canonicalize
/// it, refusing directories so a typo fails here instead of inside the
/// yaml parser.
pub fn resolve_config_path(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("cannot get current working dir")?
            .join(path)
    };

    let resolved = absolute
        .canonicalize()
        .with_context(|| format!("config file {} not found", absolute.display()))?;
    ensure!(
        resolved.is_file(),
        "config path {} is not a file",
        resolved.display()
    );
    Ok(resolved)
}
