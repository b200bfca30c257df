// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use dctm_client_rs::cfg::cli::resolve_config_path;
use dctm_client_rs::cfg::config::Config;

#[test]
fn load_sample_config() {
    let cfg = resolve_config_path("tests/config.yaml")
        .and_then(Config::load_from_file)
        .expect("load config");

    assert_eq!(cfg.connection.host, "docbase.example");
    assert_eq!(cfg.connection.port, 1489);
    assert!(!cfg.connection.secure);
    assert_eq!(cfg.docbase.docbaseid, -1);
    assert_eq!(cfg.docbase.username.as_deref(), Some("dmadmin"));
    // defaults: English, UTF-8, Linux
    assert_eq!(cfg.locale.language, 2);
    assert_eq!(cfg.locale.charset, 16);
    assert_eq!(cfg.locale.platform, 8201);
    assert_eq!(cfg.runtime.batch_hint, 20);
}

#[test]
fn ser_version_override_is_validated() {
    let yaml = "connection:\n  host: h\n  port: 1489\ndocbase:\n  docbaseid: 1\n  ser_version: 7\n";
    let cfg: Config = serde_yaml::from_str(yaml).expect("parse");
    assert!(cfg.validate().is_err());
}
