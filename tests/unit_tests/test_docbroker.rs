// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::Bytes;
use dctm_client_rs::client::docbroker::server_endpoints;
use dctm_client_rs::obj::docbroker::{DocbaseMap, parse_address};

fn parse_map(text: &str) -> DocbaseMap {
    DocbaseMap::parse(Bytes::copy_from_slice(text.as_bytes())).expect("parse")
}

#[test]
fn connection_address_parse() {
    let (host, port) = parse_address("INET_ADDR 02 0665 01 00 host.example").expect("parse");
    assert_eq!((host.as_str(), port), ("host.example", 1637));
}

#[test]
fn docbase_map_forces_repeating() {
    // the broker omits the repeating marker on the docbase list
    let text = "OBJ DocbrokerMap 0\n\
                3\n\
                r_docbase_name STRING S 32\n\
                A 7 docbase\n\
                r_docbase_id STRING S 16\n\
                A 4 4242\n\
                i_host_addr STRING S 64\n\
                A 36 INET_ADDR 02 0665 01 00 host.example\n";
    let map = parse_map(text);

    assert!(map.obj.get("r_docbase_name").expect("attr").repeating);
    assert!(map.obj.get("r_docbase_id").expect("attr").repeating);
    assert!(
        !map.obj.get("i_host_addr").expect("attr").repeating,
        "the host address stays single-valued"
    );
    assert_eq!(map.docbase_names(), vec!["docbase"]);
    assert_eq!(
        map.host_addr().as_deref(),
        Some("INET_ADDR 02 0665 01 00 host.example")
    );
}

#[test]
fn server_map_pairs_up_endpoints() {
    let text = "OBJ DocbrokerMap 0\n\
                6\n\
                r_host_name STRING S 64\n\
                A 12 host.example\n\
                r_server_name STRING R 64\n\
                2\n\
                A 5 alpha\n\
                A 4 beta\n\
                r_last_status STRING R 16\n\
                2\n\
                A 4 Open\n\
                A 6 Closed\n\
                i_docbase_id INT R 0\n\
                2\n\
                4242\n\
                4243\n\
                i_server_connection_address STRING R 128\n\
                2\n\
                A 36 INET_ADDR 02 0665 01 00 host.example\n\
                A 36 INET_ADDR 02 0a29 01 00 host.example\n\
                i_host_addr STRING S 64\n\
                A 36 INET_ADDR 02 0665 01 00 host.example\n";
    let map = parse_map(text);
    let endpoints = server_endpoints(&map).expect("endpoints");

    assert_eq!(endpoints.len(), 2);
    assert_eq!(endpoints[0].server_name, "alpha");
    assert_eq!(endpoints[0].port, 1637);
    assert_eq!(endpoints[0].docbase_id, 4242);
    assert_eq!(endpoints[0].last_status, "Open");
    assert_eq!(endpoints[1].server_name, "beta");
    assert_eq!(endpoints[1].port, 0x0a29);
    assert_eq!(endpoints[1].host, "host.example");
}
