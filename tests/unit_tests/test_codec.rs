// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use dctm_client_rs::codec::base64::{int_to_pseudo_base64, pseudo_base64_to_int};
use dctm_client_rs::codec::binary::{
    read_integer, read_length, serialize_integer, serialize_length,
};
use dctm_client_rs::codec::obfuscate::{is_obfuscated, obfuscate};
use hex_literal::hex;

#[test]
fn integer_encoding_is_bit_exact() {
    assert_eq!(serialize_integer(127), hex!("02 01 7F"));
    assert_eq!(serialize_integer(-1), hex!("02 01 FF"));
    assert_eq!(serialize_integer(128), hex!("02 02 00 80"));
    assert_eq!(serialize_integer(-129), hex!("02 02 FF 7F"));
}

#[test]
fn integer_round_trip_across_the_range() {
    let samples = [
        i64::from(i32::MIN),
        i64::from(i32::MIN) + 1,
        -0x10000,
        -0xffff,
        -129,
        -128,
        -1,
        0,
        1,
        127,
        128,
        0xffff,
        0x10000,
        0x7ffffff,
        i64::from(i32::MAX),
    ];
    for v in samples {
        let encoded = serialize_integer(v);
        let (decoded, consumed) = read_integer(&encoded, 0).expect("decode");
        assert_eq!(decoded, v);
        assert_eq!(consumed, encoded.len());
        if (-128..=127).contains(&v) {
            assert_eq!(encoded.len(), 3, "one-byte payload for {v}");
        }
    }
}

#[test]
fn length_round_trip_and_short_form() {
    for v in [0u64, 1, 0x7f, 0x80, 0x1234, 0xffff, 0x10000, 0x7fffffff] {
        let encoded = serialize_length(v);
        let (decoded, consumed) = read_length(&encoded, 0).expect("decode");
        assert_eq!(decoded, v);
        assert_eq!(consumed, encoded.len());
        assert_eq!(encoded.len() == 1, v < 0x80);
    }
}

#[test]
fn pseudo_base64_round_trip_sweep() {
    for v in (0..5000).chain([1 << 18, (1 << 24) + 17, i64::from(i32::MAX)]) {
        let digits = int_to_pseudo_base64(v);
        assert!(
            digits
                .bytes()
                .all(|c| c.is_ascii_alphanumeric() || c == b'+' || c == b'/'),
            "digits for {v}: {digits}"
        );
        assert_eq!(pseudo_base64_to_int(&digits), Some(v));
    }
}

#[test]
fn obfuscate_secret_matches_the_protocol() {
    let once = obfuscate("secret");
    assert_eq!(once, "c2d3c4d5d3c5");
    assert_eq!(once.len(), 12);
    assert!(is_obfuscated(&once));
    // idempotent once obfuscated
    assert_eq!(obfuscate(&once), once);
}

#[test]
fn obfuscate_output_is_always_hex_pairs() {
    for password in ["a", "dmadmin", "pa55w0rd!", "пароль"] {
        let out = obfuscate(password);
        assert_eq!(out.len() % 2, 0);
        assert!(out.bytes().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}

#[test]
fn obfuscate_preserves_the_magic_byte() {
    // 0xB6 itself must pass through unscrambled
    let password = "\u{00b6}"; // utf-8 is 0xC2 0xB6
    let out = obfuscate(password);
    assert_eq!(out, "b674");
}
