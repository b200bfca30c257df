// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Password obfuscation as the server expects it: the byte sequence is
//! reversed and XOR-ed with 0xB6 (0xB6 itself passes through), emitted as
//! lowercase hex. Already-obfuscated input is returned unchanged, which
//! makes the transform idempotent.

fn scramble(byte: u8) -> u8 {
    if byte == 0xB6 { 0xB6 } else { byte ^ 0xB6 }
}

pub fn is_obfuscated(password: &str) -> bool {
    if password.is_empty() || password.len() % 2 != 0 {
        return false;
    }
    let Ok(bytes) = hex::decode(password) else {
        return false;
    };
    if password.bytes().any(|c| c.is_ascii_uppercase()) {
        return false;
    }
    bytes.iter().all(|&x| x == 0xB6 || (x ^ 0xB6) <= 0x7F)
}

pub fn obfuscate(password: &str) -> String {
    if is_obfuscated(password) {
        return password.to_string();
    }
    let scrambled: Vec<u8> = password.bytes().rev().map(scramble).collect();
    hex::encode(scrambled)
}
