// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The server-advertised method table: repeating `name` and `pos`
//! attributes pairing method names with the small-integer opcodes used by
//! the APPLY family. Always transferred in legacy serialization.

use std::collections::HashMap;

use bytes::Bytes;

use crate::codec::ParserError;
use crate::obj::WireMode;
use crate::obj::typed_object::TypedObject;

#[derive(Debug, Clone, Default)]
pub struct EntryPoints {
    methods: HashMap<String, i64>,
}

impl EntryPoints {
    pub fn parse(buf: Bytes) -> Result<Self, ParserError> {
        let obj = TypedObject::parse(buf, WireMode::LEGACY)?;
        let names = obj.strings("name");
        let positions = obj.ints("pos");
        let methods = names.into_iter().zip(positions).collect();
        Ok(Self { methods })
    }

    pub fn methods(&self) -> &HashMap<String, i64> {
        &self.methods
    }

    pub fn opcode(&self, name: &str) -> Option<i64> {
        self.methods.get(name).copied()
    }
}
