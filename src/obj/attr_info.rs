// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::codec::ValueType;

/// Schema record for one attribute of a server type.
#[derive(Debug, Clone)]
pub struct AttrInfo {
    /// D6 attribute position; −1 when undefined (legacy streams).
    pub position: i64,
    pub name: String,
    pub attr_type: ValueType,
    pub repeating: bool,
    pub length: i64,
    /// D6 only.
    pub restriction: Option<i64>,
}
