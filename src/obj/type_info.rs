// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::collections::HashMap;

use crate::codec::ParserError;
use crate::obj::attr_info::AttrInfo;

/// The synthetic type the server emits for ad-hoc result shapes; exempt
/// from the D6 position invariant.
const GENERATED_TYPE: &str = "GeneratedType";

/// Schema of a server-side object type.
///
/// Inheritance is by name: `pending` names the next unresolved ancestor.
/// When that ancestor becomes available its attributes are prepended and
/// `pending` moves one step up the chain.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub name: String,
    pub id: String,
    pub vstamp: Option<i64>,
    pub version: Option<i64>,
    pub cache: Option<i64>,
    pub super_name: Option<String>,
    pub shared_parent: Option<String>,
    pub aspect_name: Option<String>,
    pub aspect_share_flag: bool,
    pub ser_version: i64,
    attrs: Vec<AttrInfo>,
    /// D6 position → index into `attrs`.
    positions: HashMap<i64, usize>,
    pub pending: Option<String>,
}

fn normalize(name: String) -> Option<String> {
    if name.is_empty() || name == "NULL" {
        None
    } else {
        Some(name)
    }
}

impl TypeInfo {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        id: String,
        vstamp: Option<i64>,
        version: Option<i64>,
        cache: Option<i64>,
        super_name: String,
        shared_parent: Option<String>,
        aspect_name: Option<String>,
        aspect_share_flag: bool,
        ser_version: i64,
    ) -> Self {
        let mut super_name = normalize(super_name);
        let shared_parent = shared_parent.and_then(normalize);
        if super_name.is_none() && shared_parent.is_some() {
            super_name = shared_parent.clone();
        }
        let pending = super_name.clone();
        Self {
            name,
            id,
            vstamp,
            version,
            cache,
            super_name,
            shared_parent,
            aspect_name: aspect_name.and_then(normalize),
            aspect_share_flag,
            ser_version,
            attrs: Vec::new(),
            positions: HashMap::new(),
            pending,
        }
    }

    pub fn is_generated(&self) -> bool {
        self.name == GENERATED_TYPE
    }

    /// Attach the next attribute of the descriptor. In D6 mode a real type
    /// must give every attribute a unique non-negative position.
    pub fn append(&mut self, attr: AttrInfo) -> Result<(), ParserError> {
        if self.ser_version > 0 {
            if attr.position > -1 {
                self.positions.insert(attr.position, self.attrs.len());
            } else if !self.is_generated() {
                return Err(ParserError::EmptyPosition);
            }
        }
        self.attrs.push(attr);
        Ok(())
    }

    /// Attribute by D6 position, or by ordinal for legacy streams and the
    /// generated type.
    pub fn get(&self, index: i64) -> Option<&AttrInfo> {
        if self.ser_version > 0 && !self.is_generated() {
            return self.positions.get(&index).map(|i| &self.attrs[*i]);
        }
        usize::try_from(index).ok().and_then(|i| self.attrs.get(i))
    }

    pub fn attrs(&self) -> &[AttrInfo] {
        &self.attrs
    }

    pub fn count(&self) -> usize {
        self.attrs.len()
    }

    /// Fold the resolved ancestor in: clone its attributes to the front and
    /// adopt its own pending link. No-op unless `other` is the awaited one.
    pub fn extend(&mut self, other: &TypeInfo) {
        if self.pending.as_deref() != Some(other.name.as_str()) {
            return;
        }
        let mut merged = Vec::with_capacity(other.attrs.len() + self.attrs.len());
        merged.extend(other.attrs.iter().cloned());
        merged.append(&mut self.attrs);
        self.attrs = merged;
        self.pending = other.pending.clone();
        self.reindex();
    }

    fn reindex(&mut self) {
        self.positions.clear();
        if self.ser_version <= 0 {
            return;
        }
        for (i, attr) in self.attrs.iter().enumerate() {
            if attr.position > -1 {
                self.positions.insert(attr.position, i);
            }
        }
    }
}
