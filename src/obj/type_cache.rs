// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Process-wide type registry. Every session parses against the same
//! cache; types live for the process. Insertion flattens the ancestor
//! chain as far as the already-cached supertypes allow.

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::obj::type_info::TypeInfo;

static TYPE_CACHE: Lazy<DashMap<String, TypeInfo>> = Lazy::new(DashMap::new);

pub fn get(name: &str) -> Option<TypeInfo> {
    TYPE_CACHE.get(name).map(|entry| entry.value().clone())
}

pub fn add(mut type_info: TypeInfo) {
    loop {
        let Some(pending) = type_info.pending.clone() else {
            break;
        };
        // clone out of the shard before touching the map again
        let parent = match TYPE_CACHE.get(&pending) {
            Some(entry) => entry.value().clone(),
            None => break,
        };
        type_info.extend(&parent);
        if type_info.pending.as_deref() == Some(pending.as_str()) {
            break;
        }
    }
    TYPE_CACHE.insert(type_info.name.clone(), type_info);
}

pub fn contains(name: &str) -> bool {
    TYPE_CACHE.contains_key(name)
}

/// Drop every cached type. Tests only; production code never evicts.
pub fn clear() {
    TYPE_CACHE.clear();
}
