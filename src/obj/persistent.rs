// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Objects loaded by id. The first two hex digits of an `r_object_id` are
//! a type tag that selects the variant; content-bearing variants can have
//! their content streamed through the puller sub-protocol.

use crate::codec::NULL_ID;
use crate::obj::typed_object::TypedObject;

pub const R_OBJECT_ID: &str = "r_object_id";
pub const R_PAGE_CNT: &str = "r_page_cnt";
pub const A_CONTENT_TYPE: &str = "a_content_type";
pub const STORAGE_ID: &str = "storage_id";
pub const FORMAT: &str = "format";
pub const DATA_TICKET: &str = "data_ticket";

/// Variant of a persistent object, keyed by the id's type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistentKind {
    Content,
    SysObject,
    Document,
    Query,
    Folder,
    Cabinet,
    Method,
    OutputDevice,
    Router,
    Registered,
    DocbaseConfig,
    ServerConfig,
    Note,
    Policy,
    Process,
    Activity,
    ExprCode,
    Plugin,
    Other,
}

impl PersistentKind {
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            6 => Self::Content,
            8 => Self::SysObject,
            9 => Self::Document,
            10 => Self::Query,
            11 => Self::Folder,
            12 => Self::Cabinet,
            16 => Self::Method,
            23 => Self::OutputDevice,
            24 => Self::Router,
            25 => Self::Registered,
            60 => Self::DocbaseConfig,
            61 => Self::ServerConfig,
            65 => Self::Note,
            70 => Self::Policy,
            75 => Self::Process,
            76 => Self::Activity,
            88 => Self::ExprCode,
            103 => Self::Plugin,
            _ => Self::Other,
        }
    }

    /// Variants whose instances carry renditions reachable through
    /// dmr_content.
    pub fn is_sysobject(self) -> bool {
        !matches!(self, Self::Content | Self::Other)
    }
}

#[derive(Debug, Clone)]
pub struct Persistent {
    pub obj: TypedObject,
    pub kind: PersistentKind,
}

fn type_tag(object_id: &str) -> u8 {
    if object_id.len() != 16 || object_id == NULL_ID {
        return 0;
    }
    u8::from_str_radix(&object_id[..2], 16).unwrap_or(0)
}

impl Persistent {
    pub fn from_object(obj: TypedObject) -> Self {
        let kind = obj
            .id(R_OBJECT_ID)
            .map(|id| PersistentKind::from_tag(type_tag(id)))
            .unwrap_or(PersistentKind::Other);
        Self { obj, kind }
    }

    pub fn object_id(&self) -> &str {
        self.obj.id(R_OBJECT_ID).unwrap_or(NULL_ID)
    }

    pub fn has_content(&self) -> bool {
        self.obj.int(R_PAGE_CNT).unwrap_or(0) > 0
    }

    pub fn content_type(&self) -> Option<String> {
        self.obj.string(A_CONTENT_TYPE)
    }
}
