// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Numeric RPC opcodes, the client hello constants, chunk sizes for the
//! content sub-protocols, and the known-command registry driving the
//! dynamic method surface.

pub mod commands;
pub mod messages;

use bitflags::bitflags;

pub const RPC_GET_BLOCK: i64 = 1;
pub const RPC_GET_BLOCK1: i64 = 2;
pub const RPC_GET_BLOCK2: i64 = 3;
pub const RPC_GET_BLOCK3: i64 = 4;
pub const RPC_GET_BLOCK4: i64 = 5;
pub const RPC_GET_BLOCK5: i64 = 6;
pub const RPC_DO_PUSH: i64 = 27;
pub const RPC_NEW_SESSION_BY_ADDR: i64 = 51;
pub const RPC_CLOSE_SESSION: i64 = 52;
pub const RPC_FETCH_TYPE: i64 = 53;
pub const RPC_APPLY: i64 = 54;
pub const RPC_MULTI_NEXT: i64 = 56;
pub const RPC_CLOSE_COLLECTION: i64 = 57;
pub const RPC_APPLY_FOR_LONG: i64 = 58;
pub const RPC_APPLY_FOR_BOOL: i64 = 59;
pub const RPC_APPLY_FOR_ID: i64 = 60;
pub const RPC_APPLY_FOR_STRING: i64 = 61;
pub const RPC_APPLY_FOR_OBJECT: i64 = 62;
pub const RPC_APPLY_FOR_TIME: i64 = 63;
pub const RPC_APPLY_FOR_DOUBLE: i64 = 64;
pub const RPC_GET_NEXT_PIECE: i64 = 65;

/// Callback rpc the server sends when it wants the upload to stop.
pub const RPC_STOP_PUSH: i64 = 17023;

/// On-wire client identification sent with NEW_SESSION_BY_ADDR.
pub const CLIENT_VERSION_STRING: &str = "6.0.0.1 python";

pub const DM_CLIENT_CONNECT_PROTOCOL: i64 = 2;
pub const DM_CLIENT_SESSION_RECORD_HINT: i64 = -1;
pub const DM_CLIENT_SERIALIZATION_VERSION_HINT: i64 = 2;

bitflags! {
    /// Capability mask carried in slot 9 of the client version array.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClientCapabilities: i64 {
        const USE_OBDATA = 1 << 0;
        const USE_NEW_RPC = 1 << 1;
        const IS_DMCL = 1 << 2;
        const TZ_COMPAT = 1 << 3;
    }
}

/// The 10-slot version array sent with NEW_SESSION_BY_ADDR. Slot 3 is the
/// serialization-version hint the server answers in its own slot 7.
pub fn client_version_array() -> Vec<i64> {
    let capabilities =
        ClientCapabilities::USE_OBDATA | ClientCapabilities::USE_NEW_RPC | ClientCapabilities::IS_DMCL;
    vec![
        0,
        DM_CLIENT_CONNECT_PROTOCOL,
        DM_CLIENT_SESSION_RECORD_HINT,
        DM_CLIENT_SERIALIZATION_VERSION_HINT,
        0,
        0,
        0,
        0,
        0,
        capabilities.bits(),
    ]
}

/// Maximum payload per push for a callback rpc; `None` for rpc codes
/// outside the table.
pub fn chunk_size(callback_rpc: i64) -> Option<usize> {
    Some(match callback_rpc {
        RPC_GET_BLOCK1 => 256,
        RPC_GET_BLOCK2 => 1024,
        RPC_GET_BLOCK3 => 4096,
        RPC_GET_BLOCK4 | RPC_GET_BLOCK => 16384,
        RPC_GET_BLOCK5 => 63000,
        RPC_STOP_PUSH => 0,
        _ => return None,
    })
}

/// Largest chunk the server accepts; serialized requests beyond this are
/// transferred through the chunked-argument path.
pub const MAX_REQUEST_LEN: usize = 63000;

/// Placeholder argument of the final APPLY after a chunked transfer.
pub const CHUNKED_OBJ_MARKER: &str = "_USE_SESSION_CHUNKED_OBJ_STRING_";

/// Map a server method name to the idiomatic client-side name: snake case,
/// with `EXEC` special-cased to `execute`.
pub fn client_method_name(rpc_name: &str) -> String {
    if rpc_name == "EXEC" {
        return "execute".to_string();
    }
    let mut out = String::with_capacity(rpc_name.len() + 4);
    let chars: Vec<char> = rpc_name.chars().collect();
    for (i, c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            if prev.is_ascii_lowercase() || prev.is_ascii_digit() || (prev != '_' && next_lower) {
                if !out.ends_with('_') {
                    out.push('_');
                }
            }
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}

/// How an APPLY-family call interprets its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    Long,
    Bool,
    Id,
    Str,
    Double,
    Time,
    Object,
    Collection,
}

impl ReturnKind {
    pub fn rpc(self) -> i64 {
        match self {
            Self::Long => RPC_APPLY_FOR_LONG,
            Self::Bool => RPC_APPLY_FOR_BOOL,
            Self::Id => RPC_APPLY_FOR_ID,
            Self::Str => RPC_APPLY_FOR_STRING,
            Self::Double => RPC_APPLY_FOR_DOUBLE,
            Self::Time => RPC_APPLY_FOR_TIME,
            Self::Object => RPC_APPLY_FOR_OBJECT,
            Self::Collection => RPC_APPLY,
        }
    }
}

/// How the reply body of an object-returning command is materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    Object,
    Persistent,
    EntryPoints,
    Collection,
}

#[derive(Debug, Clone, Copy)]
pub struct KnownCommand {
    pub command: &'static str,
    pub returns: ReturnKind,
    pub shape: ResultShape,
    pub need_id: bool,
}

const fn cmd(
    command: &'static str,
    returns: ReturnKind,
    shape: ResultShape,
    need_id: bool,
) -> KnownCommand {
    KnownCommand {
        command,
        returns,
        shape,
        need_id,
    }
}

/// Commands with a known request/response shape. Only the ones the server
/// actually advertises in its entry-point table become callable.
pub const KNOWN_COMMANDS: &[KnownCommand] = &[
    cmd("AclObjGetPermit", ReturnKind::Long, ResultShape::Object, true),
    cmd("AclObjGetXPermit", ReturnKind::Long, ResultShape::Object, true),
    cmd("ALLOW_BASE_AS_FEATURES", ReturnKind::Bool, ResultShape::Object, false),
    cmd("ALLOW_BASE_TYPE_CHANGES", ReturnKind::Bool, ResultShape::Object, false),
    cmd("AUDIT_ON", ReturnKind::Bool, ResultShape::Object, false),
    cmd("AUTHENTICATE_USER", ReturnKind::Object, ResultShape::Object, false),
    cmd("CONVERT_ID", ReturnKind::Id, ResultShape::Object, true),
    cmd("COUNT_SESSIONS", ReturnKind::Object, ResultShape::Object, false),
    cmd("DB_STATS", ReturnKind::Object, ResultShape::Object, false),
    cmd("DISABLE_TIMEOUT", ReturnKind::Bool, ResultShape::Object, false),
    cmd("DO_METHOD", ReturnKind::Object, ResultShape::Object, false),
    cmd("DUMP_COUNTS", ReturnKind::Bool, ResultShape::Object, false),
    cmd("DUMP_CACHE", ReturnKind::Object, ResultShape::Object, false),
    cmd("DUMP_JMS_CONFIG_LIST", ReturnKind::Object, ResultShape::Object, false),
    cmd("ENABLE_TIMEOUT", ReturnKind::Bool, ResultShape::Object, false),
    cmd("ENCRYPT_PASSWORD", ReturnKind::Str, ResultShape::Object, false),
    cmd("ENCRYPT_TEXT", ReturnKind::Str, ResultShape::Object, false),
    cmd("END_PUSH_V2", ReturnKind::Object, ResultShape::Object, false),
    cmd("ENTRY_POINTS", ReturnKind::Object, ResultShape::EntryPoints, false),
    cmd("EXEC", ReturnKind::Collection, ResultShape::Collection, false),
    cmd("EXEC_SELECT_SQL", ReturnKind::Collection, ResultShape::Collection, false),
    cmd("EXEC_SQL", ReturnKind::Bool, ResultShape::Collection, false),
    cmd("FETCH", ReturnKind::Object, ResultShape::Persistent, true),
    cmd("FETCH_TYPE", ReturnKind::Object, ResultShape::Object, false),
    cmd("FTINDEX_AGENT_ADMIN", ReturnKind::Object, ResultShape::Object, false),
    cmd("GET_ERRORS", ReturnKind::Collection, ResultShape::Collection, false),
    cmd("GET_DIST_CONTENT_MAP", ReturnKind::Object, ResultShape::Object, true),
    cmd("GET_DOCBASE_CONFIG", ReturnKind::Object, ResultShape::Object, false),
    cmd("GET_LAST_SQL", ReturnKind::Str, ResultShape::Object, false),
    cmd("GET_LOGIN", ReturnKind::Str, ResultShape::Object, false),
    cmd("GET_SERVER_CONFIG", ReturnKind::Object, ResultShape::Object, false),
    cmd("GET_WORKFLOW_AGENT_STATUS", ReturnKind::Long, ResultShape::Object, false),
    cmd("KILL_PULLER", ReturnKind::Bool, ResultShape::Object, false),
    cmd("LIST_SESSIONS", ReturnKind::Object, ResultShape::Object, false),
    cmd("MAKE_PULLER", ReturnKind::Long, ResultShape::Object, false),
    cmd("MAKE_PUSHER", ReturnKind::Long, ResultShape::Object, false),
    cmd("NEXT_ID_LIST", ReturnKind::Collection, ResultShape::Collection, false),
    cmd("SERVER_VERSION", ReturnKind::Str, ResultShape::Object, false),
    cmd("SERVER_DIR", ReturnKind::Object, ResultShape::Object, false),
    cmd("SET_LOCALE", ReturnKind::Bool, ResultShape::Object, false),
    cmd("SET_OPTIONS", ReturnKind::Bool, ResultShape::Object, false),
    cmd("SHOW_SESSIONS", ReturnKind::Collection, ResultShape::Collection, false),
    cmd("START_PUSH", ReturnKind::Bool, ResultShape::Object, false),
    cmd("TIME", ReturnKind::Time, ResultShape::Object, false),
    cmd("SET_PUSH_OBJECT_STATUS", ReturnKind::Bool, ResultShape::Object, false),
];

pub fn known_command(name: &str) -> Option<&'static KnownCommand> {
    KNOWN_COMMANDS.iter().find(|c| c.command == name)
}
