// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The docbase session: one Netwise connection plus the negotiated
//! serialization mode, the session token, the entry-point table, the
//! open-collections registry and the server-message buffer.
//!
//! A session is a single-threaded cooperative resource; every method takes
//! `&mut self`, so the borrow checker enforces the protocol's one-call-
//! at-a-time rule. Run several sessions for parallelism.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail, ensure};
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cfg::config::{Config, LocaleConfig, default_charset};
use crate::client::identity::Identity;
use crate::codec::NULL_ID;
use crate::codec::obfuscate::obfuscate;
use crate::codec::time::parse_time;
use crate::net::netwise::{Endpoint, Netwise};
use crate::net::request::Arg;
use crate::net::response::Item;
use crate::obj::WireMode;
use crate::obj::collection::{Collection, DEFAULT_BATCH_SIZE};
use crate::obj::entry_points::EntryPoints;
use crate::obj::persistent::{DATA_TICKET, FORMAT, Persistent, STORAGE_ID};
use crate::obj::type_cache;
use crate::obj::type_info::TypeInfo;
use crate::obj::typed_object::{ObjectReader, TypedObject, parse_type_stream};
use crate::rpc::messages::{SEVERITY_ERROR, ServerError, ServerMessage};
use crate::rpc::{self, commands, KnownCommand, ResultShape, ReturnKind};

const NETWISE_VERSION: i64 = 3;
const NETWISE_RELEASE: i64 = 5;
const NETWISE_INUMBER: i64 = 769;

/// Payload of an APPLY-family request.
#[derive(Debug, Clone, Default)]
pub enum ApplyBody {
    #[default]
    None,
    Object(Box<TypedObject>),
    Raw(String),
}

impl ApplyBody {
    pub fn object(obj: TypedObject) -> Self {
        Self::Object(Box::new(obj))
    }
}

/// Accumulated first item of an RPC reply (continuation pieces append).
#[derive(Debug, Clone, Default)]
pub enum ReplyData {
    #[default]
    None,
    Int(i64),
    Bytes(Vec<u8>),
    IntArray(Vec<i64>),
}

/// Decoded RPC reply: the data item plus the opcode-specific flags.
#[derive(Debug, Default)]
pub struct RpcReply {
    pub data: ReplyData,
    pub oob: i64,
    pub collection: Option<i64>,
    pub persistent: bool,
    pub may_be_more: Option<bool>,
    pub record_count: Option<i64>,
}

impl RpcReply {
    pub fn data_bytes(&self) -> Bytes {
        match &self.data {
            ReplyData::Bytes(b) => Bytes::copy_from_slice(b),
            _ => Bytes::new(),
        }
    }

    pub fn data_int(&self) -> Result<i64> {
        match &self.data {
            ReplyData::Int(v) => Ok(*v),
            ReplyData::Bytes(b) => String::from_utf8_lossy(b)
                .trim()
                .parse()
                .context("integer reply expected"),
            other => bail!("integer reply expected, got {other:?}"),
        }
    }

    pub fn data_string(&self) -> String {
        match &self.data {
            ReplyData::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            ReplyData::Int(v) => v.to_string(),
            _ => String::new(),
        }
    }
}

/// Result of the dynamic `call` surface.
#[derive(Debug)]
pub enum CallOutcome {
    Long(i64),
    Bool(bool),
    Id(String),
    Str(String),
    Double(f64),
    Time(Option<i64>),
    Object(Box<TypedObject>),
    Persistent(Box<Persistent>),
    Collection(Box<Collection>),
    None,
}

/// Server-driven cursor over a content stream opened with MAKE_PULLER.
#[derive(Debug)]
pub struct Puller {
    handle: i64,
    index: i64,
    block_rpc: i64,
    finished: bool,
}

impl Puller {
    pub fn handle(&self) -> i64 {
        self.handle
    }

    /// Pull the next chunk; `None` after the server flagged the last one.
    pub async fn next_chunk(&mut self, session: &mut DocbaseClient) -> Result<Option<Vec<u8>>> {
        if self.finished {
            return Ok(None);
        }
        let mut resp = session
            .net
            .request_download(self.block_rpc, &[Arg::Int(self.handle), Arg::Int(self.index)])
            .await?;
        let length = resp.next_int()?;
        let last = resp.next_int()? == 1;
        let data = resp.next_bytes()?;
        if length == 0 && !last {
            bail!("puller is closed");
        }
        ensure!(
            length as usize == data.len(),
            "invalid content size: declared {length}, got {}",
            data.len()
        );
        self.index += 1;
        if last {
            self.finished = true;
        }
        Ok(Some(data))
    }
}

pub struct DocbaseClient {
    net: Netwise,
    docbaseid: i64,
    username: Option<String>,
    password: Option<String>,
    identity: Option<Identity>,
    ser_version_override: Option<i64>,
    locale: LocaleConfig,
    batch_hint: i64,

    session: String,
    ser_version: i64,
    iso8601_time: bool,
    closed: bool,

    entrypoints: HashMap<String, i64>,
    known: HashMap<String, KnownCommand>,
    collections: HashMap<i64, Arc<AtomicBool>>,
    messages: Vec<ServerMessage>,
    reading_messages: bool,

    docbase_config: Option<TypedObject>,
    server_config: Option<TypedObject>,
}

impl DocbaseClient {
    /// Run the whole startup sequence: resolve the docbase id when unknown,
    /// open the session, fetch entry points, negotiate the locale and
    /// authenticate when credentials are configured.
    pub async fn connect(cfg: &Config) -> Result<Self> {
        let endpoint = Endpoint {
            host: cfg.connection.host.clone(),
            port: cfg.connection.port,
            secure: cfg.connection.secure,
        };
        let net = Netwise::new(
            endpoint,
            NETWISE_VERSION,
            NETWISE_RELEASE,
            NETWISE_INUMBER,
            cfg.connection.timeout(),
        );

        let identity = if cfg.docbase.trusted {
            let hostname = cfg
                .docbase
                .hostname
                .clone()
                .or_else(|| std::env::var("HOSTNAME").ok())
                .unwrap_or_else(|| "localhost".to_string());
            Some(Identity::trusted_without_signer(&hostname))
        } else {
            None
        };

        let mut client = Self {
            net,
            docbaseid: cfg.docbase.docbaseid,
            username: cfg.docbase.username.clone(),
            password: cfg.docbase.password.clone(),
            identity,
            ser_version_override: cfg.docbase.ser_version,
            locale: cfg.locale.clone(),
            batch_hint: cfg.runtime.batch_hint,
            session: NULL_ID.to_string(),
            ser_version: 0,
            iso8601_time: false,
            closed: false,
            entrypoints: HashMap::new(),
            known: HashMap::new(),
            collections: HashMap::new(),
            messages: Vec::new(),
            reading_messages: false,
            docbase_config: None,
            server_config: None,
        };

        if client.docbaseid < 0 {
            client.resolve_docbase_id().await?;
        }
        client.open_session().await?;
        client.fetch_entry_points().await?;
        client.negotiate_locale().await?;
        if client.can_authenticate() {
            client.authenticate().await?;
        }
        Ok(client)
    }

    pub fn mode(&self) -> WireMode {
        WireMode {
            ser_version: self.ser_version,
            iso8601_time: self.iso8601_time,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session
    }

    pub fn docbaseid(&self) -> i64 {
        self.docbaseid
    }

    pub fn entrypoints(&self) -> &HashMap<String, i64> {
        &self.entrypoints
    }

    pub fn docbase_config(&self) -> Option<&TypedObject> {
        self.docbase_config.as_ref()
    }

    pub fn server_config(&self) -> Option<&TypedObject> {
        self.server_config.as_ref()
    }

    /// Cancelling the token closes down all I/O; the session is then dead
    /// for good (there is no transparent reconnect).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.net.cancellation_token()
    }

    pub fn set_identity(&mut self, identity: Identity) {
        self.identity = Some(identity);
    }

    fn has_session(&self) -> bool {
        self.session != NULL_ID
    }

    fn new_session_args(&self) -> Vec<Arg> {
        vec![
            Arg::Int(self.docbaseid),
            Arg::Str(String::new()),
            Arg::Str(rpc::CLIENT_VERSION_STRING.to_string()),
            Arg::Str(String::new()),
            Arg::IntArray(rpc::client_version_array()),
            Arg::Str(NULL_ID.to_string()),
        ]
    }

    /// Ask the server which docbase id it expects: connect with id −1, parse
    /// the rejection reason, drop the connection.
    async fn resolve_docbase_id(&mut self) -> Result<()> {
        self.docbaseid = -1;
        let mut resp = self
            .net
            .request(rpc::RPC_NEW_SESSION_BY_ADDR, &self.new_session_args())
            .await?;
        let reason = resp.next_string()?;
        self.net.disconnect().await;

        let id = parse_expected_docbase_id(&reason)
            .with_context(|| format!("cannot resolve docbase id from reason {reason:?}"))?;
        info!(docbaseid = id, "resolved docbase id");
        self.docbaseid = id;
        Ok(())
    }

    /// NEW_SESSION_BY_ADDR handshake: pick the serialization version from
    /// slot 7 of the server version array and the ISO-8601 time mode from
    /// slot 9, then adopt the session token.
    async fn open_session(&mut self) -> Result<()> {
        let mut resp = self
            .net
            .request(rpc::RPC_NEW_SESSION_BY_ADDR, &self.new_session_args())
            .await?;
        let reason = resp.next_string()?;
        let server_version = resp.next_int_array()?;

        self.ser_version = if server_version.get(7).copied()
            == Some(rpc::DM_CLIENT_SERIALIZATION_VERSION_HINT)
        {
            rpc::DM_CLIENT_SERIALIZATION_VERSION_HINT
        } else {
            0
        };
        if let Some(forced) = self.ser_version_override {
            self.ser_version = forced;
        }
        self.iso8601_time = self.ser_version == 2
            && server_version.get(9).is_some_and(|flags| flags & 0x01 == 0);

        let session = resp.next_string()?;
        if session == NULL_ID {
            bail!(ServerError { text: reason });
        }
        debug!(
            ser_version = self.ser_version,
            iso8601 = self.iso8601_time,
            "session opened"
        );
        self.session = session;
        Ok(())
    }

    /// Seed the table with the two methods every server understands, ask
    /// for the real table, then rebuild the known-command registry from
    /// what is actually advertised.
    async fn fetch_entry_points(&mut self) -> Result<()> {
        self.entrypoints = HashMap::from([
            ("ENTRY_POINTS".to_string(), 0),
            ("GET_ERRORS".to_string(), 558),
        ]);
        self.register_known_commands();

        let table = self.entry_points().await?;
        self.entrypoints = table.methods().clone();
        self.register_known_commands();
        Ok(())
    }

    fn register_known_commands(&mut self) {
        self.known = rpc::KNOWN_COMMANDS
            .iter()
            .filter(|c| self.entrypoints.contains_key(c.command))
            .map(|c| (c.command.to_string(), *c))
            .collect();
    }

    pub async fn entry_points(&mut self) -> Result<EntryPoints> {
        let reply = self
            .apply_plain(rpc::RPC_APPLY_FOR_OBJECT, NULL_ID, "ENTRY_POINTS", ApplyBody::None)
            .await?;
        EntryPoints::parse(reply.data_bytes()).map_err(Into::into)
    }

    /// SET_LOCALE with the configured charset; on a translator complaint
    /// retry once with UTF-8 before giving up.
    async fn negotiate_locale(&mut self) -> Result<()> {
        let charset = self.locale.charset;
        match self.set_locale(charset).await {
            Ok(_) => Ok(()),
            Err(e) => {
                let translator_missing = e
                    .downcast_ref::<ServerError>()
                    .is_some_and(|s| s.text.starts_with("[DM_SESSION_E_NO_TRANSLATOR]"));
                if !translator_missing || charset == default_charset() {
                    return Err(e);
                }
                warn!(charset, "charset rejected by server, falling back to UTF-8");
                self.set_locale(default_charset()).await.map(|_| ())
            }
        }
    }

    pub async fn set_locale(&mut self, charset: i64) -> Result<bool> {
        let obj = commands::set_locale(self.mode(), &self.locale, charset);
        self.apply_for_bool(NULL_ID, "SET_LOCALE", ApplyBody::object(obj))
            .await
    }

    fn can_authenticate(&self) -> bool {
        if self.username.is_none() {
            return false;
        }
        if self.identity.as_ref().is_some_and(|i| i.trusted) {
            return true;
        }
        self.password.is_some()
    }

    /// AUTHENTICATE_USER with the stored credentials; on success the
    /// docbase and server config objects are fetched as the original does.
    pub async fn authenticate(&mut self) -> Result<()> {
        ensure!(self.can_authenticate(), "can't perform authentication");
        let username = self.username.clone().unwrap_or_default();
        let password = self.password.clone().unwrap_or_default();
        let obfuscated = if password.is_empty() {
            String::new()
        } else {
            obfuscate(&password)
        };
        let trusted = self.identity.as_ref().is_some_and(|i| i.trusted);
        let auth_data = match &self.identity {
            Some(identity) => identity.auth_data()?,
            None => None,
        };

        let obj = commands::authenticate_user(
            self.mode(),
            &username,
            &obfuscated,
            trusted,
            auth_data.as_deref(),
        );
        let result = self
            .apply_for_object(NULL_ID, "AUTHENTICATE_USER", ApplyBody::object(obj))
            .await?
            .context("empty AUTHENTICATE_USER reply")?;
        if result.int("RETURN_VALUE") != Some(1) {
            bail!("unable to authenticate");
        }

        let docbase_config = self.get_docbase_config().await?;
        self.docbase_config = docbase_config;
        let server_config = self.get_server_config().await?;
        self.server_config = server_config;
        Ok(())
    }

    /// Swap credentials on the live connection and authenticate again. The
    /// entry-point table is re-fetched afterwards.
    pub async fn reauthenticate(
        &mut self,
        username: &str,
        password: Option<&str>,
        identity: Option<Identity>,
    ) -> Result<()> {
        self.username = Some(username.to_string());
        if let Some(password) = password {
            self.password = Some(password.to_string());
        }
        if let Some(identity) = identity {
            self.identity = Some(identity);
        }
        self.authenticate().await?;
        self.fetch_entry_points().await
    }

    /// Close every live collection, tell the server the session is over,
    /// drop the transport and nil the token. Safe to call twice.
    pub async fn disconnect(&mut self) -> Result<()> {
        let ids: Vec<i64> = self.collections.keys().copied().collect();
        for id in ids {
            if let Err(e) = self.close_collection(id).await {
                debug!(collection = id, "close on disconnect failed: {e:#}");
            }
            if let Some(flag) = self.collections.remove(&id) {
                flag.store(true, Ordering::Release);
            }
        }
        if self.has_session() {
            let args = vec![Arg::Str(self.session.clone())];
            if let Err(e) = self.net.send_only(rpc::RPC_CLOSE_SESSION, &args).await {
                debug!("close session failed: {e:#}");
            }
            self.net.disconnect().await;
            self.session = NULL_ID.to_string();
        }
        self.closed = true;
        Ok(())
    }

    fn with_session(&self, mut args: Vec<Arg>) -> Vec<Arg> {
        if self.has_session() {
            let already =
                matches!(args.first(), Some(Arg::Str(first)) if *first == self.session);
            if !already {
                args.insert(0, Arg::Str(self.session.clone()));
            }
        }
        args
    }

    /// The request/response pump: issue the RPC, decode the opcode-specific
    /// reply shape, honor the trailing OOB byte (pending messages, piece
    /// continuation) and turn server-flagged failures into errors.
    pub async fn rpc(&mut self, rpc_id: i64, args: Vec<Arg>) -> Result<RpcReply> {
        ensure!(!self.closed, "session is closed");
        let args = self.with_session(args);
        let mut resp = self.net.request(rpc_id, &args).await?;

        let mut reply = RpcReply {
            data: match resp.next()? {
                Some(Item::Int(v)) => ReplyData::Int(v),
                Some(Item::Bytes(b)) => ReplyData::Bytes(b),
                Some(Item::IntArray(a)) => ReplyData::IntArray(a),
                None => ReplyData::None,
            },
            ..RpcReply::default()
        };

        let mut valid: Option<bool> = None;
        match rpc_id {
            rpc::RPC_APPLY_FOR_OBJECT => {
                valid = Some(resp.next_int()? > 0);
                reply.persistent = resp.next_int()? > 0;
            }
            rpc::RPC_APPLY => {
                let collection = resp.next_int()?;
                reply.collection = Some(collection);
                reply.persistent = resp.next_int()? > 0;
                reply.may_be_more = Some(resp.next_int()? > 0);
                valid = Some(collection >= 0);
            }
            rpc::RPC_MULTI_NEXT => {
                reply.record_count = Some(resp.next_int()?);
                reply.may_be_more = Some(resp.next_int()? > 0);
                valid = Some(resp.next_int()? > 0);
            }
            rpc::RPC_CLOSE_COLLECTION | rpc::RPC_GET_NEXT_PIECE => {}
            _ => {
                valid = Some(resp.next_int()? > 0);
            }
        }
        reply.oob = resp.next_int()?;

        let has_messages = reply.oob & 0x02 != 0;
        if has_messages {
            self.fetch_messages_boxed().await?;
        }
        if has_messages && !self.messages.is_empty() {
            let reason = self.take_messages(SEVERITY_ERROR);
            self.log_informational();
            if let Some(text) = reason {
                return Err(ServerError { text }.into());
            }
        } else if valid == Some(false) {
            bail!("Unknown error");
        }

        // fragmented reply: append the continuation piece(s)
        if reply.oob == 0x10 || (reply.oob == 0x01 && rpc_id == rpc::RPC_GET_NEXT_PIECE) {
            let piece = Box::pin(self.rpc(rpc::RPC_GET_NEXT_PIECE, Vec::new())).await?;
            if let (ReplyData::Bytes(data), ReplyData::Bytes(more)) =
                (&mut reply.data, piece.data)
            {
                data.extend_from_slice(&more);
            }
        }

        Ok(reply)
    }

    fn fetch_messages_boxed(
        &mut self,
    ) -> std::pin::Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(self.fetch_messages())
    }

    /// Drain GET_ERRORS into the message buffer. The latch keeps the
    /// nested rpc calls from fetching messages recursively.
    async fn fetch_messages(&mut self) -> Result<()> {
        if self.reading_messages {
            return Ok(());
        }
        self.reading_messages = true;
        let result = self.fetch_messages_inner().await;
        self.reading_messages = false;
        result
    }

    async fn fetch_messages_inner(&mut self) -> Result<()> {
        let body = ApplyBody::object(commands::get_errors(self.mode()));
        let collection = self
            .apply_collection_with_batch(NULL_ID, "GET_ERRORS", body, DEFAULT_BATCH_SIZE)
            .await?;
        let Some(mut collection) = collection else {
            return Ok(());
        };
        while let Some(record) = collection.next_record(self).await? {
            if let Some(message) = ServerMessage::from_object(&record) {
                self.messages.push(message);
            }
        }
        Ok(())
    }

    /// Pop every message at or above the severity, newest first, joined
    /// into one text. `None` while the latch is held or nothing matches.
    fn take_messages(&mut self, severity: i64) -> Option<String> {
        if self.reading_messages || self.messages.is_empty() {
            return None;
        }
        let mut texts = Vec::new();
        let mut i = self.messages.len();
        while i > 0 {
            i -= 1;
            if self.messages[i].severity >= severity {
                texts.push(self.messages.remove(i).format());
            }
        }
        if texts.is_empty() {
            None
        } else {
            Some(texts.join("\n"))
        }
    }

    fn log_informational(&mut self) {
        if let Some(text) = self.take_messages(crate::rpc::messages::SEVERITY_INFORMATION) {
            debug!("server messages: {text}");
        }
    }

    fn method_opcode(&self, method: &str) -> Result<i64> {
        self.entrypoints
            .get(method)
            .copied()
            .with_context(|| format!("Unknown method: {method}"))
    }

    fn serialize_body(&self, object_id: &str, body: ApplyBody) -> Option<String> {
        match body {
            ApplyBody::Object(obj) => Some(obj.serialize()),
            ApplyBody::Raw(s) => Some(s),
            ApplyBody::None if object_id != NULL_ID => {
                Some(TypedObject::new(self.mode()).serialize())
            }
            ApplyBody::None => None,
        }
    }

    /// One APPLY-family exchange. Oversized arguments take the chunked
    /// path transparently.
    async fn apply_plain(
        &mut self,
        rpc_id: i64,
        object_id: &str,
        method: &str,
        body: ApplyBody,
    ) -> Result<RpcReply> {
        let object_id = if object_id.is_empty() { NULL_ID } else { object_id };
        let serialized = self.serialize_body(object_id, body);
        if serialized
            .as_ref()
            .is_some_and(|request| request.len() > rpc::MAX_REQUEST_LEN)
        {
            let request = serialized.unwrap_or_default();
            return self.apply_chunked(rpc_id, object_id, method, request).await;
        }
        let opcode = self.method_opcode(method)?;
        let args = vec![
            Arg::Int(opcode),
            Arg::Str(object_id.to_string()),
            Arg::Str(serialized.unwrap_or_default()),
        ];
        self.rpc(rpc_id, args).await
    }

    /// Transfer an oversized argument: flag the object as pushed, ship the
    /// pieces through APPLY_FOR_LONG, unflag, then issue the real call with
    /// the placeholder marker.
    async fn apply_chunked(
        &mut self,
        rpc_id: i64,
        object_id: &str,
        method: &str,
        request: String,
    ) -> Result<RpcReply> {
        let push_id = if object_id == NULL_ID {
            self.session.clone()
        } else {
            object_id.to_string()
        };
        self.set_push_object_status(&push_id, true).await?;

        let opcode = self.method_opcode(method)?;
        for part in request.as_bytes().chunks(rpc::MAX_REQUEST_LEN) {
            let args = vec![
                Arg::Int(opcode),
                Arg::Str(push_id.clone()),
                Arg::Str(String::from_utf8_lossy(part).into_owned()),
            ];
            self.rpc(rpc::RPC_APPLY_FOR_LONG, args).await?;
        }

        self.set_push_object_status(&push_id, false).await?;

        let args = vec![
            Arg::Int(opcode),
            Arg::Str(push_id),
            Arg::Str(rpc::CHUNKED_OBJ_MARKER.to_string()),
        ];
        self.rpc(rpc_id, args).await
    }

    pub async fn set_push_object_status(&mut self, object_id: &str, value: bool) -> Result<bool> {
        let obj = commands::set_push_object_status(self.mode(), object_id, value);
        let opcode = self.method_opcode("SET_PUSH_OBJECT_STATUS")?;
        let args = vec![
            Arg::Int(opcode),
            Arg::Str(NULL_ID.to_string()),
            Arg::Str(obj.serialize()),
        ];
        let reply = self.rpc(rpc::RPC_APPLY_FOR_BOOL, args).await?;
        Ok(reply.data_int()? == 1)
    }

    pub async fn apply_for_long(
        &mut self,
        object_id: &str,
        method: &str,
        body: ApplyBody,
    ) -> Result<i64> {
        self.apply_plain(rpc::RPC_APPLY_FOR_LONG, object_id, method, body)
            .await?
            .data_int()
    }

    pub async fn apply_for_bool(
        &mut self,
        object_id: &str,
        method: &str,
        body: ApplyBody,
    ) -> Result<bool> {
        let reply = self
            .apply_plain(rpc::RPC_APPLY_FOR_BOOL, object_id, method, body)
            .await?;
        Ok(reply.data_int()? == 1)
    }

    pub async fn apply_for_string(
        &mut self,
        object_id: &str,
        method: &str,
        body: ApplyBody,
    ) -> Result<String> {
        let reply = self
            .apply_plain(rpc::RPC_APPLY_FOR_STRING, object_id, method, body)
            .await?;
        Ok(reply.data_string())
    }

    pub async fn apply_for_id(
        &mut self,
        object_id: &str,
        method: &str,
        body: ApplyBody,
    ) -> Result<String> {
        let reply = self
            .apply_plain(rpc::RPC_APPLY_FOR_ID, object_id, method, body)
            .await?;
        Ok(reply.data_string())
    }

    pub async fn apply_for_double(
        &mut self,
        object_id: &str,
        method: &str,
        body: ApplyBody,
    ) -> Result<f64> {
        let reply = self
            .apply_plain(rpc::RPC_APPLY_FOR_DOUBLE, object_id, method, body)
            .await?;
        reply
            .data_string()
            .trim()
            .parse()
            .context("double reply expected")
    }

    pub async fn apply_for_time(
        &mut self,
        object_id: &str,
        method: &str,
        body: ApplyBody,
    ) -> Result<Option<i64>> {
        let reply = self
            .apply_plain(rpc::RPC_APPLY_FOR_TIME, object_id, method, body)
            .await?;
        parse_time(reply.data_string().trim()).map_err(Into::into)
    }

    pub async fn apply_for_object(
        &mut self,
        object_id: &str,
        method: &str,
        body: ApplyBody,
    ) -> Result<Option<TypedObject>> {
        let reply = self
            .apply_plain(rpc::RPC_APPLY_FOR_OBJECT, object_id, method, body)
            .await?;
        let data = reply.data_bytes();
        if data.is_empty() {
            return Ok(None);
        }
        if reply.persistent {
            let persistent = Box::pin(self.parse_persistent(data)).await?;
            return Ok(Some(persistent.obj));
        }
        Ok(Some(TypedObject::parse(data, self.mode())?))
    }

    pub async fn apply_collection(
        &mut self,
        object_id: &str,
        method: &str,
        body: ApplyBody,
    ) -> Result<Option<Collection>> {
        let batch = match &body {
            ApplyBody::Object(obj) => obj.int("BATCH_HINT").unwrap_or(self.batch_hint),
            _ => self.batch_hint,
        };
        self.apply_collection_with_batch(object_id, method, body, batch)
            .await
    }

    async fn apply_collection_with_batch(
        &mut self,
        object_id: &str,
        method: &str,
        body: ApplyBody,
        batch_size: i64,
    ) -> Result<Option<Collection>> {
        let reply = self
            .apply_plain(rpc::RPC_APPLY, object_id, method, body)
            .await?;
        self.build_collection(reply, batch_size).await
    }

    async fn build_collection(
        &mut self,
        reply: RpcReply,
        batch_size: i64,
    ) -> Result<Option<Collection>> {
        let data = reply.data_bytes();
        if data.is_empty() {
            return Ok(None);
        }
        let collection_id = reply.collection.context("reply carries no collection id")?;
        let mode = self.mode();

        let (type_info, buffer) = if reply.persistent {
            let mut reader = ObjectReader::new(data, mode);
            let type_name = reader.next_token()?;
            let type_info = self.get_type(&type_name, 0).await?;
            (Some(type_info), reader.into_remaining())
        } else {
            let mut reader = ObjectReader::new(data, mode);
            reader.read_ser_version_header()?;
            let type_info = reader.read_type_descriptor()?;
            type_cache::add(type_info.clone());
            (Some(type_info), reader.into_remaining())
        };

        let closed = Arc::new(AtomicBool::new(false));
        self.collections.insert(collection_id, closed.clone());
        Ok(Some(Collection::new(
            collection_id,
            type_info,
            buffer,
            batch_size,
            reply.record_count,
            reply.may_be_more,
            reply.persistent,
            mode,
            closed,
        )))
    }

    pub(crate) async fn next_batch(&mut self, collection: i64, batch_hint: i64) -> Result<RpcReply> {
        self.rpc(
            rpc::RPC_MULTI_NEXT,
            vec![Arg::Int(collection), Arg::Int(batch_hint)],
        )
        .await
    }

    pub(crate) async fn close_collection(&mut self, collection: i64) -> Result<()> {
        self.rpc(rpc::RPC_CLOSE_COLLECTION, vec![Arg::Int(collection)])
            .await?;
        if let Some(flag) = self.collections.remove(&collection) {
            flag.store(true, Ordering::Release);
        }
        Ok(())
    }

    /// Parse a persistent-object stream, fetching its type first.
    pub async fn parse_persistent(&mut self, buf: Bytes) -> Result<Persistent> {
        let mode = self.mode();
        let mut reader = ObjectReader::new(buf, mode);
        reader.read_ser_version_header()?;
        let (type_name, stamp) = reader.read_persistent_type_header()?;
        let type_info = self.get_type(&type_name, stamp).await?;
        let attrs = reader.read_object(&type_info)?;
        let mut obj = TypedObject::with_type(type_info, mode);
        for attr in attrs {
            obj.add(attr);
        }
        Ok(Persistent::from_object(obj))
    }

    /// Type by name: the process-wide cache first, then FETCH_TYPE.
    pub async fn get_type(&mut self, name: &str, vstamp: i64) -> Result<TypeInfo> {
        if let Some(cached) = type_cache::get(name) {
            return Ok(cached);
        }
        let data = if self.entrypoints.contains_key("FETCH_TYPE") {
            let body = ApplyBody::object(commands::fetch_type(self.mode(), name, vstamp));
            let obj = Box::pin(self.apply_for_object(NULL_ID, "FETCH_TYPE", body))
                .await?
                .with_context(|| format!("empty FETCH_TYPE reply for {name}"))?;
            let result = obj
                .string("result")
                .with_context(|| format!("FETCH_TYPE reply for {name} carries no result"))?;
            Bytes::from(result.into_bytes())
        } else {
            self.rpc(rpc::RPC_FETCH_TYPE, vec![Arg::Str(name.to_string())])
                .await?
                .data_bytes()
        };
        let last = parse_type_stream(data, self.mode())?;
        type_cache::get(name)
            .or(last)
            .with_context(|| format!("type {name} missing from FETCH_TYPE stream"))
    }

    /// DQL query returning a collection cursor.
    pub async fn execute(
        &mut self,
        query: &str,
        for_update: bool,
        batch_hint: i64,
        bof_dql: bool,
    ) -> Result<Collection> {
        let body =
            ApplyBody::object(commands::execute(self.mode(), query, for_update, batch_hint, bof_dql));
        self.apply_collection(NULL_ID, "EXEC", body)
            .await?
            .context("query produced no collection")
    }

    pub async fn query(&mut self, query: &str) -> Result<Collection> {
        let batch_hint = self.batch_hint;
        self.execute(query, false, batch_hint, false)
            .await
            .with_context(|| format!("error occurred while executing query: {query}"))
    }

    /// Load an object by id; `None` when the server returns nothing.
    pub async fn fetch(&mut self, object_id: &str) -> Result<Option<Persistent>> {
        let reply = self
            .apply_plain(rpc::RPC_APPLY_FOR_OBJECT, object_id, "FETCH", ApplyBody::None)
            .await?;
        let data = reply.data_bytes();
        if data.is_empty() {
            return Ok(None);
        }
        let persistent = Box::pin(self.parse_persistent(data)).await?;
        Ok(Some(persistent))
    }

    pub async fn get_object(&mut self, object_id: &str) -> Result<Persistent> {
        self.fetch(object_id)
            .await?
            .with_context(|| format!("unable to fetch object with id {object_id}"))
    }

    /// First object matching `select r_object_id from <qualification>`.
    pub async fn get_by_qualification(&mut self, qualification: &str) -> Result<Option<Persistent>> {
        let mut collection = self
            .query(&format!("select r_object_id from {qualification}"))
            .await?;
        let record = collection.next_record(self).await;
        collection.close(self).await;
        match record? {
            Some(record) => {
                let id = record.string("r_object_id").context("no r_object_id")?;
                Ok(Some(self.get_object(&id).await?))
            }
            None => Ok(None),
        }
    }

    pub async fn get_docbase_config(&mut self) -> Result<Option<TypedObject>> {
        let body = ApplyBody::object(commands::docbase_config(self.mode()));
        self.apply_for_object(NULL_ID, "GET_DOCBASE_CONFIG", body).await
    }

    pub async fn get_server_config(&mut self) -> Result<Option<TypedObject>> {
        let body = ApplyBody::object(commands::server_config(self.mode()));
        self.apply_for_object(NULL_ID, "GET_SERVER_CONFIG", body).await
    }

    pub async fn server_version(&mut self) -> Result<String> {
        self.apply_for_string(NULL_ID, "SERVER_VERSION", ApplyBody::None)
            .await
    }

    pub async fn encrypt_password(&mut self, password: &str) -> Result<String> {
        let body = ApplyBody::object(commands::encrypt_password(self.mode(), &obfuscate(password)));
        self.apply_for_string(NULL_ID, "ENCRYPT_PASSWORD", body).await
    }

    pub async fn do_method(
        &mut self,
        method: &str,
        options: &commands::DoMethodOptions,
    ) -> Result<Option<TypedObject>> {
        let body = ApplyBody::object(commands::do_method(self.mode(), method, options));
        self.apply_for_object(NULL_ID, "DO_METHOD", body).await
    }

    /// Generic entry into the dynamic method surface: any server-advertised
    /// method by name. Known commands get their registered reply shape;
    /// unknown ones default to APPLY returning a collection.
    pub async fn call(
        &mut self,
        method: &str,
        object_id: Option<&str>,
        request: Option<TypedObject>,
    ) -> Result<CallOutcome> {
        ensure!(
            self.entrypoints.contains_key(method),
            "Unknown method: {method}"
        );
        let object_id = object_id.unwrap_or(NULL_ID);
        let body = match request {
            Some(obj) => ApplyBody::object(obj),
            None => ApplyBody::None,
        };
        let command = self.known.get(method).copied();
        let Some(command) = command else {
            return Ok(match self.apply_collection(object_id, method, body).await? {
                Some(collection) => CallOutcome::Collection(Box::new(collection)),
                None => CallOutcome::None,
            });
        };

        Ok(match command.returns {
            ReturnKind::Long => {
                CallOutcome::Long(self.apply_for_long(object_id, method, body).await?)
            }
            ReturnKind::Bool => {
                CallOutcome::Bool(self.apply_for_bool(object_id, method, body).await?)
            }
            ReturnKind::Id => CallOutcome::Id(self.apply_for_id(object_id, method, body).await?),
            ReturnKind::Str => {
                CallOutcome::Str(self.apply_for_string(object_id, method, body).await?)
            }
            ReturnKind::Double => {
                CallOutcome::Double(self.apply_for_double(object_id, method, body).await?)
            }
            ReturnKind::Time => {
                CallOutcome::Time(self.apply_for_time(object_id, method, body).await?)
            }
            ReturnKind::Object => {
                let reply = self
                    .apply_plain(rpc::RPC_APPLY_FOR_OBJECT, object_id, method, body)
                    .await?;
                let data = reply.data_bytes();
                if data.is_empty() {
                    CallOutcome::None
                } else if reply.persistent || command.shape == ResultShape::Persistent {
                    CallOutcome::Persistent(Box::new(
                        Box::pin(self.parse_persistent(data)).await?,
                    ))
                } else {
                    CallOutcome::Object(Box::new(TypedObject::parse(data, self.mode())?))
                }
            }
            ReturnKind::Collection => {
                match self.apply_collection(object_id, method, body).await? {
                    Some(collection) => CallOutcome::Collection(Box::new(collection)),
                    None => CallOutcome::None,
                }
            }
        })
    }

    // --- content streaming -------------------------------------------------

    pub async fn make_puller(
        &mut self,
        object_id: &str,
        store_id: &str,
        content_id: &str,
        format_id: &str,
        ticket: i64,
    ) -> Result<i64> {
        let obj = commands::make_puller(
            self.mode(),
            object_id,
            store_id,
            content_id,
            format_id,
            ticket,
            false,
            false,
            false,
        );
        let handle = self
            .apply_for_long(NULL_ID, "MAKE_PULLER", ApplyBody::object(obj))
            .await?;
        ensure!(handle != 0, "unable to make puller");
        Ok(handle)
    }

    pub async fn kill_puller(&mut self, handle: i64) -> Result<bool> {
        let obj = commands::kill_puller(self.mode(), handle);
        self.apply_for_bool(NULL_ID, "KILL_PULLER", ApplyBody::object(obj))
            .await
    }

    pub fn puller(&self, handle: i64) -> Puller {
        Puller {
            handle,
            index: 0,
            block_rpc: rpc::RPC_GET_BLOCK5,
            finished: false,
        }
    }

    /// Pull the whole stream into memory, always killing the puller on the
    /// way out (errors during the cleanup are swallowed).
    pub async fn download(&mut self, handle: i64) -> Result<Vec<u8>> {
        let mut puller = self.puller(handle);
        let mut out = Vec::new();
        let mut failure = None;
        loop {
            match puller.next_chunk(self).await {
                Ok(Some(chunk)) => out.extend_from_slice(&chunk),
                Ok(None) => break,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        if let Err(e) = self.kill_puller(handle).await {
            debug!(handle, "kill puller failed: {e:#}");
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(out),
        }
    }

    /// Content of a dmr_content object fetched by id.
    pub async fn get_content(&mut self, sysobj_id: &str, content: &Persistent) -> Result<Vec<u8>> {
        let store = content
            .obj
            .string(STORAGE_ID)
            .context("content object has no storage_id")?;
        let format = content
            .obj
            .string(FORMAT)
            .context("content object has no format")?;
        let ticket = content.obj.int(DATA_TICKET).unwrap_or(0);
        let handle = self
            .make_puller(sysobj_id, &store, content.object_id(), &format, ticket)
            .await?;
        self.download(handle).await
    }

    /// Server-driven upload: the server calls back with its own sequence
    /// and a chunk-size rpc; the client answers on that sequence until the
    /// stop code arrives, then finishes with an empty frame of its own.
    pub async fn upload(&mut self, handle: i64, data: &[u8]) -> Result<()> {
        ensure!(!self.closed, "session is closed");
        let args = self.with_session(vec![Arg::Int(handle)]);
        let mut callback = self.net.request_callback(rpc::RPC_DO_PUSH, &args).await?;
        let mut offset = 0usize;
        loop {
            if callback.rpc == rpc::RPC_STOP_PUSH {
                return self.net.finish_callback().await;
            }
            let size = rpc::chunk_size(callback.rpc).unwrap_or(0);
            let end = (offset + size).min(data.len());
            let chunk = &data[offset..end];
            let last = end == data.len();
            offset = end;
            callback = self
                .net
                .reply_callback(
                    callback.sequence,
                    &[
                        Arg::Int(chunk.len() as i64),
                        Arg::Int(i64::from(last)),
                        Arg::Raw(chunk.to_vec()),
                    ],
                )
                .await?;
        }
    }
}

/// Pull the expected id out of `Wrong docbase id: (-1) expecting: (<N>)`.
fn parse_expected_docbase_id(reason: &str) -> Option<i64> {
    let marker = "expecting: (";
    let start = reason.find(marker)? + marker.len();
    let rest = &reason[start..];
    let end = rest.find(')')?;
    rest[..end].parse().ok()
}

impl std::fmt::Debug for DocbaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocbaseClient")
            .field("net", &self.net)
            .field("docbaseid", &self.docbaseid)
            .field("session", &self.session)
            .field("ser_version", &self.ser_version)
            .field("collections", &self.collections.len())
            .finish()
    }
}
