// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Server-side result-set cursor. Records are parsed lazily out of the
//! batch buffer; when it runs dry and the server hinted at more, the next
//! batch is pulled with MULTI_NEXT. The cursor owns the right to close the
//! server-side collection exactly once.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use bytes::Bytes;
use tracing::debug;

use crate::client::docbase::DocbaseClient;
use crate::codec::ParserError;
use crate::obj::WireMode;
use crate::obj::type_info::TypeInfo;
use crate::obj::typed_object::{ObjectReader, TypedObject};

pub const DEFAULT_BATCH_SIZE: i64 = 20;

#[derive(Debug)]
pub struct Collection {
    id: Option<i64>,
    pub type_info: Option<TypeInfo>,
    buffer: Bytes,
    pub batch_size: i64,
    record_count: Option<i64>,
    may_be_more: Option<bool>,
    persistent: bool,
    mode: WireMode,
    closed: Arc<AtomicBool>,
}

impl Collection {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: i64,
        type_info: Option<TypeInfo>,
        buffer: Bytes,
        batch_size: i64,
        record_count: Option<i64>,
        may_be_more: Option<bool>,
        persistent: bool,
        mode: WireMode,
        closed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id: Some(id),
            type_info,
            buffer,
            batch_size,
            record_count,
            may_be_more,
            persistent,
            mode,
            closed,
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.id.is_none() || self.closed.load(Ordering::Acquire)
    }

    /// Pull the next row, fetching another batch when the local buffer is
    /// drained and the server left the door open. `None` means the cursor
    /// is exhausted (and has been closed server-side).
    pub async fn next_record(
        &mut self,
        session: &mut DocbaseClient,
    ) -> Result<Option<TypedObject>> {
        let Some(id) = self.id else {
            return Ok(None);
        };
        if self.closed.load(Ordering::Acquire) {
            return Ok(None);
        }

        if self.buffer.is_empty() && self.may_be_more.unwrap_or(true) {
            let reply = session.next_batch(id, self.batch_size).await?;
            self.buffer = reply.data_bytes();
            self.record_count = reply.record_count;
            self.may_be_more = reply.may_be_more;
            if self.mode.d6() && !self.buffer.is_empty() {
                let mut reader = ObjectReader::new(self.buffer.clone(), self.mode);
                reader.read_int()?;
                self.buffer = reader.into_remaining();
            }
        }

        if !self.buffer.is_empty() && self.record_count.is_none_or(|c| c > 0) {
            let entry = self.parse_entry()?;
            if let Some(count) = self.record_count.as_mut() {
                *count -= 1;
            }
            return Ok(Some(entry));
        }

        self.close(session).await;
        Ok(None)
    }

    fn parse_entry(&mut self) -> Result<TypedObject, ParserError> {
        let type_info = self
            .type_info
            .as_ref()
            .ok_or_else(|| ParserError::TypeMissing("collection".to_string()))?;
        let mut reader = ObjectReader::new(self.buffer.clone(), self.mode);
        if self.persistent && !self.mode.d6() {
            // legacy persistent batches repeat the type name per record
            reader.next_token()?;
        }
        let attrs = reader.read_object(type_info)?;
        if self.mode.d6() {
            reader.read_int()?;
            if self.persistent {
                reader.read_int()?;
            }
        }
        self.buffer = reader.into_remaining();

        let mut entry = TypedObject::with_type(type_info.clone(), self.mode);
        for attr in attrs {
            entry.add(attr);
        }
        Ok(entry)
    }

    /// Close the server-side cursor. Failures during teardown are logged
    /// and swallowed; the cursor is unusable either way.
    pub async fn close(&mut self, session: &mut DocbaseClient) {
        if let Some(id) = self.id.take() {
            if let Err(e) = session.close_collection(id).await {
                debug!(collection = id, "close collection failed: {e:#}");
            }
            self.closed.store(true, Ordering::Release);
        }
    }

    /// Drain the remaining records into memory.
    pub async fn drain(&mut self, session: &mut DocbaseClient) -> Result<Vec<TypedObject>> {
        let mut records = Vec::new();
        while let Some(record) = self.next_record(session).await? {
            records.push(record);
        }
        Ok(records)
    }
}
