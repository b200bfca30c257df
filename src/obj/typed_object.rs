// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The typed-object codec: one logical object shape, two wire encodings.
//!
//! Version 0 is the legacy whitespace-token text form. Version 2 ("D6")
//! prefixes the stream with the serialization version, keys attributes by
//! pseudo-base64 position instead of ordinal, and re-states the runtime
//! type of every attribute. Version 1 exists but shares the version-0 time
//! rules, so it is handled by the same paths.

use bytes::Bytes;

use crate::codec::text::{TokenStream, is_attribute_name};
use crate::codec::{NULL_ID, ParserError, REPEATING, SINGLE, ValueType, time};
use crate::obj::WireMode;
use crate::obj::attr_info::AttrInfo;
use crate::obj::attr_value::{AttrValue, Value};
use crate::obj::type_cache;
use crate::obj::type_info::TypeInfo;

/// Cursor over a typed-object stream, parameterized by the session's
/// negotiated wire mode.
pub struct ObjectReader {
    ts: TokenStream,
    mode: WireMode,
}

impl ObjectReader {
    pub fn new(buf: Bytes, mode: WireMode) -> Self {
        Self {
            ts: TokenStream::new(buf),
            mode,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ts.is_empty()
    }

    pub fn into_remaining(self) -> Bytes {
        self.ts.into_remaining()
    }

    pub fn read_int(&mut self) -> Result<i64, ParserError> {
        self.ts.read_int()
    }

    pub fn next_token(&mut self) -> Result<String, ParserError> {
        self.ts.next_token()
    }

    /// D6 streams open with the serialization version they were encoded
    /// with; anything else is a framing-level mixup.
    pub fn read_ser_version_header(&mut self) -> Result<(), ParserError> {
        if self.mode.d6() {
            let version = self.ts.read_int()?;
            if version != self.mode.ser_version {
                return Err(ParserError::SerVersionMismatch {
                    expected: self.mode.ser_version,
                    got: version,
                });
            }
        }
        Ok(())
    }

    /// `TYPE <name> <id> [vstamp version cache] <super> [sharedParent
    /// aspectName aspectShareFlag]` followed by the attribute blocks.
    pub fn read_type_descriptor(&mut self) -> Result<TypeInfo, ParserError> {
        let header = self.ts.next_token()?;
        if header != "TYPE" {
            return Err(ParserError::InvalidHeader {
                expected: "TYPE",
                got: header,
            });
        }

        let name = self.ts.next_validated(is_attribute_name, "type name")?;
        let id = self.ts.next_validated(is_attribute_name, "type id")?;
        let (vstamp, version, cache) = if self.mode.d6() {
            (
                Some(self.ts.read_int()?),
                Some(self.ts.read_int()?),
                Some(self.ts.read_int()?),
            )
        } else {
            (None, None, None)
        };
        let super_name = self.ts.next_validated(is_attribute_name, "super name")?;
        let (shared_parent, aspect_name, aspect_share_flag) = if self.mode.d6() {
            (
                Some(self.ts.next_validated(is_attribute_name, "shared parent")?),
                Some(self.ts.next_validated(is_attribute_name, "aspect name")?),
                self.ts.read_boolean()?,
            )
        } else {
            (None, None, false)
        };

        let mut type_info = TypeInfo::new(
            name,
            id,
            vstamp,
            version,
            cache,
            super_name,
            shared_parent,
            aspect_name,
            aspect_share_flag,
            self.mode.ser_version,
        );

        let count = self.ts.read_int()?;
        for _ in 0..count {
            let attr = self.read_attr_info()?;
            type_info.append(attr)?;
        }
        Ok(type_info)
    }

    fn read_attr_info(&mut self) -> Result<AttrInfo, ParserError> {
        let position = if self.mode.d6() {
            self.ts.read_base64_int()?
        } else {
            -1
        };
        let name = self.ts.next_validated(is_attribute_name, "attribute name")?;
        let attr_type = self.ts.read_type_marker()?;
        let repeating = self.ts.read_repeating_marker()?;
        let length = self.ts.read_int()?;
        let restriction = if self.mode.d6() {
            Some(self.ts.read_int()?)
        } else {
            None
        };
        Ok(AttrInfo {
            position,
            name,
            attr_type,
            repeating,
            length,
            restriction,
        })
    }

    /// `OBJ <typename> ...` plus the schema-driven attribute blocks and the
    /// self-describing extended trailer.
    pub fn read_object(&mut self, type_info: &TypeInfo) -> Result<Vec<AttrValue>, ParserError> {
        let header = self.ts.next_token()?;
        if header != "OBJ" {
            return Err(ParserError::InvalidHeader {
                expected: "OBJ",
                got: header,
            });
        }
        let type_name = self.ts.next_token()?;
        if type_name.is_empty() {
            return Err(ParserError::InvalidHeader {
                expected: "type name",
                got: type_name,
            });
        }
        if self.mode.d6() {
            self.ts.read_int()?;
            self.ts.read_int()?;
            self.ts.read_int()?;
        }
        if type_name != type_info.name {
            return Err(ParserError::TypeMissing(type_name));
        }

        let count = self.ts.read_int()?;
        let mut attrs = Vec::with_capacity(count as usize);
        for index in 0..count {
            attrs.push(self.read_attr(index, type_info)?);
        }
        self.read_extended_attrs(&mut attrs)?;
        Ok(attrs)
    }

    fn read_attr(&mut self, index: i64, type_info: &TypeInfo) -> Result<AttrValue, ParserError> {
        let position = if self.mode.d6() {
            self.ts.read_base64_int()?
        } else {
            index
        };
        let info = type_info
            .get(position)
            .ok_or(ParserError::UnknownAttribute(position))?;

        let mut repeating = info.repeating;
        let mut attr_type = info.attr_type;
        if self.mode.ser_version == 2 {
            repeating = self.ts.read_repeating_marker()?;
            // the runtime type wins; UNDEFINED schema slots get specialized
            if let Some(t) = ValueType::from_wire_id(self.ts.read_int()?) {
                attr_type = t;
            }
        }

        let values = self.read_values(attr_type, repeating)?;
        Ok(AttrValue {
            name: info.name.clone(),
            attr_type,
            length: info.length,
            repeating,
            values,
            extended: false,
        })
    }

    fn read_extended_attrs(&mut self, out: &mut Vec<AttrValue>) -> Result<(), ParserError> {
        let count = self.ts.read_int()?;
        for _ in 0..count {
            let name = self.ts.next_validated(is_attribute_name, "attribute name")?;
            let attr_type = self.ts.read_type_marker()?;
            let repeating = self.ts.next_token()? == REPEATING;
            let length = self.ts.read_int()?;
            let values = self.read_values(attr_type, repeating)?;
            out.push(AttrValue {
                name,
                attr_type,
                length,
                repeating,
                values,
                extended: true,
            });
        }
        Ok(())
    }

    fn read_values(
        &mut self,
        attr_type: ValueType,
        repeating: bool,
    ) -> Result<Vec<Value>, ParserError> {
        if !repeating {
            return Ok(vec![self.read_value(attr_type)?]);
        }
        let count = self.ts.read_int()?;
        let mut values = Vec::with_capacity(count as usize);
        for _ in 0..count {
            values.push(self.read_value(attr_type)?);
        }
        Ok(values)
    }

    pub(crate) fn read_value(&mut self, attr_type: ValueType) -> Result<Value, ParserError> {
        Ok(match attr_type {
            ValueType::Bool => Value::Bool(self.ts.read_boolean()?),
            ValueType::Int => Value::Int(self.ts.read_int()?),
            ValueType::String => {
                Value::String(String::from_utf8_lossy(&self.ts.read_string()?).into_owned())
            }
            ValueType::Id => Value::Id(self.ts.next_token()?),
            ValueType::Time => Value::Time(self.ts.read_time()?),
            ValueType::Double => Value::Double(self.ts.read_double()?),
            ValueType::Undefined => Value::Undefined(self.ts.next_token()?),
        })
    }

    /// Header of a persistent-object stream: the type name, the ignored
    /// type id, and the D6 cache stamp. The descriptor itself is fetched
    /// separately (cache or FETCH_TYPE).
    pub fn read_persistent_type_header(&mut self) -> Result<(String, i64), ParserError> {
        let name = self.ts.next_validated(is_attribute_name, "type name")?;
        self.ts.next_validated(is_attribute_name, "type id")?;
        let stamp = if self.mode.d6() { self.ts.read_int()? } else { 0 };
        Ok((name, stamp))
    }
}

/// An entity instance: a type reference plus named attribute values.
#[derive(Debug, Clone, Default)]
pub struct TypedObject {
    pub type_info: Option<TypeInfo>,
    attrs: Vec<AttrValue>,
    pub mode: WireMode,
}

impl TypedObject {
    pub fn new(mode: WireMode) -> Self {
        Self {
            type_info: None,
            attrs: Vec::new(),
            mode,
        }
    }

    pub fn with_type(type_info: TypeInfo, mode: WireMode) -> Self {
        Self {
            type_info: Some(type_info),
            attrs: Vec::new(),
            mode,
        }
    }

    /// Parse a full `TYPE` + `OBJ` stream. The descriptor is registered in
    /// the process-wide type cache as a side effect.
    pub fn parse(buf: Bytes, mode: WireMode) -> Result<Self, ParserError> {
        if buf.is_empty() {
            return Err(ParserError::EmptyData);
        }
        let mut reader = ObjectReader::new(buf, mode);
        reader.read_ser_version_header()?;
        let type_info = reader.read_type_descriptor()?;
        type_cache::add(type_info.clone());
        let attrs = reader.read_object(&type_info)?;
        let mut obj = Self::with_type(type_info, mode);
        for attr in attrs {
            obj.add(attr);
        }
        Ok(obj)
    }

    /// Add or replace an attribute by name.
    pub fn add(&mut self, value: AttrValue) {
        if let Some(existing) = self.attrs.iter_mut().find(|a| a.name == value.name) {
            *existing = value;
        } else {
            self.attrs.push(value);
        }
    }

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.iter().find(|a| a.name == name)
    }

    pub fn attrs(&self) -> &[AttrValue] {
        &self.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut [AttrValue] {
        &mut self.attrs
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    fn set(&mut self, name: &str, value: Value) {
        if let Some(existing) = self.attrs.iter_mut().find(|a| a.name == name) {
            existing.values = vec![value];
            return;
        }
        self.attrs.push(AttrValue::single(name, value));
    }

    fn append(&mut self, name: &str, attr_type: ValueType, mut values: Vec<Value>) {
        if let Some(existing) = self.attrs.iter_mut().find(|a| a.name == name) {
            existing.values.append(&mut values);
            return;
        }
        self.attrs.push(AttrValue::repeating(name, attr_type, values));
    }

    pub fn set_string(&mut self, name: &str, value: &str) {
        self.set(name, Value::String(value.to_string()));
    }

    pub fn set_id(&mut self, name: &str, value: &str) {
        self.set(name, Value::Id(value.to_string()));
    }

    pub fn set_int(&mut self, name: &str, value: i64) {
        self.set(name, Value::Int(value));
    }

    pub fn set_bool(&mut self, name: &str, value: bool) {
        self.set(name, Value::Bool(value));
    }

    pub fn set_double(&mut self, name: &str, value: f64) {
        self.set(name, Value::Double(value));
    }

    pub fn set_time(&mut self, name: &str, value: Option<i64>) {
        self.set(name, Value::Time(value));
    }

    pub fn append_string(&mut self, name: &str, value: &str) {
        self.append(name, ValueType::String, vec![Value::String(value.to_string())]);
    }

    pub fn append_int(&mut self, name: &str, value: i64) {
        self.append(name, ValueType::Int, vec![Value::Int(value)]);
    }

    pub fn append_ints(&mut self, name: &str, values: &[i64]) {
        self.append(
            name,
            ValueType::Int,
            values.iter().map(|v| Value::Int(*v)).collect(),
        );
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.get(name).and_then(AttrValue::first)
    }

    /// First value rendered as text, whatever its type.
    pub fn string(&self, name: &str) -> Option<String> {
        self.value(name).map(ToString::to_string)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.value(name).and_then(Value::as_int)
    }

    pub fn boolean(&self, name: &str) -> Option<bool> {
        self.value(name).and_then(Value::as_bool)
    }

    pub fn double(&self, name: &str) -> Option<f64> {
        self.value(name).and_then(Value::as_double)
    }

    pub fn time(&self, name: &str) -> Option<Option<i64>> {
        self.value(name).and_then(Value::as_time)
    }

    pub fn id(&self, name: &str) -> Option<&str> {
        self.value(name).and_then(Value::as_str)
    }

    pub fn strings(&self, name: &str) -> Vec<String> {
        self.get(name)
            .map(|a| a.values.iter().map(ToString::to_string).collect())
            .unwrap_or_default()
    }

    pub fn ints(&self, name: &str) -> Vec<i64> {
        self.get(name)
            .map(|a| a.values.iter().filter_map(Value::as_int).collect())
            .unwrap_or_default()
    }

    /// Client→server encoding. Both modes write the name-keyed text shape;
    /// D6 additionally carries the version header and the extra OBJ zeros.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        if self.mode.d6() {
            out.push_str(&format!("{}\n", self.mode.ser_version));
        }
        out.push_str("OBJ NULL 0 ");
        if self.mode.d6() {
            out.push_str("0 0\n0\n");
        }
        out.push_str(&format!("{}\n", self.attrs.len()));
        for attr in &self.attrs {
            out.push_str(&format!(
                "{} {} {} {}\n",
                attr.name,
                attr.attr_type,
                if attr.repeating { REPEATING } else { SINGLE },
                attr.length
            ));
            if attr.repeating {
                out.push_str(&format!("{}\n", attr.values.len()));
            }
            for value in &attr.values {
                self.serialize_value(&mut out, attr.attr_type, value);
            }
        }
        out
    }

    fn serialize_value(&self, out: &mut String, attr_type: ValueType, value: &Value) {
        match attr_type {
            ValueType::String => {
                let text = match value.as_str() {
                    Some(s) => s.to_string(),
                    None => value.to_string(),
                };
                out.push_str(&format!("A {} {}\n", text.len(), text));
            }
            ValueType::Id => {
                let id = value.as_str().unwrap_or_default();
                out.push_str(if id.is_empty() { NULL_ID } else { id });
                out.push('\n');
            }
            ValueType::Time => {
                let epoch = value.as_time().unwrap_or(None);
                out.push_str(&time::format_time(epoch, self.mode.iso8601_time));
                out.push('\n');
            }
            _ => {
                out.push_str(&value.to_string());
                out.push('\n');
            }
        }
    }

    /// Human-readable attribute listing, extended attributes set apart.
    pub fn dump(&self) -> String {
        let mut primary = String::new();
        let mut extended = String::new();
        for attr in &self.attrs {
            let section = if attr.extended {
                &mut extended
            } else {
                &mut primary
            };
            if !attr.repeating {
                let value = attr
                    .first()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "<none>".to_string());
                section.push_str(&format!("\n {:<30} {:>8}: {}", attr.name, "", value));
            } else if attr.values.is_empty() {
                section.push_str(&format!("\n {:<30} {:>8}: <none>", attr.name, "[]"));
            } else {
                for (i, value) in attr.values.iter().enumerate() {
                    let name = if i == 0 { attr.name.as_str() } else { "" };
                    section.push_str(&format!(
                        "\n {:<30} {:>8}: {}",
                        name,
                        format!("[{i}]"),
                        value
                    ));
                }
            }
        }
        if extended.is_empty() {
            format!("ATTRIBUTES:{primary}")
        } else {
            format!("ATTRIBUTES:{primary}\nEXTENDED:{extended}")
        }
    }
}

/// Parse a FETCH_TYPE reply: a counted stream of type descriptors, each
/// registered in the cache. Returns the last (most derived) one.
pub fn parse_type_stream(buf: Bytes, mode: WireMode) -> Result<Option<TypeInfo>, ParserError> {
    if buf.is_empty() {
        return Err(ParserError::EmptyData);
    }
    let mut reader = ObjectReader::new(buf, mode);
    let count = reader.read_int()?;
    if mode.d6() {
        reader.read_int()?;
    }
    let mut last = None;
    for _ in 0..count {
        let type_info = reader.read_type_descriptor()?;
        type_cache::add(type_info.clone());
        last = Some(type_info);
    }
    Ok(last)
}
