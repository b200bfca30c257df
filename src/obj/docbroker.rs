// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Docbroker reply objects. The broker speaks a text-only typed-object
//! variant without a type descriptor: attributes are fully self-described.

use bytes::Bytes;

use crate::codec::text::{TokenStream, is_attribute_name};
use crate::codec::{ParserError, ValueType};
use crate::obj::WireMode;
use crate::obj::attr_value::{AttrValue, Value};
use crate::obj::typed_object::TypedObject;

/// Attribute of the server map that really is single-valued; everything
/// else the broker sends is semantically repeating even though it omits
/// the repeating marker.
const HOST_ADDR: &str = "i_host_addr";

fn read_value(ts: &mut TokenStream, attr_type: ValueType) -> Result<Value, ParserError> {
    Ok(match attr_type {
        ValueType::Bool => Value::Bool(ts.read_boolean()?),
        ValueType::Int => Value::Int(ts.read_int()?),
        ValueType::String => {
            Value::String(String::from_utf8_lossy(&ts.read_string()?).into_owned())
        }
        ValueType::Id => Value::Id(ts.next_token()?),
        ValueType::Time => Value::Time(ts.read_time()?),
        ValueType::Double => Value::Double(ts.read_double()?),
        ValueType::Undefined => Value::Undefined(ts.next_token()?),
    })
}

fn read_attr(ts: &mut TokenStream) -> Result<AttrValue, ParserError> {
    let name = ts.next_validated(is_attribute_name, "attribute name")?;
    let attr_type = ts.read_type_marker()?;
    let repeating = ts.read_repeating_marker()?;
    let length = ts.read_int()?;

    let values = if repeating {
        let count = ts.read_int()?;
        let mut values = Vec::with_capacity(count as usize);
        for _ in 0..count {
            values.push(read_value(ts, attr_type)?);
        }
        values
    } else {
        vec![read_value(ts, attr_type)?]
    };

    Ok(AttrValue {
        name,
        attr_type,
        length,
        repeating,
        values,
        extended: false,
    })
}

/// Parse a fully self-described object: `OBJ <typename> <int>` followed by
/// counted `name type S|R length [count] values...` blocks. Broker replies
/// and client-serialized objects both take this shape.
pub fn parse_self_described(buf: Bytes) -> Result<TypedObject, ParserError> {
    if buf.is_empty() {
        return Err(ParserError::EmptyData);
    }
    let mut ts = TokenStream::new(buf);
    let header = ts.next_token()?;
    if header != "OBJ" {
        return Err(ParserError::InvalidHeader {
            expected: "OBJ",
            got: header,
        });
    }
    let type_name = ts.next_token()?;
    if type_name.is_empty() {
        return Err(ParserError::InvalidHeader {
            expected: "type name",
            got: type_name,
        });
    }
    ts.read_int()?;

    let mut obj = TypedObject::new(WireMode::LEGACY);
    let count = ts.read_int()?;
    for _ in 0..count {
        obj.add(read_attr(&mut ts)?);
    }
    Ok(obj)
}

/// A docbase map or server map from the broker.
#[derive(Debug, Clone)]
pub struct DocbaseMap {
    pub obj: TypedObject,
}

impl DocbaseMap {
    /// Parse and apply the broker quirk: every attribute except
    /// `i_host_addr` is repeating regardless of its wire marker.
    pub fn parse(buf: Bytes) -> Result<Self, ParserError> {
        let mut obj = parse_self_described(buf)?;
        for attr in obj.attrs_mut() {
            if attr.name != HOST_ADDR {
                attr.repeating = true;
            }
        }
        Ok(Self { obj })
    }

    pub fn docbase_names(&self) -> Vec<String> {
        self.obj.strings("r_docbase_name")
    }

    pub fn host_addr(&self) -> Option<String> {
        self.obj.string(HOST_ADDR)
    }
}

/// Split an `INET_ADDR <reserved> <hex-port> <reserved> <reserved> <host>`
/// connection address into host and port.
pub fn parse_address(value: &str) -> Result<(String, u16), ParserError> {
    let invalid = || ParserError::InvalidAddress(value.to_string());
    if !value.starts_with("INET_ADDR") {
        return Err(invalid());
    }
    let chunks: Vec<&str> = value.split_whitespace().collect();
    if chunks.len() < 6 {
        return Err(invalid());
    }
    let port = u16::from_str_radix(chunks[2], 16).map_err(|_| invalid())?;
    Ok((chunks[5].to_string(), port))
}
