// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use crate::codec::{NULL_ID, ValueType, time};

/// One scalar inside an attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    String(String),
    Id(String),
    /// UTC epoch seconds; `None` is the server's `nulldate`.
    Time(Option<i64>),
    Double(f64),
    Undefined(String),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::String(_) => ValueType::String,
            Value::Id(_) => ValueType::Id,
            Value::Time(_) => ValueType::Time,
            Value::Double(_) => ValueType::Double,
            Value::Undefined(_) => ValueType::Undefined,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) | Value::Id(v) | Value::Undefined(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<Option<i64>> {
        match self {
            Value::Time(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => f.write_str(if *v { "T" } else { "F" }),
            Value::Int(v) => write!(f, "{v}"),
            Value::String(v) | Value::Undefined(v) => f.write_str(v),
            Value::Id(v) => {
                if v.is_empty() {
                    f.write_str(NULL_ID)
                } else {
                    f.write_str(v)
                }
            }
            Value::Time(v) => f.write_str(&time::format_time(*v, true)),
            Value::Double(v) => write!(f, "{v}"),
        }
    }
}

/// Value carrier for one attribute of a typed object.
///
/// For single-valued attributes at most one scalar is held; repeating
/// attributes carry the whole sequence. Extended attributes (present on the
/// instance but absent from the schema) travel in a separate trailer and
/// keep the `extended` marker so dumps and round-trips preserve the
/// distinction.
#[derive(Debug, Clone)]
pub struct AttrValue {
    pub name: String,
    pub attr_type: ValueType,
    pub length: i64,
    pub repeating: bool,
    pub values: Vec<Value>,
    pub extended: bool,
}

impl AttrValue {
    pub fn single(name: &str, value: Value) -> Self {
        Self {
            name: name.to_string(),
            attr_type: value.value_type(),
            length: 0,
            repeating: false,
            values: vec![value],
            extended: false,
        }
    }

    pub fn repeating(name: &str, attr_type: ValueType, values: Vec<Value>) -> Self {
        Self {
            name: name.to_string(),
            attr_type,
            length: 0,
            repeating: true,
            values,
            extended: false,
        }
    }

    /// First scalar, or `None` for an empty attribute.
    pub fn first(&self) -> Option<&Value> {
        self.values.first()
    }
}
