// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Server messages fetched through GET_ERRORS. Each message is a typed
//! object carrying NAME, SEVERITY, a COUNT and numbered positional
//! substitutions; an optional template registry turns them into readable
//! text.

use dashmap::DashMap;
use once_cell::sync::Lazy;
use thiserror::Error;

use crate::obj::typed_object::TypedObject;

/// Severity at or above which a message raises instead of being logged.
pub const SEVERITY_ERROR: i64 = 3;
pub const SEVERITY_INFORMATION: i64 = 0;

/// A server error raised from accumulated messages of error severity.
#[derive(Debug, Error)]
#[error("{text}")]
pub struct ServerError {
    pub text: String,
}

static TEMPLATES: Lazy<DashMap<String, String>> = Lazy::new(DashMap::new);

/// Register a message template with `{0}..{n}` positional placeholders,
/// keyed by message NAME.
pub fn register_template(name: &str, template: &str) {
    TEMPLATES.insert(name.to_string(), template.to_string());
}

#[derive(Debug, Clone)]
pub struct ServerMessage {
    pub name: String,
    pub severity: i64,
    pub args: Vec<String>,
}

impl ServerMessage {
    /// Lift one GET_ERRORS record into a message. Records without NAME and
    /// SEVERITY are not messages.
    pub fn from_object(obj: &TypedObject) -> Option<Self> {
        let name = obj.string("NAME")?;
        let severity = obj.int("SEVERITY")?;
        let count = obj.int("COUNT").unwrap_or(0);
        let mut args = Vec::with_capacity(count as usize);
        for i in 1..=count {
            args.push(obj.string(&i.to_string()).unwrap_or_default());
        }
        Some(Self {
            name,
            severity,
            args,
        })
    }

    pub fn is_error(&self) -> bool {
        self.severity >= SEVERITY_ERROR
    }

    /// Format through the template registry when a template exists,
    /// otherwise `[NAME] arg0 arg1 ...`.
    pub fn format(&self) -> String {
        if let Some(template) = TEMPLATES.get(&self.name) {
            return substitute(&template, &self.args);
        }
        let mut out = format!("[{}]", self.name);
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }
}

fn substitute(template: &str, args: &[String]) -> String {
    let mut out = template.to_string();
    for (i, arg) in args.iter().enumerate() {
        out = out.replace(&format!("{{{i}}}"), arg);
    }
    out
}
