// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Server time values. The wire carries either the literal `nulldate`, an
//! ISO-8601 `YYYY-MM-DDTHH:MM:SSZ` stamp, or the legacy
//! `Mon DD HH:MM:SS YYYY` form (the latter also appears as the 20-byte
//! payload behind an `xxx` marker). Values are normalized to UTC epoch
//! seconds.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::codec::ParserError;

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

fn is_iso8601(value: &str) -> bool {
    let b = value.as_bytes();
    b.len() >= 20
        && b[..4].iter().all(u8::is_ascii_digit)
        && b[4] == b'-'
        && b[5..7].iter().all(u8::is_ascii_digit)
        && b[7] == b'-'
        && b[8..10].iter().all(u8::is_ascii_digit)
        && b[10] == b'T'
        && b[11..13].iter().all(u8::is_ascii_digit)
        && b[13] == b':'
        && b[14..16].iter().all(u8::is_ascii_digit)
        && b[16] == b':'
        && b[17..19].iter().all(u8::is_ascii_digit)
        && b[19] == b'Z'
}

/// Parse a wire time value into epoch seconds; `nulldate` and the empty
/// string map to `None`.
pub fn parse_time(value: &str) -> Result<Option<i64>, ParserError> {
    if value.is_empty() || value == "nulldate" {
        return Ok(None);
    }
    if is_iso8601(value) {
        return parse_utc_time(value).map(Some);
    }
    parse_dctm_time(value).map(Some)
}

fn parse_utc_time(value: &str) -> Result<i64, ParserError> {
    let parsed = NaiveDateTime::parse_from_str(&value[..19], "%Y-%m-%dT%H:%M:%S")
        .map_err(|_| ParserError::InvalidDate(value.to_string()))?;
    Ok(parsed.and_utc().timestamp())
}

fn parse_dctm_time(value: &str) -> Result<i64, ParserError> {
    let chunks: Vec<&str> = value.split([' ', ':']).filter(|c| !c.is_empty()).collect();
    if chunks.len() != 6 {
        return Err(ParserError::InvalidDate(value.to_string()));
    }
    let month = MONTHS
        .iter()
        .position(|m| *m == chunks[0])
        .ok_or_else(|| ParserError::InvalidDate(value.to_string()))?
        + 1;
    let invalid = || ParserError::InvalidDate(value.to_string());
    let day: u32 = chunks[1].parse().map_err(|_| invalid())?;
    let hour: u32 = chunks[2].parse().map_err(|_| invalid())?;
    let minute: u32 = chunks[3].parse().map_err(|_| invalid())?;
    let second: u32 = chunks[4].parse().map_err(|_| invalid())?;
    let year: i32 = chunks[5].parse().map_err(|_| invalid())?;

    let date = NaiveDate::from_ymd_opt(year, month as u32, day)
        .and_then(|d| d.and_hms_opt(hour, minute, second))
        .ok_or_else(invalid)?;
    Ok(date.and_utc().timestamp())
}

/// Render epoch seconds back into the wire form selected by the session's
/// negotiated time mode.
pub fn format_time(epoch: Option<i64>, iso8601: bool) -> String {
    let Some(epoch) = epoch else {
        return "nulldate".to_string();
    };
    let Some(dt) = DateTime::from_timestamp(epoch, 0) else {
        return "nulldate".to_string();
    };
    if iso8601 {
        dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    } else {
        dt.format("%b %e %H:%M:%S %Y").to_string()
    }
}
