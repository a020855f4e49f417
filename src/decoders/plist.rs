//! Property list decoder (binary and XML).

use std::io::Cursor;
use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::core::errors::Result;
use crate::core::value::Value;

pub fn decode(bytes: &[u8]) -> Result<Value> {
    let plist = plist::Value::from_reader(Cursor::new(bytes))?;
    Ok(convert(plist))
}

fn convert(plist: plist::Value) -> Value {
    match plist {
        plist::Value::Array(items) => Value::Sequence(items.into_iter().map(convert).collect()),
        plist::Value::Dictionary(dict) => dict.into_iter().map(|(k, v)| (k, convert(v))).collect(),
        plist::Value::Boolean(b) => Value::Bool(b),
        plist::Value::Data(bytes) => Value::Bytes(bytes),
        plist::Value::Date(date) => Value::String(format_date(date.into())),
        plist::Value::Real(f) => Value::Float(f),
        plist::Value::Integer(i) => i
            .as_unsigned()
            .map(Value::from)
            .or_else(|| i.as_signed().map(Value::Integer))
            .unwrap_or(Value::Null),
        plist::Value::String(s) => Value::String(s),
        plist::Value::Uid(uid) => Value::from(uid.get()),
        _ => Value::Null,
    }
}

/// RFC 3339 in UTC, e.g. `2023-09-14T08:30:00Z`.
fn format_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
