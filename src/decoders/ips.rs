//! Apple `.ips` report decoder.
//!
//! An IPS report is a single-line JSON header followed by a JSON body. The
//! result is a mapping with the header under `meta` and the body under
//! `data`.

use crate::core::errors::{Result, ScanError};
use crate::core::value::{Mapping, Value};
use crate::scanner::sniff::ContentType;

pub fn decode(bytes: &[u8]) -> Result<Value> {
    let (header, body) = match memchr::memchr(b'\n', bytes) {
        Some(newline) => bytes.split_at(newline),
        None => (bytes, &[][..]),
    };

    let meta = parse_part(header, "header")?;
    let data = parse_part(body, "body")?;

    let mut out = Mapping::with_capacity(2);
    out.insert("meta".to_string(), meta);
    out.insert("data".to_string(), data);
    Ok(Value::Mapping(out))
}

fn parse_part(bytes: &[u8], part: &str) -> Result<Value> {
    serde_json::from_slice::<serde_json::Value>(bytes)
        .map(Value::from)
        .map_err(|err| ScanError::decode("", ContentType::Ips, format!("{part}: {err}")))
}
