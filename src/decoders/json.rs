//! JSON decoder.

use crate::core::errors::{Result, ScanError};
use crate::core::value::Value;
use crate::scanner::sniff::ContentType;

/// Parse a complete JSON document; trailing non-whitespace is rejected.
pub fn decode(bytes: &[u8]) -> Result<Value> {
    serde_json::from_slice::<serde_json::Value>(bytes)
        .map(Value::from)
        .map_err(|err| {
            let offset = byte_offset(bytes, err.line(), err.column());
            ScanError::decode("", ContentType::Json, format!("{err} (byte offset {offset})"))
        })
}

/// Convert serde_json's 1-based line/column position into a byte offset.
fn byte_offset(bytes: &[u8], line: usize, column: usize) -> usize {
    let line_start = if line <= 1 {
        0
    } else {
        bytes
            .iter()
            .enumerate()
            .filter(|(_, b)| **b == b'\n')
            .nth(line - 2)
            .map_or(bytes.len(), |(i, _)| i + 1)
    };
    (line_start + column.saturating_sub(1)).min(bytes.len())
}
