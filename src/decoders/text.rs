//! Text decoder.

use crate::core::value::Value;

/// Wrap the content as a string, replacing invalid UTF-8 sequences.
#[must_use]
pub fn decode(bytes: &[u8]) -> Value {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    Value::String(String::from_utf8_lossy(bytes).into_owned())
}
