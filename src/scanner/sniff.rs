//! Content sniffing: classify an entry from a bounded prefix of its bytes.

use memchr::memmem;
use serde::{Deserialize, Serialize};

/// SQLite database header magic.
pub const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";
/// Binary property list magic.
pub const BPLIST_MAGIC: &[u8; 6] = b"bplist";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Detected format of one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// Apple property list, binary or XML.
    Plist,
    /// SQLite 3 database.
    Sqlite,
    /// JSON document.
    Json,
    /// Apple `.ips` report: one JSON header line followed by a JSON body.
    Ips,
    /// Plain text.
    Text,
    /// Opaque binary.
    #[serde(alias = "bin")]
    Unknown,
}

impl ContentType {
    /// Lowercase label used in logs and CLI output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plist => "plist",
            Self::Sqlite => "sqlite",
            Self::Json => "json",
            Self::Ips => "ips",
            Self::Text => "text",
            Self::Unknown => "unknown",
        }
    }
}

impl std::str::FromStr for ContentType {
    type Err = String;

    /// Accepts the labels of [`ContentType::as_str`], plus `bin` for opaque binary.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "plist" => Ok(Self::Plist),
            "sqlite" => Ok(Self::Sqlite),
            "json" => Ok(Self::Json),
            "ips" => Ok(Self::Ips),
            "text" => Ok(Self::Text),
            "unknown" | "bin" => Ok(Self::Unknown),
            other => Err(format!(
                "unknown content type {other:?} (expected plist, sqlite, json, ips, text or bin)"
            )),
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify content from its leading bytes. First match wins.
#[must_use]
pub fn classify(prefix: &[u8]) -> ContentType {
    if prefix.starts_with(SQLITE_MAGIC) {
        return ContentType::Sqlite;
    }
    if prefix.starts_with(BPLIST_MAGIC) {
        return ContentType::Plist;
    }

    let trimmed = trim_leading(prefix);

    if is_xml_plist(trimmed) {
        return ContentType::Plist;
    }
    match trimmed.first() {
        Some(b'{') if is_ips(trimmed) => return ContentType::Ips,
        Some(b'{' | b'[') => return ContentType::Json,
        _ => {}
    }
    if looks_like_text(prefix) {
        ContentType::Text
    } else {
        ContentType::Unknown
    }
}

/// Drop a UTF-8 byte order mark and any leading ASCII whitespace.
#[must_use]
pub fn trim_leading(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes).trim_ascii_start()
}

fn is_xml_plist(trimmed: &[u8]) -> bool {
    let xml_like = trimmed.starts_with(b"<?xml")
        || trimmed.starts_with(b"<!DOCTYPE plist")
        || trimmed.starts_with(b"<plist");
    xml_like && memmem::find(trimmed, b"<plist").is_some()
}

/// A complete JSON object on the first line followed by another object.
fn is_ips(trimmed: &[u8]) -> bool {
    let Some(newline) = memchr::memchr(b'\n', trimmed) else {
        return false;
    };
    let (header, rest) = trimmed.split_at(newline);
    let rest_starts_object = rest
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'{');
    rest_starts_object && serde_json::from_slice::<serde::de::IgnoredAny>(header).is_ok()
}

/// No NUL bytes and valid UTF-8, tolerating a sequence cut at the window edge.
fn looks_like_text(prefix: &[u8]) -> bool {
    if memchr::memchr(0, prefix).is_some() {
        return false;
    }
    match std::str::from_utf8(prefix) {
        Ok(_) => true,
        Err(err) => err.error_len().is_none(),
    }
}
