//! Content decoders: raw bytes of one artifact to a [`Value`] tree.

pub mod ips;
pub mod json;
pub mod plist;
pub mod sqlite;
pub mod text;

use crate::core::config::ScanOptions;
use crate::core::errors::{Result, ScanError};
use crate::core::value::Value;
use crate::scanner::sniff::{ContentType, trim_leading};

/// Knobs that change how individual formats decode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Only these SQLite tables are decoded when set.
    pub sqlite_tables: Option<Vec<String>>,
    /// Row cap per SQLite table.
    pub sqlite_row_limit: Option<usize>,
}

impl From<&ScanOptions> for DecodeOptions {
    fn from(options: &ScanOptions) -> Self {
        Self {
            sqlite_tables: options.sqlite_tables.clone(),
            sqlite_row_limit: options.sqlite_row_limit,
        }
    }
}

/// Decoded content together with the type it was finally decoded as.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub content_type: ContentType,
    pub value: Value,
}

/// Decode `bytes` according to the sniffed type.
///
/// JSON sniffing is optimistic: content that starts like JSON but does not
/// parse is decoded as text instead. Text formats see the content without a
/// leading byte order mark or whitespace, the same view the sniffer had.
pub fn decode(sniffed: ContentType, bytes: &[u8], options: &DecodeOptions) -> Result<Decoded> {
    let value = match sniffed {
        ContentType::Plist if bytes.starts_with(b"bplist") => plist::decode(bytes)?,
        ContentType::Plist => plist::decode(trim_leading(bytes))?,
        ContentType::Sqlite => sqlite::decode(bytes, options)?,
        ContentType::Ips => ips::decode(trim_leading(bytes))?,
        ContentType::Json => match json::decode(trim_leading(bytes)) {
            Ok(value) => value,
            Err(ScanError::Decode { cause, .. }) => {
                tracing::debug!(%cause, "content sniffed as json did not parse; decoding as text");
                return Ok(Decoded {
                    content_type: ContentType::Text,
                    value: text::decode(bytes),
                });
            }
            Err(other) => return Err(other),
        },
        ContentType::Text => text::decode(bytes),
        ContentType::Unknown => Value::Bytes(bytes.to_vec()),
    };
    Ok(Decoded {
        content_type: sniffed,
        value,
    })
}
