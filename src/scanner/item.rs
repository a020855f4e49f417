//! One matched artifact with lazily decoded content.

#![allow(missing_docs)]

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use crate::core::errors::{Result, ScanError};
use crate::core::value::Value;
use crate::decoders::{self, DecodeOptions, Decoded};
use crate::scanner::sniff::ContentType;
use crate::scanner::source::TreeSource;

/// A matched entry yielded by a scan.
///
/// Only a bounded prefix is read while walking. The full content is read
/// and decoded on the first call that needs it and cached afterwards.
#[derive(Debug)]
pub struct ContentItem {
    source: Arc<dyn TreeSource>,
    options: Arc<DecodeOptions>,
    // path inside `source`; differs from `path` for members of nested archives
    key: String,
    path: String,
    sniffed: ContentType,
    len: u64,
    decoded: Option<Decoded>,
}

impl ContentItem {
    pub(crate) fn new(
        source: Arc<dyn TreeSource>,
        options: Arc<DecodeOptions>,
        key: String,
        path: String,
        sniffed: ContentType,
        len: u64,
    ) -> Self {
        Self {
            source,
            options,
            key,
            path,
            sniffed,
            len,
            decoded: None,
        }
    }

    /// Path relative to the scan root, `/`-separated. Members of nested
    /// archives sit below the archive's own path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Type detected from the leading bytes, before any decoding.
    #[must_use]
    pub const fn sniffed_type(&self) -> ContentType {
        self.sniffed
    }

    /// Byte length reported by the source.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the content has already been decoded and cached.
    #[must_use]
    pub const fn is_decoded(&self) -> bool {
        self.decoded.is_some()
    }

    /// Effective content type, decoding on demand.
    ///
    /// Differs from [`Self::sniffed_type`] only when JSON-looking content
    /// failed to parse and was decoded as text.
    pub fn content_type(&mut self) -> Result<ContentType> {
        Ok(self.ensure_decoded()?.content_type)
    }

    /// Decoded value, decoding on demand.
    pub fn value(&mut self) -> Result<&Value> {
        Ok(&self.ensure_decoded()?.value)
    }

    /// In-memory JSON rendering of the decoded value.
    pub fn json(&mut self) -> Result<serde_json::Value> {
        Ok(self.value()?.to_json())
    }

    /// Compact JSON text of the decoded value.
    pub fn json_string(&mut self) -> Result<String> {
        Ok(self.value()?.to_json_string())
    }

    /// Stream the raw bytes, bypassing decoding and the cache.
    pub fn open(&self) -> Result<Box<dyn Read + Send>> {
        self.source
            .open(&self.key)
            .map_err(|e| ScanError::io(&self.path, e))
    }

    /// Read and decode the content without touching the cache.
    pub fn decode(&self) -> Result<Decoded> {
        let bytes = self
            .source
            .read_all(&self.key)
            .map_err(|e| ScanError::io(&self.path, e))?;
        decoders::decode(self.sniffed, &bytes, &self.options)
            .map_err(|e| e.with_path(Path::new(&self.path)))
    }

    /// Consume the item, returning its decoded value.
    pub fn into_value(mut self) -> Result<Value> {
        match self.decoded.take() {
            Some(decoded) => Ok(decoded.value),
            None => self.decode().map(|d| d.value),
        }
    }

    fn ensure_decoded(&mut self) -> Result<&Decoded> {
        if self.decoded.is_none() {
            self.decoded = Some(self.decode()?);
        }
        self.decoded
            .as_ref()
            .ok_or_else(|| ScanError::decode(&self.path, self.sniffed, "decode cache empty"))
    }
}
