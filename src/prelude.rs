//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use artiscan::prelude::*;
//! ```

// Core
pub use crate::core::config::{Config, Profile, ScanOptions, TypeOverride};
pub use crate::core::errors::{Result, ScanError};
pub use crate::core::value::{Mapping, Value};

// Scanner
pub use crate::scanner::item::ContentItem;
pub use crate::scanner::matcher::PathMatcher;
pub use crate::scanner::sniff::ContentType;
pub use crate::scanner::source::TreeSource;

// Query
pub use crate::query::{DEFAULT_QUERY, Query};

// Sessions
pub use crate::session::{Diagnostic, ExtractSummary, Jq, Scan, ScanStats, Session, extract, jq, scan};
