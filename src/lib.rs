#![forbid(unsafe_code)]

//! artiscan: artifact scanner and query engine for forensic bundles such as
//! sysdiagnose archives.
//!
//! A scan walks a directory, archive or single file depth-first in
//! lexicographic order, selects regular files by glob, sniffs their content
//! type from a bounded prefix and decodes them on demand:
//! 1. **Property lists** (binary and XML) to nested mappings
//! 2. **SQLite databases** to `{table: [row, ...]}`
//! 3. **JSON**, **IPS crash reports** and **text**
//!
//! A jq-style query can then be applied to every decoded artifact.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use artiscan::prelude::*;
//!
//! # fn main() -> artiscan::core::errors::Result<()> {
//! for value in jq("{ProductName, ProductVersion}", "bundle", &["**/SystemVersion.plist"], false)? {
//!     println!("{value}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use artiscan::core::config::ScanOptions;
//! use artiscan::session::Session;
//! ```

pub mod prelude;

pub mod core;
pub mod decoders;
pub mod query;
pub mod scanner;
pub mod session;

pub use session::{Diagnostic, ExtractSummary, Jq, Scan, ScanStats, Session, extract, jq, scan};
