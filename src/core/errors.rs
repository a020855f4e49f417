//! SCN-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::scanner::sniff::ContentType;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, ScanError>;

/// Top-level error type for artiscan.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("[SCN-1001] invalid filter {pattern:?}: {details}")]
    InvalidFilter { pattern: String, details: String },

    #[error("[SCN-1002] query syntax error at position {position}: {details}")]
    QuerySyntax { position: usize, details: String },

    #[error("[SCN-1003] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[SCN-1004] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[SCN-1005] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[SCN-2001] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[SCN-2002] archive failure at {path}: {details}")]
    Archive { path: PathBuf, details: String },

    #[error("[SCN-2003] output directory is not empty: {path}")]
    OutputNotEmpty { path: PathBuf },

    #[error("[SCN-2101] {format} decode failure for {path}: {cause}")]
    Decode {
        path: PathBuf,
        format: ContentType,
        cause: String,
    },

    #[error("[SCN-2201] type mismatch: cannot {operation} on {found}")]
    TypeMismatch {
        operation: String,
        found: &'static str,
    },

    #[error("[SCN-3001] scan aborted after {count} item errors (limit {limit})")]
    ErrorBudgetExhausted { count: usize, limit: usize },
}

impl ScanError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidFilter { .. } => "SCN-1001",
            Self::QuerySyntax { .. } => "SCN-1002",
            Self::InvalidConfig { .. } => "SCN-1003",
            Self::MissingConfig { .. } => "SCN-1004",
            Self::ConfigParse { .. } => "SCN-1005",
            Self::Io { .. } => "SCN-2001",
            Self::Archive { .. } => "SCN-2002",
            Self::OutputNotEmpty { .. } => "SCN-2003",
            Self::Decode { .. } => "SCN-2101",
            Self::TypeMismatch { .. } => "SCN-2201",
            Self::ErrorBudgetExhausted { .. } => "SCN-3001",
        }
    }

    /// Whether this error stops a whole session rather than a single item.
    ///
    /// `Io` and `Archive` are fatal when raised while opening the input and
    /// per-item otherwise; the session decides which applies.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidFilter { .. }
                | Self::QuerySyntax { .. }
                | Self::InvalidConfig { .. }
                | Self::MissingConfig { .. }
                | Self::ConfigParse { .. }
                | Self::OutputNotEmpty { .. }
                | Self::ErrorBudgetExhausted { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for decoder failures.
    #[must_use]
    pub fn decode(path: impl AsRef<Path>, format: ContentType, cause: impl ToString) -> Self {
        Self::Decode {
            path: path.as_ref().to_path_buf(),
            format,
            cause: cause.to_string(),
        }
    }

    /// Attach an item path to a decode error raised without one.
    #[must_use]
    pub fn with_path(self, item_path: &Path) -> Self {
        match self {
            Self::Decode {
                path,
                format,
                cause,
            } if path.as_os_str().is_empty() => Self::Decode {
                path: item_path.to_path_buf(),
                format,
                cause,
            },
            other => other,
        }
    }
}

impl From<serde_json::Error> for ScanError {
    fn from(value: serde_json::Error) -> Self {
        Self::decode(PathBuf::new(), ContentType::Json, value)
    }
}

impl From<rusqlite::Error> for ScanError {
    fn from(value: rusqlite::Error) -> Self {
        Self::decode(PathBuf::new(), ContentType::Sqlite, value)
    }
}

impl From<plist::Error> for ScanError {
    fn from(value: plist::Error) -> Self {
        Self::decode(PathBuf::new(), ContentType::Plist, value)
    }
}

impl From<toml::de::Error> for ScanError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

#[cfg(feature = "archives")]
impl From<zip::result::ZipError> for ScanError {
    fn from(value: zip::result::ZipError) -> Self {
        Self::Archive {
            path: PathBuf::new(),
            details: value.to_string(),
        }
    }
}
