//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, ScanError};
use crate::scanner::matcher::validate_glob_pattern;
use crate::scanner::sniff::ContentType;

/// Smallest sniff window able to see the SQLite magic header.
pub const MIN_SNIFF_WINDOW: usize = 16;
/// Largest sniff window; beyond this sniffing stops being cheap.
pub const MAX_SNIFF_WINDOW: usize = 1024 * 1024;

/// Full artiscan configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub scan: ScanOptions,
}

/// Per-session knobs threaded through matcher, walker and decoders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScanOptions {
    /// Glob matching is case-sensitive unless this is false.
    pub case_sensitive: bool,
    /// Surface per-item diagnostics (unmatched entries, skipped items).
    pub verbose: bool,
    /// Bytes read from each matched entry for content sniffing.
    pub sniff_window: usize,
    /// Abort the session once more than this many per-item errors occurred.
    pub max_item_errors: Option<usize>,
    /// Restrict SQLite decoding to these tables (all tables when unset).
    pub sqlite_tables: Option<Vec<String>>,
    /// Cap the rows decoded per SQLite table.
    pub sqlite_row_limit: Option<usize>,
    /// Descend into zip and tar members found while walking.
    pub expand_archives: bool,
    /// Named set of extra type overrides.
    pub profile: Profile,
    /// Forced content types by glob; checked before the profile's, first match wins.
    pub overrides: Vec<TypeOverride>,
}

/// Named override presets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Content sniffing only.
    #[default]
    Standard,
    /// Sysdiagnose naming conventions for artifacts whose bytes do not
    /// identify them.
    Sysdiagnose,
}

impl Profile {
    /// Overrides contributed by this profile, in precedence order.
    #[must_use]
    pub const fn overrides(self) -> &'static [(&'static str, ContentType)] {
        match self {
            Self::Standard => &[],
            Self::Sysdiagnose => &[
                ("**/*.stub", ContentType::Plist),
                ("**/*.plsql", ContentType::Sqlite),
                ("**/*.epsql", ContentType::Sqlite),
                ("**/*.ips", ContentType::Ips),
            ],
        }
    }
}

impl std::str::FromStr for Profile {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "sysdiagnose" => Ok(Self::Sysdiagnose),
            other => Err(format!(
                "unknown profile {other:?} (expected standard or sysdiagnose)"
            )),
        }
    }
}

/// Decode every path matching `glob` as `content_type`, whatever its bytes say.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypeOverride {
    pub glob: String,
    #[serde(rename = "type")]
    pub content_type: ContentType,
}

impl std::str::FromStr for TypeOverride {
    type Err = String;

    /// `GLOB=TYPE`, split at the last `=`.
    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        let (glob, content_type) = raw
            .rsplit_once('=')
            .ok_or_else(|| format!("expected GLOB=TYPE, got {raw:?}"))?;
        if glob.trim().is_empty() {
            return Err(format!("missing glob in {raw:?}"));
        }
        Ok(Self {
            glob: glob.to_string(),
            content_type: content_type.parse()?,
        })
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            verbose: false,
            sniff_window: 4096,
            max_item_errors: None,
            sqlite_tables: None,
            sqlite_row_limit: None,
            expand_archives: true,
            profile: Profile::Standard,
            overrides: Vec::new(),
        }
    }
}

impl ScanOptions {
    pub fn validate(&self) -> Result<()> {
        if !(MIN_SNIFF_WINDOW..=MAX_SNIFF_WINDOW).contains(&self.sniff_window) {
            return Err(ScanError::InvalidConfig {
                details: format!(
                    "scan.sniff_window must be in [{MIN_SNIFF_WINDOW}, {MAX_SNIFF_WINDOW}], got {}",
                    self.sniff_window
                ),
            });
        }
        if self.max_item_errors == Some(0) {
            return Err(ScanError::InvalidConfig {
                details: "scan.max_item_errors must be >= 1 when set".to_string(),
            });
        }
        if self.sqlite_row_limit == Some(0) {
            return Err(ScanError::InvalidConfig {
                details: "scan.sqlite_row_limit must be >= 1 when set".to_string(),
            });
        }
        if let Some(tables) = &self.sqlite_tables
            && tables.iter().any(|t| t.trim().is_empty())
        {
            return Err(ScanError::InvalidConfig {
                details: "scan.sqlite_tables entries must not be empty".to_string(),
            });
        }
        for rule in &self.overrides {
            validate_glob_pattern(&rule.glob).map_err(|err| ScanError::InvalidConfig {
                details: format!("scan.overrides: {err}"),
            })?;
        }
        Ok(())
    }

    /// User overrides followed by the profile's, as `(glob, type)` pairs.
    pub fn effective_overrides(&self) -> impl Iterator<Item = (&str, ContentType)> {
        self.overrides
            .iter()
            .map(|rule| (rule.glob.as_str(), rule.content_type))
            .chain(self.profile.overrides().iter().copied())
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        let home_dir = env::var_os("HOME").map_or_else(|| PathBuf::from("/tmp"), PathBuf::from);
        home_dir.join(".config").join("artiscan").join("config.toml")
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| ScanError::Io {
                path: path_buf.clone(),
                source,
            })?;
            toml::from_str::<Self>(&raw)?
        } else if is_explicit_path {
            return Err(ScanError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.apply_env_overrides_from(|name| env::var(name).ok())?;
        cfg.scan.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut var = |name: &str| lookup(name).filter(|raw| !raw.trim().is_empty());

        if let Some(raw) = var("ARTISCAN_CASE_SENSITIVE") {
            self.scan.case_sensitive = parse_env("ARTISCAN_CASE_SENSITIVE", &raw)?;
        }
        if let Some(raw) = var("ARTISCAN_VERBOSE") {
            self.scan.verbose = parse_env("ARTISCAN_VERBOSE", &raw)?;
        }
        if let Some(raw) = var("ARTISCAN_SNIFF_WINDOW") {
            self.scan.sniff_window = parse_env("ARTISCAN_SNIFF_WINDOW", &raw)?;
        }
        if let Some(raw) = var("ARTISCAN_MAX_ITEM_ERRORS") {
            self.scan.max_item_errors = Some(parse_env("ARTISCAN_MAX_ITEM_ERRORS", &raw)?);
        }
        if let Some(raw) = var("ARTISCAN_SQLITE_ROW_LIMIT") {
            self.scan.sqlite_row_limit = Some(parse_env("ARTISCAN_SQLITE_ROW_LIMIT", &raw)?);
        }
        if let Some(raw) = var("ARTISCAN_EXPAND_ARCHIVES") {
            self.scan.expand_archives = parse_env("ARTISCAN_EXPAND_ARCHIVES", &raw)?;
        }
        if let Some(raw) = var("ARTISCAN_PROFILE") {
            self.scan.profile = parse_env("ARTISCAN_PROFILE", &raw)?;
        }
        Ok(())
    }
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|error| ScanError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}
