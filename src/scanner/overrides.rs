//! Forced content types for paths whose leading bytes are not enough.

use crate::core::config::ScanOptions;
use crate::core::errors::Result;
use crate::scanner::matcher::PathMatcher;
use crate::scanner::sniff::ContentType;

/// Ordered glob rules; the first rule matching a path decides its type.
#[derive(Debug, Clone, Default)]
pub struct TypeOverrides {
    rules: Vec<(PathMatcher, ContentType)>,
}

impl TypeOverrides {
    /// Compile the user overrides and then the profile's, honoring the
    /// session's case sensitivity.
    pub fn compile(options: &ScanOptions) -> Result<Self> {
        let rules = options
            .effective_overrides()
            .map(|(glob, content_type)| {
                Ok((PathMatcher::compile(&[glob], options.case_sensitive)?, content_type))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<ContentType> {
        self.rules
            .iter()
            .find(|(matcher, _)| matcher.matches(path))
            .map(|(_, content_type)| *content_type)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
