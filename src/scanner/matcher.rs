//! Glob filters compiled to anchored regexes.
//!
//! Patterns are `/`-separated: `*` matches within a path component, `?` a
//! single non-separator character, `[...]` a character class and `**` zero or
//! more whole components, so `**/TCC.db` matches at any depth.

#![allow(missing_docs)]

use regex::{Regex, RegexBuilder};

use crate::core::errors::{Result, ScanError};

/// Compiled glob pattern for path matching.
#[derive(Debug, Clone)]
struct GlobPattern {
    original: String,
    compiled: Regex,
}

/// Ordered set of compiled filters; a path matches if any pattern does.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    patterns: Vec<GlobPattern>,
    case_sensitive: bool,
}

impl PathMatcher {
    /// Compile a non-empty pattern set.
    pub fn compile<S: AsRef<str>>(patterns: &[S], case_sensitive: bool) -> Result<Self> {
        if patterns.is_empty() {
            return Err(ScanError::InvalidFilter {
                pattern: String::new(),
                details: "at least one filter pattern is required".to_string(),
            });
        }
        let compiled = patterns
            .iter()
            .map(|pat| {
                let pat = pat.as_ref();
                Ok(GlobPattern {
                    original: pat.to_string(),
                    compiled: glob_to_regex(pat, case_sensitive)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            patterns: compiled,
            case_sensitive,
        })
    }

    /// Test a `/`-separated relative path.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        self.patterns.iter().any(|pat| pat.compiled.is_match(path))
    }

    /// Source patterns in their original order.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|p| p.original.as_str())
    }

    #[must_use]
    pub const fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }
}

/// Validate that a glob pattern can be compiled, without keeping it.
pub fn validate_glob_pattern(pattern: &str) -> Result<()> {
    glob_to_regex(pattern, true).map(|_| ())
}

fn invalid(pattern: &str, details: impl Into<String>) -> ScanError {
    ScanError::InvalidFilter {
        pattern: pattern.to_string(),
        details: details.into(),
    }
}

/// Convert a shell-style glob pattern to an anchored regex.
fn glob_to_regex(pattern: &str, case_sensitive: bool) -> Result<Regex> {
    if pattern.trim().is_empty() {
        return Err(invalid(pattern, "pattern is empty"));
    }

    let normalized_pattern = pattern.replace('\\', "/");
    let chars: Vec<char> = normalized_pattern.chars().collect();
    let mut regex_str = String::with_capacity(pattern.len() * 2);
    regex_str.push('^');

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                let starts_segment = i == 0 || chars[i - 1] == '/';
                let after = chars.get(i + 2);
                if !starts_segment || !matches!(after, None | Some('/')) {
                    return Err(invalid(
                        pattern,
                        "recursive wildcard `**` must form a whole path component",
                    ));
                }
                if after.is_some() {
                    // Zero or more whole components followed by the separator.
                    regex_str.push_str("(?:[^/]*/)*");
                    i += 3;
                } else {
                    regex_str.push_str(".*");
                    i += 2;
                }
            }
            '*' => {
                regex_str.push_str("[^/]*");
                i += 1;
            }
            '?' => {
                regex_str.push_str("[^/]");
                i += 1;
            }
            '[' => {
                i = push_class(pattern, &chars, i, &mut regex_str)?;
            }
            c => {
                regex_str.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4])));
                i += 1;
            }
        }
    }

    regex_str.push('$');

    RegexBuilder::new(&regex_str)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|err| invalid(pattern, err.to_string()))
}

/// Translate a `[...]` class starting at `start`; returns the index after `]`.
fn push_class(pattern: &str, chars: &[char], start: usize, out: &mut String) -> Result<usize> {
    let mut i = start + 1;
    let negated = matches!(chars.get(i), Some('!' | '^'));
    if negated {
        i += 1;
    }

    let body_start = i;
    // A `]` right after the opening bracket is a literal member.
    if chars.get(i) == Some(&']') {
        i += 1;
    }
    while i < chars.len() && chars[i] != ']' {
        if chars[i] == '/' {
            return Err(invalid(pattern, "character class cannot contain `/`"));
        }
        i += 1;
    }
    if i >= chars.len() {
        return Err(invalid(pattern, "unterminated character class"));
    }

    out.push('[');
    if negated {
        out.push_str("^/");
    }
    for &c in &chars[body_start..i] {
        if matches!(c, '\\' | '[' | ']' | '^' | '&' | '~') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push(']');
    Ok(i + 1)
}
