//! jq-style query engine: a small subset of jq for projecting decoded content.

pub mod eval;
pub mod expr;
pub mod parser;

pub use eval::evaluate;
pub use expr::QueryExpr;
pub use parser::parse;

use std::str::FromStr;

use crate::core::errors::{Result, ScanError};
use crate::core::value::Value;

/// Query applied when none is given.
pub const DEFAULT_QUERY: &str = ".";

/// A compiled query together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    source: String,
    expr: QueryExpr,
}

impl Query {
    pub fn parse(source: &str) -> Result<Self> {
        Ok(Self {
            source: source.to_string(),
            expr: parse(source)?,
        })
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub const fn expr(&self) -> &QueryExpr {
        &self.expr
    }

    /// Evaluate against one decoded value.
    pub fn apply(&self, input: &Value) -> Result<Vec<Value>> {
        evaluate(&self.expr, input)
    }
}

impl Default for Query {
    fn default() -> Self {
        Self {
            source: DEFAULT_QUERY.to_string(),
            expr: QueryExpr::Identity,
        }
    }
}

impl FromStr for Query {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_query_is_identity() {
        let query = Query::default();
        assert_eq!(query, Query::parse(DEFAULT_QUERY).unwrap());
        assert!(query.expr().is_identity());
    }

    #[test]
    fn syntax_errors_are_fatal() {
        let err = "{a:".parse::<Query>().unwrap_err();
        assert_eq!(err.code(), "SCN-1002");
        assert!(err.is_fatal());
    }

    #[test]
    fn apply_is_deterministic() {
        let query = Query::parse("..").unwrap();
        let value: Value = serde_json::json!({"a": [1, 2], "b": {"c": 3}}).into();
        assert_eq!(query.apply(&value).unwrap(), query.apply(&value).unwrap());
        assert_eq!(query.source(), "..");
    }
}
