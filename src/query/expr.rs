//! Query AST.

use crate::core::value::Value;

/// A parsed query expression.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryExpr {
    /// `.`
    Identity,
    /// `..` - the input and every value nested in it, parents first.
    RecursiveDescent,
    /// `.name`, `."name"` or `.["name"]`
    Field(String),
    /// `.[n]`; negative indices count from the end.
    Index(i64),
    /// `.[]`
    Iterate,
    /// `expr?` - errors raised by `expr` are dropped.
    Optional(Box<QueryExpr>),
    /// `left | right`
    Pipe(Box<QueryExpr>, Box<QueryExpr>),
    /// `left, right`
    Comma(Box<QueryExpr>, Box<QueryExpr>),
    /// `{key: expr, ...}` in written order.
    Object(Vec<(String, QueryExpr)>),
    /// `null`, `true`, numbers and strings.
    Literal(Value),
}

impl QueryExpr {
    /// Left-nested pipe of a non-empty chain; `Identity` for an empty one.
    pub(crate) fn chain(exprs: Vec<Self>) -> Self {
        exprs
            .into_iter()
            .reduce(|left, right| Self::Pipe(Box::new(left), Box::new(right)))
            .unwrap_or(Self::Identity)
    }

    /// Is this the identity query, i.e. a no-op.
    #[must_use]
    pub const fn is_identity(&self) -> bool {
        matches!(self, Self::Identity)
    }
}

impl std::fmt::Display for QueryExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Identity => f.write_str("."),
            Self::RecursiveDescent => f.write_str(".."),
            Self::Field(name) => write!(f, ".{}", serde_json::Value::from(name.as_str())),
            Self::Index(i) => write!(f, ".[{i}]"),
            Self::Iterate => f.write_str(".[]"),
            Self::Optional(inner) => write!(f, "({inner})?"),
            Self::Pipe(left, right) => write!(f, "{left} | {right}"),
            Self::Comma(left, right) => write!(f, "({left}, {right})"),
            Self::Object(fields) => {
                f.write_str("{")?;
                for (i, (key, expr)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: ({expr})", serde_json::Value::from(key.as_str()))?;
                }
                f.write_str("}")
            }
            Self::Literal(value) => write!(f, "{value}"),
        }
    }
}
