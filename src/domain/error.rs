use serde::Serialize;
use thiserror::Error;

use crate::domain::engine::Engine;

/// Structured migration error, carrying the numeric code used in the
/// JSON error envelope (`"<code>: <message>"`).
///
/// Components return these instead of throwing across layer boundaries;
/// the data phases accumulate them into a request-scoped list so a failed
/// table never aborts its siblings.
#[derive(Debug, Clone, Error, Serialize, PartialEq, Eq)]
pub enum MigrationError {
    /// 101 — plain contextual message, prefixed to a more specific error.
    #[error("{0}")]
    Plain(String),

    /// 102 — unexpected condition with no better classification.
    #[error("unexpected error: {0}")]
    Unexpected(String),

    /// 104 — a named operation returned an underlying error.
    #[error("the operation {operation} returned the error {detail}")]
    Operation { operation: String, detail: String },

    /// 112 — a required connection attribute was not provided.
    #[error("required attribute: {0}")]
    RequiredAttribute(String),

    /// 113 — an attribute was provided for an engine it does not apply to.
    #[error("attribute not applicable for {engine}: {attribute}")]
    NotApplicable { engine: Engine, attribute: String },

    /// 128 — a value had the wrong type.
    #[error("invalid value {value}: must be type {expected}")]
    TypeMismatch { value: String, expected: String },

    /// 142 — a value was of the right type but invalid.
    #[error("invalid value {value}: {reason}")]
    InvalidValue { value: String, reason: String },
}

impl MigrationError {
    pub fn code(&self) -> u16 {
        match self {
            MigrationError::Plain(_) => 101,
            MigrationError::Unexpected(_) => 102,
            MigrationError::Operation { .. } => 104,
            MigrationError::RequiredAttribute(_) => 112,
            MigrationError::NotApplicable { .. } => 113,
            MigrationError::TypeMismatch { .. } => 128,
            MigrationError::InvalidValue { .. } => 142,
        }
    }

    /// Render as the envelope line `"<code>: <message>"`.
    pub fn envelope_line(&self) -> String {
        format!("{}: {}", self.code(), self)
    }

    pub fn unexpected(detail: impl Into<String>) -> Self {
        MigrationError::Unexpected(detail.into())
    }

    pub fn operation(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        MigrationError::Operation {
            operation: operation.into(),
            detail: detail.into(),
        }
    }

    pub fn required(attribute: impl Into<String>) -> Self {
        MigrationError::RequiredAttribute(attribute.into())
    }

    pub fn not_applicable(engine: Engine, attribute: impl Into<String>) -> Self {
        MigrationError::NotApplicable {
            engine,
            attribute: attribute.into(),
        }
    }

    pub fn type_mismatch(value: impl Into<String>, expected: impl Into<String>) -> Self {
        MigrationError::TypeMismatch {
            value: value.into(),
            expected: expected.into(),
        }
    }

    pub fn invalid_value(value: impl Into<String>, reason: impl Into<String>) -> Self {
        MigrationError::InvalidValue {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Tag a database failure with the engine it came from and the
    /// (sanitized) statement that triggered it.
    pub fn db(engine: Engine, operation: &str, statement: &str, detail: impl Into<String>) -> Self {
        MigrationError::Operation {
            operation: operation.to_string(),
            detail: format!(
                "[{engine}] {}; statement: {}",
                detail.into(),
                sanitize(statement)
            ),
        }
    }
}

/// Collapse whitespace runs and truncate, so statements embedded in error
/// messages stay a single readable line.
pub fn sanitize(text: &str) -> String {
    const MAX: usize = 200;
    let mut out = String::with_capacity(text.len().min(MAX));
    let mut last_ws = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !last_ws && !out.is_empty() {
                out.push(' ');
            }
            last_ws = true;
        } else {
            out.push(c);
            last_ws = false;
        }
        if out.len() >= MAX {
            out.push('…');
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_envelope() {
        let err = MigrationError::invalid_value("t1,t2", "not found in oracle.hr");
        assert_eq!(err.code(), 142);
        assert_eq!(
            err.envelope_line(),
            "142: invalid value t1,t2: not found in oracle.hr"
        );
    }

    #[test]
    fn db_error_carries_engine_and_statement() {
        let err = MigrationError::db(
            Engine::Postgres,
            "bulk-select",
            "SELECT *\n  FROM t",
            "connection reset",
        );
        let line = err.envelope_line();
        assert!(line.starts_with("104:"));
        assert!(line.contains("[postgres]"));
        assert!(line.contains("SELECT * FROM t"));
    }

    #[test]
    fn sanitize_collapses_whitespace() {
        assert_eq!(sanitize("a\n\t b   c"), "a b c");
    }

    #[test]
    fn sanitize_truncates_long_statements() {
        let long = "x".repeat(500);
        let s = sanitize(&long);
        assert!(s.ends_with('…'));
        assert!(s.len() < 220);
    }
}
