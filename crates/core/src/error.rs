//! Error types for the Tabula SQL engine.

use crate::types::Type;
use thiserror::Error;

/// Result type alias for Tabula operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types raised while building or evaluating a query.
///
/// Every failure aborts the whole query; there is no partial result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// No common supertype exists for a set of types.
    #[error("Cannot implicitly coerce the given types: {0}")]
    Coercion(String),

    /// Operand of the wrong kind (non-boolean condition, non-numeric negation, bad cast).
    #[error("Type error: {0}")]
    Type(String),

    /// A field or table path could not be resolved, or resolved ambiguously.
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// The query is well-typed but meaningless (ungrouped field, mismatched UNION, ...).
    #[error("{0}")]
    Semantic(String),

    /// An SQL feature this engine deliberately does not support.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Runtime failure computing a value (overflow, division by zero, unparsable cast).
    #[error("Evaluation error: {0}")]
    Evaluation(String),
}

impl Error {
    /// Creates a coercion error listing every type that took part.
    pub fn coercion(types: &[Option<Type>]) -> Self {
        let names: Vec<String> = types.iter().map(crate::types::type_name).collect();
        Error::Coercion(format!("({})", names.join(", ")))
    }

    /// Creates a type error.
    pub fn type_error(message: impl Into<String>) -> Self {
        Error::Type(message.into())
    }

    /// Creates a resolution error.
    pub fn unresolved(message: impl Into<String>) -> Self {
        Error::Resolution(message.into())
    }

    /// Creates a semantic error.
    pub fn semantic(message: impl Into<String>) -> Self {
        Error::Semantic(message.into())
    }

    /// Creates a not-implemented error.
    pub fn not_implemented(message: impl Into<String>) -> Self {
        Error::NotImplemented(message.into())
    }

    /// Creates an evaluation error.
    pub fn evaluation(message: impl Into<String>) -> Self {
        Error::Evaluation(message.into())
    }

    /// Returns true if this error reports an unsupported SQL feature rather than a bad query.
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Error::NotImplemented(_))
    }

    /// Returns true if this is an implicit coercion failure.
    pub fn is_coercion(&self) -> bool {
        matches!(self, Error::Coercion(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::coercion(&[Some(Type::INTEGER), Some(Type::STRING)]);
        assert_eq!(
            err.to_string(),
            "Cannot implicitly coerce the given types: (INTEGER, STRING)"
        );

        let err = Error::unresolved("field a.b");
        assert!(err.to_string().contains("a.b"));

        let err = Error::semantic("mismatched column count: 1 vs 2");
        assert_eq!(err.to_string(), "mismatched column count: 1 vs 2");
    }

    #[test]
    fn test_error_predicates() {
        assert!(Error::not_implemented("WITH").is_not_implemented());
        assert!(!Error::semantic("x").is_not_implemented());
        assert!(Error::coercion(&[None]).is_coercion());
    }
}
