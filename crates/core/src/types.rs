//! SQL type definitions and the implicit coercion lattice.
//!
//! A column's type is an `Option<Type>`: `None` is the type of a bare `NULL`
//! literal, which coerces to anything.

use crate::error::{Error, Result};
use std::fmt;

/// Scalar SQL types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScalarType {
    /// TRUE / FALSE
    Boolean,
    /// 64-bit signed integer (INT64)
    Integer,
    /// 64-bit floating point (FLOAT64)
    Float,
    /// UTF-8 string
    String,
    /// Binary data
    Bytes,
    /// Calendar date
    Date,
    /// Civil date and time, no time zone
    Datetime,
    /// Absolute point in time (UTC)
    Timestamp,
}

impl ScalarType {
    /// Returns the canonical SQL name of this type.
    pub fn name(&self) -> &'static str {
        match self {
            ScalarType::Boolean => "BOOLEAN",
            ScalarType::Integer => "INTEGER",
            ScalarType::Float => "FLOAT",
            ScalarType::String => "STRING",
            ScalarType::Bytes => "BYTES",
            ScalarType::Date => "DATE",
            ScalarType::Datetime => "DATETIME",
            ScalarType::Timestamp => "TIMESTAMP",
        }
    }

    /// Parses a type name as written in SQL (`INT64`, `FLOAT64`, `BOOL`, ...).
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_uppercase().as_str() {
            "BOOL" | "BOOLEAN" => Ok(ScalarType::Boolean),
            "INT64" | "INTEGER" | "INT" => Ok(ScalarType::Integer),
            "FLOAT64" | "FLOAT" => Ok(ScalarType::Float),
            "STRING" => Ok(ScalarType::String),
            "BYTES" => Ok(ScalarType::Bytes),
            "DATE" => Ok(ScalarType::Date),
            "DATETIME" => Ok(ScalarType::Datetime),
            "TIMESTAMP" => Ok(ScalarType::Timestamp),
            _ => Err(Error::type_error(format!("Unknown type name {}", name))),
        }
    }

    /// Returns true for INTEGER and FLOAT.
    #[inline]
    pub fn is_numeric(&self) -> bool {
        matches!(self, ScalarType::Integer | ScalarType::Float)
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One field of a STRUCT type. Either part may be absent: `STRUCT(1 AS a)`
/// declares a name but no type, `(1, 2)` declares neither.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StructField {
    pub name: Option<String>,
    pub dtype: Option<Type>,
}

impl StructField {
    pub fn new(name: Option<String>, dtype: Option<Type>) -> Self {
        Self { name, dtype }
    }
}

/// An SQL type: a scalar, or an ARRAY/STRUCT composite.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Scalar(ScalarType),
    Array(Box<Type>),
    Struct(Vec<StructField>),
}

impl Type {
    pub const BOOLEAN: Type = Type::Scalar(ScalarType::Boolean);
    pub const INTEGER: Type = Type::Scalar(ScalarType::Integer);
    pub const FLOAT: Type = Type::Scalar(ScalarType::Float);
    pub const STRING: Type = Type::Scalar(ScalarType::String);
    pub const BYTES: Type = Type::Scalar(ScalarType::Bytes);
    pub const DATE: Type = Type::Scalar(ScalarType::Date);
    pub const DATETIME: Type = Type::Scalar(ScalarType::Datetime);
    pub const TIMESTAMP: Type = Type::Scalar(ScalarType::Timestamp);

    /// Creates an ARRAY type.
    pub fn array(element: Type) -> Self {
        Type::Array(Box::new(element))
    }

    /// Creates a STRUCT type from (name, type) pairs.
    pub fn structure<N: Into<String>>(fields: Vec<(Option<N>, Option<Type>)>) -> Self {
        Type::Struct(
            fields
                .into_iter()
                .map(|(name, dtype)| StructField::new(name.map(Into::into), dtype))
                .collect(),
        )
    }

    /// Returns the scalar kind, if this is a scalar type.
    pub fn as_scalar(&self) -> Option<ScalarType> {
        match self {
            Type::Scalar(s) => Some(*s),
            _ => None,
        }
    }

    /// Returns true for INTEGER and FLOAT.
    pub fn is_numeric(&self) -> bool {
        self.as_scalar().map_or(false, |s| s.is_numeric())
    }

    /// Returns true if this is a scalar or a struct, the only legal ARRAY element kinds.
    pub fn is_array_element(&self) -> bool {
        !matches!(self, Type::Array(_))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Scalar(s) => write!(f, "{}", s),
            Type::Array(element) => write!(f, "ARRAY<{}>", element),
            Type::Struct(fields) => {
                f.write_str("STRUCT<")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    match (&field.name, &field.dtype) {
                        (Some(name), Some(dtype)) => write!(f, "{} {}", name, dtype)?,
                        (Some(name), None) => write!(f, "{}", name)?,
                        (None, dtype) => f.write_str(&type_name(dtype))?,
                    }
                }
                f.write_str(">")
            }
        }
    }
}

impl From<ScalarType> for Type {
    fn from(s: ScalarType) -> Self {
        Type::Scalar(s)
    }
}

/// Renders a possibly-unknown type; the unknown type is the type of NULL.
pub fn type_name(dtype: &Option<Type>) -> String {
    match dtype {
        Some(t) => t.to_string(),
        None => "NULL".into(),
    }
}

/// Computes the narrowest type every given type implicitly coerces to.
///
/// Fails with a coercion error naming all the inputs if there is none.
/// Coercing zero types yields the unknown type.
pub fn implicitly_coerce(types: &[Option<Type>]) -> Result<Option<Type>> {
    let mut result: Option<Type> = None;
    for dtype in types {
        result = coerce_maybe(&result, dtype).ok_or_else(|| Error::coercion(types))?;
    }
    Ok(result)
}

/// Pairwise form of [`implicitly_coerce`].
pub fn coerce(left: &Option<Type>, right: &Option<Type>) -> Result<Option<Type>> {
    coerce_maybe(left, right).ok_or_else(|| Error::coercion(&[left.clone(), right.clone()]))
}

fn coerce_maybe(left: &Option<Type>, right: &Option<Type>) -> Option<Option<Type>> {
    match (left, right) {
        (None, other) | (other, None) => Some(other.clone()),
        (Some(l), Some(r)) => common_type(l, r).map(Some),
    }
}

fn common_type(left: &Type, right: &Type) -> Option<Type> {
    if left == right {
        return Some(left.clone());
    }
    match (left, right) {
        (Type::Scalar(l), Type::Scalar(r)) if l.is_numeric() && r.is_numeric() => {
            Some(Type::FLOAT)
        }
        (Type::Array(l), Type::Array(r)) => common_type(l, r).map(Type::array),
        (Type::Struct(l), Type::Struct(r)) => {
            if l.len() != r.len() {
                return None;
            }
            l.iter()
                .zip(r.iter())
                .map(|(lf, rf)| {
                    let name = match (&lf.name, &rf.name) {
                        (Some(a), Some(b)) if a != b => return None,
                        (a, b) => a.clone().or_else(|| b.clone()),
                    };
                    let dtype = coerce_maybe(&lf.dtype, &rf.dtype)?;
                    Some(StructField::new(name, dtype))
                })
                .collect::<Option<Vec<_>>>()
                .map(Type::Struct)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_from_name() {
        assert_eq!(ScalarType::from_name("int64").unwrap(), ScalarType::Integer);
        assert_eq!(ScalarType::from_name("FLOAT64").unwrap(), ScalarType::Float);
        assert_eq!(ScalarType::from_name("bool").unwrap(), ScalarType::Boolean);
        assert!(ScalarType::from_name("GEOGRAPHY").is_err());
    }

    #[test]
    fn test_type_display() {
        assert_eq!(Type::array(Type::INTEGER).to_string(), "ARRAY<INTEGER>");
        let st = Type::structure(vec![(Some("a"), Some(Type::INTEGER)), (None, Some(Type::STRING))]);
        assert_eq!(st.to_string(), "STRUCT<a INTEGER, STRING>");
        assert_eq!(type_name(&None), "NULL");
    }

    #[test]
    fn test_coerce_numeric() {
        let t = implicitly_coerce(&[Some(Type::INTEGER), Some(Type::FLOAT)]).unwrap();
        assert_eq!(t, Some(Type::FLOAT));
        let t = implicitly_coerce(&[Some(Type::INTEGER), None, Some(Type::INTEGER)]).unwrap();
        assert_eq!(t, Some(Type::INTEGER));
    }

    #[test]
    fn test_coerce_null_only() {
        assert_eq!(implicitly_coerce(&[None, None]).unwrap(), None);
        assert_eq!(implicitly_coerce(&[]).unwrap(), None);
    }

    #[test]
    fn test_coerce_failure_lists_types() {
        let err = implicitly_coerce(&[Some(Type::INTEGER), Some(Type::STRING)]).unwrap_err();
        assert!(err.is_coercion());
        assert!(err.to_string().contains("INTEGER, STRING"));
    }

    #[test]
    fn test_coerce_array() {
        let t = coerce(&Some(Type::array(Type::INTEGER)), &Some(Type::array(Type::FLOAT))).unwrap();
        assert_eq!(t, Some(Type::array(Type::FLOAT)));
        assert!(coerce(&Some(Type::array(Type::INTEGER)), &Some(Type::INTEGER)).is_err());
    }

    #[test]
    fn test_coerce_struct() {
        let named = Type::structure(vec![(Some("a"), None), (Some("b"), None)]);
        let typed = Type::structure::<String>(vec![
            (None, Some(Type::INTEGER)),
            (None, Some(Type::STRING)),
        ]);
        let t = coerce(&Some(named), &Some(typed)).unwrap();
        assert_eq!(
            t,
            Some(Type::structure(vec![
                (Some("a"), Some(Type::INTEGER)),
                (Some("b"), Some(Type::STRING)),
            ]))
        );
    }

    #[test]
    fn test_coerce_struct_mismatch() {
        let a = Type::structure(vec![(Some("a"), Some(Type::INTEGER))]);
        let b = Type::structure(vec![(Some("b"), Some(Type::INTEGER))]);
        assert!(coerce(&Some(a.clone()), &Some(b)).is_err());

        let two = Type::structure(vec![(Some("a"), Some(Type::INTEGER)), (Some("c"), None)]);
        assert!(coerce(&Some(a), &Some(two)).is_err());
    }
}
