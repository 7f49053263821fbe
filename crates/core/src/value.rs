//! Runtime cell values.

use crate::types::{ScalarType, Type};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A single cell of a column.
#[derive(Clone, Debug)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Boolean value
    Boolean(bool),
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Binary data
    Bytes(Vec<u8>),
    /// Calendar date
    Date(NaiveDate),
    /// Civil date and time
    Datetime(NaiveDateTime),
    /// Point in time
    Timestamp(DateTime<Utc>),
    /// ARRAY value; elements share the column's element type
    Array(Vec<Value>),
    /// STRUCT value; fields are positional, names live in the type
    Struct(Vec<Value>),
}

impl Value {
    /// Returns true if this value is Null.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the boolean value if this is a Boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the integer value if this is an Integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as f64 if it is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns a reference to the string if this is a String.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Returns the scalar kind of this value, or None for NULL and composites.
    pub fn scalar_type(&self) -> Option<ScalarType> {
        match self {
            Value::Boolean(_) => Some(ScalarType::Boolean),
            Value::Integer(_) => Some(ScalarType::Integer),
            Value::Float(_) => Some(ScalarType::Float),
            Value::String(_) => Some(ScalarType::String),
            Value::Bytes(_) => Some(ScalarType::Bytes),
            Value::Date(_) => Some(ScalarType::Date),
            Value::Datetime(_) => Some(ScalarType::Datetime),
            Value::Timestamp(_) => Some(ScalarType::Timestamp),
            Value::Null | Value::Array(_) | Value::Struct(_) => None,
        }
    }

    /// Returns true if this value is a valid inhabitant of `dtype`.
    ///
    /// NULL inhabits every type; a column of unknown type may only hold NULLs.
    pub fn conforms_to(&self, dtype: &Option<Type>) -> bool {
        match (self, dtype) {
            (Value::Null, _) => true,
            (_, None) => false,
            (Value::Array(items), Some(Type::Array(element))) => {
                let element = Some((**element).clone());
                items.iter().all(|v| v.conforms_to(&element))
            }
            (Value::Struct(items), Some(Type::Struct(fields))) => {
                items.len() == fields.len()
                    && items
                        .iter()
                        .zip(fields.iter())
                        .all(|(v, f)| v.conforms_to(&f.dtype))
            }
            (v, Some(Type::Scalar(s))) => v.scalar_type() == Some(*s),
            _ => false,
        }
    }

    /// Re-represents the value as `to`, an implicit coercion target of its own type
    /// (INTEGER widens to FLOAT, recursively through arrays and structs).
    pub fn widen(self, to: &Option<Type>) -> Value {
        match (self, to) {
            (Value::Integer(i), Some(Type::Scalar(ScalarType::Float))) => Value::Float(i as f64),
            (Value::Array(items), Some(Type::Array(element))) => {
                let element = Some((**element).clone());
                Value::Array(items.into_iter().map(|v| v.widen(&element)).collect())
            }
            (Value::Struct(items), Some(Type::Struct(fields))) => Value::Struct(
                items
                    .into_iter()
                    .zip(fields.iter())
                    .map(|(v, f)| v.widen(&f.dtype))
                    .collect(),
            ),
            (v, _) => v,
        }
    }

    fn type_order(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Integer(_) | Value::Float(_) => 2,
            Value::String(_) => 3,
            Value::Bytes(_) => 4,
            Value::Date(_) => 5,
            Value::Datetime(_) => 6,
            Value::Timestamp(_) => 7,
            Value::Array(_) => 8,
            Value::Struct(_) => 9,
        }
    }
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    // NaN sorts after every number; -0.0 == 0.0.
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Integer(a), Value::Float(b)) => cmp_f64(*a as f64, *b),
            (Value::Float(a), Value::Integer(b)) => cmp_f64(*a, *b as f64),
            (Value::Float(a), Value::Float(b)) => cmp_f64(*a, *b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Datetime(a), Value::Datetime(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) | (Value::Struct(a), Value::Struct(b)) => a.cmp(b),
            _ => self.type_order().cmp(&other.type_order()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_order().hash(state);
        match self {
            Value::Null => {}
            Value::Boolean(b) => b.hash(state),
            // Integers and floats that compare equal must hash equal.
            Value::Integer(i) => hash_f64(*i as f64, state),
            Value::Float(f) => hash_f64(*f, state),
            Value::String(s) => s.hash(state),
            Value::Bytes(b) => b.hash(state),
            Value::Date(d) => d.hash(state),
            Value::Datetime(d) => d.hash(state),
            Value::Timestamp(t) => t.hash(state),
            Value::Array(items) | Value::Struct(items) => items.hash(state),
        }
    }
}

fn hash_f64<H: Hasher>(f: f64, state: &mut H) {
    let normalized = if f == 0.0 {
        0.0f64
    } else if f.is_nan() {
        f64::NAN
    } else {
        f
    };
    normalized.to_bits().hash(state);
}

impl fmt::Display for Value {
    /// Renders the value as `CAST(value AS STRING)` would.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => f.write_str(s),
            Value::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Datetime(d) => write!(f, "{}", d.format("%Y-%m-%d %H:%M:%S%.f")),
            Value::Timestamp(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S%.f+00")),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Struct(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str(")")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashbrown::HashSet;

    #[test]
    fn test_null_sorts_first() {
        let mut values = vec![Value::Integer(3), Value::Null, Value::Integer(-1)];
        values.sort();
        assert_eq!(values, vec![Value::Null, Value::Integer(-1), Value::Integer(3)]);
    }

    #[test]
    fn test_cross_numeric_equality() {
        assert_eq!(Value::Integer(2), Value::Float(2.0));
        assert!(Value::Integer(2) < Value::Float(2.5));
        assert!(Value::Float(f64::NAN) > Value::Integer(i64::MAX));

        let mut set = HashSet::new();
        set.insert(Value::Integer(2));
        assert!(set.contains(&Value::Float(2.0)));
    }

    #[test]
    fn test_conforms_to() {
        assert!(Value::Integer(1).conforms_to(&Some(Type::INTEGER)));
        assert!(!Value::Integer(1).conforms_to(&Some(Type::FLOAT)));
        assert!(Value::Null.conforms_to(&None));
        assert!(!Value::Integer(1).conforms_to(&None));
        let arr = Value::Array(vec![Value::Integer(1), Value::Null]);
        assert!(arr.conforms_to(&Some(Type::array(Type::INTEGER))));
    }

    #[test]
    fn test_widen() {
        assert_eq!(Value::Integer(1).widen(&Some(Type::FLOAT)), Value::Float(1.0));
        let arr = Value::Array(vec![Value::Integer(1)]).widen(&Some(Type::array(Type::FLOAT)));
        assert!(matches!(arr, Value::Array(ref v) if matches!(v[0], Value::Float(_))));
        assert_eq!(Value::Null.widen(&Some(Type::FLOAT)), Value::Null);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Integer(7).to_string(), "7");
        assert_eq!(Value::Boolean(true).to_string(), "true");
        let date = NaiveDate::from_ymd_opt(2019, 3, 1).unwrap();
        assert_eq!(Value::Date(date).to_string(), "2019-03-01");
        assert_eq!(
            Value::Array(vec![Value::Integer(1), Value::Integer(2)]).to_string(),
            "[1, 2]"
        );
    }
}
