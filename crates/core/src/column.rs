//! Typed columns.

use crate::error::{Error, Result};
use crate::types::{type_name, Type};
use crate::value::Value;
use hashbrown::HashSet;

/// A column of values sharing one declared type.
///
/// A declared type of `None` means the column holds only NULLs of unknown type.
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    values: Vec<Value>,
    dtype: Option<Type>,
}

impl Column {
    /// Creates a column without validating the values against the type.
    pub fn new(values: Vec<Value>, dtype: Option<Type>) -> Self {
        Self { values, dtype }
    }

    /// Creates a column, checking that every value inhabits `dtype`.
    pub fn checked(values: Vec<Value>, dtype: Option<Type>) -> Result<Self> {
        if let Some(bad) = values.iter().find(|v| !v.conforms_to(&dtype)) {
            return Err(Error::type_error(format!(
                "Value {:?} does not match column type {}",
                bad,
                type_name(&dtype)
            )));
        }
        Ok(Self::new(values, dtype))
    }

    /// Repeats one value `len` times.
    pub fn constant(value: Value, dtype: Option<Type>, len: usize) -> Self {
        Self::new(vec![value; len], dtype)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    #[inline]
    pub fn dtype(&self) -> &Option<Type> {
        &self.dtype
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn into_parts(self) -> (Vec<Value>, Option<Type>) {
        (self.values, self.dtype)
    }

    /// Gathers the values at `indices`, in that order; indices may repeat.
    pub fn take(&self, indices: &[usize]) -> Column {
        Column::new(
            indices.iter().map(|&i| self.values[i].clone()).collect(),
            self.dtype.clone(),
        )
    }

    /// Gathers values at optional indices; `None` produces NULL (outer-join padding).
    pub fn take_optional(&self, indices: &[Option<usize>]) -> Column {
        Column::new(
            indices
                .iter()
                .map(|i| i.map_or(Value::Null, |i| self.values[i].clone()))
                .collect(),
            self.dtype.clone(),
        )
    }

    /// Keeps the rows whose mask entry is true.
    pub fn filter(&self, mask: &[bool]) -> Column {
        Column::new(
            self.values
                .iter()
                .zip(mask.iter())
                .filter(|(_, keep)| **keep)
                .map(|(v, _)| v.clone())
                .collect(),
            self.dtype.clone(),
        )
    }

    /// Re-types the column to `dtype`, an implicit coercion target of its type.
    pub fn widen(self, dtype: &Option<Type>) -> Column {
        if &self.dtype == dtype {
            return self;
        }
        Column::new(
            self.values.into_iter().map(|v| v.widen(dtype)).collect(),
            dtype.clone(),
        )
    }

    /// Appends `other`'s rows, re-typing both sides to `dtype`.
    pub fn concat(self, other: Column, dtype: &Option<Type>) -> Column {
        let mut values = self.widen(dtype).values;
        values.extend(other.widen(dtype).values);
        Column::new(values, dtype.clone())
    }

    /// Returns the values with duplicates removed, keeping first occurrences in order.
    pub fn distinct_values(&self) -> Vec<Value> {
        let mut seen = HashSet::with_capacity(self.values.len());
        self.values
            .iter()
            .filter(|v| seen.insert(*v))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Column {
        Column::new(
            values.iter().map(|&v| Value::Integer(v)).collect(),
            Some(Type::INTEGER),
        )
    }

    #[test]
    fn test_checked_rejects_mismatch() {
        assert!(Column::checked(vec![Value::Integer(1), Value::Null], Some(Type::INTEGER)).is_ok());
        let err = Column::checked(vec![Value::from("x")], Some(Type::INTEGER)).unwrap_err();
        assert!(err.to_string().contains("INTEGER"));
    }

    #[test]
    fn test_take_and_filter() {
        let col = ints(&[10, 20, 30]);
        assert_eq!(col.take(&[2, 0, 0]), ints(&[30, 10, 10]));
        assert_eq!(col.filter(&[true, false, true]), ints(&[10, 30]));
        let padded = col.take_optional(&[Some(1), None]);
        assert_eq!(padded.values(), &[Value::Integer(20), Value::Null]);
    }

    #[test]
    fn test_concat_widens() {
        let floats = Column::new(vec![Value::Float(2.5)], Some(Type::FLOAT));
        let joined = ints(&[1]).concat(floats, &Some(Type::FLOAT));
        assert_eq!(joined.dtype(), &Some(Type::FLOAT));
        assert!(matches!(joined.values()[0], Value::Float(f) if f == 1.0));
    }

    #[test]
    fn test_distinct_values() {
        let col = ints(&[3, 1, 3, 2, 1]);
        assert_eq!(
            col.distinct_values(),
            vec![Value::Integer(3), Value::Integer(1), Value::Integer(2)]
        );
    }
}
