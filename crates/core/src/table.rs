//! Typed columnar tables.

use crate::column::Column;
use crate::error::{Error, Result};
use crate::types::Type;
use crate::value::Value;

/// An ordered list of named, typed columns of equal length.
///
/// The row count is stored explicitly so that a table with no columns can
/// still have rows; a FROM-less `SELECT 1` evaluates against one such row.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    names: Vec<String>,
    columns: Vec<Column>,
    num_rows: usize,
}

impl Table {
    /// Creates a table from named columns, which must all have the same length.
    pub fn new(names: Vec<String>, columns: Vec<Column>) -> Result<Self> {
        let num_rows = columns.first().map_or(0, Column::len);
        Self::with_num_rows(names, columns, num_rows)
    }

    /// Creates a table with an explicit row count.
    pub fn with_num_rows(names: Vec<String>, columns: Vec<Column>, num_rows: usize) -> Result<Self> {
        if names.len() != columns.len() {
            return Err(Error::semantic(format!(
                "Table has {} names for {} columns",
                names.len(),
                columns.len()
            )));
        }
        if let Some((name, col)) = names
            .iter()
            .zip(columns.iter())
            .find(|(_, c)| c.len() != num_rows)
        {
            return Err(Error::semantic(format!(
                "Column {} has {} rows, expected {}",
                name,
                col.len(),
                num_rows
            )));
        }
        Ok(Self {
            names,
            columns,
            num_rows,
        })
    }

    /// Builds a table from a schema and row-major data, validating every cell.
    pub fn from_rows<N: Into<String>>(schema: Vec<(N, Type)>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let num_rows = rows.len();
        let mut cells: Vec<Vec<Value>> = schema.iter().map(|_| Vec::with_capacity(num_rows)).collect();
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != schema.len() {
                return Err(Error::semantic(format!(
                    "Row {} has {} values, expected {}",
                    i,
                    row.len(),
                    schema.len()
                )));
            }
            for (j, value) in row.into_iter().enumerate() {
                cells[j].push(value);
            }
        }
        let mut names = Vec::with_capacity(schema.len());
        let mut columns = Vec::with_capacity(schema.len());
        for ((name, dtype), values) in schema.into_iter().zip(cells) {
            columns.push(Column::checked(values, Some(dtype))?);
            names.push(name.into());
        }
        Self::with_num_rows(names, columns, num_rows)
    }

    /// A table with no columns and a single row.
    pub fn single_row() -> Self {
        Self {
            names: Vec::new(),
            columns: Vec::new(),
            num_rows: 1,
        }
    }

    #[inline]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[inline]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[inline]
    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    /// Finds a column by exact name.
    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| &self.columns[i])
    }

    /// Returns the declared type of every column.
    pub fn types(&self) -> Vec<Option<Type>> {
        self.columns.iter().map(|c| c.dtype().clone()).collect()
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    #[inline]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<Column>, usize) {
        (self.names, self.columns, self.num_rows)
    }

    /// Gathers rows by index, in that order.
    pub fn take(&self, indices: &[usize]) -> Table {
        Table {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.take(indices)).collect(),
            num_rows: indices.len(),
        }
    }

    /// Keeps the rows whose mask entry is true; column types are unchanged.
    pub fn filter(&self, mask: &[bool]) -> Table {
        Table {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.filter(mask)).collect(),
            num_rows: mask.iter().filter(|keep| **keep).count(),
        }
    }

    /// Returns a contiguous slice of rows, clamped to the table bounds.
    pub fn slice(&self, offset: usize, limit: usize) -> Table {
        let start = offset.min(self.num_rows);
        let end = offset.saturating_add(limit).min(self.num_rows);
        let indices: Vec<usize> = (start..end).collect();
        self.take(&indices)
    }

    /// Returns the data row-major, mainly for assertions.
    pub fn to_rows(&self) -> Vec<Vec<Value>> {
        (0..self.num_rows)
            .map(|i| self.columns.iter().map(|c| c.values()[i].clone()).collect())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::from_rows(
            vec![("a", Type::INTEGER), ("b", Type::STRING)],
            vec![
                vec![Value::Integer(1), Value::from("x")],
                vec![Value::Integer(2), Value::from("y")],
                vec![Value::Integer(3), Value::Null],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_from_rows() {
        let table = sample();
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.num_columns(), 2);
        assert_eq!(table.names(), &["a".to_string(), "b".to_string()]);
        assert_eq!(table.types(), vec![Some(Type::INTEGER), Some(Type::STRING)]);
        assert_eq!(table.column_by_name("b").unwrap().values()[2], Value::Null);
    }

    #[test]
    fn test_from_rows_rejects_bad_cells() {
        let err = Table::from_rows(vec![("a", Type::INTEGER)], vec![vec![Value::from("no")]]);
        assert!(err.is_err());
        let err = Table::from_rows(vec![("a", Type::INTEGER)], vec![vec![]]);
        assert!(err.is_err());
    }

    #[test]
    fn test_uneven_columns_rejected() {
        let err = Table::new(
            vec!["a".into(), "b".into()],
            vec![
                Column::new(vec![Value::Integer(1)], Some(Type::INTEGER)),
                Column::new(vec![], Some(Type::INTEGER)),
            ],
        )
        .unwrap_err();
        assert!(err.to_string().contains("b"));
    }

    #[test]
    fn test_filter_keeps_types() {
        let table = sample();
        let none = table.filter(&[false, false, false]);
        assert_eq!(none.num_rows(), 0);
        assert_eq!(none.types(), table.types());
        let some = table.filter(&[true, false, true]);
        assert_eq!(
            some.to_rows(),
            vec![
                vec![Value::Integer(1), Value::from("x")],
                vec![Value::Integer(3), Value::Null],
            ]
        );
    }

    #[test]
    fn test_slice() {
        let table = sample();
        assert_eq!(table.slice(1, 1).to_rows(), vec![vec![Value::Integer(2), Value::from("y")]]);
        assert_eq!(table.slice(5, 1).num_rows(), 0);
        assert_eq!(table.slice(0, usize::MAX).num_rows(), 3);
    }

    #[test]
    fn test_single_row() {
        let table = Table::single_row();
        assert_eq!(table.num_rows(), 1);
        assert_eq!(table.to_rows(), vec![Vec::<Value>::new()]);
    }
}
