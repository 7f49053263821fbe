//! Sort executor.

use crate::ast::SortOrder;
use std::cmp::Ordering;
use tabula_core::{Column, Table};

/// Sort executor - stably sorts rows by specified columns.
///
/// NULL sorts before every other value, so it comes first ascending and
/// last descending.
pub struct SortExecutor {
    /// Column indices and sort orders.
    order_by: Vec<(usize, SortOrder)>,
}

impl SortExecutor {
    /// Creates a new sort executor.
    pub fn new(order_by: Vec<(usize, SortOrder)>) -> Self {
        Self { order_by }
    }

    /// Executes the sort on the input table.
    pub fn execute(&self, input: Table) -> Table {
        let indices = self.sorted_indices(input.columns(), input.num_rows());
        input.take(&indices)
    }

    /// Returns the row order that sorts `columns`; equal rows keep their
    /// original relative order.
    pub fn sorted_indices(&self, columns: &[Column], num_rows: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..num_rows).collect();
        indices.sort_by(|&a, &b| self.compare_rows(columns, a, b));
        indices
    }

    fn compare_rows(&self, columns: &[Column], a: usize, b: usize) -> Ordering {
        for (col_idx, order) in &self.order_by {
            let Some(column) = columns.get(*col_idx) else {
                continue;
            };
            let cmp = column.values()[a].cmp(&column.values()[b]);
            if cmp != Ordering::Equal {
                return match order {
                    SortOrder::Asc => cmp,
                    SortOrder::Desc => cmp.reverse(),
                };
            }
        }
        Ordering::Equal
    }
}
