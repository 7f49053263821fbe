//! Query executor module.
//!
//! Expressions evaluate to an [`Evaluated`]: a column with one value per row
//! (or per group), a constant broadcast lazily to whatever shape it is
//! combined with, or a grouped column whose rows are partitioned into groups
//! that still await aggregation.

mod aggregate;
mod binary;
mod expr;
mod join;
mod limit;
mod query;
mod scalar;
mod select;
mod sort;
mod window;

pub(crate) use expr::evaluate;
pub use limit::LimitExecutor;
pub use sort::SortExecutor;

use crate::context::Partition;
use std::fmt;
use std::rc::Rc;
use tabula_core::{Column, Error, Result, Type, Value};

/// Result of evaluating an expression against a context.
#[derive(Clone, Debug)]
pub(crate) enum Evaluated {
    /// One value per output row.
    Column(Column),
    /// The same value for every row.
    Constant { value: Value, dtype: Option<Type> },
    /// One value per input row of a grouped context.
    Grouped {
        column: Column,
        groups: Rc<Partition>,
    },
}

impl Evaluated {
    pub(crate) fn dtype(&self) -> &Option<Type> {
        match self {
            Evaluated::Column(column) | Evaluated::Grouped { column, .. } => column.dtype(),
            Evaluated::Constant { dtype, .. } => dtype,
        }
    }

    /// Materializes the result as a column of `len` rows.
    ///
    /// A grouped result cannot be materialized: it is a field read after
    /// GROUP BY that is neither a grouping key nor aggregated.
    pub(crate) fn into_column(self, len: usize) -> Result<Column> {
        match self {
            Evaluated::Column(column) if column.len() == len => Ok(column),
            Evaluated::Column(column) => Err(Error::semantic(format!(
                "Expression produced {} rows, expected {}",
                column.len(),
                len
            ))),
            Evaluated::Constant { value, dtype } => Ok(Column::constant(value, dtype, len)),
            Evaluated::Grouped { .. } => Err(Error::semantic(
                "Expression is neither aggregated nor grouped by",
            )),
        }
    }
}

fn ungrouped(expr: &dyn fmt::Display) -> Error {
    Error::semantic(format!(
        "selecting expression {} that is not aggregated or grouped by",
        expr
    ))
}

enum Shape {
    Constant,
    Rows(usize),
    Grouped(usize, Rc<Partition>),
}

fn shape_of(args: &[Evaluated], expr: &dyn fmt::Display) -> Result<Shape> {
    let mut shape = Shape::Constant;
    for arg in args {
        shape = match (shape, arg) {
            (shape, Evaluated::Constant { .. }) => shape,
            (Shape::Constant, Evaluated::Column(c)) => Shape::Rows(c.len()),
            (Shape::Constant, Evaluated::Grouped { column, groups }) => {
                Shape::Grouped(column.len(), Rc::clone(groups))
            }
            (Shape::Rows(n), Evaluated::Column(c)) => {
                if c.len() != n {
                    return Err(Error::semantic(format!(
                        "Operands of {} have different lengths: {} vs {}",
                        expr,
                        n,
                        c.len()
                    )));
                }
                Shape::Rows(n)
            }
            (Shape::Grouped(n, groups), Evaluated::Grouped { groups: other, .. }) => {
                if !Rc::ptr_eq(&groups, other) {
                    return Err(ungrouped(expr));
                }
                Shape::Grouped(n, groups)
            }
            (Shape::Rows(_), Evaluated::Grouped { .. })
            | (Shape::Grouped(..), Evaluated::Column(_)) => return Err(ungrouped(expr)),
        };
    }
    Ok(shape)
}

/// Applies `f` row by row across `args`, producing a result of type `dtype`.
///
/// All-constant arguments fold to a constant. Columns must have equal
/// lengths; grouped arguments must share one partition and cannot be mixed
/// with plain columns.
pub(crate) fn map_rows<F>(
    args: &[Evaluated],
    expr: &dyn fmt::Display,
    dtype: Option<Type>,
    mut f: F,
) -> Result<Evaluated>
where
    F: FnMut(&[&Value]) -> Result<Value>,
{
    let shape = shape_of(args, expr)?;
    let len = match &shape {
        Shape::Constant => 1,
        Shape::Rows(n) | Shape::Grouped(n, _) => *n,
    };
    let mut values = Vec::with_capacity(len);
    let mut row: Vec<&Value> = Vec::with_capacity(args.len());
    for i in 0..len {
        row.clear();
        row.extend(args.iter().map(|arg| match arg {
            Evaluated::Constant { value, .. } => value,
            Evaluated::Column(column) | Evaluated::Grouped { column, .. } => &column.values()[i],
        }));
        values.push(f(&row)?);
    }
    Ok(match shape {
        Shape::Constant => Evaluated::Constant {
            value: values.pop().unwrap_or(Value::Null),
            dtype,
        },
        Shape::Rows(_) => Evaluated::Column(Column::new(values, dtype)),
        Shape::Grouped(_, groups) => Evaluated::Grouped {
            column: Column::new(values, dtype),
            groups,
        },
    })
}
