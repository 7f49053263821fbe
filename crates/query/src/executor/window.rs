//! Analytic (windowed) function evaluation.
//!
//! The arguments, PARTITION BY keys and ORDER BY keys are materialized into
//! a standalone frame. Rows are stably sorted by the ORDER BY keys, split
//! into partitions in order of first appearance, and the function is applied
//! to each partition. Results are written back to each row's original
//! position, so the output has one value per input row.

use crate::ast::{Function, FunctionCall, FunctionKind, OverClause, SortOrder};
use crate::context::EvaluationContext;
use crate::executor::aggregate::{check_options, reduce};
use crate::executor::scalar::RowKernel;
use crate::executor::{evaluate, Evaluated, SortExecutor};
use hashbrown::HashMap;
use log::trace;
use tabula_core::{Column, Error, Result, Type, Value};

struct WindowFrame {
    args: Vec<Column>,
    partition_by: Vec<Column>,
    order_by: Vec<Column>,
    num_rows: usize,
}

impl WindowFrame {
    fn build(
        call: &FunctionCall,
        over: &OverClause,
        context: &EvaluationContext<'_>,
    ) -> Result<Self> {
        let num_rows = context.num_rows();
        let materialize = |nodes: &mut dyn Iterator<Item = &crate::ast::EvaluatableNode>| {
            nodes
                .map(|node| match evaluate(node, context)? {
                    Evaluated::Grouped { .. } => Err(Error::not_implemented(format!(
                        "Analytic function {} over grouped rows is not implemented",
                        call
                    ))),
                    other => other.into_column(num_rows),
                })
                .collect::<Result<Vec<_>>>()
        };
        Ok(Self {
            args: materialize(&mut call.args().iter())?,
            partition_by: materialize(&mut over.partition_by.iter())?,
            order_by: materialize(&mut over.order_by.iter().map(|(node, _)| node))?,
            num_rows,
        })
    }

    /// Row indices of each partition, each in ORDER BY order.
    fn partitions(&self, orders: &[SortOrder]) -> Vec<Vec<usize>> {
        let sorter = SortExecutor::new(orders.iter().copied().enumerate().collect());
        let sorted = sorter.sorted_indices(&self.order_by, self.num_rows);
        if self.partition_by.is_empty() {
            return vec![sorted];
        }
        let mut slots: HashMap<Vec<Value>, usize> = HashMap::new();
        let mut partitions: Vec<Vec<usize>> = Vec::new();
        for row in sorted {
            let key: Vec<Value> = self
                .partition_by
                .iter()
                .map(|c| c.values()[row].clone())
                .collect();
            let slot = *slots.entry(key).or_insert_with(|| {
                partitions.push(Vec::new());
                partitions.len() - 1
            });
            partitions[slot].push(row);
        }
        partitions
    }
}

/// Evaluates `function(args) OVER (...)`, one value per row of `context`.
pub(crate) fn evaluate_analytic(
    call: &FunctionCall,
    context: &EvaluationContext<'_>,
) -> Result<Evaluated> {
    let default_over = OverClause::default();
    let over = call.over().unwrap_or(&default_over);
    let function = *call.function();
    check_options(&function)?;

    let frame = WindowFrame::build(call, over, context)?;
    let types: Vec<Option<Type>> = frame.args.iter().map(|c| c.dtype().clone()).collect();
    let dtype = function.result_type(&types)?;
    let orders: Vec<SortOrder> = over.order_by.iter().map(|(_, order)| *order).collect();
    let partitions = frame.partitions(&orders);
    trace!("{}: {} partitions", call, partitions.len());

    let mut output = vec![Value::Null; frame.num_rows];
    let mut kernel = RowKernel::new(function, dtype.clone());
    for partition in &partitions {
        apply_window(&function, &frame, partition, &dtype, &mut kernel, &mut output)?;
    }
    Ok(Evaluated::Column(Column::new(output, dtype)))
}

fn apply_window(
    function: &Function,
    frame: &WindowFrame,
    partition: &[usize],
    dtype: &Option<Type>,
    kernel: &mut RowKernel,
    output: &mut [Value],
) -> Result<()> {
    match (function, function.kind()) {
        (Function::RowNumber, _) => {
            for (position, &row) in partition.iter().enumerate() {
                output[row] = Value::Integer(position as i64 + 1);
            }
        }
        (_, FunctionKind::Aggregating) => {
            let values = frame.args[0].values();
            let value = reduce(function, partition.iter().map(|&row| &values[row]), dtype)?;
            for &row in partition {
                output[row] = value.clone();
            }
        }
        (_, FunctionKind::RowWise) => {
            let mut args: Vec<&Value> = Vec::with_capacity(frame.args.len());
            for &row in partition {
                args.clear();
                args.extend(frame.args.iter().map(|c| &c.values()[row]));
                output[row] = kernel.apply(&args)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::EvaluatableNode;
    use tabula_core::{Catalog, Table};

    fn table() -> Table {
        Table::from_rows(
            vec![("p", Type::STRING), ("o", Type::INTEGER)],
            vec![
                vec![Value::from("b"), Value::Integer(3)],
                vec![Value::from("a"), Value::Integer(2)],
                vec![Value::from("b"), Value::Integer(1)],
                vec![Value::from("a"), Value::Integer(5)],
                vec![Value::from("b"), Value::Integer(2)],
            ],
        )
        .unwrap()
    }

    fn run(name: &str, args: Vec<EvaluatableNode>, over: OverClause) -> Vec<Value> {
        let catalog = Catalog::new();
        let ctx = EvaluationContext::from_table(&catalog, &table(), Some("t"));
        let call = FunctionCall::new(name, args, Some(over)).unwrap();
        evaluate_analytic(&call, &ctx)
            .unwrap()
            .into_column(5)
            .unwrap()
            .into_values()
    }

    #[test]
    fn test_row_number_partitioned() {
        let over = OverClause::new(
            vec![EvaluatableNode::field("p")],
            vec![(EvaluatableNode::field("o"), SortOrder::Asc)],
        );
        let numbers = run("row_number", vec![], over);
        assert_eq!(
            numbers,
            vec![
                Value::Integer(3),
                Value::Integer(1),
                Value::Integer(1),
                Value::Integer(2),
                Value::Integer(2)
            ]
        );
    }

    #[test]
    fn test_row_number_descending_single_partition() {
        let over = OverClause::new(vec![], vec![(EvaluatableNode::field("o"), SortOrder::Desc)]);
        let numbers = run("row_number", vec![], over);
        // Ties on o = 2 keep input order.
        assert_eq!(
            numbers,
            vec![
                Value::Integer(2),
                Value::Integer(3),
                Value::Integer(5),
                Value::Integer(1),
                Value::Integer(4)
            ]
        );
    }

    #[test]
    fn test_aggregate_over_partition() {
        let over = OverClause::new(vec![EvaluatableNode::field("p")], vec![]);
        let sums = run("sum", vec![EvaluatableNode::field("o")], over);
        assert_eq!(
            sums,
            vec![
                Value::Integer(6),
                Value::Integer(7),
                Value::Integer(6),
                Value::Integer(7),
                Value::Integer(6)
            ]
        );
    }

    #[test]
    fn test_row_wise_function_in_window() {
        let over = OverClause::new(vec![EvaluatableNode::field("p")], vec![]);
        let upper = run("upper", vec![EvaluatableNode::field("p")], over);
        assert_eq!(upper[0], Value::from("B"));
        assert_eq!(upper[1], Value::from("A"));
    }
}
