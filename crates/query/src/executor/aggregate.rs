//! Aggregate function evaluation.

use crate::ast::{ArrayAggOptions, Function, FunctionCall};
use crate::context::EvaluationContext;
use crate::executor::{evaluate, Evaluated};
use hashbrown::HashSet;
use std::iter;
use tabula_core::{Column, Error, Result, Type, Value};

/// Evaluates an aggregating call, producing one value per group, or a
/// single value over every row when the context is not grouped.
pub(crate) fn evaluate_aggregate(
    call: &FunctionCall,
    context: &EvaluationContext<'_>,
) -> Result<Evaluated> {
    let function = *call.function();
    check_options(&function)?;
    let context = context.aggregation_context();
    let arg = evaluate(&call.args()[0], context)?;
    let dtype = function.result_type(&[arg.dtype().clone()])?;

    let values = match arg {
        Evaluated::Grouped { column, groups } => groups
            .iter()
            .map(|group| reduce(&function, group.iter().map(|&i| &column.values()[i]), &dtype))
            .collect::<Result<Vec<_>>>()?,
        Evaluated::Constant { value, .. } => match context.aggregation_groups() {
            Some(groups) => groups
                .iter()
                .map(|group| reduce(&function, iter::repeat(&value).take(group.len()), &dtype))
                .collect::<Result<Vec<_>>>()?,
            None => vec![reduce(
                &function,
                iter::repeat(&value).take(context.num_rows()),
                &dtype,
            )?],
        },
        Evaluated::Column(column) => vec![reduce(&function, column.values().iter(), &dtype)?],
    };
    Ok(Evaluated::Column(Column::new(values, dtype)))
}

pub(crate) fn check_options(function: &Function) -> Result<()> {
    if let Function::ArrayAgg(ArrayAggOptions { ordered, limited, .. }) = function {
        if *ordered {
            return Err(Error::not_implemented("ARRAY_AGG(ORDER BY) is not implemented"));
        }
        if *limited {
            return Err(Error::not_implemented("ARRAY_AGG(LIMIT) is not implemented"));
        }
    }
    Ok(())
}

/// Reduces one group of values to a single value of type `dtype`.
///
/// NULLs are skipped; SUM, MIN, MAX and AVG over no non-NULL input are NULL.
pub(crate) fn reduce<'v, I>(function: &Function, values: I, dtype: &Option<Type>) -> Result<Value>
where
    I: Iterator<Item = &'v Value>,
{
    match function {
        Function::Count { distinct: false } => {
            Ok(Value::Integer(values.filter(|v| !v.is_null()).count() as i64))
        }
        Function::Count { distinct: true } => {
            let seen: HashSet<&Value> = values.filter(|v| !v.is_null()).collect();
            Ok(Value::Integer(seen.len() as i64))
        }
        Function::Sum => {
            let mut present = values.filter(|v| !v.is_null()).peekable();
            if present.peek().is_none() {
                return Ok(Value::Null);
            }
            if *dtype == Some(Type::INTEGER) {
                let mut total: i64 = 0;
                for v in present {
                    let i = v.as_i64().unwrap_or_default();
                    total = total.checked_add(i).ok_or_else(|| {
                        Error::evaluation(format!("Integer overflow in SUM after {}", total))
                    })?;
                }
                Ok(Value::Integer(total))
            } else {
                Ok(Value::Float(present.filter_map(Value::as_f64).sum()))
            }
        }
        Function::Avg => {
            let (sum, count) = values
                .filter_map(Value::as_f64)
                .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
            Ok(if count == 0 {
                Value::Null
            } else {
                Value::Float(sum / count as f64)
            })
        }
        Function::Min => Ok(values
            .filter(|v| !v.is_null())
            .min()
            .map_or(Value::Null, |v| v.clone().widen(dtype))),
        Function::Max => Ok(values
            .filter(|v| !v.is_null())
            .max()
            .map_or(Value::Null, |v| v.clone().widen(dtype))),
        Function::ArrayAgg(options) => {
            let element = match dtype {
                Some(Type::Array(element)) => Some((**element).clone()),
                _ => None,
            };
            let mut seen: HashSet<&Value> = HashSet::new();
            let items = values
                .filter(|v| !(options.ignore_nulls && v.is_null()))
                .filter(|v| !options.distinct || seen.insert(*v))
                .map(|v| v.clone().widen(&element))
                .collect();
            Ok(Value::Array(items))
        }
        row_wise => Err(Error::semantic(format!(
            "{} is not an aggregating function",
            row_wise.name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{CountArgument, EvaluatableNode};
    use tabula_core::{Catalog, Table};

    fn ints(values: &[Option<i64>]) -> Vec<Value> {
        values.iter().map(|v| Value::from(*v)).collect()
    }

    #[test]
    fn test_count() {
        let values = ints(&[Some(1), None, Some(1), Some(2)]);
        let count = reduce(&Function::Count { distinct: false }, values.iter(), &Some(Type::INTEGER));
        assert_eq!(count.unwrap(), Value::Integer(3));
        let distinct = reduce(&Function::Count { distinct: true }, values.iter(), &Some(Type::INTEGER));
        assert_eq!(distinct.unwrap(), Value::Integer(2));
    }

    #[test]
    fn test_sum_min_max_avg() {
        let values = ints(&[Some(4), None, Some(-1), Some(3)]);
        let int = Some(Type::INTEGER);
        assert_eq!(reduce(&Function::Sum, values.iter(), &int).unwrap(), Value::Integer(6));
        assert_eq!(reduce(&Function::Min, values.iter(), &int).unwrap(), Value::Integer(-1));
        assert_eq!(reduce(&Function::Max, values.iter(), &int).unwrap(), Value::Integer(4));
        assert_eq!(
            reduce(&Function::Avg, values.iter(), &Some(Type::FLOAT)).unwrap(),
            Value::Float(2.0)
        );
    }

    #[test]
    fn test_empty_input_is_null() {
        let values = ints(&[None, None]);
        for function in [Function::Sum, Function::Min, Function::Max, Function::Avg] {
            assert_eq!(
                reduce(&function, values.iter(), &Some(Type::INTEGER)).unwrap(),
                Value::Null
            );
        }
        assert_eq!(
            reduce(&Function::Count { distinct: false }, values.iter(), &Some(Type::INTEGER))
                .unwrap(),
            Value::Integer(0)
        );
    }

    #[test]
    fn test_sum_overflow() {
        let values = ints(&[Some(i64::MAX), Some(1)]);
        assert!(reduce(&Function::Sum, values.iter(), &Some(Type::INTEGER)).is_err());
    }

    #[test]
    fn test_array_agg_options() {
        let values = ints(&[Some(2), None, Some(2), Some(1)]);
        let dtype = Some(Type::array(Type::INTEGER));
        let plain = reduce(&Function::ArrayAgg(ArrayAggOptions::default()), values.iter(), &dtype);
        assert_eq!(plain.unwrap(), Value::Array(values.clone()));

        let options = ArrayAggOptions {
            distinct: true,
            ignore_nulls: true,
            ..ArrayAggOptions::default()
        };
        let distinct = reduce(&Function::ArrayAgg(options), values.iter(), &dtype);
        assert_eq!(
            distinct.unwrap(),
            Value::Array(vec![Value::Integer(2), Value::Integer(1)])
        );
    }

    #[test]
    fn test_array_agg_order_by_not_implemented() {
        let catalog = Catalog::new();
        let ctx = EvaluationContext::new(&catalog);
        for (options, message) in [
            (
                ArrayAggOptions {
                    ordered: true,
                    ..ArrayAggOptions::default()
                },
                "ARRAY_AGG(ORDER BY) is not implemented",
            ),
            (
                ArrayAggOptions {
                    limited: true,
                    ..ArrayAggOptions::default()
                },
                "ARRAY_AGG(LIMIT) is not implemented",
            ),
        ] {
            let call = FunctionCall::array_agg(EvaluatableNode::literal(1i64), options, None).unwrap();
            let err = evaluate_aggregate(&call, &ctx).unwrap_err();
            assert!(err.is_not_implemented());
            assert!(err.to_string().contains(message));
        }
    }

    #[test]
    fn test_count_star_over_groups() {
        let catalog = Catalog::new();
        let table = Table::from_rows(
            vec![("a", Type::INTEGER)],
            vec![vec![Value::Integer(1)], vec![Value::Integer(1)], vec![Value::Integer(2)]],
        )
        .unwrap();
        let mut ctx = EvaluationContext::from_table(&catalog, &table, Some("t"));
        let selectors = vec![crate::ast::Selector::new(EvaluatableNode::field("a"), None).with_position(1)];
        ctx.apply_group_by(&selectors, &[EvaluatableNode::field("a")])
            .unwrap();

        let call = FunctionCall::count(CountArgument::Star, None).unwrap();
        let counts = evaluate_aggregate(&call, &ctx).unwrap().into_column(2).unwrap();
        assert_eq!(counts.values(), &[Value::Integer(2), Value::Integer(1)]);
    }
}
