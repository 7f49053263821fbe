//! Expression evaluation.

use crate::ast::{CallingConvention, DatePart, EvaluatableNode, Select};
use crate::context::EvaluationContext;
use crate::executor::{aggregate, binary, map_rows, scalar, window, Evaluated};
use chrono::{Datelike, NaiveDate};
use log::trace;
use std::rc::Rc;
use tabula_core::{
    cast_value, coerce, implicitly_coerce, type_name, Column, Error, Result, ScalarType,
    StructField, Type, Value,
};

/// Evaluates `node` against `context`.
pub(crate) fn evaluate(node: &EvaluatableNode, context: &EvaluationContext<'_>) -> Result<Evaluated> {
    trace!("Evaluating {}", node);
    match node {
        EvaluatableNode::Value(literal) => Ok(Evaluated::Constant {
            value: literal.value().clone(),
            dtype: literal.dtype().clone(),
        }),
        EvaluatableNode::Field(path) => context.lookup(path),
        EvaluatableNode::Exists(select) => evaluate_exists(select, context),
        EvaluatableNode::Binary { op, left, right } => {
            let left = evaluate(left, context)?;
            let right = evaluate(right, context)?;
            binary::evaluate_binary(*op, left, right, node)
        }
        EvaluatableNode::Not(expr) => {
            let arg = evaluate(expr, context)?;
            require_scalar(&arg, &[ScalarType::Boolean], |t| {
                format!("NOT accepts only booleans but was given type: {}", t)
            })?;
            map_rows(&[arg], node, Some(Type::BOOLEAN), |row| {
                Ok(match row[0] {
                    Value::Boolean(b) => Value::Boolean(!b),
                    _ => Value::Null,
                })
            })
        }
        EvaluatableNode::UnaryNegation(expr) => {
            let arg = evaluate(expr, context)?;
            require_scalar(&arg, &[ScalarType::Integer, ScalarType::Float], |t| {
                format!(
                    "UnaryNegation expression supports only integers and floats, got: {}",
                    t
                )
            })?;
            let dtype = arg.dtype().clone();
            map_rows(&[arg], node, dtype, |row| match row[0] {
                Value::Integer(i) => i
                    .checked_neg()
                    .map(Value::Integer)
                    .ok_or_else(|| Error::evaluation(format!("Integer overflow negating {}", i))),
                Value::Float(f) => Ok(Value::Float(-f)),
                _ => Ok(Value::Null),
            })
        }
        EvaluatableNode::NullCheck { expr, negated } => {
            let arg = evaluate(expr, context)?;
            map_rows(&[arg], node, Some(Type::BOOLEAN), |row| {
                Ok(Value::Boolean(row[0].is_null() != *negated))
            })
        }
        EvaluatableNode::InCheck {
            expr,
            elements,
            negated,
        } => {
            let mut args = Vec::with_capacity(elements.len() + 1);
            args.push(evaluate(expr, context)?);
            for element in elements {
                args.push(evaluate(element, context)?);
            }
            let types: Vec<Option<Type>> = args.iter().map(|a| a.dtype().clone()).collect();
            implicitly_coerce(&types)?;
            map_rows(&args, node, Some(Type::BOOLEAN), |row| {
                let (value, candidates) = row.split_first().ok_or_else(|| {
                    Error::evaluation("IN check evaluated without an operand")
                })?;
                let found = !value.is_null() && candidates.iter().any(|c| !c.is_null() && c == value);
                Ok(Value::Boolean(found != *negated))
            })
        }
        EvaluatableNode::Case { whens, else_ } => {
            let mut args = Vec::with_capacity(whens.len() * 2 + 1);
            for (when, then) in whens {
                let condition = evaluate(when, context)?;
                require_scalar(&condition, &[ScalarType::Boolean], |t| {
                    format!("CASE condition isn't boolean! Found: {}", t)
                })?;
                args.push(condition);
                args.push(evaluate(then, context)?);
            }
            args.push(evaluate(else_, context)?);
            conditional(args, node)
        }
        EvaluatableNode::If {
            condition,
            then,
            else_,
        } => {
            let condition = evaluate(condition, context)?;
            require_scalar(&condition, &[ScalarType::Boolean], |t| {
                format!("IF condition isn't boolean! Found: {}", t)
            })?;
            let args = vec![condition, evaluate(then, context)?, evaluate(else_, context)?];
            conditional(args, node)
        }
        EvaluatableNode::Cast { expr, target } => {
            let arg = evaluate(expr, context)?;
            map_rows(&[arg], node, Some(Type::Scalar(*target)), |row| {
                cast_value(row[0], *target)
            })
        }
        EvaluatableNode::Extract { part, expr } => {
            let arg = evaluate(expr, context)?;
            require_scalar(
                &arg,
                &[ScalarType::Date, ScalarType::Datetime, ScalarType::Timestamp],
                |t| format!("EXTRACT requires a DATE, DATETIME or TIMESTAMP, got: {}", t),
            )?;
            if let DatePart::WeekStarting(_) = part {
                return Err(Error::not_implemented(format!(
                    "EXTRACT({} FROM ...) is not implemented",
                    part
                )));
            }
            map_rows(&[arg], node, Some(Type::INTEGER), |row| {
                let date = match row[0] {
                    Value::Date(d) => *d,
                    Value::Datetime(d) => d.date(),
                    Value::Timestamp(t) => t.date_naive(),
                    _ => return Ok(Value::Null),
                };
                Ok(Value::Integer(extract_date_part(*part, date)))
            })
        }
        EvaluatableNode::Struct { declared, fields } => {
            let args = fields
                .iter()
                .map(|f| evaluate(f, context))
                .collect::<Result<Vec<_>>>()?;
            let dtype = struct_type(declared.as_deref(), &args)?;
            let field_types: Vec<Option<Type>> = match &dtype {
                Type::Struct(fields) => fields.iter().map(|f| f.dtype.clone()).collect(),
                _ => Vec::new(),
            };
            map_rows(&args, node, Some(dtype), |row| {
                Ok(Value::Struct(
                    row.iter()
                        .zip(field_types.iter())
                        .map(|(v, t)| (*v).clone().widen(t))
                        .collect(),
                ))
            })
        }
        EvaluatableNode::Array {
            element_type,
            elements,
            empty,
        } => {
            let args = elements
                .iter()
                .map(|e| evaluate(e, context))
                .collect::<Result<Vec<_>>>()?;
            let element = array_element_type(element_type.as_ref(), &args)?;
            let widen_to = Some(element.clone());
            map_rows(&args, node, Some(Type::array(element)), |row| {
                if *empty {
                    return Ok(Value::Array(Vec::new()));
                }
                Ok(Value::Array(
                    row.iter().map(|v| (*v).clone().widen(&widen_to)).collect(),
                ))
            })
        }
        EvaluatableNode::FunctionCall(call) => match call.convention() {
            CallingConvention::RowWise => scalar::evaluate_call(call, context),
            CallingConvention::Aggregating => aggregate::evaluate_aggregate(call, context),
            CallingConvention::Analytic => window::evaluate_analytic(call, context),
        },
        EvaluatableNode::Selector(selector) => evaluate(selector.expr(), context),
        EvaluatableNode::GroupedBy(inner) => Ok(match evaluate(inner, context)? {
            Evaluated::Grouped { column, groups } => {
                let values = groups
                    .iter()
                    .map(|group| {
                        group
                            .first()
                            .map_or(Value::Null, |&row| column.values()[row].clone())
                    })
                    .collect();
                Evaluated::Column(Column::new(values, column.dtype().clone()))
            }
            other => other,
        }),
    }
}

/// Fails unless `arg` has one of the scalar types `allowed` (or is untyped NULL).
fn require_scalar<F>(arg: &Evaluated, allowed: &[ScalarType], message: F) -> Result<()>
where
    F: FnOnce(String) -> String,
{
    let ok = match arg.dtype() {
        None => true,
        Some(t) => t.as_scalar().map_or(false, |s| allowed.contains(&s)),
    };
    if ok {
        Ok(())
    } else {
        Err(Error::type_error(message(type_name(arg.dtype()))))
    }
}

/// Shared evaluation of CASE and IF. `args` holds condition/result pairs
/// followed by the fallback result.
fn conditional(args: Vec<Evaluated>, node: &EvaluatableNode) -> Result<Evaluated> {
    let result_types: Vec<Option<Type>> = args
        .iter()
        .enumerate()
        .filter(|(i, _)| i % 2 == 1 || *i == args.len() - 1)
        .map(|(_, a)| a.dtype().clone())
        .collect();
    let dtype = implicitly_coerce(&result_types)?;
    let widen_to = dtype.clone();
    map_rows(&args, node, dtype, |row| {
        let (fallback, pairs) = row.split_last().ok_or_else(|| {
            Error::evaluation("conditional evaluated without branches")
        })?;
        let chosen = pairs
            .chunks(2)
            .find(|pair| matches!(pair[0], Value::Boolean(true)))
            .map_or(*fallback, |pair| pair[1]);
        Ok(chosen.clone().widen(&widen_to))
    })
}

fn struct_type(declared: Option<&[StructField]>, args: &[Evaluated]) -> Result<Type> {
    let Some(declared) = declared else {
        return Ok(Type::Struct(
            args.iter()
                .map(|a| StructField::new(None, a.dtype().clone()))
                .collect(),
        ));
    };
    if declared.len() != args.len() {
        return Err(Error::type_error(format!(
            "STRUCT declares {} fields but {} were given",
            declared.len(),
            args.len()
        )));
    }
    declared
        .iter()
        .zip(args.iter())
        .enumerate()
        .map(|(i, (field, arg))| {
            let actual = arg.dtype();
            let dtype = match &field.dtype {
                Some(expected) => {
                    let target = Some(expected.clone());
                    if coerce(&target, actual).ok().as_ref() != Some(&target) {
                        return Err(Error::type_error(format!(
                            "Struct field {} has type {} which does not coerce to {}",
                            i + 1,
                            type_name(actual),
                            expected
                        )));
                    }
                    target
                }
                None => actual.clone(),
            };
            Ok(StructField::new(field.name.clone(), dtype))
        })
        .collect::<Result<Vec<_>>>()
        .map(Type::Struct)
}

fn array_element_type(declared: Option<&Type>, args: &[Evaluated]) -> Result<Type> {
    let types: Vec<Option<Type>> = args.iter().map(|a| a.dtype().clone()).collect();
    if types.iter().flatten().chain(declared).any(|t| !t.is_array_element()) {
        return Err(Error::type_error("Cannot create arrays of arrays"));
    }
    let computed = implicitly_coerce(&types)?;
    let element = match declared {
        Some(declared) => {
            let target = Some(declared.clone());
            if coerce(&target, &computed).ok().as_ref() != Some(&target) {
                return Err(Error::type_error(format!(
                    "Array specifies type {}, incompatible with values of type {}",
                    declared,
                    type_name(&computed)
                )));
            }
            target
        }
        None => computed,
    };
    element.ok_or_else(|| Error::type_error("Cannot create arrays of type NULL"))
}

/// Computes an INTEGER date part; `WEEK(<day>)` is rejected before this is reached.
pub(crate) fn extract_date_part(part: DatePart, date: NaiveDate) -> i64 {
    let days_from_sunday = date.weekday().num_days_from_sunday() as i64;
    match part {
        DatePart::DayOfWeek => days_from_sunday + 1,
        DatePart::Day => date.day() as i64,
        DatePart::DayOfYear => date.ordinal() as i64,
        DatePart::Week | DatePart::WeekStarting(_) => {
            (date.ordinal0() as i64 + 7 - days_from_sunday) / 7
        }
        DatePart::IsoWeek => date.iso_week().week() as i64,
        DatePart::Month => date.month() as i64,
        DatePart::Quarter => (date.month0() / 3 + 1) as i64,
        DatePart::Year => date.year() as i64,
        DatePart::IsoYear => date.iso_week().year() as i64,
    }
}

/// Runs `select` once per row of `context`, each run seeing that single row
/// as its outer context.
fn evaluate_exists(select: &Select, context: &EvaluationContext<'_>) -> Result<Evaluated> {
    let mut values = Vec::with_capacity(context.num_rows());
    for row in 0..context.num_rows() {
        let row_context = context.row_context(row);
        let (table, _) = select.evaluate_in(context.catalog(), Some(&row_context))?;
        trace!("EXISTS row {}: {} rows", row, table.num_rows());
        values.push(Value::Boolean(table.num_rows() > 0));
    }
    let column = Column::new(values, Some(Type::BOOLEAN));
    Ok(match context.aggregation_groups() {
        Some(groups) if context.is_grouped() => Evaluated::Grouped {
            column,
            groups: Rc::clone(&groups),
        },
        _ => Evaluated::Column(column),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{OverClause, SelectField};
    use tabula_core::{Catalog, Table};

    fn table() -> Table {
        Table::from_rows(
            vec![("a", Type::INTEGER), ("s", Type::STRING), ("flag", Type::BOOLEAN)],
            vec![
                vec![Value::Integer(1), Value::from("one"), Value::Boolean(true)],
                vec![Value::Integer(2), Value::Null, Value::Boolean(false)],
                vec![Value::Null, Value::from("three"), Value::Null],
            ],
        )
        .unwrap()
    }

    fn eval(node: &EvaluatableNode) -> Result<Column> {
        let catalog = Catalog::new();
        let ctx = EvaluationContext::from_table(&catalog, &table(), Some("t"));
        evaluate(node, &ctx)?.into_column(ctx.num_rows())
    }

    fn field(name: &str) -> EvaluatableNode {
        EvaluatableNode::field(name)
    }

    fn lit(v: impl Into<Value>) -> EvaluatableNode {
        EvaluatableNode::literal(v)
    }

    #[test]
    fn test_literal_broadcast() {
        let column = eval(&lit(7i64)).unwrap();
        assert_eq!(column.values(), &[const { Value::Integer(7) }; 3]);
        assert_eq!(column.dtype(), &Some(Type::INTEGER));
    }

    #[test]
    fn test_not_requires_boolean() {
        let column = eval(&EvaluatableNode::not(field("flag"))).unwrap();
        assert_eq!(
            column.values(),
            &[Value::Boolean(false), Value::Boolean(true), Value::Null]
        );
        let err = eval(&EvaluatableNode::not(field("a"))).unwrap_err();
        assert!(err
            .to_string()
            .contains("NOT accepts only booleans but was given type: INTEGER"));
    }

    #[test]
    fn test_negation() {
        let column = eval(&EvaluatableNode::neg(field("a"))).unwrap();
        assert_eq!(
            column.values(),
            &[Value::Integer(-1), Value::Integer(-2), Value::Null]
        );
        let err = eval(&EvaluatableNode::neg(field("s"))).unwrap_err();
        assert!(err
            .to_string()
            .contains("UnaryNegation expression supports only integers and floats, got: STRING"));
        assert!(eval(&EvaluatableNode::neg(lit(i64::MIN))).is_err());
    }

    #[test]
    fn test_null_check() {
        let column = eval(&EvaluatableNode::is_null(field("s"))).unwrap();
        assert_eq!(
            column.values(),
            &[Value::Boolean(false), Value::Boolean(true), Value::Boolean(false)]
        );
    }

    #[test]
    fn test_in_check() {
        let column = eval(&EvaluatableNode::in_list(field("a"), vec![lit(2i64), lit(5.0)])).unwrap();
        assert_eq!(
            column.values(),
            &[Value::Boolean(false), Value::Boolean(true), Value::Boolean(false)]
        );
        let column = eval(&EvaluatableNode::not_in_list(field("a"), vec![EvaluatableNode::null()]))
            .unwrap();
        assert_eq!(column.values(), &[const { Value::Boolean(true) }; 3]);
        assert!(eval(&EvaluatableNode::in_list(field("a"), vec![lit("x")])).is_err());
    }

    #[test]
    fn test_case_first_match_wins() {
        let case = EvaluatableNode::case(
            None,
            vec![
                (EvaluatableNode::gt(field("a"), lit(0i64)), lit(1i64)),
                (EvaluatableNode::gt(field("a"), lit(1i64)), lit(2.5)),
            ],
            None,
        )
        .unwrap();
        let column = eval(&case).unwrap();
        assert_eq!(column.dtype(), &Some(Type::FLOAT));
        assert_eq!(
            column.values(),
            &[Value::Float(1.0), Value::Float(1.0), Value::Null]
        );
    }

    #[test]
    fn test_case_condition_must_be_boolean() {
        let case = EvaluatableNode::case(None, vec![(field("a"), lit(1i64))], None).unwrap();
        let err = eval(&case).unwrap_err();
        assert!(err
            .to_string()
            .contains("CASE condition isn't boolean! Found: INTEGER"));

        let if_ = EvaluatableNode::if_(field("s"), lit(1i64), lit(2i64));
        let err = eval(&if_).unwrap_err();
        assert!(err.to_string().contains("IF condition isn't boolean! Found: STRING"));
    }

    #[test]
    fn test_if_coerces_branches() {
        let if_ = EvaluatableNode::if_(field("flag"), lit(1i64), lit(2.0));
        let column = eval(&if_).unwrap();
        assert_eq!(
            column.values(),
            &[Value::Float(1.0), Value::Float(2.0), Value::Float(2.0)]
        );
        let bad = EvaluatableNode::if_(field("flag"), lit(1i64), lit("x"));
        assert!(eval(&bad).unwrap_err().is_coercion());
    }

    #[test]
    fn test_cast() {
        let column = eval(&EvaluatableNode::cast(field("a"), "STRING").unwrap()).unwrap();
        assert_eq!(
            column.values(),
            &[Value::from("1"), Value::from("2"), Value::Null]
        );
        assert!(eval(&EvaluatableNode::cast(field("s"), "INT64").unwrap()).is_err());
    }

    #[test]
    fn test_extract() {
        let date = NaiveDate::from_ymd_opt(2019, 1, 6).unwrap(); // a Sunday
        let run = |part: &str| {
            let node = EvaluatableNode::extract(part, lit(date)).unwrap();
            eval(&node).unwrap().values()[0].clone()
        };
        assert_eq!(run("DAYOFWEEK"), Value::Integer(1));
        assert_eq!(run("DAY"), Value::Integer(6));
        assert_eq!(run("DAYOFYEAR"), Value::Integer(6));
        assert_eq!(run("WEEK"), Value::Integer(1));
        assert_eq!(run("ISOWEEK"), Value::Integer(1));
        assert_eq!(run("QUARTER"), Value::Integer(1));
        assert_eq!(run("YEAR"), Value::Integer(2019));

        let before_first_sunday = NaiveDate::from_ymd_opt(2019, 1, 5).unwrap();
        assert_eq!(extract_date_part(DatePart::Week, before_first_sunday), 0);
        assert_eq!(extract_date_part(DatePart::IsoYear, NaiveDate::from_ymd_opt(2018, 12, 31).unwrap()), 2019);

        let err = eval(&EvaluatableNode::extract("WEEK(MONDAY)", lit(date)).unwrap()).unwrap_err();
        assert!(err.is_not_implemented());
        assert!(eval(&EvaluatableNode::extract("DAY", field("a")).unwrap()).is_err());
    }

    #[test]
    fn test_struct() {
        let node = EvaluatableNode::struct_typeless(vec![(field("a"), Some("x")), (lit("k"), None)]);
        let column = eval(&node).unwrap();
        assert_eq!(
            column.dtype(),
            &Some(Type::structure(vec![
                (Some("x"), Some(Type::INTEGER)),
                (None, Some(Type::STRING)),
            ]))
        );
        assert_eq!(
            column.values()[0],
            Value::Struct(vec![Value::Integer(1), Value::from("k")])
        );

        let typed = EvaluatableNode::struct_typed(
            Type::structure(vec![(Some("x"), Some(Type::FLOAT)), (Some("y"), Some(Type::INTEGER))]),
            vec![field("a"), lit("k")],
        )
        .unwrap();
        let err = eval(&typed).unwrap_err();
        assert!(err
            .to_string()
            .contains("Struct field 2 has type STRING which does not coerce to INTEGER"));
    }

    #[test]
    fn test_array() {
        let node = EvaluatableNode::array(None, Some(vec![field("a"), lit(1.5)]));
        let column = eval(&node).unwrap();
        assert_eq!(column.dtype(), &Some(Type::array(Type::FLOAT)));
        assert_eq!(
            column.values()[0],
            Value::Array(vec![Value::Float(1.0), Value::Float(1.5)])
        );

        let empty = eval(&EvaluatableNode::array(None, None)).unwrap();
        assert_eq!(empty.values(), &[const { Value::Array(vec![]) }; 3]);

        let mismatch = EvaluatableNode::array(Some(Type::INTEGER), Some(vec![lit(1.5)]));
        assert!(eval(&mismatch)
            .unwrap_err()
            .to_string()
            .contains("Array specifies type INTEGER, incompatible with values of type FLOAT"));

        let nested = EvaluatableNode::array(None, Some(vec![EvaluatableNode::array(None, None)]));
        assert!(eval(&nested)
            .unwrap_err()
            .to_string()
            .contains("Cannot create arrays of arrays"));

        let nulls = EvaluatableNode::array(None, Some(vec![EvaluatableNode::null()]));
        assert!(eval(&nulls)
            .unwrap_err()
            .to_string()
            .contains("Cannot create arrays of type NULL"));
    }

    #[test]
    fn test_exists_is_correlated() {
        let catalog = Catalog::new();
        let ctx = EvaluationContext::from_table(&catalog, &table(), Some("t"));
        // SELECT 1 WHERE t.a > 1, evaluated per outer row.
        let subquery = Select::new(vec![SelectField::expr(lit(1i64), None)])
            .filter(EvaluatableNode::gt(field("t.a"), lit(1i64)));
        let column = evaluate(&EvaluatableNode::exists(subquery), &ctx)
            .unwrap()
            .into_column(3)
            .unwrap();
        assert_eq!(
            column.values(),
            &[Value::Boolean(false), Value::Boolean(true), Value::Boolean(false)]
        );
    }

    #[test]
    fn test_analytic_dispatch() {
        let call = crate::ast::FunctionCall::new(
            "sum",
            vec![field("a")],
            Some(OverClause::default()),
        )
        .unwrap();
        let column = eval(&EvaluatableNode::call(call)).unwrap();
        assert_eq!(column.values(), &[const { Value::Integer(3) }; 3]);
    }
}
