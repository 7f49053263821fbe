//! Binary operator evaluation.

use crate::ast::{BinaryOp, EvaluatableNode};
use crate::executor::{map_rows, Evaluated};
use std::cmp::Ordering;
use tabula_core::pattern_match::LikePattern;
use tabula_core::{coerce, type_name, Error, Result, ScalarType, Type, Value};

pub(crate) fn evaluate_binary(
    op: BinaryOp,
    left: Evaluated,
    right: Evaluated,
    node: &EvaluatableNode,
) -> Result<Evaluated> {
    let (lt, rt) = (left.dtype().clone(), right.dtype().clone());
    let args = [left, right];
    let operands_error = |expected: &str| {
        Error::type_error(format!(
            "{} requires {} operands, got {} and {}",
            op.symbol(),
            expected,
            type_name(&lt),
            type_name(&rt)
        ))
    };

    if op.is_arithmetic() {
        if !all_scalar(&[&lt, &rt], &[ScalarType::Integer, ScalarType::Float]) {
            return Err(operands_error("numeric"));
        }
        let dtype = match op {
            BinaryOp::Div => Some(Type::FLOAT),
            _ => coerce(&lt, &rt)?,
        };
        return map_rows(&args, node, dtype, |row| arithmetic(op, row[0], row[1]));
    }

    if op.is_comparison() {
        coerce(&lt, &rt)?;
        return map_rows(&args, node, Some(Type::BOOLEAN), |row| {
            let (a, b) = (row[0], row[1]);
            if a.is_null() || b.is_null() {
                return Ok(Value::Null);
            }
            let ordering = a.cmp(b);
            Ok(Value::Boolean(match op {
                BinaryOp::Eq => ordering == Ordering::Equal,
                BinaryOp::Ne => ordering != Ordering::Equal,
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        });
    }

    match op {
        BinaryOp::And | BinaryOp::Or => {
            if !all_scalar(&[&lt, &rt], &[ScalarType::Boolean]) {
                return Err(operands_error("BOOLEAN"));
            }
            let is_and = op == BinaryOp::And;
            map_rows(&args, node, Some(Type::BOOLEAN), |row| {
                // Three-valued logic: FALSE dominates AND, TRUE dominates OR.
                Ok(match (row[0].as_bool(), row[1].as_bool()) {
                    (Some(a), Some(b)) => Value::Boolean(if is_and { a && b } else { a || b }),
                    (Some(x), None) | (None, Some(x)) if x != is_and => Value::Boolean(x),
                    _ => Value::Null,
                })
            })
        }
        BinaryOp::Like | BinaryOp::NotLike => {
            if !all_scalar(&[&lt, &rt], &[ScalarType::String]) {
                return Err(operands_error("STRING"));
            }
            let negated = op == BinaryOp::NotLike;
            let mut cached: Option<(String, LikePattern)> = None;
            map_rows(&args, node, Some(Type::BOOLEAN), |row| {
                let (Some(value), Some(pattern)) = (row[0].as_str(), row[1].as_str()) else {
                    return Ok(Value::Null);
                };
                if cached.as_ref().map_or(true, |(source, _)| source != pattern) {
                    cached = Some((pattern.to_string(), LikePattern::new(pattern)));
                }
                let matched = cached
                    .as_ref()
                    .map_or(false, |(_, compiled)| compiled.matches(value));
                Ok(Value::Boolean(matched != negated))
            })
        }
        BinaryOp::Concat => {
            if !all_scalar(&[&lt, &rt], &[ScalarType::String]) {
                return Err(operands_error("STRING"));
            }
            map_rows(&args, node, Some(Type::STRING), |row| {
                Ok(match (row[0].as_str(), row[1].as_str()) {
                    (Some(a), Some(b)) => Value::String(format!("{}{}", a, b)),
                    _ => Value::Null,
                })
            })
        }
        _ => Err(Error::not_implemented(format!("operator {}", op.symbol()))),
    }
}

fn all_scalar(types: &[&Option<Type>], allowed: &[ScalarType]) -> bool {
    types.iter().all(|t| match t {
        None => true,
        Some(t) => t.as_scalar().map_or(false, |s| allowed.contains(&s)),
    })
}

fn arithmetic(op: BinaryOp, a: &Value, b: &Value) -> Result<Value> {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Integer(x), Value::Integer(y)) => {
            let (x, y) = (*x, *y);
            let result = match op {
                BinaryOp::Add => x.checked_add(y),
                BinaryOp::Sub => x.checked_sub(y),
                BinaryOp::Mul => x.checked_mul(y),
                _ => {
                    if y == 0 {
                        return Err(Error::evaluation(format!("Division by zero: {} / {}", x, y)));
                    }
                    return Ok(Value::Float(x as f64 / y as f64));
                }
            };
            result.map(Value::Integer).ok_or_else(|| {
                Error::evaluation(format!(
                    "Integer overflow: {} {} {}",
                    x,
                    op.symbol(),
                    y
                ))
            })
        }
        _ => {
            let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) else {
                return Err(Error::type_error(format!(
                    "Cannot apply {} to {:?} and {:?}",
                    op.symbol(),
                    a,
                    b
                )));
            };
            Ok(Value::Float(match op {
                BinaryOp::Add => x + y,
                BinaryOp::Sub => x - y,
                BinaryOp::Mul => x * y,
                _ => {
                    if y == 0.0 {
                        return Err(Error::evaluation(format!("Division by zero: {} / {}", x, y)));
                    }
                    x / y
                }
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_core::Column;

    fn column(values: Vec<Value>, dtype: Type) -> Evaluated {
        Evaluated::Column(Column::new(values, Some(dtype)))
    }

    fn run(op: BinaryOp, left: Evaluated, right: Evaluated) -> Result<Vec<Value>> {
        let node = EvaluatableNode::field("expr");
        Ok(evaluate_binary(op, left, right, &node)?
            .into_column(3)?
            .into_values())
    }

    fn bools(values: [Option<bool>; 3]) -> Evaluated {
        column(values.iter().map(|v| Value::from(*v)).collect(), Type::BOOLEAN)
    }

    #[test]
    fn test_integer_arithmetic() {
        let a = || column(vec![Value::Integer(1), Value::Integer(2), Value::Null], Type::INTEGER);
        let b = || column(vec![Value::Integer(10), Value::Integer(20), Value::Integer(30)], Type::INTEGER);
        assert_eq!(
            run(BinaryOp::Add, a(), b()).unwrap(),
            vec![Value::Integer(11), Value::Integer(22), Value::Null]
        );
        assert_eq!(
            run(BinaryOp::Div, b(), a()).unwrap(),
            vec![Value::Float(10.0), Value::Float(10.0), Value::Null]
        );
    }

    #[test]
    fn test_mixed_numeric_widens() {
        let a = column(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)], Type::INTEGER);
        let b = column(vec![Value::Float(0.5), Value::Float(0.5), Value::Float(0.5)], Type::FLOAT);
        assert_eq!(
            run(BinaryOp::Mul, a, b).unwrap(),
            vec![Value::Float(0.5), Value::Float(1.0), Value::Float(1.5)]
        );
    }

    #[test]
    fn test_overflow_and_division_by_zero() {
        let max = column(vec![Value::Integer(i64::MAX); 3], Type::INTEGER);
        let one = column(vec![Value::Integer(1); 3], Type::INTEGER);
        let err = run(BinaryOp::Add, max, one).unwrap_err();
        assert!(err.to_string().contains("overflow"));

        let one = column(vec![Value::Integer(1); 3], Type::INTEGER);
        let zero = column(vec![Value::Integer(0); 3], Type::INTEGER);
        let err = run(BinaryOp::Div, one, zero).unwrap_err();
        assert!(err.to_string().contains("Division by zero"));
    }

    #[test]
    fn test_arithmetic_requires_numbers() {
        let s = column(vec!["a".into(); 3], Type::STRING);
        let n = column(vec![Value::Integer(1); 3], Type::INTEGER);
        assert!(run(BinaryOp::Add, s, n).is_err());
    }

    #[test]
    fn test_three_valued_logic() {
        let left = || bools([Some(false), Some(true), None]);
        let right = || bools([None, None, None]);
        assert_eq!(
            run(BinaryOp::And, left(), right()).unwrap(),
            vec![Value::Boolean(false), Value::Null, Value::Null]
        );
        assert_eq!(
            run(BinaryOp::Or, left(), right()).unwrap(),
            vec![Value::Null, Value::Boolean(true), Value::Null]
        );
    }

    #[test]
    fn test_comparison() {
        let a = column(vec![Value::Integer(1), Value::Integer(2), Value::Null], Type::INTEGER);
        let b = column(vec![Value::Float(1.5), Value::Float(2.0), Value::Float(1.0)], Type::FLOAT);
        assert_eq!(
            run(BinaryOp::Le, a, b).unwrap(),
            vec![Value::Boolean(true), Value::Boolean(true), Value::Null]
        );
        let s = column(vec!["x".into(); 3], Type::STRING);
        let n = column(vec![Value::Integer(1); 3], Type::INTEGER);
        assert!(run(BinaryOp::Eq, s, n).unwrap_err().is_coercion());
    }

    #[test]
    fn test_like() {
        let values = column(vec!["apple".into(), "banana".into(), Value::Null], Type::STRING);
        let pattern = Evaluated::Constant {
            value: "%an%".into(),
            dtype: Some(Type::STRING),
        };
        assert_eq!(
            run(BinaryOp::NotLike, values, pattern).unwrap(),
            vec![Value::Boolean(true), Value::Boolean(false), Value::Null]
        );
    }

    #[test]
    fn test_concat() {
        let a = column(vec!["a".into(), Value::Null, "c".into()], Type::STRING);
        let b = column(vec!["x".into(), "y".into(), "z".into()], Type::STRING);
        assert_eq!(
            run(BinaryOp::Concat, a, b).unwrap(),
            vec![Value::from("ax"), Value::Null, Value::from("cz")]
        );
    }
}
