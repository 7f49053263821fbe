//! Row-wise function evaluation.

use crate::ast::{Function, FunctionCall};
use crate::context::EvaluationContext;
use crate::executor::{evaluate, map_rows, Evaluated};
use chrono::{DateTime, Utc};
#[cfg(feature = "regex-functions")]
use regex::Regex;
use tabula_core::{cast_value, Error, Result, ScalarType, Type, Value};

/// Per-call state shared by every row: the statement clock and compiled patterns.
pub(crate) struct RowKernel {
    function: Function,
    dtype: Option<Type>,
    now: DateTime<Utc>,
    #[cfg(feature = "regex-functions")]
    regex: Option<(String, Regex)>,
}

impl RowKernel {
    pub(crate) fn new(function: Function, dtype: Option<Type>) -> Self {
        Self {
            function,
            dtype,
            now: Utc::now(),
            #[cfg(feature = "regex-functions")]
            regex: None,
        }
    }

    /// Applies the function to one row of arguments.
    pub(crate) fn apply(&mut self, args: &[&Value]) -> Result<Value> {
        if self.function == Function::CurrentTimestamp {
            return Ok(Value::Timestamp(self.now));
        }
        if args.iter().any(|v| v.is_null()) {
            return Ok(Value::Null);
        }
        match self.function {
            Function::Mod => self.modulo(args[0], args[1]),
            Function::Concat => {
                let mut out = String::new();
                for arg in args {
                    out.push_str(arg.as_str().unwrap_or_default());
                }
                Ok(Value::String(out))
            }
            Function::Timestamp => cast_value(args[0], ScalarType::Timestamp),
            Function::Abs => match args[0] {
                Value::Integer(i) => i
                    .checked_abs()
                    .map(Value::Integer)
                    .ok_or_else(|| Error::evaluation(format!("Integer overflow: ABS({})", i))),
                Value::Float(f) => Ok(Value::Float(f.abs())),
                other => Err(unexpected(self.function, other)),
            },
            Function::Lower => Ok(Value::String(
                args[0].as_str().unwrap_or_default().to_lowercase(),
            )),
            Function::Upper => Ok(Value::String(
                args[0].as_str().unwrap_or_default().to_uppercase(),
            )),
            Function::Length => match args[0] {
                Value::String(s) => Ok(Value::Integer(s.chars().count() as i64)),
                Value::Bytes(b) => Ok(Value::Integer(b.len() as i64)),
                other => Err(unexpected(self.function, other)),
            },
            #[cfg(feature = "regex-functions")]
            Function::RegexpContains => {
                let (Some(value), Some(pattern)) = (args[0].as_str(), args[1].as_str()) else {
                    return Err(unexpected(self.function, args[0]));
                };
                if self.regex.as_ref().map_or(true, |(source, _)| source != pattern) {
                    let compiled = Regex::new(pattern).map_err(|e| {
                        Error::evaluation(format!("Invalid regex {:?}: {}", pattern, e))
                    })?;
                    self.regex = Some((pattern.to_string(), compiled));
                }
                Ok(Value::Boolean(
                    self.regex
                        .as_ref()
                        .map_or(false, |(_, regex)| regex.is_match(value)),
                ))
            }
            Function::RowNumber => Err(Error::semantic("ROW_NUMBER requires an OVER clause")),
            aggregating => Err(Error::semantic(format!(
                "{} cannot be applied row by row",
                aggregating.name()
            ))),
        }
    }

    fn modulo(&self, a: &Value, b: &Value) -> Result<Value> {
        let zero = || Error::evaluation(format!("Division by zero: MOD({}, {})", a, b));
        match (a, b) {
            (Value::Integer(x), Value::Integer(y)) => {
                if *y == 0 {
                    return Err(zero());
                }
                // i64::MIN % -1 overflows in two's complement but is mathematically 0.
                Ok(Value::Integer(x.checked_rem(*y).unwrap_or(0)))
            }
            _ => match (a.as_f64(), b.as_f64()) {
                (Some(_), Some(y)) if y == 0.0 => Err(zero()),
                (Some(x), Some(y)) => Ok(Value::Float(x % y)),
                _ => Err(unexpected(self.function, a)),
            },
        }
        .map(|v| v.widen(&self.dtype))
    }
}

fn unexpected(function: Function, value: &Value) -> Error {
    Error::type_error(format!("{} cannot be applied to {:?}", function.name(), value))
}

/// Evaluates a row-wise call: arguments first, then the kernel row by row.
pub(crate) fn evaluate_call(call: &FunctionCall, context: &EvaluationContext<'_>) -> Result<Evaluated> {
    let args = call
        .args()
        .iter()
        .map(|arg| evaluate(arg, context))
        .collect::<Result<Vec<_>>>()?;
    let types: Vec<Option<Type>> = args.iter().map(|a| a.dtype().clone()).collect();
    let dtype = call.function().result_type(&types)?;
    let mut kernel = RowKernel::new(*call.function(), dtype.clone());
    map_rows(&args, call, dtype, |row| kernel.apply(row))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::EvaluatableNode;
    use tabula_core::{Catalog, Table};

    fn eval(name: &str, args: Vec<EvaluatableNode>) -> Result<Value> {
        let catalog = Catalog::new();
        let ctx = EvaluationContext::new(&catalog);
        let call = FunctionCall::new(name, args, None)?;
        let column = evaluate_call(&call, &ctx)?.into_column(1)?;
        Ok(column.values()[0].clone())
    }

    fn lit(v: impl Into<Value>) -> EvaluatableNode {
        EvaluatableNode::literal(v)
    }

    #[test]
    fn test_mod() {
        assert_eq!(eval("mod", vec![lit(7i64), lit(3i64)]).unwrap(), Value::Integer(1));
        assert_eq!(eval("mod", vec![lit(-7i64), lit(3i64)]).unwrap(), Value::Integer(-1));
        assert_eq!(eval("mod", vec![lit(7.5), lit(2i64)]).unwrap(), Value::Float(1.5));
        assert_eq!(eval("mod", vec![lit(7i64), EvaluatableNode::null()]).unwrap(), Value::Null);
        assert!(eval("mod", vec![lit(7i64), lit(0i64)]).is_err());
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(
            eval("concat", vec![lit("a"), lit("b"), lit("c")]).unwrap(),
            Value::from("abc")
        );
        assert_eq!(eval("lower", vec![lit("AbC")]).unwrap(), Value::from("abc"));
        assert_eq!(eval("upper", vec![lit("AbC")]).unwrap(), Value::from("ABC"));
        assert_eq!(eval("length", vec![lit("héllo")]).unwrap(), Value::Integer(5));
        assert!(eval("upper", vec![lit(1i64)]).is_err());
    }

    #[test]
    fn test_abs() {
        assert_eq!(eval("abs", vec![lit(-3i64)]).unwrap(), Value::Integer(3));
        assert_eq!(eval("abs", vec![lit(-2.5)]).unwrap(), Value::Float(2.5));
        assert!(eval("abs", vec![lit(i64::MIN)]).is_err());
    }

    #[test]
    fn test_timestamp() {
        match eval("timestamp", vec![lit("2019-03-01 12:00:00")]).unwrap() {
            Value::Timestamp(t) => assert_eq!(t.to_rfc3339(), "2019-03-01T12:00:00+00:00"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(eval("timestamp", vec![lit("not a time")]).is_err());
    }

    #[test]
    fn test_current_timestamp_is_constant_per_statement() {
        let catalog = Catalog::new();
        let table = Table::from_rows(
            vec![("a", Type::INTEGER)],
            vec![vec![Value::Integer(1)], vec![Value::Integer(2)]],
        )
        .unwrap();
        let ctx = EvaluationContext::from_table(&catalog, &table, Some("t"));
        let call = FunctionCall::new("current_timestamp", vec![], None).unwrap();
        let column = evaluate_call(&call, &ctx)
            .unwrap()
            .into_column(ctx.num_rows())
            .unwrap();
        assert_eq!(column.len(), 2);
        assert_eq!(column.values()[0], column.values()[1]);
        assert_eq!(column.dtype(), &Some(Type::TIMESTAMP));
    }

    #[cfg(feature = "regex-functions")]
    #[test]
    fn test_regexp_contains() {
        assert_eq!(
            eval("regexp_contains", vec![lit("abc123"), lit("\\d+")]).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            eval("regexp_contains", vec![lit("abc"), lit("^b")]).unwrap(),
            Value::Boolean(false)
        );
        assert!(eval("regexp_contains", vec![lit("abc"), lit("[a")]).is_err());
    }

    #[cfg(feature = "regex-functions")]
    #[test]
    fn test_regexp_contains_full_syntax() {
        let contains = |value: &str, pattern: &str| {
            eval("regexp_contains", vec![lit(value), lit(pattern)]).unwrap()
        };
        assert_eq!(contains("dog", "cat|dog"), Value::Boolean(true));
        assert_eq!(contains("aa", "^a{2}$"), Value::Boolean(true));
        assert_eq!(contains("aaa", "^a{2}$"), Value::Boolean(false));
        assert_eq!(contains("dog", "(d)og"), Value::Boolean(true));
        assert_eq!(contains("bird", "^(cat|dog)$"), Value::Boolean(false));
    }

    #[test]
    fn test_row_number_needs_window() {
        let err = eval("row_number", vec![]).unwrap_err();
        assert!(err.to_string().contains("OVER"));
    }
}
