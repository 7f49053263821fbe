//! Function registry and call nodes.
//!
//! The set of callable functions is closed: every name maps to one
//! [`Function`] variant, tagged with a [`FunctionKind`]. How a particular call
//! is evaluated ([`CallingConvention`]) is fixed when the call is built, from
//! the function's kind and the presence of an OVER clause.

use crate::ast::{EvaluatableNode, SortOrder};
use std::fmt;
use tabula_core::{implicitly_coerce, type_name, Error, Result, ScalarType, Type};

/// Whether a function maps rows or reduces them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctionKind {
    RowWise,
    Aggregating,
}

/// How a call is evaluated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallingConvention {
    /// One output row per input row.
    RowWise,
    /// One output row per group (or one in total without grouping).
    Aggregating,
    /// One output row per input row, computed per window partition.
    Analytic,
}

/// Modifiers of an `ARRAY_AGG` call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArrayAggOptions {
    pub distinct: bool,
    pub ignore_nulls: bool,
    /// An `ORDER BY` was given inside the call.
    pub ordered: bool,
    /// A `LIMIT` was given inside the call.
    pub limited: bool,
}

/// A registered function.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Function {
    Sum,
    Min,
    Max,
    Avg,
    Count { distinct: bool },
    ArrayAgg(ArrayAggOptions),
    Mod,
    Concat,
    Timestamp,
    CurrentTimestamp,
    RowNumber,
    Abs,
    Lower,
    Upper,
    Length,
    #[cfg(feature = "regex-functions")]
    RegexpContains,
}

impl Function {
    /// Every registered name.
    pub fn names() -> Vec<&'static str> {
        let mut names = vec![
            "SUM",
            "MIN",
            "MAX",
            "AVG",
            "COUNT",
            "ARRAY_AGG",
            "MOD",
            "CONCAT",
            "TIMESTAMP",
            "CURRENT_TIMESTAMP",
            "ROW_NUMBER",
            "ABS",
            "LOWER",
            "UPPER",
            "LENGTH",
        ];
        #[cfg(feature = "regex-functions")]
        names.push("REGEXP_CONTAINS");
        names
    }

    /// Looks up a function by name, case-insensitively.
    pub fn lookup(name: &str) -> Result<Function> {
        let upper = name.to_ascii_uppercase();
        let function = match upper.as_str() {
            "SUM" => Function::Sum,
            "MIN" => Function::Min,
            "MAX" => Function::Max,
            "AVG" => Function::Avg,
            "COUNT" => Function::Count { distinct: false },
            "ARRAY_AGG" => Function::ArrayAgg(ArrayAggOptions::default()),
            "MOD" => Function::Mod,
            "CONCAT" => Function::Concat,
            "TIMESTAMP" => Function::Timestamp,
            "CURRENT_TIMESTAMP" => Function::CurrentTimestamp,
            "ROW_NUMBER" => Function::RowNumber,
            "ABS" => Function::Abs,
            "LOWER" => Function::Lower,
            "UPPER" => Function::Upper,
            "LENGTH" => Function::Length,
            #[cfg(feature = "regex-functions")]
            "REGEXP_CONTAINS" => Function::RegexpContains,
            _ => {
                return Err(Error::not_implemented(format!(
                    "Function {} not implemented",
                    upper
                )))
            }
        };
        Ok(function)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::Sum => "SUM",
            Function::Min => "MIN",
            Function::Max => "MAX",
            Function::Avg => "AVG",
            Function::Count { .. } => "COUNT",
            Function::ArrayAgg(_) => "ARRAY_AGG",
            Function::Mod => "MOD",
            Function::Concat => "CONCAT",
            Function::Timestamp => "TIMESTAMP",
            Function::CurrentTimestamp => "CURRENT_TIMESTAMP",
            Function::RowNumber => "ROW_NUMBER",
            Function::Abs => "ABS",
            Function::Lower => "LOWER",
            Function::Upper => "UPPER",
            Function::Length => "LENGTH",
            #[cfg(feature = "regex-functions")]
            Function::RegexpContains => "REGEXP_CONTAINS",
        }
    }

    pub fn kind(&self) -> FunctionKind {
        match self {
            Function::Sum
            | Function::Min
            | Function::Max
            | Function::Avg
            | Function::Count { .. }
            | Function::ArrayAgg(_) => FunctionKind::Aggregating,
            _ => FunctionKind::RowWise,
        }
    }

    /// Accepted number of user-supplied arguments, as `(min, max)`.
    fn arity(&self) -> (usize, Option<usize>) {
        match self {
            Function::CurrentTimestamp | Function::RowNumber => (0, Some(0)),
            Function::Mod => (2, Some(2)),
            #[cfg(feature = "regex-functions")]
            Function::RegexpContains => (2, Some(2)),
            Function::Concat => (1, None),
            _ => (1, Some(1)),
        }
    }

    /// Computes the result type from the argument types, rejecting
    /// arguments of the wrong kind.
    pub fn result_type(&self, args: &[Option<Type>]) -> Result<Option<Type>> {
        let wrong = |expected: &str| {
            let names: Vec<String> = args.iter().map(type_name).collect();
            Error::type_error(format!(
                "{} expects {} arguments, got ({})",
                self.name(),
                expected,
                names.join(", ")
            ))
        };
        let all_of = |kinds: &[ScalarType]| {
            args.iter().all(|t| match t {
                None => true,
                Some(t) => t.as_scalar().map_or(false, |s| kinds.contains(&s)),
            })
        };
        const NUMERIC: &[ScalarType] = &[ScalarType::Integer, ScalarType::Float];

        match self {
            Function::Sum | Function::Mod | Function::Abs => {
                if !all_of(NUMERIC) {
                    return Err(wrong("numeric"));
                }
                implicitly_coerce(args)
            }
            Function::Min | Function::Max => implicitly_coerce(args),
            Function::Avg => {
                if !all_of(NUMERIC) {
                    return Err(wrong("numeric"));
                }
                Ok(Some(Type::FLOAT))
            }
            Function::Count { .. } | Function::RowNumber => Ok(Some(Type::INTEGER)),
            Function::ArrayAgg(_) => match implicitly_coerce(args)? {
                Some(Type::Scalar(s)) => Ok(Some(Type::array(Type::Scalar(s)))),
                other => Err(Error::type_error(format!(
                    "ARRAY_AGG supports only scalar element types, got {}",
                    type_name(&other)
                ))),
            },
            Function::Concat | Function::Lower | Function::Upper => {
                if !all_of(&[ScalarType::String]) {
                    return Err(wrong("STRING"));
                }
                Ok(Some(Type::STRING))
            }
            Function::Length => {
                if !all_of(&[ScalarType::String, ScalarType::Bytes]) {
                    return Err(wrong("STRING or BYTES"));
                }
                Ok(Some(Type::INTEGER))
            }
            Function::Timestamp => {
                if !all_of(&[
                    ScalarType::String,
                    ScalarType::Date,
                    ScalarType::Datetime,
                    ScalarType::Timestamp,
                ]) {
                    return Err(wrong("STRING or temporal"));
                }
                Ok(Some(Type::TIMESTAMP))
            }
            Function::CurrentTimestamp => Ok(Some(Type::TIMESTAMP)),
            #[cfg(feature = "regex-functions")]
            Function::RegexpContains => {
                if !all_of(&[ScalarType::String]) {
                    return Err(wrong("STRING"));
                }
                Ok(Some(Type::BOOLEAN))
            }
        }
    }
}

/// `OVER (PARTITION BY ... ORDER BY ...)`
#[derive(Clone, Debug, Default)]
pub struct OverClause {
    pub partition_by: Vec<EvaluatableNode>,
    pub order_by: Vec<(EvaluatableNode, SortOrder)>,
}

impl OverClause {
    pub fn new(
        partition_by: Vec<EvaluatableNode>,
        order_by: Vec<(EvaluatableNode, SortOrder)>,
    ) -> Self {
        Self {
            partition_by,
            order_by,
        }
    }
}

impl fmt::Display for OverClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OVER (")?;
        if !self.partition_by.is_empty() {
            let parts: Vec<String> = self.partition_by.iter().map(|p| p.to_string()).collect();
            write!(f, "PARTITION BY {}", parts.join(", "))?;
        }
        if !self.order_by.is_empty() {
            if !self.partition_by.is_empty() {
                f.write_str(" ")?;
            }
            let keys: Vec<String> = self
                .order_by
                .iter()
                .map(|(expr, order)| match order {
                    SortOrder::Asc => expr.to_string(),
                    SortOrder::Desc => format!("{} DESC", expr),
                })
                .collect();
            write!(f, "ORDER BY {}", keys.join(", "))?;
        }
        f.write_str(")")
    }
}

/// Argument of `COUNT`.
#[derive(Clone, Debug)]
pub enum CountArgument {
    /// `COUNT(*)`
    Star,
    /// `COUNT([DISTINCT] expr)`
    Expr {
        expr: EvaluatableNode,
        distinct: bool,
    },
}

/// A call of a registered function.
#[derive(Clone, Debug)]
pub struct FunctionCall {
    function: Function,
    args: Vec<EvaluatableNode>,
    over: Option<OverClause>,
}

impl FunctionCall {
    /// Builds a call of the function registered under `name`.
    pub fn new(name: &str, args: Vec<EvaluatableNode>, over: Option<OverClause>) -> Result<Self> {
        Self::with_function(Function::lookup(name)?, args, over)
    }

    /// Builds a call, checking the argument count.
    ///
    /// Zero-argument functions receive a synthetic constant argument so that
    /// their output takes the row count of the context.
    pub fn with_function(
        function: Function,
        mut args: Vec<EvaluatableNode>,
        over: Option<OverClause>,
    ) -> Result<Self> {
        if function.kind() == FunctionKind::Aggregating && args.len() != 1 {
            return Err(Error::not_implemented(
                "Aggregating functions are only supported with 1 argument",
            ));
        }
        let (min, max) = function.arity();
        if args.len() < min || max.map_or(false, |max| args.len() > max) {
            let expected = match max {
                Some(max) if max == min => min.to_string(),
                Some(max) => format!("{} to {}", min, max),
                None => format!("at least {}", min),
            };
            return Err(Error::semantic(format!(
                "{} expects {} arguments, got {}",
                function.name(),
                expected,
                args.len()
            )));
        }
        if args.is_empty() {
            args.push(EvaluatableNode::literal(1i64));
        }
        Ok(Self {
            function,
            args,
            over,
        })
    }

    /// `COUNT(*)` or `COUNT([DISTINCT] expr)`.
    pub fn count(argument: CountArgument, over: Option<OverClause>) -> Result<Self> {
        let (expr, distinct) = match argument {
            CountArgument::Star => (EvaluatableNode::literal(1i64), false),
            CountArgument::Expr { expr, distinct } => (expr, distinct),
        };
        Self::with_function(Function::Count { distinct }, vec![expr], over)
    }

    /// `ARRAY_AGG(expr ...)` with its modifiers.
    pub fn array_agg(
        expr: EvaluatableNode,
        options: ArrayAggOptions,
        over: Option<OverClause>,
    ) -> Result<Self> {
        Self::with_function(Function::ArrayAgg(options), vec![expr], over)
    }

    #[inline]
    pub fn function(&self) -> &Function {
        &self.function
    }

    #[inline]
    pub fn args(&self) -> &[EvaluatableNode] {
        &self.args
    }

    #[inline]
    pub fn over(&self) -> Option<&OverClause> {
        self.over.as_ref()
    }

    pub fn convention(&self) -> CallingConvention {
        match (&self.over, self.function.kind()) {
            (Some(_), _) => CallingConvention::Analytic,
            (None, FunctionKind::Aggregating) => CallingConvention::Aggregating,
            (None, FunctionKind::RowWise) => CallingConvention::RowWise,
        }
    }

    pub(crate) fn children(&self) -> Vec<&EvaluatableNode> {
        let mut children: Vec<&EvaluatableNode> = self.args.iter().collect();
        if let Some(over) = &self.over {
            children.extend(over.partition_by.iter());
            children.extend(over.order_by.iter().map(|(expr, _)| expr));
        }
        children
    }

    pub(crate) fn try_map_children<F>(&self, mut f: F) -> Result<FunctionCall>
    where
        F: FnMut(&EvaluatableNode) -> Result<EvaluatableNode>,
    {
        let args = self.args.iter().map(&mut f).collect::<Result<Vec<_>>>()?;
        let over = match &self.over {
            Some(over) => Some(OverClause {
                partition_by: over.partition_by.iter().map(&mut f).collect::<Result<_>>()?,
                order_by: over
                    .order_by
                    .iter()
                    .map(|(expr, order)| Ok((f(expr)?, *order)))
                    .collect::<Result<_>>()?,
            }),
            None => None,
        };
        Ok(FunctionCall {
            function: self.function,
            args,
            over,
        })
    }
}

impl fmt::Display for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.function.name())?;
        let distinct = matches!(
            self.function,
            Function::Count { distinct: true } | Function::ArrayAgg(ArrayAggOptions { distinct: true, .. })
        );
        if distinct {
            f.write_str("DISTINCT ")?;
        }
        if self.function.arity().0 > 0 {
            let args: Vec<String> = self.args.iter().map(|a| a.to_string()).collect();
            f.write_str(&args.join(", "))?;
        }
        f.write_str(")")?;
        if let Some(over) = &self.over {
            write!(f, " {}", over)?;
        }
        Ok(())
    }
}
