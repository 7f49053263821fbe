//! Expression AST definitions.

use crate::ast::{CallingConvention, FunctionCall, Select};
use crate::context::EvaluationContext;
use chrono::Weekday;
use std::fmt;
use tabula_core::{type_name, Error, Result, ScalarType, StructField, Type, Value};

/// Binary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Logical
    And,
    Or,
    // String/Pattern
    Like,
    NotLike,
    Concat,
}

impl BinaryOp {
    /// Returns the SQL spelling of the operator.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Like => "LIKE",
            BinaryOp::NotLike => "NOT LIKE",
            BinaryOp::Concat => "||",
        }
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div
        )
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

/// Sort order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    /// Parses an optional `ASC`/`DESC` keyword; anything but `DESC` is ascending.
    pub fn from_keyword(keyword: Option<&str>) -> Self {
        match keyword {
            Some(k) if k.eq_ignore_ascii_case("DESC") => SortOrder::Desc,
            _ => SortOrder::Asc,
        }
    }
}

const WEEKDAYS: [(&str, Weekday); 7] = [
    ("SUNDAY", Weekday::Sun),
    ("MONDAY", Weekday::Mon),
    ("TUESDAY", Weekday::Tue),
    ("WEDNESDAY", Weekday::Wed),
    ("THURSDAY", Weekday::Thu),
    ("FRIDAY", Weekday::Fri),
    ("SATURDAY", Weekday::Sat),
];

/// A date part accepted by `EXTRACT`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatePart {
    /// 1 = Sunday .. 7 = Saturday
    DayOfWeek,
    Day,
    DayOfYear,
    /// Sunday-started weeks; days before the first Sunday are week 0.
    Week,
    /// `WEEK(<weekday>)`; accepted but not evaluated.
    WeekStarting(Weekday),
    IsoWeek,
    Month,
    Quarter,
    Year,
    IsoYear,
}

impl DatePart {
    /// Parses a date part name such as `DAYOFWEEK` or `WEEK(MONDAY)`.
    pub fn parse(part: &str) -> Result<Self> {
        let upper = part.trim().to_ascii_uppercase();
        let parsed = match upper.as_str() {
            "DAYOFWEEK" => Some(DatePart::DayOfWeek),
            "DAY" => Some(DatePart::Day),
            "DAYOFYEAR" => Some(DatePart::DayOfYear),
            "WEEK" => Some(DatePart::Week),
            "ISOWEEK" => Some(DatePart::IsoWeek),
            "MONTH" => Some(DatePart::Month),
            "QUARTER" => Some(DatePart::Quarter),
            "YEAR" => Some(DatePart::Year),
            "ISOYEAR" => Some(DatePart::IsoYear),
            other => other
                .strip_prefix("WEEK(")
                .and_then(|rest| rest.strip_suffix(')'))
                .and_then(|day| WEEKDAYS.iter().find(|(name, _)| *name == day))
                .map(|(_, weekday)| DatePart::WeekStarting(*weekday)),
        };
        parsed.ok_or_else(|| {
            Error::semantic(format!("Not a valid date part to retrieve: {}", upper))
        })
    }
}

impl fmt::Display for DatePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatePart::DayOfWeek => f.write_str("DAYOFWEEK"),
            DatePart::Day => f.write_str("DAY"),
            DatePart::DayOfYear => f.write_str("DAYOFYEAR"),
            DatePart::Week => f.write_str("WEEK"),
            DatePart::WeekStarting(day) => {
                let name = WEEKDAYS
                    .iter()
                    .find(|(_, w)| w == day)
                    .map_or("?", |(name, _)| *name);
                write!(f, "WEEK({})", name)
            }
            DatePart::IsoWeek => f.write_str("ISOWEEK"),
            DatePart::Month => f.write_str("MONTH"),
            DatePart::Quarter => f.write_str("QUARTER"),
            DatePart::Year => f.write_str("YEAR"),
            DatePart::IsoYear => f.write_str("ISOYEAR"),
        }
    }
}

/// A literal value together with its declared type.
#[derive(Clone, Debug, PartialEq)]
pub struct Literal {
    value: Value,
    dtype: Option<Type>,
}

impl Literal {
    #[inline]
    pub fn value(&self) -> &Value {
        &self.value
    }

    #[inline]
    pub fn dtype(&self) -> &Option<Type> {
        &self.dtype
    }

    /// Returns the literal as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match (&self.value, &self.dtype) {
            (Value::Integer(i), Some(Type::Scalar(ScalarType::Integer))) => Some(*i),
            _ => None,
        }
    }
}

/// One field of a SELECT list.
///
/// The position is 1-based and assigned by the owning SELECT; until then the
/// selector can only be named through its alias.
#[derive(Clone, Debug)]
pub struct Selector {
    expr: Box<EvaluatableNode>,
    alias: Option<String>,
    position: Option<usize>,
}

impl Selector {
    pub fn new(expr: EvaluatableNode, alias: Option<&str>) -> Self {
        Self {
            expr: Box::new(expr),
            alias: alias.map(String::from),
            position: None,
        }
    }

    #[inline]
    pub fn expr(&self) -> &EvaluatableNode {
        &self.expr
    }

    #[inline]
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    #[inline]
    pub fn position(&self) -> Option<usize> {
        self.position
    }

    pub fn with_position(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }

    /// Returns a copy wrapping a different expression, keeping the name.
    pub fn with_expr(&self, expr: EvaluatableNode) -> Self {
        Self {
            expr: Box::new(expr),
            alias: self.alias.clone(),
            position: self.position,
        }
    }

    /// The output column name: the alias, else the name inferred from the
    /// expression, else `_f<position>`.
    pub fn name(&self) -> Result<String> {
        if let Some(alias) = &self.alias {
            return Ok(alias.clone());
        }
        let position = self.position.ok_or_else(|| {
            Error::semantic(format!(
                "Accessing name of Selector {} before position is populated",
                self
            ))
        })?;
        Ok(self
            .expr
            .inferred_name()
            .unwrap_or_else(|| format!("_f{}", position)))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{} AS {}", self.expr, alias),
            None => write!(f, "{}", self.expr),
        }
    }
}

/// A wildcard SELECT field: `*` or `table.*`, with optional EXCEPT and
/// REPLACE modifiers.
#[derive(Clone, Debug, Default)]
pub struct StarSelector {
    expression: Option<Box<EvaluatableNode>>,
    except: Vec<String>,
    replace: Vec<(EvaluatableNode, String)>,
}

impl StarSelector {
    /// `*`
    pub fn all() -> Self {
        Self::default()
    }

    /// `<expression>.*`; only a bare table name can currently be expanded.
    pub fn of(expression: EvaluatableNode) -> Self {
        Self {
            expression: Some(Box::new(expression)),
            ..Self::default()
        }
    }

    /// `* EXCEPT (names)`
    pub fn except<S: Into<String>>(mut self, names: Vec<S>) -> Self {
        self.except = names.into_iter().map(Into::into).collect();
        self
    }

    /// `* REPLACE (expr AS name, ...)`
    pub fn replace(mut self, replacements: Vec<(EvaluatableNode, &str)>) -> Self {
        self.replace = replacements
            .into_iter()
            .map(|(expr, name)| (expr, name.to_string()))
            .collect();
        self
    }

    /// Expands the wildcard into one aliased selector per column.
    pub fn get_selectors(&self, context: &EvaluationContext<'_>) -> Result<Vec<Selector>> {
        let selectors: Vec<Selector> = match self.expression.as_deref() {
            None => context
                .column_paths()
                .into_iter()
                .map(|(table, column)| {
                    let mut path: Vec<String> = table.into_iter().collect();
                    path.push(column.clone());
                    Selector::new(EvaluatableNode::Field(path), Some(&column))
                })
                .collect(),
            Some(EvaluatableNode::Field(path)) if path.len() == 1 => {
                let table = &path[0];
                let columns = context.table_columns(table).ok_or_else(|| {
                    Error::unresolved(format!("Table {} not found in FROM clause", table))
                })?;
                columns
                    .into_iter()
                    .map(|column| {
                        Selector::new(
                            EvaluatableNode::Field(vec![table.clone(), column.clone()]),
                            Some(&column),
                        )
                    })
                    .collect()
            }
            Some(other) => {
                return Err(Error::not_implemented(format!("Cannot select {}.*", other)));
            }
        };

        Ok(selectors
            .into_iter()
            .filter(|s| !s.alias().map_or(false, |a| self.except.iter().any(|e| e == a)))
            .map(|s| {
                let replacement = s
                    .alias()
                    .and_then(|a| self.replace.iter().find(|(_, name)| name == a));
                match replacement {
                    Some((expr, name)) => Selector::new(expr.clone(), Some(name)),
                    None => s,
                }
            })
            .collect())
    }
}

impl fmt::Display for StarSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.expression {
            Some(expr) => write!(f, "{}.*", expr)?,
            None => f.write_str("*")?,
        }
        if !self.except.is_empty() {
            write!(f, " EXCEPT ({})", self.except.join(", "))?;
        }
        if !self.replace.is_empty() {
            let parts: Vec<String> = self
                .replace
                .iter()
                .map(|(expr, name)| format!("{} AS {}", expr, name))
                .collect();
            write!(f, " REPLACE ({})", parts.join(", "))?;
        }
        Ok(())
    }
}

/// Expression AST node, evaluated against an [`EvaluationContext`] into a
/// column.
#[derive(Clone, Debug)]
pub enum EvaluatableNode {
    /// Literal value.
    Value(Literal),
    /// Possibly-partial dotted column path.
    Field(Vec<String>),
    /// `EXISTS (subquery)`; evaluated once per row of the current context.
    Exists(Box<Select>),
    /// Binary operation.
    Binary {
        op: BinaryOp,
        left: Box<EvaluatableNode>,
        right: Box<EvaluatableNode>,
    },
    /// Boolean negation.
    Not(Box<EvaluatableNode>),
    /// Numeric negation.
    UnaryNegation(Box<EvaluatableNode>),
    /// `IS [NOT] NULL`
    NullCheck {
        expr: Box<EvaluatableNode>,
        negated: bool,
    },
    /// `[NOT] IN (...)`
    InCheck {
        expr: Box<EvaluatableNode>,
        elements: Vec<EvaluatableNode>,
        negated: bool,
    },
    /// Searched CASE; the simple form is rewritten to equality conditions.
    Case {
        whens: Vec<(EvaluatableNode, EvaluatableNode)>,
        else_: Box<EvaluatableNode>,
    },
    /// `IF(condition, then, else)`
    If {
        condition: Box<EvaluatableNode>,
        then: Box<EvaluatableNode>,
        else_: Box<EvaluatableNode>,
    },
    /// `CAST(expr AS type)`
    Cast {
        expr: Box<EvaluatableNode>,
        target: ScalarType,
    },
    /// `EXTRACT(part FROM expr)`
    Extract {
        part: DatePart,
        expr: Box<EvaluatableNode>,
    },
    /// STRUCT construction; `declared` is the (possibly partially) declared struct type.
    Struct {
        declared: Option<Vec<StructField>>,
        fields: Vec<EvaluatableNode>,
    },
    /// ARRAY construction. An empty literal keeps one sentinel element to
    /// size its output.
    Array {
        element_type: Option<Type>,
        elements: Vec<EvaluatableNode>,
        empty: bool,
    },
    /// Function call (row-wise, aggregating or analytic).
    FunctionCall(FunctionCall),
    /// SELECT list field.
    Selector(Selector),
    /// Read of a value that is constant within each group.
    GroupedBy(Box<EvaluatableNode>),
}

impl EvaluatableNode {
    /// Creates a literal. A NULL literal has neither value nor type; any
    /// other combination with exactly one of them missing is rejected.
    pub fn value(value: Value, dtype: Option<Type>) -> Result<Self> {
        if value.is_null() != dtype.is_none() {
            return Err(Error::semantic(format!(
                "Value(None, None) means NULL; Value({:?}, {}) is not allowed",
                value,
                type_name(&dtype)
            )));
        }
        if !value.conforms_to(&dtype) {
            return Err(Error::type_error(format!(
                "Literal {:?} is not a {}",
                value,
                type_name(&dtype)
            )));
        }
        Ok(EvaluatableNode::Value(Literal { value, dtype }))
    }

    /// Creates the NULL literal.
    pub fn null() -> Self {
        EvaluatableNode::Value(Literal {
            value: Value::Null,
            dtype: None,
        })
    }

    /// Creates a literal whose type is inferred from the value.
    pub fn literal(value: impl Into<Value>) -> Self {
        let value = value.into();
        let dtype = literal_type(&value);
        EvaluatableNode::Value(Literal { value, dtype })
    }

    /// Creates a field reference from a dotted path.
    pub fn field(path: &str) -> Self {
        EvaluatableNode::Field(path.split('.').map(String::from).collect())
    }

    /// Creates a binary expression.
    pub fn binary(op: BinaryOp, left: EvaluatableNode, right: EvaluatableNode) -> Self {
        EvaluatableNode::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn add(left: EvaluatableNode, right: EvaluatableNode) -> Self {
        Self::binary(BinaryOp::Add, left, right)
    }

    pub fn sub(left: EvaluatableNode, right: EvaluatableNode) -> Self {
        Self::binary(BinaryOp::Sub, left, right)
    }

    pub fn mul(left: EvaluatableNode, right: EvaluatableNode) -> Self {
        Self::binary(BinaryOp::Mul, left, right)
    }

    pub fn div(left: EvaluatableNode, right: EvaluatableNode) -> Self {
        Self::binary(BinaryOp::Div, left, right)
    }

    pub fn eq(left: EvaluatableNode, right: EvaluatableNode) -> Self {
        Self::binary(BinaryOp::Eq, left, right)
    }

    pub fn ne(left: EvaluatableNode, right: EvaluatableNode) -> Self {
        Self::binary(BinaryOp::Ne, left, right)
    }

    pub fn lt(left: EvaluatableNode, right: EvaluatableNode) -> Self {
        Self::binary(BinaryOp::Lt, left, right)
    }

    pub fn le(left: EvaluatableNode, right: EvaluatableNode) -> Self {
        Self::binary(BinaryOp::Le, left, right)
    }

    pub fn gt(left: EvaluatableNode, right: EvaluatableNode) -> Self {
        Self::binary(BinaryOp::Gt, left, right)
    }

    pub fn ge(left: EvaluatableNode, right: EvaluatableNode) -> Self {
        Self::binary(BinaryOp::Ge, left, right)
    }

    pub fn and(left: EvaluatableNode, right: EvaluatableNode) -> Self {
        Self::binary(BinaryOp::And, left, right)
    }

    pub fn or(left: EvaluatableNode, right: EvaluatableNode) -> Self {
        Self::binary(BinaryOp::Or, left, right)
    }

    pub fn like(expr: EvaluatableNode, pattern: EvaluatableNode) -> Self {
        Self::binary(BinaryOp::Like, expr, pattern)
    }

    pub fn not(expr: EvaluatableNode) -> Self {
        EvaluatableNode::Not(Box::new(expr))
    }

    pub fn neg(expr: EvaluatableNode) -> Self {
        EvaluatableNode::UnaryNegation(Box::new(expr))
    }

    pub fn is_null(expr: EvaluatableNode) -> Self {
        EvaluatableNode::NullCheck {
            expr: Box::new(expr),
            negated: false,
        }
    }

    pub fn is_not_null(expr: EvaluatableNode) -> Self {
        EvaluatableNode::NullCheck {
            expr: Box::new(expr),
            negated: true,
        }
    }

    pub fn in_list(expr: EvaluatableNode, elements: Vec<EvaluatableNode>) -> Self {
        EvaluatableNode::InCheck {
            expr: Box::new(expr),
            elements,
            negated: false,
        }
    }

    pub fn not_in_list(expr: EvaluatableNode, elements: Vec<EvaluatableNode>) -> Self {
        EvaluatableNode::InCheck {
            expr: Box::new(expr),
            elements,
            negated: true,
        }
    }

    /// Creates a CASE expression. With a comparand, each WHEN value `v`
    /// becomes the condition `comparand = v`.
    pub fn case(
        comparand: Option<EvaluatableNode>,
        whens: Vec<(EvaluatableNode, EvaluatableNode)>,
        else_: Option<EvaluatableNode>,
    ) -> Result<Self> {
        if whens.is_empty() {
            return Err(Error::semantic("Must provide at least one WHEN for a CASE"));
        }
        let whens = whens
            .into_iter()
            .map(|(when, then)| match &comparand {
                Some(c) => (Self::eq(c.clone(), when), then),
                None => (when, then),
            })
            .collect();
        Ok(EvaluatableNode::Case {
            whens,
            else_: Box::new(else_.unwrap_or_else(Self::null)),
        })
    }

    pub fn if_(condition: EvaluatableNode, then: EvaluatableNode, else_: EvaluatableNode) -> Self {
        EvaluatableNode::If {
            condition: Box::new(condition),
            then: Box::new(then),
            else_: Box::new(else_),
        }
    }

    /// Creates a CAST to a scalar type given by name (`INT64`, `STRING`, ...).
    pub fn cast(expr: EvaluatableNode, type_name: &str) -> Result<Self> {
        Ok(EvaluatableNode::Cast {
            expr: Box::new(expr),
            target: ScalarType::from_name(type_name)?,
        })
    }

    pub fn extract(part: &str, expr: EvaluatableNode) -> Result<Self> {
        Ok(EvaluatableNode::Extract {
            part: DatePart::parse(part)?,
            expr: Box::new(expr),
        })
    }

    /// `STRUCT(expr [AS name], ...)`
    pub fn struct_typeless(fields: Vec<(EvaluatableNode, Option<&str>)>) -> Self {
        let (fields, declared): (Vec<_>, Vec<_>) = fields
            .into_iter()
            .map(|(expr, name)| (expr, StructField::new(name.map(String::from), None)))
            .unzip();
        EvaluatableNode::Struct {
            declared: Some(declared),
            fields,
        }
    }

    /// `STRUCT<[name] type, ...>(expr, ...)`
    pub fn struct_typed(dtype: Type, fields: Vec<EvaluatableNode>) -> Result<Self> {
        match dtype {
            Type::Struct(declared) => Ok(EvaluatableNode::Struct {
                declared: Some(declared),
                fields,
            }),
            other => Err(Error::type_error(format!(
                "STRUCT literal declared with non-STRUCT type {}",
                other
            ))),
        }
    }

    /// `(expr, expr, ...)`
    pub fn tuple(fields: Vec<EvaluatableNode>) -> Self {
        EvaluatableNode::Struct {
            declared: None,
            fields,
        }
    }

    /// `[ARRAY<element_type>][expr, ...]`; `None` elements is the empty literal `[]`.
    pub fn array(element_type: Option<Type>, elements: Option<Vec<EvaluatableNode>>) -> Self {
        match elements {
            Some(elements) => EvaluatableNode::Array {
                element_type,
                elements,
                empty: false,
            },
            None => EvaluatableNode::Array {
                element_type,
                elements: vec![Self::literal(1i64)],
                empty: true,
            },
        }
    }

    pub fn exists(subquery: Select) -> Self {
        EvaluatableNode::Exists(Box::new(subquery))
    }

    pub fn call(call: FunctionCall) -> Self {
        EvaluatableNode::FunctionCall(call)
    }

    pub fn selector(expr: EvaluatableNode, alias: Option<&str>) -> Self {
        EvaluatableNode::Selector(Selector::new(expr, alias))
    }

    /// Name of the output column this expression would produce without an alias.
    pub fn inferred_name(&self) -> Option<String> {
        match self {
            EvaluatableNode::Field(path) => path.last().cloned(),
            EvaluatableNode::Selector(selector) => selector.name().ok(),
            EvaluatableNode::GroupedBy(inner) => inner.inferred_name(),
            _ => None,
        }
    }

    /// Direct child expressions; subqueries are not children.
    pub fn children(&self) -> Vec<&EvaluatableNode> {
        match self {
            EvaluatableNode::Value(_) | EvaluatableNode::Field(_) | EvaluatableNode::Exists(_) => {
                Vec::new()
            }
            EvaluatableNode::Binary { left, right, .. } => vec![left, right],
            EvaluatableNode::Not(expr)
            | EvaluatableNode::UnaryNegation(expr)
            | EvaluatableNode::NullCheck { expr, .. }
            | EvaluatableNode::Cast { expr, .. }
            | EvaluatableNode::Extract { expr, .. }
            | EvaluatableNode::GroupedBy(expr) => vec![expr],
            EvaluatableNode::InCheck { expr, elements, .. } => {
                let mut children: Vec<&EvaluatableNode> = vec![expr];
                children.extend(elements.iter());
                children
            }
            EvaluatableNode::Case { whens, else_ } => {
                let mut children: Vec<&EvaluatableNode> = Vec::with_capacity(whens.len() * 2 + 1);
                for (when, then) in whens {
                    children.push(when);
                    children.push(then);
                }
                children.push(else_);
                children
            }
            EvaluatableNode::If {
                condition,
                then,
                else_,
            } => vec![condition, then, else_],
            EvaluatableNode::Struct { fields, .. } => fields.iter().collect(),
            EvaluatableNode::Array { elements, .. } => elements.iter().collect(),
            EvaluatableNode::FunctionCall(call) => call.children(),
            EvaluatableNode::Selector(selector) => vec![selector.expr()],
        }
    }

    /// Rebuilds this node with every direct child replaced by `f(child)`.
    pub fn try_map_children<F>(&self, mut f: F) -> Result<EvaluatableNode>
    where
        F: FnMut(&EvaluatableNode) -> Result<EvaluatableNode>,
    {
        let mut boxed = |node: &EvaluatableNode| f(node).map(Box::new);
        Ok(match self {
            EvaluatableNode::Value(_) | EvaluatableNode::Field(_) | EvaluatableNode::Exists(_) => {
                self.clone()
            }
            EvaluatableNode::Binary { op, left, right } => EvaluatableNode::Binary {
                op: *op,
                left: boxed(left)?,
                right: boxed(right)?,
            },
            EvaluatableNode::Not(expr) => EvaluatableNode::Not(boxed(expr)?),
            EvaluatableNode::UnaryNegation(expr) => EvaluatableNode::UnaryNegation(boxed(expr)?),
            EvaluatableNode::NullCheck { expr, negated } => EvaluatableNode::NullCheck {
                expr: boxed(expr)?,
                negated: *negated,
            },
            EvaluatableNode::InCheck {
                expr,
                elements,
                negated,
            } => EvaluatableNode::InCheck {
                expr: boxed(expr)?,
                elements: elements
                    .iter()
                    .map(|e| boxed(e).map(|b| *b))
                    .collect::<Result<_>>()?,
                negated: *negated,
            },
            EvaluatableNode::Case { whens, else_ } => EvaluatableNode::Case {
                whens: whens
                    .iter()
                    .map(|(when, then)| Ok((*boxed(when)?, *boxed(then)?)))
                    .collect::<Result<_>>()?,
                else_: boxed(else_)?,
            },
            EvaluatableNode::If {
                condition,
                then,
                else_,
            } => EvaluatableNode::If {
                condition: boxed(condition)?,
                then: boxed(then)?,
                else_: boxed(else_)?,
            },
            EvaluatableNode::Cast { expr, target } => EvaluatableNode::Cast {
                expr: boxed(expr)?,
                target: *target,
            },
            EvaluatableNode::Extract { part, expr } => EvaluatableNode::Extract {
                part: *part,
                expr: boxed(expr)?,
            },
            EvaluatableNode::Struct { declared, fields } => EvaluatableNode::Struct {
                declared: declared.clone(),
                fields: fields
                    .iter()
                    .map(|e| boxed(e).map(|b| *b))
                    .collect::<Result<_>>()?,
            },
            EvaluatableNode::Array {
                element_type,
                elements,
                empty,
            } => EvaluatableNode::Array {
                element_type: element_type.clone(),
                elements: elements
                    .iter()
                    .map(|e| boxed(e).map(|b| *b))
                    .collect::<Result<_>>()?,
                empty: *empty,
            },
            EvaluatableNode::FunctionCall(call) => {
                EvaluatableNode::FunctionCall(call.try_map_children(|c| boxed(c).map(|b| *b))?)
            }
            EvaluatableNode::Selector(selector) => {
                EvaluatableNode::Selector(selector.with_expr(*boxed(selector.expr())?))
            }
            EvaluatableNode::GroupedBy(expr) => EvaluatableNode::GroupedBy(boxed(expr)?),
        })
    }

    /// Returns true if an aggregating function call occurs outside any subquery.
    pub fn contains_aggregate(&self) -> bool {
        match self {
            EvaluatableNode::FunctionCall(call)
                if call.convention() == CallingConvention::Aggregating =>
            {
                true
            }
            _ => self.children().into_iter().any(EvaluatableNode::contains_aggregate),
        }
    }

    /// Rewrites the tree for evaluation after GROUP BY `paths`.
    ///
    /// A field or selector that resolves to one of the grouping paths is
    /// wrapped in [`EvaluatableNode::GroupedBy`]. Literals, EXISTS and
    /// aggregating calls are returned as-is; everything else is rewritten
    /// child by child.
    pub fn mark_grouped(
        &self,
        paths: &[String],
        context: &EvaluationContext<'_>,
    ) -> Result<EvaluatableNode> {
        match self {
            EvaluatableNode::Value(_)
            | EvaluatableNode::Exists(_)
            | EvaluatableNode::GroupedBy(_) => Ok(self.clone()),
            EvaluatableNode::FunctionCall(call)
                if call.convention() == CallingConvention::Aggregating =>
            {
                Ok(self.clone())
            }
            EvaluatableNode::Field(path) => match context.try_resolve(path)? {
                Some(canonical) if paths.contains(&canonical) => {
                    Ok(EvaluatableNode::GroupedBy(Box::new(self.clone())))
                }
                _ => Ok(self.clone()),
            },
            EvaluatableNode::Selector(selector) => {
                match context.try_resolve(&[selector.name()?])? {
                    Some(canonical) if paths.contains(&canonical) => {
                        Ok(EvaluatableNode::GroupedBy(Box::new(self.clone())))
                    }
                    _ => Ok(EvaluatableNode::Selector(
                        selector.with_expr(selector.expr().mark_grouped(paths, context)?),
                    )),
                }
            }
            _ => self.try_map_children(|child| child.mark_grouped(paths, context)),
        }
    }
}

/// Infers the type of a literal value; NULL and empty arrays have no type.
fn literal_type(value: &Value) -> Option<Type> {
    match value {
        Value::Null => None,
        Value::Array(items) => items
            .iter()
            .find_map(literal_type)
            .map(Type::array),
        Value::Struct(items) => Some(Type::Struct(
            items
                .iter()
                .map(|v| StructField::new(None, literal_type(v)))
                .collect(),
        )),
        scalar => scalar.scalar_type().map(Type::Scalar),
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Value::String(s) => write!(f, "{:?}", s),
            Value::Date(_) | Value::Datetime(_) | Value::Timestamp(_) => {
                write!(f, "{} \"{}\"", type_name(&self.dtype), self.value)
            }
            other => write!(f, "{}", other),
        }
    }
}

impl fmt::Display for EvaluatableNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluatableNode::Value(literal) => write!(f, "{}", literal),
            EvaluatableNode::Field(path) => f.write_str(&path.join(".")),
            EvaluatableNode::Exists(_) => f.write_str("EXISTS(SELECT ...)"),
            EvaluatableNode::Binary { op, left, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            EvaluatableNode::Not(expr) => write!(f, "NOT {}", expr),
            EvaluatableNode::UnaryNegation(expr) => write!(f, "-{}", expr),
            EvaluatableNode::NullCheck { expr, negated } => {
                write!(f, "{} IS {}NULL", expr, if *negated { "NOT " } else { "" })
            }
            EvaluatableNode::InCheck {
                expr,
                elements,
                negated,
            } => {
                write!(f, "{} {}IN (", expr, if *negated { "NOT " } else { "" })?;
                write_list(f, elements)?;
                f.write_str(")")
            }
            EvaluatableNode::Case { whens, else_ } => {
                f.write_str("CASE")?;
                for (when, then) in whens {
                    write!(f, " WHEN {} THEN {}", when, then)?;
                }
                write!(f, " ELSE {} END", else_)
            }
            EvaluatableNode::If {
                condition,
                then,
                else_,
            } => write!(f, "IF({}, {}, {})", condition, then, else_),
            EvaluatableNode::Cast { expr, target } => write!(f, "CAST({} AS {})", expr, target),
            EvaluatableNode::Extract { part, expr } => write!(f, "EXTRACT({} FROM {})", part, expr),
            EvaluatableNode::Struct { fields, .. } => {
                f.write_str("STRUCT(")?;
                write_list(f, fields)?;
                f.write_str(")")
            }
            EvaluatableNode::Array {
                element_type,
                elements,
                empty,
            } => {
                if let Some(t) = element_type {
                    write!(f, "ARRAY<{}>", t)?;
                }
                f.write_str("[")?;
                if !empty {
                    write_list(f, elements)?;
                }
                f.write_str("]")
            }
            EvaluatableNode::FunctionCall(call) => write!(f, "{}", call),
            EvaluatableNode::Selector(selector) => write!(f, "{}", selector),
            EvaluatableNode::GroupedBy(expr) => write!(f, "{}", expr),
        }
    }
}
