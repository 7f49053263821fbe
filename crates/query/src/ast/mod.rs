//! AST module for expressions, function calls and queries.

mod expr;
mod function;
mod query;

pub use expr::{BinaryOp, DatePart, EvaluatableNode, Literal, Selector, SortOrder, StarSelector};
pub use function::{
    ArrayAggOptions, CallingConvention, CountArgument, Function, FunctionCall, FunctionKind,
    OverClause,
};
pub use query::{
    DataSource, DataframeNode, FromItem, Join, JoinCondition, JoinKind, QueryExpression, Select,
    SelectField, SetOperation, SetOperator, TableReference,
};
