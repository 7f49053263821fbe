//! Query (dataframe-producing) AST definitions.
//!
//! A [`DataframeNode`] evaluates to a [`Table`](tabula_core::Table) and an
//! optional name. Only a bare table reference carries a name.

use crate::ast::{EvaluatableNode, Selector, SortOrder, StarSelector};
use std::fmt;
use tabula_core::{Error, Result};

/// Any node that evaluates to a table.
#[derive(Clone, Debug)]
pub enum DataframeNode {
    QueryExpression(QueryExpression),
    SetOperation(SetOperation),
    Select(Select),
    TableReference(TableReference),
}

impl From<QueryExpression> for DataframeNode {
    fn from(node: QueryExpression) -> Self {
        DataframeNode::QueryExpression(node)
    }
}

impl From<SetOperation> for DataframeNode {
    fn from(node: SetOperation) -> Self {
        DataframeNode::SetOperation(node)
    }
}

impl From<Select> for DataframeNode {
    fn from(node: Select) -> Self {
        DataframeNode::Select(node)
    }
}

impl From<TableReference> for DataframeNode {
    fn from(node: TableReference) -> Self {
        DataframeNode::TableReference(node)
    }
}

/// A table path such as `my_project.my_dataset.my_table`, possibly with
/// leading parts left out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableReference {
    path: Vec<String>,
}

impl TableReference {
    /// Creates a reference from 1 to 3 path parts. A single part containing
    /// dots (a backticked path) is split.
    pub fn new(parts: &[&str]) -> Result<Self> {
        let path: Vec<String> = match parts {
            [single] => single.split('.').map(String::from).collect(),
            parts => parts.iter().map(|p| p.to_string()).collect(),
        };
        if path.is_empty() || path.len() > 3 || path.iter().any(String::is_empty) {
            return Err(Error::unresolved(format!(
                "Invalid table path {}",
                parts.join(".")
            )));
        }
        Ok(Self { path })
    }

    #[inline]
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// The last path part.
    pub fn table_name(&self) -> &str {
        self.path.last().map_or("", String::as_str)
    }
}

impl fmt::Display for TableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path.join("."))
    }
}

/// One field of a SELECT list.
#[derive(Clone, Debug)]
pub enum SelectField {
    Selector(Selector),
    Star(StarSelector),
}

impl SelectField {
    /// `expr [AS alias]`
    pub fn expr(expr: EvaluatableNode, alias: Option<&str>) -> Self {
        SelectField::Selector(Selector::new(expr, alias))
    }

    /// `*`
    pub fn star() -> Self {
        SelectField::Star(StarSelector::all())
    }
}

impl From<StarSelector> for SelectField {
    fn from(star: StarSelector) -> Self {
        SelectField::Star(star)
    }
}

/// A SELECT statement (without ORDER BY/LIMIT, which belong to the
/// enclosing [`QueryExpression`]).
#[derive(Clone, Debug)]
pub struct Select {
    pub(crate) distinct: bool,
    pub(crate) fields: Vec<SelectField>,
    pub(crate) from: Option<DataSource>,
    pub(crate) where_: Option<EvaluatableNode>,
    pub(crate) group_by: Vec<EvaluatableNode>,
    pub(crate) having: Option<EvaluatableNode>,
}

impl Select {
    /// Creates a SELECT of `fields`, assigning each selector its 1-based position.
    pub fn new(fields: Vec<SelectField>) -> Self {
        let fields = fields
            .into_iter()
            .enumerate()
            .map(|(i, field)| match field {
                SelectField::Selector(s) => SelectField::Selector(s.with_position(i + 1)),
                star => star,
            })
            .collect();
        Self {
            distinct: false,
            fields,
            from: None,
            where_: None,
            group_by: Vec::new(),
            having: None,
        }
    }

    /// Sets `SELECT DISTINCT`.
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Sets the FROM clause.
    pub fn from(mut self, source: DataSource) -> Self {
        self.from = Some(source);
        self
    }

    /// Sets the WHERE condition.
    pub fn filter(mut self, condition: EvaluatableNode) -> Self {
        self.where_ = Some(condition);
        self
    }

    /// Sets the GROUP BY list. Integer literals are 1-based SELECT positions;
    /// any other literal is rejected.
    pub fn group_by(mut self, exprs: Vec<EvaluatableNode>) -> Result<Self> {
        for expr in &exprs {
            if let EvaluatableNode::Value(literal) = expr {
                if literal.as_integer().is_none() {
                    return Err(Error::semantic(format!(
                        "Attempt to group by a literal non-integer constant {}",
                        expr
                    )));
                }
            }
        }
        self.group_by = exprs;
        Ok(self)
    }

    /// Sets the HAVING condition.
    pub fn having(mut self, condition: EvaluatableNode) -> Self {
        self.having = Some(condition);
        self
    }

    #[inline]
    pub fn fields(&self) -> &[SelectField] {
        &self.fields
    }
}

/// Set operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetOperator {
    UnionAll,
    UnionDistinct,
    IntersectDistinct,
    ExceptDistinct,
}

impl fmt::Display for SetOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SetOperator::UnionAll => "UNION ALL",
            SetOperator::UnionDistinct => "UNION DISTINCT",
            SetOperator::IntersectDistinct => "INTERSECT DISTINCT",
            SetOperator::ExceptDistinct => "EXCEPT DISTINCT",
        })
    }
}

/// `left <op> right`
#[derive(Clone, Debug)]
pub struct SetOperation {
    pub(crate) left: Box<DataframeNode>,
    pub(crate) op: SetOperator,
    pub(crate) right: Box<DataframeNode>,
}

impl SetOperation {
    pub fn new(left: impl Into<DataframeNode>, op: SetOperator, right: impl Into<DataframeNode>) -> Self {
        Self {
            left: Box::new(left.into()),
            op,
            right: Box::new(right.into()),
        }
    }

    /// `left UNION ALL right`
    pub fn union_all(left: impl Into<DataframeNode>, right: impl Into<DataframeNode>) -> Self {
        Self::new(left, SetOperator::UnionAll, right)
    }
}

/// A complete query: optional WITH, a base query, ORDER BY and LIMIT/OFFSET.
#[derive(Clone, Debug)]
pub struct QueryExpression {
    pub(crate) with: Vec<(String, DataframeNode)>,
    pub(crate) base: Box<DataframeNode>,
    pub(crate) order_by: Vec<(EvaluatableNode, SortOrder)>,
    pub(crate) limit: Option<EvaluatableNode>,
    pub(crate) offset: Option<EvaluatableNode>,
}

impl QueryExpression {
    pub fn new(base: impl Into<DataframeNode>) -> Self {
        Self {
            with: Vec::new(),
            base: Box::new(base.into()),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Adds a `WITH name AS (query)` binding.
    pub fn with(mut self, name: &str, query: impl Into<DataframeNode>) -> Self {
        self.with.push((name.to_string(), query.into()));
        self
    }

    /// Sets the ORDER BY keys; integer literals are 1-based output column positions.
    pub fn order_by(mut self, keys: Vec<(EvaluatableNode, SortOrder)>) -> Self {
        self.order_by = keys;
        self
    }

    /// Sets `LIMIT limit [OFFSET offset]`.
    pub fn limit(mut self, limit: EvaluatableNode, offset: Option<EvaluatableNode>) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }
}

/// Join kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum JoinKind {
    #[default]
    Cross,
    Inner,
    Left,
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JoinKind::Cross => "CROSS JOIN",
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT OUTER JOIN",
        })
    }
}

/// How joined rows are matched.
#[derive(Clone, Debug, Default)]
pub enum JoinCondition {
    #[default]
    None,
    On(EvaluatableNode),
    Using(Vec<String>),
}

/// A table or parenthesised subquery in FROM, with an optional alias.
#[derive(Clone, Debug)]
pub struct FromItem {
    pub(crate) source: Box<DataframeNode>,
    pub(crate) alias: Option<String>,
}

impl FromItem {
    pub fn new(source: impl Into<DataframeNode>, alias: Option<&str>) -> Self {
        Self {
            source: Box::new(source.into()),
            alias: alias.map(String::from),
        }
    }

    /// A table path without alias.
    pub fn table(parts: &[&str]) -> Result<Self> {
        Ok(Self::new(TableReference::new(parts)?, None))
    }
}

#[derive(Clone, Debug)]
pub struct Join {
    pub(crate) kind: JoinKind,
    pub(crate) item: FromItem,
    pub(crate) condition: JoinCondition,
}

/// The FROM clause: a first item joined with zero or more others, left to right.
#[derive(Clone, Debug)]
pub struct DataSource {
    pub(crate) first: FromItem,
    pub(crate) joins: Vec<Join>,
}

impl DataSource {
    pub fn new(first: FromItem) -> Self {
        Self {
            first,
            joins: Vec::new(),
        }
    }

    /// Appends a join. A CROSS join takes no condition; INNER and LEFT joins need one.
    pub fn join(mut self, kind: JoinKind, item: FromItem, condition: JoinCondition) -> Result<Self> {
        match (kind, &condition) {
            (JoinKind::Cross, JoinCondition::None) => {}
            (JoinKind::Cross, _) => {
                return Err(Error::semantic("CROSS JOIN does not take a join condition"));
            }
            (kind, JoinCondition::None) => {
                return Err(Error::semantic(format!("{} requires ON or USING", kind)));
            }
            _ => {}
        }
        self.joins.push(Join {
            kind,
            item,
            condition,
        });
        Ok(self)
    }

    /// Appends a comma (cross) join.
    pub fn cross_join(self, item: FromItem) -> Self {
        let mut source = self;
        source.joins.push(Join {
            kind: JoinKind::Cross,
            item,
            condition: JoinCondition::None,
        });
        source
    }
}
