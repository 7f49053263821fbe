//! Evaluation of table-producing nodes other than SELECT.

use crate::ast::{DataframeNode, EvaluatableNode, QueryExpression, SetOperation, SetOperator, TableReference};
use crate::context::EvaluationContext;
use crate::executor::{evaluate, Evaluated, LimitExecutor, SortExecutor};
use log::debug;
use tabula_core::{coerce, Catalog, Error, Result, Table, Value};

impl DataframeNode {
    /// Evaluates the node to a table and, for a bare table reference, its name.
    pub fn evaluate(&self, catalog: &Catalog) -> Result<(Table, Option<String>)> {
        match self {
            DataframeNode::QueryExpression(query) => query.evaluate(catalog),
            DataframeNode::SetOperation(operation) => operation.evaluate(catalog),
            DataframeNode::Select(select) => select.evaluate(catalog),
            DataframeNode::TableReference(reference) => reference.evaluate(catalog),
        }
    }
}

impl QueryExpression {
    /// Evaluates the base query, then applies ORDER BY and LIMIT/OFFSET.
    pub fn evaluate(&self, catalog: &Catalog) -> Result<(Table, Option<String>)> {
        if !self.with.is_empty() {
            return Err(Error::not_implemented("WITH expressions are not implemented yet"));
        }
        let (mut table, name) = self.base.evaluate(catalog)?;

        if !self.order_by.is_empty() {
            let context = EvaluationContext::from_table(catalog, &table, name.as_deref());
            let keys = self
                .order_by
                .iter()
                .map(|(key, order)| Ok((order_by_index(key, &table, &context)?, *order)))
                .collect::<Result<Vec<_>>>()?;
            table = SortExecutor::new(keys).execute(table);
        }

        if let Some(limit) = &self.limit {
            let limit = constant_count(limit, catalog, "LIMIT")?;
            let offset = match &self.offset {
                Some(offset) => constant_count(offset, catalog, "OFFSET")?,
                None => 0,
            };
            table = LimitExecutor::new(limit, offset).execute(table);
        }
        Ok((table, None))
    }
}

/// Resolves an ORDER BY key to an output column index.
fn order_by_index(key: &EvaluatableNode, table: &Table, context: &EvaluationContext<'_>) -> Result<usize> {
    match key {
        EvaluatableNode::Field(path) => {
            let canonical = context.resolve(path)?;
            let name = canonical.rsplit('.').next().unwrap_or(&canonical);
            table
                .names()
                .iter()
                .position(|n| n == name)
                .ok_or_else(|| Error::unresolved(format!("ORDER BY field {} not found", canonical)))
        }
        EvaluatableNode::Value(literal) => {
            let position = literal.as_integer().ok_or_else(|| {
                Error::semantic(format!(
                    "Attempt to order by a literal non-integer constant {}",
                    key
                ))
            })?;
            usize::try_from(position)
                .ok()
                .and_then(|p| p.checked_sub(1))
                .filter(|&i| i < table.num_columns())
                .ok_or_else(|| {
                    Error::semantic(format!(
                        "ORDER BY position {} is out of range for {} columns",
                        position,
                        table.num_columns()
                    ))
                })
        }
        other => Err(Error::semantic(format!("Invalid field specification {}", other))),
    }
}

/// Evaluates a LIMIT or OFFSET expression, which must be a non-negative
/// integer constant.
fn constant_count(expr: &EvaluatableNode, catalog: &Catalog, clause: &str) -> Result<usize> {
    let context = EvaluationContext::new(catalog);
    let value = match evaluate(expr, &context)? {
        Evaluated::Constant { value, .. } => value,
        Evaluated::Column(column) if column.len() == 1 => {
            column.into_values().pop().unwrap_or(Value::Null)
        }
        _ => {
            return Err(Error::semantic(format!("{} {} is not a constant", clause, expr)));
        }
    };
    match value {
        Value::Integer(n) if n >= 0 => Ok(n as usize),
        other => Err(Error::semantic(format!(
            "{} must be a non-negative INTEGER, got {}",
            clause, other
        ))),
    }
}

impl SetOperation {
    /// Evaluates both sides and combines them. Only UNION ALL is supported.
    pub fn evaluate(&self, catalog: &Catalog) -> Result<(Table, Option<String>)> {
        let (left, _) = self.left.evaluate(catalog)?;
        let (right, _) = self.right.evaluate(catalog)?;
        if left.num_columns() != right.num_columns() {
            return Err(Error::semantic(format!(
                "Queries in UNION ALL have mismatched column count: {} vs {}",
                left.num_columns(),
                right.num_columns()
            )));
        }
        let types = left
            .types()
            .iter()
            .zip(right.types().iter())
            .map(|(l, r)| coerce(l, r))
            .collect::<Result<Vec<_>>>()?;
        if self.op != SetOperator::UnionAll {
            return Err(Error::not_implemented(format!(
                "set operation {} not implemented",
                self.op
            )));
        }

        let num_rows = left.num_rows() + right.num_rows();
        debug!(
            "{}: {} + {} rows",
            self.op,
            left.num_rows(),
            right.num_rows()
        );
        let (names, left_columns, _) = left.into_parts();
        let (_, right_columns, _) = right.into_parts();
        let columns = left_columns
            .into_iter()
            .zip(right_columns)
            .zip(types.iter())
            .map(|((l, r), dtype)| l.concat(r, dtype))
            .collect();
        Ok((Table::with_num_rows(names, columns, num_rows)?, None))
    }
}

impl TableReference {
    /// Looks the table up in `catalog`, filling in a missing project or
    /// dataset when the catalog offers exactly one candidate.
    pub fn evaluate(&self, catalog: &Catalog) -> Result<(Table, Option<String>)> {
        let (project, dataset, table_name) = self.qualify(catalog)?;
        let table = catalog.get(&project, &dataset, &table_name).ok_or_else(|| {
            Error::unresolved(format!("Table {}.{}.{} not found", project, dataset, table_name))
        })?;
        Ok((table.clone(), Some(table_name)))
    }

    fn qualify(&self, catalog: &Catalog) -> Result<(String, String, String)> {
        let path = self.path();
        if let [project, dataset, table] = path {
            return Ok((project.clone(), dataset.clone(), table.clone()));
        }
        let projects = catalog.project_names();
        let [project] = projects.as_slice() else {
            return Err(Error::unresolved(format!(
                "Non-fully-qualified table {:?} with multiple possible projects {:?}",
                path, projects
            )));
        };
        match path {
            [dataset, table] => Ok((project.to_string(), dataset.clone(), table.clone())),
            [table] => {
                let datasets = catalog.dataset_names(project).unwrap_or_default();
                let [dataset] = datasets.as_slice() else {
                    return Err(Error::unresolved(format!(
                        "Non-fully-qualified table {:?} with multiple possible datasets {:?}",
                        path, datasets
                    )));
                };
                Ok((project.to_string(), dataset.to_string(), table.clone()))
            }
            _ => Err(Error::unresolved(format!("Invalid table path {}", self))),
        }
    }
}
