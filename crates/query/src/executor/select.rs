//! SELECT evaluation: FROM, WHERE, GROUP BY, the SELECT list and HAVING.

use crate::ast::{EvaluatableNode, Select, SelectField, Selector};
use crate::context::EvaluationContext;
use crate::executor::{evaluate, Evaluated};
use log::{debug, trace};
use tabula_core::{Catalog, Column, Error, Result, ScalarType, Table, Type, Value};

impl Select {
    /// Evaluates this SELECT against `catalog`.
    ///
    /// Returns the result table and its name, which is always `None` for a SELECT.
    pub fn evaluate(&self, catalog: &Catalog) -> Result<(Table, Option<String>)> {
        self.evaluate_in(catalog, None)
    }

    /// Evaluates this SELECT as a subquery correlated with `outer`.
    pub fn evaluate_in<'a>(
        &self,
        catalog: &'a Catalog,
        outer: Option<&'a EvaluationContext<'a>>,
    ) -> Result<(Table, Option<String>)> {
        if self.distinct {
            return Err(Error::not_implemented("SELECT DISTINCT not implemented"));
        }

        let mut context = match &self.from {
            Some(source) => source.create_context(catalog)?,
            None => EvaluationContext::new(catalog),
        };
        if let Some(outer) = outer {
            context = context.with_outer(outer);
        }

        if let Some(condition) = &self.where_ {
            let mask = truth_mask(evaluate(condition, &context)?, context.num_rows(), "WHERE")?;
            context = context.filter(&mask);
            trace!("WHERE {}: {} rows kept", condition, context.num_rows());
        }

        let selectors = self.expand_fields(&context)?;
        let fields: Vec<EvaluatableNode> = if !self.group_by.is_empty() {
            context.apply_group_by(&selectors, &self.group_by)?
        } else {
            if self.having.is_some() || selectors.iter().any(|s| s.expr().contains_aggregate()) {
                context.group_all();
            }
            selectors.iter().cloned().map(EvaluatableNode::Selector).collect()
        };

        let result = evaluate_fields(&selectors, &fields, &context)?;
        let result = match &self.having {
            Some(having) => apply_having(having, result, &context)?,
            None => result,
        };
        debug!(
            "SELECT produced {} rows x {} columns",
            result.num_rows(),
            result.num_columns()
        );
        Ok((result, None))
    }

    /// Replaces each star field with one selector per column it covers.
    fn expand_fields(&self, context: &EvaluationContext<'_>) -> Result<Vec<Selector>> {
        let mut selectors = Vec::with_capacity(self.fields.len());
        for (i, field) in self.fields.iter().enumerate() {
            match field {
                SelectField::Selector(selector) => selectors.push(selector.clone()),
                SelectField::Star(star) => selectors.extend(
                    star.get_selectors(context)?
                        .into_iter()
                        .map(|s| s.with_position(i + 1)),
                ),
            }
        }
        Ok(selectors)
    }
}

/// Evaluates the (possibly group-marked) SELECT list into a table named
/// after `selectors`.
fn evaluate_fields(
    selectors: &[Selector],
    fields: &[EvaluatableNode],
    context: &EvaluationContext<'_>,
) -> Result<Table> {
    let num_rows = context.output_len();
    let mut names = Vec::with_capacity(selectors.len());
    let mut columns = Vec::with_capacity(selectors.len());
    for (selector, field) in selectors.iter().zip(fields) {
        let column = match evaluate(field, context)? {
            Evaluated::Grouped { .. } => {
                return Err(Error::semantic(format!(
                    "selecting expression {} that is not aggregated or grouped by",
                    selector
                )));
            }
            evaluated => evaluated.into_column(num_rows)?,
        };
        if column.len() != num_rows {
            return Err(Error::semantic(format!(
                "Expression {} produced {} rows, expected {}",
                selector,
                column.len(),
                num_rows
            )));
        }
        names.push(selector.name()?);
        columns.push(column);
    }
    Table::with_num_rows(names, columns, num_rows)
}

/// Filters the SELECT result by HAVING.
///
/// The condition sees the result columns by their bare output names, and
/// reaches the grouped FROM context through the outer link for aggregates
/// and grouping keys that were not selected.
fn apply_having(
    having: &EvaluatableNode,
    result: Table,
    grouped: &EvaluationContext<'_>,
) -> Result<Table> {
    let context = EvaluationContext::from_table(grouped.catalog(), &result, None)
        .with_outer(grouped)
        .inheriting_groups();
    let condition = having.mark_grouped(grouped.group_paths(), &context)?;
    let evaluated = match evaluate(&condition, &context)? {
        Evaluated::Grouped { .. } => {
            return Err(Error::semantic(format!(
                "HAVING expression {} is not aggregated or grouped by",
                having
            )));
        }
        evaluated => evaluated,
    };
    let mask = truth_mask(evaluated, result.num_rows(), "HAVING")?;
    Ok(result.filter(&mask))
}

/// Turns a boolean condition into a row mask. Only TRUE keeps a row; NULL
/// and FALSE both drop it.
pub(crate) fn truth_mask(condition: Evaluated, num_rows: usize, clause: &str) -> Result<Vec<bool>> {
    match condition.dtype() {
        None | Some(Type::Scalar(ScalarType::Boolean)) => {}
        Some(other) => {
            return Err(Error::type_error(format!(
                "{} condition must be BOOLEAN, got {}",
                clause, other
            )));
        }
    }
    let column: Column = match condition {
        Evaluated::Grouped { .. } => {
            return Err(Error::semantic(format!(
                "{} condition is not aggregated or grouped by",
                clause
            )));
        }
        evaluated => evaluated.into_column(num_rows)?,
    };
    if column.len() != num_rows {
        return Err(Error::semantic(format!(
            "{} condition produced {} rows, expected {}",
            clause,
            column.len(),
            num_rows
        )));
    }
    Ok(column
        .values()
        .iter()
        .map(|v| matches!(v, Value::Boolean(true)))
        .collect())
}
