//! FROM clause evaluation: joins combine item contexts from row index vectors.

use crate::ast::{DataSource, FromItem, JoinCondition, JoinKind};
use crate::context::EvaluationContext;
use crate::executor::evaluate;
use crate::executor::select::truth_mask;
use hashbrown::HashMap;
use log::debug;
use tabula_core::{Catalog, Result, Value};

/// Matched row pairs of a join: output row `k` is left row `left[k]` beside
/// right row `right[k]`, or beside NULLs when that is `None`.
#[derive(Debug, Default)]
struct JoinPlan {
    left: Vec<usize>,
    right: Vec<Option<usize>>,
}

impl JoinPlan {
    fn push(&mut self, left: usize, right: Option<usize>) {
        self.left.push(left);
        self.right.push(right);
    }

    fn cross(left_rows: usize, right_rows: usize) -> Self {
        let mut plan = JoinPlan::default();
        for i in 0..left_rows {
            for j in 0..right_rows {
                plan.push(i, Some(j));
            }
        }
        plan
    }

    /// Builds a plan from per-left-row matches, keeping left order. For a
    /// LEFT join, a left row without matches is kept once with NULLs.
    fn from_matches(matches: Vec<Vec<usize>>, kind: JoinKind) -> Self {
        let mut plan = JoinPlan::default();
        for (i, rights) in matches.into_iter().enumerate() {
            if rights.is_empty() && kind == JoinKind::Left {
                plan.push(i, None);
            }
            for j in rights {
                plan.push(i, Some(j));
            }
        }
        plan
    }
}

impl DataSource {
    /// Evaluates every FROM item and joins them left to right into one context.
    pub fn create_context<'a>(&self, catalog: &'a Catalog) -> Result<EvaluationContext<'a>> {
        let (mut context, _) = item_context(&self.first, catalog)?;
        for join in &self.joins {
            let (right, right_name) = item_context(&join.item, catalog)?;
            let left_rows = context.num_rows();
            context = match &join.condition {
                JoinCondition::None => {
                    let plan = JoinPlan::cross(left_rows, right.num_rows());
                    context.combine(&right, &plan.left, &plan.right)
                }
                JoinCondition::On(condition) => {
                    let product = JoinPlan::cross(left_rows, right.num_rows());
                    let joined = context.combine(&right, &product.left, &product.right);
                    let mask = truth_mask(evaluate(condition, &joined)?, joined.num_rows(), "ON")?;
                    let mut matches = vec![Vec::new(); left_rows];
                    for (k, keep) in mask.into_iter().enumerate() {
                        if let (true, Some(j)) = (keep, product.right[k]) {
                            matches[product.left[k]].push(j);
                        }
                    }
                    let plan = JoinPlan::from_matches(matches, join.kind);
                    context.combine(&right, &plan.left, &plan.right)
                }
                JoinCondition::Using(columns) => {
                    let matches = using_matches(&context, &right, columns)?;
                    let plan = JoinPlan::from_matches(matches, join.kind);
                    let right_start = context.num_columns();
                    context
                        .combine(&right, &plan.left, &plan.right)
                        .without_columns(right_start, columns)
                }
            };
            debug!(
                "{} {}: {} x {} rows -> {} rows",
                join.kind,
                right_name.as_deref().unwrap_or("<subquery>"),
                left_rows,
                right.num_rows(),
                context.num_rows()
            );
        }
        Ok(context)
    }
}

/// Evaluates one FROM item into a context qualified by its alias, or by the
/// table name of a bare table reference.
fn item_context<'a>(item: &FromItem, catalog: &'a Catalog) -> Result<(EvaluationContext<'a>, Option<String>)> {
    let (table, table_name) = item.source.evaluate(catalog)?;
    let name = item.alias.clone().or(table_name);
    Ok((EvaluationContext::from_table(catalog, &table, name.as_deref()), name))
}

/// Hash join on the USING columns, probing with each left row in order.
/// A NULL key never matches.
fn using_matches(
    left: &EvaluationContext<'_>,
    right: &EvaluationContext<'_>,
    columns: &[String],
) -> Result<Vec<Vec<usize>>> {
    let mut left_keys = Vec::with_capacity(columns.len());
    let mut right_keys = Vec::with_capacity(columns.len());
    for name in columns {
        let path = [name.clone()];
        left_keys.push(left.local_column(&path)?);
        right_keys.push(right.local_column(&path)?);
    }

    let mut table: HashMap<Vec<&Value>, Vec<usize>> = HashMap::with_capacity(right.num_rows());
    for j in 0..right.num_rows() {
        let key: Vec<&Value> = right_keys.iter().map(|c| &c.values()[j]).collect();
        if key.iter().any(|v| v.is_null()) {
            continue;
        }
        table.entry(key).or_default().push(j);
    }

    Ok((0..left.num_rows())
        .map(|i| {
            let key: Vec<&Value> = left_keys.iter().map(|c| &c.values()[i]).collect();
            if key.iter().any(|v| v.is_null()) {
                return Vec::new();
            }
            table.get(&key).cloned().unwrap_or_default()
        })
        .collect())
}
