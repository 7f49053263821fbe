//! Evaluation context: the named columns an expression can see.
//!
//! A context holds equal-length columns, each registered under an optional
//! table name and a column name, plus an optional link to the context of an
//! enclosing query. Paths are resolved locally first and then outward; a
//! one-part path matches on column name, a two-part path on table and
//! column name.
//!
//! After GROUP BY a context also carries a partition of its rows. Columns
//! read from a grouped context come back as [`Evaluated::Grouped`].

use crate::ast::{EvaluatableNode, Selector};
use crate::executor::{evaluate, Evaluated};
use log::debug;
use std::collections::BTreeMap;
use std::rc::Rc;
use tabula_core::{Catalog, Column, Error, Result, Table, Value};

/// Row indices of each group, groups in ascending key order.
pub type Partition = Vec<Vec<usize>>;

#[derive(Clone, Debug)]
struct ContextColumn {
    table: Option<String>,
    name: String,
    column: Column,
}

impl ContextColumn {
    fn path(&self) -> String {
        match &self.table {
            Some(table) => format!("{}.{}", table, self.name),
            None => self.name.clone(),
        }
    }

    fn matches(&self, path: &[String]) -> bool {
        match path {
            [name] => self.name == *name,
            [table, name] => self.table.as_ref() == Some(table) && self.name == *name,
            _ => false,
        }
    }
}

/// Columns visible to an expression, with an optional outer context.
#[derive(Clone, Debug)]
pub struct EvaluationContext<'a> {
    catalog: &'a Catalog,
    columns: Vec<ContextColumn>,
    num_rows: usize,
    group_paths: Vec<String>,
    groups: Option<Rc<Partition>>,
    inherits_groups: bool,
    outer: Option<&'a EvaluationContext<'a>>,
}

impl<'a> EvaluationContext<'a> {
    /// Creates a context of one row and no columns, as used by a FROM-less SELECT.
    pub fn new(catalog: &'a Catalog) -> Self {
        Self::with_num_rows(catalog, 1)
    }

    /// Creates an empty context with the given row count.
    pub fn with_num_rows(catalog: &'a Catalog, num_rows: usize) -> Self {
        Self {
            catalog,
            columns: Vec::new(),
            num_rows,
            group_paths: Vec::new(),
            groups: None,
            inherits_groups: false,
            outer: None,
        }
    }

    /// Creates a context holding `table`, its columns qualified by `name`.
    pub fn from_table(catalog: &'a Catalog, table: &Table, name: Option<&str>) -> Self {
        let mut context = Self::with_num_rows(catalog, table.num_rows());
        context.push_table(table, name);
        context
    }

    #[inline]
    pub fn catalog(&self) -> &'a Catalog {
        self.catalog
    }

    /// Links this context to the context of an enclosing query.
    pub fn with_outer(mut self, outer: &'a EvaluationContext<'a>) -> Self {
        self.outer = Some(outer);
        self
    }

    /// Makes aggregates over constants use the groups of the outer context.
    ///
    /// A HAVING clause is evaluated over the SELECT result, one row per
    /// group, with the grouped FROM context as its outer context.
    pub(crate) fn inheriting_groups(mut self) -> Self {
        self.inherits_groups = true;
        self
    }

    /// Registers every column of `table` under `name`.
    pub fn add_table(&mut self, table: &Table, name: Option<&str>) -> Result<()> {
        if table.num_rows() != self.num_rows {
            return Err(Error::semantic(format!(
                "Table {} has {} rows, context has {}",
                name.unwrap_or("<anonymous>"),
                table.num_rows(),
                self.num_rows
            )));
        }
        self.push_table(table, name);
        Ok(())
    }

    fn push_table(&mut self, table: &Table, name: Option<&str>) {
        for (column_name, column) in table.names().iter().zip(table.columns()) {
            self.columns.push(ContextColumn {
                table: name.map(String::from),
                name: column_name.clone(),
                column: column.clone(),
            });
        }
    }

    /// Registers a single column.
    pub fn add_column(&mut self, table: Option<&str>, name: &str, column: Column) -> Result<()> {
        if column.len() != self.num_rows {
            return Err(Error::semantic(format!(
                "Column {} has {} rows, context has {}",
                name,
                column.len(),
                self.num_rows
            )));
        }
        self.columns.push(ContextColumn {
            table: table.map(String::from),
            name: name.to_string(),
            column,
        });
        Ok(())
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Number of rows an expression over this context produces: the number
    /// of groups once grouped, the number of rows otherwise.
    pub fn output_len(&self) -> usize {
        self.groups.as_ref().map_or(self.num_rows, |groups| groups.len())
    }

    #[inline]
    pub fn is_grouped(&self) -> bool {
        self.groups.is_some()
    }

    /// Canonical paths of the GROUP BY keys.
    pub fn group_paths(&self) -> &[String] {
        &self.group_paths
    }

    /// The groups aggregates reduce over: this context's, or for a HAVING
    /// context, the enclosing grouped context's.
    pub(crate) fn aggregation_groups(&self) -> Option<Rc<Partition>> {
        match (&self.groups, self.inherits_groups, self.outer) {
            (Some(groups), _, _) => Some(Rc::clone(groups)),
            (None, true, Some(outer)) => outer.aggregation_groups(),
            _ => None,
        }
    }

    /// The context aggregate arguments are evaluated in. For a HAVING
    /// context this is the grouped FROM context, so a column shadowed by a
    /// selected name still reads the grouped input.
    pub(crate) fn aggregation_context(&self) -> &EvaluationContext<'a> {
        match (&self.groups, self.inherits_groups, self.outer) {
            (None, true, Some(outer)) => outer.aggregation_context(),
            _ => self,
        }
    }

    fn find_local(&self, path: &[String]) -> Result<Option<&ContextColumn>> {
        let mut matches = self.columns.iter().filter(|c| c.matches(path));
        let Some(first) = matches.next() else {
            return Ok(None);
        };
        let rest: Vec<&ContextColumn> = matches.collect();
        if rest.is_empty() {
            return Ok(Some(first));
        }
        let candidates: Vec<String> = std::iter::once(first)
            .chain(rest)
            .map(ContextColumn::path)
            .collect();
        Err(Error::unresolved(format!(
            "Attempt to refer to ambiguous field {}; candidates: {:?}",
            path.join("."),
            candidates
        )))
    }

    /// Resolves a field path to its canonical `table.column` (or bare
    /// `column`) path, searching outward. Ambiguity is an error; a path found
    /// nowhere is `None`.
    pub fn try_resolve(&self, path: &[String]) -> Result<Option<String>> {
        if let Some(column) = self.find_local(path)? {
            return Ok(Some(column.path()));
        }
        match self.outer {
            Some(outer) => outer.try_resolve(path),
            None => Ok(None),
        }
    }

    /// Like [`try_resolve`](Self::try_resolve), but a missing path is an error.
    pub fn resolve(&self, path: &[String]) -> Result<String> {
        self.try_resolve(path)?
            .ok_or_else(|| self.missing_field(path))
    }

    fn missing_field(&self, path: &[String]) -> Error {
        Error::unresolved(format!(
            "Attempt to refer to nonexistent field {}; fields available: {:?}",
            path.join("."),
            self.columns.iter().map(ContextColumn::path).collect::<Vec<_>>()
        ))
    }

    /// Returns the local column at `path`.
    pub(crate) fn local_column(&self, path: &[String]) -> Result<&Column> {
        match self.find_local(path)? {
            Some(entry) => Ok(&entry.column),
            None => Err(self.missing_field(path)),
        }
    }

    /// Reads the column at `path`.
    ///
    /// A local column comes back grouped if this context is grouped. A
    /// single-row column from an outer context is a constant here.
    pub(crate) fn lookup(&self, path: &[String]) -> Result<Evaluated> {
        if let Some(entry) = self.find_local(path)? {
            let column = entry.column.clone();
            return Ok(match &self.groups {
                Some(groups) => Evaluated::Grouped {
                    column,
                    groups: Rc::clone(groups),
                },
                None => Evaluated::Column(column),
            });
        }
        let Some(outer) = self.outer else {
            return Err(self.missing_field(path));
        };
        match outer.lookup(path)? {
            Evaluated::Column(column) if column.len() == 1 => {
                let (mut values, dtype) = column.into_parts();
                Ok(Evaluated::Constant {
                    value: values.pop().unwrap_or(Value::Null),
                    dtype,
                })
            }
            other => Ok(other),
        }
    }

    /// `(table, column)` of every local column, in registration order.
    pub fn column_paths(&self) -> Vec<(Option<String>, String)> {
        self.columns
            .iter()
            .map(|c| (c.table.clone(), c.name.clone()))
            .collect()
    }

    /// Column names registered under `table`, or `None` if there are none.
    pub fn table_columns(&self, table: &str) -> Option<Vec<String>> {
        let names: Vec<String> = self
            .columns
            .iter()
            .filter(|c| c.table.as_deref() == Some(table))
            .map(|c| c.name.clone())
            .collect();
        (!names.is_empty()).then_some(names)
    }

    fn map_columns<F>(&self, num_rows: usize, f: F) -> Self
    where
        F: Fn(&Column) -> Column,
    {
        Self {
            catalog: self.catalog,
            columns: self
                .columns
                .iter()
                .map(|c| ContextColumn {
                    table: c.table.clone(),
                    name: c.name.clone(),
                    column: f(&c.column),
                })
                .collect(),
            num_rows,
            group_paths: Vec::new(),
            groups: None,
            inherits_groups: false,
            outer: self.outer,
        }
    }

    /// Keeps the rows whose mask entry is true.
    pub fn filter(&self, mask: &[bool]) -> Self {
        let num_rows = mask.iter().filter(|keep| **keep).count();
        self.map_columns(num_rows, |c| c.filter(mask))
    }

    /// Gathers the rows at `indices`.
    pub fn take(&self, indices: &[usize]) -> Self {
        self.map_columns(indices.len(), |c| c.take(indices))
    }

    /// A single-row copy of row `row`, sharing this context's outer link.
    pub fn row_context(&self, row: usize) -> Self {
        self.take(&[row])
    }

    /// Number of local columns.
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Drops the local columns at index `start` or later named in `names`.
    pub(crate) fn without_columns(mut self, start: usize, names: &[String]) -> Self {
        let mut index = 0;
        self.columns.retain(|c| {
            let keep = index < start || !names.contains(&c.name);
            index += 1;
            keep
        });
        self
    }

    /// Joins two contexts row-wise: output row `k` is row `left[k]` of this
    /// context beside row `right[k]` of `other`, or NULLs where that is `None`.
    pub fn combine(&self, other: &EvaluationContext<'_>, left: &[usize], right: &[Option<usize>]) -> Self {
        let mut combined = self.take(left);
        combined.columns.extend(other.columns.iter().map(|c| ContextColumn {
            table: c.table.clone(),
            name: c.name.clone(),
            column: c.column.take_optional(right),
        }));
        combined
    }

    /// Partitions the rows by the GROUP BY keys and rewrites the selectors
    /// so that grouping keys read one value per group.
    ///
    /// A key may be a field, the name of a SELECT field, or a 1-based SELECT
    /// position. Keys naming a computed SELECT field are evaluated once and
    /// registered as a bare column of that name.
    pub fn apply_group_by(
        &mut self,
        selectors: &[Selector],
        group_by: &[EvaluatableNode],
    ) -> Result<Vec<EvaluatableNode>> {
        let mut paths = Vec::with_capacity(group_by.len());
        for key in group_by {
            let path = match key {
                EvaluatableNode::Field(path) => self.group_key_path(selectors, path)?,
                EvaluatableNode::Value(literal) => {
                    let position = literal.as_integer().ok_or_else(|| {
                        Error::semantic(format!(
                            "Attempt to group by a literal non-integer constant {}",
                            key
                        ))
                    })?;
                    let selector = usize::try_from(position)
                        .ok()
                        .and_then(|p| p.checked_sub(1))
                        .and_then(|i| selectors.get(i))
                        .ok_or_else(|| {
                            Error::semantic(format!(
                                "GROUP BY position {} is out of range for {} fields",
                                position,
                                selectors.len()
                            ))
                        })?;
                    self.group_key_path(selectors, &[selector.name()?])?
                }
                other => {
                    return Err(Error::semantic(format!("Invalid GROUP BY target {}", other)));
                }
            };
            paths.push(path);
        }

        let mut keyed: BTreeMap<Vec<Value>, Vec<usize>> = BTreeMap::new();
        let key_columns: Vec<Column> = paths
            .iter()
            .map(|p| {
                let parts: Vec<String> = match p.split_once('.') {
                    Some((table, name)) => vec![table.to_string(), name.to_string()],
                    None => vec![p.clone()],
                };
                self.local_column(&parts).cloned()
            })
            .collect::<Result<_>>()?;
        for row in 0..self.num_rows {
            let key: Vec<Value> = key_columns.iter().map(|c| c.values()[row].clone()).collect();
            keyed.entry(key).or_default().push(row);
        }
        debug!(
            "GROUP BY {:?}: {} rows in {} groups",
            paths,
            self.num_rows,
            keyed.len()
        );
        self.groups = Some(Rc::new(keyed.into_values().collect()));

        let marked = selectors
            .iter()
            .map(|s| EvaluatableNode::Selector(s.clone()).mark_grouped(&paths, self))
            .collect::<Result<_>>()?;
        self.group_paths = paths;
        Ok(marked)
    }

    fn group_key_path(&mut self, selectors: &[Selector], path: &[String]) -> Result<String> {
        if let Some(resolved) = self.try_resolve(path)? {
            return Ok(resolved);
        }
        let name = path.join(".");
        let selector = selectors
            .iter()
            .find(|s| path.len() == 1 && s.name().ok().as_deref() == Some(name.as_str()))
            .ok_or_else(|| {
                Error::unresolved(format!(
                    "Attempt to group by nonexistent field {}; fields available: {:?}",
                    name,
                    self.columns.iter().map(ContextColumn::path).collect::<Vec<_>>()
                ))
            })?;
        let column = evaluate(selector.expr(), self)?.into_column(self.num_rows)?;
        self.add_column(None, &name, column)?;
        Ok(name)
    }

    /// Treats the whole context as a single group, for aggregation without GROUP BY.
    pub fn group_all(&mut self) {
        self.groups = Some(Rc::new(vec![(0..self.num_rows).collect()]));
        self.group_paths.clear();
    }
}
