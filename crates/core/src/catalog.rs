//! In-memory catalog of tables, keyed `project → dataset → table`.

use crate::table::Table;
use std::collections::BTreeMap;

/// Tables of one dataset, by table name.
pub type Dataset = BTreeMap<String, Table>;

/// Nested mapping of every table a query may reference.
///
/// The catalog is read-only during evaluation; ordered maps keep error
/// messages that list candidates deterministic.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    projects: BTreeMap<String, BTreeMap<String, Dataset>>,
}

impl Catalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table, replacing any table already at that path.
    pub fn insert(
        &mut self,
        project: impl Into<String>,
        dataset: impl Into<String>,
        table_name: impl Into<String>,
        table: Table,
    ) {
        self.projects
            .entry(project.into())
            .or_default()
            .entry(dataset.into())
            .or_default()
            .insert(table_name.into(), table);
    }

    /// Builder form of [`Catalog::insert`].
    pub fn with_table(
        mut self,
        project: impl Into<String>,
        dataset: impl Into<String>,
        table_name: impl Into<String>,
        table: Table,
    ) -> Self {
        self.insert(project, dataset, table_name, table);
        self
    }

    /// Project names, sorted.
    pub fn project_names(&self) -> Vec<&str> {
        self.projects.keys().map(String::as_str).collect()
    }

    /// Dataset names of one project, sorted.
    pub fn dataset_names(&self, project: &str) -> Option<Vec<&str>> {
        self.projects
            .get(project)
            .map(|datasets| datasets.keys().map(String::as_str).collect())
    }

    /// Looks up a table by its fully-qualified path.
    pub fn get(&self, project: &str, dataset: &str, table_name: &str) -> Option<&Table> {
        self.projects.get(project)?.get(dataset)?.get(table_name)
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}
