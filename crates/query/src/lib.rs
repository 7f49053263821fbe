//! Tabula Query - SQL evaluation engine for Tabula.
//!
//! This crate evaluates parsed queries against an in-memory [`Catalog`]:
//!
//! - `ast`: Expression, function call and query node definitions
//! - `context`: Name resolution, grouping state and correlated subquery scopes
//! - `executor`: Columnar evaluation of expressions, SELECT, joins, set
//!   operations, ORDER BY and LIMIT
//!
//! Queries are built through the node constructors; there is no SQL parser
//! in this crate.
//!
//! # Example
//!
//! ```rust
//! use tabula_query::ast::{DataSource, EvaluatableNode, FromItem, QueryExpression, Select, SelectField, SortOrder};
//! use tabula_query::{execute, Catalog, Table, Type, Value};
//!
//! let table = Table::from_rows(
//!     vec![("a", Type::INTEGER)],
//!     vec![vec![Value::Integer(1)], vec![Value::Integer(3)], vec![Value::Integer(2)]],
//! )
//! .unwrap();
//! let catalog = Catalog::new().with_table("my_project", "my_dataset", "my_table", table);
//!
//! let select = Select::new(vec![SelectField::star()])
//!     .from(DataSource::new(FromItem::table(&["my_table"]).unwrap()));
//! let query = QueryExpression::new(select)
//!     .order_by(vec![(EvaluatableNode::field("a"), SortOrder::Desc)]);
//!
//! let result = execute(&query, &catalog).unwrap();
//! assert_eq!(
//!     result.to_rows(),
//!     vec![vec![Value::Integer(3)], vec![Value::Integer(2)], vec![Value::Integer(1)]]
//! );
//! ```

pub mod ast;
pub mod context;
pub mod executor;

pub use ast::{DataframeNode, EvaluatableNode, QueryExpression};
pub use context::EvaluationContext;
pub use tabula_core::{Catalog, Column, Error, Result, Table, Type, Value};

use log::debug;

/// Evaluates a complete query against `catalog` and returns the result table.
pub fn execute(query: &QueryExpression, catalog: &Catalog) -> Result<Table> {
    let (table, _) = query.evaluate(catalog)?;
    debug!(
        "query returned {} rows x {} columns",
        table.num_rows(),
        table.num_columns()
    );
    Ok(table)
}
