//! Tabula Core - Data model for the Tabula SQL evaluation engine.
//!
//! This crate provides the types every query operates on:
//!
//! - `Type`: SQL types (scalars, ARRAY, STRUCT) and the implicit coercion lattice
//! - `Value`: Runtime cell values
//! - `Column` / `Table`: Typed columnar data
//! - `Catalog`: Tables addressable as `project.dataset.table`
//! - `Error`: Error types for query construction and evaluation
//!
//! # Example
//!
//! ```rust
//! use tabula_core::{implicitly_coerce, Catalog, Table, Type, Value};
//!
//! let table = Table::from_rows(
//!     vec![("a", Type::INTEGER)],
//!     vec![vec![Value::Integer(1)], vec![Value::Integer(2)]],
//! )
//! .unwrap();
//!
//! let catalog = Catalog::new().with_table("my_project", "my_dataset", "my_table", table);
//! assert_eq!(catalog.get("my_project", "my_dataset", "my_table").unwrap().num_rows(), 2);
//!
//! let common = implicitly_coerce(&[Some(Type::INTEGER), None, Some(Type::FLOAT)]).unwrap();
//! assert_eq!(common, Some(Type::FLOAT));
//! ```

mod cast;
mod catalog;
mod column;
mod error;
pub mod pattern_match;
mod table;
mod types;
mod value;

pub use cast::{cast_value, parse_date, parse_datetime, parse_timestamp};
pub use catalog::{Catalog, Dataset};
pub use column::Column;
pub use error::{Error, Result};
pub use table::Table;
pub use types::{coerce, implicitly_coerce, type_name, ScalarType, StructField, Type};
pub use value::Value;
