//! Core building blocks for dbforge.
//!
//! This crate holds the pieces of the schema lifecycle that never touch a
//! database connection:
//!
//! - [`ScriptSet`]: create, clear, and populate statements parsed from
//!   `GO`-separated scripts ([`parse`], [`parse_str`]).
//! - [`ScriptProvider`]: lookup of script text by resource name, with
//!   [`InlineScripts`] for plain strings.
//! - [`ConnectionString`]: ADO-style connection strings whose catalog can be
//!   stripped and restored.
//! - [`NamingOptions`] / [`ColumnMap`]: underscore- and prefix-insensitive
//!   column to field matching.
//! - [`ConfigError`]: validation failures raised before any I/O.
//!
//! # Example
//!
//! ```
//! use dbforge_core::*;
//!
//! let scripts = InlineScripts::new()
//!     .with("app.create.sql", "CREATE TABLE dbschema (version int)\nGO\nCREATE TABLE t (id int)")
//!     .with("app.clear.sql", "DELETE FROM t")
//!     .with("app.populate.sql", "INSERT INTO t VALUES (1)");
//!
//! let set = ScriptSet::from_provider(&scripts, "app").unwrap();
//! assert_eq!(set.create().len(), 2);
//! assert_eq!(set.build_statements().count(), 3);
//! ```

mod connection_string;
mod error;
mod naming;
mod script;
mod source;

pub use connection_string::{CATALOG_KEYS, ConnectionString};
pub use error::{ConfigError, Result};
pub use naming::{ColumnMap, NamingOptions};
pub use script::{
    BATCH_SEPARATOR, CLEAR_SCRIPT, CREATE_SCRIPT, POPULATE_SCRIPT, ScriptSet, parse, parse_str,
    resource_name,
};
pub use source::{InlineScripts, ScriptProvider};
