//! Schema lifecycle engine for SQL Server and Azure SQL Database.
//!
//! The crate brings a database to a target schema version from versioned
//! SQL scripts: it checks whether the database exists, creates it, builds
//! the schema, clears it, drops it, or rebuilds it when the stamped version
//! no longer matches.
//!
//! # Architecture
//!
//! - **`driver`**: the [`Connector`] / [`Connection`] abstraction, commands,
//!   rows, and explicit transaction enlistment
//! - **`statements`**: T-SQL generation for administrative statements
//! - **`lifecycle`**: [`LifecycleEngine`] and its builder
//! - **`transaction`**: the scoped [`Transaction`] handle and the
//!   [`TransactionalConnection`] proxy
//! - **`mssql`** (feature `mssql`): tiberius-backed SQL Server driver
//! - **`sqlite`** (feature `sqlite`): rusqlite-backed driver for local,
//!   schema-level work
//!
//! # Quick start
//!
//! ```no_run
//! # async fn demo() -> dbforge_engine::Result<()> {
//! use dbforge_core::InlineScripts;
//! use dbforge_engine::{LifecycleEngine, MssqlConnector};
//!
//! let scripts = InlineScripts::new()
//!     .with("orders.create.sql", "CREATE TABLE dbschema (version int)\nGO\nCREATE TABLE orders (id int)")
//!     .with("orders.clear.sql", "DELETE FROM orders")
//!     .with("orders.populate.sql", "");
//!
//! let engine = LifecycleEngine::builder(MssqlConnector)
//!     .connection_string("Server=tcp:localhost,1433;Database=orders;User ID=sa;Password=secret;TrustServerCertificate=true")
//!     .version(1)
//!     .script_provider(&scripts, "orders")
//!     .build()?;
//!
//! engine.migrate().await?;
//! engine.clear().await?;
//! # Ok(())
//! # }
//! ```

mod driver;
mod error;
mod lifecycle;
#[cfg(feature = "mssql")]
mod mssql;
#[cfg(feature = "sqlite")]
mod sqlite;
pub mod statements;
mod transaction;

pub use driver::{
    Command, Connection, ConnectionState, Connector, DriverError, DriverResult, Row,
    StateListener, StateListeners, TransactionId, Value, check_enlistment,
};
pub use error::{LifecycleError, Result};
pub use lifecycle::{CloudLogin, DEFAULT_GRACE_PERIOD, EngineBuilder, LifecycleEngine, MigrateOutcome};
#[cfg(feature = "mssql")]
pub use mssql::{MssqlConnection, MssqlConnector};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteConnection, SqliteConnector};
pub use statements::ServerKind;
pub use transaction::{Transaction, TransactionalConnection};
