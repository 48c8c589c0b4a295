//! Driver abstraction the lifecycle engine executes through.
//!
//! A [`Connector`] opens [`Connection`]s from a [`ConnectionString`]. A
//! connection executes [`Command`]s and manages at most one local
//! transaction at a time.
//!
//! Transaction enlistment is explicit. While a transaction is active, every
//! executed command must carry that transaction's [`TransactionId`];
//! otherwise execution fails with [`DriverError::TransactionMismatch`].
//! Commands obtain the id either from a scoped
//! [`Transaction`](crate::Transaction) or from a
//! [`TransactionalConnection`](crate::TransactionalConnection), which
//! enlists every command it creates.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use dbforge_core::{ColumnMap, ConnectionString};
use thiserror::Error;

/// Errors reported by drivers.
#[derive(Debug, Error)]
pub enum DriverError {
    /// A referenced table or other object does not exist.
    #[error("object not found: {0}")]
    UndefinedObject(String),

    /// Any other failure reported by the database.
    #[error("database error{}: {message}", .code.map(|c| format!(" {c}")).unwrap_or_default())]
    Database {
        /// Server error number, when the driver reports one.
        code: Option<u32>,
        message: String,
    },

    /// A command was executed without the connection's active transaction.
    #[error("command is not enlisted in the connection's active transaction")]
    TransactionMismatch,

    /// A transaction was begun while another one is active.
    #[error("a transaction is already active on this connection")]
    TransactionActive,

    /// The transaction handle does not match an active transaction.
    #[error("transaction is not active on this connection")]
    NoTransaction,

    /// The operation requires a different connection state.
    #[error("connection is {0}")]
    InvalidState(ConnectionState),

    /// The command did not complete within its timeout.
    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    /// The driver cannot perform the operation.
    #[error("{0} is not supported by this driver")]
    Unsupported(&'static str),

    /// Socket or file I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    /// Returns `true` when the failure is a missing table or object.
    pub fn is_undefined_object(&self) -> bool {
        matches!(self, DriverError::UndefinedObject(_))
    }
}

/// Convenience alias for results with [`DriverError`].
pub type DriverResult<T> = std::result::Result<T, DriverError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Open,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Closed => f.write_str("closed"),
            ConnectionState::Open => f.write_str("open"),
        }
    }
}

/// Callback invoked with `(previous, current)` on every state change.
pub type StateListener = Box<dyn Fn(ConnectionState, ConnectionState) + Send + Sync>;

/// Registered state-change listeners of one connection.
#[derive(Default)]
pub struct StateListeners {
    listeners: Vec<StateListener>,
}

impl StateListeners {
    pub fn push(&mut self, listener: StateListener) {
        self.listeners.push(listener);
    }

    /// Notifies every listener when `previous` differs from `current`.
    pub fn notify(&self, previous: ConnectionState, current: ConnectionState) {
        if previous != current {
            for listener in &self.listeners {
                listener(previous, current);
            }
        }
    }
}

impl fmt::Debug for StateListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateListeners")
            .field("count", &self.listeners.len())
            .finish()
    }
}

/// Handle of a local transaction, unique per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(u64);

impl TransactionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// One executable unit of SQL text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    text: String,
    timeout: Option<Duration>,
    transaction: Option<TransactionId>,
}

impl Command {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timeout: None,
            transaction: None,
        }
    }

    pub fn with_timeout(mut self, timeout: impl Into<Option<Duration>>) -> Self {
        self.timeout = timeout.into();
        self
    }

    /// Enlists the command in `transaction`.
    pub fn with_transaction(mut self, transaction: TransactionId) -> Self {
        self.transaction = Some(transaction);
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn transaction(&self) -> Option<TransactionId> {
        self.transaction
    }
}

/// Verifies that `command` may run while `active` is the current transaction.
///
/// Drivers call this before executing anything.
pub fn check_enlistment(active: Option<TransactionId>, command: &Command) -> DriverResult<()> {
    match (active, command.transaction) {
        (Some(active), Some(enlisted)) if active == enlisted => Ok(()),
        (Some(_), _) => Err(DriverError::TransactionMismatch),
        (None, Some(_)) => Err(DriverError::NoTransaction),
        (None, None) => Ok(()),
    }
}

/// A single result cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Bool(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// A result row with its column names.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Looks up a value by column name, case-insensitively.
    pub fn get_by_name(&self, column: &str) -> Option<&Value> {
        let index = self
            .columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))?;
        self.values.get(index)
    }

    /// Pairs each value with the field its column maps to.
    ///
    /// Columns without a matching field are skipped.
    pub fn map_fields<'r>(&'r self, map: &'r ColumnMap) -> Vec<(&'r str, &'r Value)> {
        map.resolve(self.columns.iter().map(String::as_str))
            .into_iter()
            .zip(&self.values)
            .filter_map(|(field, value)| field.map(|field| (field, value)))
            .collect()
    }
}

/// An open or closed database session.
///
/// Connections are released when dropped; drivers close their sockets or
/// files in `Drop`, so every exit path releases the session.
#[async_trait]
pub trait Connection: Send {
    fn connection_string(&self) -> &ConnectionString;

    /// Replaces the connection string. Only allowed while closed.
    fn set_connection_string(&mut self, connection_string: ConnectionString) -> DriverResult<()>;

    /// Name of the currently selected database.
    fn database(&self) -> Option<&str>;

    /// Server product version, available once open.
    fn server_version(&self) -> Option<&str>;

    fn state(&self) -> ConnectionState;

    fn on_state_change(&mut self, listener: StateListener);

    async fn open(&mut self) -> DriverResult<()>;

    /// Closes the session. An active transaction is rolled back by the server.
    async fn close(&mut self) -> DriverResult<()>;

    async fn change_database(&mut self, database: &str) -> DriverResult<()>;

    async fn begin_transaction(&mut self) -> DriverResult<TransactionId>;

    async fn commit(&mut self, transaction: TransactionId) -> DriverResult<()>;

    async fn rollback(&mut self, transaction: TransactionId) -> DriverResult<()>;

    /// Marks `transaction` as abandoned without awaiting.
    ///
    /// Called when a scoped transaction is dropped before commit or rollback.
    /// The driver must roll it back no later than its next round-trip.
    fn abandon(&mut self, transaction: TransactionId);

    /// Creates a command bound to this connection.
    fn create_command(&self, text: &str) -> Command {
        Command::new(text)
    }

    /// Executes a command and returns the number of affected rows.
    async fn execute(&mut self, command: &Command) -> DriverResult<u64>;

    /// Executes a command and returns the rows of its first result set.
    async fn query(&mut self, command: &Command) -> DriverResult<Vec<Row>>;
}

#[async_trait]
impl<C: Connection + ?Sized> Connection for Box<C> {
    fn connection_string(&self) -> &ConnectionString {
        (**self).connection_string()
    }

    fn set_connection_string(&mut self, connection_string: ConnectionString) -> DriverResult<()> {
        (**self).set_connection_string(connection_string)
    }

    fn database(&self) -> Option<&str> {
        (**self).database()
    }

    fn server_version(&self) -> Option<&str> {
        (**self).server_version()
    }

    fn state(&self) -> ConnectionState {
        (**self).state()
    }

    fn on_state_change(&mut self, listener: StateListener) {
        (**self).on_state_change(listener)
    }

    async fn open(&mut self) -> DriverResult<()> {
        (**self).open().await
    }

    async fn close(&mut self) -> DriverResult<()> {
        (**self).close().await
    }

    async fn change_database(&mut self, database: &str) -> DriverResult<()> {
        (**self).change_database(database).await
    }

    async fn begin_transaction(&mut self) -> DriverResult<TransactionId> {
        (**self).begin_transaction().await
    }

    async fn commit(&mut self, transaction: TransactionId) -> DriverResult<()> {
        (**self).commit(transaction).await
    }

    async fn rollback(&mut self, transaction: TransactionId) -> DriverResult<()> {
        (**self).rollback(transaction).await
    }

    fn abandon(&mut self, transaction: TransactionId) {
        (**self).abandon(transaction)
    }

    fn create_command(&self, text: &str) -> Command {
        (**self).create_command(text)
    }

    async fn execute(&mut self, command: &Command) -> DriverResult<u64> {
        (**self).execute(command).await
    }

    async fn query(&mut self, command: &Command) -> DriverResult<Vec<Row>> {
        (**self).query(command).await
    }
}

/// Opens connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a connection for `connection_string`.
    async fn connect(&self, connection_string: &ConnectionString) -> DriverResult<Box<dyn Connection>>;
}

#[async_trait]
impl<T: Connector + ?Sized> Connector for std::sync::Arc<T> {
    async fn connect(&self, connection_string: &ConnectionString) -> DriverResult<Box<dyn Connection>> {
        (**self).connect(connection_string).await
    }
}
