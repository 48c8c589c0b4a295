//! SQLite driver backed by `rusqlite`.
//!
//! SQLite has no server, so only schema-level operations make sense here:
//! [`LifecycleEngine::build_schema`](crate::LifecycleEngine::build_schema),
//! [`LifecycleEngine::clear_with`](crate::LifecycleEngine::clear_with) and
//! version reads. Database-level statements simply fail with the SQLite error.
//!
//! The file is taken from the `Data Source` key of the connection string;
//! `Data Source=:memory:` opens a private in-memory database.

use std::path::Path;

use async_trait::async_trait;
use dbforge_core::ConnectionString;
use rusqlite::types::ValueRef;
use tracing::{debug, warn};

use crate::driver::{
    Command, Connection, ConnectionState, Connector, DriverError, DriverResult, Row,
    StateListener, StateListeners, TransactionId, Value, check_enlistment,
};

const DATA_SOURCE_KEY: &str = "Data Source";
const MEMORY: &str = ":memory:";

/// A [`Connection`] to a SQLite database file.
pub struct SqliteConnection {
    connection_string: ConnectionString,
    conn: Option<rusqlite::Connection>,
    active: Option<TransactionId>,
    next_transaction: u64,
    listeners: StateListeners,
}

impl SqliteConnection {
    /// Creates a closed connection for `connection_string`.
    pub fn from_connection_string(connection_string: ConnectionString) -> Self {
        Self {
            connection_string,
            conn: None,
            active: None,
            next_transaction: 0,
            listeners: StateListeners::default(),
        }
    }

    /// Opens (creating if needed) the database file at `path`.
    pub fn open_path(path: impl AsRef<Path>) -> DriverResult<Self> {
        let path = path.as_ref();
        let mut connection_string = ConnectionString::default();
        connection_string.set(DATA_SOURCE_KEY, path.to_string_lossy());
        let mut this = Self::from_connection_string(connection_string);
        this.conn = Some(rusqlite::Connection::open(path).map_err(map_error)?);
        Ok(this)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> DriverResult<Self> {
        let mut connection_string = ConnectionString::default();
        connection_string.set(DATA_SOURCE_KEY, MEMORY);
        let mut this = Self::from_connection_string(connection_string);
        this.conn = Some(rusqlite::Connection::open_in_memory().map_err(map_error)?);
        Ok(this)
    }

    fn handle(&self) -> DriverResult<&rusqlite::Connection> {
        self.conn
            .as_ref()
            .ok_or(DriverError::InvalidState(ConnectionState::Closed))
    }

    fn require_active(&self, transaction: TransactionId) -> DriverResult<()> {
        if self.active == Some(transaction) {
            Ok(())
        } else {
            Err(DriverError::NoTransaction)
        }
    }

    fn apply_timeout(&self, conn: &rusqlite::Connection, command: &Command) -> DriverResult<()> {
        if let Some(timeout) = command.timeout() {
            conn.busy_timeout(timeout).map_err(map_error)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    fn connection_string(&self) -> &ConnectionString {
        &self.connection_string
    }

    fn set_connection_string(&mut self, connection_string: ConnectionString) -> DriverResult<()> {
        if self.conn.is_some() {
            return Err(DriverError::InvalidState(ConnectionState::Open));
        }
        self.connection_string = connection_string;
        Ok(())
    }

    fn database(&self) -> Option<&str> {
        self.conn.as_ref().map(|_| "main")
    }

    fn server_version(&self) -> Option<&str> {
        self.conn.as_ref().map(|_| rusqlite::version())
    }

    fn state(&self) -> ConnectionState {
        if self.conn.is_some() {
            ConnectionState::Open
        } else {
            ConnectionState::Closed
        }
    }

    fn on_state_change(&mut self, listener: StateListener) {
        self.listeners.push(listener);
    }

    async fn open(&mut self) -> DriverResult<()> {
        if self.conn.is_some() {
            return Err(DriverError::InvalidState(ConnectionState::Open));
        }
        let source = self
            .connection_string
            .get(DATA_SOURCE_KEY)
            .ok_or_else(|| DriverError::Database {
                code: None,
                message: format!("connection string has no '{DATA_SOURCE_KEY}'"),
            })?;

        debug!(source = %source, "Opening SQLite database");
        let conn = if source == MEMORY {
            rusqlite::Connection::open_in_memory()
        } else {
            rusqlite::Connection::open(source)
        }
        .map_err(map_error)?;

        self.conn = Some(conn);
        self.listeners
            .notify(ConnectionState::Closed, ConnectionState::Open);
        Ok(())
    }

    async fn close(&mut self) -> DriverResult<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        self.active = None;
        let result = conn.close().map_err(|(_, err)| map_error(err));
        self.listeners
            .notify(ConnectionState::Open, ConnectionState::Closed);
        result
    }

    async fn change_database(&mut self, _database: &str) -> DriverResult<()> {
        Err(DriverError::Unsupported("changing the database"))
    }

    async fn begin_transaction(&mut self) -> DriverResult<TransactionId> {
        if self.active.is_some() {
            return Err(DriverError::TransactionActive);
        }
        self.handle()?.execute_batch("BEGIN").map_err(map_error)?;
        self.next_transaction += 1;
        let id = TransactionId::new(self.next_transaction);
        self.active = Some(id);
        Ok(id)
    }

    async fn commit(&mut self, transaction: TransactionId) -> DriverResult<()> {
        self.require_active(transaction)?;
        self.handle()?.execute_batch("COMMIT").map_err(map_error)?;
        self.active = None;
        Ok(())
    }

    async fn rollback(&mut self, transaction: TransactionId) -> DriverResult<()> {
        self.require_active(transaction)?;
        self.active = None;
        self.handle()?.execute_batch("ROLLBACK").map_err(map_error)
    }

    fn abandon(&mut self, transaction: TransactionId) {
        if self.active != Some(transaction) {
            return;
        }
        self.active = None;
        if let Some(conn) = &self.conn {
            if let Err(err) = conn.execute_batch("ROLLBACK") {
                warn!(error = %err, "Rollback of abandoned transaction failed");
            }
        }
    }

    async fn execute(&mut self, command: &Command) -> DriverResult<u64> {
        check_enlistment(self.active, command)?;
        let conn = self.handle()?;
        self.apply_timeout(conn, command)?;
        conn.execute_batch(command.text()).map_err(map_error)?;
        Ok(conn.changes() as u64)
    }

    async fn query(&mut self, command: &Command) -> DriverResult<Vec<Row>> {
        check_enlistment(self.active, command)?;
        let conn = self.handle()?;
        self.apply_timeout(conn, command)?;

        let mut stmt = conn.prepare(command.text()).map_err(map_error)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query([]).map_err(map_error)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(map_error)? {
            let values = (0..columns.len())
                .map(|i| row.get_ref(i).map(value_from_ref))
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(map_error)?;
            out.push(Row::new(columns.clone(), values));
        }
        Ok(out)
    }
}

/// Opens [`SqliteConnection`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteConnector;

#[async_trait]
impl Connector for SqliteConnector {
    async fn connect(&self, connection_string: &ConnectionString) -> DriverResult<Box<dyn Connection>> {
        let mut conn = SqliteConnection::from_connection_string(connection_string.clone());
        conn.open().await?;
        Ok(Box::new(conn))
    }
}

fn value_from_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Int(v),
        ValueRef::Real(v) => Value::Float(v),
        ValueRef::Text(v) => Value::Text(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(v) => Value::Bytes(v.to_vec()),
    }
}

fn map_error(err: rusqlite::Error) -> DriverError {
    let message = err.to_string();
    if message.contains("no such table") {
        return DriverError::UndefinedObject(message);
    }
    let code = match &err {
        rusqlite::Error::SqliteFailure(failure, _) => u32::try_from(failure.extended_code).ok(),
        _ => None,
    };
    DriverError::Database { code, message }
}
