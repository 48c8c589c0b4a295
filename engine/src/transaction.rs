//! Scoped transactions and the transactional connection proxy.
//!
//! Two ways to run several commands in one local transaction:
//!
//! - [`Transaction`] is a scoped handle. Commands created through it are
//!   enlisted, [`commit`](Transaction::commit) and
//!   [`rollback`](Transaction::rollback) consume it, and dropping it
//!   unfinished abandons the transaction so the driver rolls it back.
//! - [`TransactionalConnection`] wraps a connection and remembers the
//!   transaction begun on it; every command it creates until commit or
//!   rollback is enlisted automatically, so call sites never thread the
//!   handle through.
//!
//! ```no_run
//! # async fn demo(conn: &mut dyn dbforge_engine::Connection) -> dbforge_engine::DriverResult<()> {
//! use dbforge_engine::Transaction;
//!
//! let mut tx = Transaction::begin(conn).await?;
//! tx.execute("DELETE FROM order_lines").await?;
//! tx.execute("DELETE FROM orders").await?;
//! tx.commit().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use dbforge_core::ConnectionString;

use crate::driver::{
    Command, Connection, ConnectionState, DriverResult, Row, StateListener, TransactionId,
};

/// A local transaction borrowed from a connection.
pub struct Transaction<'c, C: Connection + ?Sized> {
    conn: &'c mut C,
    id: TransactionId,
    finished: bool,
}

impl<'c, C: Connection + ?Sized> Transaction<'c, C> {
    /// Begins a transaction on `conn`.
    pub async fn begin(conn: &'c mut C) -> DriverResult<Self> {
        let id = conn.begin_transaction().await?;
        Ok(Self {
            conn,
            id,
            finished: false,
        })
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Creates a command enlisted in this transaction.
    pub fn command(&self, text: &str) -> Command {
        self.conn.create_command(text).with_transaction(self.id)
    }

    pub async fn execute(&mut self, text: &str) -> DriverResult<u64> {
        let command = self.command(text);
        self.conn.execute(&command).await
    }

    /// Executes a command created by [`command`](Self::command).
    pub async fn execute_command(&mut self, command: &Command) -> DriverResult<u64> {
        self.conn.execute(command).await
    }

    pub async fn query(&mut self, text: &str) -> DriverResult<Vec<Row>> {
        let command = self.command(text);
        self.conn.query(&command).await
    }

    pub async fn commit(mut self) -> DriverResult<()> {
        self.finished = true;
        self.conn.commit(self.id).await
    }

    pub async fn rollback(mut self) -> DriverResult<()> {
        self.finished = true;
        self.conn.rollback(self.id).await
    }
}

impl<C: Connection + ?Sized> Drop for Transaction<'_, C> {
    fn drop(&mut self) {
        if !self.finished {
            self.conn.abandon(self.id);
        }
    }
}

/// Connection wrapper that enlists created commands in its active transaction.
///
/// Only one transaction may be active at a time; beginning another one
/// before the first ends is rejected by the inner driver. Dropping the proxy
/// drops the inner connection.
pub struct TransactionalConnection<C> {
    inner: C,
    current: Option<TransactionId>,
}

impl<C: Connection> TransactionalConnection<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            current: None,
        }
    }

    /// The transaction new commands are enlisted in, if any.
    pub fn current_transaction(&self) -> Option<TransactionId> {
        self.current
    }

    fn release(&mut self, transaction: TransactionId) {
        if self.current == Some(transaction) {
            self.current = None;
        }
    }
}

#[async_trait]
impl<C: Connection> Connection for TransactionalConnection<C> {
    fn connection_string(&self) -> &ConnectionString {
        self.inner.connection_string()
    }

    fn set_connection_string(&mut self, connection_string: ConnectionString) -> DriverResult<()> {
        self.inner.set_connection_string(connection_string)
    }

    fn database(&self) -> Option<&str> {
        self.inner.database()
    }

    fn server_version(&self) -> Option<&str> {
        self.inner.server_version()
    }

    fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    fn on_state_change(&mut self, listener: StateListener) {
        self.inner.on_state_change(listener)
    }

    async fn open(&mut self) -> DriverResult<()> {
        self.inner.open().await
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.current = None;
        self.inner.close().await
    }

    async fn change_database(&mut self, database: &str) -> DriverResult<()> {
        self.inner.change_database(database).await
    }

    async fn begin_transaction(&mut self) -> DriverResult<TransactionId> {
        let id = self.inner.begin_transaction().await?;
        self.current = Some(id);
        Ok(id)
    }

    async fn commit(&mut self, transaction: TransactionId) -> DriverResult<()> {
        let result = self.inner.commit(transaction).await;
        self.release(transaction);
        result
    }

    async fn rollback(&mut self, transaction: TransactionId) -> DriverResult<()> {
        let result = self.inner.rollback(transaction).await;
        self.release(transaction);
        result
    }

    fn abandon(&mut self, transaction: TransactionId) {
        self.inner.abandon(transaction);
        self.release(transaction);
    }

    fn create_command(&self, text: &str) -> Command {
        let command = self.inner.create_command(text);
        match self.current {
            Some(id) => command.with_transaction(id),
            None => command,
        }
    }

    async fn execute(&mut self, command: &Command) -> DriverResult<u64> {
        self.inner.execute(command).await
    }

    async fn query(&mut self, command: &Command) -> DriverResult<Vec<Row>> {
        self.inner.query(command).await
    }
}
