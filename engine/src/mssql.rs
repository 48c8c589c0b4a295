//! SQL Server and Azure SQL driver backed by `tiberius`.
//!
//! The connection string is handed to tiberius' ADO parser, so every key it
//! understands (`Server`, `Initial Catalog`, `User ID`, `Password`,
//! `Encrypt`, `TrustServerCertificate`, ...) works unchanged. Azure gateway
//! redirects are followed once.
//!
//! Transaction control statements go through the simple-query path. Running
//! `BEGIN TRANSACTION` through `sp_executesql` would leave the transaction
//! count unbalanced when the procedure returns.

use async_trait::async_trait;
use dbforge_core::ConnectionString;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use tiberius::{Client, ColumnData, Config, FromSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, warn};

use crate::driver::{
    Command, Connection, ConnectionState, Connector, DriverError, DriverResult, Row,
    StateListener, StateListeners, TransactionId, Value, check_enlistment,
};

/// Server error number for "Invalid object name".
const INVALID_OBJECT_NAME: u32 = 208;

const PRODUCT_VERSION_SQL: &str =
    "SELECT CAST(SERVERPROPERTY('ProductVersion') AS nvarchar(128)) AS version";
const ROLLBACK_ABANDONED_SQL: &str = "IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION";

type TdsClient = Client<Compat<TcpStream>>;

/// A [`Connection`] to SQL Server or Azure SQL Database.
pub struct MssqlConnection {
    connection_string: ConnectionString,
    client: Option<TdsClient>,
    database: Option<String>,
    server_version: Option<String>,
    active: Option<TransactionId>,
    next_transaction: u64,
    pending_rollback: bool,
    listeners: StateListeners,
}

impl MssqlConnection {
    /// Creates a closed connection for `connection_string`.
    pub fn new(connection_string: ConnectionString) -> Self {
        Self {
            connection_string,
            client: None,
            database: None,
            server_version: None,
            active: None,
            next_transaction: 0,
            pending_rollback: false,
            listeners: StateListeners::default(),
        }
    }

    fn client(&mut self) -> DriverResult<&mut TdsClient> {
        self.client
            .as_mut()
            .ok_or(DriverError::InvalidState(ConnectionState::Closed))
    }

    async fn simple(&mut self, sql: &str) -> DriverResult<()> {
        let client = self.client()?;
        client
            .simple_query(sql)
            .await
            .map_err(map_error)?
            .into_results()
            .await
            .map_err(map_error)?;
        Ok(())
    }

    /// Rolls back a transaction abandoned since the last round-trip.
    async fn settle_abandoned(&mut self) -> DriverResult<()> {
        if self.pending_rollback {
            self.pending_rollback = false;
            debug!("Rolling back abandoned transaction");
            self.simple(ROLLBACK_ABANDONED_SQL).await?;
        }
        Ok(())
    }

    fn require_active(&self, transaction: TransactionId) -> DriverResult<()> {
        if self.active == Some(transaction) {
            Ok(())
        } else {
            Err(DriverError::NoTransaction)
        }
    }

    async fn read_server_version(&mut self) -> DriverResult<Option<String>> {
        let client = self.client()?;
        let rows = client
            .query(PRODUCT_VERSION_SQL, &[])
            .await
            .map_err(map_error)?
            .into_first_result()
            .await
            .map_err(map_error)?;
        Ok(rows
            .first()
            .and_then(|row| row.get::<&str, _>(0))
            .map(str::to_string))
    }
}

async fn connect_client(config: Config) -> DriverResult<TdsClient> {
    let tcp = TcpStream::connect(config.get_addr()).await?;
    tcp.set_nodelay(true)?;

    match Client::connect(config.clone(), tcp.compat_write()).await {
        Ok(client) => Ok(client),
        Err(tiberius::error::Error::Routing { host, port }) => {
            debug!(host = %host, port, "Following gateway redirect");
            let mut config = config;
            config.host(&host);
            config.port(port);
            let tcp = TcpStream::connect(config.get_addr()).await?;
            tcp.set_nodelay(true)?;
            Client::connect(config, tcp.compat_write())
                .await
                .map_err(map_error)
        }
        Err(err) => Err(map_error(err)),
    }
}

async fn with_timeout<T>(
    command: &Command,
    work: impl Future<Output = DriverResult<T>>,
) -> DriverResult<T> {
    match command.timeout() {
        Some(limit) => tokio::time::timeout(limit, work)
            .await
            .map_err(|_| DriverError::Timeout(limit))?,
        None => work.await,
    }
}

#[async_trait]
impl Connection for MssqlConnection {
    fn connection_string(&self) -> &ConnectionString {
        &self.connection_string
    }

    fn set_connection_string(&mut self, connection_string: ConnectionString) -> DriverResult<()> {
        if self.client.is_some() {
            return Err(DriverError::InvalidState(ConnectionState::Open));
        }
        self.connection_string = connection_string;
        Ok(())
    }

    fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    fn server_version(&self) -> Option<&str> {
        self.server_version.as_deref()
    }

    fn state(&self) -> ConnectionState {
        if self.client.is_some() {
            ConnectionState::Open
        } else {
            ConnectionState::Closed
        }
    }

    fn on_state_change(&mut self, listener: StateListener) {
        self.listeners.push(listener);
    }

    async fn open(&mut self) -> DriverResult<()> {
        if self.client.is_some() {
            return Err(DriverError::InvalidState(ConnectionState::Open));
        }
        let config = Config::from_ado_string(&self.connection_string.to_string()).map_err(map_error)?;
        debug!(addr = %config.get_addr(), "Connecting to SQL Server");

        self.client = Some(connect_client(config).await?);
        self.database = Some(
            self.connection_string
                .catalog()
                .unwrap_or("master")
                .to_string(),
        );
        self.server_version = self.read_server_version().await?;
        self.listeners
            .notify(ConnectionState::Closed, ConnectionState::Open);
        Ok(())
    }

    async fn close(&mut self) -> DriverResult<()> {
        let Some(client) = self.client.take() else {
            return Ok(());
        };
        self.active = None;
        self.pending_rollback = false;
        self.database = None;
        let result = client.close().await.map_err(map_error);
        self.listeners
            .notify(ConnectionState::Open, ConnectionState::Closed);
        result
    }

    async fn change_database(&mut self, database: &str) -> DriverResult<()> {
        self.settle_abandoned().await?;
        let sql = format!("USE {}", crate::statements::quote_identifier(database));
        self.simple(&sql).await?;
        self.database = Some(database.to_string());
        Ok(())
    }

    async fn begin_transaction(&mut self) -> DriverResult<TransactionId> {
        if self.active.is_some() {
            return Err(DriverError::TransactionActive);
        }
        self.settle_abandoned().await?;
        self.simple("BEGIN TRANSACTION").await?;
        self.next_transaction += 1;
        let id = TransactionId::new(self.next_transaction);
        self.active = Some(id);
        Ok(id)
    }

    async fn commit(&mut self, transaction: TransactionId) -> DriverResult<()> {
        self.require_active(transaction)?;
        self.simple("COMMIT TRANSACTION").await?;
        self.active = None;
        Ok(())
    }

    async fn rollback(&mut self, transaction: TransactionId) -> DriverResult<()> {
        self.require_active(transaction)?;
        self.active = None;
        self.simple(ROLLBACK_ABANDONED_SQL).await
    }

    fn abandon(&mut self, transaction: TransactionId) {
        if self.active == Some(transaction) {
            self.active = None;
            self.pending_rollback = true;
        } else {
            warn!(transaction = ?transaction, "Abandoned transaction is not active");
        }
    }

    async fn execute(&mut self, command: &Command) -> DriverResult<u64> {
        check_enlistment(self.active, command)?;
        self.settle_abandoned().await?;
        let client = self.client()?;
        with_timeout(command, async move {
            let result = client.execute(command.text(), &[]).await.map_err(map_error)?;
            Ok::<_, DriverError>(result.total())
        })
        .await
    }

    async fn query(&mut self, command: &Command) -> DriverResult<Vec<Row>> {
        check_enlistment(self.active, command)?;
        self.settle_abandoned().await?;
        let client = self.client()?;
        let rows = with_timeout(command, async move {
            client
                .query(command.text(), &[])
                .await
                .map_err(map_error)?
                .into_first_result()
                .await
                .map_err(map_error)
        })
        .await?;

        rows.into_iter().map(convert_row).collect()
    }
}

/// Opens [`MssqlConnection`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlConnector;

#[async_trait]
impl Connector for MssqlConnector {
    async fn connect(&self, connection_string: &ConnectionString) -> DriverResult<Box<dyn Connection>> {
        let mut conn = MssqlConnection::new(connection_string.clone());
        conn.open().await?;
        Ok(Box::new(conn))
    }
}

fn convert_row(row: tiberius::Row) -> DriverResult<Row> {
    let columns = row
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    let values = row.into_iter().map(convert_value).collect::<DriverResult<_>>()?;
    Ok(Row::new(columns, values))
}

fn convert_value(data: ColumnData<'static>) -> DriverResult<Value> {
    let value = match data {
        ColumnData::U8(v) => v.map_or(Value::Null, |v| Value::Int(v.into())),
        ColumnData::I16(v) => v.map_or(Value::Null, |v| Value::Int(v.into())),
        ColumnData::I32(v) => v.map_or(Value::Null, |v| Value::Int(v.into())),
        ColumnData::I64(v) => v.map_or(Value::Null, Value::Int),
        ColumnData::F32(v) => v.map_or(Value::Null, |v| Value::Float(v.into())),
        ColumnData::F64(v) => v.map_or(Value::Null, Value::Float),
        ColumnData::Bit(v) => v.map_or(Value::Null, Value::Bool),
        ColumnData::String(v) => v.map_or(Value::Null, |v| Value::Text(v.into_owned())),
        ColumnData::Binary(v) => v.map_or(Value::Null, |v| Value::Bytes(v.into_owned())),
        ColumnData::Guid(v) => v.map_or(Value::Null, |v| Value::Text(v.to_string())),
        ColumnData::Numeric(v) => v.map_or(Value::Null, |v| Value::Float(v.into())),
        ColumnData::Xml(v) => v.map_or(Value::Null, |v| Value::Text(v.into_owned().into_string())),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            temporal::<NaiveDateTime>(&data)?
        }
        ColumnData::Date(_) => temporal::<NaiveDate>(&data)?,
        ColumnData::Time(_) => temporal::<NaiveTime>(&data)?,
        ColumnData::DateTimeOffset(_) => temporal::<DateTime<FixedOffset>>(&data)?,
    };
    Ok(value)
}

/// Renders a date or time column as text.
fn temporal<'a, T>(data: &'a ColumnData<'static>) -> DriverResult<Value>
where
    T: FromSql<'a> + ToString,
{
    let value = T::from_sql(data).map_err(map_error)?;
    Ok(value.map_or(Value::Null, |v| Value::Text(v.to_string())))
}

fn map_error(err: tiberius::error::Error) -> DriverError {
    match err {
        tiberius::error::Error::Server(token) if token.code() == INVALID_OBJECT_NAME => {
            DriverError::UndefinedObject(token.message().to_string())
        }
        tiberius::error::Error::Server(token) => DriverError::Database {
            code: Some(token.code()),
            message: token.message().to_string(),
        },
        other => DriverError::Database {
            code: None,
            message: other.to_string(),
        },
    }
}
