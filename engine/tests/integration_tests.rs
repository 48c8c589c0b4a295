//! Integration tests for the dbforge-engine crate.
//!
//! Server-level behavior runs against `FakeServer`, an in-memory stand-in
//! for SQL Server that understands the administrative statements the engine
//! issues and records everything else. Schema-level behavior also runs
//! against real SQLite files.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use dbforge_core::ConnectionString;
use dbforge_engine::statements::{ENGINE_EDITION_SQL, SCHEMA_VERSION_SQL};
use dbforge_engine::{
    Command, Connection, ConnectionState, Connector, DriverError, DriverResult, LifecycleEngine,
    LifecycleError, MigrateOutcome, Row, SqliteConnection, SqliteConnector, StateListener,
    TransactionId, Value, check_enlistment,
};
use dbforge_scripts::ScriptBundle;
use tempfile::TempDir;
use tokio::time::Instant;

const CONNECTION: &str = "Server=tcp:fake,1433;Initial Catalog=orders;User ID=sa;Password=pw";

const CREATE: &str = "\
CREATE TABLE dbschema (version int)
GO
CREATE TABLE orders (id int PRIMARY KEY)
GO
CREATE INDEX ix_orders ON orders (id)
";
const CLEAR: &str = "DELETE FROM order_lines\ngo\nDELETE FROM orders\n";
const POPULATE: &str = "INSERT INTO orders VALUES (1)\n  GO  \nINSERT INTO orders VALUES (2)\n";

// --- Fake server ---

#[derive(Debug, Default)]
struct Database {
    /// `None` until `dbschema` is created.
    versions: Option<Vec<i32>>,
    committed: Vec<String>,
}

#[derive(Debug, Default)]
struct ServerState {
    cloud: bool,
    fail_on: Option<String>,
    databases: BTreeMap<String, Database>,
    /// `(database, statement)` of every successful non-query command.
    executed: Vec<(Option<String>, String)>,
    /// When each create or drop of a database happened.
    ddl_at: Vec<(String, Instant)>,
    open_connections: usize,
    rollbacks: usize,
}

#[derive(Clone, Default)]
struct FakeServer {
    state: Arc<Mutex<ServerState>>,
}

impl FakeServer {
    fn new() -> Self {
        Self::default()
    }

    fn cloud() -> Self {
        let server = Self::new();
        server.state().cloud = true;
        server
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap()
    }

    fn with_database(self, name: &str, versions: Option<Vec<i32>>) -> Self {
        self.state().databases.insert(
            name.to_string(),
            Database {
                versions,
                committed: Vec::new(),
            },
        );
        self
    }

    fn fail_on(&self, fragment: &str) {
        self.state().fail_on = Some(fragment.to_string());
    }

    fn has_database(&self, name: &str) -> bool {
        self.state().databases.contains_key(name)
    }

    fn versions(&self, name: &str) -> Option<Vec<i32>> {
        self.state().databases.get(name)?.versions.clone()
    }

    fn committed(&self, name: &str) -> Vec<String> {
        self.state()
            .databases
            .get(name)
            .map(|db| db.committed.clone())
            .unwrap_or_default()
    }

    fn executed(&self) -> Vec<String> {
        self.state()
            .executed
            .iter()
            .map(|(_, sql)| sql.clone())
            .collect()
    }

    fn ddl_at(&self, prefix: &str) -> Instant {
        self.state()
            .ddl_at
            .iter()
            .rev()
            .find(|(sql, _)| sql.starts_with(prefix))
            .map(|(_, at)| *at)
            .unwrap()
    }
}

#[async_trait]
impl Connector for FakeServer {
    async fn connect(&self, connection_string: &ConnectionString) -> DriverResult<Box<dyn Connection>> {
        let database = connection_string.catalog().map(str::to_string);
        let mut state = self.state();
        if let Some(name) = &database {
            if !state.databases.contains_key(name) {
                return Err(DriverError::Database {
                    code: Some(4060),
                    message: format!("Cannot open database \"{name}\" requested by the login."),
                });
            }
        }
        state.open_connections += 1;
        Ok(Box::new(FakeConnection {
            server: self.clone(),
            connection_string: connection_string.clone(),
            database,
            active: None,
            next_transaction: 0,
            pending: Vec::new(),
        }))
    }
}

struct FakeConnection {
    server: FakeServer,
    connection_string: ConnectionString,
    database: Option<String>,
    active: Option<TransactionId>,
    next_transaction: u64,
    pending: Vec<String>,
}

impl FakeConnection {
    fn run(&mut self, command: &Command, query: bool) -> DriverResult<Vec<Row>> {
        check_enlistment(self.active, command)?;
        let sql = command.text();
        let server = self.server.clone();
        let mut state = server.state();

        if let Some(fragment) = &state.fail_on {
            if sql.contains(fragment.as_str()) {
                return Err(DriverError::Database {
                    code: Some(50000),
                    message: format!("injected failure on '{fragment}'"),
                });
            }
        }

        if sql == ENGINE_EDITION_SQL {
            let edition = if state.cloud { 5 } else { 3 };
            return Ok(vec![row("edition", Value::Int(edition))]);
        }
        if let Some(rest) = sql.strip_prefix("SELECT name FROM sys.databases WHERE name = N'") {
            let name = rest.trim_end_matches('\'');
            return Ok(if state.databases.contains_key(name) {
                vec![row("name", Value::Text(name.to_string()))]
            } else {
                Vec::new()
            });
        }
        if sql.starts_with("CREATE DATABASE") {
            let name = bracketed(sql);
            if state.databases.contains_key(&name) {
                return Err(DriverError::Database {
                    code: Some(1801),
                    message: format!("Database '{name}' already exists."),
                });
            }
            state.databases.insert(name, Database::default());
            state.ddl_at.push((sql.to_string(), Instant::now()));
        } else if sql.contains("DROP DATABASE") {
            let name = bracketed(sql);
            state.databases.remove(&name);
            state.ddl_at.push((sql.to_string(), Instant::now()));
        } else if let Some(name) = self.database.clone() {
            let Some(db) = state.databases.get_mut(&name) else {
                return Err(DriverError::Database {
                    code: Some(4060),
                    message: format!("database '{name}' is gone"),
                });
            };
            if sql == SCHEMA_VERSION_SQL {
                let Some(versions) = &db.versions else {
                    return Err(DriverError::UndefinedObject("Invalid object name 'dbschema'.".into()));
                };
                let max = versions.iter().max().map_or(Value::Null, |v| Value::Int((*v).into()));
                return Ok(vec![row("version", max)]);
            }
            if sql.starts_with("CREATE TABLE dbschema") {
                db.versions = Some(Vec::new());
            } else if let Some(rest) = sql.strip_prefix("INSERT INTO dbschema (version) VALUES (") {
                let version = rest.trim_end_matches(')').parse().unwrap();
                match &mut db.versions {
                    Some(versions) => versions.push(version),
                    None => {
                        return Err(DriverError::UndefinedObject("Invalid object name 'dbschema'.".into()));
                    }
                }
            } else if self.active.is_some() {
                self.pending.push(sql.to_string());
            } else {
                db.committed.push(sql.to_string());
            }
        }

        if !query {
            state.executed.push((self.database.clone(), sql.to_string()));
        }
        Ok(Vec::new())
    }

    fn end_transaction(&mut self, commit: bool) {
        self.active = None;
        let pending = std::mem::take(&mut self.pending);
        let mut state = self.server.state();
        if commit {
            if let Some(db) = self.database.as_ref().and_then(|n| state.databases.get_mut(n)) {
                db.committed.extend(pending);
            }
        } else {
            state.rollbacks += 1;
        }
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        if self.active.is_some() {
            self.end_transaction(false);
        }
        self.server.state().open_connections -= 1;
    }
}

#[async_trait]
impl Connection for FakeConnection {
    fn connection_string(&self) -> &ConnectionString {
        &self.connection_string
    }

    fn set_connection_string(&mut self, _: ConnectionString) -> DriverResult<()> {
        Err(DriverError::InvalidState(ConnectionState::Open))
    }

    fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    fn server_version(&self) -> Option<&str> {
        Some("16.0.1000.6")
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::Open
    }

    fn on_state_change(&mut self, _: StateListener) {}

    async fn open(&mut self) -> DriverResult<()> {
        Err(DriverError::InvalidState(ConnectionState::Open))
    }

    async fn close(&mut self) -> DriverResult<()> {
        Ok(())
    }

    async fn change_database(&mut self, _: &str) -> DriverResult<()> {
        Err(DriverError::Unsupported("changing the database"))
    }

    async fn begin_transaction(&mut self) -> DriverResult<TransactionId> {
        if self.active.is_some() {
            return Err(DriverError::TransactionActive);
        }
        self.next_transaction += 1;
        let id = TransactionId::new(self.next_transaction);
        self.active = Some(id);
        Ok(id)
    }

    async fn commit(&mut self, transaction: TransactionId) -> DriverResult<()> {
        if self.active != Some(transaction) {
            return Err(DriverError::NoTransaction);
        }
        self.end_transaction(true);
        Ok(())
    }

    async fn rollback(&mut self, transaction: TransactionId) -> DriverResult<()> {
        if self.active != Some(transaction) {
            return Err(DriverError::NoTransaction);
        }
        self.end_transaction(false);
        Ok(())
    }

    fn abandon(&mut self, transaction: TransactionId) {
        if self.active == Some(transaction) {
            self.end_transaction(false);
        }
    }

    async fn execute(&mut self, command: &Command) -> DriverResult<u64> {
        self.run(command, false).map(|_| 1)
    }

    async fn query(&mut self, command: &Command) -> DriverResult<Vec<Row>> {
        self.run(command, true)
    }
}

fn row(column: &str, value: Value) -> Row {
    Row::new(vec![column.to_string()], vec![value])
}

fn bracketed(sql: &str) -> String {
    let start = sql.find('[').unwrap() + 1;
    let end = start + sql[start..].find(']').unwrap();
    sql[start..end].to_string()
}

fn engine(server: &FakeServer, version: i32) -> LifecycleEngine<FakeServer> {
    LifecycleEngine::builder(server.clone())
        .connection_string(CONNECTION)
        .version(version)
        .inline_scripts(CREATE, Some(CLEAR), Some(POPULATE))
        .build()
        .unwrap()
}

// --- Migrate ---

#[tokio::test]
async fn test_migrate_current_version_executes_nothing() {
    let server = FakeServer::new().with_database("orders", Some(vec![1, 3]));
    let outcome = engine(&server, 3).migrate().await.unwrap();

    assert_eq!(outcome, MigrateOutcome::Current);
    assert!(server.executed().is_empty(), "{:?}", server.executed());
    assert_eq!(server.versions("orders"), Some(vec![1, 3]));
}

#[tokio::test]
async fn test_migrate_missing_database_builds_once() {
    let server = FakeServer::new();
    let outcome = engine(&server, 3).migrate().await.unwrap();

    assert_eq!(outcome, MigrateOutcome::Built);
    assert_eq!(
        server.executed(),
        vec![
            "CREATE DATABASE [orders]",
            "CREATE TABLE dbschema (version int)\n",
            "CREATE TABLE orders (id int PRIMARY KEY)\n",
            "CREATE INDEX ix_orders ON orders (id)\n",
            "INSERT INTO orders VALUES (1)\n",
            "INSERT INTO orders VALUES (2)\n",
            "INSERT INTO dbschema (version) VALUES (3)",
        ]
    );
    assert_eq!(server.versions("orders"), Some(vec![3]));
}

#[tokio::test]
async fn test_migrate_stale_version_rebuilds() {
    let server = FakeServer::new().with_database("orders", Some(vec![1]));
    let outcome = engine(&server, 3).migrate().await.unwrap();

    assert_eq!(outcome, MigrateOutcome::Rebuilt { from: 1 });
    let executed = server.executed();
    assert!(executed[0].contains("SET SINGLE_USER WITH ROLLBACK IMMEDIATE"));
    assert_eq!(executed[1], "CREATE DATABASE [orders]");
    assert_eq!(server.versions("orders"), Some(vec![3]));
}

#[tokio::test]
async fn test_migrate_newer_version_also_rebuilds() {
    let server = FakeServer::new().with_database("orders", Some(vec![7]));
    let outcome = engine(&server, 3).migrate().await.unwrap();
    assert_eq!(outcome, MigrateOutcome::Rebuilt { from: 7 });
    assert_eq!(server.versions("orders"), Some(vec![3]));
}

#[tokio::test]
async fn test_migrate_unstamped_database_reads_version_zero() {
    let server = FakeServer::new().with_database("orders", None);
    let engine = engine(&server, 0);

    assert_eq!(engine.schema_version().await.unwrap(), 0);
    assert_eq!(engine.migrate().await.unwrap(), MigrateOutcome::Current);
}

#[tokio::test]
async fn test_migrate_empty_version_table_reads_zero() {
    let server = FakeServer::new().with_database("orders", Some(Vec::new()));
    let outcome = engine(&server, 2).migrate().await.unwrap();
    assert_eq!(outcome, MigrateOutcome::Rebuilt { from: 0 });
}

#[tokio::test]
async fn test_stale_rebuild_failure_leaves_database_absent() {
    let server = FakeServer::new().with_database("orders", Some(vec![1]));
    server.fail_on("CREATE INDEX");

    let err = engine(&server, 3).migrate().await.unwrap_err();
    match &err {
        LifecycleError::Statement { statement, .. } => {
            assert_eq!(statement, "CREATE INDEX ix_orders ON orders (id)\n");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!server.has_database("orders"));
    assert_eq!(server.state().open_connections, 0);
}

// --- Build, drop, exists ---

#[tokio::test]
async fn test_exists() {
    let server = FakeServer::new();
    let engine = engine(&server, 1);
    assert!(!engine.exists().await.unwrap());

    server.state().databases.insert("orders".into(), Database::default());
    assert!(engine.exists().await.unwrap());
}

#[tokio::test]
async fn test_build_existing_database_skips_create() {
    let server = FakeServer::new().with_database("orders", None);
    engine(&server, 2).build().await.unwrap();

    let executed = server.executed();
    assert!(executed.iter().all(|sql| !sql.starts_with("CREATE DATABASE")));
    assert_eq!(server.versions("orders"), Some(vec![2]));
}

#[tokio::test]
async fn test_build_failure_on_existing_database_keeps_it() {
    let server = FakeServer::new().with_database("orders", None);
    server.fail_on("INSERT INTO orders VALUES (2)");

    let err = engine(&server, 2).build().await.unwrap_err();
    assert_eq!(err.statement(), Some("INSERT INTO orders VALUES (2)\n"));
    assert!(server.has_database("orders"));
    assert_eq!(server.versions("orders"), Some(Vec::new()));
}

#[tokio::test]
async fn test_drop_on_premises_uses_single_user() {
    let server = FakeServer::new().with_database("orders", Some(vec![1]));
    engine(&server, 1).drop_database().await.unwrap();

    assert!(!server.has_database("orders"));
    let executed = server.executed();
    assert_eq!(executed.len(), 1);
    assert!(executed[0].starts_with("IF EXISTS (SELECT 1 FROM sys.databases WHERE name = N'orders')"));
}

#[tokio::test]
async fn test_drop_missing_database_succeeds() {
    let server = FakeServer::new();
    engine(&server, 1).drop_database().await.unwrap();
    assert!(!server.has_database("orders"));
}

#[tokio::test]
async fn test_admin_statements_run_without_catalog() {
    let server = FakeServer::new();
    engine(&server, 1).build().await.unwrap();

    let state = server.state();
    let (database, sql) = &state.executed[0];
    assert_eq!(sql, "CREATE DATABASE [orders]");
    assert_eq!(database, &None);
    assert!(state.executed[1..].iter().all(|(db, _)| db.as_deref() == Some("orders")));
}

// --- Cloud edition ---

#[tokio::test(start_paused = true)]
async fn test_cloud_build_waits_grace_period() {
    let server = FakeServer::cloud();
    let engine = engine(&server, 1);
    engine.build().await.unwrap();

    let created = server.ddl_at("CREATE DATABASE");
    assert!(created.elapsed() >= Duration::from_millis(3000));
    assert_eq!(server.executed()[0], "CREATE DATABASE [orders] (EDITION = 'basic')");
    assert!(engine.is_cloud().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_cloud_drop_waits_grace_period() {
    let server = FakeServer::cloud().with_database("orders", Some(vec![1]));
    let engine = engine(&server, 1);

    let start = Instant::now();
    engine.drop_database().await.unwrap();

    assert!(server.ddl_at("DROP DATABASE").elapsed() >= Duration::from_millis(3000));
    assert!(start.elapsed() >= Duration::from_millis(3000));
    assert_eq!(server.executed(), vec!["DROP DATABASE IF EXISTS [orders]"]);
}

#[tokio::test(start_paused = true)]
async fn test_cloud_grace_period_is_configurable() {
    let server = FakeServer::cloud();
    let engine = LifecycleEngine::builder(server.clone())
        .connection_string(CONNECTION)
        .version(1)
        .inline_scripts(CREATE, None, None)
        .grace_period(Duration::from_millis(250))
        .build()
        .unwrap();

    let start = Instant::now();
    engine.build().await.unwrap();
    let waited = start.elapsed();
    assert!(waited >= Duration::from_millis(250));
    assert!(waited < Duration::from_millis(3000));
}

#[tokio::test(start_paused = true)]
async fn test_cloud_build_provisions_login() {
    let server = FakeServer::cloud();
    let engine = LifecycleEngine::builder(server.clone())
        .connection_string(CONNECTION)
        .version(1)
        .inline_scripts(CREATE, None, None)
        .cloud_login("orders_app", "s3cret")
        .build()
        .unwrap();
    engine.build().await.unwrap();

    let state = server.state();
    let login = state
        .executed
        .iter()
        .position(|(db, sql)| db.is_none() && sql.starts_with("CREATE LOGIN [orders_app]"))
        .unwrap();
    let user = state
        .executed
        .iter()
        .position(|(db, sql)| db.as_deref() == Some("orders") && sql == "CREATE USER [orders_app] FOR LOGIN [orders_app]")
        .unwrap();
    let grant = state
        .executed
        .iter()
        .position(|(_, sql)| sql == "ALTER ROLE db_owner ADD MEMBER [orders_app]")
        .unwrap();
    let schema = state
        .executed
        .iter()
        .position(|(_, sql)| sql.starts_with("CREATE TABLE dbschema"))
        .unwrap();
    assert!(login < user && user < grant && grant < schema);
}

#[tokio::test]
async fn test_on_premises_build_never_provisions_login() {
    let server = FakeServer::new();
    let engine = LifecycleEngine::builder(server.clone())
        .connection_string(CONNECTION)
        .version(1)
        .inline_scripts(CREATE, None, None)
        .cloud_login("orders_app", "s3cret")
        .build()
        .unwrap();
    engine.build().await.unwrap();

    assert!(server.executed().iter().all(|sql| !sql.contains("LOGIN")));
}

// --- Clear ---

#[tokio::test]
async fn test_clear_commits_all_statements() {
    let server = FakeServer::new().with_database("orders", Some(vec![1]));
    engine(&server, 1).clear().await.unwrap();

    assert_eq!(
        server.committed("orders"),
        vec!["DELETE FROM order_lines\n", "DELETE FROM orders\n"]
    );
    assert_eq!(server.state().rollbacks, 0);
}

#[tokio::test]
async fn test_clear_failure_commits_nothing() {
    let server = FakeServer::new().with_database("orders", Some(vec![1]));
    server.fail_on("DELETE FROM orders");

    let err = engine(&server, 1).clear().await.unwrap_err();
    assert_eq!(err.statement(), Some("DELETE FROM orders\n"));
    assert!(server.committed("orders").is_empty());
    assert_eq!(server.state().rollbacks, 1);
    assert_eq!(server.state().open_connections, 0);
}

#[tokio::test]
async fn test_clear_missing_database_is_driver_error() {
    let server = FakeServer::new();
    let err = engine(&server, 1).clear().await.unwrap_err();
    assert!(matches!(err, LifecycleError::Driver(DriverError::Database { code: Some(4060), .. })));
}

// --- Resources ---

#[tokio::test]
async fn test_connections_released_after_every_operation() {
    let server = FakeServer::new();
    let engine = engine(&server, 1);

    engine.migrate().await.unwrap();
    engine.clear().await.unwrap();
    engine.rebuild().await.unwrap();
    server.fail_on("INSERT INTO orders");
    assert!(engine.build().await.is_err());
    assert!(engine.rebuild().await.is_err());
    assert!(!server.has_database("orders"));

    assert_eq!(server.state().open_connections, 0);
}

// --- SQLite ---

fn write_scripts(dir: &TempDir) {
    let root = dir.path().join("scripts").join("shop");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(
        root.join("create.sql"),
        "CREATE TABLE dbschema (version INTEGER NOT NULL)\nGO\nCREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)\n",
    )
    .unwrap();
    std::fs::write(root.join("clear.sql"), "DELETE FROM items\n").unwrap();
    std::fs::write(
        root.join("populate.sql"),
        "INSERT INTO items VALUES (1, 'bolt')\nGO\nINSERT INTO items VALUES (2, 'nut')\n",
    )
    .unwrap();
}

fn sqlite_engine(dir: &TempDir, bundle: &ScriptBundle) -> LifecycleEngine<SqliteConnector> {
    let db = dir.path().join("shop.db");
    LifecycleEngine::builder(SqliteConnector)
        .connection_string(format!("Data Source={};Initial Catalog=shop", db.display()))
        .version(4)
        .script_provider(bundle, "shop")
        .build()
        .unwrap()
}

async fn item_count(conn: &mut SqliteConnection) -> i64 {
    let command = conn.create_command("SELECT COUNT(*) AS n FROM items");
    let rows = conn.query(&command).await.unwrap();
    rows[0].get_by_name("n").and_then(Value::as_i64).unwrap()
}

#[tokio::test]
async fn test_sqlite_build_schema_clear_and_version() {
    let dir = TempDir::new().unwrap();
    write_scripts(&dir);
    let bundle = ScriptBundle::from_dir(dir.path().join("scripts")).unwrap();
    let engine = sqlite_engine(&dir, &bundle);

    assert_eq!(engine.schema_version().await.unwrap(), 0);

    let mut conn = SqliteConnection::open_path(dir.path().join("shop.db")).unwrap();
    engine.build_schema(&mut conn).await.unwrap();
    assert_eq!(item_count(&mut conn).await, 2);
    assert_eq!(engine.schema_version_with(&mut conn).await.unwrap(), 4);
    drop(conn);

    engine.clear().await.unwrap();
    assert_eq!(engine.schema_version().await.unwrap(), 4);

    let mut conn = SqliteConnection::open_path(dir.path().join("shop.db")).unwrap();
    assert_eq!(item_count(&mut conn).await, 0);
}

#[tokio::test]
async fn test_sqlite_clear_failure_rolls_back() {
    let dir = TempDir::new().unwrap();
    let mut conn = SqliteConnection::open_path(dir.path().join("app.db")).unwrap();
    let engine = LifecycleEngine::builder(SqliteConnector)
        .connection_string("Data Source=unused.db;Database=app")
        .version(1)
        .inline_scripts(
            "CREATE TABLE dbschema (version INTEGER)\nGO\nCREATE TABLE items (id INTEGER)",
            Some("DELETE FROM items\nGO\nDELETE FROM missing_table"),
            Some("INSERT INTO items VALUES (1)"),
        )
        .build()
        .unwrap();

    engine.build_schema(&mut conn).await.unwrap();
    let err = engine.clear_with(&mut conn).await.unwrap_err();

    assert_eq!(err.statement(), Some("DELETE FROM missing_table"));
    assert!(matches!(
        err,
        LifecycleError::Statement { source: DriverError::UndefinedObject(_), .. }
    ));
    assert_eq!(item_count(&mut conn).await, 1);
}

#[tokio::test]
async fn test_sqlite_build_schema_failure_names_statement() {
    let mut conn = SqliteConnection::open_in_memory().unwrap();
    let engine = LifecycleEngine::builder(SqliteConnector)
        .connection_string("Data Source=:memory:;Database=app")
        .version(1)
        .inline_scripts("CREATE TABLE items (id INTEGER)\nGO\nCREATE TABEL broken (id INTEGER)", None, None)
        .build()
        .unwrap();

    let err = engine.build_schema(&mut conn).await.unwrap_err();
    assert_eq!(err.statement(), Some("CREATE TABEL broken (id INTEGER)"));
}
