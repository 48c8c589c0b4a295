//! Database lifecycle operations.
//!
//! A [`LifecycleEngine`] owns everything needed to bring one database to a
//! target schema version: a [`Connector`], the connection string naming the
//! target catalog, the target version, and the parsed [`ScriptSet`].
//!
//! # Operations
//!
//! | Operation | Connection | Effect |
//! |-----------|------------|--------|
//! | [`exists`](LifecycleEngine::exists) | admin | Looks the catalog up in `sys.databases` |
//! | [`build`](LifecycleEngine::build) | admin, target | Creates the database if absent, runs create then populate statements, stamps `dbschema` |
//! | [`drop_database`](LifecycleEngine::drop_database) | admin | Drops the database if present |
//! | [`rebuild`](LifecycleEngine::rebuild) | admin, target | Drop followed by build |
//! | [`clear`](LifecycleEngine::clear) | target | Runs the clear statements in one transaction |
//! | [`migrate`](LifecycleEngine::migrate) | admin, target | Builds, rebuilds, or does nothing depending on the stamped version |
//!
//! Admin connections use the connection string with its catalog removed.
//! Every operation opens its own connections and releases them before
//! returning, on success and on failure alike.
//!
//! # Cloud edition
//!
//! On Azure SQL Database, creating and dropping a database completes
//! asynchronously. After either statement the engine waits a fixed grace
//! period (3000 ms unless configured) before touching the database again.
//!
//! # Example
//!
//! ```no_run
//! # async fn demo() -> dbforge_engine::Result<()> {
//! use dbforge_engine::{LifecycleEngine, MigrateOutcome, MssqlConnector};
//!
//! let engine = LifecycleEngine::builder(MssqlConnector)
//!     .connection_string("Server=tcp:db,1433;Initial Catalog=orders;User ID=sa;Password=secret")
//!     .version(3)
//!     .inline_scripts(
//!         "CREATE TABLE dbschema (version int)\nGO\nCREATE TABLE orders (id int)",
//!         Some("DELETE FROM orders"),
//!         None,
//!     )
//!     .build()?;
//!
//! match engine.migrate().await? {
//!     MigrateOutcome::Current => println!("up to date"),
//!     MigrateOutcome::Built => println!("created"),
//!     MigrateOutcome::Rebuilt { from } => println!("rebuilt from version {from}"),
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::time::Duration;

use dbforge_core::{ConfigError, ConnectionString, ScriptProvider, ScriptSet};
use tracing::{debug, info, warn};

use crate::driver::{Connection, Connector, DriverError, Row, Value};
use crate::error::{LifecycleError, Result};
use crate::statements::{
    ENGINE_EDITION_SQL, SCHEMA_VERSION_SQL, ServerKind, create_database_sql, create_login_sql,
    create_user_sql, database_exists_sql, drop_database_sql, grant_owner_sql, insert_version_sql,
    validate_database_name,
};
use crate::transaction::Transaction;

/// Default wait after creating or dropping a cloud database.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(3000);

/// What [`LifecycleEngine::migrate`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrateOutcome {
    /// The stamped version already matched; nothing was executed.
    Current,
    /// The database did not exist and was built.
    Built,
    /// The stamped version differed and the database was rebuilt.
    Rebuilt {
        /// Version found before the rebuild (0 when unstamped).
        from: i32,
    },
}

/// Application login provisioned after creating a cloud database.
#[derive(Clone, PartialEq, Eq)]
pub struct CloudLogin {
    name: String,
    password: String,
}

impl CloudLogin {
    pub fn new(name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            password: password.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for CloudLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudLogin")
            .field("name", &self.name)
            .field("password", &"***")
            .finish()
    }
}

/// Builder for [`LifecycleEngine`].
///
/// Nothing is validated until [`build`](Self::build), which checks, in order:
/// the connection string is present and parses, it names a usable catalog,
/// the scripts resolved, and the create script has at least one statement.
pub struct EngineBuilder<C> {
    connector: C,
    connection_string: Option<String>,
    version: i32,
    scripts: Option<std::result::Result<ScriptSet, ConfigError>>,
    command_timeout: Option<Duration>,
    grace_period: Duration,
    cloud_login: Option<CloudLogin>,
}

impl<C: Connector> EngineBuilder<C> {
    pub fn connection_string(mut self, connection_string: impl Into<String>) -> Self {
        self.connection_string = Some(connection_string.into());
        self
    }

    /// Target schema version stamped into `dbschema`.
    pub fn version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    /// Uses inline script bodies.
    pub fn inline_scripts(mut self, create: &str, clear: Option<&str>, populate: Option<&str>) -> Self {
        self.scripts = Some(Ok(ScriptSet::from_text(create, clear, populate)));
        self
    }

    /// Resolves `{namespace}.create.sql`, `{namespace}.clear.sql` and
    /// `{namespace}.populate.sql` from `provider`.
    pub fn script_provider(mut self, provider: &dyn ScriptProvider, namespace: &str) -> Self {
        self.scripts = Some(ScriptSet::from_provider(provider, namespace));
        self
    }

    /// Uses an already parsed script set.
    pub fn scripts(mut self, scripts: ScriptSet) -> Self {
        self.scripts = Some(Ok(scripts));
        self
    }

    /// Timeout applied to every command. `None` leaves the driver default.
    pub fn command_timeout(mut self, timeout: impl Into<Option<Duration>>) -> Self {
        self.command_timeout = timeout.into();
        self
    }

    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn cloud_login(mut self, name: impl Into<String>, password: impl Into<String>) -> Self {
        self.cloud_login = Some(CloudLogin::new(name, password));
        self
    }

    /// Validates the configuration and assembles the engine.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] before any connection is attempted.
    pub fn build(self) -> std::result::Result<LifecycleEngine<C>, ConfigError> {
        let raw = self
            .connection_string
            .filter(|raw| !raw.trim().is_empty())
            .ok_or(ConfigError::MissingConnectionString)?;
        let connection_string = ConnectionString::parse(&raw)?;
        if connection_string.is_empty() {
            return Err(ConfigError::MissingConnectionString);
        }

        let database = connection_string
            .catalog()
            .ok_or(ConfigError::MissingCatalog)?
            .to_string();
        validate_database_name(&database)?;

        let scripts = self.scripts.ok_or(ConfigError::MissingCreateScript)??;
        if scripts.create().is_empty() {
            return Err(ConfigError::MissingCreateScript);
        }

        Ok(LifecycleEngine {
            connector: self.connector,
            admin_connection_string: connection_string.without_catalog(),
            connection_string,
            database,
            version: self.version,
            scripts,
            command_timeout: self.command_timeout,
            grace_period: self.grace_period,
            cloud_login: self.cloud_login,
        })
    }
}

/// Brings one database to a target schema version.
///
/// Operations take `&self` and keep no state between calls, but they are not
/// meant to overlap: two concurrent builds of the same absent database race.
pub struct LifecycleEngine<C> {
    connector: C,
    connection_string: ConnectionString,
    admin_connection_string: ConnectionString,
    database: String,
    version: i32,
    scripts: ScriptSet,
    command_timeout: Option<Duration>,
    grace_period: Duration,
    cloud_login: Option<CloudLogin>,
}

impl<C: Connector> LifecycleEngine<C> {
    pub fn builder(connector: C) -> EngineBuilder<C> {
        EngineBuilder {
            connector,
            connection_string: None,
            version: 0,
            scripts: None,
            command_timeout: None,
            grace_period: DEFAULT_GRACE_PERIOD,
            cloud_login: None,
        }
    }

    /// Name of the target database.
    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn scripts(&self) -> &ScriptSet {
        &self.scripts
    }

    pub fn connection_string(&self) -> &ConnectionString {
        &self.connection_string
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout
    }

    /// Builds, rebuilds, or leaves the database alone.
    ///
    /// A missing database is built. Otherwise the stamped version is read
    /// (0 when `dbschema` is missing or empty); any difference from the
    /// target version, older or newer, triggers a full [`rebuild`](Self::rebuild).
    pub async fn migrate(&self) -> Result<MigrateOutcome> {
        if !self.exists().await? {
            info!(database = %self.database, version = self.version, "Database missing, building");
            self.build().await?;
            return Ok(MigrateOutcome::Built);
        }

        let current = self.schema_version().await?;
        if current == self.version {
            info!(database = %self.database, version = current, "Database schema is current");
            return Ok(MigrateOutcome::Current);
        }

        info!(
            database = %self.database,
            from = current,
            to = self.version,
            "Database schema is stale, rebuilding"
        );
        self.rebuild().await?;
        Ok(MigrateOutcome::Rebuilt { from: current })
    }

    /// Returns `true` when the target database is listed in `sys.databases`.
    pub async fn exists(&self) -> Result<bool> {
        let mut admin = self.connect_admin().await?;
        self.database_exists(admin.as_mut()).await
    }

    /// Creates the database if needed and builds the schema.
    ///
    /// Runs every create statement, then every populate statement, then
    /// inserts one `dbschema` row with the target version. On the cloud
    /// edition, a freshly created database is given the grace period and the
    /// configured application login before the schema build starts.
    ///
    /// If this call created the database and any later step fails, the
    /// database is dropped again and the original error is returned.
    pub async fn build(&self) -> Result<()> {
        let mut admin = self.connect_admin().await?;
        let kind = self.detect_server(admin.as_mut()).await?;

        let created = !self.database_exists(admin.as_mut()).await?;
        if created {
            info!(database = %self.database, cloud = kind.is_cloud(), "Creating database");
            self.run(admin.as_mut(), &create_database_sql(&self.database, kind))
                .await?;
        } else {
            debug!(database = %self.database, "Database already exists");
        }

        match self.populate_new(admin.as_mut(), kind, created).await {
            Ok(()) => {
                info!(database = %self.database, version = self.version, "Database built");
                Ok(())
            }
            Err(err) => {
                if created {
                    warn!(database = %self.database, error = %err, "Build failed, dropping the new database");
                    if let Err(cleanup) = self.drop_with(admin.as_mut(), kind).await {
                        warn!(database = %self.database, error = %cleanup, "Could not drop partially built database");
                    }
                }
                Err(err)
            }
        }
    }

    /// Drops the database, then builds it again.
    ///
    /// If the build fails the database stays absent.
    pub async fn rebuild(&self) -> Result<()> {
        self.drop_database().await?;
        self.build().await
    }

    /// Runs every clear statement in one transaction on a new target connection.
    pub async fn clear(&self) -> Result<()> {
        let mut conn = self.connect_target().await?;
        self.clear_with(conn.as_mut()).await
    }

    /// Runs every clear statement in one transaction on `conn`.
    ///
    /// Nothing is committed unless all statements succeed.
    pub async fn clear_with(&self, conn: &mut dyn Connection) -> Result<()> {
        let mut tx = Transaction::begin(conn).await?;
        for statement in self.scripts.clear() {
            debug!(statement = %statement, "Executing");
            let command = tx.command(statement).with_timeout(self.command_timeout);
            tx.execute_command(&command)
                .await
                .map_err(|source| statement_error(statement, source))?;
        }
        tx.commit().await?;

        info!(statements = self.scripts.clear().len(), "Database cleared");
        Ok(())
    }

    /// Drops the database if it exists.
    ///
    /// On SQL Server other sessions are rolled back first. On the cloud
    /// edition the call waits out the grace period afterwards.
    pub async fn drop_database(&self) -> Result<()> {
        let mut admin = self.connect_admin().await?;
        let kind = self.detect_server(admin.as_mut()).await?;
        self.drop_with(admin.as_mut(), kind).await
    }

    /// Reads the stamped schema version from the target database.
    pub async fn schema_version(&self) -> Result<i32> {
        let mut conn = self.connect_target().await?;
        self.schema_version_with(conn.as_mut()).await
    }

    /// Reads the stamped schema version over `conn`.
    ///
    /// A missing `dbschema` table or an empty one reads as 0.
    pub async fn schema_version_with(&self, conn: &mut dyn Connection) -> Result<i32> {
        let command = conn
            .create_command(SCHEMA_VERSION_SQL)
            .with_timeout(self.command_timeout);
        let rows = match conn.query(&command).await {
            Ok(rows) => rows,
            Err(err) if err.is_undefined_object() => {
                debug!(error = %err, "Version table missing, treating as version 0");
                return Ok(0);
            }
            Err(source) => return Err(statement_error(SCHEMA_VERSION_SQL, source)),
        };

        match rows.first().and_then(|row| row.get(0)) {
            None | Some(Value::Null) => Ok(0),
            Some(value) => value
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .ok_or_else(|| LifecycleError::UnexpectedResult {
                    query: SCHEMA_VERSION_SQL.to_string(),
                    detail: format!("version is not a 32-bit integer: {value:?}"),
                }),
        }
    }

    /// Runs every create statement, then every populate statement, then
    /// stamps the target version, on `conn`.
    ///
    /// Works against any driver, which makes it usable for local databases
    /// that have no server-level catalog.
    pub async fn build_schema(&self, conn: &mut dyn Connection) -> Result<()> {
        for statement in self.scripts.build_statements() {
            self.run(conn, statement).await?;
        }
        self.run(conn, &insert_version_sql(self.version)).await?;

        debug!(
            create = self.scripts.create().len(),
            populate = self.scripts.populate().len(),
            version = self.version,
            "Schema build complete"
        );
        Ok(())
    }

    /// Returns `true` when the server is Azure SQL Database.
    pub async fn is_cloud(&self) -> Result<bool> {
        let mut admin = self.connect_admin().await?;
        Ok(self.detect_server(admin.as_mut()).await?.is_cloud())
    }

    async fn populate_new(&self, admin: &mut dyn Connection, kind: ServerKind, created: bool) -> Result<()> {
        if kind.is_cloud() && created {
            self.settle("create").await;
        }

        let mut target = self.connect_target().await?;
        if kind.is_cloud() && created {
            self.provision_login(admin, target.as_mut()).await?;
        }
        self.build_schema(target.as_mut()).await
    }

    /// Creates the application login in `master` and maps it to a
    /// `db_owner` user in the target database.
    async fn provision_login(&self, admin: &mut dyn Connection, target: &mut dyn Connection) -> Result<()> {
        let Some(login) = &self.cloud_login else {
            debug!(database = %self.database, "No cloud login configured, skipping");
            return Ok(());
        };

        info!(database = %self.database, login = %login.name, "Provisioning application login");
        self.run(admin, &create_login_sql(&login.name, &login.password))
            .await?;
        self.run(target, &create_user_sql(&login.name)).await?;
        self.run(target, &grant_owner_sql(&login.name)).await?;
        Ok(())
    }

    async fn drop_with(&self, admin: &mut dyn Connection, kind: ServerKind) -> Result<()> {
        info!(database = %self.database, cloud = kind.is_cloud(), "Dropping database");
        self.run(admin, &drop_database_sql(&self.database, kind))
            .await?;
        if kind.is_cloud() {
            self.settle("drop").await;
        }
        Ok(())
    }

    async fn database_exists(&self, admin: &mut dyn Connection) -> Result<bool> {
        let rows = self
            .query(admin, &database_exists_sql(&self.database))
            .await?;
        debug!(database = %self.database, exists = !rows.is_empty(), "Checked database existence");
        Ok(!rows.is_empty())
    }

    async fn detect_server(&self, admin: &mut dyn Connection) -> Result<ServerKind> {
        let rows = self.query(admin, ENGINE_EDITION_SQL).await?;
        let edition = rows.first().and_then(|row| row.get(0)).and_then(Value::as_i64);
        let kind = ServerKind::from_engine_edition(edition);
        debug!(edition = ?edition, kind = ?kind, "Detected server edition");
        Ok(kind)
    }

    async fn connect_admin(&self) -> Result<Box<dyn Connection>> {
        debug!("Opening administrative connection");
        Ok(self.connector.connect(&self.admin_connection_string).await?)
    }

    async fn connect_target(&self) -> Result<Box<dyn Connection>> {
        debug!(database = %self.database, "Opening target connection");
        Ok(self.connector.connect(&self.connection_string).await?)
    }

    async fn run(&self, conn: &mut dyn Connection, sql: &str) -> Result<u64> {
        debug!(statement = %sql, "Executing");
        let command = conn.create_command(sql).with_timeout(self.command_timeout);
        conn.execute(&command)
            .await
            .map_err(|source| statement_error(sql, source))
    }

    async fn query(&self, conn: &mut dyn Connection, sql: &str) -> Result<Vec<Row>> {
        let command = conn.create_command(sql).with_timeout(self.command_timeout);
        conn.query(&command)
            .await
            .map_err(|source| statement_error(sql, source))
    }

    async fn settle(&self, after: &str) {
        info!(
            after,
            grace = ?self.grace_period,
            "Waiting for cloud provisioning"
        );
        tokio::time::sleep(self.grace_period).await;
    }
}

fn statement_error(statement: &str, source: DriverError) -> LifecycleError {
    LifecycleError::Statement {
        statement: statement.to_string(),
        source,
    }
}
