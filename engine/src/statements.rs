//! T-SQL generation for administrative lifecycle statements.
//!
//! Database and login names are always emitted as bracket-quoted identifiers
//! and string values as `N'...'` literals, so a name can never terminate the
//! statement it is embedded in.
//!
//! # Server kinds
//!
//! Azure SQL Database reports `SERVERPROPERTY('EngineEdition') = 5`. It
//! needs an explicit service tier on `CREATE DATABASE`, does not support
//! `SINGLE_USER`, and provisions asynchronously.

use dbforge_core::ConfigError;

/// `EngineEdition` reported by Azure SQL Database.
pub const AZURE_ENGINE_EDITION: i64 = 5;

/// Maximum length of a SQL Server identifier.
const MAX_IDENTIFIER_LEN: usize = 128;

/// Probes the server's engine edition.
pub const ENGINE_EDITION_SQL: &str = "SELECT CAST(SERVERPROPERTY('EngineEdition') AS int) AS edition";

/// Reads the highest stamped schema version.
pub const SCHEMA_VERSION_SQL: &str = "SELECT MAX(version) AS version FROM dbschema";

/// Which flavor of SQL Server the administrative connection reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerKind {
    /// Self-hosted SQL Server.
    SqlServer,
    /// Azure SQL Database (managed cloud edition).
    AzureSql,
}

impl ServerKind {
    pub fn from_engine_edition(edition: Option<i64>) -> Self {
        match edition {
            Some(AZURE_ENGINE_EDITION) => ServerKind::AzureSql,
            _ => ServerKind::SqlServer,
        }
    }

    pub fn is_cloud(self) -> bool {
        self == ServerKind::AzureSql
    }
}

/// Validates that a catalog name can be used as a database name.
pub(crate) fn validate_database_name(name: &str) -> Result<(), ConfigError> {
    if name.trim().is_empty()
        || name.chars().count() > MAX_IDENTIFIER_LEN
        || name.chars().any(char::is_control)
    {
        return Err(ConfigError::InvalidDatabaseName(name.to_string()));
    }
    Ok(())
}

/// Quotes an identifier with brackets, doubling any `]`.
pub fn quote_identifier(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Quotes a Unicode string literal, doubling any `'`.
pub fn quote_literal(value: &str) -> String {
    format!("N'{}'", value.replace('\'', "''"))
}

/// Lists the catalog entry of `database`, if any.
pub fn database_exists_sql(database: &str) -> String {
    format!(
        "SELECT name FROM sys.databases WHERE name = {}",
        quote_literal(database)
    )
}

/// Creates `database`, on the basic tier for Azure.
pub fn create_database_sql(database: &str, kind: ServerKind) -> String {
    match kind {
        ServerKind::AzureSql => format!(
            "CREATE DATABASE {} (EDITION = 'basic')",
            quote_identifier(database)
        ),
        ServerKind::SqlServer => format!("CREATE DATABASE {}", quote_identifier(database)),
    }
}

/// Drops `database` if present.
///
/// On SQL Server the database is first forced into single-user mode, rolling
/// back other sessions, so lingering connections cannot block the drop.
pub fn drop_database_sql(database: &str, kind: ServerKind) -> String {
    let name = quote_identifier(database);
    match kind {
        ServerKind::AzureSql => format!("DROP DATABASE IF EXISTS {name}"),
        ServerKind::SqlServer => format!(
            "IF EXISTS (SELECT 1 FROM sys.databases WHERE name = {literal})\n\
             BEGIN\n    \
             ALTER DATABASE {name} SET SINGLE_USER WITH ROLLBACK IMMEDIATE;\n    \
             DROP DATABASE {name};\n\
             END",
            literal = quote_literal(database),
        ),
    }
}

/// Creates a server login. Runs against `master`.
pub fn create_login_sql(login: &str, password: &str) -> String {
    format!(
        "CREATE LOGIN {} WITH PASSWORD = {}",
        quote_identifier(login),
        quote_literal(password)
    )
}

/// Creates a database user for `login`. Runs against the target database.
pub fn create_user_sql(login: &str) -> String {
    let name = quote_identifier(login);
    format!("CREATE USER {name} FOR LOGIN {name}")
}

/// Adds `login`'s user to `db_owner`. Runs against the target database.
pub fn grant_owner_sql(login: &str) -> String {
    format!("ALTER ROLE db_owner ADD MEMBER {}", quote_identifier(login))
}

/// Stamps a newly built schema with `version`.
pub fn insert_version_sql(version: i32) -> String {
    format!("INSERT INTO dbschema (version) VALUES ({version})")
}
