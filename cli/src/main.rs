use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use dbforge_core::{ConnectionString, NamingOptions, ScriptSet, parse_str};
use dbforge_engine::{
    Connection, Connector, LifecycleEngine, MigrateOutcome, MssqlConnector, SqliteConnection,
    SqliteConnector, Value,
};
use dbforge_scripts::EngineConfig;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Catalog name given to local SQLite databases.
const LOCAL_CATALOG: &str = "main";

#[derive(Debug, Parser)]
#[command(name = "dbforge")]
#[command(about = "Build, migrate, clear, and drop databases from versioned SQL scripts")]
#[command(version)]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence).
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Report whether the target database exists.
    Exists(EngineArgs),
    /// Create the database if missing and build the schema.
    Build(EngineArgs),
    /// Drop the database and build it again.
    Rebuild(EngineArgs),
    /// Run the clear script in one transaction.
    Clear(EngineArgs),
    /// Drop the target database.
    Drop(EngineArgs),
    /// Build, rebuild, or keep the database depending on its schema version.
    Migrate(EngineArgs),
    /// Print the schema version stamped in the target database.
    Version(EngineArgs),
    /// List script resources and statement counts without connecting.
    Scripts(ScriptSourceArgs),
    /// Schema-level operations against a local SQLite file.
    Local(LocalArgs),
}

#[derive(Debug, Clone, Copy)]
enum Operation {
    Exists,
    Build,
    Rebuild,
    Clear,
    Drop,
    Migrate,
    Version,
}

#[derive(Debug, Args)]
struct ScriptSourceArgs {
    /// YAML engine configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory of `.sql` script files.
    #[arg(long)]
    scripts: Option<PathBuf>,
    /// JSON script bundle, tried after --scripts.
    #[arg(long)]
    bundle: Option<PathBuf>,
    /// Namespace prefixing the script resource names.
    #[arg(long)]
    namespace: Option<String>,
}

#[derive(Debug, Args)]
struct EngineArgs {
    #[command(flatten)]
    source: ScriptSourceArgs,
    /// Connection string naming the target catalog.
    #[arg(long)]
    connection_string: Option<String>,
    /// Target schema version.
    #[arg(long)]
    target_version: Option<i32>,
    /// Per-command timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,
    /// Wait after cloud database creation or deletion, in milliseconds.
    #[arg(long)]
    grace_ms: Option<u64>,
}

#[derive(Debug, Args)]
struct LocalArgs {
    #[command(subcommand)]
    operation: LocalOperation,
}

#[derive(Debug, Subcommand)]
enum LocalOperation {
    /// Run the create and populate scripts and stamp the version.
    Build(LocalEngineArgs),
    /// Run the clear script in one transaction.
    Clear(LocalEngineArgs),
    /// Print the stamped schema version.
    Version(LocalEngineArgs),
    /// Run a query and print rows mapped onto field names as JSON.
    Query(LocalQueryArgs),
}

#[derive(Debug, Args)]
struct LocalEngineArgs {
    /// Database file path.
    #[arg(long)]
    db: PathBuf,
    #[command(flatten)]
    source: ScriptSourceArgs,
    /// Target schema version.
    #[arg(long)]
    target_version: Option<i32>,
}

#[derive(Debug, Args)]
struct LocalQueryArgs {
    /// Database file path.
    #[arg(long)]
    db: PathBuf,
    /// Query to run.
    #[arg(long)]
    sql: String,
    /// Comma-separated field names the columns are matched against.
    #[arg(long)]
    fields: String,
    /// Result type name used to look up configured column prefixes.
    #[arg(long = "type", default_value = "")]
    type_name: String,
    /// Column prefix to strip, overriding the configuration.
    #[arg(long)]
    strip_prefix: Option<String>,
    /// Treat underscores as significant when matching.
    #[arg(long)]
    exact_underscores: bool,
    /// YAML engine configuration providing naming options.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Exists(args) => run_server(Operation::Exists, args).await,
        Command::Build(args) => run_server(Operation::Build, args).await,
        Command::Rebuild(args) => run_server(Operation::Rebuild, args).await,
        Command::Clear(args) => run_server(Operation::Clear, args).await,
        Command::Drop(args) => run_server(Operation::Drop, args).await,
        Command::Migrate(args) => run_server(Operation::Migrate, args).await,
        Command::Version(args) => run_server(Operation::Version, args).await,
        Command::Scripts(args) => run_scripts(args),
        Command::Local(args) => run_local(args).await,
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

async fn run_server(operation: Operation, args: EngineArgs) -> Result<(), String> {
    let config = engine_config(&args)?;
    let engine = build_engine(MssqlConnector, &config)?;
    let database = engine.database().to_string();
    debug!(operation = ?operation, database = %database, "Running lifecycle operation");

    match operation {
        Operation::Exists => {
            let exists = engine
                .exists()
                .await
                .map_err(|e| format!("Existence check failed: {e}"))?;
            println!("{database}: {}", if exists { "exists" } else { "missing" });
        }
        Operation::Build => {
            engine.build().await.map_err(|e| format!("Build failed: {e}"))?;
            println!("Built '{database}' at schema version {}.", engine.version());
        }
        Operation::Rebuild => {
            engine
                .rebuild()
                .await
                .map_err(|e| format!("Rebuild failed: {e}"))?;
            println!("Rebuilt '{database}' at schema version {}.", engine.version());
        }
        Operation::Clear => {
            engine.clear().await.map_err(|e| format!("Clear failed: {e}"))?;
            println!("Cleared '{database}'.");
        }
        Operation::Drop => {
            engine
                .drop_database()
                .await
                .map_err(|e| format!("Drop failed: {e}"))?;
            println!("Dropped '{database}'.");
        }
        Operation::Migrate => {
            let outcome = engine
                .migrate()
                .await
                .map_err(|e| format!("Migration failed: {e}"))?;
            match outcome {
                MigrateOutcome::Current => {
                    println!("'{database}' is current at schema version {}.", engine.version())
                }
                MigrateOutcome::Built => {
                    println!("Built '{database}' at schema version {}.", engine.version())
                }
                MigrateOutcome::Rebuilt { from } => println!(
                    "Rebuilt '{database}' from schema version {from} to {}.",
                    engine.version()
                ),
            }
        }
        Operation::Version => {
            let version = engine
                .schema_version()
                .await
                .map_err(|e| format!("Failed to read schema version: {e}"))?;
            println!("{version}");
        }
    }
    Ok(())
}

fn run_scripts(args: ScriptSourceArgs) -> Result<(), String> {
    let config = load_config(&args)?;
    let bundle = config
        .scripts
        .load_bundle()
        .map_err(|e| format!("Failed to load scripts: {e}"))?;

    println!("Resources ({}):", bundle.len());
    for name in bundle.resources() {
        let statements = parse_str(bundle.get(name).unwrap_or_default()).len();
        println!("  {name}: {statements} statements");
    }

    if args.namespace.is_some() || !config.scripts.namespace.is_empty() {
        let namespace = &config.scripts.namespace;
        let set = ScriptSet::from_provider(&bundle, namespace).map_err(|e| e.to_string())?;
        println!(
            "Namespace '{namespace}': create {}, clear {}, populate {}",
            set.create().len(),
            set.clear().len(),
            set.populate().len()
        );
    }
    Ok(())
}

async fn run_local(args: LocalArgs) -> Result<(), String> {
    match args.operation {
        LocalOperation::Build(a) => run_local_build(a).await,
        LocalOperation::Clear(a) => run_local_clear(a).await,
        LocalOperation::Version(a) => run_local_version(a).await,
        LocalOperation::Query(a) => run_local_query(a).await,
    }
}

async fn run_local_build(args: LocalEngineArgs) -> Result<(), String> {
    let engine = local_engine(&args)?;
    let mut conn = open_local(&args.db)?;
    engine
        .build_schema(&mut conn)
        .await
        .map_err(|e| format!("Build failed: {e}"))?;
    println!(
        "Built '{}' at schema version {}.",
        args.db.display(),
        engine.version()
    );
    Ok(())
}

async fn run_local_clear(args: LocalEngineArgs) -> Result<(), String> {
    let engine = local_engine(&args)?;
    engine.clear().await.map_err(|e| format!("Clear failed: {e}"))?;
    println!("Cleared '{}'.", args.db.display());
    Ok(())
}

async fn run_local_version(args: LocalEngineArgs) -> Result<(), String> {
    let engine = local_engine(&args)?;
    let version = engine
        .schema_version()
        .await
        .map_err(|e| format!("Failed to read schema version: {e}"))?;
    println!("{version}");
    Ok(())
}

async fn run_local_query(args: LocalQueryArgs) -> Result<(), String> {
    let mut naming = match &args.config {
        Some(path) => load_config_file(path)?.naming,
        None => NamingOptions::default(),
    };
    if let Some(prefix) = args.strip_prefix {
        naming
            .column_prefixes_to_remove
            .insert(args.type_name.clone(), prefix);
    }
    if args.exact_underscores {
        naming.match_column_names_with_underscores = false;
    }

    let fields: Vec<&str> = args
        .fields
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .collect();
    let map = naming.column_map(&args.type_name, &fields);

    let mut conn = open_local(&args.db)?;
    let command = conn.create_command(&args.sql);
    let rows = conn
        .query(&command)
        .await
        .map_err(|e| format!("Query failed: {e}"))?;

    let records: Vec<serde_json::Value> = rows
        .iter()
        .map(|row| {
            let object = row
                .map_fields(&map)
                .into_iter()
                .map(|(field, value)| (field.to_string(), json_value(value)))
                .collect();
            serde_json::Value::Object(object)
        })
        .collect();

    let json = serde_json::to_string_pretty(&records)
        .map_err(|e| format!("Failed to serialize rows: {e}"))?;
    println!("{json}");
    Ok(())
}

fn load_config_file(path: &Path) -> Result<EngineConfig, String> {
    let config = EngineConfig::load(path)
        .map_err(|e| format!("Failed to load config '{}': {e}", path.display()))?;
    debug!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

/// Reads the configuration file, if any, and applies script source flags.
fn load_config(args: &ScriptSourceArgs) -> Result<EngineConfig, String> {
    let mut config = match &args.config {
        Some(path) => load_config_file(path)?,
        None => EngineConfig::new(String::new(), 0),
    };
    if let Some(dir) = &args.scripts {
        config.scripts.dir = Some(dir.clone());
    }
    if let Some(bundle) = &args.bundle {
        config.scripts.bundle = Some(bundle.clone());
    }
    if let Some(namespace) = &args.namespace {
        config.scripts.namespace = namespace.clone();
    }
    Ok(config)
}

fn engine_config(args: &EngineArgs) -> Result<EngineConfig, String> {
    let mut config = load_config(&args.source)?;
    if let Some(connection_string) = &args.connection_string {
        config.connection_string = connection_string.clone();
    }
    if let Some(version) = args.target_version {
        config.version = version;
    }
    if let Some(timeout) = args.timeout {
        config.command_timeout_secs = Some(timeout);
    }
    if let Some(grace_ms) = args.grace_ms {
        config.grace_period_ms = grace_ms;
    }
    Ok(config)
}

fn build_engine<C: Connector>(connector: C, config: &EngineConfig) -> Result<LifecycleEngine<C>, String> {
    let bundle = config
        .scripts
        .load_bundle()
        .map_err(|e| format!("Failed to load scripts: {e}"))?;

    let mut builder = LifecycleEngine::builder(connector)
        .connection_string(config.connection_string.as_str())
        .version(config.version)
        .script_provider(&bundle, &config.scripts.namespace)
        .command_timeout(config.command_timeout())
        .grace_period(config.grace_period());
    if let Some(login) = &config.cloud_login {
        builder = builder.cloud_login(login.name.as_str(), login.password.as_str());
    }
    builder
        .build()
        .map_err(|e| format!("Invalid configuration: {e}"))
}

fn local_engine(args: &LocalEngineArgs) -> Result<LifecycleEngine<SqliteConnector>, String> {
    let mut config = load_config(&args.source)?;
    config.connection_string = local_connection_string(&args.db);
    if let Some(version) = args.target_version {
        config.version = version;
    }
    build_engine(SqliteConnector, &config)
}

fn local_connection_string(db: &Path) -> String {
    let mut cs = ConnectionString::default();
    cs.set("Data Source", db.to_string_lossy());
    cs.set("Initial Catalog", LOCAL_CATALOG);
    cs.to_string()
}

fn open_local(db: &Path) -> Result<SqliteConnection, String> {
    SqliteConnection::open_path(db)
        .map_err(|e| format!("Failed to open database '{}': {e}", db.display()))
}

fn json_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(v) => (*v).into(),
        Value::Int(v) => (*v).into(),
        Value::Float(v) => serde_json::Number::from_f64(*v)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        Value::Text(v) => v.clone().into(),
        Value::Bytes(v) => v
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<String>()
            .into(),
    }
}
