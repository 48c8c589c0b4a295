//! Engine configuration files.
//!
//! Defines the YAML-serializable settings the `dbforge` CLI uses to assemble
//! a lifecycle engine: connection string, target schema version, timeouts,
//! where to find scripts, and column naming options.
//!
//! # Example YAML
//!
//! ```yaml
//! connection_string: "Server=tcp:localhost,1433;Initial Catalog=orders;User ID=sa;Password=secret"
//! version: 7
//! command_timeout_secs: 60
//! grace_period_ms: 3000
//! scripts:
//!   dir: sql/
//!   namespace: orders
//! cloud_login:
//!   name: orders_app
//!   password: change-me
//! naming:
//!   match_column_names_with_underscores: true
//!   column_prefixes_to_remove:
//!     Order: ord_
//! ```

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use dbforge_core::NamingOptions;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScriptError};
use crate::loader::ScriptBundle;

/// Grace period applied after cloud database creation or deletion.
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 3000;

fn default_grace_period_ms() -> u64 {
    DEFAULT_GRACE_PERIOD_MS
}

/// Where the create, clear, and populate scripts come from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptsConfig {
    /// Directory tree of `*.sql` files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// JSON bundle file, tried after `dir`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<PathBuf>,
    /// Logical namespace prefixing the script resource names.
    #[serde(default)]
    pub namespace: String,
}

impl ScriptsConfig {
    /// Loads the configured sources as a fallback chain.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::InvalidConfig`] when neither `dir` nor `bundle`
    /// is set, or [`ScriptError::NoSourcesAvailable`] when none loads.
    pub fn load_bundle(&self) -> Result<ScriptBundle> {
        let mut builder = ScriptBundle::builder();
        if let Some(dir) = &self.dir {
            builder = builder.from_dir(dir);
        }
        if let Some(bundle) = &self.bundle {
            builder = builder.from_bundle(bundle);
        }
        if self.dir.is_none() && self.bundle.is_none() {
            return Err(ScriptError::InvalidConfig(
                "scripts.dir or scripts.bundle must be set".to_string(),
            ));
        }
        builder.build()
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        for path in [&mut self.dir, &mut self.bundle].into_iter().flatten() {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

/// Credentials of the application login created on cloud builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudLoginConfig {
    pub name: String,
    pub password: String,
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// ADO-style connection string naming the target catalog.
    pub connection_string: String,
    /// Target schema version.
    pub version: i32,
    /// Per-command timeout; the driver default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,
    /// Wait after cloud database creation or deletion.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    #[serde(default)]
    pub scripts: ScriptsConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_login: Option<CloudLoginConfig>,
    #[serde(default)]
    pub naming: NamingOptions,
}

impl EngineConfig {
    /// Creates a configuration with defaults for everything but the target.
    pub fn new(connection_string: impl Into<String>, version: i32) -> Self {
        Self {
            connection_string: connection_string.into(),
            version,
            command_timeout_secs: None,
            grace_period_ms: DEFAULT_GRACE_PERIOD_MS,
            scripts: ScriptsConfig::default(),
            cloud_login: None,
            naming: NamingOptions::default(),
        }
    }

    /// Loads configuration from a YAML file.
    ///
    /// Relative script paths are resolved against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::IoError`] if the file cannot be read, or
    /// [`ScriptError::YamlError`] if parsing fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let mut config: Self = serde_yaml::from_reader(reader)?;
        if let Some(base) = path.parent() {
            config.scripts.resolve_relative_to(base);
        }
        Ok(config)
    }

    /// Saves the configuration as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_yaml() -> &'static str {
        r#"
connection_string: "Server=db;Initial Catalog=orders"
version: 7
command_timeout_secs: 60
scripts:
  dir: sql
  namespace: orders
cloud_login:
  name: orders_app
  password: secret
naming:
  column_prefixes_to_remove:
    Order: ord_
"#
    }

    #[test]
    fn test_deserialize_complete() {
        let config: EngineConfig = serde_yaml::from_str(sample_yaml()).unwrap();
        assert_eq!(config.version, 7);
        assert_eq!(config.command_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(config.grace_period(), Duration::from_millis(3000));
        assert_eq!(config.scripts.namespace, "orders");
        assert_eq!(config.cloud_login.unwrap().name, "orders_app");
        assert!(config.naming.match_column_names_with_underscores);
        assert_eq!(config.naming.column_prefixes_to_remove["Order"], "ord_");
    }

    #[test]
    fn test_deserialize_minimal() {
        let config: EngineConfig =
            serde_yaml::from_str("connection_string: \"Server=db;Database=x\"\nversion: 1\n").unwrap();
        assert!(config.command_timeout().is_none());
        assert!(config.cloud_login.is_none());
        assert_eq!(config.scripts, ScriptsConfig::default());
    }

    #[test]
    fn test_load_resolves_relative_script_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dbforge.yml");
        std::fs::write(&path, sample_yaml()).unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.scripts.dir, Some(dir.path().join("sql")));
    }

    #[test]
    fn test_load_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dbforge.yml");

        let original: EngineConfig = serde_yaml::from_str(sample_yaml()).unwrap();
        original.save(&path).unwrap();
        let loaded: EngineConfig = serde_yaml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

        assert_eq!(loaded.connection_string, original.connection_string);
        assert_eq!(loaded.version, original.version);
        assert_eq!(loaded.naming, original.naming);
    }

    #[test]
    fn test_new_uses_defaults() {
        let config = EngineConfig::new("Server=db;Database=x", 2);
        assert_eq!(config.version, 2);
        assert_eq!(config.grace_period_ms, DEFAULT_GRACE_PERIOD_MS);
        assert!(config.command_timeout().is_none());
        assert_eq!(config.naming, NamingOptions::default());
    }

    #[test]
    fn test_scripts_without_sources_is_invalid() {
        let scripts = ScriptsConfig::default();
        assert!(matches!(scripts.load_bundle(), Err(ScriptError::InvalidConfig(_))));
    }
}
