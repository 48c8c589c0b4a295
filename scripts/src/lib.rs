//! Script bundle loading and engine configuration for dbforge.
//!
//! This crate provides infrastructure for loading the versioned SQL scripts a
//! lifecycle engine runs, and the YAML configuration the CLI reads.
//!
//! # Quick start
//!
//! ```no_run
//! use dbforge_core::ScriptSet;
//! use dbforge_scripts::{EngineConfig, ScriptBundle};
//!
//! // Load scripts from a directory: sql/app/create.sql -> "app.create.sql"
//! let bundle = ScriptBundle::from_dir("sql/").unwrap();
//! let scripts = ScriptSet::from_provider(&bundle, "app").unwrap();
//! println!("{} create statements", scripts.create().len());
//!
//! // Or take everything from a configuration file
//! let config = EngineConfig::load("dbforge.yml").unwrap();
//! let bundle = config.scripts.load_bundle().unwrap();
//! ```

mod config;
mod error;
mod loader;

pub use config::{CloudLoginConfig, DEFAULT_GRACE_PERIOD_MS, EngineConfig, ScriptsConfig};
pub use error::{Result, ScriptError};
pub use loader::{BundleBuilder, BundleSource, EmbeddedScripts, ScriptBundle};
