//! Script bundle loading with builder pattern and fallback chains.
//!
//! A [`ScriptBundle`] maps resource names such as `app.create.sql` to script
//! text. Bundles load from a directory tree of `*.sql` files, from a single
//! JSON bundle file, or from statics compiled into the binary, and implement
//! [`ScriptProvider`] so the lifecycle engine can resolve a namespace's
//! `create`, `clear`, and `populate` scripts from any of them.
//!
//! # Loading patterns
//!
//! ```no_run
//! use dbforge_scripts::ScriptBundle;
//!
//! // sql/app/create.sql is exposed as "app.create.sql"
//! let bundle = ScriptBundle::from_dir("sql/").unwrap();
//! assert!(bundle.contains("app.create.sql"));
//!
//! // A JSON object of name -> script text
//! let bundle = ScriptBundle::from_bundle("scripts.json").unwrap();
//!
//! // Fallback chain: first source that loads wins
//! let bundle = ScriptBundle::builder()
//!     .from_dir("sql/")
//!     .from_bundle("scripts.json")
//!     .build()
//!     .unwrap();
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use dbforge_core::ScriptProvider;
use tracing::debug;

use crate::error::{Result, ScriptError};

/// Static `(resource name, script text)` pairs compiled into a binary.
pub type EmbeddedScripts = &'static [(&'static str, &'static str)];

/// Describes where a [`ScriptBundle`] was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleSource {
    /// Loaded from a directory tree of `*.sql` files.
    Directory(PathBuf),
    /// Loaded from a single JSON bundle file.
    Bundle(PathBuf),
    /// Loaded from statics embedded at compile time.
    Embedded,
    /// Loaded via a fallback chain of multiple sources.
    Multiple(Vec<BundleSource>),
}

/// In-memory collection of named scripts.
#[derive(Debug, Clone)]
pub struct ScriptBundle {
    scripts: BTreeMap<String, String>,
    source: BundleSource,
}

impl ScriptBundle {
    /// Returns a new [`BundleBuilder`] for configuring a fallback chain.
    pub fn builder() -> BundleBuilder {
        BundleBuilder::new()
    }

    /// Loads every `*.sql` file below `path`.
    ///
    /// Resource names are the path relative to `path` with separators
    /// replaced by `.`, so `app/create.sql` becomes `app.create.sql`.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::IoError`] if a directory or file cannot be read.
    pub fn from_dir(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref();
        let mut scripts = BTreeMap::new();
        collect_dir(root, root, &mut scripts)?;

        Ok(Self {
            scripts,
            source: BundleSource::Directory(root.to_path_buf()),
        })
    }

    /// Loads a JSON bundle: a single object mapping resource names to text.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::IoError`] if the file cannot be read, or
    /// [`ScriptError::JsonError`] if it is not a string-to-string object.
    pub fn from_bundle(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let scripts: BTreeMap<String, String> = serde_json::from_reader(reader)?;

        Ok(Self {
            scripts,
            source: BundleSource::Bundle(path.to_path_buf()),
        })
    }

    /// Builds a bundle from statics, typically produced with `include_str!`.
    ///
    /// ```
    /// use dbforge_scripts::ScriptBundle;
    ///
    /// static SCRIPTS: &[(&str, &str)] = &[
    ///     ("app.create.sql", "CREATE TABLE dbschema (version int)"),
    ///     ("app.clear.sql", ""),
    ///     ("app.populate.sql", ""),
    /// ];
    ///
    /// let bundle = ScriptBundle::embedded(SCRIPTS);
    /// assert_eq!(bundle.len(), 3);
    /// ```
    pub fn embedded(entries: EmbeddedScripts) -> Self {
        let scripts = entries
            .iter()
            .map(|(name, text)| (name.to_string(), text.to_string()))
            .collect();
        Self {
            scripts,
            source: BundleSource::Embedded,
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.scripts.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scripts.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    /// Returns an iterator over resource names in sorted order.
    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.scripts.keys().map(String::as_str)
    }

    pub fn source(&self) -> &BundleSource {
        &self.source
    }
}

impl ScriptProvider for ScriptBundle {
    fn script(&self, name: &str) -> Option<&str> {
        self.get(name)
    }

    fn names(&self) -> Vec<String> {
        self.scripts.keys().cloned().collect()
    }
}

fn collect_dir(root: &Path, dir: &Path, scripts: &mut BTreeMap<String, String>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_dir(root, &path, scripts)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("sql") {
            let text = std::fs::read_to_string(&path)?;
            scripts.insert(resource_name_for(root, &path), text);
        }
    }
    Ok(())
}

fn resource_name_for(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join(".")
}

#[derive(Debug, Clone)]
enum Candidate {
    Directory(PathBuf),
    Bundle(PathBuf),
    Embedded(EmbeddedScripts),
}

impl Candidate {
    fn describe(&self) -> BundleSource {
        match self {
            Candidate::Directory(path) => BundleSource::Directory(path.clone()),
            Candidate::Bundle(path) => BundleSource::Bundle(path.clone()),
            Candidate::Embedded(_) => BundleSource::Embedded,
        }
    }

    fn load(&self) -> Result<ScriptBundle> {
        match self {
            Candidate::Directory(path) => ScriptBundle::from_dir(path),
            Candidate::Bundle(path) => ScriptBundle::from_bundle(path),
            Candidate::Embedded(entries) => Ok(ScriptBundle::embedded(*entries)),
        }
    }
}

/// Builder for constructing a [`ScriptBundle`] with a fallback chain.
///
/// Sources are tried in the order they are added. The first source that
/// loads and contains at least one script wins; if none does,
/// [`ScriptError::NoSourcesAvailable`] is returned.
#[derive(Debug, Default)]
pub struct BundleBuilder {
    candidates: Vec<Candidate>,
}

impl BundleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a directory of `*.sql` files as a source.
    pub fn from_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.candidates.push(Candidate::Directory(path.into()));
        self
    }

    /// Adds a JSON bundle file as a source.
    pub fn from_bundle(mut self, path: impl Into<PathBuf>) -> Self {
        self.candidates.push(Candidate::Bundle(path.into()));
        self
    }

    /// Adds compiled-in scripts as a source.
    pub fn with_embedded(mut self, entries: EmbeddedScripts) -> Self {
        self.candidates.push(Candidate::Embedded(entries));
        self
    }

    /// Attempts each configured source in order.
    pub fn build(self) -> Result<ScriptBundle> {
        let all_sources: Vec<BundleSource> = self.candidates.iter().map(Candidate::describe).collect();

        for candidate in &self.candidates {
            match candidate.load() {
                Ok(mut bundle) if !bundle.is_empty() => {
                    bundle.source = BundleSource::Multiple(all_sources);
                    return Ok(bundle);
                }
                Ok(_) => debug!(source = ?candidate.describe(), "Script source is empty"),
                Err(e) => debug!(source = ?candidate.describe(), error = %e, "Script source failed to load"),
            }
        }

        Err(ScriptError::NoSourcesAvailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbforge_core::ScriptSet;

    fn write(dir: &Path, relative: &str, text: &str) {
        let path = dir.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, text).unwrap();
    }

    #[test]
    fn test_from_dir_names_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "app/create.sql", "CREATE TABLE t (id int)");
        write(dir.path(), "app/clear.sql", "DELETE FROM t");
        write(dir.path(), "readme.txt", "ignored");

        let bundle = ScriptBundle::from_dir(dir.path()).unwrap();
        assert_eq!(bundle.len(), 2);
        assert_eq!(bundle.get("app.create.sql"), Some("CREATE TABLE t (id int)"));
        assert!(!bundle.contains("readme.txt"));
        assert_eq!(bundle.source(), &BundleSource::Directory(dir.path().to_path_buf()));
    }

    #[test]
    fn test_from_dir_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let result = ScriptBundle::from_dir(dir.path().join("absent"));
        assert!(matches!(result, Err(ScriptError::IoError(_))));
    }

    #[test]
    fn test_from_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scripts.json");
        std::fs::write(
            &path,
            r#"{"app.create.sql": "CREATE TABLE t (id int)\nGO\nCREATE INDEX ix ON t (id)"}"#,
        )
        .unwrap();

        let bundle = ScriptBundle::from_bundle(&path).unwrap();
        assert_eq!(bundle.resources().collect::<Vec<_>>(), vec!["app.create.sql"]);
    }

    #[test]
    fn test_from_bundle_rejects_non_string_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scripts.json");
        std::fs::write(&path, r#"{"app.create.sql": 42}"#).unwrap();
        assert!(matches!(ScriptBundle::from_bundle(&path), Err(ScriptError::JsonError(_))));
    }

    #[test]
    fn test_builder_falls_back_to_embedded() {
        static SCRIPTS: EmbeddedScripts = &[("app.create.sql", "CREATE TABLE t (id int)")];
        let bundle = ScriptBundle::builder()
            .from_dir("/nonexistent/dbforge/scripts")
            .with_embedded(SCRIPTS)
            .build()
            .unwrap();
        assert!(bundle.contains("app.create.sql"));
        assert!(matches!(bundle.source(), BundleSource::Multiple(sources) if sources.len() == 2));
    }

    #[test]
    fn test_builder_without_sources_fails() {
        assert!(matches!(
            ScriptBundle::builder().build(),
            Err(ScriptError::NoSourcesAvailable)
        ));
    }

    #[test]
    fn test_bundle_as_provider() {
        static SCRIPTS: EmbeddedScripts = &[
            ("app.create.sql", "CREATE TABLE a (id int)\nGO\nCREATE TABLE b (id int)"),
            ("app.clear.sql", "DELETE FROM b\nGO\nDELETE FROM a"),
            ("app.populate.sql", "INSERT INTO a VALUES (1)"),
        ];
        let bundle = ScriptBundle::embedded(SCRIPTS);
        let set = ScriptSet::from_provider(&bundle, "app").unwrap();
        assert_eq!(set.create().len(), 2);
        assert_eq!(set.clear().len(), 2);
        assert_eq!(set.populate().len(), 1);
    }
}
