//! Batch-separated SQL scripts.
//!
//! A script is split into independently executable statements on lines that
//! contain only the `GO` batch separator, matched case-insensitively and
//! ignoring surrounding whitespace. Both `\n` and `\r\n` line endings are
//! accepted. Statement text is otherwise forwarded verbatim: there is no
//! comment awareness and no SQL validation.
//!
//! # Examples
//!
//! ```
//! use dbforge_core::parse_str;
//!
//! let statements = parse_str("CREATE TABLE a (id int)\nGO\nCREATE INDEX ix ON a (id)\n  go  \n");
//! assert_eq!(statements.len(), 2);
//! assert!(statements.iter().all(|s| !s.to_lowercase().contains("go\n")));
//! ```

use crate::error::{ConfigError, Result};
use crate::source::ScriptProvider;

/// Batch separator token.
pub const BATCH_SEPARATOR: &str = "GO";

/// Logical name of the schema creation script.
pub const CREATE_SCRIPT: &str = "create";
/// Logical name of the data clearing script.
pub const CLEAR_SCRIPT: &str = "clear";
/// Logical name of the seed data script.
pub const POPULATE_SCRIPT: &str = "populate";

/// Splits an optional script body into executable statements.
///
/// `None` and empty input both produce an empty vector.
pub fn parse(raw: Option<&str>) -> Vec<String> {
    raw.map(parse_str).unwrap_or_default()
}

/// Splits a script body into executable statements.
///
/// Separator lines are consumed, fragments that are empty or whitespace-only
/// are dropped, and the remaining fragments keep their original text and
/// relative order. A leading UTF-8 byte-order mark is ignored.
pub fn parse_str(raw: &str) -> Vec<String> {
    let raw = raw.strip_prefix(BYTE_ORDER_MARK).unwrap_or(raw);
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in raw.split_inclusive('\n') {
        if is_separator(line) {
            flush(&mut current, &mut statements);
        } else {
            current.push_str(line);
        }
    }
    flush(&mut current, &mut statements);

    statements
}

const BYTE_ORDER_MARK: char = '\u{feff}';

fn is_separator(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case(BATCH_SEPARATOR)
}

fn flush(current: &mut String, statements: &mut Vec<String>) {
    if !current.trim().is_empty() {
        statements.push(std::mem::take(current));
    } else {
        current.clear();
    }
}

/// Returns the resource name of a logical script under a namespace.
///
/// ```
/// # use dbforge_core::resource_name;
/// assert_eq!(resource_name("app.sql", "create"), "app.sql.create.sql");
/// assert_eq!(resource_name("", "clear"), "clear.sql");
/// ```
pub fn resource_name(namespace: &str, logical: &str) -> String {
    if namespace.is_empty() {
        format!("{logical}.sql")
    } else {
        format!("{namespace}.{logical}.sql")
    }
}

/// The parsed create, clear, and populate statements of one schema generation.
///
/// Immutable once built. Each statement is a single non-empty unit; separator
/// lines never appear.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptSet {
    create: Vec<String>,
    clear: Vec<String>,
    populate: Vec<String>,
}

impl ScriptSet {
    /// Parses inline script bodies.
    ///
    /// The create script is not validated here; emptiness is checked where the
    /// engine is assembled.
    pub fn from_text(create: &str, clear: Option<&str>, populate: Option<&str>) -> Self {
        Self {
            create: parse_str(create),
            clear: parse(clear),
            populate: parse(populate),
        }
    }

    /// Resolves the `create`, `clear`, and `populate` resources of `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ScriptNotFound`] naming the missing resource and
    /// listing every resource the provider exposes.
    pub fn from_provider(provider: &dyn ScriptProvider, namespace: &str) -> Result<Self> {
        let lookup = |logical: &str| -> Result<Vec<String>> {
            let name = resource_name(namespace, logical);
            match provider.script(&name) {
                Some(text) => Ok(parse_str(text)),
                None => {
                    let mut available = provider.names();
                    available.sort();
                    Err(ConfigError::ScriptNotFound { name, available })
                }
            }
        };

        Ok(Self {
            create: lookup(CREATE_SCRIPT)?,
            clear: lookup(CLEAR_SCRIPT)?,
            populate: lookup(POPULATE_SCRIPT)?,
        })
    }

    pub fn create(&self) -> &[String] {
        &self.create
    }

    pub fn clear(&self) -> &[String] {
        &self.clear
    }

    pub fn populate(&self) -> &[String] {
        &self.populate
    }

    /// Create statements followed by populate statements, in execution order.
    pub fn build_statements(&self) -> impl Iterator<Item = &str> {
        self.create
            .iter()
            .chain(self.populate.iter())
            .map(String::as_str)
    }
}
