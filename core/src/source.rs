//! Script-provider abstraction.
//!
//! The lifecycle engine never reads files or embedded resources itself; it
//! asks a [`ScriptProvider`] for script text by resource name. This crate
//! ships [`InlineScripts`] for plain strings; bundle-backed providers live in
//! `dbforge-scripts`.

use std::collections::BTreeMap;

/// Looks up script text by resource name.
pub trait ScriptProvider {
    /// Returns the text of the named resource, if present.
    fn script(&self, name: &str) -> Option<&str>;

    /// Returns every resource name this provider exposes.
    fn names(&self) -> Vec<String>;
}

/// Script provider backed by caller-supplied strings.
///
/// # Examples
///
/// ```
/// use dbforge_core::{InlineScripts, ScriptProvider};
///
/// let scripts = InlineScripts::new().with("app.create.sql", "CREATE TABLE t (id int)");
/// assert_eq!(scripts.script("app.create.sql"), Some("CREATE TABLE t (id int)"));
/// assert!(scripts.script("app.clear.sql").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct InlineScripts {
    scripts: BTreeMap<String, String>,
}

impl InlineScripts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a named script.
    pub fn with(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(name, text);
        self
    }

    /// Adds or replaces a named script in place.
    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.scripts.insert(name.into(), text.into());
    }
}

impl ScriptProvider for InlineScripts {
    fn script(&self, name: &str) -> Option<&str> {
        self.scripts.get(name).map(String::as_str)
    }

    fn names(&self) -> Vec<String> {
        self.scripts.keys().cloned().collect()
    }
}

impl<P: ScriptProvider + ?Sized> ScriptProvider for &P {
    fn script(&self, name: &str) -> Option<&str> {
        (**self).script(name)
    }

    fn names(&self) -> Vec<String> {
        (**self).names()
    }
}
