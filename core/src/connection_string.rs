//! ADO-style `key=value;` connection strings.
//!
//! Keys are matched case-insensitively and their original spelling and order
//! are preserved when the string is rendered again. Values may be wrapped in
//! single or double quotes, with the quote character doubled to escape it.
//!
//! The lifecycle engine rewrites the catalog component to open
//! administrative connections that do not select the target database.
//!
//! ```
//! use dbforge_core::ConnectionString;
//!
//! let cs: ConnectionString = "Server=tcp:db,1433;Initial Catalog=app;User ID=sa".parse().unwrap();
//! assert_eq!(cs.catalog(), Some("app"));
//!
//! let admin = cs.without_catalog();
//! assert_eq!(admin.catalog(), None);
//! assert_eq!(admin.to_string(), "Server=tcp:db,1433;User ID=sa");
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::{ConfigError, Result};

/// Keys that name the target database.
pub const CATALOG_KEYS: &[&str] = &["Initial Catalog", "Database"];

/// Parsed connection string with ordered, case-insensitive keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionString {
    pairs: Vec<(String, String)>,
}

impl ConnectionString {
    /// Parses a connection string.
    ///
    /// Empty segments (for example a trailing `;`) are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidConnectionString`] when a segment has no
    /// `=` or an empty key, or a quoted value is not terminated.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut pairs = Vec::new();
        let mut rest = raw;

        while !rest.trim().is_empty() {
            let Some(eq) = rest.find('=') else {
                return Err(invalid(format!("segment '{}' has no '='", rest.trim())));
            };
            let key = rest[..eq].trim().trim_start_matches(';').trim();
            if key.is_empty() || key.contains(';') {
                return Err(invalid(format!("segment '{}' has no key", rest[..eq].trim())));
            }

            let (value, remainder) = parse_value(&rest[eq + 1..])?;
            pairs.push((key.to_string(), value));
            rest = remainder;
        }

        Ok(Self { pairs })
    }

    /// Returns `true` when no key is present.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Returns the value of `key`, matched case-insensitively.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Sets `key`, replacing an existing entry in place or appending a new one.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.pairs.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(key)) {
            Some(entry) => entry.1 = value,
            None => self.pairs.push((key.to_string(), value)),
        }
    }

    /// Removes every entry for `key`.
    pub fn remove(&mut self, key: &str) {
        self.pairs.retain(|(k, _)| !k.eq_ignore_ascii_case(key));
    }

    /// Returns the target database name.
    pub fn catalog(&self) -> Option<&str> {
        self.first_of(CATALOG_KEYS).filter(|v| !v.trim().is_empty())
    }

    /// Returns a copy addressing the server without selecting a database.
    pub fn without_catalog(&self) -> Self {
        let mut copy = self.clone();
        for key in CATALOG_KEYS {
            copy.remove(key);
        }
        copy
    }

    /// Returns a copy whose catalog is `database`.
    ///
    /// An existing catalog entry keeps its position and spelling.
    pub fn with_catalog(&self, database: &str) -> Self {
        let mut copy = self.clone();
        let key = CATALOG_KEYS
            .iter()
            .find(|k| self.get(k).is_some())
            .copied()
            .unwrap_or(CATALOG_KEYS[0]);
        copy.set(key, database);
        copy
    }

    /// Iterates over the `(key, value)` pairs in their original order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn first_of(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.get(k))
    }
}

fn invalid(message: String) -> ConfigError {
    ConfigError::InvalidConnectionString(message)
}

/// Parses one value and returns it with the input remaining after its `;`.
fn parse_value(input: &str) -> Result<(String, &str)> {
    let trimmed = input.trim_start();
    let quote = trimmed.chars().next().filter(|c| *c == '"' || *c == '\'');

    let Some(quote) = quote else {
        return Ok(match trimmed.find(';') {
            Some(end) => (trimmed[..end].trim().to_string(), &trimmed[end + 1..]),
            None => (trimmed.trim().to_string(), ""),
        });
    };

    let mut value = String::new();
    let mut chars = trimmed[1..].char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        if c != quote {
            value.push(c);
            continue;
        }
        if matches!(chars.peek(), Some((_, next)) if *next == quote) {
            value.push(quote);
            chars.next();
            continue;
        }
        let after = trimmed[1 + idx + c.len_utf8()..].trim_start();
        return match after.strip_prefix(';') {
            Some(rest) => Ok((value, rest)),
            None if after.is_empty() => Ok((value, "")),
            None => Err(invalid(format!("unexpected text after quoted value: '{after}'"))),
        };
    }

    Err(invalid("unterminated quoted value".to_string()))
}

fn needs_quotes(value: &str) -> bool {
    value.contains(';')
        || value.starts_with(['"', '\'', ' '])
        || value.ends_with(' ')
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, (key, value)) in self.pairs.iter().enumerate() {
            if idx > 0 {
                f.write_str(";")?;
            }
            if needs_quotes(value) {
                write!(f, "{key}=\"{}\"", value.replace('"', "\"\""))?;
            } else {
                write!(f, "{key}={value}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for ConnectionString {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
