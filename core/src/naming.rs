//! Result-column to field-name matching.
//!
//! Column names are normalized by stripping a per-type prefix, optionally
//! removing underscores, and lowercasing. Field names go through the same
//! underscore and case folding, so `first_name`, `FirstName`, and
//! `usr_first_name` (with prefix `usr_`) all resolve to the field
//! `first_name`.
//!
//! A [`ColumnMap`] is resolved once per target type and then consulted per
//! column; nothing is looked up per row.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Column matching options.
///
/// # Examples
///
/// ```
/// use dbforge_core::NamingOptions;
///
/// let mut options = NamingOptions::default();
/// options.column_prefixes_to_remove.insert("Customer".into(), "cust_".into());
///
/// let map = options.column_map("Customer", &["id", "first_name"]);
/// assert_eq!(map.field_for("cust_FirstName"), Some("first_name"));
/// assert_eq!(map.field_for("ID"), Some("id"));
/// assert_eq!(map.field_for("unknown"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingOptions {
    /// Ignore underscores when comparing column and field names.
    pub match_column_names_with_underscores: bool,
    /// Prefix stripped from column names, keyed by result type name.
    pub column_prefixes_to_remove: BTreeMap<String, String>,
}

impl Default for NamingOptions {
    fn default() -> Self {
        Self {
            match_column_names_with_underscores: true,
            column_prefixes_to_remove: BTreeMap::new(),
        }
    }
}

impl NamingOptions {
    /// Normalizes a result column name for `type_name`.
    ///
    /// The configured prefix is removed case-insensitively before folding.
    pub fn normalize_column(&self, type_name: &str, column: &str) -> String {
        let stripped = self
            .column_prefixes_to_remove
            .get(type_name)
            .filter(|prefix| !prefix.is_empty())
            .and_then(|prefix| strip_prefix_ignore_case(column, prefix))
            .unwrap_or(column);
        self.fold(stripped)
    }

    /// Normalizes a field name.
    pub fn normalize_field(&self, field: &str) -> String {
        self.fold(field)
    }

    /// Resolves the column map for one result type.
    ///
    /// When two fields fold to the same key, the first one wins.
    pub fn column_map(&self, type_name: &str, fields: &[&str]) -> ColumnMap {
        let mut by_key = HashMap::with_capacity(fields.len());
        for field in fields {
            by_key
                .entry(self.normalize_field(field))
                .or_insert_with(|| field.to_string());
        }
        ColumnMap {
            type_name: type_name.to_string(),
            options: self.clone(),
            by_key,
        }
    }

    fn fold(&self, name: &str) -> String {
        if self.match_column_names_with_underscores {
            name.chars().filter(|c| *c != '_').flat_map(char::to_lowercase).collect()
        } else {
            name.to_lowercase()
        }
    }
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &value[prefix.len()..])
}

/// Column-to-field lookup resolved for one result type.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    type_name: String,
    options: NamingOptions,
    by_key: HashMap<String, String>,
}

impl ColumnMap {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns the field a result column maps to.
    pub fn field_for(&self, column: &str) -> Option<&str> {
        let key = self.options.normalize_column(&self.type_name, column);
        if key.is_empty() {
            return None;
        }
        self.by_key.get(&key).map(String::as_str)
    }

    /// Maps each column of a result set to its field, in column order.
    pub fn resolve<'c>(&self, columns: impl IntoIterator<Item = &'c str>) -> Vec<Option<&str>> {
        columns.into_iter().map(|c| self.field_for(c)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_underscores() {
        let options = NamingOptions::default();
        assert!(options.match_column_names_with_underscores);
        assert_eq!(options.normalize_column("Order", "ORDER_ID"), "orderid");
        assert_eq!(options.normalize_field("order_id"), "orderid");
    }

    #[test]
    fn test_underscore_matching_disabled() {
        let options = NamingOptions {
            match_column_names_with_underscores: false,
            ..Default::default()
        };
        let map = options.column_map("Order", &["order_id", "total"]);
        assert_eq!(map.field_for("Order_Id"), Some("order_id"));
        assert_eq!(map.field_for("OrderId"), None);
    }

    #[test]
    fn test_prefix_only_applies_to_its_type() {
        let mut options = NamingOptions::default();
        options
            .column_prefixes_to_remove
            .insert("Order".into(), "ord_".into());

        let orders = options.column_map("Order", &["id"]);
        assert_eq!(orders.field_for("ord_id"), Some("id"));
        assert_eq!(orders.field_for("ORD_ID"), Some("id"));

        let lines = options.column_map("OrderLine", &["id"]);
        assert_eq!(lines.field_for("ord_id"), None);
    }

    #[test]
    fn test_column_equal_to_prefix_does_not_match() {
        let mut options = NamingOptions::default();
        options.column_prefixes_to_remove.insert("T".into(), "t_".into());
        let map = options.column_map("T", &["t"]);
        assert_eq!(map.field_for("t_"), None);
    }

    #[test]
    fn test_resolve_preserves_column_order() {
        let map = NamingOptions::default().column_map("Person", &["first_name", "last_name"]);
        let resolved = map.resolve(["LastName", "age", "FIRST_NAME"]);
        assert_eq!(resolved, vec![Some("last_name"), None, Some("first_name")]);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let options: NamingOptions =
            serde_json::from_str(r#"{"column_prefixes_to_remove": {"User": "usr_"}}"#).unwrap();
        assert!(options.match_column_names_with_underscores);
        assert_eq!(options.column_prefixes_to_remove["User"], "usr_");
    }
}
