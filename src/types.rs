//! Common type definitions for command execution
//!
//! Shared types used across the executor modules

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Single column value - generic JSON representation
pub type SqlValue = serde_json::Value;

/// Query result row type - generic key-value map
pub type QueryRow = HashMap<String, SqlValue>;

/// Whether command text is raw SQL or the name of a stored procedure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommandKind {
    Text,
    #[default]
    StoredProcedure,
}

impl CommandKind {
    /// Render the statement actually sent to the server.
    ///
    /// Stored procedure names are wrapped as `CALL name(?, ...)` with one
    /// placeholder per bound parameter; raw text passes through unchanged.
    pub fn command_sql(&self, command_text: &str, param_count: usize) -> String {
        match self {
            CommandKind::Text => command_text.to_string(),
            CommandKind::StoredProcedure => {
                let placeholders = vec!["?"; param_count].join(", ");
                format!("CALL {command_text}({placeholders})")
            }
        }
    }
}

/// Execution shape of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandShape {
    Reader,
    NonQuery,
    Scalar,
}

impl CommandShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandShape::Reader => "reader",
            CommandShape::NonQuery => "non-query",
            CommandShape::Scalar => "scalar",
        }
    }
}

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IsolationLevel {
    #[default]
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Ordered parameter bindings for a command
///
/// Binding is positional, so insertion order must match the placeholder
/// order of the command text.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParams {
    entries: Vec<(String, SqlValue)>,
}

impl QueryParams {
    /// Create an empty parameter list
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named value, preserving insertion order
    pub fn with_value(mut self, name: &str, value: impl Into<SqlValue>) -> Self {
        self.entries.push((name.to_string(), value.into()));
        self
    }

    /// Append a named value in place
    pub fn push(&mut self, name: &str, value: impl Into<SqlValue>) {
        self.entries.push((name.to_string(), value.into()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in binding order
    pub fn iter(&self) -> impl Iterator<Item = &(String, SqlValue)> {
        self.entries.iter()
    }

    /// Parameter names in binding order
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_isolation_level_string() {
        assert_eq!(IsolationLevel::ReadCommitted.as_str(), "READ COMMITTED");
        assert_eq!(IsolationLevel::Serializable.as_str(), "SERIALIZABLE");
    }

    #[test]
    fn test_isolation_level_default_is_read_uncommitted() {
        assert_eq!(IsolationLevel::default(), IsolationLevel::ReadUncommitted);
    }

    #[test]
    fn test_text_command_passes_through() {
        let sql = CommandKind::Text.command_sql("SELECT * FROM test1", 3);
        assert_eq!(sql, "SELECT * FROM test1");
    }

    #[test]
    fn test_stored_procedure_call_shape() {
        let sql = CommandKind::StoredProcedure.command_sql("get_user", 2);
        assert_eq!(sql, "CALL get_user(?, ?)");

        let no_args = CommandKind::StoredProcedure.command_sql("refresh_stats", 0);
        assert_eq!(no_args, "CALL refresh_stats()");
    }

    #[test]
    fn test_params_preserve_insertion_order() {
        let params = QueryParams::new()
            .with_value("z_last", 1)
            .with_value("a_first", "two")
            .with_value("middle", true);

        assert_eq!(params.names(), vec!["z_last", "a_first", "middle"]);
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_identical_params_produce_identical_bind_shape() {
        let build = || {
            QueryParams::new()
                .with_value("id", 1)
                .with_value("name", "Ann")
        };
        let first = build();
        let second = build();

        assert_eq!(first, second);
        assert_eq!(
            CommandKind::StoredProcedure.command_sql("find_product", first.len()),
            CommandKind::StoredProcedure.command_sql("find_product", second.len()),
        );
    }

    #[test]
    fn test_params_value_coercion() {
        let params = QueryParams::new()
            .with_value("count", 5)
            .with_value("label", "row")
            .with_value("flag", false);

        let values: Vec<&SqlValue> = params.iter().map(|(_, v)| v).collect();
        assert_eq!(values, vec![&json!(5), &json!("row"), &json!(false)]);
    }
}
