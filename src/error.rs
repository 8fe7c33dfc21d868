//! Command execution error taxonomy
//!
//! Classifies every failure of the execution pipeline into one of five
//! kinds so callers can decide on retry and translation policy. The
//! executor itself performs no recovery; errors propagate unchanged.

use thiserror::Error;

/// Errors produced by the command executor
#[derive(Error, Debug, Clone)]
pub enum DbError {
    /// Failure to open or authenticate a database connection
    #[error("connection failed: {0}")]
    Connection(String),

    /// Malformed command text or parameter/placeholder mismatch
    #[error("command preparation failed: {0}")]
    Preparation(String),

    /// Runtime failure while the command executed (constraint violation,
    /// deadlock, timeout expiry)
    #[error("command execution failed: {0}")]
    Execution(String),

    /// The row transform failed while mapping a row
    #[error("row transform failed: {0}")]
    Transform(String),

    /// Commit or rollback itself failed
    #[error("transaction failed: {0}")]
    Transaction(String),
}

// MySQL reports syntax errors under this SQLSTATE class.
const SQLSTATE_SYNTAX_ERROR: &str = "42000";

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(e) => DbError::Connection(e.to_string()),
            sqlx::Error::Tls(e) => DbError::Connection(e.to_string()),
            sqlx::Error::Configuration(e) => DbError::Connection(e.to_string()),
            sqlx::Error::PoolTimedOut => {
                DbError::Connection("connection pool timed out".to_string())
            }
            sqlx::Error::PoolClosed => {
                DbError::Connection("connection pool is closed".to_string())
            }
            sqlx::Error::Protocol(msg) => DbError::Preparation(msg),
            sqlx::Error::ColumnNotFound(name) => {
                DbError::Transform(format!("column '{name}' not found"))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::Transform(format!(
                "column index {index} out of bounds ({len} columns)"
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::Transform(format!("column {index} decode failed: {source}"))
            }
            sqlx::Error::TypeNotFound { type_name } => {
                DbError::Transform(format!("type '{type_name}' not found"))
            }
            sqlx::Error::Decode(e) => DbError::Transform(e.to_string()),
            sqlx::Error::RowNotFound => DbError::Execution("no rows returned".to_string()),
            sqlx::Error::Database(e) => {
                if e.code().as_deref() == Some(SQLSTATE_SYNTAX_ERROR) {
                    DbError::Preparation(e.to_string())
                } else {
                    DbError::Execution(e.to_string())
                }
            }
            other => DbError::Execution(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_failures_classified() {
        let io = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(matches!(DbError::from(io), DbError::Connection(_)));
        assert!(matches!(
            DbError::from(sqlx::Error::PoolClosed),
            DbError::Connection(_)
        ));
    }

    #[test]
    fn test_column_failures_map_to_transform() {
        let err = DbError::from(sqlx::Error::ColumnNotFound("Name".to_string()));
        assert!(matches!(err, DbError::Transform(_)));

        let err = DbError::from(sqlx::Error::ColumnIndexOutOfBounds { index: 3, len: 2 });
        assert!(matches!(err, DbError::Transform(_)));
    }

    #[test]
    fn test_protocol_mismatch_maps_to_preparation() {
        let err = DbError::from(sqlx::Error::Protocol("wrong parameter count".to_string()));
        assert!(matches!(err, DbError::Preparation(_)));
    }

    #[test]
    fn test_row_not_found_maps_to_execution() {
        let err = DbError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, DbError::Execution(_)));
    }

    #[test]
    fn test_display_carries_cause() {
        let err = DbError::Connection("access denied".to_string());
        assert_eq!(err.to_string(), "connection failed: access denied");
    }
}
