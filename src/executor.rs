//! 명령 실행 모듈
//!
//! 연결 획득, 트랜잭션 처리, 타임아웃, 결과 매핑을 담당.
//! 세 가지 실행 형태(reader/non-query/scalar)는 하나의 공용 실행
//! 루틴을 공유합니다.

use crate::config::DbConfig;
use crate::error::DbError;
use crate::types::{CommandKind, CommandShape, IsolationLevel, QueryParams, QueryRow, SqlValue};
use sqlx::mysql::{MySqlArguments, MySqlColumn, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, Connection, MySql, MySqlConnection, Row, TypeInfo};
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, error, warn};

/// Commands slower than this are logged at warn level.
const SLOW_COMMAND_THRESHOLD: Duration = Duration::from_secs(2);

/// 데이터베이스 명령 실행기
///
/// 실행마다 새 연결을 열고, 단일 트랜잭션 안에서 명령을 수행한 뒤
/// 연결을 해제합니다. 설정은 생성 시점에 고정되며 호출 간에 공유
/// 상태가 없으므로 동시 호출이 안전합니다.
pub struct CommandExecutor {
    /// 연결 문자열
    database_url: String,

    /// 명령 타임아웃 기준값
    command_timeout: Duration,
}

impl CommandExecutor {
    /// 새 명령 실행기 생성
    pub fn new(database_url: impl Into<String>, command_timeout_secs: u64) -> Self {
        Self {
            database_url: database_url.into(),
            command_timeout: Duration::from_secs(command_timeout_secs),
        }
    }

    /// 설정에서 명령 실행기 생성
    pub fn from_config(config: &DbConfig) -> Self {
        Self {
            database_url: config.database_url().to_string(),
            command_timeout: config.command_timeout,
        }
    }

    /// Execute a row-returning command with default kind and isolation
    /// (stored procedure, READ UNCOMMITTED).
    ///
    /// The transform runs once per row in row order; `Ok(None)` results are
    /// dropped from the output.
    pub async fn execute_reader<T, F>(
        &self,
        command_text: &str,
        transform: F,
        params: QueryParams,
    ) -> Result<Vec<T>, DbError>
    where
        T: Send,
        F: FnMut(&MySqlRow) -> Result<Option<T>, DbError> + Send,
    {
        self.execute_reader_with(
            CommandKind::default(),
            command_text,
            IsolationLevel::default(),
            transform,
            params,
        )
        .await
    }

    /// Execute a row-returning command, fully parameterized.
    ///
    /// The reader runs the same connect → isolation → begin → body →
    /// commit/rollback routine as [`Self::within_transaction`], inlined
    /// here because the row transform may borrow caller state and so
    /// cannot be erased through that routine's `'static` boxed future.
    pub async fn execute_reader_with<T, F>(
        &self,
        kind: CommandKind,
        command_text: &str,
        isolation: IsolationLevel,
        mut transform: F,
        params: QueryParams,
    ) -> Result<Vec<T>, DbError>
    where
        T: Send,
        F: FnMut(&MySqlRow) -> Result<Option<T>, DbError> + Send,
    {
        let sql = kind.command_sql(command_text, params.len());
        let shape = CommandShape::Reader;
        let started = Instant::now();
        debug!("executing {} command: {}", shape.as_str(), command_text);

        let mut conn = MySqlConnection::connect(&self.database_url)
            .await
            .map_err(|e| DbError::Connection(format!("connection open failed: {e}")))?;

        // applies to the next transaction begun on this session
        sqlx::query(&format!(
            "SET TRANSACTION ISOLATION LEVEL {}",
            isolation.as_str()
        ))
        .execute(&mut conn)
        .await?;

        let mut tx = conn.begin().await?;

        // the wire deadline is double the configured command timeout
        let deadline = self.command_timeout * 2;
        let body = async {
            let rows = bind_params(sqlx::query(&sql), &params)
                .fetch_all(&mut *tx)
                .await?;
            let mapped = collect_mapped(&rows, &mut transform)?;
            debug!("reader mapped {} of {} rows", mapped.len(), rows.len());
            Ok::<Vec<T>, DbError>(mapped)
        };
        let result = match timeout(deadline, body).await {
            Ok(result) => result,
            Err(_) => Err(DbError::Execution(format!(
                "{} command timed out after {:?}",
                shape.as_str(),
                deadline
            ))),
        };

        match result {
            Ok(value) => {
                tx.commit()
                    .await
                    .map_err(|e| DbError::Transaction(format!("commit failed: {e}")))?;

                let elapsed = started.elapsed();
                if elapsed > SLOW_COMMAND_THRESHOLD {
                    warn!(
                        "{} command took {:?}: {}",
                        shape.as_str(),
                        elapsed,
                        truncated(command_text)
                    );
                }
                debug!("{} command completed in {:?}", shape.as_str(), elapsed);

                conn.close().await.ok();
                Ok(value)
            }
            Err(err) => {
                match tx.rollback().await {
                    Ok(()) => warn!("transaction rolled back: {}", err),
                    // the command failure wins; the rollback failure is only logged
                    Err(rollback_err) => {
                        error!("rollback failed after '{}': {}", err, rollback_err)
                    }
                }
                Err(err)
            }
        }
    }

    /// Execute a mutation with default kind and isolation, returning the
    /// affected-row count.
    pub async fn execute_non_query(
        &self,
        command_text: &str,
        params: QueryParams,
    ) -> Result<u64, DbError> {
        self.execute_non_query_with(
            CommandKind::default(),
            command_text,
            IsolationLevel::default(),
            params,
        )
        .await
    }

    /// Execute a mutation, fully parameterized.
    pub async fn execute_non_query_with(
        &self,
        kind: CommandKind,
        command_text: &str,
        isolation: IsolationLevel,
        params: QueryParams,
    ) -> Result<u64, DbError> {
        let sql = kind.command_sql(command_text, params.len());
        self.within_transaction(CommandShape::NonQuery, command_text, isolation, move |conn| {
            Box::pin(async move {
                let done = bind_params(sqlx::query(&sql), &params)
                    .execute(&mut *conn)
                    .await?;
                Ok(done.rows_affected())
            })
        })
        .await
    }

    /// Execute a single-value command with default kind and isolation.
    ///
    /// Returns the first column of the first row, or `None` when the
    /// command produces no row.
    pub async fn execute_scalar(
        &self,
        command_text: &str,
        params: QueryParams,
    ) -> Result<Option<SqlValue>, DbError> {
        self.execute_scalar_with(
            CommandKind::default(),
            command_text,
            IsolationLevel::default(),
            params,
        )
        .await
    }

    /// Execute a single-value command, fully parameterized.
    pub async fn execute_scalar_with(
        &self,
        kind: CommandKind,
        command_text: &str,
        isolation: IsolationLevel,
        params: QueryParams,
    ) -> Result<Option<SqlValue>, DbError> {
        let sql = kind.command_sql(command_text, params.len());
        self.within_transaction(CommandShape::Scalar, command_text, isolation, move |conn| {
            Box::pin(async move {
                let row = bind_params(sqlx::query(&sql), &params)
                    .fetch_optional(&mut *conn)
                    .await?;
                Ok(row.as_ref().and_then(scalar_value))
            })
        })
        .await
    }

    /// 공용 실행 루틴
    ///
    /// 연결 열기 → 격리 수준 적용 → 트랜잭션 시작 → 형태별 본문 실행
    /// → 커밋 또는 롤백 → 연결 해제. 모든 실행 형태가 이 경로를
    /// 거칩니다.
    async fn within_transaction<R, F>(
        &self,
        shape: CommandShape,
        command_text: &str,
        isolation: IsolationLevel,
        op: F,
    ) -> Result<R, DbError>
    where
        R: Send,
        F: for<'c> FnOnce(
                &'c mut MySqlConnection,
            ) -> Pin<Box<dyn Future<Output = Result<R, DbError>> + Send + 'c>>
            + Send,
    {
        let started = Instant::now();
        debug!("executing {} command: {}", shape.as_str(), command_text);

        let mut conn = MySqlConnection::connect(&self.database_url)
            .await
            .map_err(|e| DbError::Connection(format!("connection open failed: {e}")))?;

        // applies to the next transaction begun on this session
        sqlx::query(&format!(
            "SET TRANSACTION ISOLATION LEVEL {}",
            isolation.as_str()
        ))
        .execute(&mut conn)
        .await?;

        let mut tx = conn.begin().await?;

        // the wire deadline is double the configured command timeout
        let deadline = self.command_timeout * 2;
        let result = match timeout(deadline, op(&mut *tx)).await {
            Ok(result) => result,
            Err(_) => Err(DbError::Execution(format!(
                "{} command timed out after {:?}",
                shape.as_str(),
                deadline
            ))),
        };

        match result {
            Ok(value) => {
                tx.commit()
                    .await
                    .map_err(|e| DbError::Transaction(format!("commit failed: {e}")))?;

                let elapsed = started.elapsed();
                if elapsed > SLOW_COMMAND_THRESHOLD {
                    warn!(
                        "{} command took {:?}: {}",
                        shape.as_str(),
                        elapsed,
                        truncated(command_text)
                    );
                }
                debug!("{} command completed in {:?}", shape.as_str(), elapsed);

                conn.close().await.ok();
                Ok(value)
            }
            Err(err) => {
                match tx.rollback().await {
                    Ok(()) => warn!("transaction rolled back: {}", err),
                    // the command failure wins; the rollback failure is only logged
                    Err(rollback_err) => {
                        error!("rollback failed after '{}': {}", err, rollback_err)
                    }
                }
                Err(err)
            }
        }
    }
}

/// Bind parameters to a query in insertion order.
fn bind_params<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &'q QueryParams,
) -> Query<'q, MySql, MySqlArguments> {
    for (_, value) in params.iter() {
        query = match value {
            SqlValue::String(s) => query.bind(s.clone()),
            SqlValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    query.bind(i)
                } else if let Some(f) = n.as_f64() {
                    query.bind(f)
                } else {
                    query.bind(n.to_string())
                }
            }
            SqlValue::Bool(b) => query.bind(*b),
            SqlValue::Null => query.bind(Option::<String>::None),
            other => query.bind(other.to_string()),
        };
    }
    query
}

/// Apply the transform to each row in order, keeping non-`None` results.
///
/// The first transform error aborts the whole collection and propagates
/// unchanged.
fn collect_mapped<R, T, F>(rows: &[R], transform: &mut F) -> Result<Vec<T>, DbError>
where
    F: FnMut(&R) -> Result<Option<T>, DbError>,
{
    let mut mapped = Vec::with_capacity(rows.len());
    for row in rows {
        if let Some(item) = transform(row)? {
            mapped.push(item);
        }
    }
    Ok(mapped)
}

/// First column of a row as a generic value, `None` for a column-less row.
fn scalar_value(row: &MySqlRow) -> Option<SqlValue> {
    row.columns().first().map(|column| decode_column(row, column))
}

/// Convert a database row into a generic key-value map.
///
/// Ready-made reader transform for callers without a typed record:
/// `|row| Ok(Some(row_to_map(row)))`. Columns that fail to decode come
/// back as `Null`.
pub fn row_to_map(row: &MySqlRow) -> QueryRow {
    row.columns()
        .iter()
        .map(|column| (column.name().to_string(), decode_column(row, column)))
        .collect()
}

fn decode_column(row: &MySqlRow, column: &MySqlColumn) -> SqlValue {
    let ordinal = column.ordinal();

    match column.type_info().name() {
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => row
            .try_get::<Option<i64>, _>(ordinal)
            .ok()
            .flatten()
            .map(|v| SqlValue::Number(serde_json::Number::from(v)))
            .unwrap_or(SqlValue::Null),
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => row
            .try_get::<Option<u64>, _>(ordinal)
            .ok()
            .flatten()
            .map(|v| SqlValue::Number(serde_json::Number::from(v)))
            .unwrap_or(SqlValue::Null),
        "FLOAT" | "DOUBLE" => row
            .try_get::<Option<f64>, _>(ordinal)
            .ok()
            .flatten()
            .and_then(serde_json::Number::from_f64)
            .map(SqlValue::Number)
            .unwrap_or(SqlValue::Null),
        "BOOLEAN" => row
            .try_get::<Option<bool>, _>(ordinal)
            .ok()
            .flatten()
            .map(SqlValue::Bool)
            .unwrap_or(SqlValue::Null),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(ordinal)
            .ok()
            .flatten()
            .map(|v| SqlValue::String(v.to_string()))
            .unwrap_or(SqlValue::Null),
        "DATETIME" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(ordinal)
            .ok()
            .flatten()
            .map(|v| SqlValue::String(v.to_string()))
            .unwrap_or(SqlValue::Null),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(ordinal)
            .ok()
            .flatten()
            .map(|v| SqlValue::String(v.to_string()))
            .unwrap_or(SqlValue::Null),
        _ => row
            .try_get::<Option<String>, _>(ordinal)
            .ok()
            .flatten()
            .map(SqlValue::String)
            .unwrap_or(SqlValue::Null),
    }
}

fn truncated(command_text: &str) -> String {
    command_text.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_mapped_preserves_row_order() {
        let rows = vec![10, 20, 30];
        let mapped = collect_mapped(&rows, &mut |row: &i32| Ok(Some(row * 2)))
            .expect("mapping should succeed");
        assert_eq!(mapped, vec![20, 40, 60]);
    }

    #[test]
    fn test_collect_mapped_drops_none_results() {
        let rows = vec![1, 2, 3, 4, 5];
        let mapped = collect_mapped(&rows, &mut |row: &i32| {
            Ok((row % 2 == 1).then_some(*row))
        })
        .expect("mapping should succeed");
        assert_eq!(mapped, vec![1, 3, 5]);
    }

    #[test]
    fn test_collect_mapped_propagates_transform_error_unchanged() {
        let rows = vec![1, 2, 3];
        let mut seen = Vec::new();
        let result = collect_mapped(&rows, &mut |row: &i32| {
            seen.push(*row);
            if *row == 2 {
                Err(DbError::Transform("bad row".to_string()))
            } else {
                Ok(Some(*row))
            }
        });

        match result {
            Err(DbError::Transform(msg)) => assert_eq!(msg, "bad row"),
            other => panic!("expected transform error, got {other:?}"),
        }
        // mapping stops at the failing row
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn test_truncated_caps_long_command_text() {
        let long = "x".repeat(500);
        assert_eq!(truncated(&long).len(), 200);
        assert_eq!(truncated("short"), "short");
    }
}
