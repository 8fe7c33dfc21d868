//! 상품 조회 진단 스크립트
//!
//! test1 테이블을 조회해서 상품 목록과 전체 개수를 출력합니다.

use anyhow::Result;
use dbservice::{CommandExecutor, CommandKind, DbConfig, IsolationLevel, QueryParams};
use sqlx::Row;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug)]
struct Product {
    id: i32,
    first_name: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 로깅 초기화
    let filter = EnvFilter::from_default_env()
        .add_directive("info".parse().map_err(|e| anyhow::anyhow!("로깅 설정 파싱 실패: {e}"))?);
    fmt().with_env_filter(filter).init();

    let config = DbConfig::from_env();
    let executor = CommandExecutor::from_config(&config);

    let products = executor
        .execute_reader_with(
            CommandKind::Text,
            "SELECT * FROM test1",
            IsolationLevel::default(),
            |row| {
                Ok(Some(Product {
                    id: row.try_get("Id")?,
                    first_name: row.try_get("Name")?,
                }))
            },
            QueryParams::new(),
        )
        .await?;

    info!("{}개의 상품을 읽었습니다.", products.len());
    for product in &products {
        println!("{:>6}  {}", product.id, product.first_name);
    }

    let total = executor
        .execute_scalar_with(
            CommandKind::Text,
            "SELECT COUNT(*) FROM test1",
            IsolationLevel::default(),
            QueryParams::new(),
        )
        .await?;

    println!("Total Products: {}", total.unwrap_or(serde_json::Value::Null));

    Ok(())
}
