//! SQLite 数据库工具：统一创建连接池并执行 sqlx 迁移
//!
//! 约定：本 crate 根目录下存在 `migrations/` 目录，存放所有迁移 SQL 文件。
//! 通过 `sqlx::migrate!()` 自动管理 schema 升级。

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use tracing::info;

/// 创建 SQLite 连接池并执行所有未执行的迁移
///
/// 内存数据库（`sqlite::memory:`）每个连接都是独立的库，调用方应将 `max_connections` 设为 1。
pub async fn create_sqlite_pool_with_migration(
    db_url: &str,
    max_connections: u32,
) -> Result<Pool<Sqlite>> {
    info!("[DB] 🔗 打开本地数据库: {}", db_url);
    let options = SqliteConnectOptions::from_str(db_url)
        .with_context(|| format!("解析数据库地址失败: {db_url}"))?
        .create_if_missing(true);
    // 内存库的连接一旦回收数据就丢失，不设置空闲回收
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .with_context(|| format!("连接SQLite数据库失败: {db_url}"))?;

    // 从 `migrations/` 目录读取迁移并执行
    sqlx::migrate!()
        .run(&pool)
        .await
        .context("执行数据库迁移失败")?;

    Ok(pool)
}
