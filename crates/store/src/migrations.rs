//! `market_data` 表的版本化迁移与启动完整性检查。

use crate::price::{format_timestamp, parse_timestamp};
use chrono::Utc;
use skintrack_core::store::error::StoreError;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, warn};

/// 当前代码支持的最高 schema 版本
pub const LATEST_VERSION: u32 = 4;

const MIGRATIONS: &[(u32, &str)] = &[
    (1, "base market_data table"),
    (2, "market depth columns, median backfill and lookup indexes"),
    (3, "value constraint and immutability triggers"),
    (4, "canonical UTC timestamp text"),
];

const CREATE_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL,
    description TEXT NOT NULL
);
"#;

const CREATE_MARKET_DATA: &str = r#"
CREATE TABLE IF NOT EXISTS market_data (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    skin TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    lowest_price REAL NOT NULL
);
"#;

// v2 补齐的列：(列名, 类型)
const DEPTH_COLUMNS: &[(&str, &str)] = &[
    ("median_price", "REAL"),
    ("volume", "INTEGER"),
    ("spread_absolute", "REAL"),
    ("spread_percentage", "REAL"),
];

const BACKFILL_AND_INDEX: &str = r#"
UPDATE market_data SET median_price = lowest_price
WHERE median_price = 0 AND lowest_price > 0;
CREATE INDEX IF NOT EXISTS idx_market_data_skin_timestamp ON market_data (skin, timestamp);
CREATE INDEX IF NOT EXISTS idx_market_data_timestamp ON market_data (timestamp);
"#;

const CREATE_CHECK_TRIGGER: &str = r#"
CREATE TRIGGER IF NOT EXISTS market_data_check_insert
BEFORE INSERT ON market_data
FOR EACH ROW
WHEN trim(NEW.skin) = ''
  OR NEW.lowest_price < 0
  OR NEW.median_price < 0
  OR NEW.volume < 0
  OR NEW.spread_absolute < 0
  OR NEW.spread_percentage < 0
  OR (NEW.median_price <> 0 AND NEW.median_price < NEW.lowest_price)
BEGIN
    SELECT RAISE(ABORT, 'market_data: sample violates value constraints');
END;
"#;

const CREATE_IMMUTABLE_TRIGGER: &str = r#"
CREATE TRIGGER IF NOT EXISTS market_data_immutable
BEFORE UPDATE ON market_data
BEGIN
    SELECT RAISE(ABORT, 'market_data: samples are immutable');
END;
"#;

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

/// # Summary
/// 读取已应用的最高 schema 版本，未初始化时为 0。
pub async fn schema_version(pool: &SqlitePool) -> Result<u32, StoreError> {
    sqlx::raw_sql(CREATE_VERSION_TABLE)
        .execute(pool)
        .await
        .map_err(db_err)?;

    let version: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_version")
        .fetch_one(pool)
        .await
        .map_err(db_err)?;

    u32::try_from(version)
        .map_err(|_| StoreError::InitError(format!("invalid schema version {}", version)))
}

/// # Summary
/// 依次执行尚未应用的迁移。
///
/// # Logic
/// 1. 读取当前版本，高于 `LATEST_VERSION` 时拒绝打开。
/// 2. 每个迁移在独立事务中执行并写入 `schema_version`。
/// 3. 旧版无版本表的数据库从 v1 开始补齐，建表语句幂等。
///
/// # Returns
/// 迁移完成后的 schema 版本。
pub async fn run_migrations(pool: &SqlitePool) -> Result<u32, StoreError> {
    let current = schema_version(pool).await?;
    if current > LATEST_VERSION {
        return Err(StoreError::InitError(format!(
            "database schema v{} is newer than supported v{}",
            current, LATEST_VERSION
        )));
    }

    for &(version, description) in MIGRATIONS.iter().filter(|(v, _)| *v > current) {
        info!(version, description, "Running migration");
        let mut tx = pool.begin().await.map_err(db_err)?;

        apply(&mut tx, version).await?;

        sqlx::query("INSERT INTO schema_version (version, applied_at, description) VALUES (?, ?, ?)")
            .bind(i64::from(version))
            .bind(Utc::now().to_rfc3339())
            .bind(description)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
    }

    if current < LATEST_VERSION {
        info!(from = current, to = LATEST_VERSION, "Database migrations completed");
    }
    Ok(LATEST_VERSION)
}

async fn apply(conn: &mut SqliteConnection, version: u32) -> Result<(), StoreError> {
    match version {
        1 => {
            sqlx::raw_sql(CREATE_MARKET_DATA)
                .execute(&mut *conn)
                .await
                .map_err(db_err)?;
        }
        2 => {
            let existing: Vec<String> =
                sqlx::query_scalar("SELECT name FROM pragma_table_info('market_data')")
                    .fetch_all(&mut *conn)
                    .await
                    .map_err(db_err)?;

            for (column, kind) in DEPTH_COLUMNS {
                if existing.iter().any(|c| c == column) {
                    continue;
                }
                info!(column, "Adding column to market_data");
                sqlx::raw_sql(&format!(
                    "ALTER TABLE market_data ADD COLUMN {} {} NOT NULL DEFAULT 0",
                    column, kind
                ))
                .execute(&mut *conn)
                .await
                .map_err(db_err)?;
            }

            sqlx::raw_sql(BACKFILL_AND_INDEX)
                .execute(&mut *conn)
                .await
                .map_err(db_err)?;
        }
        3 => {
            for sql in [CREATE_CHECK_TRIGGER, CREATE_IMMUTABLE_TRIGGER] {
                sqlx::raw_sql(sql).execute(&mut *conn).await.map_err(db_err)?;
            }
        }
        4 => {
            // 规范化需要改写已有行，期间临时移除不可变触发器
            sqlx::raw_sql("DROP TRIGGER IF EXISTS market_data_immutable")
                .execute(&mut *conn)
                .await
                .map_err(db_err)?;
            normalize_timestamps(conn).await?;
            sqlx::raw_sql(CREATE_IMMUTABLE_TRIGGER)
                .execute(&mut *conn)
                .await
                .map_err(db_err)?;
        }
        other => {
            return Err(StoreError::InitError(format!("unknown migration v{}", other)));
        }
    }
    Ok(())
}

/// # Summary
/// 将旧版时间戳文本改写为规范的 `%.6fZ` UTC 形式。
///
/// # Logic
/// 1. 逐行解析时间戳，已是规范形式的跳过。
/// 2. 无法解析的行保持原样，由完整性检查报告。
///
/// # Invariants
/// - 迁移后所有可解析的时间戳按文本排序与按时间排序一致。
async fn normalize_timestamps(conn: &mut SqliteConnection) -> Result<(), StoreError> {
    let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, timestamp FROM market_data")
        .fetch_all(&mut *conn)
        .await
        .map_err(db_err)?;

    let mut rewritten = 0u64;
    let mut skipped = 0u64;
    for (id, raw) in rows {
        let Some(parsed) = parse_timestamp(&raw) else {
            skipped += 1;
            continue;
        };
        let canonical = format_timestamp(parsed);
        if canonical == raw {
            continue;
        }
        sqlx::query("UPDATE market_data SET timestamp = ? WHERE id = ?")
            .bind(&canonical)
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(db_err)?;
        rewritten += 1;
    }

    if rewritten > 0 {
        info!(rows = rewritten, "Legacy timestamps normalized");
    }
    if skipped > 0 {
        warn!(rows = skipped, "Timestamps left unchanged because they cannot be parsed");
    }
    Ok(())
}

/// # Summary
/// 完整性检查结果。
///
/// # Invariants
/// - `invalid_rows` 非 0 视为严重问题，数据库拒绝打开。
/// - 重复的 (物品, 时间戳) 与无法解析的时间戳只产生警告。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    pub invalid_rows: u64,
    pub duplicate_pairs: u64,
    pub unparsable_timestamps: u64,
}

impl IntegrityReport {
    pub fn is_critical(&self) -> bool {
        self.invalid_rows > 0
    }
}

/// # Summary
/// 检查已有数据的完整性并记录发现的问题。
///
/// # Logic
/// 1. 统计物品名或时间戳为空的行。
/// 2. 统计重复的 (物品, 时间戳) 组合。
/// 3. 统计无法解析的时间戳。
pub async fn check_integrity(pool: &SqlitePool) -> Result<IntegrityReport, StoreError> {
    let invalid: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM market_data WHERE skin IS NULL OR trim(skin) = '' OR timestamp IS NULL OR trim(timestamp) = ''",
    )
    .fetch_one(pool)
    .await
    .map_err(db_err)?;

    let duplicates: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM (SELECT 1 FROM market_data GROUP BY skin, timestamp HAVING COUNT(*) > 1)",
    )
    .fetch_one(pool)
    .await
    .map_err(db_err)?;

    let timestamps: Vec<String> =
        sqlx::query_scalar("SELECT DISTINCT timestamp FROM market_data WHERE trim(timestamp) <> ''")
            .fetch_all(pool)
            .await
            .map_err(db_err)?;
    let unparsable = timestamps
        .iter()
        .filter(|ts| parse_timestamp(ts).is_none())
        .count();

    let report = IntegrityReport {
        invalid_rows: u64::try_from(invalid).unwrap_or_default(),
        duplicate_pairs: u64::try_from(duplicates).unwrap_or_default(),
        unparsable_timestamps: u64::try_from(unparsable).unwrap_or(u64::MAX),
    };

    if report.invalid_rows > 0 {
        warn!(rows = report.invalid_rows, "market_data contains rows without item or timestamp");
    }
    if report.duplicate_pairs > 0 {
        warn!(pairs = report.duplicate_pairs, "market_data contains duplicate (item, timestamp) pairs");
    }
    if report.unparsable_timestamps > 0 {
        warn!(count = report.unparsable_timestamps, "market_data contains unparsable timestamps");
    }
    Ok(report)
}
