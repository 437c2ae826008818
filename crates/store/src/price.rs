use crate::migrations::{check_integrity, run_migrations, schema_version};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use skintrack_core::market::entity::PriceSample;
use skintrack_core::store::error::StoreError;
use skintrack_core::store::port::{HistoryQuery, ItemRecordCount, PriceStore, StoreStatistics};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// 以固定宽度的 UTC 文本存储，保证字典序与时间序一致
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// 解析存储的时间戳；旧版无时区的 ISO-8601 文本按 UTC 处理
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

type SampleRow = (String, String, f64, f64, i64, f64, f64);

const SAMPLE_COLUMNS: &str =
    "skin, timestamp, lowest_price, median_price, volume, spread_absolute, spread_percentage";

fn row_to_sample(row: SampleRow) -> Option<PriceSample> {
    let (item, raw_ts, lowest_price, median_price, volume, spread_absolute, spread_percentage) = row;
    let Some(timestamp) = parse_timestamp(&raw_ts) else {
        warn!(item = %item, timestamp = %raw_ts, "Skipping row with unparsable timestamp");
        return None;
    };
    Some(PriceSample {
        item,
        timestamp,
        lowest_price,
        median_price,
        volume: u64::try_from(volume).unwrap_or_default(),
        spread_absolute,
        spread_percentage,
    })
}

/// # Summary
/// `PriceStore` 的 SQLite 实现，所有物品的样本写入同一个 `market_data` 表。
///
/// # Invariants
/// * 打开时已完成迁移与完整性检查。
/// * 样本只追加：每次写入一行且在独立事务中完成，已写入行由触发器禁止修改。
pub struct SqlitePriceStore {
    pool: SqlitePool,
}

impl SqlitePriceStore {
    /// 在配置的数据根目录下打开 `file_name` 数据库。
    ///
    /// # Logic
    /// 1. 确保根目录存在。
    /// 2. 调用 `open` 完成连接、迁移与检查。
    pub async fn new(file_name: &str) -> Result<Self, StoreError> {
        let root = crate::config::get_root_dir();
        if !root.exists() {
            std::fs::create_dir_all(&root).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        Self::open(&root.join(file_name)).await
    }

    /// # Summary
    /// 打开指定路径的数据库文件。
    ///
    /// # Logic
    /// 1. 配置 SQLite 连接选项：自动建库、WAL、`synchronous=NORMAL`、30 秒忙等待。
    /// 2. 执行未应用的迁移。
    /// 3. 执行完整性检查，存在空物品名或空时间戳的行时拒绝打开。
    ///
    /// # Arguments
    /// * `path` - 数据库文件路径。
    ///
    /// # Returns
    /// * `Result<Self, StoreError>` - 存储实例或初始化错误。
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|e| StoreError::InitError(e.to_string()))?;

        let version = run_migrations(&pool).await?;
        let report = check_integrity(&pool).await?;
        if report.is_critical() {
            return Err(StoreError::InitError(format!(
                "{} rows without item or timestamp",
                report.invalid_rows
            )));
        }

        info!(path = %path.display(), schema_version = version, "Price store opened");
        Ok(Self { pool })
    }

    /// 底层连接池，供诊断命令复用
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl PriceStore for SqlitePriceStore {
    /// # Summary
    /// 追加一条样本。
    ///
    /// # Logic
    /// 1. 校验字段取值。
    /// 2. 在事务内读取该物品最新时间戳，新样本不得早于它。
    /// 3. 插入一行并提交。
    async fn append(&self, sample: &PriceSample) -> Result<(), StoreError> {
        sample.validate().map_err(StoreError::Validation)?;
        let volume = i64::try_from(sample.volume)
            .map_err(|_| StoreError::Validation(format!("volume {} out of range", sample.volume)))?;

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let last: Option<String> = sqlx::query_scalar(
            "SELECT timestamp FROM market_data WHERE skin = ? ORDER BY timestamp DESC, id DESC LIMIT 1",
        )
        .bind(&sample.item)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        if let Some(last) = last.as_deref().and_then(parse_timestamp)
            && sample.timestamp < last
        {
            return Err(StoreError::Validation(format!(
                "timestamp {} precedes latest sample {} for '{}'",
                sample.timestamp, last, sample.item
            )));
        }

        sqlx::query(&format!(
            "INSERT INTO market_data ({}) VALUES (?, ?, ?, ?, ?, ?, ?)",
            SAMPLE_COLUMNS
        ))
        .bind(&sample.item)
        .bind(format_timestamp(sample.timestamp))
        .bind(sample.lowest_price)
        .bind(sample.median_price)
        .bind(volume)
        .bind(sample.spread_absolute)
        .bind(sample.spread_percentage)
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            // 触发器拦截的约束违反
            sqlx::Error::Database(db) if db.message().contains("violates value constraints") => {
                StoreError::Validation(db.message().to_string())
            }
            other => db_err(other),
        })?;

        tx.commit().await.map_err(db_err)?;
        info!(item = %sample.item, price = sample.lowest_price, "Sample persisted");
        Ok(())
    }

    async fn latest(&self, item: &str) -> Result<Option<PriceSample>, StoreError> {
        let row: Option<SampleRow> = sqlx::query_as(&format!(
            "SELECT {} FROM market_data WHERE skin = ? ORDER BY timestamp DESC, id DESC LIMIT 1",
            SAMPLE_COLUMNS
        ))
        .bind(item)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.and_then(row_to_sample))
    }

    /// # Summary
    /// 查询区间内的样本，按时间升序返回。
    ///
    /// # Logic
    /// 内层按时间倒序截取最新 `limit` 条（SQLite 中 `LIMIT -1` 表示不限），外层再恢复升序。
    async fn history(&self, item: &str, query: &HistoryQuery) -> Result<Vec<PriceSample>, StoreError> {
        let limit = query
            .limit
            .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
            .unwrap_or(-1);

        let rows: Vec<SampleRow> = sqlx::query_as(&format!(
            r#"
            SELECT {cols} FROM (
                SELECT id, {cols} FROM market_data
                WHERE skin = ?1
                  AND (?2 IS NULL OR timestamp >= ?2)
                  AND (?3 IS NULL OR timestamp <= ?3)
                ORDER BY timestamp DESC, id DESC
                LIMIT ?4
            )
            ORDER BY timestamp ASC, id ASC
            "#,
            cols = SAMPLE_COLUMNS
        ))
        .bind(item)
        .bind(query.start.map(format_timestamp))
        .bind(query.end.map(format_timestamp))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().filter_map(row_to_sample).collect())
    }

    /// 保留策略：删除早于 `cutoff` 的样本，这是唯一的删除路径
    async fn cleanup_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM market_data WHERE timestamp < ?")
            .bind(format_timestamp(cutoff))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        let removed = result.rows_affected();
        info!(removed, cutoff = %cutoff, "Old samples cleaned up");
        Ok(removed)
    }

    async fn statistics(&self) -> Result<StoreStatistics, StoreError> {
        let (total, unique, first, last): (i64, i64, Option<String>, Option<String>) =
            sqlx::query_as(
                "SELECT COUNT(*), COUNT(DISTINCT skin), MIN(timestamp), MAX(timestamp) FROM market_data",
            )
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;

        let top: Vec<(String, i64)> = sqlx::query_as(
            "SELECT skin, COUNT(*) AS records FROM market_data GROUP BY skin ORDER BY records DESC, skin ASC LIMIT 5",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(StoreStatistics {
            total_records: u64::try_from(total).unwrap_or_default(),
            unique_items: u64::try_from(unique).unwrap_or_default(),
            first_record: first.as_deref().and_then(parse_timestamp),
            last_record: last.as_deref().and_then(parse_timestamp),
            schema_version: schema_version(&self.pool).await?,
            top_items: top
                .into_iter()
                .map(|(item, records)| ItemRecordCount {
                    item,
                    records: u64::try_from(records).unwrap_or_default(),
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_text_round_trip() {
        let ts = Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap();
        let text = format_timestamp(ts);
        assert_eq!(text, "2026-10-19T10:00:00.000000Z");
        assert_eq!(parse_timestamp(&text), Some(ts));
    }

    #[test]
    fn test_parse_legacy_naive_timestamps() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-01T12:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01 12:00:00"), Some(expected));
        assert!(parse_timestamp("2024-01-01T12:00:00.250000").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
