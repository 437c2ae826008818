use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use skintrack_core::store::error::StoreError;
use skintrack_core::watchlist::entity::WatchlistSnapshot;
use skintrack_core::watchlist::port::WatchlistSource;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// # Summary
/// 基于 JSON 文件的自选列表与告警阈值存储。
///
/// # Invariants
/// - `watchlist.json` 为物品名数组，`alerts.json` 为 物品名 -> 目标价 的对象。
/// - 文件不存在视为空；内容损坏返回 `StoreError::Io`，不会被覆盖。
/// - 写操作串行执行，读-改-写之间不会交错。
pub struct JsonWatchlistStore {
    watchlist_path: PathBuf,
    alerts_path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonWatchlistStore {
    pub fn new(watchlist_path: impl Into<PathBuf>, alerts_path: impl Into<PathBuf>) -> Self {
        Self {
            watchlist_path: watchlist_path.into(),
            alerts_path: alerts_path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// # Summary
    /// 添加物品到自选列表末尾。
    ///
    /// # Logic
    /// 1. 去除首尾空白，空名称拒绝。
    /// 2. 忽略大小写的重复检查，重复时返回 `false`。
    /// 3. 追加并写回文件。
    ///
    /// # Returns
    /// 新增成功返回 `true`，已存在返回 `false`。
    pub async fn add_item(&self, item: &str) -> Result<bool, StoreError> {
        let item = item.trim();
        if item.is_empty() {
            return Err(StoreError::Validation("item name is empty".into()));
        }

        let _guard = self.write_lock.lock().await;
        let mut items = self.load_items().await?;
        let lowered = item.to_lowercase();
        if items.iter().any(|existing| existing.to_lowercase() == lowered) {
            return Ok(false);
        }

        items.push(item.to_string());
        write_json(&self.watchlist_path, &items).await?;
        info!(item = %item, "Item added to watchlist");
        Ok(true)
    }

    /// 从自选列表移除物品（忽略大小写），返回是否存在；阈值保持不变
    pub async fn remove_item(&self, item: &str) -> Result<bool, StoreError> {
        let item = item.trim();
        let _guard = self.write_lock.lock().await;
        let mut items = self.load_items().await?;
        let key = item.to_lowercase();
        let before = items.len();
        items.retain(|existing| existing.to_lowercase() != key);
        if items.len() == before {
            return Ok(false);
        }

        write_json(&self.watchlist_path, &items).await?;
        info!(item = %item, "Item removed from watchlist");
        Ok(true)
    }

    /// 设置物品的目标价，要求有限且非负
    pub async fn set_threshold(&self, item: &str, price: f64) -> Result<(), StoreError> {
        let item = item.trim();
        if item.is_empty() {
            return Err(StoreError::Validation("item name is empty".into()));
        }
        if !price.is_finite() || price < 0.0 {
            return Err(StoreError::Validation(format!("invalid threshold {}", price)));
        }

        let _guard = self.write_lock.lock().await;
        let mut alerts = self.load_alerts().await?;
        alerts.insert(item.to_string(), price);
        write_json(&self.alerts_path, &sorted(&alerts)).await?;
        info!(item = %item, threshold = price, "Alert threshold set");
        Ok(())
    }

    /// 清除物品的目标价，返回此前是否设置过
    pub async fn clear_threshold(&self, item: &str) -> Result<bool, StoreError> {
        let item = item.trim();
        let _guard = self.write_lock.lock().await;
        let mut alerts = self.load_alerts().await?;
        if alerts.remove(item).is_none() {
            return Ok(false);
        }

        write_json(&self.alerts_path, &sorted(&alerts)).await?;
        info!(item = %item, "Alert threshold cleared");
        Ok(true)
    }

    /// 读取物品列表：跳过空白名称与重复项，保持文件中的顺序
    async fn load_items(&self) -> Result<Vec<String>, StoreError> {
        let raw: Vec<String> = read_json(&self.watchlist_path).await?.unwrap_or_default();
        let mut items: Vec<String> = Vec::with_capacity(raw.len());
        for name in raw {
            let name = name.trim();
            if name.is_empty() || items.iter().any(|existing| existing == name) {
                continue;
            }
            items.push(name.to_string());
        }
        Ok(items)
    }

    async fn load_alerts(&self) -> Result<HashMap<String, f64>, StoreError> {
        let raw: HashMap<String, f64> = read_json(&self.alerts_path).await?.unwrap_or_default();
        Ok(raw
            .into_iter()
            .filter(|(item, price)| {
                let keep = price.is_finite() && *price >= 0.0;
                if !keep {
                    warn!(item = %item, threshold = price, "Ignoring invalid alert threshold");
                }
                keep
            })
            .collect())
    }
}

#[async_trait]
impl WatchlistSource for JsonWatchlistStore {
    async fn snapshot(&self) -> Result<WatchlistSnapshot, StoreError> {
        let items = self.load_items().await?;
        let thresholds = self.load_alerts().await?;
        Ok(WatchlistSnapshot::new(items, thresholds))
    }
}

/// 按键排序后写出，便于人工编辑与比对
fn sorted(alerts: &HashMap<String, f64>) -> BTreeMap<&str, f64> {
    alerts.iter().map(|(k, v)| (k.as_str(), *v)).collect()
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::Io(format!("{}: {}", path.display(), e))),
    };
    if content.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| StoreError::Io(format!("{} is corrupt: {}", path.display(), e)))
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let content = serde_json::to_string_pretty(value).map_err(|e| StoreError::Io(e.to_string()))?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::Io(format!("{}: {}", parent.display(), e)))?;
    }

    // 先写临时文件再改名，中途失败不会留下截断的文件
    let tmp = temp_path(path);
    tokio::fs::write(&tmp, content)
        .await
        .map_err(|e| StoreError::Io(format!("{}: {}", tmp.display(), e)))?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
            warn!(path = %tmp.display(), "Failed to remove temp file: {}", cleanup);
        }
        return Err(StoreError::Io(format!("{}: {}", path.display(), e)));
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
