//! 等级上限预测缓存 - 业务能力层
//!
//! 只负责"记住每个 (评估对象, 标准, 条目) 的等级上限"，不关心预测从哪里来。
//! 缓存以 JSON 对象的形式落盘，程序启动时读取、预测阶段结束后写回。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{AppResult, FileError};

/// 等级上限预测缓存
#[derive(Debug, Clone)]
pub struct PredictionCache {
    path: PathBuf,
    entries: BTreeMap<String, i32>,
}

impl PredictionCache {
    /// 缓存键
    pub fn key(subject: &str, criterion: &str, item_id: &str) -> String {
        format!("{}::{}::{}", subject, criterion, item_id)
    }

    /// 创建空缓存
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    /// 从文件加载缓存
    ///
    /// 文件不存在时返回空缓存；内容损坏时记录警告并返回空缓存。
    pub async fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let mut cache = Self::empty(path);

        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("预测缓存不存在，使用空缓存: {}", path.display());
                return Ok(cache);
            }
            Err(e) => {
                return Err(FileError::ReadFailed {
                    path: path.display().to_string(),
                    source: e,
                }
                .into())
            }
        };

        match serde_json::from_str::<BTreeMap<String, i32>>(&text) {
            Ok(entries) => {
                info!("📂 已加载 {} 条等级上限预测", entries.len());
                cache.entries = entries;
            }
            Err(e) => warn!("⚠️ 预测缓存损坏，已忽略 ({}): {}", path.display(), e),
        }

        Ok(cache)
    }

    pub fn get(&self, key: &str) -> Option<i32> {
        self.entries.get(key).copied()
    }

    pub fn insert(&mut self, key: String, item_max: i32) {
        self.entries.insert(key, item_max);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 写回文件
    pub async fn save(&self) -> AppResult<()> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| FileError::WriteFailed {
                path: self.path.display().to_string(),
                source: e,
            })?;
        debug!("预测缓存已保存: {} 条", self.entries.len());
        Ok(())
    }
}
