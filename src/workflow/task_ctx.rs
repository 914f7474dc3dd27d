//! 任务上下文
//!
//! 封装"我正在评估谁的哪条标准下的哪个条目"这一信息

use std::fmt::Display;

use crate::models::evaluation::MAX_LEVEL;
use crate::models::{Assessment, Criterion, WorkItem};
use crate::services::PredictionCache;

/// 任务上下文
///
/// 包含处理单个 (评估对象, 标准, 条目) 所需的所有信息
#[derive(Debug, Clone)]
pub struct TaskCtx {
    /// 评估对象
    pub subject: String,

    /// 评估标准
    pub criterion: Criterion,

    /// 待评估条目
    pub item: WorkItem,

    /// 等级上限；预测阶段之前可能未知
    pub item_max: Option<i32>,
}

impl TaskCtx {
    /// 创建新的任务上下文，等级上限取输入中给定的值（如有）
    pub fn new(subject: &str, criterion: &Criterion, item: &WorkItem) -> Self {
        Self {
            subject: subject.to_string(),
            criterion: criterion.clone(),
            item: item.clone(),
            item_max: item.max_levels.get(&criterion.id).copied(),
        }
    }

    /// 展开一个评估对象的所有任务
    pub fn expand(assessment: &Assessment) -> Vec<Self> {
        assessment
            .pairs()
            .map(|(criterion, item)| Self::new(&assessment.subject, criterion, item))
            .collect()
    }

    /// 预测缓存中的键
    pub fn cache_key(&self) -> String {
        PredictionCache::key(&self.subject, &self.criterion.id, &self.item.id)
    }

    /// 用缓存补全等级上限；缓存里也没有时保持 `None`
    pub fn resolve_from(&mut self, cache: &PredictionCache) {
        if self.item_max.is_none() {
            self.item_max = cache.get(&self.cache_key());
        }
    }

    /// 最终使用的等级上限，未知时为 4
    pub fn effective_max(&self) -> i32 {
        self.item_max.unwrap_or(MAX_LEVEL)
    }
}

impl Display for TaskCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[对象 {} 标准 {} 条目 {}]",
            self.subject, self.criterion.id, self.item.id
        )
    }
}
