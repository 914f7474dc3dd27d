use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 评估标准
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Criterion {
    pub id: String,
    pub description: String,
}

/// 待评估的条目（一段工作产出、一次讨论记录等）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub content: String,
    /// 仅对这些标准生效；为空表示对所有标准生效
    #[serde(default)]
    pub criteria: Vec<String>,
    /// 已知的等级上限（标准 id → 上限）
    #[serde(default)]
    pub max_levels: HashMap<String, i32>,
}

impl WorkItem {
    /// 该条目是否参与某个标准的评估
    pub fn applies_to(&self, criterion_id: &str) -> bool {
        self.criteria.is_empty() || self.criteria.iter().any(|c| c == criterion_id)
    }
}

/// 一个评估对象的全部输入（对应一个 TOML 文件）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assessment {
    pub subject: String,
    #[serde(default)]
    pub criteria: Vec<Criterion>,
    #[serde(default)]
    pub items: Vec<WorkItem>,
    #[serde(skip_serializing, skip_deserializing)]
    pub file_path: Option<String>,
}

impl Assessment {
    /// 所有 (标准, 条目) 组合
    pub fn pairs(&self) -> impl Iterator<Item = (&Criterion, &WorkItem)> {
        self.criteria.iter().flat_map(move |criterion| {
            self.items
                .iter()
                .filter(move |item| item.applies_to(&criterion.id))
                .map(move |item| (criterion, item))
        })
    }
}
