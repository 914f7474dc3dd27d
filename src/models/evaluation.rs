use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// 最低等级
pub const MIN_LEVEL: i32 = 0;
/// 最高等级（也是缺省的等级上限）
pub const MAX_LEVEL: i32 = 4;
/// 表示"事故"的等级：LLM 判定出现了负面表现
pub const INCIDENT_LEVEL: i32 = -1;

/// 单次评估：观测等级 + 该条目的理论等级上限
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// 观测到的等级，取值 [-1, 4]
    pub level: i32,
    /// 该条目/评估标准组合的理论上限，取值 [1, 4]
    pub item_max: i32,
}

/// 规范化结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedEvaluation {
    pub evaluation: Evaluation,
    /// 原始等级为负（事故）
    pub incident: bool,
    /// 原始等级超过上限被截断
    pub clamped: bool,
}

impl Evaluation {
    /// 把原始判断转为可用于估计的评估
    ///
    /// 负数等级视为事故并截断到 0，超过上限的等级截断到上限；
    /// 上限本身限制在 [1, 4]。
    pub fn normalize(raw_level: i32, item_max: i32) -> NormalizedEvaluation {
        let item_max = item_max.clamp(1, MAX_LEVEL);
        let incident = raw_level < MIN_LEVEL;
        let clamped = raw_level > item_max;
        NormalizedEvaluation {
            evaluation: Evaluation {
                level: raw_level.clamp(MIN_LEVEL, item_max),
                item_max,
            },
            incident,
            clamped,
        }
    }
}

/// 置信区间
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

/// 能力估计结果
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AbilityEstimate {
    pub best_ability: f64,
    pub confidence_interval: ConfidenceInterval,
}

/// LLM 对单个条目给出的原始判断
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawJudgment {
    pub level: i32,
    #[serde(default)]
    pub evidence: String,
    #[serde(default)]
    pub reasoning: String,
}

/// 已归属到 (评估对象, 评估标准, 条目) 的判断
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgment {
    pub subject: String,
    pub criterion: String,
    pub item_id: String,
    pub item_max: i32,
    pub raw: RawJudgment,
}

/// 最终持久化的能力记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbilityRecord {
    pub subject: String,
    pub criterion: String,
    pub ability: f64,
    pub confidence_interval: ConfidenceInterval,
    /// 参与估计的条目数量
    pub evaluated_items: usize,
    /// 事故数量（原始等级为负）
    pub incidents: usize,
    pub evaluated_at: DateTime<Local>,
}
