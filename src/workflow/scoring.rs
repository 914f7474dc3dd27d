//! 评分流程 - 流程层
//!
//! 把一个 (评估对象, 标准) 下的全部判断规范化后交给能力估计器，生成能力记录。
//! 没有任何判断的标准同样会生成记录（先验众数，全区间置信区间）。

use tracing::{debug, info, warn};

use crate::estimator::{estimate, EstimatorOptions};
use crate::models::{AbilityRecord, Assessment, Evaluation, Judgment};

/// 为单个 (评估对象, 标准) 生成能力记录
///
/// # 参数
/// - `judgments`: 只包含该评估对象、该标准下的判断
pub fn score_criterion(
    subject: &str,
    criterion: &str,
    judgments: &[&Judgment],
    options: &EstimatorOptions,
) -> AbilityRecord {
    let mut incidents = 0;
    let evaluations: Vec<Evaluation> = judgments
        .iter()
        .map(|judgment| {
            let normalized = Evaluation::normalize(judgment.raw.level, judgment.item_max);
            if normalized.incident {
                incidents += 1;
                warn!(
                    "[{}/{}] 🚨 条目 {} 判定为事故 (等级 {})，按 0 计入",
                    subject, criterion, judgment.item_id, judgment.raw.level
                );
            }
            if normalized.clamped {
                warn!(
                    "[{}/{}] 条目 {} 等级 {} 超过上限 {}，已截断",
                    subject,
                    criterion,
                    judgment.item_id,
                    judgment.raw.level,
                    normalized.evaluation.item_max
                );
            }
            normalized.evaluation
        })
        .collect();

    if evaluations.is_empty() {
        debug!("[{}/{}] 没有可用的判断，使用先验", subject, criterion);
    }

    let result = estimate(&evaluations, options);

    info!(
        "[{}/{}] 📈 能力 {:.3} (区间 {:.3} - {:.3})，共 {} 个条目",
        subject,
        criterion,
        result.best_ability,
        result.confidence_interval.lower,
        result.confidence_interval.upper,
        evaluations.len()
    );

    AbilityRecord {
        subject: subject.to_string(),
        criterion: criterion.to_string(),
        ability: result.best_ability,
        confidence_interval: result.confidence_interval,
        evaluated_items: evaluations.len(),
        incidents,
        evaluated_at: chrono::Local::now(),
    }
}

/// 为一个评估对象的每个标准生成能力记录，顺序与输入中的标准一致
pub fn score_assessment(
    assessment: &Assessment,
    judgments: &[Judgment],
    options: &EstimatorOptions,
) -> Vec<AbilityRecord> {
    assessment
        .criteria
        .iter()
        .map(|criterion| {
            let matching: Vec<&Judgment> = judgments
                .iter()
                .filter(|j| j.subject == assessment.subject && j.criterion == criterion.id)
                .collect();
            score_criterion(&assessment.subject, &criterion.id, &matching, options)
        })
        .collect()
}
