//! 判断解析服务 - 业务能力层
//!
//! 把 LLM 的自由文本响应解析成结构化的 [`RawJudgment`]。
//!
//! 按顺序尝试一组解析策略，第一个成功的胜出；全部失败时返回
//! [`ParseError::NoStrategyMatched`]。

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;

use crate::error::ParseError;
use crate::models::evaluation::{RawJudgment, INCIDENT_LEVEL, MAX_LEVEL};
use crate::utils::truncate_text;

/// 单个解析策略
pub trait JudgmentStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn parse(&self, text: &str) -> Result<RawJudgment, ParseError>;
}

/// 整段响应就是 JSON
pub struct WholeJson;

/// ```json 代码块
pub struct FencedJson;

/// 响应中第一个能解析出判断的 `{...}`
pub struct EmbeddedJson;

/// `level: 3` 形式的标注字段
pub struct LabelledFields;

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").expect("代码块正则无效"));

static LEVEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)["']?(?:level|等级)["']?\s*[:：=]\s*["']?(-?\d+)"#).expect("等级正则无效")
});

static EVIDENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?im)^\s*["']?(?:evidence|证据)["']?\s*[:：=]\s*(.+)$"#).expect("证据正则无效")
});

static REASONING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?im)^\s*["']?(?:reasoning|理由)["']?\s*[:：=]\s*(.+)$"#).expect("理由正则无效")
});

static PREDICTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\D)([1-4])(?:\D|$)").expect("预测正则无效"));

/// "1-4"、"1 到 4" 这类量表范围，不是预测值
static SCALE_RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\d\s*(?:-|–|~|到|至|to)\s*\d").expect("范围正则无效")
});

/// 从 JSON 值中取出判断
fn judgment_from_value(value: JsonValue) -> Result<RawJudgment, ParseError> {
    let level = match value.get("level") {
        Some(JsonValue::Number(n)) => n.as_f64().map(|f| f.round() as i64),
        Some(JsonValue::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or(ParseError::MissingField("level"))?;

    let text_field = |key: &str| {
        value
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .trim()
            .to_string()
    };

    Ok(RawJudgment {
        level: level.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32,
        evidence: text_field("evidence"),
        reasoning: text_field("reasoning"),
    })
}

impl JudgmentStrategy for WholeJson {
    fn name(&self) -> &'static str {
        "whole_json"
    }

    fn parse(&self, text: &str) -> Result<RawJudgment, ParseError> {
        let value: JsonValue = serde_json::from_str(text.trim())?;
        judgment_from_value(value)
    }
}

impl JudgmentStrategy for FencedJson {
    fn name(&self) -> &'static str {
        "fenced_json"
    }

    fn parse(&self, text: &str) -> Result<RawJudgment, ParseError> {
        let captures = FENCE_RE
            .captures(text)
            .ok_or(ParseError::MissingField("```json"))?;
        let value: JsonValue = serde_json::from_str(&captures[1])?;
        judgment_from_value(value)
    }
}

impl JudgmentStrategy for EmbeddedJson {
    fn name(&self) -> &'static str {
        "embedded_json"
    }

    fn parse(&self, text: &str) -> Result<RawJudgment, ParseError> {
        let mut last_error = ParseError::MissingField("{...}");
        for (start, _) in text.match_indices('{') {
            let Some(candidate) = balanced_object_at(text, start) else {
                continue;
            };
            match serde_json::from_str::<JsonValue>(candidate)
                .map_err(ParseError::from)
                .and_then(judgment_from_value)
            {
                Ok(judgment) => return Ok(judgment),
                Err(e) => last_error = e,
            }
        }
        Err(last_error)
    }
}

impl JudgmentStrategy for LabelledFields {
    fn name(&self) -> &'static str {
        "labelled_fields"
    }

    fn parse(&self, text: &str) -> Result<RawJudgment, ParseError> {
        let level = LEVEL_RE
            .captures(text)
            .and_then(|c| c[1].parse::<i32>().ok())
            .ok_or_else(|| ParseError::NoLevel(truncate_text(text, 80)))?;

        let field = |re: &Regex| {
            re.captures(text)
                .map(|c| {
                    c[1].trim()
                        .trim_matches(|ch: char| ch == '"' || ch == ',')
                        .to_string()
                })
                .unwrap_or_default()
        };

        Ok(RawJudgment {
            level,
            evidence: field(&EVIDENCE_RE),
            reasoning: field(&REASONING_RE),
        })
    }
}

/// 从 `start` 处的 `{` 开始找括号配平的 `{...}`，跳过字符串里的括号
fn balanced_object_at(text: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// 判断解析器
pub struct JudgmentParser {
    strategies: Vec<Box<dyn JudgmentStrategy>>,
}

impl Default for JudgmentParser {
    fn default() -> Self {
        Self {
            strategies: vec![
                Box::new(WholeJson),
                Box::new(FencedJson),
                Box::new(EmbeddedJson),
                Box::new(LabelledFields),
            ],
        }
    }
}

impl JudgmentParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// 依次尝试所有策略
    ///
    /// 解析出的等级超出 [-1, 4] 时视为该策略失败，继续尝试下一个。
    pub fn parse(&self, text: &str) -> Result<RawJudgment, ParseError> {
        for strategy in &self.strategies {
            match strategy.parse(text) {
                Ok(judgment) if (INCIDENT_LEVEL..=MAX_LEVEL).contains(&judgment.level) => {
                    tracing::debug!("解析策略 {} 成功", strategy.name());
                    return Ok(judgment);
                }
                Ok(judgment) => {
                    tracing::debug!(
                        "解析策略 {} 得到越界等级 {}",
                        strategy.name(),
                        judgment.level
                    );
                }
                Err(e) => tracing::trace!("解析策略 {} 失败: {}", strategy.name(), e),
            }
        }

        Err(ParseError::NoStrategyMatched {
            tried: self.strategies.len(),
            preview: truncate_text(text, 80),
        })
    }
}

/// 解析等级上限预测
///
/// 优先取 `level: N` 标注；否则去掉量表范围后取第一个 1..=4 的独立数字。
pub fn parse_max_level(text: &str) -> Result<i32, ParseError> {
    let labelled = LEVEL_RE
        .captures(text)
        .and_then(|c| c[1].parse::<i32>().ok())
        .filter(|level| (1..=MAX_LEVEL).contains(level));
    if let Some(level) = labelled {
        return Ok(level);
    }

    let without_ranges = SCALE_RANGE_RE.replace_all(text.trim(), " ");
    PREDICTION_RE
        .captures(&without_ranges)
        .and_then(|c| c[1].parse::<i32>().ok())
        .ok_or_else(|| ParseError::NoLevel(truncate_text(text, 80)))
}
