//! 判断流程 - 流程层
//!
//! 核心职责：定义"一个任务"的完整处理流程
//!
//! 流程顺序：
//! 1. 预测等级上限（仅当输入和缓存都没有给出时）
//! 2. 构建提示词 → LLM 判断 → 解析 → Judgment
//!
//! 单次调用失败直接向上返回，由编排层决定是否重试。

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::models::Judgment;
use crate::services::llm_service::{build_judgment_messages, build_prediction_messages};
use crate::services::{parse_max_level, JudgmentParser, LlmBackend};
use crate::utils::truncate_text;
use crate::workflow::task_ctx::TaskCtx;

/// 判断流程
///
/// - 编排单个任务的 LLM 调用与解析
/// - 不持有批处理状态
/// - 只依赖业务能力（services）
pub struct JudgeFlow<B: LlmBackend + ?Sized> {
    llm: Arc<B>,
    parser: JudgmentParser,
    verbose_logging: bool,
}

impl<B: LlmBackend + ?Sized> JudgeFlow<B> {
    /// 创建新的判断流程
    pub fn new(llm: Arc<B>, verbose_logging: bool) -> Self {
        Self {
            llm,
            parser: JudgmentParser::new(),
            verbose_logging,
        }
    }

    /// 预测等级上限
    ///
    /// # 返回
    /// - `Ok(Some((缓存键, 上限)))`: 预测成功
    /// - `Ok(None)`: 响应中没有可用的数字，稍后按缺省上限处理
    /// - `Err`: LLM 调用失败，交给重试层
    pub async fn predict_max_level(&self, ctx: TaskCtx) -> AppResult<Option<(String, i32)>> {
        let (user, system) = build_prediction_messages(&ctx.criterion, &ctx.item);
        let response = self.llm.send_to_llm(&user, Some(&system)).await?;

        match parse_max_level(&response) {
            Ok(item_max) => {
                debug!("{} 预测等级上限: {}", ctx, item_max);
                Ok(Some((ctx.cache_key(), item_max)))
            }
            Err(e) => {
                warn!("{} ⚠️ 无法解析等级上限预测: {}", ctx, e);
                Ok(None)
            }
        }
    }

    /// 判断单个任务
    ///
    /// 解析失败返回 `ParseError`，不会被重试。
    pub async fn judge(&self, ctx: TaskCtx) -> AppResult<Option<Judgment>> {
        let item_max = ctx.effective_max();
        let (user, system) = build_judgment_messages(&ctx.subject, &ctx.criterion, &ctx.item, item_max);

        let response = self.llm.send_to_llm(&user, Some(&system)).await?;
        let raw = self.parser.parse(&response)?;

        info!("{} ✓ 等级 {}/{}", ctx, raw.level, item_max);
        if self.verbose_logging {
            debug!("{} 证据: {}", ctx, truncate_text(&raw.evidence, 120));
            debug!("{} 理由: {}", ctx, truncate_text(&raw.reasoning, 120));
        }

        Ok(Some(Judgment {
            subject: ctx.subject,
            criterion: ctx.criterion.id,
            item_id: ctx.item.id,
            item_max,
            raw,
        }))
    }
}
