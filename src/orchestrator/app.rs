use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::estimator::EstimatorOptions;
use crate::models::evaluation::MAX_LEVEL;
use crate::models::{load_all_toml_files, AbilityRecord, Assessment, Judgment};
use crate::orchestrator::batch_executor::BatchExecutor;
use crate::orchestrator::retry::RateLimitCooldown;
use crate::services::{LlmBackend, LlmService, PredictionCache, ResultWriter};
use crate::utils::logging;
use crate::workflow::{score_assessment, JudgeFlow, TaskCtx};

/// 一次运行的统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// 判断任务总数
    pub tasks: usize,
    /// 成功的判断数量
    pub judgments: usize,
    /// 新增的等级上限预测数量
    pub predictions: usize,
    /// 写入的能力记录数量
    pub records: usize,
}

/// 应用主结构
pub struct App {
    config: Config,
    flow: JudgeFlow<dyn LlmBackend>,
    executor: BatchExecutor,
    estimator: EstimatorOptions,
}

impl App {
    /// 初始化应用，使用配置中的 LLM 服务
    pub async fn initialize(config: Config) -> Result<Self> {
        let llm: Arc<dyn LlmBackend> = Arc::new(LlmService::new(&config));
        Self::with_backend(config, llm)
    }

    /// 使用指定的 LLM 后端初始化应用
    pub fn with_backend(config: Config, llm: Arc<dyn LlmBackend>) -> Result<Self> {
        // 初始化日志文件
        logging::init_log_file(&config.output_log_file)
            .with_context(|| format!("无法初始化日志文件: {}", config.output_log_file))?;

        let estimator = config.estimator_options();
        estimator.validate().context("能力估计参数无效")?;

        logging::log_startup(config.batch_size, config.concurrent_batches, llm.model_name());

        // 预测和判断两个阶段共用一个限流冷却
        let cooldown = Arc::new(RateLimitCooldown::new());
        let executor = BatchExecutor::with_cooldown(config.batch_options(), cooldown);

        Ok(Self {
            flow: JudgeFlow::new(llm, config.verbose_logging),
            config,
            executor,
            estimator,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<RunSummary> {
        // 加载所有评估输入
        info!("\n📁 正在扫描评估输入...");
        let assessments = load_all_toml_files(&self.config.input_folder)
            .await
            .with_context(|| format!("无法加载评估输入: {}", self.config.input_folder))?;

        if assessments.is_empty() {
            warn!("⚠️ 没有找到待处理的TOML文件，程序结束");
            return Ok(RunSummary::default());
        }

        let mut tasks: Vec<TaskCtx> = assessments.iter().flat_map(TaskCtx::expand).collect();
        let mut summary = RunSummary {
            tasks: tasks.len(),
            ..Default::default()
        };
        info!(
            "✓ 共 {} 个评估对象，{} 个判断任务",
            assessments.len(),
            tasks.len()
        );

        // ========== 阶段 1: 等级上限预测 ==========
        summary.predictions = self.predict_missing(&mut tasks).await?;

        // ========== 阶段 2: 判断 ==========
        let judgments = self.judge_all(tasks).await;
        summary.judgments = judgments.len();

        // ========== 阶段 3: 评分与写入 ==========
        let records = self.score_all(&assessments, &judgments);
        ResultWriter::with_path(&self.config.output_file)
            .write_all(&records)
            .await
            .with_context(|| format!("写入能力记录失败: {}", self.config.output_file))?;
        summary.records = records.len();

        logging::print_final_stats(
            summary.records,
            summary.judgments,
            summary.tasks,
            &self.config.output_file,
        );

        Ok(summary)
    }

    /// 为缺少等级上限的任务做预测，并补全所有任务的上限
    ///
    /// # 返回
    /// 新增的预测数量
    async fn predict_missing(&self, tasks: &mut [TaskCtx]) -> Result<usize> {
        let mut cache = PredictionCache::load(&self.config.prediction_cache_file)
            .await
            .context("无法读取预测缓存")?;

        for task in tasks.iter_mut() {
            task.resolve_from(&cache);
        }

        let pending: Vec<TaskCtx> = tasks
            .iter()
            .filter(|t| t.item_max.is_none())
            .cloned()
            .collect();

        let mut added = 0;
        if !pending.is_empty() {
            let flow = &self.flow;
            let predictions = self
                .executor
                .process_batches(
                    pending,
                    move |ctx| flow.predict_max_level(ctx),
                    |ctx| ctx.to_string(),
                    "预测",
                )
                .await;

            added = predictions.len();
            for (key, item_max) in predictions {
                cache.insert(key, item_max);
            }
            cache.save().await.context("无法保存预测缓存")?;

            for task in tasks.iter_mut() {
                task.resolve_from(&cache);
            }
        }

        let defaulted = tasks.iter().filter(|t| t.item_max.is_none()).count();
        if defaulted > 0 {
            warn!(
                "⚠️ {} 个任务没有等级上限，按 {} 处理",
                defaulted, MAX_LEVEL
            );
        }

        Ok(added)
    }

    /// 判断所有任务，失败的任务不出现在结果中
    async fn judge_all(&self, tasks: Vec<TaskCtx>) -> Vec<Judgment> {
        let flow = &self.flow;
        self.executor
            .process_batches(
                tasks,
                move |ctx| flow.judge(ctx),
                |ctx| ctx.to_string(),
                "判断",
            )
            .await
    }

    /// 为每个评估对象的每个标准生成能力记录
    fn score_all(&self, assessments: &[Assessment], judgments: &[Judgment]) -> Vec<AbilityRecord> {
        assessments
            .iter()
            .flat_map(|assessment| score_assessment(assessment, judgments, &self.estimator))
            .collect()
    }
}
