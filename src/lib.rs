//! # Ability Assessor
//!
//! 基于 LLM 判断的批量能力评估工具：对每个评估对象的每条评估标准，
//! 收集 LLM 给出的离散等级判断，再用贝叶斯 MAP 估计得到连续的能力值和置信区间。
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 计算层（Estimator）
//! - `estimator/` - 网格搜索 MAP + Laplace 置信区间，纯计算，无 I/O
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个任务
//! - `LlmService` - LLM 调用能力（`LlmBackend` trait）
//! - `JudgmentParser` - 响应解析能力（有序策略）
//! - `PredictionCache` - 等级上限缓存
//! - `ResultWriter` - 写能力记录
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个任务"的完整处理流程
//! - `TaskCtx` - 上下文封装（subject + criterion + item）
//! - `JudgeFlow` - 流程编排（prompt → LLM → parse）
//! - `scoring` - 规范化 → 估计 → 能力记录
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_executor` - 分批并发、超时、节流
//! - `orchestrator/retry` - 重试策略与全局限流冷却
//! - `orchestrator/app` - 三阶段主流程
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod estimator;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use estimator::{confidence_interval, estimate, estimate_ability, EstimatorOptions};
pub use models::{AbilityRecord, Assessment, Evaluation, Judgment};
pub use orchestrator::{App, BatchExecutor, BatchOptions, RateLimitCooldown, RetryPolicy, RunSummary};
pub use services::{LlmBackend, LlmService};
pub use workflow::{JudgeFlow, TaskCtx};
