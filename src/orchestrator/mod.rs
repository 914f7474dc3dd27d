//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量调度和容错，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `retry` - 重试策略
//! - 指数退避 + 随机抖动
//! - 错误分类：限流 / 临时错误 / 致命错误
//! - 全局限流冷却（`RateLimitCooldown`），所有调用共享
//!
//! ### `batch_executor` - 通用批量执行器
//! - 分批、批次并发、批间节流
//! - 条目级 / 批次级超时
//! - 只汇总成功结果，单个失败不影响其他条目
//!
//! ### `app` - 应用主流程
//! - 加载评估输入
//! - 预测等级上限 → 逐条判断 → 能力估计 → 写入结果
//!
//! ## 层次关系
//!
//! ```text
//! app (处理 Vec<Assessment>)
//!     ↓
//! batch_executor + retry (处理 Vec<Task>)
//!     ↓
//! workflow::JudgeFlow (处理单个 Task)
//!     ↓
//! services (能力层：llm / parser / cache / writer)
//! ```

pub mod app;
pub mod batch_executor;
pub mod retry;

// 重新导出主要类型
pub use app::{App, RunSummary};
pub use batch_executor::{BatchExecutor, BatchOptions};
pub use retry::{RateLimitCooldown, RetryPolicy};
