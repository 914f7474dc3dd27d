pub mod judge_flow;
pub mod scoring;
pub mod task_ctx;

pub use judge_flow::JudgeFlow;
pub use scoring::{score_assessment, score_criterion};
pub use task_ctx::TaskCtx;
