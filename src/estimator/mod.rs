//! 能力估计层
//!
//! 无状态纯计算，不做 I/O，也不缓存结果（缓存由调用方负责）。

pub mod ability;

pub use ability::{
    confidence_interval, estimate, estimate_ability, log_likelihood, log_posterior, log_prior,
    EstimatorOptions, GridSearchTrace,
};
