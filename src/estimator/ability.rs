//! 能力估计器
//!
//! 输入一组 (观测等级, 等级上限) 评估，输出有界区间上的潜在能力值及置信区间。
//!
//! ## 模型
//!
//! - **似然**：有序截断模型。`P(θ) = sigmoid(θ - k)` 表示"至少达到 k 级"的概率，
//!   恰好观测到 k 级的概率为 `P(θ) - sigmoid(θ - (k+1))`；若 k 已达到上限 n，
//!   则为 `P(θ)`。每项似然在取对数前截断到 `1e-10`。
//! - **先验**：缩放到 `[x_min, x_max]` 的 Beta(α, β) 密度（开区间）。
//! - **点估计**：网格搜索 MAP，没有后续的梯度细化。
//! - **置信区间**：对数后验在峰值处的二阶中心差分（Laplace 近似），95% 正态区间。
//!
//! 纯函数，无 I/O；所有数值退化情况都返回约定的兜底值，不会 panic。

use statrs::function::beta::checked_ln_beta;

use crate::error::ConfigError;
use crate::models::{AbilityEstimate, ConfidenceInterval, Evaluation};

/// 先验 Beta 分布的默认 α
pub const ALPHA: f64 = 2.0;
/// 先验 Beta 分布的默认 β
pub const BETA: f64 = 5.0;
/// 默认网格区间数（网格点数为 `GRID_POINTS + 1`）
pub const GRID_POINTS: usize = 500;

const LIKELIHOOD_FLOOR: f64 = 1e-10;
const CURVATURE_STEP: f64 = 1e-4;
const Z_95: f64 = 1.96;

/// 估计参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatorOptions {
    pub alpha: f64,
    pub beta: f64,
    pub x_min: f64,
    pub x_max: f64,
    pub grid_points: usize,
}

impl Default for EstimatorOptions {
    fn default() -> Self {
        Self {
            alpha: ALPHA,
            beta: BETA,
            x_min: 0.0,
            x_max: 4.0,
            grid_points: GRID_POINTS,
        }
    }
}

impl EstimatorOptions {
    /// 检查能力区间和先验参数是否可用
    pub fn validate(&self) -> Result<(), ConfigError> {
        let domain_ok = self.x_min.is_finite() && self.x_max.is_finite() && self.x_min < self.x_max;
        let prior_ok = self.alpha > 1.0 && self.beta > 1.0;
        if domain_ok && prior_ok {
            Ok(())
        } else {
            Err(ConfigError::InvalidAbilityDomain {
                min: self.x_min,
                max: self.x_max,
            })
        }
    }

    /// 先验众数 `x_min + (x_max - x_min) * (α - 1) / (α + β - 2)`
    pub fn prior_mode(&self) -> f64 {
        self.x_min + (self.x_max - self.x_min) * (self.alpha - 1.0) / (self.alpha + self.beta - 2.0)
    }
}

/// 网格搜索的完整轨迹，主要用于测试和调试
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridSearchTrace {
    pub best_ability: f64,
    pub abilities: Vec<f64>,
    pub log_priors: Vec<f64>,
    pub log_likelihoods: Vec<f64>,
    pub log_posteriors: Vec<f64>,
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// 单项评估的似然（已截断）
fn item_likelihood(ability: f64, evaluation: &Evaluation) -> f64 {
    let k = f64::from(evaluation.level);
    let at_least_k = sigmoid(ability - k);
    let likelihood = if evaluation.level == evaluation.item_max {
        at_least_k
    } else {
        at_least_k - sigmoid(ability - (k + 1.0))
    };
    likelihood.max(LIKELIHOOD_FLOOR)
}

/// 所有评估的对数似然之和（条件独立）
pub fn log_likelihood(ability: f64, evaluations: &[Evaluation]) -> f64 {
    evaluations
        .iter()
        .map(|e| item_likelihood(ability, e).ln())
        .sum()
}

/// 缩放到 `[x_min, x_max]` 的 Beta(α, β) 对数密度
///
/// 区间端点及区间外返回 `-∞`。
pub fn log_prior(ability: f64, options: &EstimatorOptions) -> f64 {
    let EstimatorOptions {
        alpha,
        beta,
        x_min,
        x_max,
        ..
    } = *options;
    if !(ability > x_min && ability < x_max) {
        return f64::NEG_INFINITY;
    }
    let Ok(ln_beta) = checked_ln_beta(alpha, beta) else {
        return f64::NEG_INFINITY;
    };
    let width = x_max - x_min;
    (alpha - 1.0) * (ability - x_min).ln() + (beta - 1.0) * (x_max - ability).ln()
        - (alpha + beta - 1.0) * width.ln()
        - ln_beta
}

/// 对数后验（未归一化）
pub fn log_posterior(ability: f64, evaluations: &[Evaluation], options: &EstimatorOptions) -> f64 {
    log_prior(ability, options) + log_likelihood(ability, evaluations)
}

/// 网格搜索 MAP 估计
///
/// 没有评估时直接返回先验众数（轨迹为空）；所有后验都不是有限值时返回 `x_min`。
pub fn estimate_ability(evaluations: &[Evaluation], options: &EstimatorOptions) -> GridSearchTrace {
    if evaluations.is_empty() {
        return GridSearchTrace {
            best_ability: options.prior_mode(),
            ..GridSearchTrace::default()
        };
    }

    let intervals = options.grid_points.max(1);
    let step = (options.x_max - options.x_min) / intervals as f64;
    let mut trace = GridSearchTrace {
        best_ability: options.x_min,
        abilities: Vec::with_capacity(intervals + 1),
        log_priors: Vec::with_capacity(intervals + 1),
        log_likelihoods: Vec::with_capacity(intervals + 1),
        log_posteriors: Vec::with_capacity(intervals + 1),
    };

    let mut best_posterior = f64::NEG_INFINITY;
    for i in 0..=intervals {
        // 最后一个点直接取 x_max，避免浮点累积误差越界
        let ability = if i == intervals {
            options.x_max
        } else {
            options.x_min + step * i as f64
        };
        let prior = log_prior(ability, options);
        let likelihood = log_likelihood(ability, evaluations);
        let posterior = prior + likelihood;

        if posterior.is_finite() && posterior > best_posterior {
            best_posterior = posterior;
            trace.best_ability = ability;
        }

        trace.abilities.push(ability);
        trace.log_priors.push(prior);
        trace.log_likelihoods.push(likelihood);
        trace.log_posteriors.push(posterior);
    }

    trace
}

/// Laplace 近似的 95% 置信区间
///
/// 曲率不是正的有限值时返回整个能力区间。
pub fn confidence_interval(
    best_ability: f64,
    evaluations: &[Evaluation],
    options: &EstimatorOptions,
) -> ConfidenceInterval {
    let full_domain = ConfidenceInterval {
        lower: options.x_min,
        upper: options.x_max,
    };
    if evaluations.is_empty() {
        return full_domain;
    }

    let h = CURVATURE_STEP;
    let f = |x: f64| log_posterior(x, evaluations, options);
    let second_derivative = (f(best_ability + h) - 2.0 * f(best_ability) + f(best_ability - h)) / (h * h);
    let information = -second_derivative;

    if !information.is_finite() || information <= 0.0 {
        return full_domain;
    }

    let margin = Z_95 / information.sqrt();
    ConfidenceInterval {
        lower: (best_ability - margin).max(options.x_min),
        upper: (best_ability + margin).min(options.x_max),
    }
}

/// 点估计 + 置信区间
pub fn estimate(evaluations: &[Evaluation], options: &EstimatorOptions) -> AbilityEstimate {
    let best_ability = estimate_ability(evaluations, options).best_ability;
    AbilityEstimate {
        best_ability,
        confidence_interval: confidence_interval(best_ability, evaluations, options),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evals(pairs: &[(i32, i32)]) -> Vec<Evaluation> {
        pairs
            .iter()
            .map(|&(level, item_max)| Evaluation { level, item_max })
            .collect()
    }

    #[test]
    fn test_invalid_shape_gives_empty_prior() {
        let options = EstimatorOptions {
            alpha: 0.0,
            ..EstimatorOptions::default()
        };
        assert_eq!(log_prior(1.0, &options), f64::NEG_INFINITY);
    }

    #[test]
    fn test_prior_is_normalized_beta_density() {
        // Beta(2,5) 在 [0,1] 上: 30 x (1-x)^4
        let options = EstimatorOptions {
            x_min: 0.0,
            x_max: 1.0,
            ..EstimatorOptions::default()
        };
        let x: f64 = 0.3;
        let expected = (30.0 * x * (1.0 - x).powi(4)).ln();
        assert!((log_prior(x, &options) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_prior_is_open_interval() {
        let options = EstimatorOptions::default();
        assert_eq!(log_prior(0.0, &options), f64::NEG_INFINITY);
        assert_eq!(log_prior(4.0, &options), f64::NEG_INFINITY);
        assert_eq!(log_prior(-1.0, &options), f64::NEG_INFINITY);
        assert!(log_prior(1.0, &options).is_finite());
    }

    #[test]
    fn test_likelihood_ceiling_and_floor() {
        // 达到上限时只有 sigmoid(θ - k)
        let top = Evaluation { level: 4, item_max: 4 };
        assert!((item_likelihood(4.0, &top) - 0.5).abs() < 1e-12);

        // 极端远离时被截断
        let low = Evaluation { level: 0, item_max: 4 };
        assert_eq!(item_likelihood(60.0, &low), LIKELIHOOD_FLOOR);
    }

    #[test]
    fn test_empty_evaluations_return_prior_mode() {
        let options = EstimatorOptions::default();
        let trace = estimate_ability(&[], &options);
        assert!((trace.best_ability - 0.8).abs() < 1e-12);
        assert!(trace.abilities.is_empty());

        let ci = confidence_interval(trace.best_ability, &[], &options);
        assert_eq!(ci, ConfidenceInterval { lower: 0.0, upper: 4.0 });
    }

    #[test]
    fn test_trace_covers_grid() {
        let options = EstimatorOptions::default();
        let trace = estimate_ability(&evals(&[(2, 4)]), &options);
        assert_eq!(trace.abilities.len(), GRID_POINTS + 1);
        assert_eq!(trace.abilities[0], 0.0);
        assert_eq!(*trace.abilities.last().unwrap(), 4.0);
        assert_eq!(trace.log_posteriors[0], f64::NEG_INFINITY);
        for i in 0..trace.abilities.len() {
            assert_eq!(trace.log_priors[i] + trace.log_likelihoods[i], trace.log_posteriors[i]);
        }
    }

    #[test]
    fn test_degenerate_posterior_falls_back_to_x_min() {
        // 网格只有两个端点，先验在端点处为 -∞
        let options = EstimatorOptions {
            grid_points: 1,
            ..EstimatorOptions::default()
        };
        let trace = estimate_ability(&evals(&[(3, 4)]), &options);
        assert_eq!(trace.best_ability, options.x_min);
        let ci = confidence_interval(trace.best_ability, &evals(&[(3, 4)]), &options);
        assert_eq!(ci, ConfidenceInterval { lower: 0.0, upper: 4.0 });
    }

    #[test]
    fn test_high_scores_example() {
        let estimate = estimate(&evals(&[(4, 4), (3, 4)]), &EstimatorOptions::default());
        assert!(estimate.best_ability > 1.5, "got {}", estimate.best_ability);
    }

    #[test]
    fn test_low_scores_example() {
        let estimate = estimate(&evals(&[(0, 4), (1, 4)]), &EstimatorOptions::default());
        assert!(estimate.best_ability < 2.0, "got {}", estimate.best_ability);
    }

    #[test]
    fn test_perfect_scores_beat_zero_scores() {
        let options = EstimatorOptions::default();
        let perfect = estimate(&evals(&[(4, 4), (3, 3), (2, 2)]), &options);
        let zero = estimate(&evals(&[(0, 4), (0, 3), (0, 2)]), &options);
        assert!(perfect.best_ability > zero.best_ability);
    }

    #[test]
    fn test_monotone_in_single_level() {
        let options = EstimatorOptions::default();
        let mut previous = f64::NEG_INFINITY;
        for level in 0..=4 {
            let best = estimate_ability(&evals(&[(2, 4), (level, 4), (1, 3)]), &options).best_ability;
            assert!(best >= previous, "level {} gave {} < {}", level, best, previous);
            previous = best;
        }
    }

    #[test]
    fn test_interval_within_domain_and_contains_estimate() {
        let options = EstimatorOptions::default();
        let cases: [&[(i32, i32)]; 5] = [
            &[(0, 1)],
            &[(4, 4); 6],
            &[(0, 4); 6],
            &[(2, 4), (3, 4), (1, 2)],
            &[(1, 1), (0, 1), (2, 3), (4, 4)],
        ];
        for pairs in cases {
            let e = estimate(&evals(pairs), &options);
            let ci = e.confidence_interval;
            assert!(e.best_ability >= options.x_min && e.best_ability <= options.x_max);
            assert!(ci.lower >= options.x_min && ci.upper <= options.x_max);
            assert!(ci.lower <= e.best_ability && e.best_ability <= ci.upper);
        }
    }

    #[test]
    fn test_more_evidence_narrows_interval() {
        let options = EstimatorOptions::default();
        let few = estimate(&evals(&[(2, 4)]), &options).confidence_interval;
        let many = estimate(&evals(&[(2, 4); 12]), &options).confidence_interval;
        assert!(many.upper - many.lower < few.upper - few.lower);
    }

    #[test]
    fn test_validate_rejects_bad_domain() {
        let bad = EstimatorOptions {
            x_min: 3.0,
            x_max: 1.0,
            ..EstimatorOptions::default()
        };
        assert!(bad.validate().is_err());
        assert!(EstimatorOptions::default().validate().is_ok());
    }
}
