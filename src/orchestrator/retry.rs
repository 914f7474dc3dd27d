//! 重试策略 - 编排层
//!
//! ## 职责
//!
//! 包装单个可失败的异步操作：
//!
//! 1. **冷却等待**：每次尝试前等待全局限流冷却结束
//! 2. **限流**：解析服务端给出的等待时间（缺省 30 秒）加随机抖动，
//!    同时推后全局冷却，让所有调用方一起等待
//! 3. **临时错误**（500/503）：`base * 2^attempt` 加随机抖动的指数退避
//! 4. **其他错误**：立即返回，不重试
//!
//! 状态流转：`尝试 → {成功 | 限流→冷却→尝试 | 临时错误→退避→尝试 | 致命错误→失败}`

use crate::error::{AppError, AppResult, RetryClass};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, error, warn};

/// 没有 retryDelay 提示时的限流等待时间
pub const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(30);
/// 限流等待的最大随机抖动
pub const RATE_LIMIT_JITTER: Duration = Duration::from_millis(1500);
/// 指数退避的最大随机抖动
pub const BACKOFF_JITTER: Duration = Duration::from_millis(400);

/// 全局限流冷却
///
/// 所有重试共享同一个实例（`Arc`），任何一次调用观察到限流都会推后冷却时间，
/// 其余调用在下次尝试前等待。冷却时间只会向后推，不会被较短的等待覆盖。
#[derive(Debug, Default)]
pub struct RateLimitCooldown {
    until: Mutex<Option<Instant>>,
}

impl RateLimitCooldown {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前冷却截止时间（已过期时返回 None）
    pub async fn remaining(&self) -> Option<Duration> {
        let until = *self.until.lock().await;
        until
            .and_then(|t| t.checked_duration_since(Instant::now()))
            .filter(|d| !d.is_zero())
    }

    /// 把冷却截止时间推后到 `now + delay`
    pub async fn extend(&self, delay: Duration) {
        let target = Instant::now() + delay;
        let mut until = self.until.lock().await;
        if until.map_or(true, |current| current < target) {
            *until = Some(target);
        }
    }

    /// 等待冷却结束
    ///
    /// 等待期间冷却可能被其他调用继续推后，所以循环检查。
    pub async fn wait(&self) {
        loop {
            let until = *self.until.lock().await;
            match until {
                Some(t) if t > Instant::now() => {
                    debug!("⏳ 全局限流冷却中，等待 {:?}", t - Instant::now());
                    sleep_until(t).await;
                }
                _ => return,
            }
        }
    }
}

/// 重试策略
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大尝试次数
    pub max_retries: u32,
    /// 指数退避的初始等待时间
    pub base_delay: Duration,
    /// 没有 retryDelay 提示时的限流等待时间
    pub default_rate_limit_delay: Duration,
    /// 限流等待的最大随机抖动
    pub rate_limit_jitter: Duration,
    /// 指数退避的最大随机抖动
    pub backoff_jitter: Duration,
    cooldown: Arc<RateLimitCooldown>,
}

impl RetryPolicy {
    /// 创建新的重试策略，使用传入的共享冷却
    pub fn new(max_retries: u32, base_delay: Duration, cooldown: Arc<RateLimitCooldown>) -> Self {
        Self {
            max_retries,
            base_delay,
            default_rate_limit_delay: DEFAULT_RATE_LIMIT_DELAY,
            rate_limit_jitter: RATE_LIMIT_JITTER,
            backoff_jitter: BACKOFF_JITTER,
            cooldown,
        }
    }

    /// 关闭随机抖动（测试用）
    pub fn without_jitter(mut self) -> Self {
        self.rate_limit_jitter = Duration::ZERO;
        self.backoff_jitter = Duration::ZERO;
        self
    }

    /// 第 `attempt` 次（从 0 开始）失败后的指数退避时间，不含抖动
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }

    /// 带退避的重试
    ///
    /// # 参数
    /// - `label`: 日志中显示的操作名称
    /// - `operation`: 每次尝试都会重新调用以产生新的 future
    ///
    /// # 返回
    /// 成功值；致命错误或最后一次尝试的错误原样返回；
    /// `max_retries` 为 0 时返回 `MaxRetriesExceeded`
    pub async fn retry_with_backoff<T, F, Fut>(&self, label: &str, mut operation: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        for attempt in 0..self.max_retries {
            self.cooldown.wait().await;

            let err = match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!("[{}] ✓ 第 {} 次尝试成功", label, attempt + 1);
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            let is_last = attempt + 1 == self.max_retries;
            match err.retry_class() {
                RetryClass::RateLimited { retry_after } => {
                    let delay = retry_after.unwrap_or(self.default_rate_limit_delay)
                        + random_jitter(self.rate_limit_jitter);
                    self.cooldown.extend(delay).await;
                    if is_last {
                        error!(
                            "[{}] ❌ 限流且已用完 {} 次尝试: {}",
                            label, self.max_retries, err
                        );
                        return Err(err);
                    }
                    warn!(
                        "[{}] ⚠️ 请求频率限制 (尝试 {}/{}), 全局冷却 {:?}",
                        label,
                        attempt + 1,
                        self.max_retries,
                        delay
                    );
                    sleep(delay).await;
                }
                RetryClass::Transient => {
                    if is_last {
                        error!(
                            "[{}] ❌ 服务端错误且已用完 {} 次尝试: {}",
                            label, self.max_retries, err
                        );
                        return Err(err);
                    }
                    let delay = self.backoff_delay(attempt) + random_jitter(self.backoff_jitter);
                    warn!(
                        "[{}] ⚠️ 服务端临时错误 (尝试 {}/{}), {:?} 后重试: {}",
                        label,
                        attempt + 1,
                        self.max_retries,
                        delay,
                        err
                    );
                    sleep(delay).await;
                }
                RetryClass::Fatal => {
                    error!("[{}] ❌ 不可重试的错误: {}", label, err);
                    return Err(err);
                }
            }
        }

        Err(AppError::MaxRetriesExceeded {
            attempts: self.max_retries,
        })
    }
}

/// `[0, max]` 内的随机抖动
fn random_jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn rate_limited(secs: u64) -> AppError {
        AppError::Llm(LlmError::RateLimited {
            model: "test".into(),
            retry_after: Some(Duration::from_secs(secs)),
            message: "[429 Too Many Requests]".into(),
        })
    }

    fn server_error() -> AppError {
        AppError::Llm(LlmError::ServerError {
            model: "test".into(),
            status: 503,
            message: "unavailable".into(),
        })
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(
            max_retries,
            Duration::from_millis(1200),
            Arc::new(RateLimitCooldown::new()),
        )
        .without_jitter()
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_rate_limits_then_success() {
        let policy = policy(4);
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = policy
            .retry_with_backoff("rl", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 3 {
                        Err(rate_limited(2))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(start.elapsed() >= Duration::from_secs(6));
        assert!(start.elapsed() < Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_without_hint_uses_default_delay() {
        let policy = policy(2);
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = policy
            .retry_with_backoff("rl-default", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(AppError::Other("[429 quota exceeded]".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 1);
        assert!(start.elapsed() >= DEFAULT_RATE_LIMIT_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_back_off_exponentially() {
        let policy = policy(4);
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = policy
            .retry_with_backoff("5xx", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(server_error())
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        // 1200ms + 2400ms
        assert!(start.elapsed() >= Duration::from_millis(3600));
        assert!(start.elapsed() < Duration::from_millis(3700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_attempt_rethrows_original_error() {
        let policy = policy(3);
        let calls = AtomicU32::new(0);

        let result: AppResult<()> = policy
            .retry_with_backoff("5xx", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(server_error()) }
            })
            .await;

        assert!(matches!(
            result,
            Err(AppError::Llm(LlmError::ServerError { .. }))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let policy = policy(4);
        let calls = AtomicU32::new(0);

        let result: AppResult<()> = policy
            .retry_with_backoff("fatal", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AppError::Other("invalid api key".into())) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_retries_is_max_retries_exceeded() {
        let result: AppResult<()> = policy(0).retry_with_backoff("none", || async { Ok(()) }).await;
        assert!(matches!(
            result,
            Err(AppError::MaxRetriesExceeded { attempts: 0 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_is_shared_between_policies() {
        let cooldown = Arc::new(RateLimitCooldown::new());
        let first = RetryPolicy::new(1, Duration::from_millis(10), cooldown.clone()).without_jitter();
        let second = RetryPolicy::new(1, Duration::from_millis(10), cooldown.clone()).without_jitter();

        let _: AppResult<()> = first
            .retry_with_backoff("first", || async { Err(rate_limited(5)) })
            .await;
        assert!(cooldown.remaining().await.is_some());

        let start = Instant::now();
        second
            .retry_with_backoff("second", || async { Ok(()) })
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_never_moves_backwards() {
        let cooldown = RateLimitCooldown::new();
        cooldown.extend(Duration::from_secs(10)).await;
        cooldown.extend(Duration::from_secs(1)).await;
        assert!(cooldown.remaining().await.unwrap() > Duration::from_secs(9));
    }
}
