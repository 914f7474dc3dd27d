//! 批量执行器 - 编排层
//!
//! ## 职责
//!
//! 把一组条目分批交给不可靠的异步处理函数，只返回成功的结果。
//!
//! ## 核心功能
//!
//! 1. **分批**：每批 `batch_size` 个条目，批内所有条目并发执行
//! 2. **批次并发**：每组 `concurrent_batches` 个批次同时执行，组与组之间串行
//! 3. **节流**：每组完成后等待 `batch_delay` 再开始下一组（最后一组除外）
//! 4. **重试**：每个条目都包在 [`RetryPolicy`] 中，共享全局限流冷却
//! 5. **超时**：单个条目超过 `item_timeout` 视为失败；整批超过 `batch_timeout`
//!    时丢弃尚未完成的条目，已完成的结果保留
//! 6. **隔离**：任何条目或批次的失败都不会中断其他条目
//!
//! ## 结果顺序
//!
//! 输出保持输入顺序，失败或返回 `None` 的条目直接省略，不留空位。
//!
//! ## 并发模型
//!
//! 所有条目在调用方的任务内并发（`FuturesUnordered` / `join_all`），不额外 spawn；
//! 同时在途的条目数量由 `concurrent_batches × batch_size` 大小的信号量兜底。

use crate::error::{AppError, AppResult};
use crate::orchestrator::retry::{RateLimitCooldown, RetryPolicy};
use crate::utils::logging;
use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout, timeout_at, Instant};
use tracing::{debug, error, info, warn};

/// 批处理参数
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// 每批条目数量
    pub batch_size: usize,
    /// 批次（组）之间的等待时间
    pub batch_delay: Duration,
    /// 单个条目的超时时间（包含全部重试）
    pub item_timeout: Duration,
    /// 单个批次的超时时间
    pub batch_timeout: Duration,
    /// 单个条目的最大尝试次数
    pub max_retries: u32,
    /// 指数退避的初始等待时间
    pub base_retry_delay: Duration,
    /// 同时执行的批次数，1 表示批次串行
    pub concurrent_batches: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: 2,
            batch_delay: Duration::from_millis(3000),
            item_timeout: Duration::from_millis(180_000),
            batch_timeout: Duration::from_millis(300_000),
            max_retries: 4,
            base_retry_delay: Duration::from_millis(1200),
            concurrent_batches: 1,
        }
    }
}

/// 批量执行器
pub struct BatchExecutor {
    options: BatchOptions,
    retry: RetryPolicy,
    semaphore: Arc<Semaphore>,
}

impl BatchExecutor {
    /// 创建执行器，与其他执行器共享同一个限流冷却
    pub fn with_cooldown(options: BatchOptions, cooldown: Arc<RateLimitCooldown>) -> Self {
        let retry = RetryPolicy::new(options.max_retries, options.base_retry_delay, cooldown);
        Self::with_retry_policy(options, retry)
    }

    /// 使用自定义重试策略创建执行器
    pub fn with_retry_policy(mut options: BatchOptions, retry: RetryPolicy) -> Self {
        options.batch_size = options.batch_size.max(1);
        options.concurrent_batches = options.concurrent_batches.max(1);
        let permits = options.batch_size * options.concurrent_batches;
        Self {
            options,
            retry,
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    /// 分批处理所有条目
    ///
    /// # 参数
    /// - `items`: 待处理条目
    /// - `processor`: 处理单个条目；`Ok(None)` 表示没有结果，`Err` 按重试策略分类
    /// - `name_fn`: 条目在日志中的名称
    /// - `label`: 本次处理在日志中的名称
    ///
    /// # 返回
    /// 所有成功结果，保持输入顺序；本函数本身不会失败
    pub async fn process_batches<T, O, F, Fut, N>(
        &self,
        items: Vec<T>,
        processor: F,
        name_fn: N,
        label: &str,
    ) -> Vec<O>
    where
        T: Clone,
        F: Fn(T) -> Fut,
        Fut: Future<Output = AppResult<Option<O>>>,
        N: Fn(&T) -> String,
    {
        let total = items.len();
        if total == 0 {
            info!("[{}] 没有需要处理的条目", label);
            return Vec::new();
        }

        let batches: Vec<&[T]> = items.chunks(self.options.batch_size).collect();
        let total_batches = batches.len();
        let groups: Vec<&[&[T]]> = batches.chunks(self.options.concurrent_batches).collect();
        let total_groups = groups.len();

        logging::log_run_start(
            label,
            total,
            self.options.batch_size,
            total_batches,
            self.options.concurrent_batches,
        );

        let mut results = Vec::with_capacity(total);
        let mut batch_offset = 0;

        for (group_index, group) in groups.into_iter().enumerate() {
            let batch_runs = group.iter().enumerate().map(|(i, batch)| {
                let batch_num = batch_offset + i + 1;
                let start = (batch_num - 1) * self.options.batch_size;
                logging::log_batch_start(
                    label,
                    batch_num,
                    total_batches,
                    start + 1,
                    start + batch.len(),
                    total,
                );
                self.run_batch(label, batch_num, batch, &processor, &name_fn)
            });

            for (i, batch_results) in join_all(batch_runs).await.into_iter().enumerate() {
                logging::log_batch_complete(
                    label,
                    batch_offset + i + 1,
                    batch_results.len(),
                    group[i].len(),
                );
                results.extend(batch_results);
            }
            batch_offset += group.len();

            if group_index + 1 < total_groups && !self.options.batch_delay.is_zero() {
                debug!(
                    "[{}] 💤 等待 {:?} 后开始下一批",
                    label, self.options.batch_delay
                );
                sleep(self.options.batch_delay).await;
            }
        }

        logging::print_run_stats(label, results.len(), total);
        results
    }

    /// 处理单个批次：批内条目并发，整批受 `batch_timeout` 约束
    async fn run_batch<T, O, F, Fut, N>(
        &self,
        label: &str,
        batch_num: usize,
        batch: &[T],
        processor: &F,
        name_fn: &N,
    ) -> Vec<O>
    where
        T: Clone,
        F: Fn(T) -> Fut,
        Fut: Future<Output = AppResult<Option<O>>>,
        N: Fn(&T) -> String,
    {
        let deadline = Instant::now() + self.options.batch_timeout;
        let mut slots: Vec<Option<O>> = batch.iter().map(|_| None).collect();

        let mut pending: FuturesUnordered<_> = batch
            .iter()
            .enumerate()
            .map(|(idx, item)| async move {
                (idx, self.run_item(label, item.clone(), processor, name_fn).await)
            })
            .collect();

        loop {
            let next = timeout_at(deadline, pending.next()).await;
            match next {
                Ok(Some((idx, output))) => slots[idx] = output,
                Ok(None) => break,
                Err(_) => {
                    let err = AppError::Timeout {
                        label: format!("第 {} 批", batch_num),
                        after: self.options.batch_timeout,
                    };
                    error!(
                        "[{}] ⏱️ {}，放弃 {} 个未完成的条目",
                        label,
                        err,
                        pending.len()
                    );
                    break;
                }
            }
        }

        slots.into_iter().flatten().collect()
    }

    /// 处理单个条目：信号量 → 超时 → 重试 → 处理函数
    async fn run_item<T, O, F, Fut, N>(
        &self,
        label: &str,
        item: T,
        processor: &F,
        name_fn: &N,
    ) -> Option<O>
    where
        T: Clone,
        F: Fn(T) -> Fut,
        Fut: Future<Output = AppResult<Option<O>>>,
        N: Fn(&T) -> String,
    {
        let name = name_fn(&item);
        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                error!("[{}] {} 无法获取并发许可: {}", label, name, e);
                return None;
            }
        };

        let work = self
            .retry
            .retry_with_backoff(&name, || processor(item.clone()));

        let outcome = match timeout(self.options.item_timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout {
                label: name.clone(),
                after: self.options.item_timeout,
            }),
        };

        match outcome {
            Ok(Some(output)) => {
                debug!("[{}] ✓ {} 处理成功", label, name);
                Some(output)
            }
            Ok(None) => {
                warn!("[{}] ⚠️ {} 没有结果", label, name);
                None
            }
            Err(e @ AppError::Timeout { .. }) => {
                error!("[{}] ⏱️ {}", label, e);
                None
            }
            Err(e) => {
                error!("[{}] ❌ {} 处理失败: {}", label, name, e);
                None
            }
        }
    }
}
