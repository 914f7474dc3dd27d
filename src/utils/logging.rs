/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use anyhow::Result;
use std::fs;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 初始化 tracing 订阅者
///
/// 默认级别为 `info`（`verbose` 时为 `debug`），可以通过 `RUST_LOG` 覆盖。
/// 重复调用不会报错。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n能力评估日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(batch_size: usize, concurrent_batches: usize, model: &str) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 批量能力评估模式");
    info!("📊 每批条目数: {}, 同时执行批次数: {}", batch_size, concurrent_batches);
    info!("🤖 模型: {}", model);
    info!("{}", "=".repeat(60));
}

/// 记录一次批量处理的开始
pub fn log_run_start(
    label: &str,
    total: usize,
    batch_size: usize,
    total_batches: usize,
    concurrent_batches: usize,
) {
    info!("[{}] ✓ 共 {} 个条目", label, total);
    info!(
        "[{}] 📋 将以每批 {} 个的方式处理，共 {} 批，每次 {} 批并行",
        label, batch_size, total_batches, concurrent_batches
    );
}

/// 记录批次开始信息
///
/// # 参数
/// - `batch_num`: 批次编号
/// - `total_batches`: 批次总数
/// - `start`: 起始条目编号
/// - `end`: 结束条目编号
/// - `total`: 条目总数
pub fn log_batch_start(
    label: &str,
    batch_num: usize,
    total_batches: usize,
    start: usize,
    end: usize,
    total: usize,
) {
    info!("[{}] {}", label, "─".repeat(40));
    info!("[{}] 📦 开始处理第 {}/{} 批", label, batch_num, total_batches);
    info!("[{}] 📄 本批条目: {}-{} / 共 {} 个", label, start, end, total);
}

/// 记录批次完成信息
pub fn log_batch_complete(label: &str, batch_num: usize, success: usize, total: usize) {
    info!(
        "[{}] ✓ 第 {} 批完成: 成功 {}/{}",
        label, batch_num, success, total
    );
}

/// 记录一次批量处理的统计
pub fn print_run_stats(label: &str, success: usize, total: usize) {
    info!("[{}] {}", label, "=".repeat(40));
    info!("[{}] ✅ 成功: {}/{}", label, success, total);
    info!("[{}] ❌ 失败: {}", label, total - success.min(total));
}

/// 打印最终统计信息
///
/// # 参数
/// - `records`: 写入的能力记录数量
/// - `judgments`: 成功的判断数量
/// - `tasks`: 判断任务总数
/// - `output_file`: 结果文件路径
pub fn print_final_stats(records: usize, judgments: usize, tasks: usize, output_file: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 判断成功: {}/{}", judgments, tasks);
    info!("📈 能力记录: {}", records);
    info!("{}", "=".repeat(60));
    info!("\n结果已保存至: {}", output_file);
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
