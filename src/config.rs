use crate::estimator::EstimatorOptions;
use crate::orchestrator::BatchOptions;
use std::str::FromStr;
use std::time::Duration;

/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    // --- 批处理配置 ---
    /// 每批处理的条目数量
    pub batch_size: usize,
    /// 批次之间的等待时间（毫秒）
    pub batch_delay_ms: u64,
    /// 单个条目的超时时间（毫秒）
    pub item_timeout_ms: u64,
    /// 单个批次的超时时间（毫秒）
    pub batch_timeout_ms: u64,
    /// 单个条目的最大尝试次数
    pub max_retries: u32,
    /// 指数退避的初始等待时间（毫秒）
    pub base_retry_delay_ms: u64,
    /// 同时运行的批次数
    pub concurrent_batches: usize,
    // --- 输入输出 ---
    /// 评估输入（TOML）所在目录
    pub input_folder: String,
    /// 能力评估结果输出文件（JSON Lines）
    pub output_file: String,
    /// 等级上限预测缓存文件
    pub prediction_cache_file: String,
    /// 运行日志文件
    pub output_log_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    // --- 能力估计 ---
    pub ability_min: f64,
    pub ability_max: f64,
    pub grid_points: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_size: 2,
            batch_delay_ms: 3000,
            item_timeout_ms: 180_000,
            batch_timeout_ms: 300_000,
            max_retries: 4,
            base_retry_delay_ms: 1200,
            concurrent_batches: 1,
            input_folder: "assessments".to_string(),
            output_file: "abilities.jsonl".to_string(),
            prediction_cache_file: "predictions.json".to_string(),
            output_log_file: "output.txt".to_string(),
            verbose_logging: false,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            ability_min: 0.0,
            ability_max: 4.0,
            grid_points: 500,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            batch_size: env_or("BATCH_SIZE", default.batch_size),
            batch_delay_ms: env_or("BATCH_DELAY_MS", default.batch_delay_ms),
            item_timeout_ms: env_or("ITEM_TIMEOUT_MS", default.item_timeout_ms),
            batch_timeout_ms: env_or("BATCH_TIMEOUT_MS", default.batch_timeout_ms),
            max_retries: env_or("MAX_RETRIES", default.max_retries),
            base_retry_delay_ms: env_or("BASE_RETRY_DELAY_MS", default.base_retry_delay_ms),
            concurrent_batches: env_or("CONCURRENT_BATCHES", default.concurrent_batches),
            input_folder: std::env::var("INPUT_FOLDER").unwrap_or(default.input_folder),
            output_file: std::env::var("OUTPUT_FILE").unwrap_or(default.output_file),
            prediction_cache_file: std::env::var("PREDICTION_CACHE_FILE")
                .unwrap_or(default.prediction_cache_file),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            verbose_logging: env_or("VERBOSE_LOGGING", default.verbose_logging),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            ability_min: env_or("ABILITY_MIN", default.ability_min),
            ability_max: env_or("ABILITY_MAX", default.ability_max),
            grid_points: env_or("GRID_POINTS", default.grid_points),
        }
    }

    /// 批处理参数
    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            batch_size: self.batch_size,
            batch_delay: Duration::from_millis(self.batch_delay_ms),
            item_timeout: Duration::from_millis(self.item_timeout_ms),
            batch_timeout: Duration::from_millis(self.batch_timeout_ms),
            max_retries: self.max_retries,
            base_retry_delay: Duration::from_millis(self.base_retry_delay_ms),
            concurrent_batches: self.concurrent_batches,
        }
    }

    /// 能力估计参数
    pub fn estimator_options(&self) -> EstimatorOptions {
        EstimatorOptions {
            x_min: self.ability_min,
            x_max: self.ability_max,
            grid_points: self.grid_points,
            ..EstimatorOptions::default()
        }
    }
}

/// 读取环境变量，不存在或无法解析时使用默认值
fn env_or<T: FromStr>(var_name: &str, default: T) -> T {
    std::env::var(var_name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
