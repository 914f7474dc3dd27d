//! 错误类型
//!
//! 所有可重试判断都收敛到 [`AppError::retry_class`]，重试层只看分类结果，
//! 不关心错误来自哪个外部服务。

use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// LLM 服务错误
    #[error("LLM错误: {0}")]
    Llm(#[from] LlmError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 响应解析错误
    #[error("解析错误: {0}")]
    Parse(#[from] ParseError),
    /// 单项或批次超时
    #[error("超时: {label} 超过 {after:?}")]
    Timeout { label: String, after: Duration },
    /// 重试次数耗尽
    #[error("已超过最大重试次数 ({attempts})")]
    MaxRetriesExceeded { attempts: u32 },
    /// 其他错误（用于包装第三方库错误）
    #[error("错误: {0}")]
    Other(String),
}

/// LLM 服务错误
#[derive(Debug, Error)]
pub enum LlmError {
    /// 请求频率限制（HTTP 429）
    #[error("请求频率限制 (模型: {model}), 建议等待: {retry_after:?}: {message}")]
    RateLimited {
        model: String,
        retry_after: Option<Duration>,
        message: String,
    },
    /// 服务端临时错误（HTTP 500/503）
    #[error("服务端错误 (模型: {model}, 状态码: {status}): {message}")]
    ServerError {
        model: String,
        status: u16,
        message: String,
    },
    /// API 调用失败（不可重试）
    #[error("LLM API调用失败 (模型: {model}): {message}")]
    ApiCallFailed { model: String, message: String },
    /// 返回内容为空
    #[error("LLM返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    #[error("目录不存在: {path}")]
    DirectoryNotFound { path: String },
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("能力区间无效: [{min}, {max}]")]
    InvalidAbilityDomain { min: f64, max: f64 },
}

/// 响应解析错误
#[derive(Debug, Error)]
pub enum ParseError {
    /// 所有解析策略都失败
    #[error("无法解析LLM响应 (已尝试 {tried} 种策略): {preview}")]
    NoStrategyMatched { tried: usize, preview: String },
    #[error("JSON解析失败: {0}")]
    Json(#[from] serde_json::Error),
    #[error("缺少字段: {0}")]
    MissingField(&'static str),
    #[error("响应中没有可用的等级: {0}")]
    NoLevel(String),
}

/// 重试分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// 限流：触发全局冷却，可携带服务端给出的等待时间
    RateLimited { retry_after: Option<Duration> },
    /// 临时性服务端错误：指数退避后重试
    Transient,
    /// 不可重试
    Fatal,
}

static RETRY_DELAY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"retryDelay\\?"\s*:\s*\\?"(\d+(?:\.\d+)?)s"#).expect("retryDelay 正则无效")
});

/// 只匹配处于状态码位置的 429/500/503：行首、`[`、`status`/`code` 之后、`HTTP` 之后
static STATUS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|\[|status\D{0,3}|code\D{0,3}|HTTP/?\S*\s)(429|500|503)\b")
        .expect("状态码正则无效")
});

impl AppError {
    /// 判断错误应如何重试
    pub fn retry_class(&self) -> RetryClass {
        match self {
            AppError::Llm(LlmError::RateLimited { retry_after, .. }) => RetryClass::RateLimited {
                retry_after: *retry_after,
            },
            AppError::Llm(LlmError::ServerError { status, .. }) => {
                if matches!(status, 500 | 503) {
                    RetryClass::Transient
                } else {
                    RetryClass::Fatal
                }
            }
            AppError::Llm(LlmError::ApiCallFailed { message, .. }) | AppError::Other(message) => {
                classify_message(message)
            }
            _ => RetryClass::Fatal,
        }
    }

    /// 创建LLM API调用错误，根据错误文本自动归类为限流/服务端错误/致命错误
    pub fn llm_api_failed(model: impl Into<String>, message: impl Into<String>) -> Self {
        let model = model.into();
        let message = message.into();
        match classify_message(&message) {
            RetryClass::RateLimited { retry_after } => AppError::Llm(LlmError::RateLimited {
                model,
                retry_after,
                message,
            }),
            RetryClass::Transient => {
                let status = status_code(&message)
                    .filter(|s| matches!(s, 500 | 503))
                    .unwrap_or(503);
                AppError::Llm(LlmError::ServerError {
                    model,
                    status,
                    message,
                })
            }
            RetryClass::Fatal => AppError::Llm(LlmError::ApiCallFailed { model, message }),
        }
    }
}

/// 根据错误文本分类
///
/// 状态码位置上的 `429`、"rate limit"、`RESOURCE_EXHAUSTED` 及 `retryDelay` 提示为限流，
/// 状态码位置上的 `500`/`503` 为临时错误，其余为致命错误。
pub fn classify_message(message: &str) -> RetryClass {
    let retry_after = parse_retry_delay(message);
    let status = status_code(message);
    let lower = message.to_lowercase();
    if retry_after.is_some()
        || status == Some(429)
        || lower.contains("rate limit")
        || lower.contains("too many requests")
        || message.contains("RESOURCE_EXHAUSTED")
    {
        return RetryClass::RateLimited { retry_after };
    }
    if matches!(status, Some(500 | 503))
        || lower.contains("internal server error")
        || lower.contains("service unavailable")
    {
        return RetryClass::Transient;
    }
    RetryClass::Fatal
}

/// 错误文本中处于状态码位置的 429/500/503
fn status_code(message: &str) -> Option<u16> {
    STATUS_RE
        .captures(message)
        .and_then(|c| c[1].parse().ok())
}

/// 从错误文本中提取 `retryDelay":"<N>s"` 提示
pub fn parse_retry_delay(message: &str) -> Option<Duration> {
    RETRY_DELAY_RE
        .captures(message)
        .and_then(|c| c[1].parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

// ========== 从常见错误类型转换 ==========

impl From<async_openai::error::OpenAIError> for AppError {
    fn from(err: async_openai::error::OpenAIError) -> Self {
        AppError::llm_api_failed("unknown", err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Parse(ParseError::Json(err))
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::File(FileError::TomlParseFailed {
            path: String::new(),
            source: err,
        })
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: String::new(),
            source: err,
        })
    }
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
