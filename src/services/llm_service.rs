//! LLM 服务 - 业务能力层
//!
//! 只负责"向 LLM 提问并拿回原始文本"的能力，不关心流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）
//!
//! 调用失败时按错误文本归类（限流 / 服务端错误 / 致命错误），重试由编排层负责。

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, LlmError};
use crate::models::{Criterion, WorkItem};

/// LLM 评估服务的抽象
///
/// 流程层只依赖这个 trait，测试中可以替换为脚本化的实现。
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// 模型名称（用于日志）
    fn model_name(&self) -> &str;

    /// 发送一次对话，返回响应文本
    async fn send_to_llm(&self, user_message: &str, system_message: Option<&str>)
        -> AppResult<String>;
}

/// LLM 服务
///
/// 职责：
/// - 调用 LLM API
/// - 只处理单次调用
/// - 不出现 Vec<WorkItem>
/// - 不关心重试和流程顺序
pub struct LlmService {
    client: Client<OpenAIConfig>,
    model_name: String,
}

impl LlmService {
    /// 创建新的 LLM 服务
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        let client = Client::with_config(openai_config);

        Self {
            client,
            model_name: config.llm_model_name.clone(),
        }
    }
}

#[async_trait]
impl LlmBackend for LlmService {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    /// 通用的 LLM 调用函数
    ///
    /// # 参数
    /// - `user_message`: 用户消息内容
    /// - `system_message`: 系统消息（可选）
    ///
    /// # 返回
    /// 返回 LLM 的响应内容（字符串）
    async fn send_to_llm(
        &self,
        user_message: &str,
        system_message: Option<&str>,
    ) -> AppResult<String> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", user_message.len());

        // 构建消息列表
        let mut messages = Vec::new();

        // 添加系统消息（如果提供）
        if let Some(sys_msg) = system_message {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg)
                .build()?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message)
            .build()?;
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        // 构建请求
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(0.2)
            .max_tokens(1024u32)
            .build()?;

        // 调用 API
        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            AppError::llm_api_failed(&self.model_name, e.to_string())
        })?;

        debug!("LLM API 调用成功");

        // 提取响应内容
        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| LlmError::EmptyContent {
                model: self.model_name.clone(),
            })?;

        Ok(content.trim().to_string())
    }
}

/// 构建判断消息
///
/// 返回 (user_message, system_message)
pub fn build_judgment_messages(
    subject: &str,
    criterion: &Criterion,
    item: &WorkItem,
    item_max: i32,
) -> (String, String) {
    let system_message = "你是一名严谨的评审，根据给定的评估标准，对一段工作产出给出离散等级判断。\
                          只依据材料中的证据作答，不要臆测。"
        .to_string();

    let user_message = format!(
        r#"评估对象：{}
评估标准（{}）：{}
该条目能体现的最高等级：{}

【材料】
{}

【等级说明】
- -1：材料显示出明确的负面表现（事故）
- 0：没有体现该标准
- 1..{}：体现程度依次增加，不能超过最高等级

只返回一个 JSON 对象，不要返回其他内容：
{{"level": <整数>, "evidence": "<引用材料中的证据>", "reasoning": "<简要理由>"}}"#,
        subject, criterion.id, criterion.description, item_max, item.content, item_max
    );

    (user_message, system_message)
}

/// 构建等级上限预测消息
///
/// 返回 (user_message, system_message)
pub fn build_prediction_messages(criterion: &Criterion, item: &WorkItem) -> (String, String) {
    let system_message =
        "你负责评估一段材料理论上最多能体现某项标准的哪个等级，与具体是谁完成的无关。".to_string();

    let user_message = format!(
        r#"评估标准（{}）：{}

【材料】
{}

这段材料理论上最多能体现该标准的第几级（1 到 4）？只返回一个数字。"#,
        criterion.id, criterion.description, item.content
    );

    (user_message, system_message)
}
