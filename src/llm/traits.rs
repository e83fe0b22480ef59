//! LLM 客户端抽象
//!
//! 所有后端（Ollama / OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient::complete：
//! 一次非流式补全，输入 system prompt、user prompt 与采样参数，返回文本。
//! 这一层不做重试与退避，后端失败直接以 LlmError 返回给调用方。

use async_trait::async_trait;
use thiserror::Error;

/// 单次补全的采样参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    /// 输出 token 上限；None 表示不限制
    pub max_output_tokens: Option<u32>,
}

impl CompletionOptions {
    pub fn new(temperature: f32) -> Self {
        Self {
            temperature,
            max_output_tokens: None,
        }
    }

    pub fn with_max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = Some(max);
        self
    }
}

/// 推理后端错误（请求构造失败 / 网络或服务端失败）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

/// LLM 客户端 trait：非流式补全
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 以 system + user 两条消息发起一次补全
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, LlmError>;

    /// 模型标识，写入结果的 source 字段
    fn model(&self) -> &str;
}
