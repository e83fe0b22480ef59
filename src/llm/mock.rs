//! Mock LLM 客户端（用于测试与离线演示，无需后端）
//!
//! 默认回显 user prompt；可设为固定回复、注入失败或人为延迟，并记录每次调用的参数。

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{CompletionOptions, LlmClient, LlmError};

/// 一次 complete 调用的快照
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionCall {
    pub system_prompt: String,
    pub user_prompt: String,
    pub options: CompletionOptions,
}

#[derive(Debug, Clone)]
enum Reply {
    Echo,
    Fixed(String),
}

/// Mock 客户端
#[derive(Debug)]
pub struct MockLlmClient {
    model: String,
    reply: Reply,
    failure: Mutex<Option<String>>,
    delay: Option<Duration>,
    calls: Mutex<Vec<CompletionCall>>,
}

impl MockLlmClient {
    /// 回显 user prompt
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            reply: Reply::Echo,
            failure: Mutex::new(None),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 每次返回同一段文本
    pub fn replying(model: impl Into<String>, reply: impl Into<String>) -> Self {
        Self {
            reply: Reply::Fixed(reply.into()),
            ..Self::new(model)
        }
    }

    /// 每次返回 LlmError::Backend(reason)
    pub fn failing(model: impl Into<String>, reason: impl Into<String>) -> Self {
        let client = Self::new(model);
        client.set_failure(Some(reason.into()));
        client
    }

    /// 每次调用前等待 delay
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 运行时切换失败注入；None 恢复正常
    pub fn set_failure(&self, reason: Option<String>) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = reason;
        }
    }

    /// 已记录的调用（按时间顺序）
    pub fn calls(&self) -> Vec<CompletionCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new("mock")
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(CompletionCall {
                system_prompt: system_prompt.to_string(),
                user_prompt: user_prompt.to_string(),
                options: *options,
            });
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failure.lock().ok().and_then(|f| f.clone());
        if let Some(reason) = failure {
            return Err(LlmError::Backend(reason));
        }

        Ok(match &self.reply {
            Reply::Echo => format!("Echo from Mock: {}", user_prompt),
            Reply::Fixed(text) => text.clone(),
        })
    }
}
