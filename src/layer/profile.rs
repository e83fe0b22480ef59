//! 层配置：三种层的差异全部落在数据上（提示词、采样参数、历史策略、超时、输出 topic）

use std::time::Duration;

use serde::Serialize;

use crate::config::LayerSection;
use crate::layer::HistoryBuffer;
use crate::llm::CompletionOptions;

const REACTIVE_SYSTEM_PROMPT: &str = "You are a reactive processor that gives IMMEDIATE, VERY SHORT responses.
Rules:
1. Respond in 10 words or less
2. Focus only on immediate action or reaction
3. No explanations or analysis
4. Be direct and clear
5. Use imperative form when appropriate";

const RESPONSIVE_SYSTEM_PROMPT: &str = "You are a responsive processor that considers immediate \
context and gives thoughtful, measured responses. Balance between quick response \
and careful consideration.";

const REFLECTIVE_SYSTEM_PROMPT: &str = "You are a reflective processor focused on deep analysis, \
pattern recognition, and learning. Consider long-term implications and generate insights.";

/// 层的种类（也是结果映射中的键）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Reactive,
    Responsive,
    Reflective,
}

impl LayerKind {
    pub const ALL: [LayerKind; 3] = [Self::Reactive, Self::Responsive, Self::Reflective];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Reactive => "reactive",
            Self::Responsive => "responsive",
            Self::Reflective => "reflective",
        }
    }

    /// 成功结果的 type 标签
    pub fn response_type(&self) -> &'static str {
        match self {
            Self::Reactive => "reactive_response",
            Self::Responsive => "responsive_response",
            Self::Reflective => "reflective_update",
        }
    }
}

impl std::fmt::Display for LayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// 历史策略：决定写入什么、何时写入，以及提示词如何拼接
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryPolicy {
    /// 无历史，直接把输入作为 user prompt
    Stateless,
    /// 调用前写入当前输入，提示词带上整个上下文
    Context { capacity: usize },
    /// 调用成功后写入模型输出，提示词带上最近 window 条模式
    Patterns { capacity: usize, window: usize },
}

impl HistoryPolicy {
    pub fn capacity(&self) -> usize {
        match self {
            Self::Stateless => 0,
            Self::Context { capacity } | Self::Patterns { capacity, .. } => (*capacity).max(1),
        }
    }

    /// 有历史的策略容量至少为 1，保证当前输入 / 最新模式总能留在缓冲中
    fn with_capacity(self, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        match self {
            Self::Stateless => Self::Stateless,
            Self::Context { .. } => Self::Context { capacity },
            Self::Patterns { window, .. } => Self::Patterns {
                capacity,
                window: window.min(capacity),
            },
        }
    }
}

/// 单层的完整配置
#[derive(Debug, Clone, PartialEq)]
pub struct LayerProfile {
    pub kind: LayerKind,
    pub system_prompt: String,
    pub temperature: f32,
    pub max_output_tokens: Option<u32>,
    pub history: HistoryPolicy,
    /// 单次推理调用的超时
    pub timeout: Duration,
    /// 结果发布到的 topic；None 表示不发布
    pub topic: Option<String>,
}

impl LayerProfile {
    /// 快速反应：低温度、短输出、无历史
    pub fn reactive() -> Self {
        Self {
            kind: LayerKind::Reactive,
            system_prompt: REACTIVE_SYSTEM_PROMPT.to_string(),
            temperature: 0.3,
            max_output_tokens: Some(50),
            history: HistoryPolicy::Stateless,
            timeout: Duration::from_secs(10),
            topic: Some("nova.reactive".to_string()),
        }
    }

    /// 上下文感知：中等温度、中等输出、最近 5 条输入
    pub fn responsive() -> Self {
        Self {
            kind: LayerKind::Responsive,
            system_prompt: RESPONSIVE_SYSTEM_PROMPT.to_string(),
            temperature: 0.7,
            max_output_tokens: Some(100),
            history: HistoryPolicy::Context { capacity: 5 },
            timeout: Duration::from_secs(30),
            topic: Some("nova.responsive".to_string()),
        }
    }

    /// 反思学习：较高温度、不限输出、保留最近 3 条模式
    pub fn reflective() -> Self {
        Self {
            kind: LayerKind::Reflective,
            system_prompt: REFLECTIVE_SYSTEM_PROMPT.to_string(),
            temperature: 0.7,
            max_output_tokens: None,
            history: HistoryPolicy::Patterns {
                capacity: 3,
                window: 3,
            },
            timeout: Duration::from_secs(120),
            topic: Some("nova.reflective".to_string()),
        }
    }

    pub fn for_kind(kind: LayerKind) -> Self {
        match kind {
            LayerKind::Reactive => Self::reactive(),
            LayerKind::Responsive => Self::responsive(),
            LayerKind::Reflective => Self::reflective(),
        }
    }

    /// 用配置段覆盖默认值（未设置的键保持不变）
    pub fn apply(mut self, section: &LayerSection) -> Self {
        if let Some(t) = section.temperature {
            self.temperature = t;
        }
        if let Some(max) = section.max_tokens {
            self.max_output_tokens = Some(max);
        }
        if let Some(secs) = section.timeout_secs {
            self.timeout = Duration::from_secs(secs);
        }
        if let Some(topic) = &section.topic {
            self.topic = if topic.is_empty() {
                None
            } else {
                Some(topic.clone())
            };
        }
        if let Some(capacity) = section.history_capacity {
            if capacity == 0 && self.history != HistoryPolicy::Stateless {
                tracing::warn!(
                    layer = self.kind.name(),
                    "history_capacity = 0 is not allowed, using 1"
                );
            }
            self.history = self.history.with_capacity(capacity);
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
        }
    }

    /// 按历史策略拼接 user prompt；Context 策略下调用方需已把当前输入写入 history
    pub fn build_prompt(&self, content: &str, history: &HistoryBuffer) -> String {
        match self.history {
            HistoryPolicy::Stateless => content.to_string(),
            HistoryPolicy::Context { .. } => format!(
                "Previous context: {}\nCurrent input: {}",
                history.recent(history.capacity()).collect::<Vec<_>>().join(" | "),
                content
            ),
            HistoryPolicy::Patterns { window, .. } => format!(
                "Analyze this input deeply, considering these previous patterns:\n{}\n\n\
                 Current input: {}\n\n\
                 Identify new patterns, insights, or learning opportunities.",
                history.recent(window).collect::<Vec<_>>().join("\n"),
                content
            ),
        }
    }
}
