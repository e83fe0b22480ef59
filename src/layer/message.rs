//! 输入消息与层输出

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::layer::timing::unix_now;

fn default_kind() -> String {
    "user_input".to_string()
}

/// 输入消息：content / type / timestamp 之外的字段原样保留
///
/// 交给编排器后只以共享引用传给各层，各层只读不改。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub content: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    #[serde(default = "unix_now")]
    pub timestamp: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    /// 用户输入，时间戳取当前时间
    pub fn user_input(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            kind: default_kind(),
            timestamp: unix_now(),
            extra: Map::new(),
        }
    }

    /// 从 JSON 字节解析（如总线上收到的原始消息）
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// 单层处理结果（计时字段由 timed_process 附加）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerResponse {
    /// 层特定标签，如 reactive_response
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    /// 模型标识
    pub source: String,
    /// 短期上下文快照（Responsive）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<String>>,
    /// 长期模式快照（Reflective）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patterns: Option<Vec<String>>,
}
