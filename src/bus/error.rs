//! 消息总线错误类型

use thiserror::Error;

/// 总线相关错误：配置、连接、发布、投递、flush
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BusError {
    #[error("Invalid bus config: {0}")]
    Config(String),

    #[error("Bus connect failed: {0}")]
    Connect(String),

    #[error("Failed to serialize payload for '{topic}': {reason}")]
    Serialize { topic: String, reason: String },

    #[error("Failed to publish message to '{topic}': {reason}")]
    Publish { topic: String, reason: String },

    #[error("Message delivery to '{topic}' failed: {reason}")]
    Delivery { topic: String, reason: String },

    #[error("Flush failed: {0}")]
    Flush(String),

    #[error("Flush timed out with {pending} message(s) still in flight")]
    FlushTimeout { pending: usize },

    #[error("Consumer error: {0}")]
    Consumer(String),
}
