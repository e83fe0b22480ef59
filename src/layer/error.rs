//! 层错误：层内部失败（StageProcessingError）与计时包装后的统一失败（LayerProcessingError）

use std::time::Duration;

use thiserror::Error;

use crate::llm::LlmError;

/// 层内部处理失败
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StageProcessingError {
    #[error("inference failed: {0}")]
    Inference(#[from] LlmError),

    #[error("inference timed out after {0:?}")]
    Timeout(Duration),
}

/// 经 timed_process 统一包装后的失败，携带层名与原始原因
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Layer processing failed: {source}")]
pub struct LayerProcessingError {
    pub layer: String,
    #[source]
    pub source: StageProcessingError,
}
