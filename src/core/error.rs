//! 编排器错误
//!
//! 单层失败不会出现在这里（作为数据返回）；只有总线级问题会终止一轮或关闭流程。

use thiserror::Error;

use crate::bus::BusError;

#[derive(Error, Debug)]
pub enum NovaError {
    #[error("Failed to set up bus for layer '{layer}': {source}")]
    BusSetup {
        layer: String,
        #[source]
        source: BusError,
    },

    #[error("Failed to flush producer of layer '{layer}': {source}")]
    Flush {
        layer: String,
        #[source]
        source: BusError,
    },

    #[error("Failed to close layer '{layer}': {source}")]
    Close {
        layer: String,
        #[source]
        source: BusError,
    },

    #[error("Duplicate layer name: {0}")]
    DuplicateLayer(String),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
}
