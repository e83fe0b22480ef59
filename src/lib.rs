//! NOVA - 多层并行处理引擎
//!
//! 一条输入消息同时分发给多个独立的处理层，各层按自己的节奏产出结果，
//! 单层失败彼此隔离；每层把结果发布到消息总线，并带有统一的计时信息。
//!
//! 模块划分：
//! - **bus**: 总线配置、发布 / 订阅抽象、进程内实现、每层独占的句柄
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: Nova 编排器、构建器、轮次状态
//! - **layer**: Layer 接口、三种层配置、计时包装、有界历史
//! - **llm**: 推理后端抽象与实现（Ollama / OpenAI 兼容 / DeepSeek / Mock）
//! - **observability**: 日志初始化

pub mod bus;
pub mod config;
pub mod core;
pub mod layer;
pub mod llm;
pub mod observability;

pub use crate::core::{LayerOutcome, Nova, NovaBuilder, NovaError, RoundResults};
pub use crate::layer::Message;
