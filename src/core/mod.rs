//! 核心编排层：Nova 编排器、构建器、轮次状态与错误

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod state;

pub use builder::{create_llm_from_config, NovaBuilder};
pub use error::NovaError;
pub use orchestrator::{LayerFailure, LayerOutcome, Nova, RoundResults};
pub use state::{LayerState, RoundPhase};
