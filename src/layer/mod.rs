//! 处理层：统一的 Layer 接口、三种数据驱动的层配置、计时包装与有界历史

pub mod cognitive;
pub mod error;
pub mod history;
pub mod message;
pub mod profile;
pub mod timing;

use async_trait::async_trait;

pub use cognitive::CognitiveLayer;
pub use error::{LayerProcessingError, StageProcessingError};
pub use history::HistoryBuffer;
pub use message::{LayerResponse, Message};
pub use profile::{HistoryPolicy, LayerKind, LayerProfile};
pub use timing::{timed_process, unix_now, Timed, Timing};

use crate::bus::BusHandle;

/// 处理层接口：编排器只依赖这个 trait
///
/// process 不负责计时，由编排器用 timed_process 包装后调用。
#[async_trait]
pub trait Layer: Send + Sync {
    /// 层名，也是结果映射中的键
    fn name(&self) -> &str;

    /// 结果发布到的 topic；None 表示不发布
    fn topic(&self) -> Option<&str>;

    /// 本层独占的总线句柄
    fn bus(&self) -> &BusHandle;

    async fn process(&mut self, message: &Message) -> Result<LayerResponse, StageProcessingError>;
}
