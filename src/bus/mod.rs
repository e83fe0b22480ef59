//! 消息总线：配置、发布 / 订阅抽象、进程内实现与每层独占的句柄

pub mod config;
pub mod error;
pub mod handle;
pub mod memory;
pub mod traits;

pub use config::{BusConfig, AUTO_OFFSET_RESET, BOOTSTRAP_SERVERS, GROUP_ID};
pub use error::BusError;
pub use handle::BusHandle;
pub use memory::{InMemoryBus, InMemoryConsumer, InMemoryProducer};
pub use traits::{BusConnector, BusRecord, Consumer, Delivery, DeliveryCallback, Producer};
