//! 总线抽象：发布端、订阅端与连接器
//!
//! 发布是非阻塞的：produce 只负责入队，投递结果通过回调异步通知；flush 是唯一的同步完成信号。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::bus::{BusConfig, BusError};

/// 已投递的一条记录
#[derive(Debug, Clone, PartialEq)]
pub struct BusRecord {
    pub topic: String,
    pub offset: u64,
    pub payload: Vec<u8>,
}

impl BusRecord {
    /// 将 payload 解析为 JSON
    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

/// 投递回执
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub offset: u64,
}

/// 投递回调：在投递线程上调用，不能把错误抛回调用方
pub type DeliveryCallback = Box<dyn FnOnce(Result<Delivery, BusError>) + Send + 'static>;

/// 发布端
#[async_trait]
pub trait Producer: Send + Sync {
    /// 入队一条消息，不等待投递；同步错误仅表示入队失败
    fn produce(
        &self,
        topic: &str,
        payload: Vec<u8>,
        on_delivery: DeliveryCallback,
    ) -> Result<(), BusError>;

    /// 阻塞直到所有已入队消息被确认或失败
    async fn flush(&self, timeout: Duration) -> Result<(), BusError>;

    /// 尚未结算的消息数
    fn in_flight(&self) -> usize;
}

/// 订阅端
#[async_trait]
pub trait Consumer: Send + Sync {
    fn subscribe(&self, topics: &[String]) -> Result<(), BusError>;

    /// 下一条订阅到的记录；关闭后返回 None
    async fn recv(&self) -> Option<BusRecord>;

    fn close(&self) -> Result<(), BusError>;
}

/// 连接器：按配置打开发布端 / 订阅端
pub trait BusConnector: Send + Sync {
    fn producer(&self, config: &BusConfig) -> Result<Arc<dyn Producer>, BusError>;

    fn consumer(&self, config: &BusConfig) -> Result<Arc<dyn Consumer>, BusError>;
}
