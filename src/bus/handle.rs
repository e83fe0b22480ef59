//! 每层独占的总线句柄
//!
//! 构造时打开一个发布端（只用 broker 地址）和一个订阅端（完整配置）。
//! - publish：序列化为 JSON 后入队，不阻塞；任何失败只记日志，不返回给调用方
//! - flush：等待所有已入队消息结算，是发布轮次真正完成的唯一同步信号
//! - close：flush 发布端后释放订阅端；可重复、可并发调用，之后的 publish 变为空操作
//!
//! 显式 close 才是正确用法；Drop 只做兜底（释放订阅端并告警在途消息数）。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::bus::{BusConfig, BusConnector, BusError, BusRecord, Consumer, Producer};

pub struct BusHandle {
    owner: String,
    producer: Arc<dyn Producer>,
    consumer: Arc<dyn Consumer>,
    flush_timeout: Duration,
    closed: AtomicBool,
}

impl BusHandle {
    /// 打开发布端与订阅端；owner 用于日志
    pub fn acquire(
        owner: impl Into<String>,
        connector: &dyn BusConnector,
        config: &BusConfig,
        flush_timeout: Duration,
    ) -> Result<Self, BusError> {
        config.validate()?;
        let owner = owner.into();
        let producer = connector.producer(&config.publisher_subset())?;
        let consumer = connector.consumer(config)?;
        tracing::debug!(layer = %owner, "Bus handle acquired");

        Ok(Self {
            owner,
            producer,
            consumer,
            flush_timeout,
            closed: AtomicBool::new(false),
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// 非阻塞发布。同步失败与投递失败都只记录日志：投递回调无法把错误带回调用方。
    pub fn publish<T: Serialize + ?Sized>(&self, topic: &str, payload: &T) {
        if self.is_closed() {
            tracing::debug!(layer = %self.owner, topic, "Handle closed, publish skipped");
            return;
        }

        let bytes = match serde_json::to_vec(payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                let err = BusError::Serialize {
                    topic: topic.to_string(),
                    reason: e.to_string(),
                };
                tracing::error!(layer = %self.owner, topic, error = %err, "Failed to publish message");
                return;
            }
        };

        let owner = self.owner.clone();
        let on_delivery = Box::new(move |result: Result<crate::bus::Delivery, BusError>| {
            match result {
                Ok(delivery) => tracing::debug!(
                    layer = %owner,
                    topic = %delivery.topic,
                    offset = delivery.offset,
                    "Message delivered successfully"
                ),
                Err(e) => tracing::error!(layer = %owner, error = %e, "Message delivery failed"),
            }
        });

        if let Err(e) = self.producer.produce(topic, bytes, on_delivery) {
            tracing::error!(layer = %self.owner, topic, error = %e, "Failed to publish message");
        }
    }

    /// 等待所有在途消息结算；关闭后为空操作
    pub async fn flush(&self) -> Result<(), BusError> {
        if self.is_closed() {
            return Ok(());
        }
        self.producer.flush(self.flush_timeout).await
    }

    /// flush 发布端并释放订阅端；只有第一次调用真正执行
    pub async fn close(&self) -> Result<(), BusError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let flushed = self.producer.flush(self.flush_timeout).await;
        let released = self.consumer.close();
        tracing::debug!(layer = %self.owner, "Bus handle closed");
        flushed.and(released)
    }

    /// 订阅额外的 topic（订阅端使用完整配置，含消费组）
    pub fn subscribe(&self, topics: &[String]) -> Result<(), BusError> {
        self.consumer.subscribe(topics)
    }

    /// 下一条订阅到的记录；关闭后返回 None
    pub async fn recv(&self) -> Option<BusRecord> {
        if self.is_closed() {
            return None;
        }
        self.consumer.recv().await
    }

    pub fn in_flight(&self) -> usize {
        self.producer.in_flight()
    }
}

impl Drop for BusHandle {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let pending = self.producer.in_flight();
        if pending > 0 {
            tracing::warn!(
                layer = %self.owner,
                pending,
                "Bus handle dropped without close(), in-flight messages may be lost"
            );
        }
        if let Err(e) = self.consumer.close() {
            tracing::warn!(layer = %self.owner, error = %e, "Consumer close failed during drop");
        }
    }
}

impl std::fmt::Debug for BusHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusHandle")
            .field("owner", &self.owner)
            .field("closed", &self.is_closed())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{InMemoryBus, AUTO_OFFSET_RESET, GROUP_ID};

    fn full_config() -> BusConfig {
        BusConfig::new("localhost:9092")
            .with(GROUP_ID, "nova_group")
            .with(AUTO_OFFSET_RESET, "earliest")
    }

    fn acquire(bus: &InMemoryBus) -> BusHandle {
        BusHandle::acquire("test", bus, &full_config(), Duration::from_secs(1)).unwrap()
    }

    #[tokio::test]
    async fn test_acquire_splits_config() {
        let bus = InMemoryBus::new();
        let _handle = acquire(&bus);

        let producer_configs = bus.producer_configs();
        assert_eq!(producer_configs.len(), 1);
        assert!(producer_configs[0].get(GROUP_ID).is_none());
        assert!(producer_configs[0].get(AUTO_OFFSET_RESET).is_none());

        let consumer_configs = bus.consumer_configs();
        assert_eq!(consumer_configs[0], full_config());
    }

    #[tokio::test]
    async fn test_acquire_rejects_missing_address() {
        let bus = InMemoryBus::new();
        let config = BusConfig::default().with(GROUP_ID, "g");
        let err = BusHandle::acquire("test", &bus, &config, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, BusError::Config(_)));
        assert!(bus.producer_configs().is_empty());
    }

    #[tokio::test]
    async fn test_publish_serializes_json() {
        let bus = InMemoryBus::new();
        let handle = acquire(&bus);

        handle.publish("nova.test", &serde_json::json!({"type": "x", "content": "hi"}));
        handle.flush().await.unwrap();

        let records = bus.records("nova.test");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].json().unwrap()["content"], "hi");
    }

    #[tokio::test]
    async fn test_publish_failure_is_swallowed() {
        let bus = InMemoryBus::new();
        let handle = acquire(&bus);
        bus.fail_publishes(Some("queue full"));

        handle.publish("nova.test", "payload");
        handle.flush().await.unwrap();
        assert!(bus.records("nova.test").is_empty());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_stops_publishing() {
        let bus = InMemoryBus::new();
        let handle = acquire(&bus);

        handle.publish("nova.test", "before");
        handle.close().await.unwrap();
        handle.close().await.unwrap();
        handle.flush().await.unwrap();
        handle.publish("nova.test", "after");

        assert!(handle.is_closed());
        assert_eq!(bus.records("nova.test").len(), 1);
        assert_eq!(bus.closed_consumers(), 1);
        // 只有第一次 close 触发了 flush
        assert_eq!(bus.flush_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_close() {
        let bus = InMemoryBus::new();
        let handle = Arc::new(acquire(&bus));

        let a = tokio::spawn({
            let handle = Arc::clone(&handle);
            async move { handle.close().await }
        });
        let b = tokio::spawn({
            let handle = Arc::clone(&handle);
            async move { handle.close().await }
        });

        assert!(a.await.unwrap().is_ok());
        assert!(b.await.unwrap().is_ok());
        assert_eq!(bus.closed_consumers(), 1);
    }

    #[tokio::test]
    async fn test_drop_without_close_releases_consumer() {
        let bus = InMemoryBus::new();
        {
            let _handle = acquire(&bus);
        }
        assert_eq!(bus.closed_consumers(), 1);
    }

    #[tokio::test]
    async fn test_flush_failure_surfaces() {
        let bus = InMemoryBus::new();
        let handle = acquire(&bus);
        bus.fail_flushes(Some("broker unreachable"));

        let err = handle.flush().await.unwrap_err();
        assert_eq!(err, BusError::Flush("broker unreachable".to_string()));
    }
}
