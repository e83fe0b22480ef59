//! 进程内消息总线
//!
//! 每个 topic 一份追加日志；发布端把消息交给后台投递任务，投递完成后调用回调并递减在途计数，
//! flush 等待在途计数归零。订阅端从全局广播流中按已订阅 topic 过滤。
//! 支持注入发布 / 投递 / flush 失败，便于测试故障路径。

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::bus::{
    BusConfig, BusConnector, BusError, BusRecord, Consumer, Delivery, DeliveryCallback, Producer,
};

/// 广播流容量，慢订阅者超出后会丢弃最旧记录
const FEED_CAPACITY: usize = 1024;

#[derive(Debug, Default)]
struct Faults {
    publish: Option<String>,
    delivery: Option<String>,
    flush: Option<String>,
}

struct BusState {
    topics: Mutex<HashMap<String, Vec<BusRecord>>>,
    feed: broadcast::Sender<BusRecord>,
    faults: Mutex<Faults>,
    producer_configs: Mutex<Vec<BusConfig>>,
    consumer_configs: Mutex<Vec<BusConfig>>,
    flush_calls: AtomicUsize,
    closed_consumers: AtomicUsize,
}

/// 进程内总线（Clone 共享同一份状态）
#[derive(Clone)]
pub struct InMemoryBus {
    state: Arc<BusState>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            state: Arc::new(BusState {
                topics: Mutex::new(HashMap::new()),
                feed,
                faults: Mutex::new(Faults::default()),
                producer_configs: Mutex::new(Vec::new()),
                consumer_configs: Mutex::new(Vec::new()),
                flush_calls: AtomicUsize::new(0),
                closed_consumers: AtomicUsize::new(0),
            }),
        }
    }

    /// 某个 topic 已投递的全部记录（按 offset 升序）
    pub fn records(&self, topic: &str) -> Vec<BusRecord> {
        self.state
            .topics
            .lock()
            .ok()
            .and_then(|topics| topics.get(topic).cloned())
            .unwrap_or_default()
    }

    /// 之后的 produce 调用同步失败
    pub fn fail_publishes(&self, reason: Option<&str>) {
        self.set_fault(|f| f.publish = reason.map(String::from));
    }

    /// 之后的投递通过回调报告失败
    pub fn fail_deliveries(&self, reason: Option<&str>) {
        self.set_fault(|f| f.delivery = reason.map(String::from));
    }

    /// 之后的 flush 调用失败
    pub fn fail_flushes(&self, reason: Option<&str>) {
        self.set_fault(|f| f.flush = reason.map(String::from));
    }

    /// 所有发布端累计的 flush 次数
    pub fn flush_count(&self) -> usize {
        self.state.flush_calls.load(Ordering::SeqCst)
    }

    /// 打开发布端时收到的配置
    pub fn producer_configs(&self) -> Vec<BusConfig> {
        self.state
            .producer_configs
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// 打开订阅端时收到的配置
    pub fn consumer_configs(&self) -> Vec<BusConfig> {
        self.state
            .consumer_configs
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// 已关闭的订阅端数量
    pub fn closed_consumers(&self) -> usize {
        self.state.closed_consumers.load(Ordering::SeqCst)
    }

    fn set_fault(&self, f: impl FnOnce(&mut Faults)) {
        if let Ok(mut faults) = self.state.faults.lock() {
            f(&mut faults);
        }
    }

    fn fault(&self, f: impl FnOnce(&Faults) -> Option<String>) -> Option<String> {
        self.state.faults.lock().ok().and_then(|faults| f(&faults))
    }

    fn append(&self, topic: &str, payload: Vec<u8>) -> Result<BusRecord, BusError> {
        let mut topics = self.state.topics.lock().map_err(|e| BusError::Delivery {
            topic: topic.to_string(),
            reason: e.to_string(),
        })?;
        let log = topics.entry(topic.to_string()).or_default();
        let record = BusRecord {
            topic: topic.to_string(),
            offset: log.len() as u64,
            payload,
        };
        log.push(record.clone());
        // 没有订阅者时 send 返回 Err，忽略即可
        let _ = self.state.feed.send(record.clone());
        Ok(record)
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl BusConnector for InMemoryBus {
    fn producer(&self, config: &BusConfig) -> Result<Arc<dyn Producer>, BusError> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| BusError::Connect(format!("no tokio runtime for delivery worker: {}", e)))?;

        if let Ok(mut configs) = self.state.producer_configs.lock() {
            configs.push(config.clone());
        }

        let (queue, queue_rx) = mpsc::unbounded_channel();
        let (pending, _) = watch::channel(0usize);
        let pending = Arc::new(pending);
        runtime.spawn(deliver(self.clone(), queue_rx, Arc::clone(&pending)));

        Ok(Arc::new(InMemoryProducer {
            bus: self.clone(),
            queue,
            pending,
        }))
    }

    fn consumer(&self, config: &BusConfig) -> Result<Arc<dyn Consumer>, BusError> {
        config.validate()?;
        if let Ok(mut configs) = self.state.consumer_configs.lock() {
            configs.push(config.clone());
        }

        Ok(Arc::new(InMemoryConsumer {
            bus: self.clone(),
            feed: tokio::sync::Mutex::new(self.state.feed.subscribe()),
            topics: Mutex::new(HashSet::new()),
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
        }))
    }
}

struct Pending {
    topic: String,
    payload: Vec<u8>,
    on_delivery: DeliveryCallback,
}

/// 后台投递任务：发布端被丢弃（队列关闭）后退出
async fn deliver(
    bus: InMemoryBus,
    mut queue: mpsc::UnboundedReceiver<Pending>,
    pending: Arc<watch::Sender<usize>>,
) {
    while let Some(msg) = queue.recv().await {
        let result = match bus.fault(|f| f.delivery.clone()) {
            Some(reason) => Err(BusError::Delivery {
                topic: msg.topic.clone(),
                reason,
            }),
            None => bus.append(&msg.topic, msg.payload).map(|record| Delivery {
                topic: record.topic,
                offset: record.offset,
            }),
        };
        (msg.on_delivery)(result);
        pending.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// 进程内发布端
pub struct InMemoryProducer {
    bus: InMemoryBus,
    queue: mpsc::UnboundedSender<Pending>,
    pending: Arc<watch::Sender<usize>>,
}

#[async_trait]
impl Producer for InMemoryProducer {
    fn produce(
        &self,
        topic: &str,
        payload: Vec<u8>,
        on_delivery: DeliveryCallback,
    ) -> Result<(), BusError> {
        if let Some(reason) = self.bus.fault(|f| f.publish.clone()) {
            return Err(BusError::Publish {
                topic: topic.to_string(),
                reason,
            });
        }

        self.pending.send_modify(|n| *n += 1);
        let queued = self.queue.send(Pending {
            topic: topic.to_string(),
            payload,
            on_delivery,
        });
        if queued.is_err() {
            self.pending.send_modify(|n| *n = n.saturating_sub(1));
            return Err(BusError::Publish {
                topic: topic.to_string(),
                reason: "delivery worker stopped".to_string(),
            });
        }
        Ok(())
    }

    async fn flush(&self, timeout: Duration) -> Result<(), BusError> {
        self.bus.state.flush_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.bus.fault(|f| f.flush.clone()) {
            return Err(BusError::Flush(reason));
        }

        let mut settled = self.pending.subscribe();
        let waited = tokio::time::timeout(timeout, settled.wait_for(|n| *n == 0))
            .await
            .map(|r| r.is_ok());
        match waited {
            Ok(true) => Ok(()),
            Ok(false) => Err(BusError::Flush("delivery worker stopped".to_string())),
            Err(_) => Err(BusError::FlushTimeout {
                pending: self.in_flight(),
            }),
        }
    }

    fn in_flight(&self) -> usize {
        *self.pending.borrow()
    }
}

/// 进程内订阅端
pub struct InMemoryConsumer {
    bus: InMemoryBus,
    feed: tokio::sync::Mutex<broadcast::Receiver<BusRecord>>,
    topics: Mutex<HashSet<String>>,
    shutdown: CancellationToken,
    closed: AtomicBool,
}

impl InMemoryConsumer {
    fn is_subscribed(&self, topic: &str) -> bool {
        self.topics
            .lock()
            .map(|topics| topics.contains(topic))
            .unwrap_or(false)
    }
}

#[async_trait]
impl Consumer for InMemoryConsumer {
    fn subscribe(&self, topics: &[String]) -> Result<(), BusError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Consumer("consumer already closed".to_string()));
        }
        let mut subscribed = self
            .topics
            .lock()
            .map_err(|e| BusError::Consumer(e.to_string()))?;
        subscribed.extend(topics.iter().cloned());
        Ok(())
    }

    async fn recv(&self) -> Option<BusRecord> {
        let mut feed = self.feed.lock().await;
        loop {
            let next = tokio::select! {
                _ = self.shutdown.cancelled() => return None,
                next = feed.recv() => next,
            };
            match next {
                Ok(record) if self.is_subscribed(&record.topic) => return Some(record),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "In-memory consumer lagged behind the feed");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    fn close(&self) -> Result<(), BusError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.shutdown.cancel();
            self.bus.state.closed_consumers.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
