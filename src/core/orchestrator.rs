//! NOVA 编排器：主控流程
//!
//! 每条输入消息：并发启动所有层的 process（经 timed_process 包装）→ 逐层收集结果，
//! 单层失败转为 `{type: "<layer>_error", content}` 数据而不影响兄弟层 → 各层结果发布到自己的 topic →
//! 按固定顺序 flush 所有层的发布端（flush 失败会终止本轮）→ 返回完整的结果映射。

use std::collections::{BTreeMap, HashSet};

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};

use crate::core::{LayerState, NovaError, RoundPhase};
use crate::layer::{timed_process, unix_now, Layer, LayerResponse, Message, Timed, Timing};

/// 一轮的结果：层名 → 成功结果或隔离后的错误
pub type RoundResults = BTreeMap<String, LayerOutcome>;

/// 单层失败的数据表示
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerFailure {
    #[serde(skip)]
    pub layer: String,
    /// `<layer>_error`
    #[serde(rename = "type")]
    pub kind: String,
    /// 失败原因
    pub content: String,
}

impl LayerFailure {
    pub fn new(layer: &str, message: impl Into<String>) -> Self {
        Self {
            layer: layer.to_string(),
            kind: format!("{}_error", layer),
            content: message.into(),
        }
    }
}

/// 单层在一轮中的产出
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LayerOutcome {
    Completed(Timed<LayerResponse>),
    Failed(LayerFailure),
}

impl LayerOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn response(&self) -> Option<&LayerResponse> {
        match self {
            Self::Completed(timed) => Some(&timed.value),
            Self::Failed(_) => None,
        }
    }

    pub fn timing(&self) -> Option<&Timing> {
        match self {
            Self::Completed(timed) => Some(&timed.timing),
            Self::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&LayerFailure> {
        match self {
            Self::Completed(_) => None,
            Self::Failed(failure) => Some(failure),
        }
    }

    /// type 标签（成功为层特定标签，失败为 `<layer>_error`）
    pub fn kind(&self) -> &str {
        match self {
            Self::Completed(timed) => &timed.value.kind,
            Self::Failed(failure) => &failure.kind,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::Completed(timed) => &timed.value.content,
            Self::Failed(failure) => &failure.content,
        }
    }

    fn state(&self) -> LayerState {
        match self {
            Self::Completed(_) => LayerState::Done,
            Self::Failed(_) => LayerState::Failed,
        }
    }
}

/// 编排器：持有全部层，生命周期内层集合不变
pub struct Nova {
    layers: Vec<Box<dyn Layer>>,
    phase: RoundPhase,
    rounds: u64,
}

impl Nova {
    /// 层的顺序即 flush / close 的顺序；层名必须唯一
    pub fn new(layers: Vec<Box<dyn Layer>>) -> Result<Self, NovaError> {
        let mut seen = HashSet::new();
        for layer in &layers {
            if !seen.insert(layer.name().to_string()) {
                return Err(NovaError::DuplicateLayer(layer.name().to_string()));
            }
        }
        Ok(Self {
            layers,
            phase: RoundPhase::Idle,
            rounds: 0,
        })
    }

    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.name()).collect()
    }

    pub fn layer(&self, name: &str) -> Option<&dyn Layer> {
        self.layers
            .iter()
            .find(|l| l.name() == name)
            .map(|l| l.as_ref())
    }

    /// 当前（或最近一轮结束时）的阶段
    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    /// 已开始的轮数
    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    /// 处理一条消息；单层失败作为数据返回，只有 flush 失败会返回 Err
    pub async fn process_message(&mut self, message: &Message) -> Result<RoundResults, NovaError> {
        self.rounds += 1;
        let round = self.rounds;
        let round_id = uuid::Uuid::new_v4();
        tracing::info!(
            round,
            %round_id,
            layers = self.layers.len(),
            timestamp = unix_now(),
            "Starting parallel processing"
        );

        self.set_phase(RoundPhase::FannedOut);
        let settled = join_all(
            self.layers
                .iter_mut()
                .map(|layer| run_layer(layer.as_mut(), message)),
        )
        .await;
        self.set_phase(RoundPhase::AllSettled);

        self.set_phase(RoundPhase::Flushing);
        if let Err(e) = self.flush().await {
            self.set_phase(RoundPhase::FlushFailed);
            tracing::error!(round, error = %e, "Failed to flush producers");
            return Err(e);
        }
        self.set_phase(RoundPhase::Complete);

        let failed = settled.iter().filter(|(_, o)| !o.is_success()).count();
        tracing::info!(round, %round_id, failed, timestamp = unix_now(), "All processing completed");
        Ok(settled.into_iter().collect())
    }

    /// 按层顺序 flush 各层发布端，遇到第一个失败即返回
    pub async fn flush(&self) -> Result<(), NovaError> {
        for layer in &self.layers {
            layer.bus().flush().await.map_err(|source| NovaError::Flush {
                layer: layer.name().to_string(),
                source,
            })?;
        }
        Ok(())
    }

    /// 关闭所有层的总线句柄；每层都会尝试，返回第一个错误。可重复调用。
    pub async fn close(&mut self) -> Result<(), NovaError> {
        let mut first_err = None;
        for layer in &self.layers {
            if let Err(source) = layer.bus().close().await {
                tracing::error!(layer = layer.name(), error = %source, "Failed to close layer");
                if first_err.is_none() {
                    first_err = Some(NovaError::Close {
                        layer: layer.name().to_string(),
                        source,
                    });
                }
            }
        }
        self.set_phase(RoundPhase::Idle);
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn set_phase(&mut self, phase: RoundPhase) {
        tracing::debug!(from = ?self.phase, to = ?phase, "Round phase changed");
        self.phase = phase;
    }
}

/// 运行单层：计时、隔离失败、发布结果
async fn run_layer(layer: &mut dyn Layer, message: &Message) -> (String, LayerOutcome) {
    let name = layer.name().to_string();
    tracing::debug!(layer = %name, state = ?LayerState::Running, "Layer started");

    let outcome = match timed_process(&name, layer.process(message)).await {
        Ok(timed) => LayerOutcome::Completed(timed),
        Err(e) => {
            tracing::error!(layer = %name, error = %e, "Error in layer");
            LayerOutcome::Failed(LayerFailure::new(&name, e.to_string()))
        }
    };
    tracing::debug!(layer = %name, state = ?outcome.state(), "Layer settled");

    if let Some(topic) = layer.topic() {
        layer.bus().publish(topic, &outcome);
    }
    (name, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::bus::{BusConfig, BusHandle, InMemoryBus};
    use crate::layer::StageProcessingError;
    use crate::llm::LlmError;

    /// 按脚本返回的测试层，可选延迟
    struct ScriptedLayer {
        name: &'static str,
        reply: Result<&'static str, &'static str>,
        delay: Duration,
        bus: BusHandle,
    }

    impl ScriptedLayer {
        fn new(
            name: &'static str,
            reply: Result<&'static str, &'static str>,
            delay_ms: u64,
            bus: &InMemoryBus,
        ) -> Box<dyn Layer> {
            let handle = BusHandle::acquire(
                name,
                bus,
                &BusConfig::new("localhost:9092"),
                Duration::from_secs(1),
            )
            .unwrap();
            Box::new(Self {
                name,
                reply,
                delay: Duration::from_millis(delay_ms),
                bus: handle,
            })
        }
    }

    #[async_trait]
    impl Layer for ScriptedLayer {
        fn name(&self) -> &str {
            self.name
        }

        fn topic(&self) -> Option<&str> {
            Some(self.name)
        }

        fn bus(&self) -> &BusHandle {
            &self.bus
        }

        async fn process(
            &mut self,
            message: &Message,
        ) -> Result<LayerResponse, StageProcessingError> {
            tokio::time::sleep(self.delay).await;
            match self.reply {
                Ok(text) => Ok(LayerResponse {
                    kind: format!("{}_response", self.name),
                    content: format!("{}: {}", text, message.content),
                    source: "scripted".to_string(),
                    context: None,
                    patterns: None,
                }),
                Err(reason) => Err(StageProcessingError::Inference(LlmError::Backend(
                    reason.to_string(),
                ))),
            }
        }
    }

    #[tokio::test]
    async fn test_layers_run_concurrently() {
        let bus = InMemoryBus::new();
        let mut nova = Nova::new(vec![
            ScriptedLayer::new("a", Ok("A"), 100, &bus),
            ScriptedLayer::new("b", Ok("B"), 100, &bus),
            ScriptedLayer::new("c", Ok("C"), 100, &bus),
        ])
        .unwrap();

        let started = std::time::Instant::now();
        let results = nova.process_message(&Message::user_input("x")).await.unwrap();
        // 串行至少 300ms
        assert!(started.elapsed() < Duration::from_millis(250));
        assert_eq!(results.len(), 3);
        assert_eq!(results["b"].content(), "B: x");
    }

    #[tokio::test]
    async fn test_failure_is_isolated_and_published() {
        let bus = InMemoryBus::new();
        let mut nova = Nova::new(vec![
            ScriptedLayer::new("fast", Ok("ok"), 0, &bus),
            ScriptedLayer::new("broken", Err("no model"), 10, &bus),
            ScriptedLayer::new("slow", Ok("ok"), 50, &bus),
        ])
        .unwrap();

        let results = nova.process_message(&Message::user_input("x")).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results["fast"].is_success());
        assert!(results["slow"].is_success());

        let failure = results["broken"].failure().unwrap();
        assert_eq!(failure.kind, "broken_error");
        assert!(failure.content.contains("no model"));

        // flush 之后各层结果都已落到各自的 topic
        let published = bus.records("broken");
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].json().unwrap()["type"], "broken_error");
        assert_eq!(bus.records("slow")[0].json().unwrap()["type"], "slow_response");
        assert_eq!(nova.phase(), RoundPhase::Complete);
    }

    #[tokio::test]
    async fn test_flush_failure_terminates_round() {
        let bus = InMemoryBus::new();
        let mut nova = Nova::new(vec![
            ScriptedLayer::new("a", Ok("A"), 0, &bus),
            ScriptedLayer::new("b", Ok("B"), 0, &bus),
        ])
        .unwrap();
        bus.fail_flushes(Some("broker unreachable"));

        let err = nova
            .process_message(&Message::user_input("x"))
            .await
            .unwrap_err();
        match err {
            NovaError::Flush { layer, source } => {
                assert_eq!(layer, "a");
                assert_eq!(source.to_string(), "Flush failed: broker unreachable");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(nova.phase(), RoundPhase::FlushFailed);
        assert!(nova.phase().is_between_rounds());

        // 总线恢复后下一轮正常完成
        bus.fail_flushes(None);
        assert!(nova.process_message(&Message::user_input("y")).await.is_ok());
        assert_eq!(nova.rounds(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_layer_names_rejected() {
        let bus = InMemoryBus::new();
        let err = Nova::new(vec![
            ScriptedLayer::new("a", Ok("A"), 0, &bus),
            ScriptedLayer::new("a", Ok("A"), 0, &bus),
        ])
        .err()
        .unwrap();
        assert!(matches!(err, NovaError::DuplicateLayer(name) if name == "a"));
    }

    #[tokio::test]
    async fn test_close_twice() {
        let bus = InMemoryBus::new();
        let mut nova = Nova::new(vec![
            ScriptedLayer::new("a", Ok("A"), 0, &bus),
            ScriptedLayer::new("b", Ok("B"), 0, &bus),
        ])
        .unwrap();

        nova.process_message(&Message::user_input("x")).await.unwrap();
        nova.close().await.unwrap();
        nova.close().await.unwrap();

        assert_eq!(bus.closed_consumers(), 2);
        assert!(nova.layer("a").unwrap().bus().is_closed());
        assert_eq!(nova.layer_names(), vec!["a", "b"]);
    }

    #[test]
    fn test_failure_entry_shape() {
        let failure = LayerOutcome::Failed(LayerFailure::new("reflective", "boom"));
        assert_eq!(
            serde_json::to_value(&failure).unwrap(),
            serde_json::json!({"type": "reflective_error", "content": "boom"})
        );
        assert_eq!(failure.kind(), "reflective_error");
        assert!(failure.timing().is_none());
    }
}
