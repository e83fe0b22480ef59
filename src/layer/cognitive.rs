//! 认知层：Layer 的唯一实现，行为由 LayerProfile 决定
//!
//! 每层独占一个总线句柄、一个推理客户端和一份有界历史。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::bus::{BusConfig, BusConnector, BusError, BusHandle};
use crate::layer::{
    HistoryBuffer, HistoryPolicy, Layer, LayerProfile, LayerResponse, Message,
    StageProcessingError,
};
use crate::llm::LlmClient;

pub struct CognitiveLayer {
    profile: LayerProfile,
    llm: Arc<dyn LlmClient>,
    bus: BusHandle,
    history: HistoryBuffer,
}

impl CognitiveLayer {
    /// 构造即获取总线资源；失败时不会留下半打开的句柄
    pub fn new(
        profile: LayerProfile,
        llm: Arc<dyn LlmClient>,
        connector: &dyn BusConnector,
        bus_config: &BusConfig,
        flush_timeout: Duration,
    ) -> Result<Self, BusError> {
        let bus = BusHandle::acquire(profile.kind.name(), connector, bus_config, flush_timeout)?;
        let history = HistoryBuffer::new(profile.history.capacity());
        Ok(Self {
            profile,
            llm,
            bus,
            history,
        })
    }

    pub fn profile(&self) -> &LayerProfile {
        &self.profile
    }

    /// 历史快照（Responsive 为输入上下文，Reflective 为已学到的模式）
    pub fn history(&self) -> Vec<String> {
        self.history.snapshot()
    }
}

#[async_trait]
impl Layer for CognitiveLayer {
    fn name(&self) -> &str {
        self.profile.kind.name()
    }

    fn topic(&self) -> Option<&str> {
        self.profile.topic.as_deref()
    }

    fn bus(&self) -> &BusHandle {
        &self.bus
    }

    async fn process(&mut self, message: &Message) -> Result<LayerResponse, StageProcessingError> {
        let content = message.content.as_str();

        // 当前输入总是上下文中的最新一条
        if let HistoryPolicy::Context { .. } = self.profile.history {
            self.history.push(content);
        }

        let prompt = self.profile.build_prompt(content, &self.history);
        let options = self.profile.options();
        let completion = tokio::time::timeout(
            self.profile.timeout,
            self.llm.complete(&self.profile.system_prompt, &prompt, &options),
        )
        .await
        .map_err(|_| StageProcessingError::Timeout(self.profile.timeout))??;

        // 只有调用成功才记录新模式
        if let HistoryPolicy::Patterns { .. } = self.profile.history {
            self.history.push(completion.clone());
        }

        let (context, patterns) = match self.profile.history {
            HistoryPolicy::Stateless => (None, None),
            HistoryPolicy::Context { .. } => (Some(self.history.snapshot()), None),
            HistoryPolicy::Patterns { .. } => (None, Some(self.history.snapshot())),
        };

        Ok(LayerResponse {
            kind: self.profile.kind.response_type().to_string(),
            content: completion,
            source: self.llm.model().to_string(),
            context,
            patterns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;
    use crate::llm::{LlmError, MockLlmClient};

    fn layer(profile: LayerProfile, llm: Arc<MockLlmClient>, bus: &InMemoryBus) -> CognitiveLayer {
        CognitiveLayer::new(
            profile,
            llm,
            bus,
            &BusConfig::new("localhost:9092"),
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_reactive_uses_short_low_temperature_call() {
        let bus = InMemoryBus::new();
        let llm = Arc::new(MockLlmClient::replying("llama3.2:latest", "Practice now."));
        let mut reactive = layer(LayerProfile::reactive(), llm.clone(), &bus);

        let response = reactive
            .process(&Message::user_input("I'm anxious"))
            .await
            .unwrap();

        assert_eq!(response.kind, "reactive_response");
        assert_eq!(response.content, "Practice now.");
        assert_eq!(response.source, "llama3.2:latest");
        assert!(response.context.is_none() && response.patterns.is_none());

        let call = &llm.calls()[0];
        assert_eq!(call.user_prompt, "I'm anxious");
        assert_eq!(call.options.temperature, 0.3);
        assert_eq!(call.options.max_output_tokens, Some(50));
        assert!(call.system_prompt.contains("10 words or less"));
    }

    #[tokio::test]
    async fn test_responsive_context_is_bounded() {
        let bus = InMemoryBus::new();
        let llm = Arc::new(MockLlmClient::new("m"));
        let mut responsive = layer(LayerProfile::responsive(), llm.clone(), &bus);

        let mut last = None;
        for i in 1..=7 {
            let response = responsive
                .process(&Message::user_input(format!("input {}", i)))
                .await
                .unwrap();
            let context = response.context.unwrap();
            assert!(context.len() <= 5);
            assert_eq!(context.last().map(String::as_str), Some(format!("input {}", i).as_str()));
            last = Some(context);
        }

        let expected: Vec<String> = (3..=7).map(|i| format!("input {}", i)).collect();
        assert_eq!(last.unwrap(), expected);
        assert_eq!(responsive.history(), expected);

        // 当前输入在调用前已写入上下文
        let prompt = &llm.calls()[6].user_prompt;
        assert!(prompt.starts_with("Previous context: input 3 | input 4"));
        assert!(prompt.ends_with("Current input: input 7"));
    }

    #[tokio::test]
    async fn test_zero_capacity_context_keeps_current_input() {
        let bus = InMemoryBus::new();
        let llm = Arc::new(MockLlmClient::new("m"));
        let section = crate::config::LayerSection {
            history_capacity: Some(0),
            ..Default::default()
        };
        let mut responsive = layer(LayerProfile::responsive().apply(&section), llm.clone(), &bus);

        let response = responsive
            .process(&Message::user_input("hello"))
            .await
            .unwrap();

        assert_eq!(response.context, Some(vec!["hello".to_string()]));
        assert_eq!(
            llm.calls()[0].user_prompt,
            "Previous context: hello\nCurrent input: hello"
        );
    }

    #[tokio::test]
    async fn test_reflective_keeps_patterns_only_on_success() {
        let bus = InMemoryBus::new();
        let llm = Arc::new(MockLlmClient::new("m"));
        let mut reflective = layer(LayerProfile::reflective(), llm.clone(), &bus);

        for i in 1..=4 {
            let response = reflective
                .process(&Message::user_input(format!("i{}", i)))
                .await
                .unwrap();
            assert_eq!(response.kind, "reflective_update");
            assert!(response.patterns.unwrap().len() <= 3);
        }
        let before = reflective.history();
        assert_eq!(before.len(), 3);

        llm.set_failure(Some("model crashed".into()));
        let err = reflective
            .process(&Message::user_input("i5"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StageProcessingError::Inference(LlmError::Backend("model crashed".into()))
        );
        assert_eq!(reflective.history(), before);

        let call = llm.calls().last().cloned().unwrap();
        assert_eq!(call.options.max_output_tokens, None);
    }

    #[tokio::test]
    async fn test_slow_inference_times_out() {
        let bus = InMemoryBus::new();
        let llm = Arc::new(MockLlmClient::new("m").with_delay(Duration::from_millis(200)));
        let profile = LayerProfile::reflective().with_timeout(Duration::from_millis(20));
        let mut reflective = layer(profile, llm, &bus);

        let err = reflective
            .process(&Message::user_input("slow"))
            .await
            .unwrap_err();
        assert_eq!(err, StageProcessingError::Timeout(Duration::from_millis(20)));
        assert!(reflective.history().is_empty());
    }
}
