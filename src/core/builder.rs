//! Nova 构建器：按配置组装三层，统一选择推理后端与总线连接器

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::bus::{BusConnector, InMemoryBus};
use crate::config::{AppConfig, LlmSection};
use crate::core::{Nova, NovaError};
use crate::layer::{CognitiveLayer, Layer, LayerKind, LayerProfile};
use crate::llm::{
    create_deepseek_client, create_ollama_client, LlmClient, MockLlmClient, OpenAiClient,
};

/// 根据 [llm] 段选择推理后端（Ollama / OpenAI 兼容 / DeepSeek / Mock）
pub fn create_llm_from_config(cfg: &LlmSection) -> Arc<dyn LlmClient> {
    match cfg.provider.to_lowercase().as_str() {
        "ollama" => {
            tracing::info!("Using Ollama LLM ({})", cfg.model);
            Arc::new(create_ollama_client(cfg.base_url.as_deref(), Some(&cfg.model)))
        }
        "openai" => {
            tracing::info!("Using OpenAI LLM ({})", cfg.model);
            Arc::new(OpenAiClient::new(
                cfg.base_url.as_deref(),
                &cfg.model,
                std::env::var("OPENAI_API_KEY").ok().as_deref(),
            ))
        }
        "deepseek" => {
            tracing::info!("Using DeepSeek LLM ({})", cfg.model);
            Arc::new(create_deepseek_client(Some(&cfg.model)))
        }
        "mock" => Arc::new(MockLlmClient::new(cfg.model.clone())),
        other => {
            tracing::warn!("Unknown LLM provider '{}', using Mock LLM", other);
            Arc::new(MockLlmClient::new(cfg.model.clone()))
        }
    }
}

/// Nova 构建器
pub struct NovaBuilder {
    config: AppConfig,
    connector: Option<Arc<dyn BusConnector>>,
    llm: Option<Arc<dyn LlmClient>>,
    layer_llms: HashMap<LayerKind, Arc<dyn LlmClient>>,
    profiles: HashMap<LayerKind, LayerProfile>,
}

impl NovaBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            connector: None,
            llm: None,
            layer_llms: HashMap::new(),
            profiles: HashMap::new(),
        }
    }

    /// 总线连接器；默认使用进程内总线
    pub fn with_connector(mut self, connector: Arc<dyn BusConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// 所有层共用的推理后端；默认按 [llm] 段创建
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// 为单层指定推理后端
    pub fn with_layer_llm(mut self, kind: LayerKind, llm: Arc<dyn LlmClient>) -> Self {
        self.layer_llms.insert(kind, llm);
        self
    }

    /// 直接替换某层的完整配置（忽略 [layers] 段）
    pub fn with_profile(mut self, profile: LayerProfile) -> Self {
        self.profiles.insert(profile.kind, profile);
        self
    }

    /// 按 Reactive → Responsive → Reflective 的顺序创建各层；任一层失败时已创建的层随之释放
    pub fn build(mut self) -> Result<Nova, NovaError> {
        let connector = self
            .connector
            .take()
            .unwrap_or_else(|| Arc::new(InMemoryBus::new()));
        let default_llm = self
            .llm
            .take()
            .unwrap_or_else(|| create_llm_from_config(&self.config.llm));
        let bus_config = self.config.bus.to_bus_config();
        let flush_timeout = Duration::from_secs(self.config.bus.flush_timeout_secs);

        let mut layers: Vec<Box<dyn Layer>> = Vec::with_capacity(LayerKind::ALL.len());
        for kind in LayerKind::ALL {
            let profile = self.profiles.remove(&kind).unwrap_or_else(|| {
                LayerProfile::for_kind(kind).apply(self.config.layers.get(kind))
            });
            let llm = self
                .layer_llms
                .remove(&kind)
                .unwrap_or_else(|| Arc::clone(&default_llm));
            let layer = CognitiveLayer::new(
                profile,
                llm,
                connector.as_ref(),
                &bus_config,
                flush_timeout,
            )
            .map_err(|source| NovaError::BusSetup {
                layer: kind.name().to_string(),
                source,
            })?;
            layers.push(Box::new(layer));
        }

        Nova::new(layers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayerSection;

    #[tokio::test]
    async fn test_build_registers_three_layers() {
        let bus = Arc::new(InMemoryBus::new());
        let nova = NovaBuilder::new(AppConfig::default())
            .with_connector(bus.clone())
            .with_llm(Arc::new(MockLlmClient::new("m")))
            .build()
            .unwrap();

        assert_eq!(nova.layer_names(), vec!["reactive", "responsive", "reflective"]);
        assert_eq!(nova.layer("reflective").unwrap().topic(), Some("nova.reflective"));
        assert_eq!(bus.producer_configs().len(), 3);
        assert_eq!(bus.consumer_configs().len(), 3);
    }

    #[tokio::test]
    async fn test_build_applies_layer_sections() {
        let mut config = AppConfig::default();
        config.layers.reactive = LayerSection {
            topic: Some(String::new()),
            ..LayerSection::default()
        };

        let nova = NovaBuilder::new(config)
            .with_llm(Arc::new(MockLlmClient::new("m")))
            .build()
            .unwrap();
        assert_eq!(nova.layer("reactive").unwrap().topic(), None);
    }

    #[tokio::test]
    async fn test_build_fails_without_bootstrap_servers() {
        let mut config = AppConfig::default();
        config.bus.bootstrap_servers = String::new();

        let err = NovaBuilder::new(config)
            .with_llm(Arc::new(MockLlmClient::new("m")))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, NovaError::BusSetup { ref layer, .. } if layer == "reactive"));
    }

    #[test]
    fn test_unknown_provider_falls_back_to_mock() {
        let section = LlmSection {
            provider: "nope".to_string(),
            model: "x".to_string(),
            base_url: None,
        };
        let llm = create_llm_from_config(&section);
        assert_eq!(llm.model(), "x");
    }
}
