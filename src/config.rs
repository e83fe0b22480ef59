//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `NOVA__*` 覆盖（双下划线表示嵌套，如 `NOVA__LLM__PROVIDER=mock`）。

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::bus::{BusConfig, AUTO_OFFSET_RESET, GROUP_ID};
use crate::layer::LayerKind;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub bus: BusSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub layers: LayersSection,
}

/// [bus] 段：broker 地址、消费组、flush 超时
#[derive(Debug, Clone, Deserialize)]
pub struct BusSection {
    #[serde(default = "default_bootstrap_servers")]
    pub bootstrap_servers: String,
    /// 仅订阅端使用
    #[serde(default = "default_group_id")]
    pub group_id: String,
    /// 仅订阅端使用
    #[serde(default = "default_auto_offset_reset")]
    pub auto_offset_reset: String,
    /// 每轮结束后 flush 的最长等待（秒）
    #[serde(default = "default_flush_timeout_secs")]
    pub flush_timeout_secs: u64,
    /// 透传给客户端的其他键值
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

fn default_bootstrap_servers() -> String {
    "localhost:9092".to_string()
}

fn default_group_id() -> String {
    "nova_group".to_string()
}

fn default_auto_offset_reset() -> String {
    "earliest".to_string()
}

fn default_flush_timeout_secs() -> u64 {
    30
}

impl Default for BusSection {
    fn default() -> Self {
        Self {
            bootstrap_servers: default_bootstrap_servers(),
            group_id: default_group_id(),
            auto_offset_reset: default_auto_offset_reset(),
            flush_timeout_secs: default_flush_timeout_secs(),
            properties: BTreeMap::new(),
        }
    }
}

impl BusSection {
    /// 转为完整的总线配置（订阅端视角）
    pub fn to_bus_config(&self) -> BusConfig {
        let mut config = BusConfig::new(self.bootstrap_servers.clone());
        for (key, value) in &self.properties {
            config = config.with(key.clone(), value.clone());
        }
        config
            .with(GROUP_ID, self.group_id.clone())
            .with(AUTO_OFFSET_RESET, self.auto_offset_reset.clone())
    }
}

/// [llm] 段：后端与模型
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：ollama / openai / deepseek / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_model() -> String {
    crate::llm::OLLAMA_DEFAULT_MODEL.to_string()
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
        }
    }
}

/// [layers] 段：每层一个子段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LayersSection {
    #[serde(default)]
    pub reactive: LayerSection,
    #[serde(default)]
    pub responsive: LayerSection,
    #[serde(default)]
    pub reflective: LayerSection,
}

impl LayersSection {
    pub fn get(&self, kind: LayerKind) -> &LayerSection {
        match kind {
            LayerKind::Reactive => &self.reactive,
            LayerKind::Responsive => &self.responsive,
            LayerKind::Reflective => &self.reflective,
        }
    }
}

/// [layers.<name>] 段：未设置的键沿用该层默认值
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct LayerSection {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// 单次推理超时（秒）
    pub timeout_secs: Option<u64>,
    /// 空字符串表示不发布
    pub topic: Option<String>,
    pub history_capacity: Option<usize>,
}

/// 从 config 目录加载配置，环境变量 NOVA__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 NOVA__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("NOVA")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
