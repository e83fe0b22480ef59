//! 总线连接配置
//!
//! 以 Kafka 风格的键值表表达（`bootstrap.servers`、`group.id`、`auto.offset.reset` 等）。
//! 订阅端使用完整配置；发布端只取 broker 地址，消费组相关字段对纯发布者没有意义。

use std::collections::BTreeMap;

use crate::bus::BusError;

pub const BOOTSTRAP_SERVERS: &str = "bootstrap.servers";
pub const GROUP_ID: &str = "group.id";
pub const AUTO_OFFSET_RESET: &str = "auto.offset.reset";

/// 总线连接配置（只读，构造各层时按值复制）
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BusConfig {
    properties: BTreeMap<String, String>,
}

impl BusConfig {
    pub fn new(bootstrap_servers: impl Into<String>) -> Self {
        Self::default().with(BOOTSTRAP_SERVERS, bootstrap_servers)
    }

    /// 设置任意键值（后设置的覆盖先设置的）
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn bootstrap_servers(&self) -> Option<&str> {
        self.get(BOOTSTRAP_SERVERS)
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// 发布端配置：只保留 broker 地址
    pub fn publisher_subset(&self) -> BusConfig {
        let mut subset = BusConfig::default();
        if let Some(servers) = self.bootstrap_servers() {
            subset = subset.with(BOOTSTRAP_SERVERS, servers);
        }
        subset
    }

    /// 缺少 broker 地址时视为非法
    pub fn validate(&self) -> Result<(), BusError> {
        match self.bootstrap_servers() {
            Some(s) if !s.trim().is_empty() => Ok(()),
            _ => Err(BusError::Config(format!("missing '{}'", BOOTSTRAP_SERVERS))),
        }
    }
}
