//! Ollama 本地模型客户端
//!
//! Ollama 在 `/v1` 下暴露 OpenAI 兼容接口，直接复用 OpenAiClient；本地服务不校验 API Key。

use crate::llm::OpenAiClient;

pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
pub const OLLAMA_DEFAULT_MODEL: &str = "llama3.2:latest";

/// 创建 Ollama 客户端
///
/// - `base_url` 为空时依次尝试 `OLLAMA_BASE_URL` 环境变量与本机默认端口
/// - `model` 为空时使用 `llama3.2:latest`
pub fn create_ollama_client(base_url: Option<&str>, model: Option<&str>) -> OpenAiClient {
    let base_url = base_url
        .map(String::from)
        .or_else(|| std::env::var("OLLAMA_BASE_URL").ok())
        .unwrap_or_else(|| OLLAMA_BASE_URL.to_string());
    let model = model.unwrap_or(OLLAMA_DEFAULT_MODEL);

    OpenAiClient::new(Some(&base_url), model, Some("ollama"))
}
