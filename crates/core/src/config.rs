use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::paths::Paths;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,
    #[serde(default = "default_ollama_model")]
    pub model_id: String,
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "qwen2.5:7b".to_string()
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model_id: default_ollama_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenAiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_openai_model")]
    pub model_id: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
}

fn default_openai_model() -> String {
    "gpt-4o".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model_id: default_openai_model(),
            base_url: default_openai_base_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub deployment_name: String,
    #[serde(default = "default_azure_api_version")]
    pub api_version: String,
}

fn default_azure_api_version() -> String {
    "2024-10-21".to_string()
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            deployment_name: String::new(),
            api_version: default_azure_api_version(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDefaults {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_llm_max_retries")]
    pub llm_max_retries: u32,
    #[serde(default = "default_llm_retry_delay_ms")]
    pub llm_retry_delay_ms: u64,
    /// Sliding-window size for the conversation transcript (system prompt
    /// and instruction are always kept on top of this).
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

fn default_max_iterations() -> u32 {
    15
}

fn default_llm_max_retries() -> u32 {
    3
}

fn default_llm_retry_delay_ms() -> u64 {
    2000
}

fn default_max_history() -> usize {
    20
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            llm_max_retries: default_llm_max_retries(),
            llm_retry_delay_ms: default_llm_retry_delay_ms(),
            max_history: default_max_history(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Which decision provider drives the loop: "ollama", "openai" or "azure".
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub azure: AzureConfig,
    #[serde(default)]
    pub headless: bool,
    #[serde(default)]
    pub use_mcp: bool,
    #[serde(default = "default_playwright_mcp_version")]
    pub playwright_mcp_version: String,
    #[serde(default)]
    pub agent: AgentDefaults,
    /// Named secrets referenced as {{NAME}} placeholders in tool arguments.
    /// Resolved only at the automation boundary, never echoed back.
    #[serde(default)]
    pub secrets: HashMap<String, String>,
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_playwright_mcp_version() -> String {
    "0.0.68".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            ollama: OllamaConfig::default(),
            openai: OpenAiConfig::default(),
            azure: AzureConfig::default(),
            headless: false,
            use_mcp: false,
            playwright_mcp_version: default_playwright_mcp_version(),
            agent: AgentDefaults::default(),
            secrets: HashMap::new(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load the config file if present, fall back to defaults, then overlay
    /// environment variables on top (env wins over file).
    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        let mut config = if config_path.exists() {
            Self::load(&config_path)?
        } else {
            Self::default()
        };
        config.overlay(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overlay provider/runtime settings from an environment-style lookup.
    pub fn overlay(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(v) = get("LLM_PROVIDER") {
            self.provider = v.trim().to_lowercase();
        }
        if let Some(v) = get("OLLAMA_BASE_URL") {
            self.ollama.base_url = v;
        }
        if let Some(v) = get("OLLAMA_MODEL_ID") {
            self.ollama.model_id = v;
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.openai.api_key = v;
        }
        if let Some(v) = get("OPENAI_MODEL_ID") {
            self.openai.model_id = v;
        }
        if let Some(v) = get("OPENAI_BASE_URL") {
            self.openai.base_url = v;
        }
        if let Some(v) = get("AZURE_OPENAI_ENDPOINT") {
            self.azure.endpoint = v;
        }
        if let Some(v) = get("AZURE_OPENAI_API_KEY") {
            self.azure.api_key = v;
        }
        if let Some(v) = get("AZURE_OPENAI_DEPLOYMENT_NAME") {
            self.azure.deployment_name = v;
        }
        if let Some(v) = get("AZURE_OPENAI_API_VERSION") {
            self.azure.api_version = v;
        }
        if let Some(v) = get("HEADLESS") {
            self.headless = parse_bool(&v);
        }
        if let Some(v) = get("USE_MCP") {
            self.use_mcp = parse_bool(&v);
        }
        if let Some(v) = get("PLAYWRIGHT_MCP_VERSION") {
            self.playwright_mcp_version = v;
        }
        if let Some(v) = get("WEBPILOT_MAX_ITERATIONS") {
            if let Ok(n) = v.trim().parse::<u32>() {
                self.agent.max_iterations = n;
            }
        }
    }

    /// Resolve a named secret. `WEBPILOT_SECRET_<NAME>` env vars take
    /// precedence over the config file's secret map.
    pub fn secret(&self, name: &str) -> Option<String> {
        if let Ok(v) = std::env::var(format!("WEBPILOT_SECRET_{}", name)) {
            if !v.is_empty() {
                return Some(v);
            }
        }
        self.secrets.get(name).cloned()
    }

    /// Validate that the selected provider has the credentials it needs.
    pub fn validate_provider(&self) -> Result<()> {
        match self.provider.as_str() {
            "ollama" => {
                if self.ollama.base_url.trim().is_empty() {
                    return Err(Error::Config("OLLAMA_BASE_URL is empty".into()));
                }
            }
            "openai" => {
                if self.openai.api_key.trim().is_empty() {
                    return Err(Error::Config("OPENAI_API_KEY is not set".into()));
                }
            }
            "azure" => {
                if self.azure.endpoint.trim().is_empty() {
                    return Err(Error::Config("AZURE_OPENAI_ENDPOINT is not set".into()));
                }
                if self.azure.api_key.trim().is_empty() {
                    return Err(Error::Config("AZURE_OPENAI_API_KEY is not set".into()));
                }
                if self.azure.deployment_name.trim().is_empty() {
                    return Err(Error::Config("AZURE_OPENAI_DEPLOYMENT_NAME is not set".into()));
                }
            }
            other => {
                return Err(Error::Config(format!(
                    "Unknown provider '{}' (expected ollama, openai or azure)",
                    other
                )));
            }
        }
        Ok(())
    }
}

fn parse_bool(v: &str) -> bool {
    matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.provider, "ollama");
        assert_eq!(cfg.agent.max_iterations, 15);
        assert_eq!(cfg.azure.api_version, "2024-10-21");
        assert!(!cfg.use_mcp);
    }

    #[test]
    fn test_yaml_partial_parse() {
        let raw = "provider: openai\nopenai:\n  apiKey: sk-test\nheadless: true\n";
        let cfg: Config = serde_yaml::from_str(raw).unwrap();
        assert_eq!(cfg.provider, "openai");
        assert_eq!(cfg.openai.api_key, "sk-test");
        assert_eq!(cfg.openai.model_id, "gpt-4o");
        assert!(cfg.headless);
    }

    #[test]
    fn test_env_overlay_wins() {
        let mut cfg = Config::default();
        let env: HashMap<&str, &str> = [
            ("LLM_PROVIDER", "Azure"),
            ("AZURE_OPENAI_ENDPOINT", "https://res.openai.azure.com"),
            ("AZURE_OPENAI_API_KEY", "k"),
            ("AZURE_OPENAI_DEPLOYMENT_NAME", "gpt-4o"),
            ("USE_MCP", "true"),
            ("WEBPILOT_MAX_ITERATIONS", "30"),
        ]
        .into_iter()
        .collect();
        cfg.overlay(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.provider, "azure");
        assert!(cfg.use_mcp);
        assert_eq!(cfg.agent.max_iterations, 30);
        assert!(cfg.validate_provider().is_ok());
    }

    #[test]
    fn test_validate_missing_credentials() {
        let mut cfg = Config::default();
        cfg.provider = "openai".into();
        assert!(matches!(cfg.validate_provider(), Err(Error::Config(_))));
        cfg.provider = "groq".into();
        assert!(matches!(cfg.validate_provider(), Err(Error::Config(_))));
    }
}
