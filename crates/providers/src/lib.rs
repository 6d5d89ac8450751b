pub mod azure;
pub mod factory;
pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use serde_json::Value;
use webpilot_core::types::{ChatMessage, LLMResponse};
use webpilot_core::Result;

/// The decision function: given the transcript and the advertised tool
/// schemas, return the model's next move (text and/or tool calls).
#[async_trait]
pub trait Provider: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage], tools: &[Value]) -> Result<LLMResponse>;
}

pub use azure::AzureProvider;
pub use factory::create_provider;
pub use ollama::OllamaProvider;
pub use openai::OpenAIProvider;
