use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use webpilot_core::types::{ChatMessage, LLMResponse, ToolCallRequest};
use webpilot_core::{Error, Result};

use crate::Provider;

pub struct OllamaProvider {
    client: Client,
    api_base: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(api_base: &str, model: &str) -> Self {
        // Local inference can be slow; allow a long timeout.
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// Strip "ollama/" prefix from model names.
    /// Config may store "ollama/llama3" but the API expects "llama3".
    fn normalize_model(model: &str) -> &str {
        model.strip_prefix("ollama/").unwrap_or(model)
    }

    /// Convert ChatMessage list to the Ollama chat format (string content only).
    fn convert_messages(messages: &[ChatMessage]) -> Vec<OllamaMessage> {
        messages
            .iter()
            .map(|msg| OllamaMessage {
                role: msg.role.clone(),
                content: msg.content.as_str().unwrap_or("").to_string(),
            })
            .collect()
    }

    /// Build a text description of tools to inject into the system prompt
    /// for models that don't support native tool calling.
    fn build_tools_prompt(tools: &[Value]) -> String {
        let mut s = String::new();
        s.push_str("\n\n## Available Tools\n");
        s.push_str("You MUST use tools to accomplish tasks. To call a tool, output a `<tool_call>` block with JSON inside.\n");
        s.push_str("You may call multiple tools in one response. Each call must be a separate `<tool_call>` block.\n\n");
        s.push_str("Format:\n```\n<tool_call>\n{\"name\": \"tool_name\", \"arguments\": {\"param1\": \"value1\"}}\n</tool_call>\n```\n\n");
        s.push_str("Tools:\n");

        for tool in tools {
            if let Some(func) = tool.get("function") {
                let name = func.get("name").and_then(|v| v.as_str()).unwrap_or("unknown");
                let desc = func.get("description").and_then(|v| v.as_str()).unwrap_or("");
                let params = func.get("parameters").cloned().unwrap_or(Value::Null);
                s.push_str(&format!("### {}\n{}\n", name, desc));
                if !params.is_null() {
                    if let Ok(params_str) = serde_json::to_string_pretty(&params) {
                        s.push_str(&format!("Parameters: {}\n", params_str));
                    }
                }
                s.push('\n');
            }
        }
        s
    }

    /// Parse `<tool_call>...</tool_call>` blocks from text content.
    fn parse_text_tool_calls(content: &str) -> (String, Vec<ToolCallRequest>) {
        let mut tool_calls = Vec::new();
        let mut remaining = String::new();
        let mut rest = content;
        let mut call_index = 0u64;

        loop {
            if let Some(start) = rest.find("<tool_call>") {
                remaining.push_str(&rest[..start]);
                let after_tag = &rest[start + "<tool_call>".len()..];
                if let Some(end) = after_tag.find("</tool_call>") {
                    let json_str = after_tag[..end].trim();
                    if let Ok(val) = serde_json::from_str::<Value>(json_str) {
                        let name = val
                            .get("name")
                            .and_then(|v| v.as_str())
                            .unwrap_or("unknown")
                            .to_string();
                        let arguments = val
                            .get("arguments")
                            .cloned()
                            .unwrap_or(Value::Object(serde_json::Map::new()));
                        tool_calls.push(ToolCallRequest {
                            id: format!("ollama_call_{}", call_index),
                            name,
                            arguments,
                        });
                        call_index += 1;
                    } else {
                        warn!(json = %json_str, "Failed to parse tool_call JSON from Ollama");
                        remaining.push_str(&rest[start..start + "<tool_call>".len() + end + "</tool_call>".len()]);
                    }
                    rest = &after_tag[end + "</tool_call>".len()..];
                } else {
                    remaining.push_str(&rest[start..]);
                    break;
                }
            } else {
                remaining.push_str(rest);
                break;
            }
        }

        (remaining.trim().to_string(), tool_calls)
    }

    /// Try the Ollama /api/chat endpoint with native tool support.
    async fn chat_native(&self, messages: &[ChatMessage], tools: &[Value]) -> Result<LLMResponse> {
        let url = format!("{}/api/chat", self.api_base);
        let model = Self::normalize_model(&self.model);
        let ollama_messages = Self::convert_messages(messages);

        let mut request = serde_json::json!({
            "model": model,
            "messages": ollama_messages,
            "stream": false,
        });

        if !tools.is_empty() {
            request["tools"] = Value::Array(tools.to_vec());
        }

        info!(
            url = %url,
            model = %model,
            tools_count = tools.len(),
            messages_count = messages.len(),
            "Calling Ollama API"
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Ollama request failed: {}", e)))?;

        let status = response.status();
        let raw_body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            error!(status = %status, body = %raw_body, "Ollama API error");
            return Err(Error::Provider(format!(
                "Ollama API error {}: {}",
                status, raw_body
            )));
        }

        debug!(body_len = raw_body.len(), "Ollama raw response");

        let resp: OllamaChatResponse = serde_json::from_str(&raw_body).map_err(|e| {
            let preview_end = raw_body
                .char_indices()
                .nth(500)
                .map(|(i, _)| i)
                .unwrap_or(raw_body.len());
            Error::Provider(format!(
                "Failed to parse Ollama response: {}. Body: {}",
                e,
                &raw_body[..preview_end]
            ))
        })?;

        let content = resp.message.content.clone();

        let mut tool_calls: Vec<ToolCallRequest> = Vec::new();
        if let Some(native_calls) = &resp.message.tool_calls {
            for (i, tc) in native_calls.iter().enumerate() {
                if let Some(func) = &tc.function {
                    tool_calls.push(ToolCallRequest {
                        id: format!("ollama_call_{}", i),
                        name: func.name.clone(),
                        arguments: func.arguments.clone(),
                    });
                }
            }
        }

        // If no native tool calls but tools were requested, try parsing text-based tool calls
        let (final_content, final_tool_calls) = if tool_calls.is_empty() && !tools.is_empty() {
            let (remaining, parsed) = Self::parse_text_tool_calls(&content);
            if !parsed.is_empty() {
                (remaining, parsed)
            } else {
                (content, tool_calls)
            }
        } else {
            (content, tool_calls)
        };

        let usage = serde_json::json!({
            "prompt_tokens": resp.prompt_eval_count,
            "completion_tokens": resp.eval_count,
        });

        let finish_reason = if !final_tool_calls.is_empty() {
            "tool_calls".to_string()
        } else if resp.done.unwrap_or(true) {
            "stop".to_string()
        } else {
            "length".to_string()
        };

        Ok(LLMResponse {
            content: if final_content.is_empty() {
                None
            } else {
                Some(final_content)
            },
            reasoning_content: None,
            tool_calls: final_tool_calls,
            finish_reason,
            usage,
        })
    }

    /// Fallback: inject tools into the system prompt as text for models
    /// without native tool support.
    async fn chat_text_tools(&self, messages: &[ChatMessage], tools: &[Value]) -> Result<LLMResponse> {
        let tools_prompt = Self::build_tools_prompt(tools);

        let mut modified_messages = messages.to_vec();
        if let Some(sys_msg) = modified_messages.first_mut() {
            if sys_msg.role == "system" {
                if let Some(text) = sys_msg.content.as_str() {
                    sys_msg.content = Value::String(format!("{}{}", text, tools_prompt));
                }
            }
        } else {
            modified_messages.insert(0, ChatMessage::system(&tools_prompt));
        }

        let url = format!("{}/api/chat", self.api_base);
        let model = Self::normalize_model(&self.model);
        let ollama_messages = Self::convert_messages(&modified_messages);

        let request = serde_json::json!({
            "model": model,
            "messages": ollama_messages,
            "stream": false,
        });

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Ollama request failed: {}", e)))?;

        let status = response.status();
        let raw_body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(Error::Provider(format!(
                "Ollama API error {}: {}",
                status, raw_body
            )));
        }

        let resp: OllamaChatResponse = serde_json::from_str(&raw_body)
            .map_err(|e| Error::Provider(format!("Failed to parse Ollama response: {}", e)))?;

        let (remaining, tool_calls) = Self::parse_text_tool_calls(&resp.message.content);

        let usage = serde_json::json!({
            "prompt_tokens": resp.prompt_eval_count,
            "completion_tokens": resp.eval_count,
        });

        Ok(LLMResponse {
            content: if remaining.is_empty() {
                None
            } else {
                Some(remaining)
            },
            reasoning_content: None,
            tool_calls,
            finish_reason: "stop".to_string(),
            usage,
        })
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    async fn chat(&self, messages: &[ChatMessage], tools: &[Value]) -> Result<LLMResponse> {
        match self.chat_native(messages, tools).await {
            Ok(resp) => Ok(resp),
            Err(e) => {
                // If native fails and we have tools, try text-based fallback
                if !tools.is_empty() {
                    warn!(error = %e, "Ollama native tool call failed, trying text-based fallback");
                    self.chat_text_tools(messages, tools).await
                } else {
                    Err(e)
                }
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
    #[serde(default)]
    done: Option<bool>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    #[allow(dead_code)]
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Option<Vec<OllamaToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OllamaToolCall {
    function: Option<OllamaFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct OllamaFunctionCall {
    name: String,
    arguments: Value,
}
