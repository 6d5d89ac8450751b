//! Adapts an MCP server's tool catalog into the local `Tool` trait, so the
//! loop treats MCP tools and built-in tools identically.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use webpilot_core::{Config, Error, Result};

use super::client::McpClient;
use crate::{resolve_secret_placeholders, Tool, ToolContext, ToolSchema};

/// A connected MCP server whose tools can be registered into a registry.
pub struct McpToolProvider {
    client: Arc<Mutex<McpClient>>,
}

impl McpToolProvider {
    /// Spawn the Playwright MCP server via npx at the configured version.
    pub async fn start_playwright(config: &Config) -> Result<Self> {
        which::which("npx").map_err(|_| {
            Error::Backend("npx not found on PATH; Node.js is required for MCP mode".into())
        })?;

        let package = format!("@playwright/mcp@{}", config.playwright_mcp_version);
        let mut args = vec![
            "-y".to_string(),
            package,
            "--browser".to_string(),
            "chromium".to_string(),
        ];
        if config.headless {
            args.push("--headless".to_string());
        }

        let client = McpClient::spawn("npx", &args).await?;
        Ok(Self {
            client: Arc::new(Mutex::new(client)),
        })
    }

    /// Wrap an already-connected client. Used by tests and custom servers.
    pub fn from_client(client: McpClient) -> Self {
        Self {
            client: Arc::new(Mutex::new(client)),
        }
    }

    /// The server's tools, adapted to the local `Tool` trait. Tools whose
    /// descriptors lack a name are skipped. A server that cannot produce
    /// its catalog is a dead backend: without it the run would advertise
    /// nothing but `task_complete` and spin uselessly.
    pub async fn tools(&self) -> Result<Vec<Arc<dyn Tool>>> {
        let descriptors = {
            let client = self.client.lock().await;
            client.list_tools().await.map_err(|e| match e {
                Error::Backend(_) => e,
                other => Error::Backend(format!("MCP tool catalog unavailable: {}", other)),
            })?
        };

        let tools = descriptors
            .into_iter()
            .filter_map(|descriptor| {
                let name = descriptor.get("name")?.as_str()?.to_string();
                let description = descriptor
                    .get("description")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                let parameters = descriptor
                    .get("inputSchema")
                    .cloned()
                    .unwrap_or_else(|| json!({"type": "object", "properties": {}}));

                Some(Arc::new(McpTool {
                    client: self.client.clone(),
                    // ToolSchema carries &'static str; tool descriptors live
                    // for the whole run, so leaking them is bounded.
                    name: Box::leak(name.into_boxed_str()),
                    description: Box::leak(description.into_boxed_str()),
                    parameters,
                }) as Arc<dyn Tool>)
            })
            .collect();
        Ok(tools)
    }

    /// Kill the server process.
    pub async fn shutdown(&self) {
        let mut client = self.client.lock().await;
        client.shutdown().await;
    }
}

/// One remote tool exposed by the MCP server.
struct McpTool {
    client: Arc<Mutex<McpClient>>,
    name: &'static str,
    description: &'static str,
    parameters: Value,
}

#[async_trait]
impl Tool for McpTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name,
            description: self.description,
            parameters: self.parameters.clone(),
        }
    }

    fn validate(&self, params: &Value) -> Result<()> {
        // The server validates against its own schema; only reject
        // non-object payloads it could never accept.
        if params.is_object() || params.is_null() {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "{} expects an object of arguments",
                self.name
            )))
        }
    }

    async fn execute(&self, ctx: ToolContext, params: Value) -> Result<Value> {
        let arguments = resolve_secrets_in_value(params, &ctx.config);
        let media_dir = ctx.workspace.join("media");
        let client = self.client.lock().await;
        let text = client.call_tool(self.name, arguments, &media_dir).await?;
        Ok(json!({"result": text}))
    }
}

/// Substitute `{{NAME}}` placeholders in every string of an argument tree.
fn resolve_secrets_in_value(value: Value, config: &Config) -> Value {
    match value {
        Value::String(s) => Value::String(resolve_secret_placeholders(&s, config)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| resolve_secrets_in_value(v, config))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, resolve_secrets_in_value(v, config)))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_secrets_in_nested_value() {
        let mut config = Config::default();
        config.secrets.insert("TOKEN".into(), "abc123".into());

        let input = json!({
            "text": "use {{TOKEN}}",
            "nested": {"values": ["{{TOKEN}}", 42, true]}
        });
        let resolved = resolve_secrets_in_value(input, &config);
        assert_eq!(resolved["text"], "use abc123");
        assert_eq!(resolved["nested"]["values"][0], "abc123");
        assert_eq!(resolved["nested"]["values"][1], 42);
    }

    /// A server that answers the initialize handshake but dies before the
    /// catalog can be listed must surface as a dead backend, not as an
    /// empty toolset.
    #[tokio::test]
    async fn test_catalog_failure_is_backend_error() {
        let script = concat!(
            "read req\n",
            "printf '{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"serverInfo\":{\"name\":\"stub\"}}}\\n'\n",
            "read note\n",
            "exit 0\n",
        );
        let client = McpClient::spawn("sh", &["-c".to_string(), script.to_string()])
            .await
            .unwrap();

        let provider = McpToolProvider::from_client(client);
        let err = provider.tools().await.err().unwrap();
        assert!(matches!(err, Error::Backend(_)), "got {:?}", err);
        provider.shutdown().await;
    }
}
