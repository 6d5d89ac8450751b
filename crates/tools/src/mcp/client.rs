//! Minimal MCP (Model Context Protocol) client speaking JSON-RPC 2.0 over a
//! child process's stdio. Enough to initialize a server, list its tools, and
//! call them.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};
use webpilot_core::{Error, Result};

const PROTOCOL_VERSION: &str = "2024-11-05";
const CALL_TIMEOUT_SECS: u64 = 60;

/// A connected MCP server process.
pub struct McpClient {
    process: Child,
    stdin: Arc<Mutex<tokio::process::ChildStdin>>,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>,
    next_id: AtomicU64,
    _reader_handle: tokio::task::JoinHandle<()>,
    /// Cached result of the first tools/list call.
    tools_cache: Mutex<Option<Vec<Value>>>,
}

impl McpClient {
    /// Spawn the server command and perform the initialize handshake.
    pub async fn spawn(command: &str, args: &[String]) -> Result<Self> {
        info!(command = %command, ?args, "Starting MCP server");

        let mut process = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Backend(format!("Failed to spawn MCP server '{}': {}", command, e)))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| Error::Backend("MCP server stdin unavailable".into()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| Error::Backend("MCP server stdout unavailable".into()))?;

        let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let pending_clone = pending.clone();

        // Reader task: one JSON-RPC message per line
        let reader_handle = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Value>(&line) {
                    Ok(msg) => {
                        if let Some(id) = msg.get("id").and_then(|v| v.as_u64()) {
                            let mut pending = pending_clone.lock().await;
                            if let Some(tx) = pending.remove(&id) {
                                let _ = tx.send(msg);
                            }
                        }
                        // Server-initiated notifications are ignored.
                    }
                    Err(e) => warn!("Unparseable MCP message: {}", e),
                }
            }
            debug!("MCP server stdout closed");
            // Fail any requests still in flight instead of letting them
            // sit out the full call timeout.
            let mut pending = pending_clone.lock().await;
            pending.clear();
        });

        let client = Self {
            process,
            stdin: Arc::new(Mutex::new(stdin)),
            pending,
            next_id: AtomicU64::new(1),
            _reader_handle: reader_handle,
            tools_cache: Mutex::new(None),
        };

        client.initialize().await?;
        Ok(client)
    }

    async fn initialize(&self) -> Result<()> {
        let result = self
            .request(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": "webpilot",
                        "version": env!("CARGO_PKG_VERSION"),
                    }
                }),
            )
            .await?;
        debug!(server = ?result.pointer("/serverInfo/name"), "MCP server initialized");

        self.notify("notifications/initialized", json!({})).await?;
        Ok(())
    }

    /// List the server's tools. The result is cached for the life of the
    /// client; servers don't change their catalog mid-run.
    pub async fn list_tools(&self) -> Result<Vec<Value>> {
        {
            let cache = self.tools_cache.lock().await;
            if let Some(tools) = cache.as_ref() {
                return Ok(tools.clone());
            }
        }

        let result = self.request("tools/list", json!({})).await?;
        let tools = result
            .get("tools")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let mut cache = self.tools_cache.lock().await;
        *cache = Some(tools.clone());
        Ok(tools)
    }

    /// Call a tool. An `isError` result becomes `Error::Tool` so the loop can
    /// report it to the model without aborting the run. Image content blocks
    /// are written under `media_dir` and referenced by path in the result.
    pub async fn call_tool(&self, name: &str, arguments: Value, media_dir: &Path) -> Result<String> {
        let result = self
            .request("tools/call", json!({"name": name, "arguments": arguments}))
            .await?;

        let text = render_content_blocks(&result, media_dir);
        let is_error = result
            .get("isError")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        if is_error {
            Err(Error::Tool(if text.is_empty() {
                format!("MCP tool '{}' failed", name)
            } else {
                text
            }))
        } else {
            Ok(text)
        }
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let msg = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id, tx);
        }

        self.write_message(&msg).await?;

        let timeout =
            tokio::time::timeout(std::time::Duration::from_secs(CALL_TIMEOUT_SECS), rx);
        match timeout.await {
            Ok(Ok(response)) => {
                if let Some(error) = response.get("error") {
                    let message = error
                        .get("message")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown error");
                    Err(Error::Tool(format!("MCP {} failed: {}", method, message)))
                } else {
                    Ok(response.get("result").cloned().unwrap_or(Value::Null))
                }
            }
            Ok(Err(_)) => Err(Error::Backend("MCP server closed the connection".into())),
            Err(_) => {
                let mut pending = self.pending.lock().await;
                pending.remove(&id);
                Err(Error::Timeout(format!(
                    "MCP request '{}' timed out after {}s",
                    method, CALL_TIMEOUT_SECS
                )))
            }
        }
    }

    async fn notify(&self, method: &str, params: Value) -> Result<()> {
        let msg = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });
        self.write_message(&msg).await
    }

    async fn write_message(&self, msg: &Value) -> Result<()> {
        let mut line = msg.to_string();
        line.push('\n');
        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::Backend(format!("MCP server stdin write failed: {}", e)))?;
        stdin
            .flush()
            .await
            .map_err(|e| Error::Backend(format!("MCP server stdin flush failed: {}", e)))?;
        Ok(())
    }

    /// Kill the server process.
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.process.kill().await {
            warn!("Failed to kill MCP server: {}", e);
        }
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        self._reader_handle.abort();
    }
}

/// Flatten a tools/call result's content blocks into a single string.
/// Text blocks are joined; image blocks land on disk and are referenced by
/// path, never inlined.
fn render_content_blocks(result: &Value, media_dir: &Path) -> String {
    let blocks = match result.get("content").and_then(|v| v.as_array()) {
        Some(blocks) => blocks,
        None => return String::new(),
    };

    let mut parts = Vec::new();
    for (index, block) in blocks.iter().enumerate() {
        match block.get("type").and_then(|v| v.as_str()) {
            Some("text") => {
                if let Some(text) = block.get("text").and_then(|v| v.as_str()) {
                    parts.push(text.to_string());
                }
            }
            Some("image") => parts.push(save_image_block(block, media_dir, index)),
            _ => {}
        }
    }
    parts.join("\n")
}

fn save_image_block(block: &Value, media_dir: &Path, index: usize) -> String {
    use base64::Engine;

    let data = match block.get("data").and_then(|v| v.as_str()) {
        Some(data) => data,
        None => return "[image attachment without data]".to_string(),
    };
    let bytes = match base64::engine::general_purpose::STANDARD.decode(data) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Undecodable image block: {}", e);
            return "[image attachment could not be decoded]".to_string();
        }
    };

    let mime = block
        .get("mimeType")
        .and_then(|v| v.as_str())
        .unwrap_or("image/png");
    let ext = mime.rsplit('/').next().unwrap_or("png");
    let filename = format!(
        "capture-{}-{}.{}",
        chrono::Utc::now().format("%Y%m%d-%H%M%S%3f"),
        index,
        ext
    );
    let path = media_dir.join(filename);

    if let Err(e) = std::fs::create_dir_all(media_dir).and_then(|_| std::fs::write(&path, &bytes))
    {
        warn!(path = %path.display(), "Failed to save image block: {}", e);
        return "[image attachment could not be saved]".to_string();
    }
    format!("[image saved to {}]", path.display())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_text_blocks_joined() {
        let result = json!({
            "content": [
                {"type": "text", "text": "first"},
                {"type": "text", "text": "second"}
            ]
        });
        let media = std::env::temp_dir();
        assert_eq!(render_content_blocks(&result, &media), "first\nsecond");
    }

    #[test]
    fn test_render_empty_content() {
        let media = std::env::temp_dir();
        assert_eq!(render_content_blocks(&json!({}), &media), "");
        assert_eq!(render_content_blocks(&json!({"content": []}), &media), "");
    }

    #[test]
    fn test_image_block_saved_to_disk_and_referenced_by_path() {
        let media = std::env::temp_dir().join(format!("media-test-{}", std::process::id()));
        let result = json!({
            "content": [
                {"type": "text", "text": "page captured"},
                // "hello" in base64
                {"type": "image", "data": "aGVsbG8=", "mimeType": "image/png"}
            ]
        });

        let rendered = render_content_blocks(&result, &media);
        assert!(rendered.contains("page captured"));
        assert!(rendered.contains("[image saved to "));
        // The base64 payload itself never reaches the transcript
        assert!(!rendered.contains("aGVsbG8="));

        let entries: Vec<_> = std::fs::read_dir(&media).unwrap().flatten().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(std::fs::read(entries[0].path()).unwrap(), b"hello");
        assert!(entries[0].path().extension().is_some_and(|e| e == "png"));

        let _ = std::fs::remove_dir_all(&media);
    }

    #[test]
    fn test_undecodable_image_block_noted_not_fatal() {
        let media = std::env::temp_dir();
        let result = json!({
            "content": [{"type": "image", "data": "not base64!!"}]
        });
        let rendered = render_content_blocks(&result, &media);
        assert!(rendered.contains("could not be decoded"));
    }
}
