//! Browser process lifecycle: launch Chrome with a debugging port, attach a
//! CDP client to the first page target, and tear everything down when the run
//! finishes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};
use webpilot_core::{Error, Result};

use super::cdp::CdpClient;

/// A run holds the session behind a shared mutex: tools execute sequentially,
/// but the handle is cloned into each `ToolContext`.
pub type BrowserHandle = Arc<tokio::sync::Mutex<BrowserSession>>;

/// An interactive element discovered by the last snapshot, addressable by the
/// model as `ref=eN`.
#[derive(Debug, Clone)]
pub struct ElementRef {
    pub backend_node_id: i64,
    pub role: String,
    pub name: String,
}

/// A live browser under CDP control.
pub struct BrowserSession {
    process: Child,
    pub client: CdpClient,
    pub debug_port: u16,
    /// `ref` id -> element, rebuilt on every snapshot.
    pub refs: HashMap<String, ElementRef>,
}

impl BrowserSession {
    /// Launch a Chrome/Chromium process and attach to its first page.
    pub async fn launch(profile_dir: &Path, headless: bool) -> Result<Self> {
        let binary = find_browser_binary()?;
        let port = find_free_port()?;

        std::fs::create_dir_all(profile_dir)?;

        let args = build_browser_args(profile_dir, port, headless);
        debug!(binary = %binary.display(), port, headless, "Launching browser");

        let process = Command::new(&binary)
            .args(&args)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Backend(format!(
                    "Failed to launch browser {}: {}",
                    binary.display(),
                    e
                ))
            })?;

        wait_for_cdp_ready(port).await?;
        let ws_url = get_page_ws_url(port).await?;
        let client = CdpClient::connect(&ws_url).await?;

        client.enable_domain("Page").await?;
        client.enable_domain("Runtime").await?;
        client.enable_domain("DOM").await?;
        client.enable_domain("Network").await?;
        client.enable_domain("Accessibility").await?;

        info!(port, "Browser session ready");

        Ok(Self {
            process,
            client,
            debug_port: port,
            refs: HashMap::new(),
        })
    }

    /// Kill the browser process. Called on every run exit path; also covered
    /// by `kill_on_drop` if the process is still alive when we unwind.
    pub async fn close(&mut self) {
        if let Err(e) = self.process.kill().await {
            warn!("Failed to kill browser process: {}", e);
        }
    }
}

/// Find a Chrome/Chromium binary on PATH or in well-known locations.
pub fn find_browser_binary() -> Result<PathBuf> {
    let candidates = [
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
        "chrome",
    ];
    for name in candidates {
        if let Ok(path) = which::which(name) {
            return Ok(path);
        }
    }

    // macOS app bundles are not on PATH
    let mac_paths = [
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];
    for p in mac_paths {
        let path = PathBuf::from(p);
        if path.exists() {
            return Ok(path);
        }
    }

    Err(Error::Backend(
        "No Chrome or Chromium binary found. Install Chrome or set it on PATH.".into(),
    ))
}

fn build_browser_args(profile_dir: &Path, port: u16, headless: bool) -> Vec<String> {
    let mut args = vec![
        format!("--remote-debugging-port={}", port),
        format!("--user-data-dir={}", profile_dir.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-background-networking".to_string(),
        "--disable-popup-blocking".to_string(),
        "--disable-translate".to_string(),
        "--window-size=1280,900".to_string(),
    ];
    if headless {
        args.push("--headless=new".to_string());
    }
    args.push("about:blank".to_string());
    args
}

fn find_free_port() -> Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

/// Poll the DevTools HTTP endpoint until the browser accepts connections.
async fn wait_for_cdp_ready(port: u16) -> Result<()> {
    let url = format!("http://127.0.0.1:{}/json/version", port);
    let client = reqwest::Client::new();

    for _ in 0..50 {
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return Ok(());
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    Err(Error::Backend(format!(
        "Browser did not open its debugging port {} within 10s",
        port
    )))
}

/// Find the WebSocket debugger URL of the first page target.
async fn get_page_ws_url(port: u16) -> Result<String> {
    let url = format!("http://127.0.0.1:{}/json/list", port);
    let targets: Vec<Value> = reqwest::Client::new()
        .get(&url)
        .send()
        .await
        .map_err(|e| Error::Backend(format!("Failed to list browser targets: {}", e)))?
        .json()
        .await
        .map_err(|e| Error::Backend(format!("Invalid target list from browser: {}", e)))?;

    targets
        .iter()
        .find(|t| t.get("type").and_then(|v| v.as_str()) == Some("page"))
        .and_then(|t| t.get("webSocketDebuggerUrl").and_then(|v| v.as_str()))
        .map(String::from)
        .ok_or_else(|| Error::Backend("No page target with a debugger URL found".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_browser_args_headless() {
        let args = build_browser_args(Path::new("/tmp/profile"), 9222, true);
        assert!(args.contains(&"--remote-debugging-port=9222".to_string()));
        assert!(args.contains(&"--headless=new".to_string()));
        assert!(args.iter().any(|a| a.contains("/tmp/profile")));
        assert_eq!(args.last().map(String::as_str), Some("about:blank"));
    }

    #[test]
    fn test_build_browser_args_headed() {
        let args = build_browser_args(Path::new("/tmp/profile"), 9222, false);
        assert!(!args.iter().any(|a| a.starts_with("--headless")));
    }

    #[test]
    fn test_find_free_port_is_nonzero() {
        let port = find_free_port().unwrap();
        assert!(port > 0);
    }
}
