//! Playwright engine driven through a Node.js bridge process
//!
//! One bridge process per session. Requests go out as JSON lines on stdin,
//! replies come back on stdout keyed by request id; network responses
//! arrive as unsolicited event lines and are routed to a per-page broadcast
//! channel. stderr is drained into logs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use crate::error::{DriverError, DriverResult};
use super::{
    AutomationEngine, BrowserHandle, ContextHandle, EngineStarter, LaunchOptions, ContextOptions,
    PageHandle, ResponseEvent, ScreenshotOptions,
};

const BRIDGE_SCRIPT: &str = include_str!("bridge.js");

/// Capacity of the per-page response channel. Responses arriving while the
/// subscriber is between polls are buffered up to this depth.
const RESPONSE_CHANNEL_CAPACITY: usize = 256;

/// Starts one Node/Playwright bridge per session.
#[derive(Debug, Clone)]
pub struct PlaywrightStarter {
    /// Node.js executable
    pub node_path: PathBuf,
    /// Hard deadline for a single bridge call
    pub call_timeout: Duration,
}

impl Default for PlaywrightStarter {
    fn default() -> Self {
        Self {
            node_path: PathBuf::from("node"),
            call_timeout: Duration::from_secs(60),
        }
    }
}

#[async_trait]
impl EngineStarter for PlaywrightStarter {
    async fn start(&self) -> DriverResult<Box<dyn AutomationEngine>> {
        let bridge = Bridge::spawn(&self.node_path, self.call_timeout).await?;
        Ok(Box::new(PlaywrightEngine { bridge }))
    }
}

#[derive(Deserialize)]
struct WireError {
    message: String,
    #[serde(default)]
    kind: Option<String>,
}

type Pending = HashMap<u64, oneshot::Sender<Result<Value, WireFailure>>>;

struct WireFailure {
    message: String,
    kind: String,
}

struct Bridge {
    stdin: tokio::sync::Mutex<ChildStdin>,
    child: tokio::sync::Mutex<Option<Child>>,
    next_id: AtomicU64,
    pending: Arc<parking_lot::Mutex<Pending>>,
    pages: Arc<parking_lot::Mutex<HashMap<String, broadcast::Sender<ResponseEvent>>>>,
    call_timeout: Duration,
    script_path: PathBuf,
}

/// Unique per spawn: concurrent sessions in one process each get their own
/// script file.
fn bridge_script_path() -> PathBuf {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    std::env::temp_dir().join(format!(
        "storecheck-bridge-{}-{}.js",
        std::process::id(),
        SEQ.fetch_add(1, Ordering::Relaxed)
    ))
}

impl Bridge {
    async fn spawn(node_path: &Path, call_timeout: Duration) -> DriverResult<Arc<Bridge>> {
        let script_path = bridge_script_path();
        tokio::fs::write(&script_path, BRIDGE_SCRIPT).await?;

        info!("starting playwright bridge via {}", node_path.display());

        let mut child = Command::new(node_path)
            .arg(&script_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                DriverError::EngineUnavailable(format!(
                    "failed to spawn {}: {} (is Node.js with the playwright package installed?)",
                    node_path.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DriverError::EngineUnavailable("bridge stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DriverError::EngineUnavailable("bridge stdout unavailable".into()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!("[playwright bridge] {}", line);
                }
            });
        }

        let bridge = Arc::new(Bridge {
            stdin: tokio::sync::Mutex::new(stdin),
            child: tokio::sync::Mutex::new(Some(child)),
            next_id: AtomicU64::new(1),
            pending: Arc::new(parking_lot::Mutex::new(HashMap::new())),
            pages: Arc::new(parking_lot::Mutex::new(HashMap::new())),
            call_timeout,
            script_path,
        });

        let pending = Arc::clone(&bridge.pending);
        let pages = Arc::clone(&bridge.pages);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                route_line(&line, &pending, &pages);
            }
            // Bridge is gone; fail every caller still waiting.
            let mut map = pending.lock();
            for (_, tx) in map.drain() {
                let _ = tx.send(Err(WireFailure {
                    message: "bridge process exited".into(),
                    kind: "engine".into(),
                }));
            }
        });

        Ok(bridge)
    }

    async fn call(&self, method: &str, params: Value) -> DriverResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let line = serde_json::to_string(&json!({ "id": id, "method": method, "params": params }))
            .map_err(|e| DriverError::Protocol(e.to_string()))?;
        debug!("bridge -> {}", method);

        {
            let mut stdin = self.stdin.lock().await;
            let write = async {
                stdin.write_all(line.as_bytes()).await?;
                stdin.write_all(b"\n").await?;
                stdin.flush().await
            };
            if let Err(e) = write.await {
                self.pending.lock().remove(&id);
                return Err(DriverError::EngineUnavailable(format!(
                    "bridge write failed: {}",
                    e
                )));
            }
        }

        match tokio::time::timeout(self.call_timeout, rx).await {
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(DriverError::Engine(format!(
                    "bridge call '{}' timed out after {:?}",
                    method, self.call_timeout
                )))
            }
            Ok(Err(_)) => Err(DriverError::EngineUnavailable("bridge closed".into())),
            Ok(Ok(Err(failure))) => Err(wire_failure_to_error(method, failure)),
            Ok(Ok(Ok(result))) => Ok(result),
        }
    }

    fn register_page(&self, page_id: &str) -> broadcast::Sender<ResponseEvent> {
        let (tx, _) = broadcast::channel(RESPONSE_CHANNEL_CAPACITY);
        self.pages.lock().insert(page_id.to_string(), tx.clone());
        tx
    }

    fn unregister_page(&self, page_id: &str) {
        self.pages.lock().remove(page_id);
    }

    async fn shutdown(&self) {
        let _ = self.call("engine.close", json!({})).await;
        let mut slot = self.child.lock().await;
        if let Some(mut child) = slot.take() {
            match tokio::time::timeout(Duration::from_secs(2), child.wait()).await {
                Ok(Ok(status)) => debug!("bridge exited: {}", status),
                _ => {
                    warn!("bridge did not exit cleanly, killing");
                    let _ = child.kill().await;
                }
            }
        }
        let _ = tokio::fs::remove_file(&self.script_path).await;
    }
}

fn route_line(
    line: &str,
    pending: &parking_lot::Mutex<Pending>,
    pages: &parking_lot::Mutex<HashMap<String, broadcast::Sender<ResponseEvent>>>,
) {
    let value: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(_) => {
            debug!("ignoring non-JSON bridge output: {}", line);
            return;
        }
    };

    if let Some(id) = value.get("id").and_then(Value::as_u64) {
        let outcome = if let Some(error) = value.get("error") {
            match serde_json::from_value::<WireError>(error.clone()) {
                Ok(e) => Err(WireFailure {
                    message: e.message,
                    kind: e.kind.unwrap_or_else(|| "engine".into()),
                }),
                Err(_) => Err(WireFailure {
                    message: error.to_string(),
                    kind: "protocol".into(),
                }),
            }
        } else {
            Ok(value.get("result").cloned().unwrap_or(Value::Null))
        };
        if let Some(tx) = pending.lock().remove(&id) {
            let _ = tx.send(outcome);
        }
        return;
    }

    if value.get("event").and_then(Value::as_str) == Some("response") {
        let page_id = value.get("pageId").and_then(Value::as_str).unwrap_or_default();
        let url = value.get("url").and_then(Value::as_str).unwrap_or_default();
        let status = value.get("status").and_then(Value::as_u64).unwrap_or(0) as u16;
        if let Some(tx) = pages.lock().get(page_id) {
            // No subscribers is fine; nobody is awaiting a response.
            let _ = tx.send(ResponseEvent {
                url: url.to_string(),
                status,
            });
        }
    }
}

fn wire_failure_to_error(method: &str, failure: WireFailure) -> DriverError {
    match failure.kind.as_str() {
        // Playwright raises TimeoutError when a selector never resolves.
        "timeout" => DriverError::ElementAbsent {
            selector: format!("{} ({})", failure.message, method),
        },
        "protocol" => DriverError::Protocol(failure.message),
        _ => DriverError::Engine(failure.message),
    }
}

struct PlaywrightEngine {
    bridge: Arc<Bridge>,
}

#[async_trait]
impl AutomationEngine for PlaywrightEngine {
    async fn launch(&self, opts: &LaunchOptions) -> DriverResult<Box<dyn BrowserHandle>> {
        let result = self
            .bridge
            .call(
                "engine.launch",
                json!({
                    "browser": opts.browser.as_str(),
                    "headless": opts.headless,
                    "slowMo": opts.slow_mo.as_millis() as u64,
                }),
            )
            .await?;
        let browser_id = required_str(&result, "browserId")?;
        Ok(Box::new(PlaywrightBrowser {
            bridge: Arc::clone(&self.bridge),
            browser_id,
        }))
    }

    async fn close(&self) -> DriverResult<()> {
        self.bridge.shutdown().await;
        Ok(())
    }
}

struct PlaywrightBrowser {
    bridge: Arc<Bridge>,
    browser_id: String,
}

#[async_trait]
impl BrowserHandle for PlaywrightBrowser {
    async fn new_context(&self, opts: &ContextOptions) -> DriverResult<Box<dyn ContextHandle>> {
        let result = self
            .bridge
            .call(
                "browser.newContext",
                json!({
                    "browserId": self.browser_id,
                    "videoDir": opts.video_dir.as_ref().map(|p| p.to_string_lossy()),
                    "traceDir": opts.trace_dir.as_ref().map(|p| p.to_string_lossy()),
                }),
            )
            .await?;
        let context_id = required_str(&result, "contextId")?;
        Ok(Box::new(PlaywrightContext {
            bridge: Arc::clone(&self.bridge),
            context_id,
        }))
    }

    async fn close(&self) -> DriverResult<()> {
        self.bridge
            .call("browser.close", json!({ "browserId": self.browser_id }))
            .await?;
        Ok(())
    }
}

struct PlaywrightContext {
    bridge: Arc<Bridge>,
    context_id: String,
}

#[async_trait]
impl ContextHandle for PlaywrightContext {
    async fn new_page(&self) -> DriverResult<Arc<dyn PageHandle>> {
        let result = self
            .bridge
            .call("context.newPage", json!({ "contextId": self.context_id }))
            .await?;
        let page_id = required_str(&result, "pageId")?;
        let responses = self.bridge.register_page(&page_id);
        Ok(Arc::new(PlaywrightPage {
            bridge: Arc::clone(&self.bridge),
            page_id,
            responses,
        }))
    }

    async fn close(&self) -> DriverResult<()> {
        self.bridge
            .call("context.close", json!({ "contextId": self.context_id }))
            .await?;
        Ok(())
    }
}

struct PlaywrightPage {
    bridge: Arc<Bridge>,
    page_id: String,
    responses: broadcast::Sender<ResponseEvent>,
}

impl PlaywrightPage {
    async fn page_call(&self, method: &str, mut params: Value) -> DriverResult<Value> {
        params["pageId"] = Value::String(self.page_id.clone());
        self.bridge.call(method, params).await
    }
}

#[async_trait]
impl PageHandle for PlaywrightPage {
    async fn goto(&self, url: &str) -> DriverResult<()> {
        self.page_call("page.goto", json!({ "url": url })).await?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> DriverResult<()> {
        self.page_call("page.click", json!({ "selector": selector })).await?;
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> DriverResult<()> {
        self.page_call("page.fill", json!({ "selector": selector, "value": value }))
            .await?;
        Ok(())
    }

    async fn select_option(&self, selector: &str, value: &str) -> DriverResult<()> {
        self.page_call(
            "page.selectOption",
            json!({ "selector": selector, "value": value }),
        )
        .await?;
        Ok(())
    }

    async fn text_content(&self, selector: &str) -> DriverResult<String> {
        let result = self
            .page_call("page.textContent", json!({ "selector": selector }))
            .await?;
        required_str(&result, "text")
    }

    async fn is_visible(&self, selector: &str) -> DriverResult<bool> {
        let result = self
            .page_call("page.isVisible", json!({ "selector": selector }))
            .await?;
        Ok(result.get("visible").and_then(Value::as_bool).unwrap_or(false))
    }

    async fn count(&self, selector: &str) -> DriverResult<usize> {
        let result = self
            .page_call("page.count", json!({ "selector": selector }))
            .await?;
        Ok(result.get("count").and_then(Value::as_u64).unwrap_or(0) as usize)
    }

    async fn get_attribute(&self, selector: &str, name: &str) -> DriverResult<Option<String>> {
        let result = self
            .page_call(
                "page.getAttribute",
                json!({ "selector": selector, "name": name }),
            )
            .await?;
        Ok(result
            .get("value")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn title(&self) -> DriverResult<String> {
        let result = self.page_call("page.title", json!({})).await?;
        required_str(&result, "title")
    }

    async fn set_default_timeout(&self, timeout: Duration) -> DriverResult<()> {
        self.page_call(
            "page.setDefaultTimeout",
            json!({ "timeoutMs": timeout.as_millis() as u64 }),
        )
        .await?;
        Ok(())
    }

    async fn screenshot(&self, opts: &ScreenshotOptions) -> DriverResult<Vec<u8>> {
        let result = self
            .page_call(
                "page.screenshot",
                json!({
                    "fullPage": opts.full_page,
                    "timeoutMs": opts.timeout.as_millis() as u64,
                }),
            )
            .await?;
        let encoded = required_str(&result, "base64")?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| DriverError::Protocol(format!("invalid screenshot payload: {}", e)))
    }

    fn responses(&self) -> broadcast::Receiver<ResponseEvent> {
        self.responses.subscribe()
    }

    async fn close(&self) -> DriverResult<()> {
        let result = self.page_call("page.close", json!({})).await;
        self.bridge.unregister_page(&self.page_id);
        result.map(|_| ())
    }
}

fn required_str(value: &Value, field: &str) -> DriverResult<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| DriverError::Protocol(format!("bridge reply missing '{}'", field)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bridge_script_paths_are_unique_per_spawn() {
        let a = bridge_script_path();
        let b = bridge_script_path();
        assert_ne!(a, b);
    }

    #[test]
    fn timeout_failures_map_to_element_absent() {
        let err = wire_failure_to_error(
            "page.click",
            WireFailure {
                message: "Timeout 30000ms exceeded".into(),
                kind: "timeout".into(),
            },
        );
        assert!(matches!(err, DriverError::ElementAbsent { .. }));
    }
}
