//! Test support: in-memory fake automation engine and recording sink
//!
//! Used by this crate's tests and by downstream crates testing flows
//! without a real browser. The fake engine records every acquisition and
//! release, supports failure injection at each stage, and lets tests
//! script network responses emitted by page actions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::driver::{
    AutomationEngine, BrowserHandle, ContextHandle, ContextOptions, EngineStarter, LaunchOptions,
    PageHandle, ResponseEvent, ScreenshotOptions,
};
use crate::error::{DriverError, DriverResult, HarnessResult};
use crate::report::{EntryHandle, Evidence, ReportSink, Severity};

/// Acquisition stage at which the fake engine can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStage {
    Engine,
    Browser,
    Context,
    Page,
}

#[derive(Default)]
struct FakeStateInner {
    fail_init_at: Option<InitStage>,
    fail_close_of: Vec<String>,
    fail_screenshots: bool,
    fail_clicks: bool,
    closed: Vec<String>,
    clicks: Vec<String>,
    fills: Vec<(String, String)>,
    selects: Vec<(String, String)>,
    gotos: Vec<String>,
    visible: HashMap<String, bool>,
    texts: HashMap<String, String>,
    counts: HashMap<String, usize>,
    attributes: HashMap<(String, String), String>,
    title: String,
    on_click: HashMap<String, Vec<ResponseEvent>>,
    on_select: HashMap<String, Vec<ResponseEvent>>,
}

/// Shared, scriptable state behind every fake handle.
#[derive(Default)]
pub struct FakeState {
    inner: Mutex<FakeStateInner>,
    starts: AtomicUsize,
    screenshots: AtomicUsize,
}

impl FakeState {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // Failure injection -----------------------------------------------------

    pub fn fail_init_at(&self, stage: InitStage) {
        self.inner.lock().fail_init_at = Some(stage);
    }

    /// Make releasing the named handle ("page", "context", "browser",
    /// "engine") fail. Failed releases are not recorded as closed.
    pub fn fail_close_of(&self, handle: &str) {
        self.inner.lock().fail_close_of.push(handle.to_string());
    }

    pub fn fail_screenshots(&self) {
        self.inner.lock().fail_screenshots = true;
    }

    pub fn fail_clicks(&self) {
        self.inner.lock().fail_clicks = true;
    }

    // Page scripting --------------------------------------------------------

    /// Emit `response` on the page's response stream whenever `selector`
    /// is clicked.
    pub fn respond_on_click(&self, selector: &str, response: ResponseEvent) {
        self.inner
            .lock()
            .on_click
            .entry(selector.to_string())
            .or_default()
            .push(response);
    }

    /// Emit `response` whenever an option is selected on `selector`.
    pub fn respond_on_select(&self, selector: &str, response: ResponseEvent) {
        self.inner
            .lock()
            .on_select
            .entry(selector.to_string())
            .or_default()
            .push(response);
    }

    pub fn set_visible(&self, selector: &str, visible: bool) {
        self.inner.lock().visible.insert(selector.to_string(), visible);
    }

    pub fn set_text(&self, selector: &str, text: &str) {
        self.inner.lock().texts.insert(selector.to_string(), text.to_string());
    }

    pub fn set_count(&self, selector: &str, count: usize) {
        self.inner.lock().counts.insert(selector.to_string(), count);
    }

    pub fn set_attribute(&self, selector: &str, name: &str, value: &str) {
        self.inner
            .lock()
            .attributes
            .insert((selector.to_string(), name.to_string()), value.to_string());
    }

    pub fn set_title(&self, title: &str) {
        self.inner.lock().title = title.to_string();
    }

    // Observations ----------------------------------------------------------

    /// Handles released so far, in release order.
    pub fn closed_handles(&self) -> Vec<String> {
        self.inner.lock().closed.clone()
    }

    /// Number of engine instances started.
    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Number of engine instances released; equal to `start_count` when no
    /// session leaked.
    pub fn engine_close_count(&self) -> usize {
        self.inner
            .lock()
            .closed
            .iter()
            .filter(|h| h.as_str() == "engine")
            .count()
    }

    pub fn screenshot_count(&self) -> usize {
        self.screenshots.load(Ordering::SeqCst)
    }

    pub fn clicks(&self) -> Vec<String> {
        self.inner.lock().clicks.clone()
    }

    pub fn fills(&self) -> Vec<(String, String)> {
        self.inner.lock().fills.clone()
    }

    pub fn gotos(&self) -> Vec<String> {
        self.inner.lock().gotos.clone()
    }

    fn close_handle(&self, handle: &str) -> DriverResult<()> {
        let mut inner = self.inner.lock();
        if inner.fail_close_of.iter().any(|h| h == handle) {
            return Err(DriverError::Engine(format!(
                "injected {} close failure",
                handle
            )));
        }
        inner.closed.push(handle.to_string());
        Ok(())
    }
}

/// Starts [`FakeEngine`]s over shared [`FakeState`].
pub struct FakeStarter {
    state: Arc<FakeState>,
}

impl FakeStarter {
    pub fn new(state: Arc<FakeState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl EngineStarter for FakeStarter {
    async fn start(&self) -> DriverResult<Box<dyn AutomationEngine>> {
        if self.state.inner.lock().fail_init_at == Some(InitStage::Engine) {
            return Err(DriverError::EngineUnavailable("injected engine start failure".into()));
        }
        self.state.starts.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeEngine {
            state: Arc::clone(&self.state),
        }))
    }
}

pub struct FakeEngine {
    state: Arc<FakeState>,
}

#[async_trait]
impl AutomationEngine for FakeEngine {
    async fn launch(&self, _opts: &LaunchOptions) -> DriverResult<Box<dyn BrowserHandle>> {
        if self.state.inner.lock().fail_init_at == Some(InitStage::Browser) {
            return Err(DriverError::Engine("injected browser launch failure".into()));
        }
        Ok(Box::new(FakeBrowser {
            state: Arc::clone(&self.state),
        }))
    }

    async fn close(&self) -> DriverResult<()> {
        self.state.close_handle("engine")
    }
}

pub struct FakeBrowser {
    state: Arc<FakeState>,
}

#[async_trait]
impl BrowserHandle for FakeBrowser {
    async fn new_context(&self, _opts: &ContextOptions) -> DriverResult<Box<dyn ContextHandle>> {
        if self.state.inner.lock().fail_init_at == Some(InitStage::Context) {
            return Err(DriverError::Engine("injected context creation failure".into()));
        }
        Ok(Box::new(FakeContext {
            state: Arc::clone(&self.state),
        }))
    }

    async fn close(&self) -> DriverResult<()> {
        self.state.close_handle("browser")
    }
}

pub struct FakeContext {
    state: Arc<FakeState>,
}

#[async_trait]
impl ContextHandle for FakeContext {
    async fn new_page(&self) -> DriverResult<Arc<dyn PageHandle>> {
        if self.state.inner.lock().fail_init_at == Some(InitStage::Page) {
            return Err(DriverError::Engine("injected page creation failure".into()));
        }
        Ok(Arc::new(FakePage::new(Arc::clone(&self.state))))
    }

    async fn close(&self) -> DriverResult<()> {
        self.state.close_handle("context")
    }
}

/// Scriptable in-memory page.
pub struct FakePage {
    state: Arc<FakeState>,
    responses: broadcast::Sender<ResponseEvent>,
}

impl FakePage {
    pub fn new(state: Arc<FakeState>) -> Self {
        let (responses, _) = broadcast::channel(64);
        Self { state, responses }
    }

    /// Emit a network response on this page's stream.
    pub fn emit_response(&self, event: ResponseEvent) {
        let _ = self.responses.send(event);
    }
}

#[async_trait]
impl PageHandle for FakePage {
    async fn goto(&self, url: &str) -> DriverResult<()> {
        self.state.inner.lock().gotos.push(url.to_string());
        Ok(())
    }

    async fn click(&self, selector: &str) -> DriverResult<()> {
        let scripted = {
            let mut inner = self.state.inner.lock();
            if inner.fail_clicks {
                return Err(DriverError::ElementAbsent {
                    selector: selector.to_string(),
                });
            }
            inner.clicks.push(selector.to_string());
            inner.on_click.get(selector).cloned().unwrap_or_default()
        };
        for event in scripted {
            let _ = self.responses.send(event);
        }
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> DriverResult<()> {
        self.state
            .inner
            .lock()
            .fills
            .push((selector.to_string(), value.to_string()));
        Ok(())
    }

    async fn select_option(&self, selector: &str, value: &str) -> DriverResult<()> {
        let scripted = {
            let mut inner = self.state.inner.lock();
            inner.selects.push((selector.to_string(), value.to_string()));
            inner.on_select.get(selector).cloned().unwrap_or_default()
        };
        for event in scripted {
            let _ = self.responses.send(event);
        }
        Ok(())
    }

    async fn text_content(&self, selector: &str) -> DriverResult<String> {
        self.state
            .inner
            .lock()
            .texts
            .get(selector)
            .cloned()
            .ok_or_else(|| DriverError::ElementAbsent {
                selector: selector.to_string(),
            })
    }

    async fn is_visible(&self, selector: &str) -> DriverResult<bool> {
        Ok(*self.state.inner.lock().visible.get(selector).unwrap_or(&false))
    }

    async fn count(&self, selector: &str) -> DriverResult<usize> {
        Ok(*self.state.inner.lock().counts.get(selector).unwrap_or(&0))
    }

    async fn get_attribute(&self, selector: &str, name: &str) -> DriverResult<Option<String>> {
        Ok(self
            .state
            .inner
            .lock()
            .attributes
            .get(&(selector.to_string(), name.to_string()))
            .cloned())
    }

    async fn title(&self) -> DriverResult<String> {
        Ok(self.state.inner.lock().title.clone())
    }

    async fn set_default_timeout(&self, _timeout: Duration) -> DriverResult<()> {
        Ok(())
    }

    async fn screenshot(&self, _opts: &ScreenshotOptions) -> DriverResult<Vec<u8>> {
        if self.state.inner.lock().fail_screenshots {
            return Err(DriverError::Engine("injected screenshot failure".into()));
        }
        self.state.screenshots.fetch_add(1, Ordering::SeqCst);
        // A recognizable stand-in for PNG bytes.
        Ok(b"\x89PNG-fake".to_vec())
    }

    fn responses(&self) -> broadcast::Receiver<ResponseEvent> {
        self.responses.subscribe()
    }

    async fn close(&self) -> DriverResult<()> {
        self.state.close_handle("page")
    }
}

/// A recorded report line.
#[derive(Debug, Clone)]
pub struct RecordedLine {
    pub entry_id: u64,
    pub severity: Severity,
    pub message: String,
    pub has_evidence: bool,
}

#[derive(Default)]
struct RecordingState {
    next_id: u64,
    entries: Vec<(u64, String)>,
    lines: Vec<RecordedLine>,
    flushes: usize,
}

/// In-memory [`ReportSink`] that counts everything.
#[derive(Default)]
pub struct RecordingSink {
    state: Mutex<RecordingState>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry_names(&self) -> Vec<String> {
        self.state.lock().entries.iter().map(|(_, n)| n.clone()).collect()
    }

    pub fn lines(&self) -> Vec<RecordedLine> {
        self.state.lock().lines.clone()
    }

    pub fn lines_for(&self, entry: &EntryHandle) -> Vec<RecordedLine> {
        self.state
            .lock()
            .lines
            .iter()
            .filter(|l| l.entry_id == entry.id())
            .cloned()
            .collect()
    }

    pub fn lines_with_severity(&self, severity: Severity) -> Vec<RecordedLine> {
        self.state
            .lock()
            .lines
            .iter()
            .filter(|l| l.severity == severity)
            .cloned()
            .collect()
    }

    /// Number of evidence images logged.
    pub fn image_count(&self) -> usize {
        self.state.lock().lines.iter().filter(|l| l.has_evidence).count()
    }

    pub fn flush_count(&self) -> usize {
        self.state.lock().flushes
    }
}

impl ReportSink for RecordingSink {
    fn create_entry(&self, name: &str) -> EntryHandle {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.entries.push((id, name.to_string()));
        EntryHandle::new(id)
    }

    fn log(&self, entry: &EntryHandle, severity: Severity, message: &str, evidence: Option<Evidence>) {
        self.state.lock().lines.push(RecordedLine {
            entry_id: entry.id(),
            severity,
            message: message.to_string(),
            has_evidence: evidence.is_some(),
        });
    }

    fn flush(&self) -> HarnessResult<()> {
        self.state.lock().flushes += 1;
        Ok(())
    }
}
