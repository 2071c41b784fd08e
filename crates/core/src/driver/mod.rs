//! Automation engine seam
//!
//! The harness does not implement element location, rendering, or network
//! interception itself; it consumes an underlying automation engine through
//! the traits below. One [`EngineStarter`] call yields one engine process,
//! matching the acquisition chain engine → browser → context → page, and
//! every handle is released independently so teardown can tolerate partial
//! initialization.
//!
//! [`playwright`] is the production implementation; `testkit` provides an
//! in-memory fake for tests.

pub mod playwright;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::config::BrowserKind;
use crate::error::DriverResult;

/// A network response observed on a page. URL and status code are the only
/// network surface the harness consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEvent {
    pub url: String,
    pub status: u16,
}

/// Browser launch options.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    pub browser: BrowserKind,
    pub headless: bool,
    pub slow_mo: Duration,
}

/// Isolated-context options. Video and trace capture are enabled by giving
/// the respective directory.
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    pub video_dir: Option<PathBuf>,
    pub trace_dir: Option<PathBuf>,
}

/// Screenshot capture options.
#[derive(Debug, Clone)]
pub struct ScreenshotOptions {
    pub full_page: bool,
    pub timeout: Duration,
}

impl Default for ScreenshotOptions {
    fn default() -> Self {
        Self {
            full_page: false,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Starts one automation engine instance per session.
#[async_trait]
pub trait EngineStarter: Send + Sync {
    async fn start(&self) -> DriverResult<Box<dyn AutomationEngine>>;
}

/// A running automation engine process.
#[async_trait]
pub trait AutomationEngine: Send + Sync {
    async fn launch(&self, opts: &LaunchOptions) -> DriverResult<Box<dyn BrowserHandle>>;

    /// Shut the engine down. Idempotent.
    async fn close(&self) -> DriverResult<()>;
}

/// A launched browser process.
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    async fn new_context(&self, opts: &ContextOptions) -> DriverResult<Box<dyn ContextHandle>>;

    async fn close(&self) -> DriverResult<()>;
}

/// An isolated browsing context (cookies, storage, video/trace recording).
#[async_trait]
pub trait ContextHandle: Send + Sync {
    async fn new_page(&self) -> DriverResult<Arc<dyn PageHandle>>;

    async fn close(&self) -> DriverResult<()>;
}

/// An active page. Operations return typed [`crate::error::DriverError`]s
/// so "element absent" stays distinguishable from an engine failure.
#[async_trait]
pub trait PageHandle: Send + Sync {
    async fn goto(&self, url: &str) -> DriverResult<()>;

    async fn click(&self, selector: &str) -> DriverResult<()>;

    async fn fill(&self, selector: &str, value: &str) -> DriverResult<()>;

    async fn select_option(&self, selector: &str, value: &str) -> DriverResult<()>;

    async fn text_content(&self, selector: &str) -> DriverResult<String>;

    async fn is_visible(&self, selector: &str) -> DriverResult<bool>;

    /// Number of elements matching the selector right now.
    async fn count(&self, selector: &str) -> DriverResult<usize>;

    async fn get_attribute(&self, selector: &str, name: &str) -> DriverResult<Option<String>>;

    async fn title(&self) -> DriverResult<String>;

    async fn set_default_timeout(&self, timeout: Duration) -> DriverResult<()>;

    /// Capture a PNG screenshot of the page.
    async fn screenshot(&self, opts: &ScreenshotOptions) -> DriverResult<Vec<u8>>;

    /// Subscribe to network responses observed on this page. The receiver
    /// buffers events from the moment of subscription, so subscribing
    /// before triggering an action closes the observe-after-respond race.
    fn responses(&self) -> broadcast::Receiver<ResponseEvent>;

    async fn close(&self) -> DriverResult<()>;
}
