//! Session factory - acquiring and releasing the browser handle chain
//!
//! One [`Session`] is the unit of test isolation: engine → browser →
//! isolated context → page, created per scenario and destroyed in strict
//! reverse order at scenario end. Destruction is idempotent and tolerates
//! any sub-handle being absent, so a partially failed acquisition never
//! leaks a browser process.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::Config;
use crate::driver::{
    AutomationEngine, BrowserHandle, ContextHandle, ContextOptions, EngineStarter, LaunchOptions,
    PageHandle,
};
use crate::error::{HarnessError, HarnessResult};

/// One isolated browser-engine-to-page handle chain for a single scenario.
///
/// Never shared across concurrently running scenarios; the lifecycle
/// controller keeps at most one live Session per execution unit.
pub struct Session {
    engine: Option<Box<dyn AutomationEngine>>,
    browser: Option<Box<dyn BrowserHandle>>,
    context: Option<Box<dyn ContextHandle>>,
    page: Option<Arc<dyn PageHandle>>,
    config: Arc<Config>,
}

impl Session {
    /// The active page, if the session is still live.
    pub fn page(&self) -> Option<Arc<dyn PageHandle>> {
        self.page.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn destroyed(&self) -> bool {
        self.page.is_none()
            && self.context.is_none()
            && self.browser.is_none()
            && self.engine.is_none()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("engine", &self.engine.is_some())
            .field("browser", &self.browser.is_some())
            .field("context", &self.context.is_some())
            .field("page", &self.page.is_some())
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Leak detector only; async teardown cannot run here.
        if !self.destroyed() {
            error!("session dropped without destroy(); browser process may leak");
        }
    }
}

/// Creates and destroys [`Session`]s through an [`EngineStarter`].
#[derive(Clone)]
pub struct SessionFactory {
    starter: Arc<dyn EngineStarter>,
}

impl SessionFactory {
    pub fn new(starter: Arc<dyn EngineStarter>) -> Self {
        Self { starter }
    }

    /// Acquire engine, browser, context, and page in order. Any failure
    /// releases the already-acquired handles in reverse order before
    /// [`HarnessError::SessionInit`] propagates.
    pub async fn create(&self, config: Arc<Config>) -> HarnessResult<Session> {
        info!("launching {} (headless: {})", config.browser.as_str(), config.headless);

        let engine = self
            .starter
            .start()
            .await
            .map_err(|e| HarnessError::SessionInit(format!("engine start: {}", e)))?;

        let launch = LaunchOptions {
            browser: config.browser,
            headless: config.headless,
            slow_mo: config.slow_mo,
        };
        let browser = match engine.launch(&launch).await {
            Ok(browser) => browser,
            Err(e) => {
                release(|| async { engine.close().await }, "engine").await;
                return Err(HarnessError::SessionInit(format!("browser launch: {}", e)));
            }
        };

        let context_opts = ContextOptions {
            video_dir: config.video_enabled.then(|| config.video_dir.clone()),
            trace_dir: config.trace_enabled.then(|| config.trace_dir.clone()),
        };
        let context = match browser.new_context(&context_opts).await {
            Ok(context) => context,
            Err(e) => {
                release(|| async { browser.close().await }, "browser").await;
                release(|| async { engine.close().await }, "engine").await;
                return Err(HarnessError::SessionInit(format!("context creation: {}", e)));
            }
        };

        let page = match context.new_page().await {
            Ok(page) => page,
            Err(e) => {
                release(|| async { context.close().await }, "context").await;
                release(|| async { browser.close().await }, "browser").await;
                release(|| async { engine.close().await }, "engine").await;
                return Err(HarnessError::SessionInit(format!("page creation: {}", e)));
            }
        };

        if let Err(e) = page.set_default_timeout(config.default_timeout).await {
            warn!("failed to apply default timeout: {}", e);
        }

        Ok(Session {
            engine: Some(engine),
            browser: Some(browser),
            context: Some(context),
            page: Some(page),
            config,
        })
    }

    /// Release page → context → browser → engine. Each step is guarded
    /// independently: a failing release is logged and later steps still
    /// run. Safe to call more than once.
    pub async fn destroy(&self, session: &mut Session) {
        if session.destroyed() {
            return;
        }
        info!("closing browser session");

        if let Some(page) = session.page.take() {
            release(|| async { page.close().await }, "page").await;
        }
        if let Some(context) = session.context.take() {
            release(|| async { context.close().await }, "context").await;
        }
        if let Some(browser) = session.browser.take() {
            release(|| async { browser.close().await }, "browser").await;
        }
        if let Some(engine) = session.engine.take() {
            release(|| async { engine.close().await }, "engine").await;
        }
    }
}

async fn release<F, Fut>(close: F, what: &str) -> Option<HarnessError>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = crate::error::DriverResult<()>>,
{
    match close().await {
        Ok(()) => None,
        Err(e) => {
            // Teardown must always complete; log and move on.
            let err = HarnessError::Teardown(format!("{}: {}", what, e));
            warn!("{}", err);
            Some(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{FakeStarter, FakeState, InitStage};

    fn config() -> Arc<Config> {
        Arc::new(Config::default())
    }

    #[tokio::test]
    async fn creates_and_destroys_in_reverse_order() {
        let state = FakeState::shared();
        let factory = SessionFactory::new(Arc::new(FakeStarter::new(Arc::clone(&state))));

        let mut session = factory.create(config()).await.unwrap();
        assert!(session.page().is_some());

        factory.destroy(&mut session).await;
        assert!(session.page().is_none());
        assert_eq!(
            state.closed_handles(),
            vec!["page", "context", "browser", "engine"]
        );
    }

    #[tokio::test]
    async fn destroy_is_idempotent() {
        let state = FakeState::shared();
        let factory = SessionFactory::new(Arc::new(FakeStarter::new(Arc::clone(&state))));

        let mut session = factory.create(config()).await.unwrap();
        factory.destroy(&mut session).await;
        factory.destroy(&mut session).await;
        assert_eq!(state.closed_handles().len(), 4);
    }

    #[tokio::test]
    async fn failed_context_creation_releases_acquired_handles() {
        let state = FakeState::shared();
        state.fail_init_at(InitStage::Context);
        let factory = SessionFactory::new(Arc::new(FakeStarter::new(Arc::clone(&state))));

        let err = factory.create(config()).await.unwrap_err();
        assert!(matches!(err, HarnessError::SessionInit(_)));
        // Browser and engine were acquired before the failure and must be
        // released; no context or page ever existed.
        assert_eq!(state.closed_handles(), vec!["browser", "engine"]);
    }

    #[tokio::test]
    async fn failed_engine_start_has_nothing_to_release() {
        let state = FakeState::shared();
        state.fail_init_at(InitStage::Engine);
        let factory = SessionFactory::new(Arc::new(FakeStarter::new(Arc::clone(&state))));

        let err = factory.create(config()).await.unwrap_err();
        assert!(matches!(err, HarnessError::SessionInit(_)));
        assert!(state.closed_handles().is_empty());
    }

    #[tokio::test]
    async fn failed_release_surfaces_as_teardown_error() {
        let err = release(
            || async { Err(crate::error::DriverError::Engine("boom".into())) },
            "context",
        )
        .await;
        assert!(matches!(err, Some(HarnessError::Teardown(_))));
        assert!(err.unwrap().to_string().contains("context: engine error: boom"));
    }

    #[tokio::test]
    async fn teardown_error_does_not_skip_later_handles() {
        let state = FakeState::shared();
        state.fail_close_of("context");
        let factory = SessionFactory::new(Arc::new(FakeStarter::new(Arc::clone(&state))));

        let mut session = factory.create(config()).await.unwrap();
        factory.destroy(&mut session).await;
        // Context close failed, but browser and engine were still released.
        assert_eq!(state.closed_handles(), vec!["page", "browser", "engine"]);
    }
}
