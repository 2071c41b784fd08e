//! Scenario lifecycle controller
//!
//! [`Harness`] is constructed once per run and owns the shared pieces: the
//! resolved configuration snapshot, the report sink, and the session
//! factory. [`Harness::before`] opens a [`ScenarioContext`], the
//! execution-unit-scoped object the business flows receive by reference;
//! `after_step` and `after` drive evidence capture and the unconditional
//! teardown.
//!
//! Phases per scenario:
//! `NotStarted → SessionActive → StepInProgress (repeatable) → Finalizing → Closed`
//!
//! Failure policy: evidence capture and flush problems are downgraded to
//! warnings; they never mask a scenario failure and never prevent session
//! teardown.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::{Config, ScreenshotMode};
use crate::driver::{EngineStarter, PageHandle, ScreenshotOptions};
use crate::error::{HarnessError, HarnessResult};
use crate::report::{EntryHandle, Evidence, JsonReportSink, ReportSink, RunInfo, Severity};
use crate::scenario::{Attachment, ScenarioRecord};
use crate::session::{Session, SessionFactory};

/// Lifecycle phase of one scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    SessionActive,
    StepInProgress,
    Finalizing,
    Closed,
}

/// Run-wide owner of configuration, report sink, and session factory.
///
/// Construct exactly one per run, before any scenario starts; the sink is
/// therefore initialized once and shared by all concurrently running
/// scenarios.
pub struct Harness {
    config: Arc<Config>,
    sink: Arc<dyn ReportSink>,
    factory: SessionFactory,
}

impl Harness {
    pub fn new(
        config: Arc<Config>,
        sink: Arc<dyn ReportSink>,
        starter: Arc<dyn EngineStarter>,
    ) -> Self {
        Self {
            config,
            sink,
            factory: SessionFactory::new(starter),
        }
    }

    /// Build a harness from the process-wide configuration snapshot with
    /// the bundled JSON report sink.
    pub fn from_env(starter: Arc<dyn EngineStarter>) -> HarnessResult<Self> {
        let config = Arc::new(Config::global()?.clone());
        let sink = Arc::new(JsonReportSink::new(
            config.report_dir.clone(),
            RunInfo::from_config(&config),
        ));
        Ok(Self::new(config, sink, starter))
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn sink(&self) -> &Arc<dyn ReportSink> {
        &self.sink
    }

    /// Scenario-begin hook. Registers a report entry and creates the
    /// session. If session creation fails, the entry still receives a
    /// terminal FAIL line and the sink is flushed before the error
    /// propagates, so even an infrastructure failure yields exactly one
    /// terminal evidence item.
    pub async fn before(&self, scenario: &ScenarioRecord) -> HarnessResult<ScenarioContext> {
        info!("========== TEST START: {} ==========", scenario.name());
        info!("scenario tags: {:?}", scenario.tags());

        let entry = self.sink.create_entry(scenario.name());

        match self.factory.create(Arc::clone(&self.config)).await {
            Ok(session) => Ok(ScenarioContext {
                phase: Phase::SessionActive,
                session: Some(session),
                entry,
                config: Arc::clone(&self.config),
                sink: Arc::clone(&self.sink),
                factory: self.factory.clone(),
            }),
            Err(e) => {
                error!("session initialization failed: {}", e);
                self.sink.log(
                    &entry,
                    Severity::Fail,
                    &format!("Scenario failed before start: {}", e),
                    None,
                );
                if let Err(flush_err) = self.sink.flush() {
                    warn!("report flush failed: {}", flush_err);
                }
                Err(e)
            }
        }
    }
}

/// Execution-unit-scoped context for one scenario. Passed by reference
/// into the business flow layer; never shared across scenarios.
pub struct ScenarioContext {
    phase: Phase,
    session: Option<Session>,
    entry: EntryHandle,
    config: Arc<Config>,
    sink: Arc<dyn ReportSink>,
    factory: SessionFactory,
}

impl ScenarioContext {
    /// The active page. `Some` only between session creation and teardown;
    /// a context that has been closed can never hand out a stale session.
    pub fn page(&self) -> Option<Arc<dyn PageHandle>> {
        self.session.as_ref().and_then(Session::page)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn entry(&self) -> &EntryHandle {
        &self.entry
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Per-step hook: apply the configured screenshot policy after a step
    /// has executed. Capture is best-effort; a capture failure becomes a
    /// WARNING line and never fails the scenario.
    pub async fn after_step(&mut self, scenario: &ScenarioRecord) {
        if self.phase == Phase::Closed {
            warn!("after_step called on a closed scenario context");
            return;
        }
        self.phase = Phase::StepInProgress;

        let step_name = scenario
            .current_step()
            .unwrap_or_else(|| scenario.name().to_string());
        let failed = scenario.is_failed();
        debug!(
            "screenshot mode: {}, step: {}, failed so far: {}",
            self.config.screenshot_mode.as_str(),
            step_name,
            failed
        );

        let capture = match self.config.screenshot_mode {
            ScreenshotMode::Never => false,
            // Cumulative scenario state, matching the original behavior:
            // once one step failed, subsequent steps are captured too.
            ScreenshotMode::OnFailure => failed,
            ScreenshotMode::Always => true,
        };

        if capture {
            let severity = if failed { Severity::Fail } else { Severity::Pass };
            self.capture_evidence(
                &format!("Step: {}", step_name),
                severity,
                self.config.screenshot_full_page,
            )
            .await;
        }

        self.phase = Phase::SessionActive;
    }

    /// Scenario-end hook: terminal evidence, sink flush, unconditional
    /// session teardown, context closure. Evidence or flush problems are
    /// logged and swallowed; teardown always runs.
    pub async fn after(&mut self, scenario: &ScenarioRecord) {
        if self.phase == Phase::Closed {
            warn!("after called on a closed scenario context");
            return;
        }
        self.phase = Phase::Finalizing;

        let failed = scenario.is_failed();
        if failed {
            error!("SCENARIO FAILED: {}", scenario.name());
        } else {
            info!("SCENARIO PASSED: {}", scenario.name());
        }

        let (severity, message) = if failed {
            (Severity::Fail, format!("Scenario failed: {}", scenario.name()))
        } else {
            (Severity::Pass, format!("Scenario passed: {}", scenario.name()))
        };

        match self.take_screenshot(false).await {
            Some(Ok(bytes)) => {
                if failed {
                    scenario.attach(Attachment {
                        name: "Failed Screenshot".into(),
                        media_type: "image/png".into(),
                        bytes: bytes.clone(),
                    });
                }
                self.sink.log(
                    &self.entry,
                    severity,
                    &message,
                    Some(Evidence {
                        name: "final".into(),
                        bytes,
                    }),
                );
            }
            Some(Err(e)) => {
                let e = HarnessError::EvidenceCapture(format!("final screenshot: {}", e));
                warn!("{}", e);
                self.sink.log(&self.entry, Severity::Warning, &e.to_string(), None);
                // Terminal outcome line still goes out, without evidence.
                self.sink.log(&self.entry, severity, &message, None);
            }
            None => {
                self.sink.log(&self.entry, severity, &message, None);
            }
        }

        if let Err(e) = self.sink.flush() {
            warn!("report flush failed: {}", e);
        }

        if let Some(mut session) = self.session.take() {
            self.factory.destroy(&mut session).await;
        }

        self.phase = Phase::Closed;
        info!(
            "========== TEST END: {} - {} ==========",
            scenario.name(),
            if failed { "FAILED" } else { "PASSED" }
        );
    }

    /// Capture a screenshot and log it under `message`. Failures become
    /// WARNING lines.
    async fn capture_evidence(&self, message: &str, severity: Severity, full_page: bool) {
        match self.take_screenshot(full_page).await {
            Some(Ok(bytes)) => {
                debug!("screenshot captured ({} bytes)", bytes.len());
                self.sink.log(
                    &self.entry,
                    severity,
                    message,
                    Some(Evidence {
                        name: "step".into(),
                        bytes,
                    }),
                );
            }
            Some(Err(e)) => {
                let e = HarnessError::EvidenceCapture(e.to_string());
                warn!("{}", e);
                self.sink.log(&self.entry, Severity::Warning, &e.to_string(), None);
            }
            None => {
                self.sink.log(
                    &self.entry,
                    Severity::Warning,
                    "Screenshot skipped: no active page",
                    None,
                );
            }
        }
    }

    async fn take_screenshot(
        &self,
        full_page: bool,
    ) -> Option<crate::error::DriverResult<Vec<u8>>> {
        let page = self.page()?;
        let opts = ScreenshotOptions {
            full_page,
            ..ScreenshotOptions::default()
        };
        Some(page.screenshot(&opts).await)
    }
}
