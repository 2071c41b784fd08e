//! StoreCheck Core
//!
//! Session lifecycle and action-synchronization engine for browser-driven
//! end-to-end tests against a web storefront.
//!
//! The crate is organized around two pieces:
//!
//! - A per-scenario execution context ([`Harness`] / [`ScenarioContext`])
//!   that owns one isolated browser [`Session`], captures evidence into a
//!   [`ReportSink`] at step boundaries and at scenario end, and tears the
//!   session down deterministically regardless of outcome.
//! - A network-correlated action primitive
//!   ([`perform_and_await_response`]) that performs a page mutation and
//!   only reports completion once a backend response matching a predicate
//!   has been observed, instead of guessing a fixed delay.
//!
//! The underlying automation engine is a dependency consumed through the
//! traits in [`driver`]; the production implementation drives Playwright
//! through a Node.js child process, and [`testkit`] provides an in-memory
//! fake for tests.

pub mod config;
pub mod driver;
pub mod error;
pub mod lifecycle;
pub mod report;
pub mod scenario;
pub mod session;
pub mod sync;
pub mod testkit;

pub use config::{BrowserKind, Config, ScreenshotMode};
pub use driver::{PageHandle, ResponseEvent};
pub use error::{HarnessError, HarnessResult};
pub use lifecycle::{Harness, Phase, ScenarioContext};
pub use report::{EntryHandle, Evidence, JsonReportSink, ReportSink, Severity};
pub use scenario::{Attachment, ScenarioRecord, StepStatus};
pub use session::{Session, SessionFactory};
pub use sync::{body_of, perform_and_await_response};

/// StoreCheck version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
