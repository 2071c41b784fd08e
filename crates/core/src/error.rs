//! Error types for the harness and the driver seam

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the harness core.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Session acquisition failed (engine start, browser launch, context or
    /// page creation). Fatal to the scenario; partially acquired handles
    /// have already been released when this propagates.
    #[error("session initialization failed: {0}")]
    SessionInit(String),

    /// No network response matched the predicate before the deadline. The
    /// UI action itself is not rolled back.
    #[error("no matching response within {timeout:?} after '{action}'")]
    SyncTimeout { action: String, timeout: Duration },

    /// Evidence capture failed. Callers downgrade this to a warning log
    /// entry; it never fails a scenario.
    #[error("evidence capture failed: {0}")]
    EvidenceCapture(String),

    /// A teardown step failed. Logged and swallowed inside session
    /// destruction; never raised past it.
    #[error("teardown failed: {0}")]
    Teardown(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("report error: {0}")]
    Report(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type HarnessResult<T> = Result<T, HarnessError>;

/// Typed per-operation errors from the automation engine, so callers can
/// distinguish "element absent" from an engine failure instead of
/// collapsing both to a boolean.
#[derive(Error, Debug)]
pub enum DriverError {
    /// A selector did not resolve to an element before the engine's wait
    /// deadline.
    #[error("element absent: {selector}")]
    ElementAbsent { selector: String },

    /// The automation engine reported a failure.
    #[error("engine error: {0}")]
    Engine(String),

    /// The engine process is not available (not installed, failed to
    /// spawn, or exited).
    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Malformed traffic on the engine control channel.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DriverResult<T> = Result<T, DriverError>;
