//! Reporting sink
//!
//! The harness depends only on the [`ReportSink`] contract: create one
//! entry per scenario, append severity-tagged lines with optional image
//! evidence, flush once per scenario for durability. Entry creation and
//! flush are safe under concurrent calls from independently running
//! scenarios; the store is append-style and per-entry-isolated.
//!
//! [`JsonReportSink`] is the bundled implementation: evidence PNGs on
//! disk plus a `report.json` summary. HTML rendering is a consumer
//! concern and lives outside this crate.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;

use crate::config::Config;
use crate::error::{HarnessError, HarnessResult};

/// Outcome severity of an evidence item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Pass,
    Fail,
    Warning,
}

/// An image artifact attached to a log line.
pub struct Evidence {
    /// Artifact name, used to derive the on-disk file name.
    pub name: String,
    /// PNG bytes.
    pub bytes: Vec<u8>,
}

/// Opaque handle to a per-scenario report entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHandle {
    id: u64,
}

impl EntryHandle {
    pub(crate) fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Contract consumed by the lifecycle controller.
pub trait ReportSink: Send + Sync {
    /// Register a new per-scenario entry.
    fn create_entry(&self, name: &str) -> EntryHandle;

    /// Append a line to an entry, optionally with image evidence.
    fn log(&self, entry: &EntryHandle, severity: Severity, message: &str, evidence: Option<Evidence>);

    /// Persist everything accumulated so far. Idempotent.
    fn flush(&self) -> HarnessResult<()>;
}

/// Run metadata recorded once per report, mirroring the report header the
/// original framework printed (environment, browser, base URL, policy).
#[derive(Debug, Clone, Serialize)]
pub struct RunInfo {
    pub environment: String,
    pub browser: String,
    pub base_url: String,
    pub screenshot_mode: String,
    pub started_at: DateTime<Utc>,
}

impl RunInfo {
    pub fn from_config(config: &Config) -> Self {
        Self {
            environment: config.env.clone(),
            browser: config.browser.as_str().to_string(),
            base_url: config.base_url.clone(),
            screenshot_mode: config.screenshot_mode.as_str().to_string(),
            started_at: Utc::now(),
        }
    }
}

#[derive(Serialize)]
struct LogLine {
    severity: Severity,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    evidence: Option<String>,
    at: DateTime<Utc>,
}

#[derive(Serialize)]
struct Entry {
    id: u64,
    name: String,
    started_at: DateTime<Utc>,
    lines: Vec<LogLine>,
}

#[derive(Serialize)]
struct Report<'a> {
    run: &'a RunInfo,
    entries: &'a [Entry],
}

struct SinkState {
    next_id: u64,
    entries: Vec<Entry>,
    // Evidence bytes held until flush, keyed by relative path.
    pending_files: Vec<(PathBuf, Vec<u8>)>,
}

/// File-based sink: `<dir>/report.json` plus `<dir>/evidence/*.png`.
pub struct JsonReportSink {
    dir: PathBuf,
    run: RunInfo,
    state: Mutex<SinkState>,
}

impl JsonReportSink {
    pub fn new(dir: PathBuf, run: RunInfo) -> Self {
        Self {
            dir,
            run,
            state: Mutex::new(SinkState {
                next_id: 1,
                entries: Vec::new(),
                pending_files: Vec::new(),
            }),
        }
    }

    pub fn report_path(&self) -> PathBuf {
        self.dir.join("report.json")
    }
}

impl ReportSink for JsonReportSink {
    fn create_entry(&self, name: &str) -> EntryHandle {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.entries.push(Entry {
            id,
            name: name.to_string(),
            started_at: Utc::now(),
            lines: Vec::new(),
        });
        EntryHandle::new(id)
    }

    fn log(&self, entry: &EntryHandle, severity: Severity, message: &str, evidence: Option<Evidence>) {
        let mut state = self.state.lock();
        let evidence_path = evidence.map(|e| {
            let file = format!(
                "evidence/entry{}-{}-{}.png",
                entry.id,
                state.pending_files.len(),
                sanitize(&e.name)
            );
            state.pending_files.push((PathBuf::from(&file), e.bytes));
            file
        });
        if let Some(record) = state.entries.iter_mut().find(|e| e.id == entry.id) {
            record.lines.push(LogLine {
                severity,
                message: message.to_string(),
                evidence: evidence_path,
                at: Utc::now(),
            });
        }
    }

    fn flush(&self) -> HarnessResult<()> {
        let mut state = self.state.lock();
        std::fs::create_dir_all(self.dir.join("evidence"))?;

        for (relative, bytes) in state.pending_files.drain(..) {
            std::fs::write(self.dir.join(relative), bytes)?;
        }

        let report = Report {
            run: &self.run,
            entries: &state.entries,
        };
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| HarnessError::Report(e.to_string()))?;
        let path = self.report_path();
        std::fs::write(&path, json)?;
        info!("report flushed to {}", path.display());
        Ok(())
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink(dir: &std::path::Path) -> JsonReportSink {
        JsonReportSink::new(dir.to_path_buf(), RunInfo::from_config(&Config::default()))
    }

    #[test]
    fn entries_accumulate_and_flush_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink(dir.path());

        let entry = sink.create_entry("browse products");
        sink.log(&entry, Severity::Pass, "Step: browse", None);
        sink.log(
            &entry,
            Severity::Fail,
            "Scenario failed: browse products",
            Some(Evidence {
                name: "final".into(),
                bytes: vec![1, 2, 3],
            }),
        );
        sink.flush().unwrap();

        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(sink.report_path()).unwrap()).unwrap();
        let entries = report["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["lines"].as_array().unwrap().len(), 2);

        let evidence = entries[0]["lines"][1]["evidence"].as_str().unwrap();
        assert_eq!(std::fs::read(dir.path().join(evidence)).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn flush_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink(dir.path());
        let entry = sink.create_entry("a");
        sink.log(&entry, Severity::Info, "hello", None);
        sink.flush().unwrap();
        sink.flush().unwrap();
        assert!(sink.report_path().exists());
    }

    #[test]
    fn entries_are_isolated_per_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sink(dir.path());
        let a = sink.create_entry("a");
        let b = sink.create_entry("b");
        sink.log(&a, Severity::Pass, "only in a", None);
        sink.log(&b, Severity::Fail, "only in b", None);
        sink.flush().unwrap();

        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(sink.report_path()).unwrap()).unwrap();
        assert_eq!(report["entries"][0]["lines"][0]["message"], "only in a");
        assert_eq!(report["entries"][1]["lines"][0]["message"], "only in b");
    }
}
