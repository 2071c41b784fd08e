//! Scenario record - the running test as the runner sees it
//!
//! Supplied by the test runner and read-only to the core, except for the
//! native attachment mechanism used to pin failure screenshots to the
//! scenario itself.

use parking_lot::Mutex;

/// Outcome of a single executed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct StepRecord {
    pub name: String,
    pub status: StepStatus,
}

/// An artifact attached directly to the scenario by the runner's native
/// mechanism (the equivalent of attaching a failure screenshot to the
/// test result itself, independent of the report sink).
pub struct Attachment {
    pub name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

/// Identifies one running end-to-end scenario.
pub struct ScenarioRecord {
    name: String,
    tags: Vec<String>,
    steps: Mutex<Vec<StepRecord>>,
    attachments: Mutex<Vec<Attachment>>,
}

impl ScenarioRecord {
    pub fn new(name: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            name: name.into(),
            tags,
            steps: Mutex::new(Vec::new()),
            attachments: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Runner-side: record the outcome of a completed step.
    pub fn record_step(&self, name: impl Into<String>, status: StepStatus) {
        self.steps.lock().push(StepRecord {
            name: name.into(),
            status,
        });
    }

    /// Cumulative failed state: true once any step has failed.
    pub fn is_failed(&self) -> bool {
        self.steps
            .lock()
            .iter()
            .any(|s| s.status == StepStatus::Failed)
    }

    /// Name of the most recently recorded step, if any.
    pub fn current_step(&self) -> Option<String> {
        self.steps.lock().last().map(|s| s.name.clone())
    }

    pub fn steps(&self) -> Vec<StepRecord> {
        self.steps.lock().clone()
    }

    /// Attach an artifact through the runner's native mechanism.
    pub fn attach(&self, attachment: Attachment) {
        self.attachments.lock().push(attachment);
    }

    pub fn attachment_count(&self) -> usize {
        self.attachments.lock().len()
    }

    pub fn attachment_names(&self) -> Vec<String> {
        self.attachments.lock().iter().map(|a| a.name.clone()).collect()
    }
}
