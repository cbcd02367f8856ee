//! Chamber and experiment status values.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status reported for a chamber.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChamberStatus {
    Ready,
    Loading,
    Executing,
    Error,
    Offline,
}

impl ChamberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChamberStatus::Ready => "READY",
            ChamberStatus::Loading => "LOADING",
            ChamberStatus::Executing => "EXECUTING",
            ChamberStatus::Error => "ERROR",
            ChamberStatus::Offline => "OFFLINE",
        }
    }
}

/// Status reported for a submitted experiment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExperimentStatus {
    Queued,
    Running,
    Failed,
    Canceled,
    Done,
}

impl ExperimentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentStatus::Queued => "QUEUED",
            ExperimentStatus::Running => "RUNNING",
            ExperimentStatus::Failed => "FAILED",
            ExperimentStatus::Canceled => "CANCELED",
            ExperimentStatus::Done => "DONE",
        }
    }

    /// The experiment will not change status any more.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExperimentStatus::Failed | ExperimentStatus::Canceled | ExperimentStatus::Done
        )
    }
}

impl fmt::Display for ChamberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Either kind of status, for rendering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Chamber(ChamberStatus),
    Experiment(ExperimentStatus),
}

impl From<ChamberStatus> for Status {
    fn from(status: ChamberStatus) -> Self {
        Status::Chamber(status)
    }
}

impl From<ExperimentStatus> for Status {
    fn from(status: ExperimentStatus) -> Self {
        Status::Experiment(status)
    }
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Chamber(status) => status.as_str(),
            Status::Experiment(status) => status.as_str(),
        }
    }
}

/// How a front end should emphasize a status. Rendering is up to the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StyleHint {
    /// Finished or available.
    Success,
    /// Work in progress.
    Active,
    /// Waiting for something else.
    Pending,
    Failure,
    /// Unavailable or abandoned.
    Muted,
}

const STATUS_STYLES: [(&str, StyleHint); 10] = [
    ("READY", StyleHint::Success),
    ("LOADING", StyleHint::Pending),
    ("EXECUTING", StyleHint::Active),
    ("ERROR", StyleHint::Failure),
    ("OFFLINE", StyleHint::Muted),
    ("QUEUED", StyleHint::Pending),
    ("RUNNING", StyleHint::Active),
    ("FAILED", StyleHint::Failure),
    ("CANCELED", StyleHint::Muted),
    ("DONE", StyleHint::Success),
];

/// Display text and style hint for a status.
pub fn status_display(status: impl Into<Status>) -> (&'static str, StyleHint) {
    let text = status.into().as_str();
    let hint = STATUS_STYLES
        .iter()
        .find(|(name, _)| *name == text)
        .map(|(_, hint)| *hint)
        .unwrap_or(StyleHint::Muted);
    (text, hint)
}
