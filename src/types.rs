use std::{fmt, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::surface::SurfaceError;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("configuration: {0}")]
    Configuration(String),
    #[error("[{report}] no viable path to the export action")]
    Navigation { report: String },
    #[error("[{report}] {stage} not reached within {waited:?}")]
    Timeout {
        report: String,
        stage: WaitStage,
        waited: Duration,
    },
    #[error("[{report}] could not confirm the export dialog")]
    Confirmation { report: String },
    #[error("surface: {0}")]
    Surface(#[from] SurfaceError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStage {
    Readiness,
    Download,
}

impl fmt::Display for WaitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitStage::Readiness => write!(f, "idle report"),
            WaitStage::Download => write!(f, "completed download"),
        }
    }
}

/// The UI path that reached the export action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Direct,
    OverflowMenu,
    FileMenu,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Direct => write!(f, "direct"),
            Variant::OverflowMenu => write!(f, "overflow-menu"),
            Variant::FileMenu => write!(f, "file-menu"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptMode {
    Immediate,
    Fallback,
}

impl fmt::Display for AttemptMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptMode::Immediate => write!(f, "immediate"),
            AttemptMode::Fallback => write!(f, "idle fallback"),
        }
    }
}

/// Outcome of one navigate-and-confirm attempt.
#[derive(Debug)]
pub struct ExportAttemptResult {
    pub mode: AttemptMode,
    pub attempt: usize,
    /// set as soon as navigation succeeded, even if confirmation failed afterwards
    pub variant: Option<Variant>,
    pub outcome: Result<(), ExportError>,
}

impl ExportAttemptResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub report: String,
    pub url: String,
    pub path: PathBuf,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchResult {
    pub succeeded: Vec<Artifact>,
    pub failed: Vec<String>,
}

impl BatchResult {
    pub fn paths(&self) -> Vec<PathBuf> {
        self.succeeded.iter().map(|a| a.path.clone()).collect()
    }
}

#[derive(Debug)]
pub struct DailyReport {
    pub batch: BatchResult,
    pub merged: Option<PathBuf>,
    pub notified: bool,
}
