//! Events reported by the background workers.
//!
//! Workers never touch the context store; they send these events over a
//! bounded channel and the orchestrating layer applies them.

use crate::types::ContextItem;
use codepilot_core::AppError;
use codepilot_prompt::AssemblyNotice;
use tokio::sync::mpsc;

/// Progress after one file of an analysis batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    /// Files handled so far, skipped ones included
    pub processed: usize,

    pub total: usize,

    pub current_file: String,

    /// Percentage complete (0.0 - 100.0)
    pub percentage: f64,
}

impl ProgressEvent {
    pub fn new(processed: usize, total: usize, current_file: impl Into<String>) -> Self {
        let percentage = if total > 0 {
            (processed as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        Self {
            processed,
            total,
            current_file: current_file.into(),
            percentage,
        }
    }

    /// Format as a simple user-facing line.
    pub fn format_simple(&self) -> String {
        format!(
            "[analyze] {}/{} ({:.0}%) - {}",
            self.processed, self.total, self.percentage, self.current_file
        )
    }
}

/// Outcome of an analysis batch.
#[derive(Debug, Clone, Default)]
pub struct AnalysisReport {
    /// Files that produced context items
    pub analyzed: Vec<String>,

    /// Files skipped because they could not be read or decoded
    pub skipped: Vec<String>,

    /// Non-fatal notices collected along the way
    pub warnings: Vec<String>,

    /// Total items emitted
    pub items: usize,

    pub cancelled: bool,

    pub elapsed_secs: f64,
}

/// Notifications from the analysis worker.
#[derive(Debug)]
pub enum AnalysisEvent {
    Progress(ProgressEvent),

    /// Every item of one file, emitted only once the file is complete
    FileAnalyzed {
        file_path: String,
        items: Vec<ContextItem>,
    },

    Warning {
        file_path: String,
        message: String,
    },

    Finished(AnalysisReport),

    Failed(AppError),
}

/// Notifications from the interactive worker.
#[derive(Debug)]
pub enum InteractiveEvent {
    /// Intermediate step shown to the user
    Step(String),

    Response {
        text: String,
        notices: Vec<AssemblyNotice>,
    },

    Failed(AppError),
}

/// Sending half of a worker's event channel.
#[derive(Debug)]
pub struct EventSink<E> {
    tx: mpsc::Sender<E>,
}

impl<E> Clone for EventSink<E> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<E: Send + std::fmt::Debug> EventSink<E> {
    pub fn new(tx: mpsc::Sender<E>) -> Self {
        Self { tx }
    }

    /// Bounded channel of `capacity` events.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<E>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Emit an event. A dropped receiver is not an error for the worker.
    pub async fn emit(&self, event: E) {
        if let Err(err) = self.tx.send(event).await {
            tracing::debug!("Event receiver dropped: {:?}", err.0);
        }
    }
}
