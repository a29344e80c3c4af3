//! Progress reporting for pipeline runs
//!
//! Runs report through a [`ProgressCallback`]; box lists and outputs travel as
//! owned snapshots inside the events, so a receiver never shares state with the
//! running pipeline.

use std::path::PathBuf;
use tokio::sync::mpsc;

use super::types::{ImageStage, RunKind, RunStatus};
use crate::geometry::TextBox;

/// Something that happened during a run
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    RunStarted {
        kind: RunKind,
        total: usize,
    },
    /// An image entered `stage`
    Stage {
        index: usize,
        source: PathBuf,
        stage: ImageStage,
    },
    /// Detection finished; `boxes` is the merged list in original coordinates
    Detected {
        index: usize,
        source: PathBuf,
        boxes: Vec<TextBox>,
    },
    /// A new variant was written for `source`
    Inpainted {
        index: usize,
        source: PathBuf,
        output: PathBuf,
    },
    ImageFailed {
        index: usize,
        source: PathBuf,
        error: String,
    },
    RunFinished {
        status: RunStatus,
    },
}

/// Receives pipeline events
pub trait ProgressCallback: Send + Sync {
    fn on_event(&self, event: &PipelineEvent);
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_event(&self, _event: &PipelineEvent) {}
}

/// Forwards events to an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl ChannelProgress {
    /// Create a callback and the receiving end
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressCallback for ChannelProgress {
    fn on_event(&self, event: &PipelineEvent) {
        // A dropped receiver just means nobody is listening
        let _ = self.tx.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_progress_forwards() {
        let (progress, mut rx) = ChannelProgress::new();
        progress.on_event(&PipelineEvent::RunStarted {
            kind: RunKind::Inpaint,
            total: 3,
        });
        progress.on_event(&PipelineEvent::RunFinished {
            status: RunStatus::Completed,
        });

        assert_eq!(
            rx.recv().await,
            Some(PipelineEvent::RunStarted {
                kind: RunKind::Inpaint,
                total: 3
            })
        );
        assert!(matches!(
            rx.recv().await,
            Some(PipelineEvent::RunFinished { .. })
        ));
    }

    #[test]
    fn test_channel_progress_receiver_dropped() {
        let (progress, rx) = ChannelProgress::new();
        drop(rx);
        progress.on_event(&PipelineEvent::RunFinished {
            status: RunStatus::Cancelled,
        });
    }
}
