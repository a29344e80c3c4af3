//! Pipeline module core types

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::detect::DetectionError;
use crate::geometry::{GeometryError, Rect, TextBox};
use crate::inpaint::InpaintError;
use crate::variants::VariantMap;

// ============================================================
// Error Types
// ============================================================

/// Pipeline error types
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("A pipeline run is already in progress")]
    AlreadyRunning,

    #[error("No inpaint endpoints configured")]
    NoEndpoints,

    #[error("Inpainting is disabled in the configuration")]
    InpaintDisabled,

    #[error("Image not found: {0}")]
    ImageNotFound(PathBuf),

    #[error("Inpaint failed: {0}")]
    Inpaint(#[from] InpaintError),

    #[error("Detection failed: {0}")]
    Detection(#[from] DetectionError),

    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Worker task failed: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

// ============================================================
// Per-image state
// ============================================================

/// Where one image is in its run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageStage {
    #[default]
    Pending,
    /// Preparing the working image
    Scaling,
    Detecting,
    /// Nothing to erase
    Idle,
    MaskBuilding,
    Dispatching,
    Compositing,
    Done,
    Cancelled,
    Failed,
}

impl ImageStage {
    /// Stage name
    pub fn name(&self) -> &'static str {
        match self {
            ImageStage::Pending => "pending",
            ImageStage::Scaling => "scaling",
            ImageStage::Detecting => "detecting",
            ImageStage::Idle => "idle",
            ImageStage::MaskBuilding => "mask_building",
            ImageStage::Dispatching => "dispatching",
            ImageStage::Compositing => "compositing",
            ImageStage::Done => "done",
            ImageStage::Cancelled => "cancelled",
            ImageStage::Failed => "failed",
        }
    }

    /// No further transitions possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ImageStage::Idle | ImageStage::Done | ImageStage::Cancelled | ImageStage::Failed
        )
    }

    /// Check whether `next` is a legal successor
    pub fn can_transition_to(&self, next: ImageStage) -> bool {
        use ImageStage::*;
        if self.is_terminal() {
            return false;
        }
        if next == Cancelled {
            return true;
        }
        matches!(
            (*self, next),
            (Pending, Scaling)
                | (Pending, MaskBuilding)
                | (Pending, Failed)
                | (Scaling, Detecting)
                | (Scaling, Failed)
                | (Detecting, Idle)
                | (Detecting, Done)
                | (Detecting, MaskBuilding)
                | (Detecting, Failed)
                | (MaskBuilding, Idle)
                | (MaskBuilding, Dispatching)
                | (MaskBuilding, Failed)
                | (Dispatching, Compositing)
                | (Dispatching, Failed)
                | (Compositing, Done)
                | (Compositing, Failed)
        )
    }
}

impl fmt::Display for ImageStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================
// Batch input / output
// ============================================================

/// Which entry point produced a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Detect,
    Inpaint,
    Erase,
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunKind::Detect => write!(f, "detect"),
            RunKind::Inpaint => write!(f, "inpaint"),
            RunKind::Erase => write!(f, "erase"),
        }
    }
}

/// One image in a batch, with its current boxes and ROI (original coordinates)
#[derive(Debug, Clone, Default)]
pub struct ImageJob {
    pub source: PathBuf,
    pub boxes: Vec<TextBox>,
    pub roi: Option<Rect>,
}

impl ImageJob {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_boxes(mut self, boxes: Vec<TextBox>) -> Self {
        self.boxes = boxes;
        self
    }

    #[must_use]
    pub fn with_roi(mut self, roi: Option<Rect>) -> Self {
        self.roi = roi;
        self
    }
}

/// Final state of one image
#[derive(Debug, Clone, Serialize)]
pub struct ImageOutcome {
    pub source: PathBuf,
    /// Always terminal
    pub stage: ImageStage,
    /// Box list after detection, when detection ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boxes: Option<Vec<TextBox>>,
    /// Written variant, when inpainting completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImageOutcome {
    pub(crate) fn new(source: &Path, stage: ImageStage) -> Self {
        Self {
            source: source.to_path_buf(),
            stage,
            boxes: None,
            output: None,
            error: None,
        }
    }

    pub(crate) fn failed(source: &Path, error: &PipelineError) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(source, ImageStage::Failed)
        }
    }

    /// Done or Idle
    pub fn is_success(&self) -> bool {
        matches!(self.stage, ImageStage::Done | ImageStage::Idle)
    }
}

/// Overall status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every image finished
    Completed,
    /// Some images finished, some failed
    PartiallyCompleted,
    /// Every image failed
    Failed,
    /// Cancellation was observed
    Cancelled,
}

impl RunStatus {
    /// Summarize per-image outcomes; cancellation takes precedence
    pub fn from_outcomes(cancelled: bool, images: &[ImageOutcome]) -> Self {
        if cancelled {
            return RunStatus::Cancelled;
        }
        let failed = images
            .iter()
            .filter(|o| o.stage == ImageStage::Failed)
            .count();
        if failed == 0 {
            RunStatus::Completed
        } else if failed == images.len() {
            RunStatus::Failed
        } else {
            RunStatus::PartiallyCompleted
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::PartiallyCompleted => write!(f, "partially_completed"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Result of one batch run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub kind: RunKind,
    pub status: RunStatus,
    pub images: Vec<ImageOutcome>,
}

impl RunReport {
    pub(crate) fn new(kind: RunKind, cancelled: bool, images: Vec<ImageOutcome>) -> Self {
        Self {
            kind,
            status: RunStatus::from_outcomes(cancelled, &images),
            images,
        }
    }

    /// `(source, output)` for every completed inpaint
    pub fn outputs(&self) -> Vec<(&Path, &Path)> {
        self.images
            .iter()
            .filter_map(|o| o.output.as_deref().map(|out| (o.source.as_path(), out)))
            .collect()
    }

    pub fn succeeded(&self) -> usize {
        self.images.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.images
            .iter()
            .filter(|o| o.stage == ImageStage::Failed)
            .count()
    }

    /// Record every output in `variants`; returns how many were recorded
    pub fn apply_to(&self, variants: &mut VariantMap) -> usize {
        self.outputs()
            .into_iter()
            .filter(|(source, output)| variants.record(source, output))
            .count()
    }
}
