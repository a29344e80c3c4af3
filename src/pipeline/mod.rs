//! Pipeline module
//!
//! Sequences detection and inpainting over a batch of images.
//!
//! # Per-image stages
//!
//! ```text
//! Pending -> Scaling -> Detecting -> Idle
//!                                 -> MaskBuilding -> Dispatching -> Compositing -> Done
//! ```
//!
//! `Cancelled` is reachable from any non-terminal stage; `Failed` records a
//! per-image error without stopping the batch.
//!
//! # Example
//!
//! ```rust,no_run
//! use slide_inpaint::{CancelToken, ImageJob, NoProgress, Pipeline, PipelineSettings, VariantMap};
//! use std::path::Path;
//!
//! # async fn run() -> Result<(), slide_inpaint::PipelineError> {
//! let settings = PipelineSettings::builder()
//!     .endpoints("http://127.0.0.1:8080/api/v1/inpaint")
//!     .build();
//! let pipeline = Pipeline::from_settings(settings)?;
//!
//! let jobs = vec![ImageJob::new("slide1.png")];
//! let report = pipeline
//!     .inpaint_batch(&jobs, &VariantMap::new(), Path::new("out"), &CancelToken::new(), &NoProgress)
//!     .await?;
//! println!("{}", report.status);
//! # Ok(())
//! # }
//! ```

pub mod detect;
pub mod orchestrator;
pub mod progress;
mod types;

// Re-export public API
pub use detect::{
    plan_roi, roi_crop_filename, run_detection, DetectionError, DetectionRequest, RoiPlan,
    SidecarDetector, TextDetector,
};
pub use orchestrator::{group_boxes, output_path, Pipeline};
pub use progress::{ChannelProgress, NoProgress, PipelineEvent, ProgressCallback};
pub use types::{
    ImageJob, ImageOutcome, ImageStage, PipelineError, Result, RunKind, RunReport, RunStatus,
};
