//! slide-inpaint - text removal for slide images
//!
//! Reconciles OCR box coordinates across the original image, a
//! detection-sized working copy and a user ROI, then erases the boxes by
//! sending masked crops to one or more inpainting services and blending the
//! results back.
//!
//! # Modules
//!
//! - [`geometry`] - rects, scale mappings and the working-image scaler
//! - [`region_filter`] - merging ROI re-detections into a box list
//! - [`inpaint`] - masks, partitioning, dispatch and compositing
//! - [`pipeline`] - per-image state machine and batch entry points
//! - [`variants`] - non-destructive `source -> variant` tracking
//! - [`config`] - TOML config and runtime settings

pub mod cancel;
pub mod cli;
pub mod config;
pub mod geometry;
pub mod inpaint;
pub mod pipeline;
pub mod region_filter;
pub mod variants;

// Re-exports
pub use cancel::CancelToken;
pub use cli::{exit_codes, Cli, Commands, DetectArgs, EndpointsArgs, EraseArgs};
pub use config::{
    parse_endpoints, CliOverrides, Config, ConfigError, PipelineSettings,
    PipelineSettingsBuilder,
};
pub use geometry::{
    clamp_rect, map_boxes, map_rect, CropBox, GeometryError, Rect, ScaleMapping, TextBox,
    WorkingImage,
};
pub use inpaint::{
    Compositor, EndpointError, HttpInpaintClient, InpaintBackend, InpaintDispatcher,
    InpaintError, InpaintRequest, MaskBuilder, ModelParams, TaskFailure,
};
pub use pipeline::{
    ChannelProgress, DetectionError, ImageJob, ImageOutcome, ImageStage, NoProgress, Pipeline,
    PipelineError, PipelineEvent, ProgressCallback, RunKind, RunReport, RunStatus,
    SidecarDetector, TextDetector,
};
pub use region_filter::merge_roi_detections;
pub use variants::VariantMap;
