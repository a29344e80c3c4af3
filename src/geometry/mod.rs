//! Geometry module
//!
//! Coordinate reconciliation between the three spaces a page lives in:
//!
//! - **original** - the image as imported
//! - **working** - the detection-optimized copy (see [`scaling`])
//! - **crop-local** - a region cut out for ROI detection or an inpaint request
//!
//! Everything here is pure; I/O is limited to [`scaling::prepare_working_image`].

pub mod mapper;
pub mod scaling;
mod types;

// Re-export public API
pub use mapper::{clamp_rect, map_boxes, map_rect, offset_boxes};
pub use scaling::{
    plan_working_size, prepare_working_image, WorkingImage, DEFAULT_HEIGHT_TOLERANCE,
    DEFAULT_WORKING_HEIGHT,
};
pub use types::{CropBox, GeometryError, Rect, Result, ScaleMapping, TextBox};
