//! Inpaint module
//!
//! Removes detected text from a page by sending masked crops to one or more
//! inpainting services and blending the answers back.
//!
//! # Stages
//!
//! - **Partition** ([`partition`]) - split reading-ordered boxes across endpoints
//! - **Mask** ([`mask`]) - rasterize each group into a clip-respecting mask
//! - **Dispatch** ([`dispatch`]) - concurrent requests with endpoint fallback
//! - **Composite** ([`compositor`]) - feathered blend in group order
//!
//! The service itself is behind [`InpaintBackend`]; [`HttpInpaintClient`] is the
//! production implementation.

pub mod client;
pub mod compositor;
pub mod dispatch;
pub mod mask;
pub mod partition;
mod types;

// Re-export public API
pub use client::{
    encode_png, encode_png_base64, HttpInpaintClient, InpaintBackend, InpaintRequest, ModelParams,
};
pub use compositor::{Compositor, DEFAULT_FEATHER_SIGMA};
pub use dispatch::{endpoint_order, InpaintDispatcher, PreparedTask, DEFAULT_CROP_PADDING};
pub use mask::{mask_bbox, MaskBuilder, MASK_ON};
pub use partition::{partition_evenly, sort_reading_order};
pub use types::{
    DispatchOutcome, EndpointError, InpaintError, MaskTask, PatchResult, Result, TaskFailure,
};
