//! Working-image preparation
//!
//! Text detection runs on a copy normalized to a fixed height. The resulting
//! [`ScaleMapping`] is what carries detector coordinates back to the original.

use image::imageops::FilterType;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::types::ScaleMapping;

/// Default working-image height for detection
pub const DEFAULT_WORKING_HEIGHT: u32 = 1080;

/// Heights within this distance of the target are used as-is
pub const DEFAULT_HEIGHT_TOLERANCE: u32 = 100;

/// A detection-ready image and how it relates to its original
#[derive(Debug, Clone, PartialEq)]
pub struct WorkingImage {
    /// Image the detector should read
    pub path: PathBuf,
    /// Original image size
    pub original_size: (u32, u32),
    /// Working image size
    pub working_size: (u32, u32),
    /// Working -> original mapping
    pub scale: ScaleMapping,
}

impl WorkingImage {
    /// The original is used directly
    pub fn unscaled(path: &Path, size: (u32, u32)) -> Self {
        Self {
            path: path.to_path_buf(),
            original_size: size,
            working_size: size,
            scale: ScaleMapping::identity(),
        }
    }
}

/// Compute the working size for an image, or `None` if no resize is needed
pub fn plan_working_size(
    width: u32,
    height: u32,
    target_height: u32,
    tolerance: u32,
) -> Option<(u32, u32)> {
    if width == 0 || height == 0 || target_height == 0 {
        return None;
    }
    if height.abs_diff(target_height) < tolerance {
        return None;
    }
    let scale = target_height as f64 / height as f64;
    let new_width = ((width as f64 * scale) as u32).max(1);
    Some((new_width, target_height))
}

/// Produce the working image for `original`, writing any resized copy into `scratch_dir`
///
/// Any failure to resize or write falls back to the original image with an
/// identity mapping; detection still runs, just at full resolution.
pub fn prepare_working_image(
    original: &Path,
    scratch_dir: &Path,
    target_height: u32,
    tolerance: u32,
) -> image::ImageResult<WorkingImage> {
    let img = image::open(original)?;
    let size = (img.width(), img.height());

    let Some((work_w, work_h)) = plan_working_size(size.0, size.1, target_height, tolerance)
    else {
        return Ok(WorkingImage::unscaled(original, size));
    };

    let filename = original
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image.png".to_string());
    let scaled_path = scratch_dir.join(format!("scaled_{}", filename));

    let resized = img.resize_exact(work_w, work_h, FilterType::Triangle);
    if let Err(e) = resized.save(&scaled_path) {
        warn!(path = %original.display(), error = %e, "Failed to write working image, using original");
        return Ok(WorkingImage::unscaled(original, size));
    }

    let scale = match ScaleMapping::from_sizes(size, (work_w, work_h)) {
        Ok(scale) => scale,
        Err(e) => {
            warn!(path = %original.display(), error = %e, "Invalid working scale, using original");
            return Ok(WorkingImage::unscaled(original, size));
        }
    };

    debug!(
        path = %original.display(),
        from = ?size,
        to = ?(work_w, work_h),
        "Prepared working image"
    );

    Ok(WorkingImage {
        path: scaled_path,
        original_size: size,
        working_size: (work_w, work_h),
        scale,
    })
}
