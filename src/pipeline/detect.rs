//! Text detection with working-image scaling and ROI scoping
//!
//! The detector itself is a black box behind [`TextDetector`]. This module owns
//! everything around it: which image it reads, how an ROI becomes a crop, and
//! how its answers return to original coordinates and merge into the box list.

use chrono::Utc;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::geometry::{
    clamp_rect, map_boxes, map_rect, offset_boxes, Rect, ScaleMapping, TextBox, WorkingImage,
};
use crate::region_filter::merge_roi_detections;

/// Detection error types
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid box file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Detector failed: {0}")]
    Engine(String),
}

pub type Result<T> = std::result::Result<T, DetectionError>;

// ============================================================
// Detector interface
// ============================================================

/// What a detector is asked to read
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRequest {
    /// Image to read; answers are in this image's pixel frame
    pub image: PathBuf,
    /// Original image the request was derived from
    pub source: PathBuf,
    /// Origin of `image` inside the working image
    pub origin: (i32, i32),
    /// Working -> original scale
    pub scale: ScaleMapping,
}

/// A text detection engine
pub trait TextDetector: Send + Sync + 'static {
    /// Detect text in `request.image`, returning boxes in that image's frame
    fn recognize(&self, request: &DetectionRequest) -> Result<Vec<TextBox>>;
}

/// Detector backed by precomputed box files
///
/// Reads `<boxes_dir>/<source stem>.json`, an array of boxes in original
/// coordinates, and projects them into the requested frame. A missing file
/// means nothing was detected.
#[derive(Debug, Clone)]
pub struct SidecarDetector {
    boxes_dir: PathBuf,
}

impl SidecarDetector {
    pub fn new(boxes_dir: impl Into<PathBuf>) -> Self {
        Self {
            boxes_dir: boxes_dir.into(),
        }
    }

    /// Box file for `source`
    pub fn sidecar_path(&self, source: &Path) -> PathBuf {
        self.boxes_dir.join(format!("{}.json", file_base(source)))
    }

    /// Boxes stored for `source`, in original coordinates
    pub fn load_boxes(&self, source: &Path) -> Result<Vec<TextBox>> {
        let path = self.sidecar_path(source);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content).map_err(|e| DetectionError::Parse {
            path,
            message: e.to_string(),
        })
    }
}

impl TextDetector for SidecarDetector {
    fn recognize(&self, request: &DetectionRequest) -> Result<Vec<TextBox>> {
        let boxes = self.load_boxes(&request.source)?;
        let (width, height) = image::image_dimensions(&request.image)?;
        let to_working = request.scale.inverse();

        Ok(boxes
            .iter()
            .filter_map(|b| {
                let local = map_rect(b.rect, to_working).offset(-request.origin.0, -request.origin.1);
                clamp_rect(local, width, height)
                    .ok()
                    .map(|rect| b.with_rect(rect))
            })
            .collect())
    }
}

// ============================================================
// ROI planning
// ============================================================

/// How an ROI resolves against one image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoiPlan {
    /// ROI clamped to the original image
    pub original: Option<Rect>,
    /// Crop of the working image to detect on; `None` means full frame
    pub working: Option<Rect>,
}

/// Resolve `roi` (original coordinates) against a working image
///
/// A degenerate ROI is dropped. A working-space ROI with either side below
/// `min_side` falls back to full-frame detection.
pub fn plan_roi(roi: Option<Rect>, working: &WorkingImage, min_side: u32) -> RoiPlan {
    let (ow, oh) = working.original_size;
    let (ww, wh) = working.working_size;

    let Some(original) = roi.and_then(|r| clamp_rect(r, ow, oh).ok()) else {
        return RoiPlan::default();
    };

    let min_side = min_side.min(i32::MAX as u32) as i32;
    let working_roi = clamp_rect(map_rect(original, working.scale.inverse()), ww, wh)
        .ok()
        .filter(|r| r.width >= min_side && r.height >= min_side);

    if working_roi.is_none() {
        debug!(roi = ?original, "ROI too small in working space, using full frame");
    }

    RoiPlan {
        original: Some(original),
        working: working_roi,
    }
}

/// File name for an ROI crop handed to the detector
pub fn roi_crop_filename(base: &str, timestamp_ms: i64, roi: Rect) -> String {
    format!(
        "roi_ocr_{}_{}_{}_{}_{}x{}.png",
        base, timestamp_ms, roi.x, roi.y, roi.width, roi.height
    )
}

/// Cut `roi` out of the working image into `scratch_dir`
pub fn write_roi_crop(
    working_path: &Path,
    roi: Rect,
    scratch_dir: &Path,
    base: &str,
) -> Result<PathBuf> {
    let img = image::open(working_path)?;
    // `roi` is already clamped to the working image, so these are non-negative
    let crop = img.crop_imm(
        roi.x.max(0) as u32,
        roi.y.max(0) as u32,
        roi.width.max(0) as u32,
        roi.height.max(0) as u32,
    );
    let path = scratch_dir.join(roi_crop_filename(
        base,
        Utc::now().timestamp_millis(),
        roi,
    ));
    crop.save(&path)?;
    Ok(path)
}

// ============================================================
// Detection pass
// ============================================================

/// Run one detection pass for an image and merge it into `existing`
///
/// Detector answers are offset by the crop origin, mapped to original space
/// and stripped of boxes that collapsed to nothing on the way.
pub fn run_detection<D: TextDetector + ?Sized>(
    detector: &D,
    source: &Path,
    working: &WorkingImage,
    roi: Option<Rect>,
    existing: Vec<TextBox>,
    scratch_dir: &Path,
    min_roi_side: u32,
) -> Result<Vec<TextBox>> {
    let plan = plan_roi(roi, working, min_roi_side);
    let base = file_base(source);

    let (request, merge_roi) = match plan.working {
        Some(crop) => match write_roi_crop(&working.path, crop, scratch_dir, &base) {
            Ok(crop_path) => (
                DetectionRequest {
                    image: crop_path,
                    source: source.to_path_buf(),
                    origin: (crop.x, crop.y),
                    scale: working.scale,
                },
                plan.original,
            ),
            Err(e) => {
                warn!(path = %source.display(), error = %e, "ROI crop failed, using full frame");
                (full_frame_request(source, working), None)
            }
        },
        None => (full_frame_request(source, working), None),
    };

    let detections = detector.recognize(&request)?;
    let local_count = detections.len();
    let detections: Vec<TextBox> = map_boxes(
        &offset_boxes(detections, request.origin.0, request.origin.1),
        working.scale,
    )
    .into_iter()
    .filter(|b| b.rect.is_valid())
    .collect();

    info!(
        path = %source.display(),
        roi = ?merge_roi,
        detected = local_count,
        kept = detections.len(),
        "Detection pass finished"
    );

    Ok(merge_roi_detections(existing, merge_roi, detections))
}

fn full_frame_request(source: &Path, working: &WorkingImage) -> DetectionRequest {
    DetectionRequest {
        image: working.path.clone(),
        source: source.to_path_buf(),
        origin: (0, 0),
        scale: working.scale,
    }
}

/// File stem used in derived file names
pub(crate) fn file_base(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::prepare_working_image;
    use image::{Rgb, RgbImage};
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Returns fixed boxes and records every request
    struct FixedDetector {
        boxes: Vec<TextBox>,
        requests: Mutex<Vec<DetectionRequest>>,
    }

    impl FixedDetector {
        fn new(boxes: Vec<TextBox>) -> Self {
            Self {
                boxes,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl TextDetector for FixedDetector {
        fn recognize(&self, request: &DetectionRequest) -> Result<Vec<TextBox>> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(self.boxes.clone())
        }
    }

    fn tb(x: i32, y: i32, w: i32, h: i32) -> TextBox {
        TextBox::new(Rect::new(x, y, w, h), "t", 0.9)
    }

    fn write_image(dir: &Path, name: &str, w: u32, h: u32) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(w, h, Rgb([255, 255, 255]))
            .save(&path)
            .unwrap();
        path
    }

    fn scaled_working(path: &Path) -> WorkingImage {
        // 4000x2160 original, 2000x1080 working: scale (2, 2)
        WorkingImage {
            path: path.to_path_buf(),
            original_size: (4000, 2160),
            working_size: (2000, 1080),
            scale: ScaleMapping::new(2.0, 2.0).unwrap(),
        }
    }

    #[test]
    fn test_plan_roi_none() {
        let w = scaled_working(Path::new("w.png"));
        assert_eq!(plan_roi(None, &w, 5), RoiPlan::default());
    }

    #[test]
    fn test_plan_roi_maps_to_working() {
        let w = scaled_working(Path::new("w.png"));
        let plan = plan_roi(Some(Rect::new(100, 200, 400, 300)), &w, 5);
        assert_eq!(plan.original, Some(Rect::new(100, 200, 400, 300)));
        assert_eq!(plan.working, Some(Rect::new(50, 100, 200, 150)));
    }

    #[test]
    fn test_plan_roi_clamped_to_original() {
        let w = scaled_working(Path::new("w.png"));
        let plan = plan_roi(Some(Rect::new(3900, 2100, 400, 400)), &w, 5);
        assert_eq!(plan.original, Some(Rect::new(3900, 2100, 100, 60)));
        assert_eq!(plan.working, Some(Rect::new(1950, 1050, 50, 30)));
    }

    #[test]
    fn test_plan_roi_tiny_falls_back_to_full_frame() {
        let w = scaled_working(Path::new("w.png"));
        let plan = plan_roi(Some(Rect::new(100, 100, 8, 40)), &w, 5);
        assert_eq!(plan.original, Some(Rect::new(100, 100, 8, 40)));
        assert_eq!(plan.working, None);
    }

    #[test]
    fn test_plan_roi_outside_image_dropped() {
        let w = scaled_working(Path::new("w.png"));
        assert_eq!(
            plan_roi(Some(Rect::new(5000, 0, 10, 10)), &w, 5),
            RoiPlan::default()
        );
    }

    #[test]
    fn test_roi_crop_filename() {
        assert_eq!(
            roi_crop_filename("slide1", 1700000000123, Rect::new(5, 6, 70, 80)),
            "roi_ocr_slide1_1700000000123_5_6_70x80.png"
        );
    }

    #[test]
    fn test_full_frame_detection_replaces_and_maps() {
        let dir = tempdir().unwrap();
        let working_path = write_image(dir.path(), "w.png", 2000, 1080);
        let working = scaled_working(&working_path);
        let detector = FixedDetector::new(vec![tb(10, 20, 30, 40)]);

        let boxes = run_detection(
            &detector,
            Path::new("slide.png"),
            &working,
            None,
            vec![tb(0, 0, 1, 1)],
            dir.path(),
            5,
        )
        .unwrap();

        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].rect, Rect::new(20, 40, 60, 80));
        let requests = detector.requests.lock().unwrap();
        assert_eq!(requests[0].image, working_path);
        assert_eq!(requests[0].origin, (0, 0));
    }

    #[test]
    fn test_roi_detection_crops_offsets_and_merges() {
        let dir = tempdir().unwrap();
        let working_path = write_image(dir.path(), "w.png", 2000, 1080);
        let working = scaled_working(&working_path);
        // Crop-local box at (5, 5) inside an ROI whose working origin is (50, 100)
        let detector = FixedDetector::new(vec![tb(5, 5, 10, 10)]);
        let existing = vec![tb(0, 0, 20, 20), tb(150, 250, 20, 20)];

        let boxes = run_detection(
            &detector,
            Path::new("/slides/deck_01.png"),
            &working,
            Some(Rect::new(100, 200, 400, 300)),
            existing,
            dir.path(),
            5,
        )
        .unwrap();

        // Box outside the ROI kept, box inside replaced by the detection
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[0].rect, Rect::new(0, 0, 20, 20));
        assert_eq!(boxes[1].rect, Rect::new(110, 210, 20, 20));

        let requests = detector.requests.lock().unwrap();
        assert_eq!(requests[0].origin, (50, 100));
        let crop_name = requests[0].image.file_name().unwrap().to_string_lossy();
        assert!(crop_name.starts_with("roi_ocr_deck_01_"));
        assert!(crop_name.ends_with("_50_100_200x150.png"));
        assert_eq!(
            image::image_dimensions(&requests[0].image).unwrap(),
            (200, 150)
        );
    }

    #[test]
    fn test_roi_detection_empty_keeps_existing() {
        let dir = tempdir().unwrap();
        let working_path = write_image(dir.path(), "w.png", 2000, 1080);
        let working = scaled_working(&working_path);
        let detector = FixedDetector::new(Vec::new());
        let existing = vec![tb(150, 250, 20, 20)];

        let boxes = run_detection(
            &detector,
            Path::new("s.png"),
            &working,
            Some(Rect::new(100, 200, 400, 300)),
            existing.clone(),
            dir.path(),
            5,
        )
        .unwrap();
        assert_eq!(boxes, existing);
    }

    #[test]
    fn test_sidecar_detector_projects_into_request_frame() {
        let dir = tempdir().unwrap();
        let boxes_dir = dir.path().join("boxes");
        std::fs::create_dir_all(&boxes_dir).unwrap();
        std::fs::write(
            boxes_dir.join("page.json"),
            r#"[{"rect":[200,400,100,60],"text":"Title","confidence":0.95,"font":"Noto"},
                {"rect":[3000,10,100,100],"text":"Far"}]"#,
        )
        .unwrap();

        let original = write_image(dir.path(), "page.png", 4000, 2160);
        let working = prepare_working_image(&original, dir.path(), 1080, 100).unwrap();
        assert_eq!(working.working_size, (2000, 1080));

        let detector = SidecarDetector::new(&boxes_dir);
        let boxes = run_detection(
            &detector,
            &original,
            &working,
            Some(Rect::new(0, 0, 1000, 1000)),
            Vec::new(),
            dir.path(),
            5,
        )
        .unwrap();

        // Only the box inside the ROI comes back, at its original position
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].rect, Rect::new(200, 400, 100, 60));
        assert_eq!(boxes[0].text, "Title");
        assert_eq!(boxes[0].extra["font"], "Noto");
    }

    #[test]
    fn test_sidecar_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let detector = SidecarDetector::new(dir.path());
        assert!(detector.load_boxes(Path::new("nothing.png")).unwrap().is_empty());
    }

    #[test]
    fn test_sidecar_invalid_json() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        let detector = SidecarDetector::new(dir.path());
        assert!(matches!(
            detector.load_boxes(Path::new("bad.png")),
            Err(DetectionError::Parse { .. })
        ));
    }
}
