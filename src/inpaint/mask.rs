//! Mask rasterization
//!
//! Turns a group of text rects into a full-canvas single-channel mask. Each rect
//! is padded, clamped to the canvas and filled solid; an optional ROI then acts
//! as a hard clip over the padded result.

use image::{GrayImage, Luma};
use imageproc::drawing::draw_filled_rect_mut;
use rayon::prelude::*;
use tracing::debug;

use super::types::MaskTask;
use crate::geometry::{clamp_rect, CropBox, Rect};

/// Mask value for pixels to be replaced
pub const MASK_ON: u8 = 255;

/// Rasterizes box groups into masks for one canvas
#[derive(Debug, Clone)]
pub struct MaskBuilder {
    width: u32,
    height: u32,
    padding: u32,
    roi: Option<Rect>,
}

impl MaskBuilder {
    /// Create a builder for a `width x height` canvas
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            padding: 0,
            roi: None,
        }
    }

    /// Set box padding in pixels
    #[must_use]
    pub fn padding(mut self, padding: u32) -> Self {
        self.padding = padding;
        self
    }

    /// Set the clip region
    ///
    /// The ROI is clamped to the canvas; one with no area left inside the canvas
    /// is dropped and the mask is unclipped.
    #[must_use]
    pub fn roi(mut self, roi: Option<Rect>) -> Self {
        self.roi = roi.and_then(|r| clamp_rect(r, self.width, self.height).ok());
        self
    }

    /// Effective clip region after clamping
    pub fn clip(&self) -> Option<Rect> {
        self.roi
    }

    /// Rasterize one group of rects
    pub fn build(&self, rects: &[Rect]) -> GrayImage {
        let mut mask = GrayImage::new(self.width, self.height);
        let pad = self.padding.min(i32::MAX as u32) as i32;

        for rect in rects {
            if !rect.is_valid() {
                debug!(?rect, "Skipping degenerate box");
                continue;
            }
            let Ok(filled) = clamp_rect(rect.padded(pad), self.width, self.height) else {
                continue;
            };
            let filled = match self.roi {
                Some(roi) => match filled.intersection(&roi) {
                    Some(clipped) => clipped,
                    None => continue,
                },
                None => filled,
            };
            draw_filled_rect_mut(
                &mut mask,
                imageproc::rect::Rect::at(filled.x, filled.y)
                    .of_size(filled.width as u32, filled.height as u32),
                Luma([MASK_ON]),
            );
        }

        mask
    }

    /// Rasterize every group, dropping groups whose mask ends up empty
    ///
    /// `group_index` is the group's position in `groups`, so it still lines up
    /// with endpoint selection when some groups are skipped.
    pub fn build_tasks(&self, groups: &[Vec<Rect>]) -> Vec<MaskTask> {
        groups
            .par_iter()
            .enumerate()
            .filter(|(_, rects)| !rects.is_empty())
            .map(|(group_index, rects)| MaskTask {
                group_index,
                mask: self.build(rects),
            })
            .filter(|task| mask_bbox(&task.mask).is_some())
            .collect()
    }
}

/// Tight bounding box of non-zero mask pixels, `None` for an all-zero mask
pub fn mask_bbox(mask: &GrayImage) -> Option<CropBox> {
    let (width, height) = mask.dimensions();
    let mut x1 = u32::MAX;
    let mut y1 = u32::MAX;
    let mut x2 = 0u32;
    let mut y2 = 0u32;

    for (x, y, pixel) in mask.enumerate_pixels() {
        if pixel.0[0] != 0 {
            x1 = x1.min(x);
            y1 = y1.min(y);
            x2 = x2.max(x + 1);
            y2 = y2.max(y + 1);
        }
    }

    if x1 == u32::MAX {
        return None;
    }
    debug_assert!(x2 <= width && y2 <= height);
    Some(CropBox::new(x1, y1, x2, y2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_on(mask: &GrayImage) -> usize {
        mask.pixels().filter(|p| p.0[0] == MASK_ON).count()
    }

    #[test]
    fn test_padded_box_fill() {
        let mask = MaskBuilder::new(1000, 800)
            .padding(5)
            .build(&[Rect::new(10, 10, 100, 30)]);

        assert_eq!(mask_bbox(&mask), Some(CropBox::new(5, 5, 115, 45)));
        assert_eq!(count_on(&mask), 110 * 40);
        assert_eq!(mask.get_pixel(4, 5).0[0], 0);
        assert_eq!(mask.get_pixel(5, 5).0[0], MASK_ON);
        assert_eq!(mask.get_pixel(114, 44).0[0], MASK_ON);
        assert_eq!(mask.get_pixel(115, 44).0[0], 0);
    }

    #[test]
    fn test_padding_clamped_to_canvas() {
        let mask = MaskBuilder::new(50, 50)
            .padding(10)
            .build(&[Rect::new(2, 40, 10, 8)]);
        assert_eq!(mask_bbox(&mask), Some(CropBox::new(0, 30, 22, 50)));
    }

    #[test]
    fn test_roi_clips_after_padding() {
        let builder = MaskBuilder::new(200, 200)
            .padding(6)
            .roi(Some(Rect::new(0, 0, 100, 100)));
        // Box inside the ROI whose padding pokes out of it
        let mask = builder.build(&[Rect::new(90, 90, 8, 8)]);
        assert_eq!(mask_bbox(&mask), Some(CropBox::new(84, 84, 100, 100)));
    }

    #[test]
    fn test_box_outside_roi_gives_empty_mask() {
        let builder = MaskBuilder::new(200, 200).roi(Some(Rect::new(0, 0, 50, 50)));
        let mask = builder.build(&[Rect::new(150, 150, 10, 10)]);
        assert_eq!(mask_bbox(&mask), None);
    }

    #[test]
    fn test_roi_clamped_to_canvas() {
        let builder = MaskBuilder::new(100, 100).roi(Some(Rect::new(50, 50, 500, 500)));
        assert_eq!(builder.clip(), Some(Rect::new(50, 50, 50, 50)));

        let builder = MaskBuilder::new(100, 100).roi(Some(Rect::new(300, 300, 5, 5)));
        assert_eq!(builder.clip(), None);
    }

    #[test]
    fn test_degenerate_box_skipped() {
        let mask = MaskBuilder::new(20, 20).build(&[Rect::new(5, 5, 0, 3)]);
        assert_eq!(count_on(&mask), 0);
    }

    #[test]
    fn test_build_tasks_skips_empty_groups() {
        let builder = MaskBuilder::new(100, 100).roi(Some(Rect::new(0, 0, 40, 40)));
        let groups = vec![
            vec![Rect::new(5, 5, 10, 10)],
            vec![Rect::new(60, 60, 10, 10)],
            vec![],
            vec![Rect::new(20, 20, 5, 5)],
        ];
        let tasks = builder.build_tasks(&groups);
        let indices: Vec<usize> = tasks.iter().map(|t| t.group_index).collect();
        assert_eq!(indices, vec![0, 3]);
    }

    #[test]
    fn test_mask_bbox_empty() {
        assert_eq!(mask_bbox(&GrayImage::new(10, 10)), None);
    }
}
