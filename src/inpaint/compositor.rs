//! Feathered compositing of inpainted crops
//!
//! The crop mask is blurred so the seam between inpainted and untouched pixels
//! fades out, then used as alpha when blending the crop over the working image.

use image::{GrayImage, Rgb, RgbImage};
use imageproc::filter::gaussian_blur_f32;
use tracing::{debug, warn};

use super::types::PatchResult;

/// Default Gaussian sigma for seam feathering
pub const DEFAULT_FEATHER_SIGMA: f32 = 3.0;

/// Blends patches back into a working image
#[derive(Debug, Clone, Copy)]
pub struct Compositor {
    feather_sigma: f32,
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new(DEFAULT_FEATHER_SIGMA)
    }
}

impl Compositor {
    /// Create a compositor; `sigma <= 0` disables feathering
    pub fn new(feather_sigma: f32) -> Self {
        Self { feather_sigma }
    }

    /// Apply every patch in ascending `group_index`
    ///
    /// Later groups are blended over earlier ones, so on overlap the higher
    /// index wins. Returns the number of patches applied.
    pub fn apply_all(&self, target: &mut RgbImage, mut patches: Vec<PatchResult>) -> usize {
        patches.sort_by_key(|p| p.group_index);
        patches
            .iter()
            .filter(|patch| self.apply(target, patch))
            .count()
    }

    /// Blend one patch into `target`; returns false if the patch does not fit
    pub fn apply(&self, target: &mut RgbImage, patch: &PatchResult) -> bool {
        let cb = patch.crop_box;
        let (tw, th) = target.dimensions();
        let (w, h) = (cb.width(), cb.height());

        if cb.is_empty()
            || cb.x2 > tw
            || cb.y2 > th
            || patch.inpainted_crop.dimensions() != (w, h)
            || patch.crop_mask.dimensions() != (w, h)
        {
            warn!(
                group = patch.group_index,
                crop_box = ?cb,
                "Patch does not match its crop box, skipping"
            );
            return false;
        }

        let alpha = self.feather(&patch.crop_mask);
        for y in 0..h {
            for x in 0..w {
                let a = alpha.get_pixel(x, y).0[0];
                if a == 0 {
                    continue;
                }
                let src = patch.inpainted_crop.get_pixel(x, y);
                let dst = target.get_pixel_mut(cb.x1 + x, cb.y1 + y);
                *dst = blend(src, dst, a);
            }
        }

        debug!(group = patch.group_index, crop_box = ?cb, "Patch composited");
        true
    }

    fn feather(&self, mask: &GrayImage) -> GrayImage {
        if self.feather_sigma > 0.0 {
            gaussian_blur_f32(mask, self.feather_sigma)
        } else {
            mask.clone()
        }
    }
}

/// `src * a + dst * (1 - a)` with `a` in 0..=255
fn blend(src: &Rgb<u8>, dst: &Rgb<u8>, alpha: u8) -> Rgb<u8> {
    let a = alpha as u32;
    let mix = |s: u8, d: u8| -> u8 { ((s as u32 * a + d as u32 * (255 - a) + 127) / 255) as u8 };
    Rgb([
        mix(src.0[0], dst.0[0]),
        mix(src.0[1], dst.0[1]),
        mix(src.0[2], dst.0[2]),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::CropBox;
    use image::Luma;

    fn patch(index: usize, cb: CropBox, color: [u8; 3], mask_value: u8) -> PatchResult {
        PatchResult {
            group_index: index,
            crop_box: cb,
            inpainted_crop: RgbImage::from_pixel(cb.width(), cb.height(), Rgb(color)),
            crop_mask: GrayImage::from_pixel(cb.width(), cb.height(), Luma([mask_value])),
        }
    }

    #[test]
    fn test_blend_extremes() {
        let s = Rgb([200, 100, 0]);
        let d = Rgb([0, 100, 200]);
        assert_eq!(blend(&s, &d, 255), s);
        assert_eq!(blend(&s, &d, 0), d);
        assert_eq!(blend(&s, &d, 128), Rgb([100, 100, 100]));
    }

    #[test]
    fn test_full_mask_without_feather_replaces() {
        let mut img = RgbImage::from_pixel(20, 20, Rgb([0, 0, 0]));
        let cb = CropBox::new(5, 5, 10, 10);
        assert!(Compositor::new(0.0).apply(&mut img, &patch(0, cb, [255, 0, 0], 255)));

        assert_eq!(*img.get_pixel(5, 5), Rgb([255, 0, 0]));
        assert_eq!(*img.get_pixel(9, 9), Rgb([255, 0, 0]));
        assert_eq!(*img.get_pixel(10, 10), Rgb([0, 0, 0]));
        assert_eq!(*img.get_pixel(4, 4), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_outside_crop_untouched_with_feather() {
        let mut img = RgbImage::from_pixel(60, 60, Rgb([10, 10, 10]));
        let cb = CropBox::new(10, 10, 50, 50);
        let mut p = patch(0, cb, [250, 250, 250], 0);
        // Mask only in the middle of the crop
        for y in 10..30 {
            for x in 10..30 {
                p.crop_mask.put_pixel(x, y, Luma([255]));
            }
        }
        Compositor::default().apply(&mut img, &p);

        for (x, y, px) in img.enumerate_pixels() {
            let inside = (10..50).contains(&x) && (10..50).contains(&y);
            if !inside {
                assert_eq!(*px, Rgb([10, 10, 10]), "pixel ({}, {}) changed", x, y);
            }
        }
        // Center replaced, crop corner feathered back to the original
        assert!(img.get_pixel(30, 30).0[0] > 200);
        assert_eq!(*img.get_pixel(10, 10), Rgb([10, 10, 10]));
    }

    #[test]
    fn test_higher_group_wins_on_overlap() {
        let mut img = RgbImage::new(30, 30);
        let patches = vec![
            patch(1, CropBox::new(5, 5, 20, 20), [0, 0, 255], 255),
            patch(0, CropBox::new(0, 0, 15, 15), [255, 0, 0], 255),
        ];
        let applied = Compositor::new(0.0).apply_all(&mut img, patches);
        assert_eq!(applied, 2);
        assert_eq!(*img.get_pixel(10, 10), Rgb([0, 0, 255]));
        assert_eq!(*img.get_pixel(2, 2), Rgb([255, 0, 0]));
    }

    #[test]
    fn test_mismatched_patch_skipped() {
        let mut img = RgbImage::new(10, 10);
        let mut p = patch(0, CropBox::new(0, 0, 5, 5), [1, 2, 3], 255);
        p.inpainted_crop = RgbImage::new(4, 4);
        assert!(!Compositor::default().apply(&mut img, &p));

        let out_of_bounds = patch(0, CropBox::new(8, 8, 12, 12), [1, 2, 3], 255);
        assert!(!Compositor::default().apply(&mut img, &out_of_bounds));
    }
}
