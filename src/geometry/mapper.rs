//! Rect transforms between the original, working and crop-local spaces

use super::types::{GeometryError, Rect, Result, ScaleMapping, TextBox};

/// Forward-map a rect by a scale pair
///
/// Every component is rounded on its own; the far corner is never re-derived,
/// so repeated mapping does not accumulate drift on the extent.
pub fn map_rect(rect: Rect, scale: ScaleMapping) -> Rect {
    let scale_component = |v: i32, s: f64| (v as f64 * s).round() as i32;
    Rect::new(
        scale_component(rect.x, scale.scale_x),
        scale_component(rect.y, scale.scale_y),
        scale_component(rect.width, scale.scale_x),
        scale_component(rect.height, scale.scale_y),
    )
}

/// Map every box from working space into original space
pub fn map_boxes(boxes: &[TextBox], scale: ScaleMapping) -> Vec<TextBox> {
    if scale.is_identity() {
        return boxes.to_vec();
    }
    boxes
        .iter()
        .map(|b| b.with_rect(map_rect(b.rect, scale)))
        .collect()
}

/// Move crop-local boxes back into the frame the crop was cut from
pub fn offset_boxes(boxes: Vec<TextBox>, dx: i32, dy: i32) -> Vec<TextBox> {
    boxes
        .into_iter()
        .map(|mut b| {
            b.rect = b.rect.offset(dx, dy);
            b
        })
        .collect()
}

/// Clamp a rect to `[0, width) x [0, height)`
///
/// Returns the largest sub-rect of `rect` inside the bounds: the origin is
/// clamped first, then the extent shrinks to fit. When nothing non-degenerate
/// remains the result is an error and the caller falls back to full frame.
pub fn clamp_rect(rect: Rect, width: u32, height: u32) -> Result<Rect> {
    if !rect.is_valid() {
        return Err(GeometryError::Degenerate(rect));
    }
    let w = width.min(i32::MAX as u32) as i32;
    let h = height.min(i32::MAX as u32) as i32;

    let x1 = rect.x.clamp(0, w);
    let y1 = rect.y.clamp(0, h);
    let x2 = rect.right().clamp(0, w);
    let y2 = rect.bottom().clamp(0, h);

    if x2 <= x1 || y2 <= y1 {
        return Err(GeometryError::OutOfBounds {
            rect,
            width,
            height,
        });
    }
    Ok(Rect::from_corners(x1, y1, x2, y2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_rect_rounds_each_component() {
        let s = ScaleMapping::new(1.5, 2.0).unwrap();
        assert_eq!(map_rect(Rect::new(3, 3, 5, 5), s), Rect::new(5, 6, 8, 10));
    }

    #[test]
    fn test_map_rect_identity() {
        let r = Rect::new(7, 9, 11, 13);
        assert_eq!(map_rect(r, ScaleMapping::identity()), r);
    }

    #[test]
    fn test_forward_then_inverse_within_one_pixel() {
        let scales = [1.0, 1.25, 1.5, 1.7777, 2.0, 2.5, 3.3333, 4.0];
        for &sx in &scales {
            for &sy in &scales {
                let fwd = ScaleMapping::new(sx, sy).unwrap();
                let inv = fwd.inverse();
                for x in (0..200).step_by(13) {
                    for w in (1..120).step_by(17) {
                        let r = Rect::new(x, x / 2 + 3, w, w / 3 + 1);
                        let back = map_rect(map_rect(r, fwd), inv);
                        assert!((back.x - r.x).abs() <= 1, "{:?} -> {:?}", r, back);
                        assert!((back.y - r.y).abs() <= 1, "{:?} -> {:?}", r, back);
                        assert!((back.width - r.width).abs() <= 1, "{:?} -> {:?}", r, back);
                        assert!((back.height - r.height).abs() <= 1, "{:?} -> {:?}", r, back);
                    }
                }
            }
        }
    }

    #[test]
    fn test_clamp_inside_unchanged() {
        let r = Rect::new(10, 10, 20, 20);
        assert_eq!(clamp_rect(r, 100, 100).unwrap(), r);
    }

    #[test]
    fn test_clamp_shrinks_extent_after_origin() {
        assert_eq!(
            clamp_rect(Rect::new(-10, -5, 30, 20), 100, 100).unwrap(),
            Rect::new(0, 0, 20, 15)
        );
        assert_eq!(
            clamp_rect(Rect::new(90, 95, 30, 30), 100, 100).unwrap(),
            Rect::new(90, 95, 10, 5)
        );
    }

    #[test]
    fn test_clamp_rejects_outside() {
        assert!(clamp_rect(Rect::new(100, 0, 10, 10), 100, 100).is_err());
        assert!(clamp_rect(Rect::new(-20, 0, 20, 10), 100, 100).is_err());
        assert!(matches!(
            clamp_rect(Rect::new(5, 5, 0, 10), 100, 100),
            Err(GeometryError::Degenerate(_))
        ));
    }

    #[test]
    fn test_clamp_always_inside_bounds() {
        for x in (-60..160).step_by(7) {
            for y in (-60..160).step_by(11) {
                for w in [1, 5, 40, 300] {
                    let r = Rect::new(x, y, w, w / 2 + 1);
                    if let Ok(c) = clamp_rect(r, 120, 90) {
                        assert!(c.is_valid());
                        assert!(c.x >= 0 && c.y >= 0);
                        assert!(c.right() <= 120 && c.bottom() <= 90);
                        assert!(r.intersects(&c));
                    } else {
                        assert!(r.intersection(&Rect::new(0, 0, 120, 90)).is_none());
                    }
                }
            }
        }
    }

    #[test]
    fn test_clamp_near_i32_max_is_flagged() {
        let err = clamp_rect(Rect::new(i32::MAX - 5, 0, 100, 10), 100, 100).unwrap_err();
        assert!(matches!(err, GeometryError::OutOfBounds { .. }));

        // Huge extent from a valid origin still clamps to the canvas
        let clamped = clamp_rect(Rect::new(10, 10, i32::MAX, i32::MAX), 100, 100).unwrap();
        assert_eq!(clamped, Rect::new(10, 10, 90, 90));
    }

    #[test]
    fn test_offset_boxes() {
        let boxes = vec![TextBox::new(Rect::new(1, 2, 3, 4), "a", 0.5)];
        let moved = offset_boxes(boxes, 10, 20);
        assert_eq!(moved[0].rect, Rect::new(11, 22, 3, 4));
        assert_eq!(moved[0].text, "a");
    }

    #[test]
    fn test_map_boxes_keeps_text() {
        let boxes = vec![TextBox::new(Rect::new(10, 10, 10, 10), "x", 0.8)];
        let s = ScaleMapping::new(2.0, 2.0).unwrap();
        let mapped = map_boxes(&boxes, s);
        assert_eq!(mapped[0].rect, Rect::new(20, 20, 20, 20));
        assert_eq!(mapped[0].confidence, 0.8);
    }
}
