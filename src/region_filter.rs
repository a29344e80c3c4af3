//! Merging of ROI-scoped re-detections into an existing box list
//!
//! A re-detection over an ROI only owns the boxes that overlap the ROI. Boxes
//! elsewhere on the page may have been edited by the user and are kept as-is.

use crate::geometry::{Rect, TextBox};

/// Merge a detection pass into the boxes already known for an image
///
/// - `roi == None`: full-frame pass, the detections replace the list.
/// - ROI with detections: boxes intersecting the ROI are replaced by `detections`;
///   the rest are kept, in order, ahead of the new boxes.
/// - ROI with no detections: `existing` is returned unchanged. An empty pass is
///   treated as a failed detection, not as proof the region is empty.
pub fn merge_roi_detections(
    existing: Vec<TextBox>,
    roi: Option<Rect>,
    detections: Vec<TextBox>,
) -> Vec<TextBox> {
    let Some(roi) = roi else {
        return detections;
    };

    if detections.is_empty() {
        return existing;
    }

    let mut merged: Vec<TextBox> = existing
        .into_iter()
        .filter(|b| !b.rect.intersects(&roi))
        .collect();
    merged.extend(detections);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tb(x: i32, y: i32, w: i32, h: i32, text: &str) -> TextBox {
        TextBox::new(Rect::new(x, y, w, h), text, 0.9)
    }

    #[test]
    fn test_empty_detection_keeps_existing() {
        let existing = vec![tb(10, 10, 20, 20, "inside"), tb(500, 500, 10, 10, "outside")];
        let merged = merge_roi_detections(existing.clone(), Some(Rect::new(0, 0, 100, 100)), vec![]);
        assert_eq!(merged, existing);
    }

    #[test]
    fn test_replaces_only_intersecting() {
        let existing = vec![
            tb(10, 10, 20, 20, "inside"),
            tb(500, 500, 10, 10, "outside"),
            tb(90, 90, 20, 20, "straddling"),
        ];
        let detections = vec![tb(15, 15, 30, 10, "new")];
        let merged =
            merge_roi_detections(existing, Some(Rect::new(0, 0, 100, 100)), detections.clone());

        let texts: Vec<&str> = merged.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, vec!["outside", "new"]);
    }

    #[test]
    fn test_touching_edge_is_kept() {
        let existing = vec![tb(100, 0, 10, 10, "touching")];
        let merged = merge_roi_detections(
            existing,
            Some(Rect::new(0, 0, 100, 100)),
            vec![tb(1, 1, 5, 5, "new")],
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].text, "touching");
    }

    #[test]
    fn test_full_frame_replaces() {
        let merged = merge_roi_detections(vec![tb(1, 1, 1, 1, "old")], None, vec![]);
        assert!(merged.is_empty());

        let merged = merge_roi_detections(vec![tb(1, 1, 1, 1, "old")], None, vec![tb(2, 2, 2, 2, "new")]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].text, "new");
    }

    #[test]
    fn test_merge_matches_set_definition() {
        let roi = Rect::new(50, 50, 100, 100);
        let existing: Vec<TextBox> = (0..20)
            .map(|i| tb(i * 12, i * 9, 15, 15, &format!("e{}", i)))
            .collect();
        let detections = vec![tb(60, 60, 10, 10, "d0"), tb(70, 120, 10, 10, "d1")];

        let merged = merge_roi_detections(existing.clone(), Some(roi), detections.clone());

        let expected: Vec<TextBox> = existing
            .into_iter()
            .filter(|e| !e.rect.intersects(&roi))
            .chain(detections)
            .collect();
        assert_eq!(merged, expected);
    }
}
