//! Core geometry types shared by the mapping, masking and dispatch stages

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================
// Error Types
// ============================================================

/// Geometry error types
///
/// These are always recovered locally: a degenerate box is skipped, a degenerate
/// ROI falls back to full-frame processing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("Degenerate rectangle {0:?}")]
    Degenerate(Rect),

    #[error("Rectangle {rect:?} lies outside {width}x{height}")]
    OutOfBounds { rect: Rect, width: u32, height: u32 },

    #[error("Invalid scale ({0}, {1})")]
    InvalidScale(f64, f64),
}

pub type Result<T> = std::result::Result<T, GeometryError>;

// ============================================================
// Rect
// ============================================================

/// Axis-aligned rectangle in `[x, y, w, h]` form
///
/// Components are signed so that padding and offsets can be applied before
/// clamping. Serialized as a four element array, matching the detector output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    /// Create a new rect
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build a rect from exclusive-end corners
    pub const fn from_corners(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self::new(x1, y1, x2.saturating_sub(x1), y2.saturating_sub(y1))
    }

    /// Exclusive right edge, saturating at `i32::MAX`
    pub const fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge, saturating at `i32::MAX`
    pub const fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    /// Width and height are both positive
    pub const fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Validate, returning the rect itself
    pub fn validated(self) -> Result<Self> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(GeometryError::Degenerate(self))
        }
    }

    /// Area in pixels (0 for degenerate rects)
    pub fn area(&self) -> i64 {
        if self.is_valid() {
            self.width as i64 * self.height as i64
        } else {
            0
        }
    }

    /// Open-interval intersection test
    ///
    /// Rects that only share an edge do not intersect.
    pub fn intersects(&self, other: &Rect) -> bool {
        if !self.is_valid() || !other.is_valid() {
            return false;
        }
        self.x < other.right()
            && self.right() > other.x
            && self.y < other.bottom()
            && self.bottom() > other.y
    }

    /// Grow on every side by `amount` pixels
    pub const fn padded(&self, amount: i32) -> Self {
        let grow = amount.saturating_mul(2);
        Self::new(
            self.x.saturating_sub(amount),
            self.y.saturating_sub(amount),
            self.width.saturating_add(grow),
            self.height.saturating_add(grow),
        )
    }

    /// Translate by `(dx, dy)`
    pub const fn offset(&self, dx: i32, dy: i32) -> Self {
        Self::new(
            self.x.saturating_add(dx),
            self.y.saturating_add(dy),
            self.width,
            self.height,
        )
    }

    /// Intersection of two rects, if non-empty
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());
        (x2 > x1 && y2 > y1).then(|| Rect::from_corners(x1, y1, x2, y2))
    }
}

impl From<[i32; 4]> for Rect {
    fn from(v: [i32; 4]) -> Self {
        Rect::new(v[0], v[1], v[2], v[3])
    }
}

impl From<Rect> for [i32; 4] {
    fn from(r: Rect) -> Self {
        [r.x, r.y, r.width, r.height]
    }
}

// ============================================================
// CropBox
// ============================================================

/// Exclusive-end pixel box `[x1, y1, x2, y2]` inside an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CropBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl CropBox {
    pub const fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub const fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub const fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    pub const fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Expand by `pad` on every side, clamped to `width x height`
    pub fn expanded(&self, pad: u32, width: u32, height: u32) -> Self {
        Self {
            x1: self.x1.saturating_sub(pad),
            y1: self.y1.saturating_sub(pad),
            x2: self.x2.saturating_add(pad).min(width),
            y2: self.y2.saturating_add(pad).min(height),
        }
    }
}

// ============================================================
// TextBox
// ============================================================

/// A detected text region
///
/// Fields the editor attaches to a box (font, colors, alignment) are kept in
/// `extra` so a box that passes through this crate comes back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBox {
    pub rect: Rect,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub confidence: f32,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TextBox {
    pub fn new(rect: Rect, text: impl Into<String>, confidence: f32) -> Self {
        Self {
            rect,
            text: text.into(),
            confidence,
            extra: serde_json::Map::new(),
        }
    }

    /// Same box with a different rect
    pub fn with_rect(&self, rect: Rect) -> Self {
        Self {
            rect,
            ..self.clone()
        }
    }
}

// ============================================================
// ScaleMapping
// ============================================================

/// Per-image scale pair `(orig_w / work_w, orig_h / work_h)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleMapping {
    pub scale_x: f64,
    pub scale_y: f64,
}

impl Default for ScaleMapping {
    fn default() -> Self {
        Self::identity()
    }
}

impl ScaleMapping {
    pub const fn identity() -> Self {
        Self {
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }

    /// Create a mapping, rejecting non-finite or non-positive factors
    pub fn new(scale_x: f64, scale_y: f64) -> Result<Self> {
        if scale_x.is_finite() && scale_y.is_finite() && scale_x > 0.0 && scale_y > 0.0 {
            Ok(Self { scale_x, scale_y })
        } else {
            Err(GeometryError::InvalidScale(scale_x, scale_y))
        }
    }

    /// Mapping from a working image back to its original
    pub fn from_sizes(original: (u32, u32), working: (u32, u32)) -> Result<Self> {
        if working.0 == 0 || working.1 == 0 {
            return Err(GeometryError::InvalidScale(0.0, 0.0));
        }
        Self::new(
            original.0 as f64 / working.0 as f64,
            original.1 as f64 / working.1 as f64,
        )
    }

    /// Reverse direction (original -> working)
    pub fn inverse(&self) -> Self {
        Self {
            scale_x: 1.0 / self.scale_x,
            scale_y: 1.0 / self.scale_y,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.scale_x == 1.0 && self.scale_y == 1.0
    }
}
