//! Pixel-space geometry: candidate regions and their bounding boxes.

use std::fmt;

/// Integer pixel coordinate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// One candidate region as produced by a pipeline (outline or full point set).
pub type Contour = Vec<Point>;

/// Axis-aligned rectangle in frame-pixel coordinates.
///
/// `width` and `height` are never negative.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width: width.max(0),
            height: height.max(0),
        }
    }

    /// Top-left corner.
    pub fn tl(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Bottom-right corner (exclusive), saturating at the `i32` range.
    pub fn br(&self) -> Point {
        Point::new(
            self.x.saturating_add(self.width),
            self.y.saturating_add(self.height),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Canonical text form used for telemetry: `{x, y, WIDTHxHEIGHT}`.
impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{}, {}, {}x{}}}",
            self.x, self.y, self.width, self.height
        )
    }
}

/// Minimal axis-aligned rectangle enclosing every point.
///
/// Pixel inclusive: a single point yields a 1x1 box. An empty point set
/// yields the zero box at the origin.
pub fn bounding_rect(points: &[Point]) -> BoundingBox {
    let Some(first) = points.first() else {
        return BoundingBox::default();
    };
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in &points[1..] {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    BoundingBox::new(
        min_x,
        min_y,
        inclusive_extent(min_x, max_x),
        inclusive_extent(min_y, max_y),
    )
}

/// `max - min + 1`, computed wide and capped at `i32::MAX`.
fn inclusive_extent(min: i32, max: i32) -> i32 {
    let extent = max as i64 - min as i64 + 1;
    extent.min(i32::MAX as i64) as i32
}
