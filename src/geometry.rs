// src/geometry.rs
//
// Region-crossing test between a detection and the monitored polyline.
//
// The test uses the box DIAGONAL (top-left → bottom-right), not the box
// outline. A box whose outline touches the region but whose diagonal does not
// is not a crossing. Keep it that way: downstream counts depend on it.
//
// Coordinates are truncated to whole pixels before testing, so every
// orientation test is exact integer arithmetic.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Largest coordinate a detection may carry. Half of `i32::MAX`, so corner
/// sums and differences stay inside `i32`.
pub const MAX_PIXEL_COORD: f32 = (i32::MAX / 2) as f32;

/// Axis-aligned detection box in frame pixels, `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn is_finite(&self) -> bool {
        self.x1.is_finite() && self.y1.is_finite() && self.x2.is_finite() && self.y2.is_finite()
    }

    /// Every coordinate within `±MAX_PIXEL_COORD`.
    pub fn in_pixel_range(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.abs() <= MAX_PIXEL_COORD)
    }

    /// Top-left and bottom-right corners truncated to whole pixels.
    pub fn corners(&self) -> (Point, Point) {
        (
            Point::new(self.x1 as i32, self.y1 as i32),
            Point::new(self.x2 as i32, self.y2 as i32),
        )
    }

    /// Floor midpoint of the truncated corners.
    pub fn center(&self) -> Point {
        let (tl, br) = self.corners();
        let mid = |a: i32, b: i32| (a as i64 + b as i64).div_euclid(2) as i32;
        Point::new(mid(tl.x, br.x), mid(tl.y, br.y))
    }
}

impl From<[f32; 4]> for BoundingBox {
    fn from(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// Monitored polyline. Fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    points: Vec<Point>,
}

impl Region {
    pub fn new(points: Vec<Point>) -> Result<Self, ConfigError> {
        if points.len() < 2 {
            return Err(ConfigError::RegionTooShort(points.len()));
        }
        Ok(Self { points })
    }

    pub fn from_pairs(pairs: &[[i32; 2]]) -> Result<Self, ConfigError> {
        Self::new(pairs.iter().map(|p| Point::new(p[0], p[1])).collect())
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn segments(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        self.points.windows(2).map(|w| (w[0], w[1]))
    }
}

/// True iff the box diagonal intersects any segment of the region.
/// Touching and collinear overlap count as intersecting.
pub fn crosses(region: &Region, bbox: &BoundingBox) -> bool {
    let (tl, br) = bbox.corners();
    region
        .segments()
        .any(|(a, b)| segments_intersect(tl, br, a, b))
}

pub fn segments_intersect(p1: Point, p2: Point, q1: Point, q2: Point) -> bool {
    let d1 = orientation(q1, q2, p1);
    let d2 = orientation(q1, q2, p2);
    let d3 = orientation(p1, p2, q1);
    let d4 = orientation(p1, p2, q2);

    // Proper crossing: each segment's endpoints lie strictly on opposite sides
    // of the other.
    if d1 * d2 < 0 && d3 * d4 < 0 {
        return true;
    }

    (d1 == 0 && on_segment(q1, q2, p1))
        || (d2 == 0 && on_segment(q1, q2, p2))
        || (d3 == 0 && on_segment(p1, p2, q1))
        || (d4 == 0 && on_segment(p1, p2, q2))
}

/// Sign of the cross product (b - a) x (c - a): -1, 0 or 1.
fn orientation(a: Point, b: Point, c: Point) -> i8 {
    let cross = (b.x as i64 - a.x as i64) * (c.y as i64 - a.y as i64)
        - (b.y as i64 - a.y as i64) * (c.x as i64 - a.x as i64);
    cross.signum() as i8
}

/// `c` is collinear with `a`-`b`; is it inside their bounding extent?
fn on_segment(a: Point, b: Point, c: Point) -> bool {
    c.x >= a.x.min(b.x) && c.x <= a.x.max(b.x) && c.y >= a.y.min(b.y) && c.y <= a.y.max(b.y)
}

// ============================================================================
// TESTS
// ============================================================================
