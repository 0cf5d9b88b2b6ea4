// THEORY:
// The `geometry` module holds the plain value types every other layer speaks:
// image-space points, line segments, and the four-cornered `Quadrilateral`
// that stands in for the physical board. Everything here is `Copy` and
// immutable once built, which is what lets the scheduler hand whole values
// between activities without any partial updates.
//
// Coordinates are image pixels with the origin at the top-left of the frame,
// x growing to the right and y growing downwards.

use serde::{Deserialize, Serialize};

/// Two corners closer than this (squared distance, px²) are the same corner.
const COINCIDENT_EPSILON_SQ: f64 = 1e-12;
/// Quads enclosing less than this many px² are treated as zero-area.
const DEGENERATE_AREA_EPSILON: f64 = 1e-9;

/// A point in image space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn distance_sq(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Linear blend from `a` (t = 0) to `b` (t = 1).
    ///
    /// Evaluated as `a·(1−t) + b·t` so both end points are reproduced
    /// bit-for-bit at the ends of the range.
    #[inline]
    pub fn lerp(a: Point, b: Point, t: f64) -> Point {
        let s = 1.0 - t;
        Point {
            x: a.x * s + b.x * t,
            y: a.y * s + b.y * t,
        }
    }
}

/// A straight line segment between two image points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: Point,
    pub end: Point,
}

impl Segment {
    pub const fn new(start: Point, end: Point) -> Self {
        Self { start, end }
    }
}

/// Absolute enclosed area of a simple polygon (shoelace formula).
pub fn polygon_area(vertices: &[Point]) -> f64 {
    if vertices.len() < 3 {
        return 0.0;
    }
    let mut twice_area = 0.0;
    for (i, p) in vertices.iter().enumerate() {
        let q = &vertices[(i + 1) % vertices.len()];
        twice_area += p.x * q.y - q.x * p.y;
    }
    (twice_area * 0.5).abs()
}

/// Four board corners in canonical `[TL, TR, BR, BL]` order.
///
/// Build one from detected points with
/// [`order_corners`](crate::core_modules::corner_orderer::order_corners), or
/// with [`Quadrilateral::axis_aligned`] for the frame-spanning fallback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quadrilateral {
    corners: [Point; 4],
}

impl Quadrilateral {
    /// Wraps corners that are already in `[TL, TR, BR, BL]` order.
    pub const fn from_ordered_corners(corners: [Point; 4]) -> Self {
        Self { corners }
    }

    /// The rectangle spanning `(0, 0)..(width, height)`.
    pub fn axis_aligned(width: f64, height: f64) -> Self {
        Self {
            corners: [
                Point::new(0.0, 0.0),
                Point::new(width, 0.0),
                Point::new(width, height),
                Point::new(0.0, height),
            ],
        }
    }

    pub fn corners(&self) -> [Point; 4] {
        self.corners
    }

    pub fn top_left(&self) -> Point {
        self.corners[0]
    }

    pub fn top_right(&self) -> Point {
        self.corners[1]
    }

    pub fn bottom_right(&self) -> Point {
        self.corners[2]
    }

    pub fn bottom_left(&self) -> Point {
        self.corners[3]
    }

    pub fn area(&self) -> f64 {
        polygon_area(&self.corners)
    }

    /// True when two corners coincide, a coordinate is not finite, or the
    /// quad encloses no area.
    pub fn is_degenerate(&self) -> bool {
        if self.corners.iter().any(|p| !p.is_finite()) {
            return true;
        }
        for i in 0..4 {
            for j in (i + 1)..4 {
                if self.corners[i].distance_sq(&self.corners[j]) <= COINCIDENT_EPSILON_SQ {
                    return true;
                }
            }
        }
        self.area() <= DEGENERATE_AREA_EPSILON
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lerp_reproduces_end_points_exactly() {
        let a = Point::new(0.1, 13.7);
        let b = Point::new(0.7, -2.3);
        assert_eq!(Point::lerp(a, b, 0.0), a);
        assert_eq!(Point::lerp(a, b, 1.0), b);
    }

    #[test]
    fn shoelace_area_ignores_winding() {
        let cw = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 5.0),
            Point::new(0.0, 5.0),
        ];
        let mut ccw = cw;
        ccw.reverse();
        assert_eq!(polygon_area(&cw), 50.0);
        assert_eq!(polygon_area(&ccw), 50.0);
    }

    #[test]
    fn collapsed_quads_are_degenerate() {
        let repeated = Quadrilateral::from_ordered_corners([
            Point::new(0.0, 0.0),
            Point::new(0.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ]);
        assert!(repeated.is_degenerate());

        let collinear = Quadrilateral::from_ordered_corners([
            Point::new(0.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(2.0, 2.0),
            Point::new(3.0, 3.0),
        ]);
        assert!(collinear.is_degenerate());

        assert!(!Quadrilateral::axis_aligned(800.0, 600.0).is_degenerate());
    }
}
