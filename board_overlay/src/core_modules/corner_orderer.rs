// THEORY:
// The corner orderer turns the four vertices of a simplified contour, which
// arrive in whatever order the contour tracer happened to visit them, into
// the canonical `[TL, TR, BR, BL]` order the grid projector relies on.
//
// The ordering is purely coordinate based: split the points into the two
// with the smallest y (the top pair) and the two with the largest y (the
// bottom pair), then order each pair by x. It never looks at polygon winding.
//
// Known limitation: this is only right for convex boards seen roughly
// upright. Once the board is rotated past about 45° the "top pair" is no
// longer the top edge and the corners are mislabelled, which shows up as a
// grid that is rotated by a quarter turn or twisted. Handheld, near-frontal
// viewing keeps us well inside that envelope.

use crate::core_modules::geometry::{Point, Quadrilateral};

/// Orders four unordered points into `[TL, TR, BR, BL]`.
///
/// Ties are resolved by the stable sort, so two points with equal y keep
/// their input order before the x sort splits them.
pub fn order_corners(points: [Point; 4]) -> Quadrilateral {
    let mut by_y = points;
    by_y.sort_by(|a, b| a.y.total_cmp(&b.y));

    let mut top = [by_y[0], by_y[1]];
    let mut bottom = [by_y[2], by_y[3]];
    top.sort_by(|a, b| a.x.total_cmp(&b.x));
    bottom.sort_by(|a, b| a.x.total_cmp(&b.x));

    Quadrilateral::from_ordered_corners([top[0], top[1], bottom[1], bottom[0]])
}
