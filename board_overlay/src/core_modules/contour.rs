// THEORY:
// The contour stage turns an edge map into a list of candidate polygons.
//
// 1.  **Tracing**: border following over the binary edge map. Only external
//     boundaries are kept (contours with no parent); holes and anything nested
//     inside another outline are irrelevant to finding the board.
// 2.  **Simplification**: each closed contour is reduced with a
//     Douglas-Peucker pass whose tolerance is a fixed fraction (2%) of that
//     contour's own perimeter. Long, noisy outlines are therefore flattened
//     proportionally harder than short ones, which is what lets a wobbly board
//     border collapse to exactly four vertices.
//
// For a closed curve the split points matter: starting from an arbitrary
// pixel leaves that pixel as a spurious vertex. We split at two mutually far
// points instead (an approximate diameter), which are always hull vertices and,
// for a board, always corners.
//
// Contours and polygons live for one detection pass and are then dropped.

use crate::core_modules::geometry::{Point, polygon_area};
use image::GrayImage;
use imageproc::contours::{BorderType, find_contours};
use imageproc::geometry::arc_length;

/// A closed boundary traced from the edge map.
#[derive(Debug, Clone)]
pub struct Contour {
    pub points: Vec<Point>,
    /// Closed perimeter length in pixels.
    pub perimeter: f64,
}

/// A simplified contour.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    vertices: Vec<Point>,
    area: f64,
}

impl Polygon {
    pub fn new(vertices: Vec<Point>) -> Self {
        let area = polygon_area(&vertices);
        Self { vertices, area }
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Enclosed area in px².
    pub fn area(&self) -> f64 {
        self.area
    }
}

/// Traces the external boundaries of an edge map, in discovery order.
pub fn extract_contours(edges: &GrayImage) -> Vec<Contour> {
    find_contours::<i32>(edges)
        .into_iter()
        .filter(|c| c.parent.is_none() && c.border_type == BorderType::Outer)
        .filter(|c| c.points.len() >= 3)
        .map(|c| Contour {
            perimeter: arc_length(&c.points, true),
            points: c
                .points
                .iter()
                .map(|p| Point::new(p.x as f64, p.y as f64))
                .collect(),
        })
        .collect()
}

/// Simplifies a closed curve with Douglas-Peucker at the given tolerance.
pub fn simplify_closed(points: &[Point], epsilon: f64) -> Vec<Point> {
    let n = points.len();
    if n < 3 {
        return dedup_cyclic(points.to_vec());
    }

    let a = farthest_from(points, 0);
    let b = farthest_from(points, a);
    if points[a].distance_sq(&points[b]) == 0.0 {
        return vec![points[a]];
    }

    let mut out = Vec::new();
    for (from, to) in [(a, b), (b, a)] {
        let chain = cyclic_chain(points, from, to);
        let keep = douglas_peucker(&chain, epsilon);
        // The chain's last point starts the next chain.
        out.extend(
            chain[..chain.len() - 1]
                .iter()
                .zip(&keep)
                .filter(|(_, kept)| **kept)
                .map(|(p, _)| *p),
        );
    }
    dedup_cyclic(out)
}

/// Simplifies every contour with tolerance `ratio × perimeter`.
pub fn extract_polygons(edges: &GrayImage, ratio: f64) -> Vec<Polygon> {
    extract_contours(edges)
        .iter()
        .filter(|c| c.perimeter > 0.0)
        .map(|c| Polygon::new(simplify_closed(&c.points, ratio * c.perimeter)))
        .collect()
}

fn farthest_from(points: &[Point], origin: usize) -> usize {
    let o = points[origin];
    let mut best = origin;
    let mut best_d = 0.0;
    for (i, p) in points.iter().enumerate() {
        let d = o.distance_sq(p);
        if d > best_d {
            best_d = d;
            best = i;
        }
    }
    best
}

/// Points from `from` to `to` inclusive, walking forward with wrap-around.
fn cyclic_chain(points: &[Point], from: usize, to: usize) -> Vec<Point> {
    let n = points.len();
    let len = (to + n - from) % n + 1;
    (0..len).map(|k| points[(from + k) % n]).collect()
}

/// Marks which points of an open chain survive simplification.
fn douglas_peucker(chain: &[Point], epsilon: f64) -> Vec<bool> {
    let n = chain.len();
    let mut keep = vec![false; n];
    if n == 0 {
        return keep;
    }
    keep[0] = true;
    keep[n - 1] = true;

    let mut stack = vec![(0usize, n - 1)];
    while let Some((start, end)) = stack.pop() {
        if end <= start + 1 {
            continue;
        }
        let mut max_d = 0.0;
        let mut max_i = start;
        for i in (start + 1)..end {
            let d = distance_to_line(chain[i], chain[start], chain[end]);
            if d > max_d {
                max_d = d;
                max_i = i;
            }
        }
        if max_d > epsilon {
            keep[max_i] = true;
            stack.push((start, max_i));
            stack.push((max_i, end));
        }
    }
    keep
}

fn distance_to_line(p: Point, a: Point, b: Point) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return p.distance_sq(&a).sqrt();
    }
    ((p.x - a.x) * dy - (p.y - a.y) * dx).abs() / len_sq.sqrt()
}

fn dedup_cyclic(mut points: Vec<Point>) -> Vec<Point> {
    points.dedup();
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// Rectangle outline points starting mid-way along the top edge.
    fn noisy_rectangle_outline() -> Vec<Point> {
        let mut pts = Vec::new();
        for x in 50..=200 {
            pts.push(Point::new(x as f64, 10.0 + (x % 3) as f64 * 0.5));
        }
        for y in 11..=120 {
            pts.push(Point::new(200.0, y as f64));
        }
        for x in (10..200).rev() {
            pts.push(Point::new(x as f64, 120.0));
        }
        for y in (10..120).rev() {
            pts.push(Point::new(10.0, y as f64));
        }
        for x in 11..50 {
            pts.push(Point::new(x as f64, 10.0));
        }
        pts
    }

    #[test]
    fn closed_simplification_keeps_only_the_corners() {
        let pts = noisy_rectangle_outline();
        let perimeter: f64 = (0..pts.len())
            .map(|i| pts[i].distance_sq(&pts[(i + 1) % pts.len()]).sqrt())
            .sum();
        let poly = simplify_closed(&pts, 0.02 * perimeter);
        assert_eq!(poly.len(), 4, "{poly:?}");
        for corner in [
            Point::new(10.0, 10.0),
            Point::new(200.0, 10.0),
            Point::new(200.0, 120.0),
            Point::new(10.0, 120.0),
        ] {
            assert!(
                poly.iter().any(|p| p.distance_sq(&corner) <= 2.0),
                "missing corner {corner:?} in {poly:?}"
            );
        }
    }

    #[test]
    fn polygon_area_is_computed_on_construction() {
        let poly = Polygon::new(vec![
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(100.0, 50.0),
            Point::new(0.0, 50.0),
        ]);
        assert_eq!(poly.vertex_count(), 4);
        assert_eq!(poly.area(), 5000.0);
    }

    #[test]
    fn only_external_boundaries_are_traced() {
        // A thick square ring with a small square inside its hole.
        let mut edges = GrayImage::new(60, 60);
        for y in 5..55 {
            for x in 5..55 {
                let ring = !(10..50).contains(&x) || !(10..50).contains(&y);
                let inner = (25..35).contains(&x) && (25..35).contains(&y);
                if ring || inner {
                    edges.put_pixel(x, y, Luma([255]));
                }
            }
        }
        let contours = extract_contours(&edges);
        assert_eq!(contours.len(), 1);
        let xs: Vec<f64> = contours[0].points.iter().map(|p| p.x).collect();
        assert_eq!(xs.iter().cloned().fold(f64::INFINITY, f64::min), 5.0);
        assert_eq!(xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max), 54.0);
    }

    #[test]
    fn polygons_from_a_drawn_outline() {
        let mut edges = GrayImage::new(120, 100);
        for x in 20..=100 {
            edges.put_pixel(x, 15, Luma([255]));
            edges.put_pixel(x, 85, Luma([255]));
        }
        for y in 15..=85 {
            edges.put_pixel(20, y, Luma([255]));
            edges.put_pixel(100, y, Luma([255]));
        }
        let polygons = extract_polygons(&edges, 0.02);
        assert_eq!(polygons.len(), 1);
        assert_eq!(polygons[0].vertex_count(), 4);
        assert!((polygons[0].area() - 80.0 * 70.0).abs() < 1.0);
    }
}
