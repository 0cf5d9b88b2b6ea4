// THEORY:
// A homography is the exact projective map between two planes. Here the
// source plane is the unit square of grid fractions, `(col_frac, row_frac)`,
// and the target is the board as it appears in the frame. It backs
// `Projection::Homography`, the perspective-correct alternative to per-edge
// bilinear blending.
//
// With h33 fixed to 1, four correspondences give an 8×8 linear system. Both
// point sets are Hartley-normalised first (centroid to the origin, mean
// distance √2) so the system stays well conditioned when the board sits
// thousands of pixels from the image origin; the solution is then mapped
// back to pixel coordinates.

use crate::core_modules::geometry::{Point, Quadrilateral};
use nalgebra::{Matrix3, SMatrix, SVector, Vector3};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    /// Maps `p` through the homography. `None` at the line at infinity.
    #[inline]
    pub fn apply(&self, p: Point) -> Option<Point> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        let w = v[2];
        if w.abs() < 1e-12 {
            return None;
        }
        Some(Point::new(v[0] / w, v[1] / w))
    }

    /// H such that `(u, v) = (col_frac, row_frac)` on the unit square lands on
    /// the matching point of `quad` (TL at (0,0), BR at (1,1)).
    pub fn unit_square_to(quad: &Quadrilateral) -> Option<Self> {
        if quad.is_degenerate() {
            return None;
        }
        let src = [
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
        ];
        homography_from_4pt(&src, &quad.corners())
    }
}

/// Solves `dst ~ H · src` from four correspondences with h33 = 1.
pub fn homography_from_4pt(src: &[Point; 4], dst: &[Point; 4]) -> Option<Homography> {
    let (src_n, t_src) = normalize_points4(src)?;
    let (dst_n, t_dst) = normalize_points4(dst)?;

    // For each correspondence (x,y)->(u,v):
    // h11 x + h12 y + h13 - u h31 x - u h32 y = u
    // h21 x + h22 y + h23 - v h31 x - v h32 y = v
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for k in 0..4 {
        let (x, y) = (src_n[k].x, src_n[k].y);
        let (u, v) = (dst_n[k].x, dst_n[k].y);

        let r0 = 2 * k;
        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -u * x;
        a[(r0, 7)] = -u * y;
        b[r0] = u;

        let r1 = 2 * k + 1;
        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -v * x;
        a[(r1, 7)] = -v * y;
        b[r1] = v;
    }

    let x = a.lu().solve(&b)?;
    let hn = Matrix3::new(
        x[0], x[1], x[2], //
        x[3], x[4], x[5], //
        x[6], x[7], 1.0,
    );

    let h = t_dst.try_inverse()? * hn * t_src;
    let scale = h[(2, 2)];
    if scale.abs() < 1e-12 {
        return None;
    }
    let h = h / scale;
    if h.iter().any(|c| !c.is_finite()) {
        return None;
    }
    Some(Homography::new(h))
}

/// Moves the centroid to the origin and scales the mean distance to √2.
fn normalize_points4(pts: &[Point; 4]) -> Option<([Point; 4], Matrix3<f64>)> {
    let cx = pts.iter().map(|p| p.x).sum::<f64>() / 4.0;
    let cy = pts.iter().map(|p| p.y).sum::<f64>() / 4.0;
    let centroid = Point::new(cx, cy);
    let mean_dist = pts.iter().map(|p| p.distance_sq(&centroid).sqrt()).sum::<f64>() / 4.0;
    if !(mean_dist > 1e-12) {
        return None;
    }

    let s = std::f64::consts::SQRT_2 / mean_dist;
    let t = Matrix3::new(
        s, 0.0, -s * cx, //
        0.0, s, -s * cy, //
        0.0, 0.0, 1.0,
    );
    let out = pts.map(|p| Point::new(s * (p.x - cx), s * (p.y - cy)));
    Some((out, t))
}
