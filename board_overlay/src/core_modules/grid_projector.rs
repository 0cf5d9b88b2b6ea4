// THEORY:
// The grid projector turns one quadrilateral and a `GridSpec` into everything
// the overlay needs to draw: the interior divider segments and, for every cell,
// its top-left and bottom-right image points.
//
// Key architectural principles:
// 1.  **One primitive**: every point is `interpolate(row_frac, col_frac)` over
//     the four ordered corners. Blend along the top and bottom edges by the
//     column fraction, then between those two points by the row fraction.
//     At the unit square's corners this returns TL, TR, BL and BR exactly.
// 2.  **Affine per edge, not projective**: bilinear blending spaces the grid
//     evenly along each edge, so under strong perspective the far rows come
//     out slightly too tall. For a board viewed near-frontally the error is a
//     pixel or two and the cost is a handful of multiplies with no matrix
//     solve. `Projection::Homography` is the exact alternative; it solves an
//     8×8 system once per render and maps every grid point through it.
//     A board leaning by more than one cell width can leave a thin cell with
//     its bottom-right corner left of its top-left one; that is drawn as is.
// 3.  **Derived, never stored**: geometry is recomputed on demand from the
//     board snapshot, so there is no cached grid that can fall out of step
//     with the board.
// 4.  **Fallback**: with no detected board the same code runs over the
//     frame-spanning rectangle, which produces a plain even grid.

use crate::core_modules::geometry::{Point, Quadrilateral, Segment};
use crate::core_modules::homography::Homography;
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("a grid needs at least one row and one column, got {rows}x{cols}")]
pub struct GridSpecError {
    pub rows: u32,
    pub cols: u32,
}

/// Grid dimensions. Both are at least one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawGridSpec", into = "RawGridSpec")]
pub struct GridSpec {
    rows: u32,
    cols: u32,
}

#[derive(Serialize, Deserialize)]
struct RawGridSpec {
    rows: u32,
    cols: u32,
}

impl TryFrom<RawGridSpec> for GridSpec {
    type Error = GridSpecError;

    fn try_from(raw: RawGridSpec) -> Result<Self, Self::Error> {
        GridSpec::new(raw.rows, raw.cols)
    }
}

impl From<GridSpec> for RawGridSpec {
    fn from(spec: GridSpec) -> Self {
        RawGridSpec {
            rows: spec.rows,
            cols: spec.cols,
        }
    }
}

impl GridSpec {
    pub fn new(rows: u32, cols: u32) -> Result<Self, GridSpecError> {
        if rows == 0 || cols == 0 {
            return Err(GridSpecError { rows, cols });
        }
        Ok(Self { rows, cols })
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn cell_count(&self) -> usize {
        self.rows as usize * self.cols as usize
    }
}

impl Default for GridSpec {
    fn default() -> Self {
        Self { rows: 4, cols: 4 }
    }
}

/// How grid points are placed inside the quad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Projection {
    #[default]
    Bilinear,
    Homography,
}

/// Image-space corners of one cell. `index` is row-major.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CellGeometry {
    pub top_left: Point,
    pub bottom_right: Point,
    pub index: usize,
}

impl CellGeometry {
    pub fn is_finite(&self) -> bool {
        self.top_left.is_finite() && self.bottom_right.is_finite()
    }
}

/// Everything the overlay draws for one board snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridLayout {
    /// The quad the grid was laid over.
    pub outline: Quadrilateral,
    /// True when `outline` is a detected board, false for the fallback.
    pub detected: bool,
    pub dividers: Vec<Segment>,
    pub cells: Vec<CellGeometry>,
}

/// Bilinear point at `(row_frac, col_frac)` inside an ordered quad.
#[inline]
pub fn interpolate(quad: &Quadrilateral, row_frac: f64, col_frac: f64) -> Point {
    let top = Point::lerp(quad.top_left(), quad.top_right(), col_frac);
    let bottom = Point::lerp(quad.bottom_left(), quad.bottom_right(), col_frac);
    Point::lerp(top, bottom, row_frac)
}

enum Mapper {
    Bilinear(Quadrilateral),
    Projective(Homography),
}

impl Mapper {
    fn map(&self, row_frac: f64, col_frac: f64) -> Point {
        match self {
            Mapper::Bilinear(quad) => interpolate(quad, row_frac, col_frac),
            Mapper::Projective(h) => h
                .apply(Point::new(col_frac, row_frac))
                .unwrap_or(Point::new(f64::NAN, f64::NAN)),
        }
    }
}

/// Lays a fixed grid over whatever quad it is given.
#[derive(Debug, Clone, Copy)]
pub struct GridProjector {
    spec: GridSpec,
    projection: Projection,
}

impl GridProjector {
    pub fn new(spec: GridSpec, projection: Projection) -> Self {
        Self { spec, projection }
    }

    pub fn spec(&self) -> GridSpec {
        self.spec
    }

    fn mapper(&self, quad: &Quadrilateral) -> Mapper {
        match self.projection {
            Projection::Bilinear => Mapper::Bilinear(*quad),
            Projection::Homography => match Homography::unit_square_to(quad) {
                Some(h) => Mapper::Projective(h),
                None => {
                    debug!("no homography for {:?}, using bilinear", quad.corners());
                    Mapper::Bilinear(*quad)
                }
            },
        }
    }

    /// The `(rows − 1) + (cols − 1)` interior dividers: rows first, then columns.
    pub fn dividers(&self, quad: &Quadrilateral) -> Vec<Segment> {
        self.dividers_with(&self.mapper(quad))
    }

    fn dividers_with(&self, mapper: &Mapper) -> Vec<Segment> {
        let rows = self.spec.rows;
        let cols = self.spec.cols;
        let mut segments = Vec::with_capacity((rows + cols).saturating_sub(2) as usize);
        for i in 1..rows {
            let alpha = i as f64 / rows as f64;
            segments.push(Segment::new(mapper.map(alpha, 0.0), mapper.map(alpha, 1.0)));
        }
        for j in 1..cols {
            let beta = j as f64 / cols as f64;
            segments.push(Segment::new(mapper.map(0.0, beta), mapper.map(1.0, beta)));
        }
        segments
    }

    /// One `CellGeometry` per cell, in row-major index order.
    pub fn cells(&self, quad: &Quadrilateral) -> Vec<CellGeometry> {
        self.cells_with(&self.mapper(quad))
    }

    fn cells_with(&self, mapper: &Mapper) -> Vec<CellGeometry> {
        let rows = self.spec.rows as usize;
        let cols = self.spec.cols as usize;
        let mut cells = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                cells.push(CellGeometry {
                    top_left: mapper.map(row as f64 / rows as f64, col as f64 / cols as f64),
                    bottom_right: mapper
                        .map((row + 1) as f64 / rows as f64, (col + 1) as f64 / cols as f64),
                    index: row * cols + col,
                });
            }
        }
        cells
    }

    /// Full layout over `board`, or over the `frame_width × frame_height`
    /// rectangle when there is no board.
    pub fn project(
        &self,
        board: Option<&Quadrilateral>,
        frame_width: u32,
        frame_height: u32,
    ) -> GridLayout {
        let (outline, detected) = match board {
            Some(quad) => (*quad, true),
            None => (
                Quadrilateral::axis_aligned(frame_width as f64, frame_height as f64),
                false,
            ),
        };
        let mapper = self.mapper(&outline);
        GridLayout {
            outline,
            detected,
            dividers: self.dividers_with(&mapper),
            cells: self.cells_with(&mapper),
        }
    }
}
