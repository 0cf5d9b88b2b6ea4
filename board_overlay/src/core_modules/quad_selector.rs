// THEORY:
// The quadrilateral selector is the boundary of the detection pipeline: it
// takes the candidate polygons of one pass and returns at most one board.
// Nothing past this point ever sees an error from the pipeline; a pass that
// finds nothing usable just yields `None`.
//
// A candidate qualifies when it has exactly four vertices and encloses more
// than the minimum area. Among qualifying candidates the selection policy
// decides:
// - `FirstMatch` takes the first one in extraction order. This is the
//   reference behaviour and is cheap, but if several large quads are visible
//   (a picture frame behind the board, say) it picks whichever the tracer
//   reached first.
// - `LargestArea` takes the biggest, which is usually the board.
//
// A qualifying polygon whose ordered corners turn out degenerate (coincident
// points, zero area) is skipped as if it had never qualified.

use crate::core_modules::contour::Polygon;
use crate::core_modules::corner_orderer::order_corners;
use crate::core_modules::geometry::{Point, Quadrilateral};
use log::debug;
use serde::{Deserialize, Serialize};

/// Reference minimum board area (px²) on a 640×480 frame.
pub const REFERENCE_MIN_AREA_PX: f64 = 10_000.0;
const REFERENCE_FRAME_PIXELS: f64 = 640.0 * 480.0;

/// How candidates that pass the filter are chosen between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    #[default]
    FirstMatch,
    LargestArea,
}

/// Minimum enclosed area a board must exceed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MinArea {
    /// A fixed number of px², regardless of resolution.
    Absolute { px: f64 },
    /// A fraction of the frame's pixel count.
    FrameFraction { fraction: f64 },
}

impl Default for MinArea {
    fn default() -> Self {
        MinArea::FrameFraction {
            fraction: REFERENCE_MIN_AREA_PX / REFERENCE_FRAME_PIXELS,
        }
    }
}

impl MinArea {
    /// The threshold in px² for a frame of the given size.
    pub fn resolve(&self, width: u32, height: u32) -> f64 {
        match *self {
            MinArea::Absolute { px } => px,
            MinArea::FrameFraction { fraction } => fraction * width as f64 * height as f64,
        }
    }
}

/// Picks the board out of one pass's polygons.
pub fn select_quadrilateral(
    polygons: &[Polygon],
    min_area_px: f64,
    policy: SelectionPolicy,
) -> Option<Quadrilateral> {
    let mut qualifying = polygons
        .iter()
        .filter(|p| p.vertex_count() == 4 && p.area() > min_area_px)
        .filter_map(|p| {
            let quad = order_corners(as_four(p.vertices())?);
            if quad.is_degenerate() {
                debug!("skipping degenerate quad {:?}", quad.corners());
                None
            } else {
                Some((p.area(), quad))
            }
        });

    match policy {
        SelectionPolicy::FirstMatch => qualifying.next().map(|(_, quad)| quad),
        SelectionPolicy::LargestArea => qualifying
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, quad)| quad),
    }
}

fn as_four(vertices: &[Point]) -> Option<[Point; 4]> {
    vertices.try_into().ok()
}
