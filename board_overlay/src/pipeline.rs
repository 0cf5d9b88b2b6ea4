// THEORY:
// The `pipeline` module is the detection side of the engine in one call. It
// strings the leaf stages together in their fixed order and owns the only
// tunables they need:
//
//     Frame → edge map → external contours → polygons → quad selection
//           → corner ordering → Option<Quadrilateral>
//
// The return type is the whole error contract. A frame with the wrong buffer
// size, an empty edge map, no four-sided contour, a degenerate quad: all of
// them come back as `None`, a detection miss, which the scheduler answers by
// keeping the previous board. Only the frame source can fail a session, and it
// never gets called from here.

use crate::core_modules::contour::{Polygon, extract_polygons};
use crate::core_modules::frame::Frame;
use crate::core_modules::geometry::Quadrilateral;
use crate::core_modules::preprocess::edge_map;
use crate::core_modules::quad_selector::{MinArea, SelectionPolicy, select_quadrilateral};
use log::debug;
use serde::{Deserialize, Serialize};

/// Configuration for the `DetectionPipeline`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Odd Gaussian aperture in pixels.
    pub blur_aperture: u32,
    /// Canny hysteresis thresholds.
    pub canny_low: f32,
    pub canny_high: f32,
    /// Polygon simplification tolerance as a fraction of contour perimeter.
    pub simplify_ratio: f64,
    pub min_area: MinArea,
    pub selection: SelectionPolicy,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            blur_aperture: 5,
            canny_low: 50.0,
            canny_high: 150.0,
            simplify_ratio: 0.02,
            min_area: MinArea::default(),
            selection: SelectionPolicy::FirstMatch,
        }
    }
}

/// Stateless board detector: one frame in, at most one board out.
#[derive(Debug, Clone)]
pub struct DetectionPipeline {
    config: DetectorConfig,
}

impl DetectionPipeline {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Runs every stage and returns the board, or `None` on a miss.
    pub fn detect(&self, frame: &Frame) -> Option<Quadrilateral> {
        let polygons = self.candidates(frame)?;

        // Stage 4: selection and corner ordering
        let min_area = self.config.min_area.resolve(frame.width, frame.height);
        let board = select_quadrilateral(&polygons, min_area, self.config.selection);
        match &board {
            Some(quad) => debug!("frame {}: board at {:?}", frame.frame_id, quad.corners()),
            None => debug!(
                "frame {}: no quad above {:.0} px² among {} polygons",
                frame.frame_id,
                min_area,
                polygons.len()
            ),
        }
        board
    }

    /// Stages 1–3: the simplified external contours of `frame`.
    pub fn candidates(&self, frame: &Frame) -> Option<Vec<Polygon>> {
        // Stage 1: intensity, smoothing, edges
        let edges = edge_map(
            frame,
            self.config.blur_aperture,
            self.config.canny_low,
            self.config.canny_high,
        )?;

        // Stages 2–3: contour tracing and simplification
        Some(extract_polygons(&edges, self.config.simplify_ratio))
    }
}

impl Default for DetectionPipeline {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}
