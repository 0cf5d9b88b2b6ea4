// THEORY:
// Building blocks of the overlay engine, declared leaves first: geometry and
// frames, the detection stages, the grid projector, then the shared state the
// scheduler hands between its activities.

pub mod geometry;
pub mod frame;
pub mod preprocess;
pub mod contour;
pub mod corner_orderer;
pub mod quad_selector;
pub mod homography;
pub mod grid_projector;
pub mod value_store;
pub mod board_state;
pub mod overlay;
