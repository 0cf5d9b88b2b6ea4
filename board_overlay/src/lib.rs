// THEORY:
// This file is the main entry point for the `board_overlay` library crate.
// A host hands a session three things: a frame source (the camera), a value
// source (whatever knows what belongs in each cell) and an overlay sink (the
// display). The session finds the board in the frames, divides it into a
// grid and keeps a labelled overlay flowing to the sink.
//
// `Session` and `SessionConfig` are the high-level interface. The
// `DetectionPipeline` is exported for hosts that only want the board corners,
// and `core_modules` stays public for hosts that want to plug in their own
// sources and sinks.

pub mod core_modules;
pub mod pipeline;
pub mod scheduler;

pub use core_modules::frame::{AcquisitionError, Frame, FrameSource, PixelFormat, StillFrameSource};
pub use core_modules::geometry::{Point, Quadrilateral, Segment};
pub use core_modules::grid_projector::{GridLayout, GridProjector, GridSpec, Projection};
pub use core_modules::overlay::{LabelStyle, Overlay, OverlayBus, OverlaySink, TextMeasure};
pub use core_modules::value_store::{CellIdentity, CellValue, ShuffleSimulator, ValueSource};
pub use pipeline::{DetectionPipeline, DetectorConfig};
pub use scheduler::{Session, SessionConfig, SessionError, SharedState};
