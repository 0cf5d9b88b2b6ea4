// THEORY:
// The overlay is the render activity's product for one tick: the grid layout
// plus the text labels to draw in every cell. Drawing itself belongs to an
// `OverlaySink` at the edge of the system (a canvas, a video writer, a
// network bus); the engine only decides *where* each label goes.
//
// Each cell carries two labels:
// - its fixed index, anchored just inside the cell's top-left corner;
// - its current tracked value, anchored just inside the bottom-right corner,
//   right- and bottom-aligned using the sink's own text measurements.
//
// A cell whose geometry is not finite, or that has no value in the current
// mapping, loses its decoration for this tick. Nothing here aborts a frame.

use crate::core_modules::geometry::Point;
use crate::core_modules::grid_projector::GridLayout;
use crate::core_modules::value_store::ValueMapping;
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Label typography and placement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelStyle {
    pub font_px: f64,
    /// Gap between a label and the cell corner it hangs off.
    pub inset: f64,
    /// Number shown on the first cell's index label.
    pub index_base: usize,
}

impl Default for LabelStyle {
    fn default() -> Self {
        Self {
            font_px: 16.0,
            inset: 5.0,
            index_base: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TextExtent {
    pub width: f64,
    pub height: f64,
}

/// Reports how large a string renders.
pub trait TextMeasure {
    fn measure(&self, text: &str, font_px: f64) -> TextExtent;
}

/// Fixed-advance estimate for sinks without real font metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproxTextMeasure;

impl TextMeasure for ApproxTextMeasure {
    fn measure(&self, text: &str, font_px: f64) -> TextExtent {
        TextExtent {
            width: text.chars().count() as f64 * font_px * 0.6,
            height: font_px,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelKind {
    Index,
    Value,
}

/// One piece of text and the top-left corner of its box.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelPlacement {
    pub cell: usize,
    pub kind: LabelKind,
    pub text: String,
    pub position: Point,
    pub extent: TextExtent,
    pub highlighted: bool,
}

/// Everything drawn for one render tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overlay {
    pub tick: u64,
    pub frame_width: u32,
    pub frame_height: u32,
    pub layout: GridLayout,
    pub labels: Vec<LabelPlacement>,
    /// Slot holding the highlighted identity, when it is on the board.
    pub highlighted_cell: Option<usize>,
}

/// Places the index and value labels for every cell of `layout`.
pub fn place_labels<M: TextMeasure + ?Sized>(
    layout: &GridLayout,
    values: &ValueMapping,
    style: &LabelStyle,
    measure: &M,
) -> Vec<LabelPlacement> {
    let highlighted_slot = values.highlighted_slot();
    let mut labels = Vec::with_capacity(layout.cells.len() * 2);

    for cell in &layout.cells {
        if !cell.is_finite() {
            debug!("cell {} has non-finite geometry, skipping its labels", cell.index);
            continue;
        }
        let highlighted = highlighted_slot == Some(cell.index);

        let text = format!("#{}", cell.index + style.index_base);
        labels.push(LabelPlacement {
            cell: cell.index,
            kind: LabelKind::Index,
            extent: measure.measure(&text, style.font_px),
            position: Point::new(cell.top_left.x + style.inset, cell.top_left.y + style.inset),
            text,
            highlighted,
        });

        let Some(value) = values.value_at(cell.index) else {
            continue;
        };
        let text = value.to_string();
        let extent = measure.measure(&text, style.font_px);
        labels.push(LabelPlacement {
            cell: cell.index,
            kind: LabelKind::Value,
            position: Point::new(
                cell.bottom_right.x - extent.width - style.inset,
                cell.bottom_right.y - extent.height - style.inset,
            ),
            extent,
            text,
            highlighted,
        });
    }
    labels
}

/// Receives one `Overlay` per render tick.
pub trait OverlaySink: TextMeasure + Send {
    fn present(&mut self, overlay: Overlay);
}

/// Fans rendered overlays out to any number of subscribers.
#[derive(Clone)]
pub struct OverlayBus {
    tx: broadcast::Sender<Arc<Overlay>>,
}

impl OverlayBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Overlay>> {
        self.tx.subscribe()
    }
}

impl TextMeasure for OverlayBus {
    fn measure(&self, text: &str, font_px: f64) -> TextExtent {
        ApproxTextMeasure.measure(text, font_px)
    }
}

impl OverlaySink for OverlayBus {
    fn present(&mut self, overlay: Overlay) {
        // No subscribers is fine; the overlay is simply dropped.
        let _ = self.tx.send(Arc::new(overlay));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::geometry::Quadrilateral;
    use crate::core_modules::grid_projector::{CellGeometry, GridProjector, GridSpec, Projection};

    struct FixedMeasure;

    impl TextMeasure for FixedMeasure {
        fn measure(&self, text: &str, _font_px: f64) -> TextExtent {
            TextExtent {
                width: 10.0 * text.len() as f64,
                height: 12.0,
            }
        }
    }

    fn layout() -> GridLayout {
        GridProjector::new(GridSpec::new(2, 2).unwrap(), Projection::Bilinear).project(None, 400, 300)
    }

    #[test]
    fn index_and_value_labels_hang_off_opposite_corners() {
        let values = ValueMapping::new(vec![4, 13, 2, 1]);
        let labels = place_labels(&layout(), &values, &LabelStyle::default(), &FixedMeasure);
        assert_eq!(labels.len(), 8);

        let index = &labels[2];
        assert_eq!((index.cell, index.kind, index.text.as_str()), (1, LabelKind::Index, "#2"));
        assert_eq!(index.position, Point::new(205.0, 5.0));

        let value = &labels[3];
        assert_eq!((value.cell, value.kind, value.text.as_str()), (1, LabelKind::Value, "13"));
        // Bottom-right of cell 1 is (400, 150); "13" is 20×12.
        assert_eq!(value.position, Point::new(400.0 - 20.0 - 5.0, 150.0 - 12.0 - 5.0));
    }

    #[test]
    fn cells_without_values_or_with_bad_geometry_lose_decoration_only() {
        let mut layout = layout();
        layout.cells[0] = CellGeometry {
            top_left: Point::new(f64::NAN, 0.0),
            ..layout.cells[0]
        };
        let values = ValueMapping::new(vec![1, 2, 3]);
        let labels = place_labels(&layout, &values, &LabelStyle::default(), &FixedMeasure);
        // Cell 0 skipped entirely, cell 3 keeps only its index.
        assert!(labels.iter().all(|l| l.cell != 0));
        let cell3: Vec<_> = labels.iter().filter(|l| l.cell == 3).collect();
        assert_eq!(cell3.len(), 1);
        assert_eq!(cell3[0].kind, LabelKind::Index);
    }

    #[test]
    fn bus_delivers_to_subscribers() {
        let mut bus = OverlayBus::new(4);
        let mut rx = bus.subscribe();
        let layout = layout();
        bus.present(Overlay {
            tick: 7,
            frame_width: 400,
            frame_height: 300,
            layout: layout.clone(),
            labels: Vec::new(),
            highlighted_cell: None,
        });
        let got = rx.try_recv().expect("overlay delivered");
        assert_eq!(got.tick, 7);
        assert_eq!(got.layout.outline, Quadrilateral::axis_aligned(400.0, 300.0));
    }
}
