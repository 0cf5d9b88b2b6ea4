// THEORY:
// The scheduler runs a session: three periodic activities, each on its own
// cadence, cooperating only through one shared-state handle.
//
// - **Render** (every display refresh, ~16 ms): snapshot the board and the
//   values, lay out the grid, place labels, hand the overlay to the sink.
// - **Detect** (every 1000 ms): pull a frame and run the detection pipeline on
//   the blocking pool, then publish the new board or keep the old one.
// - **Values** (every 2000 ms): ask the value source for a fresh array and
//   swap it into the store.
//
// Key architectural principles:
// 1.  **Whole-value replacement**: `BoardState` is swapped under a write lock
//     that is held only for the assignment, and the value mapping is an `Arc`
//     swapped the same way. No activity ever edits a field another can see,
//     and no reader ever sees half an update.
// 2.  **Latency isolation**: detection is the one heavy job, so frame
//     acquisition and the image pipeline run on `spawn_blocking`. The render
//     loop never waits on it beyond the instant of the board swap.
// 3.  **Cancellation**: a `watch` flag is raced against every tick. Once it
//     is raised no activity starts another iteration, and a detection pass
//     that was already in flight has its result thrown away.
// 4.  **Failure domain**: only the frame source can end a session on its own.
//     A fatal acquisition error raises the shutdown flag for everyone and is
//     handed back from `Session::stop`.

use crate::core_modules::board_state::{BoardState, BoardUpdate, StalenessPolicy, StalenessTracker};
use crate::core_modules::frame::{AcquisitionError, FrameSource};
use crate::core_modules::geometry::Quadrilateral;
use crate::core_modules::grid_projector::{GridProjector, GridSpec, GridSpecError, Projection};
use crate::core_modules::overlay::{LabelStyle, Overlay, OverlaySink, place_labels};
use crate::core_modules::value_store::{
    HighlightPolicy, ValueMapping, ValueSource, ValueStore, init_dynamic_mapping,
};
use crate::pipeline::{DetectionPipeline, DetectorConfig};
use futures::future::join_all;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{RwLock, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, MissedTickBehavior};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
    #[error(transparent)]
    InvalidGrid(#[from] GridSpecError),
    #[error("session activity failed: {0}")]
    Worker(#[from] JoinError),
}

/// Everything tunable about a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub grid: GridSpec,
    #[serde(with = "millis")]
    pub render_interval: Duration,
    #[serde(with = "millis")]
    pub detect_interval: Duration,
    #[serde(with = "millis")]
    pub value_interval: Duration,
    pub detector: DetectorConfig,
    pub projection: Projection,
    pub staleness: StalenessPolicy,
    pub labels: LabelStyle,
    pub highlight: HighlightPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            grid: GridSpec::default(),
            render_interval: Duration::from_millis(16),
            detect_interval: Duration::from_millis(1000),
            value_interval: Duration::from_millis(2000),
            detector: DetectorConfig::default(),
            projection: Projection::Bilinear,
            staleness: StalenessPolicy::default(),
            labels: LabelStyle::default(),
            highlight: HighlightPolicy::None,
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(super::at_least_1ms(Duration::from_millis(u64::deserialize(d)?)))
    }
}

/// The state the three activities share. Each cell has exactly one writer.
#[derive(Debug)]
pub struct SharedState {
    board: RwLock<BoardState>,
    values: ValueStore,
}

impl SharedState {
    pub fn new(board: BoardState, values: ValueStore) -> Self {
        Self {
            board: RwLock::new(board),
            values,
        }
    }

    pub async fn board(&self) -> BoardState {
        *self.board.read().await
    }

    pub async fn publish_board(&self, state: BoardState) {
        *self.board.write().await = state;
    }

    pub fn values(&self) -> &ValueStore {
        &self.values
    }

    /// The board and the value mapping as of now.
    pub async fn snapshot(&self) -> (BoardState, Arc<ValueMapping>) {
        let board = self.board().await;
        let values = self.values.read().await;
        (board, values)
    }
}

type Activity = JoinHandle<Result<(), SessionError>>;

/// A running overlay session.
pub struct Session {
    shared: Arc<SharedState>,
    shutdown: Arc<watch::Sender<bool>>,
    source: Arc<dyn FrameSource>,
    activities: Vec<Activity>,
    frame_size: (u32, u32),
}

impl Session {
    /// Starts all three activities. Must be called inside a Tokio runtime.
    ///
    /// Fails only if the frame source cannot report its dimensions.
    pub fn start(
        config: SessionConfig,
        source: Arc<dyn FrameSource>,
        mut value_source: Box<dyn ValueSource>,
        sink: Box<dyn OverlaySink>,
    ) -> Result<Self, SessionError> {
        let frame_size = source.dimensions()?;
        let grid = config.grid;
        info!(
            "starting {}x{} grid session on a {}x{} stream",
            grid.rows(),
            grid.cols(),
            frame_size.0,
            frame_size.1
        );

        let mut initial = value_source.produce_values(grid.rows(), grid.cols());
        if initial.len() != grid.cell_count() {
            warn!(
                "value source gave {} values for {} cells, starting from a shuffled 1..={}",
                initial.len(),
                grid.cell_count(),
                grid.cell_count()
            );
            initial = init_dynamic_mapping(grid.cell_count(), &mut rand::thread_rng());
        }
        let highlighted = config.highlight.resolve(&initial);
        let shared = Arc::new(SharedState::new(
            BoardState::fallback(Instant::now()),
            ValueStore::new(initial, highlighted),
        ));

        let (shutdown_tx, _) = watch::channel(false);
        let shutdown = Arc::new(shutdown_tx);

        let render = RenderActivity {
            shared: shared.clone(),
            projector: GridProjector::new(grid, config.projection),
            style: config.labels,
            frame_size,
            sink,
        };
        let detect = DetectionActivity {
            shared: shared.clone(),
            pipeline: Arc::new(DetectionPipeline::new(config.detector)),
            source: source.clone(),
            tracker: StalenessTracker::new(config.staleness),
            shutdown: shutdown.clone(),
        };
        let values = ValueActivity {
            shared: shared.clone(),
            grid,
            source: value_source,
        };

        let activities = vec![
            tokio::spawn(render.run(at_least_1ms(config.render_interval), shutdown.subscribe())),
            tokio::spawn(detect.run(at_least_1ms(config.detect_interval), shutdown.subscribe())),
            tokio::spawn(values.run(at_least_1ms(config.value_interval), shutdown.subscribe())),
        ];

        Ok(Self {
            shared,
            shutdown,
            source,
            activities,
            frame_size,
        })
    }

    pub fn shared(&self) -> &Arc<SharedState> {
        &self.shared
    }

    pub fn frame_size(&self) -> (u32, u32) {
        self.frame_size
    }

    pub fn is_stopping(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves once the session has been told to stop, by `stop` or by a
    /// fatal acquisition error.
    pub async fn finished(&self) {
        let mut rx = self.shutdown.subscribe();
        let _ = rx.wait_for(|stopping| *stopping).await;
    }

    /// Halts every activity, releases the frame source and reports the first
    /// fatal error any activity hit.
    pub async fn stop(mut self) -> Result<(), SessionError> {
        info!("stopping session");
        self.shutdown.send_replace(true);
        self.source.release();

        let mut first_error = None;
        for result in join_all(std::mem::take(&mut self.activities)).await {
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(join) => Err(SessionError::Worker(join)),
            };
            if let Err(err) = outcome {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Best effort if the owner never called `stop`.
        if !self.activities.is_empty() {
            self.shutdown.send_replace(true);
            self.source.release();
        }
    }
}

/// `tokio::time::interval` panics on a zero period.
fn at_least_1ms(period: Duration) -> Duration {
    period.max(Duration::from_millis(1))
}

/// Waits for the next tick unless shutdown wins the race.
async fn next_tick(ticker: &mut time::Interval, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    tokio::select! {
        biased;
        _ = shutdown.changed() => false,
        _ = ticker.tick() => !*shutdown.borrow(),
    }
}

struct RenderActivity {
    shared: Arc<SharedState>,
    projector: GridProjector,
    style: LabelStyle,
    frame_size: (u32, u32),
    sink: Box<dyn OverlaySink>,
}

impl RenderActivity {
    async fn run(
        mut self,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), SessionError> {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut tick = 0u64;
        while next_tick(&mut ticker, &mut shutdown).await {
            let (board, values) = self.shared.snapshot().await;
            let overlay = self.compose(tick, &board, &values);
            self.sink.present(overlay);
            tick += 1;
        }
        debug!("render activity stopped after {tick} ticks");
        Ok(())
    }

    fn compose(&self, tick: u64, board: &BoardState, values: &ValueMapping) -> Overlay {
        let (width, height) = self.frame_size;
        let layout = self.projector.project(board.quad.as_ref(), width, height);
        let labels = place_labels(&layout, values, &self.style, &*self.sink);
        Overlay {
            tick,
            frame_width: width,
            frame_height: height,
            layout,
            labels,
            highlighted_cell: values.highlighted_slot(),
        }
    }
}

struct DetectionActivity {
    shared: Arc<SharedState>,
    pipeline: Arc<DetectionPipeline>,
    source: Arc<dyn FrameSource>,
    tracker: StalenessTracker,
    shutdown: Arc<watch::Sender<bool>>,
}

impl DetectionActivity {
    async fn run(
        mut self,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), SessionError> {
        let mut ticker = time::interval_at(time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        while next_tick(&mut ticker, &mut shutdown).await {
            let outcome = self.pass().await?;
            if *shutdown.borrow() {
                debug!("discarding detection pass that finished after shutdown");
                break;
            }
            match outcome {
                Ok(board) => self.apply(board).await,
                Err(err) => {
                    error!("frame source failed, ending session: {err}");
                    self.shutdown.send_replace(true);
                    return Err(err.into());
                }
            }
        }
        debug!("detection activity stopped");
        Ok(())
    }

    /// One acquisition and pipeline run on the blocking pool.
    async fn pass(&self) -> Result<Result<Option<Quadrilateral>, AcquisitionError>, JoinError> {
        let source = self.source.clone();
        let pipeline = self.pipeline.clone();
        tokio::task::spawn_blocking(move || {
            let frame = source.frame()?;
            Ok(pipeline.detect(&frame))
        })
        .await
    }

    async fn apply(&mut self, board: Option<Quadrilateral>) {
        let current = self.shared.board().await;
        match self.tracker.observe(&current, board, Instant::now()) {
            BoardUpdate::Replace(next) => self.shared.publish_board(next).await,
            BoardUpdate::Retain => debug!(
                "no board this pass ({} in a row), keeping the last one",
                self.tracker.consecutive_misses()
            ),
        }
    }
}

struct ValueActivity {
    shared: Arc<SharedState>,
    grid: GridSpec,
    source: Box<dyn ValueSource>,
}

impl ValueActivity {
    async fn run(
        mut self,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), SessionError> {
        let mut ticker = time::interval_at(time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        while next_tick(&mut ticker, &mut shutdown).await {
            let values = self.source.produce_values(self.grid.rows(), self.grid.cols());
            if let Err(err) = self.shared.values().replace(values).await {
                warn!("ignoring value update: {err}");
            }
        }
        debug!("value activity stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::frame::StillFrameSource;
    use crate::core_modules::geometry::Point;
    use crate::core_modules::overlay::OverlayBus;
    use crate::core_modules::value_store::ShuffleSimulator;
    use image::RgbaImage;

    #[test]
    fn config_parses_from_partial_json() {
        let json = r#"{
            "grid": {"rows": 3, "cols": 5},
            "detect_interval": 250,
            "detector": {"selection": "largest_area", "min_area": {"kind": "absolute", "px": 5000.0}},
            "staleness": {"max_misses": 4},
            "highlight": {"kind": "highest_value"}
        }"#;
        let config: SessionConfig = serde_json::from_str(json).expect("valid config");
        assert_eq!(config.grid, GridSpec::new(3, 5).unwrap());
        assert_eq!(config.detect_interval, Duration::from_millis(250));
        assert_eq!(config.value_interval, Duration::from_millis(2000));
        assert_eq!(config.detector.blur_aperture, 5);
        assert_eq!(config.staleness.max_misses, Some(4));
        assert_eq!(config.highlight, HighlightPolicy::HighestValue);
    }

    #[tokio::test]
    async fn zero_intervals_are_clamped_instead_of_panicking() {
        let config = SessionConfig {
            render_interval: Duration::ZERO,
            detect_interval: Duration::ZERO,
            value_interval: Duration::ZERO,
            ..SessionConfig::default()
        };
        let source = Arc::new(StillFrameSource::new(RgbaImage::new(64, 48)));
        let bus = OverlayBus::new(8);
        let mut overlays = bus.subscribe();
        let session = Session::start(
            config,
            source,
            Box::new(ShuffleSimulator::seeded(9)),
            Box::new(bus.clone()),
        )
        .expect("session starts");

        overlays.recv().await.expect("render keeps ticking");
        tokio::time::sleep(Duration::from_millis(20)).await;
        session.stop().await.expect("no activity panicked");
    }

    #[test]
    fn zero_interval_in_json_is_clamped() {
        let config: SessionConfig = serde_json::from_str(r#"{"render_interval": 0}"#).unwrap();
        assert_eq!(config.render_interval, Duration::from_millis(1));
    }

    #[tokio::test]
    async fn board_swaps_are_whole_values() {
        let shared = SharedState::new(
            BoardState::fallback(Instant::now()),
            ValueStore::new(vec![1, 2, 3, 4], None),
        );
        let quad = Quadrilateral::from_ordered_corners([
            Point::new(1.0, 1.0),
            Point::new(9.0, 1.0),
            Point::new(9.0, 9.0),
            Point::new(1.0, 9.0),
        ]);
        let next = BoardState::detected(quad, Instant::now());
        shared.publish_board(next).await;
        let (board, values) = shared.snapshot().await;
        assert_eq!(board, next);
        assert_eq!(values.values(), &[1, 2, 3, 4]);
    }
}
