// THEORY:
// `BoardState` is the single shared answer to "where is the board right now?".
// The detection activity writes it; the render activity reads it every frame.
// It is `Copy` and only ever replaced as a whole value, so a reader sees either
// the old four corners or the new four corners, never a mix.
//
// A failed detection pass does not clear the board. The last good quad is
// retained so the grid stays put through momentary glare or motion blur.
// Left unchecked that turns into a grid pinned to a board that has since moved
// away, so the `StalenessTracker` counts consecutive misses and, when the
// policy sets a bound, reverts to the fallback rectangle once it is reached.

use crate::core_modules::geometry::Quadrilateral;
use log::warn;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// The last published board.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoardState {
    /// `None` means "draw over the frame-spanning fallback rectangle".
    pub quad: Option<Quadrilateral>,
    pub last_updated: Instant,
}

impl BoardState {
    pub fn fallback(at: Instant) -> Self {
        Self {
            quad: None,
            last_updated: at,
        }
    }

    pub fn detected(quad: Quadrilateral, at: Instant) -> Self {
        Self {
            quad: Some(quad),
            last_updated: at,
        }
    }
}

/// How long a retained board may outlive failed detections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StalenessPolicy {
    /// Consecutive misses after which the board reverts to the fallback.
    /// `None` retains the last board indefinitely.
    pub max_misses: Option<u32>,
}

/// What the detection activity should do with `BoardState` after a pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoardUpdate {
    Replace(BoardState),
    Retain,
}

/// Per-session miss counter owned by the detection activity.
#[derive(Debug, Clone)]
pub struct StalenessTracker {
    policy: StalenessPolicy,
    consecutive_misses: u32,
}

impl StalenessTracker {
    pub fn new(policy: StalenessPolicy) -> Self {
        Self {
            policy,
            consecutive_misses: 0,
        }
    }

    pub fn consecutive_misses(&self) -> u32 {
        self.consecutive_misses
    }

    /// Folds one pass outcome into the counter and decides the update.
    pub fn observe(
        &mut self,
        current: &BoardState,
        outcome: Option<Quadrilateral>,
        now: Instant,
    ) -> BoardUpdate {
        let Some(quad) = outcome else {
            self.consecutive_misses = self.consecutive_misses.saturating_add(1);
            return match self.policy.max_misses {
                Some(limit) if self.consecutive_misses >= limit && current.quad.is_some() => {
                    warn!(
                        "board not seen for {} passes, reverting to the fallback grid",
                        self.consecutive_misses
                    );
                    BoardUpdate::Replace(BoardState::fallback(now))
                }
                _ => BoardUpdate::Retain,
            };
        };
        self.consecutive_misses = 0;
        BoardUpdate::Replace(BoardState::detected(quad, now))
    }
}
