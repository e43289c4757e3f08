//! Obstacle Physics
//!
//! A scrolling hazard: a pair of columns with a fixed-height gap between
//! them. Obstacles never overtake each other, so spawn order is also
//! horizontal order.

use serde::{Serialize, Deserialize};

use crate::config::SimConfig;
use crate::core::rng::DeterministicRng;
use crate::game::agent::AgentState;

/// Spawn sequence number. Ascending ids are ascending spawn times.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObstacleId(pub u64);

/// State of a single obstacle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObstacleState {
    /// Spawn sequence number.
    pub id: ObstacleId,

    /// Leading (left) edge.
    pub x: i32,

    /// Column width.
    pub width: i32,

    /// Top of the gap (bottom of the upper column).
    pub gap_top: i32,

    /// Vertical size of the gap.
    pub gap_height: i32,

    /// Trailing edge has crossed the scoring reference. Never reset.
    pub passed: bool,

    /// Counted toward the episode score.
    pub scored: bool,
}

impl ObstacleState {
    /// Spawn at the right edge of the field with a random gap.
    ///
    /// The gap top is uniform over `[tile, field_height - gap - tile)`, so the
    /// gap plus one tile of margin on each side always fits.
    pub fn spawn(id: ObstacleId, rng: &mut DeterministicRng, config: &SimConfig) -> Self {
        let span = config.field_height - config.gap_height - 2 * config.tile_size;
        debug_assert!(span > 0, "gap does not fit; config should have been validated");
        let gap_top = config.tile_size + rng.next_int(span.max(1) as u32) as i32;

        Self {
            id,
            x: config.field_width,
            width: config.obstacle_width(),
            gap_top,
            gap_height: config.gap_height,
            passed: false,
            scored: false,
        }
    }

    /// Bottom of the gap (top of the lower column).
    #[inline]
    pub fn gap_bottom(&self) -> i32 {
        self.gap_top + self.gap_height
    }

    /// Trailing (right) edge.
    #[inline]
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    /// Scroll left.
    #[inline]
    pub fn advance(&mut self, speed: i32) {
        self.x -= speed;
    }

    /// Fully scrolled past the left boundary.
    #[inline]
    pub fn off_field(&self) -> bool {
        self.right() < 0
    }

    /// Test an agent box against the columns.
    ///
    /// No hit unless the obstacle overlaps the agent horizontally; inside
    /// that span any part of the agent above the gap top or below the gap
    /// bottom is a hit.
    pub fn collides(&self, agent: &AgentState, config: &SimConfig) -> bool {
        // not reached yet
        if self.x > config.agent_x + config.agent_width {
            return false;
        }
        // already behind the agent
        if self.right() < config.agent_x {
            return false;
        }

        let top = agent.top();
        let hit_top = top < self.gap_top;
        let hit_bottom = top + config.agent_height > self.gap_bottom();
        hit_top || hit_bottom
    }

    /// Latch `passed` once the trailing edge is left of `reference_x`.
    pub fn check_passed(&mut self, reference_x: i32) -> bool {
        if !self.passed && self.right() < reference_x {
            self.passed = true;
        }
        self.passed
    }
}
