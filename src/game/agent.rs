//! Agent Physics
//!
//! One controllable entity: a vertical position and velocity integrated
//! against gravity. Pure physics, no concurrency, no randomness.

use serde::{Serialize, Deserialize};

use crate::config::AgentPhysics;
use crate::core::fixed::{Fixed, fixed_min, floor_to_int, from_int};
use crate::game::state::AgentId;

/// State of a single agent in the episode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    /// Episode-unique id.
    pub id: AgentId,

    /// Top edge, in fixed-point world units (grows downward).
    pub y: Fixed,

    /// Vertical velocity per tick (negative is upward).
    pub velocity: Fixed,
}

impl AgentState {
    /// Create an agent at rest with its top edge at `y` world units.
    pub fn new(id: AgentId, y: i32) -> Self {
        Self {
            id,
            y: from_int(y),
            velocity: 0,
        }
    }

    /// Set velocity to the jump impulse. Impulses never accumulate.
    #[inline]
    pub fn jump(&mut self, physics: &AgentPhysics) {
        self.velocity = physics.jump_impulse;
    }

    /// Integrate one tick: position by the current velocity first, then
    /// gravity, clamped to terminal velocity.
    #[inline]
    pub fn advance(&mut self, physics: &AgentPhysics) {
        // Agents are pruned once off screen, so the position stays far from
        // the Q16.16 range.
        debug_assert!(self.y.checked_add(self.velocity).is_some(), "agent position overflow");
        self.y += self.velocity;
        self.velocity = fixed_min(self.velocity + physics.gravity, physics.terminal_velocity);
    }

    /// Top edge in whole world units.
    #[inline]
    pub fn top(&self) -> i32 {
        floor_to_int(self.y)
    }

    /// True if the agent is above the top edge or its bottom edge is below `bound`.
    #[inline]
    pub fn off_screen(&self, height: i32, bound: i32) -> bool {
        let top = self.top();
        top < 0 || top + height > bound
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::core::fixed::{to_fixed, DEFAULT_TERMINAL_VELOCITY};
    use proptest::prelude::*;

    fn physics() -> AgentPhysics {
        SimConfig::default().agent_physics()
    }

    #[test]
    fn test_move_applies_velocity_before_gravity() {
        let mut agent = AgentState::new(AgentId(0), 200);
        agent.advance(&physics());

        assert_eq!(agent.velocity, to_fixed(0.25));
        assert_eq!(agent.y, from_int(200));
    }

    #[test]
    fn test_jump_then_move() {
        let mut agent = AgentState::new(AgentId(0), 200);
        agent.jump(&physics());
        agent.advance(&physics());

        assert_eq!(agent.velocity, to_fixed(-5.75));
        assert_eq!(agent.y, from_int(194));
    }

    #[test]
    fn test_jump_overrides_velocity() {
        let mut agent = AgentState::new(AgentId(0), 200);
        agent.velocity = to_fixed(40.0);
        agent.jump(&physics());
        assert_eq!(agent.velocity, to_fixed(-6.0));

        // No accumulation on a second jump.
        agent.jump(&physics());
        assert_eq!(agent.velocity, to_fixed(-6.0));
    }

    #[test]
    fn test_terminal_velocity_clamp() {
        let mut agent = AgentState::new(AgentId(0), 0);
        agent.velocity = DEFAULT_TERMINAL_VELOCITY - 1;
        agent.advance(&physics());
        assert_eq!(agent.velocity, DEFAULT_TERMINAL_VELOCITY);
        agent.advance(&physics());
        assert_eq!(agent.velocity, DEFAULT_TERMINAL_VELOCITY);
    }

    #[test]
    fn test_long_fall_accumulates_without_wrapping() {
        let physics = physics();
        let mut agent = AgentState::new(AgentId(0), 0);
        let mut expected = agent.y;

        // Reaches terminal velocity after 384 ticks, about 20k units down.
        for _ in 0..400 {
            let velocity = agent.velocity;
            agent.advance(&physics);
            expected += velocity;
            assert_eq!(agent.y, expected);
            assert!(agent.y >= 0);
        }
        assert_eq!(agent.velocity, physics.terminal_velocity);
    }

    #[test]
    fn test_off_screen() {
        let height = 75;
        let bound = 448;

        assert!(!AgentState::new(AgentId(0), 0).off_screen(height, bound));
        assert!(!AgentState::new(AgentId(0), bound - height).off_screen(height, bound));
        assert!(AgentState::new(AgentId(0), bound - height + 1).off_screen(height, bound));

        let mut above = AgentState::new(AgentId(0), 0);
        above.y = -1;
        assert!(above.off_screen(height, bound));
    }

    proptest! {
        #[test]
        fn prop_velocity_never_exceeds_terminal(jumps in proptest::collection::vec(any::<bool>(), 1..400)) {
            let physics = physics();
            let mut agent = AgentState::new(AgentId(0), 240);
            for jump in jumps {
                if jump {
                    agent.jump(&physics);
                    prop_assert_eq!(agent.velocity, physics.jump_impulse);
                }
                agent.advance(&physics);
                prop_assert!(agent.velocity <= physics.terminal_velocity);
            }
        }
    }
}
