//! Obstacle Spawning
//!
//! Countdown timer: idle while the timer is positive, spawn and rearm when
//! it runs out. Inter-arrival time is constant and independent of scroll
//! speed.

use serde::{Serialize, Deserialize};

use crate::config::SimConfig;
use crate::core::rng::DeterministicRng;
use crate::game::obstacle::{ObstacleId, ObstacleState};

/// Timer-driven obstacle factory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObstacleSpawner {
    /// Ticks between spawns.
    delay: i32,
    /// Remaining countdown.
    timer: i32,
    /// Id for the next obstacle.
    next_id: u64,
}

impl ObstacleSpawner {
    /// Create a spawner armed with the full delay.
    pub fn new(delay: i32) -> Self {
        Self {
            delay,
            timer: delay,
            next_id: 0,
        }
    }

    /// Advance one tick, returning a new obstacle when the countdown expires.
    pub fn tick(&mut self, rng: &mut DeterministicRng, config: &SimConfig) -> Option<ObstacleState> {
        if self.timer <= 0 {
            self.timer = self.delay;
            let id = ObstacleId(self.next_id);
            self.next_id += 1;
            Some(ObstacleState::spawn(id, rng, config))
        } else {
            self.timer -= 1;
            None
        }
    }

    /// Remaining countdown.
    pub fn timer(&self) -> i32 {
        self.timer
    }

    /// Number of obstacles spawned so far.
    pub fn spawned(&self) -> u64 {
        self.next_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_spawn_after_delay() {
        let config = SimConfig::default();
        let mut rng = DeterministicRng::new(1);
        let mut spawner = ObstacleSpawner::new(3);

        // 3 -> 2 -> 1 -> 0, spawn on the fourth tick.
        for _ in 0..3 {
            assert!(spawner.tick(&mut rng, &config).is_none());
        }
        let first = spawner.tick(&mut rng, &config).unwrap();
        assert_eq!(first.id, ObstacleId(0));
        assert_eq!(spawner.timer(), 3);
    }

    #[test]
    fn test_constant_inter_arrival() {
        let config = SimConfig::default();
        let mut rng = DeterministicRng::new(2);
        let mut spawner = ObstacleSpawner::new(110);

        let spawn_ticks: Vec<u32> = (0..1000u32)
            .filter(|_| spawner.tick(&mut rng, &config).is_some())
            .collect();

        assert!(spawn_ticks.len() >= 8);
        for pair in spawn_ticks.windows(2) {
            assert_eq!(pair[1] - pair[0], 111);
        }
        assert_eq!(spawner.spawned(), spawn_ticks.len() as u64);
    }

    #[test]
    fn test_ids_are_sequential() {
        let config = SimConfig::default();
        let mut rng = DeterministicRng::new(3);
        let mut spawner = ObstacleSpawner::new(0);

        let ids: Vec<ObstacleId> = (0..5)
            .filter_map(|_| spawner.tick(&mut rng, &config))
            .map(|o| o.id)
            .collect();
        assert_eq!(ids, vec![ObstacleId(0), ObstacleId(1), ObstacleId(2), ObstacleId(3), ObstacleId(4)]);
    }
}
