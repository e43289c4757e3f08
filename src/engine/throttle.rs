//! Adaptive Throttle
//!
//! Hill-climbing control of how many steps run per external frame. Nobody
//! watching means the simulation can run faster than real time; demand or a
//! frame rate under target backs it off again.

use std::time::{Duration, Instant};

use crate::config::ThrottleConfig;

/// Ticks-per-frame multiplier in `[1, ceiling]`.
#[derive(Debug, Clone)]
pub struct AdaptiveThrottle {
    adaptive: bool,
    ceiling: u32,
    target_tps: f64,
    multiplier: u32,
}

impl AdaptiveThrottle {
    /// Create a throttle. Adaptive throttles start at one step per frame.
    pub fn new(config: &ThrottleConfig) -> Self {
        let ceiling = config.ceiling.max(1);
        let multiplier = if config.adaptive {
            1
        } else {
            config.fixed_steps_per_frame.max(1)
        };

        Self {
            adaptive: config.adaptive,
            ceiling,
            target_tps: config.target_tps,
            multiplier,
        }
    }

    /// Steps to run in the next frame.
    #[inline]
    pub fn multiplier(&self) -> u32 {
        self.multiplier
    }

    /// Upper bound of the multiplier.
    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Feed one frame's observations back and return the new multiplier.
    ///
    /// `demanded` is whether any step in the frame had a consumer waiting.
    /// `measured_tps` is the latest frame rate measurement, if one exists.
    pub fn end_frame(&mut self, demanded: bool, measured_tps: Option<f64>) -> u32 {
        if !self.adaptive {
            return self.multiplier;
        }

        let lagging = measured_tps.is_some_and(|tps| tps < self.target_tps);
        self.multiplier = if demanded || lagging {
            self.multiplier.saturating_sub(1).max(1)
        } else {
            (self.multiplier + 1).min(self.ceiling)
        };
        self.multiplier
    }
}

/// Frames-per-second over a fixed window.
#[derive(Debug, Clone)]
pub struct TpsMeter {
    window: Duration,
    window_start: Option<Instant>,
    frames: u32,
    last: Option<f64>,
}

impl Default for TpsMeter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl TpsMeter {
    /// Meter averaging over `window`.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            window_start: None,
            frames: 0,
            last: None,
        }
    }

    /// Count a frame at `now` and return the latest full-window measurement.
    pub fn record_frame(&mut self, now: Instant) -> Option<f64> {
        let start = *self.window_start.get_or_insert(now);
        self.frames += 1;

        let elapsed = now.saturating_duration_since(start);
        if elapsed >= self.window {
            self.last = Some(f64::from(self.frames) / elapsed.as_secs_f64());
            self.window_start = Some(now);
            self.frames = 0;
        }
        self.last
    }

    /// Latest measurement.
    pub fn tps(&self) -> Option<f64> {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adaptive(ceiling: u32) -> AdaptiveThrottle {
        AdaptiveThrottle::new(&ThrottleConfig {
            adaptive: true,
            ceiling,
            target_tps: 50.0,
            fixed_steps_per_frame: 2,
        })
    }

    #[test]
    fn test_idle_climbs_to_ceiling() {
        let mut throttle = adaptive(8);
        let mut previous = throttle.multiplier();
        assert_eq!(previous, 1);

        for _ in 0..20 {
            let next = throttle.end_frame(false, Some(60.0));
            assert!(next >= previous);
            assert!(next <= 8);
            previous = next;
        }
        assert_eq!(throttle.multiplier(), 8);
    }

    #[test]
    fn test_demand_backs_off_to_floor() {
        let mut throttle = adaptive(8);
        for _ in 0..8 {
            throttle.end_frame(false, None);
        }
        assert_eq!(throttle.multiplier(), 8);

        assert_eq!(throttle.end_frame(true, None), 7);
        for _ in 0..20 {
            throttle.end_frame(true, None);
        }
        assert_eq!(throttle.multiplier(), 1);
    }

    #[test]
    fn test_low_tps_backs_off() {
        let mut throttle = adaptive(8);
        throttle.end_frame(false, None);
        throttle.end_frame(false, None);
        assert_eq!(throttle.multiplier(), 3);

        assert_eq!(throttle.end_frame(false, Some(49.9)), 2);
        assert_eq!(throttle.end_frame(false, Some(50.0)), 3);
    }

    #[test]
    fn test_fixed_mode_pinned() {
        let mut throttle = AdaptiveThrottle::new(&ThrottleConfig {
            adaptive: false,
            ceiling: 64,
            target_tps: 50.0,
            fixed_steps_per_frame: 2,
        });
        assert_eq!(throttle.multiplier(), 2);
        assert_eq!(throttle.end_frame(false, None), 2);
        assert_eq!(throttle.end_frame(true, Some(1.0)), 2);
    }

    #[test]
    fn test_tps_meter() {
        let mut meter = TpsMeter::new(Duration::from_secs(1));
        let start = Instant::now();

        assert_eq!(meter.record_frame(start), None);
        for i in 1..60 {
            assert_eq!(meter.record_frame(start + Duration::from_millis(i * 10)), None);
        }
        let tps = meter.record_frame(start + Duration::from_secs(1)).unwrap();
        assert!((tps - 61.0).abs() < 1e-9);
        assert_eq!(meter.tps(), Some(tps));
    }
}
