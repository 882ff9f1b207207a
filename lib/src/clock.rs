//! Wall-clock driven simulation time.

use std::time::{Duration as StdDuration, Instant};

use time::Duration;

use crate::{
    error::{Error, Result},
    time::Epoch,
};

/// Source of elapsed wall-clock time.
pub trait SimulationClock {
    /// Wall-clock time since the clock started.
    fn elapsed(&self) -> StdDuration;
}

#[derive(Copy, Clone, Debug)]
pub struct WallClock {
    start: Instant,
}

impl WallClock {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl SimulationClock for WallClock {
    fn elapsed(&self) -> StdDuration {
        self.start.elapsed()
    }
}

/// A clock that only moves when told to.
#[derive(Copy, Clone, Debug, Default)]
pub struct ManualClock {
    elapsed: StdDuration,
}

impl ManualClock {
    pub fn advance(&mut self, by: StdDuration) {
        self.elapsed += by;
    }
}

impl SimulationClock for ManualClock {
    fn elapsed(&self) -> StdDuration {
        self.elapsed
    }
}

/// Turns wall-clock ticks into epoch steps scaled by a time-warp factor.
#[derive(Clone, Debug)]
pub struct TimeWarp<C> {
    clock: C,
    warp: f64,
    last: StdDuration,
}

impl<C: SimulationClock> TimeWarp<C> {
    pub fn new(clock: C, warp: f64) -> Self {
        let last = clock.elapsed();
        Self { clock, warp, last }
    }

    pub fn warp(&self) -> f64 {
        self.warp
    }

    /// Change the factor; negative values run time backward.
    pub fn set_warp(&mut self, warp: f64) {
        self.warp = warp;
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    /// Simulated time elapsed since the previous tick.
    pub fn tick(&mut self) -> Result<Duration> {
        let now = self.clock.elapsed();
        let wall = now.saturating_sub(self.last);
        self.last = now;
        Duration::checked_seconds_f64(wall.as_secs_f64() * self.warp).ok_or(Error::TimeOverflow)
    }

    /// `current` advanced by one tick.
    pub fn next_epoch(&mut self, current: Epoch) -> Result<Epoch> {
        current.checked_add(self.tick()?).ok_or(Error::TimeOverflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warp_scales_wall_time() {
        let mut warp = TimeWarp::new(ManualClock::default(), 3_600.0);
        warp.clock_mut().advance(StdDuration::from_millis(500));
        assert_eq!(
            warp.next_epoch(Epoch::J2000).unwrap(),
            Epoch::J2000 + Duration::minutes(30)
        );
        // no wall time, no step
        assert_eq!(warp.tick().unwrap(), Duration::ZERO);
    }

    #[test]
    fn negative_warp_runs_backward() {
        let mut warp = TimeWarp::new(ManualClock::default(), 1.0);
        warp.set_warp(-86_400.0);
        warp.clock_mut().advance(StdDuration::from_secs(2));
        assert_eq!(warp.tick().unwrap(), Duration::days(-2));
    }

    #[test]
    fn oversized_steps_are_errors() {
        let mut warp = TimeWarp::new(ManualClock::default(), 1e300);
        warp.clock_mut().advance(StdDuration::from_secs(1));
        assert!(matches!(warp.tick(), Err(Error::TimeOverflow)));

        let mut warp = TimeWarp::new(ManualClock::default(), 1.0);
        warp.clock_mut().advance(StdDuration::from_secs(1));
        let last = Epoch::from_duration(Duration::MAX);
        assert!(matches!(warp.next_epoch(last), Err(Error::TimeOverflow)));
    }
}
