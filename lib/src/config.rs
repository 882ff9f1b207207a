//! Simulation configuration.
//!
//! `SimConfig` is plain serde data; the driver binary reads it from TOML:
//!
//! ```toml
//! body_names = ["Sun", "Earth", "Moon"]   # omit for the whole catalog
//! epoch0 = "2024-03-20T03:06:00Z"         # omit for J2000
//! use_multiprocessing = true
//! worker_threads = 4                      # omit for rayon's default
//! periods_per_window = 365
//! window_spacing = 86400.0                # seconds; omit for period / periods
//! time_warp = 86400.0                     # negative runs time backward
//! track_points = 360
//! ```

use serde::{Deserialize, Serialize};
use time::Duration;

use crate::{
    error::{Error, Result},
    time::Epoch,
};

/// Largest accepted `|time_warp|`.
pub const MAX_TIME_WARP: f64 = 1.0e9;
/// Longest accepted ephemeris window (`sec`, about 3000 years).
pub const MAX_WINDOW_SPAN: f64 = 1.0e11;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Subset of catalog names to simulate, `None` for all.
    pub body_names: Option<Vec<String>>,
    /// Initial epoch as an RFC 3339 timestamp, `None` for J2000.
    pub epoch0: Option<String>,
    /// Update bodies on a rayon pool instead of one after another.
    pub use_multiprocessing: bool,
    /// Size of the dedicated pool; `None` uses rayon's global pool.
    pub worker_threads: Option<usize>,
    /// Sample intervals per ephemeris window.
    pub periods_per_window: u32,
    /// Sample spacing (`sec`) for every body, overriding the
    /// catalog-specific default.
    pub window_spacing: Option<f64>,
    /// Simulated seconds per wall-clock second.
    pub time_warp: f64,
    /// Points in each orbit track polyline.
    pub track_points: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            body_names: None,
            epoch0: None,
            use_multiprocessing: false,
            worker_threads: None,
            periods_per_window: 365,
            window_spacing: None,
            time_warp: 1.0,
            track_points: 360,
        }
    }
}

impl SimConfig {
    pub fn epoch0(&self) -> Result<Epoch> {
        match &self.epoch0 {
            Some(s) => Epoch::parse_rfc3339(s),
            None => Ok(Epoch::J2000),
        }
    }

    pub fn window_spacing(&self) -> Result<Option<Duration>> {
        self.window_spacing
            .map(|spacing| {
                Duration::checked_seconds_f64(spacing).ok_or_else(|| {
                    Error::InvalidConfig(format!("window_spacing of {spacing} s is out of range"))
                })
            })
            .transpose()
    }

    pub fn validate(&self) -> Result<()> {
        if self.periods_per_window == 0 {
            return Err(Error::InvalidConfig(
                "periods_per_window must be positive".into(),
            ));
        }
        if let Some(spacing) = self.window_spacing {
            if !(spacing.is_finite() && spacing > 0.0) {
                return Err(Error::InvalidConfig(format!(
                    "window_spacing must be a positive number of seconds, got {spacing}"
                )));
            }
            if spacing * f64::from(self.periods_per_window) > MAX_WINDOW_SPAN {
                return Err(Error::InvalidConfig(format!(
                    "window of {} x {spacing} s exceeds {MAX_WINDOW_SPAN} s",
                    self.periods_per_window
                )));
            }
        }
        if !(self.time_warp.is_finite() && self.time_warp.abs() <= MAX_TIME_WARP) {
            return Err(Error::InvalidConfig(format!(
                "time_warp must lie within +/-{MAX_TIME_WARP}, got {}",
                self.time_warp
            )));
        }
        if self.track_points < 2 {
            return Err(Error::InvalidConfig("track_points must be at least 2".into()));
        }
        if self.worker_threads == Some(0) {
            return Err(Error::InvalidConfig("worker_threads must be positive".into()));
        }
        self.epoch0()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SimConfig::default();
        config.validate().unwrap();
        assert_eq!(config.epoch0().unwrap(), Epoch::J2000);
        assert_eq!(config.periods_per_window, 365);
        assert!(!config.use_multiprocessing);
        assert!(config.window_spacing().unwrap().is_none());
    }

    #[test]
    fn rejects_nonsense() {
        let config = SimConfig {
            periods_per_window: 0,
            ..SimConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = SimConfig {
            window_spacing: Some(-1.0),
            ..SimConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = SimConfig {
            window_spacing: Some(1e20),
            ..SimConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = SimConfig {
            time_warp: 1e300,
            ..SimConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = SimConfig {
            time_warp: -MAX_TIME_WARP,
            ..SimConfig::default()
        };
        config.validate().unwrap();

        let config = SimConfig {
            epoch0: Some("yesterday".into()),
            ..SimConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Time(_))));
    }
}
