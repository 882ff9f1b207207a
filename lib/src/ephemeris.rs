//! Sampled ephemerides over finite time windows.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use time::Duration;

use crate::{
    error::{Error, Result},
    math::hermite3,
    time::Epoch,
};

/// The span `[start, end]` over which an ephemeris table is sampled,
/// `periods` intervals of `spacing` long.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EphemerisWindow {
    pub start: Epoch,
    pub end: Epoch,
    pub periods: u32,
    pub spacing: Duration,
}

impl EphemerisWindow {
    /// Window starting at `anchor`.
    pub fn forward(anchor: Epoch, periods: u32, spacing: Duration) -> Self {
        Self {
            start: anchor,
            end: anchor + spacing * periods,
            periods,
            spacing,
        }
    }

    /// Window ending at `anchor`, for time running backward.
    pub fn backward(anchor: Epoch, periods: u32, spacing: Duration) -> Self {
        Self {
            start: anchor - spacing * periods,
            end: anchor,
            periods,
            spacing,
        }
    }

    /// The next window after `epoch` left this one, keeping the sample
    /// count and spacing.
    #[must_use]
    pub fn advanced_to(&self, epoch: Epoch) -> Self {
        if epoch < self.start {
            Self::backward(epoch, self.periods, self.spacing)
        } else {
            Self::forward(epoch, self.periods, self.spacing)
        }
    }

    pub fn span(&self) -> Duration {
        self.end - self.start
    }

    pub fn contains(&self, epoch: Epoch) -> bool {
        self.start <= epoch && epoch <= self.end
    }

    /// The `periods + 1` sample epochs, both ends included.
    pub fn sample_epochs(&self) -> impl Iterator<Item = Epoch> + '_ {
        (0..=self.periods).map(|k| self.start + self.spacing * k)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub epoch: Epoch,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
}

/// Position/velocity samples ordered by epoch, interpolated with cubic
/// Hermite segments using the sampled velocities as tangents.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Ephemeris {
    samples: Vec<Sample>,
}

impl Ephemeris {
    /// Sample `f` at every epoch of `window`.
    pub fn sample<E>(
        window: &EphemerisWindow,
        mut f: impl FnMut(Epoch) -> Result<(Vector3<f64>, Vector3<f64>), E>,
    ) -> Result<Self, E> {
        let samples = window
            .sample_epochs()
            .map(|epoch| {
                let (position, velocity) = f(epoch)?;
                Ok(Sample {
                    epoch,
                    position,
                    velocity,
                })
            })
            .collect::<Result<Vec<_>, E>>()?;
        Ok(Self { samples })
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Interpolated position and velocity at `epoch`.
    pub fn evaluate(&self, epoch: Epoch) -> Result<(Vector3<f64>, Vector3<f64>)> {
        let (Some(first), Some(last)) = (self.samples.first(), self.samples.last()) else {
            return Err(Error::EphemerisOutOfRange {
                epoch,
                start: epoch,
                end: epoch,
            });
        };
        if epoch < first.epoch || epoch > last.epoch {
            return Err(Error::EphemerisOutOfRange {
                epoch,
                start: first.epoch,
                end: last.epoch,
            });
        }
        if self.samples.len() == 1 {
            return Ok((first.position, first.velocity));
        }

        let hi = self
            .samples
            .partition_point(|s| s.epoch <= epoch)
            .clamp(1, self.samples.len() - 1);
        let s1 = &self.samples[hi - 1];
        let s2 = &self.samples[hi];
        if s1.epoch == epoch {
            return Ok((s1.position, s1.velocity));
        }
        // Segment-local time keeps the cubic well conditioned.
        Ok(hermite3(
            0.0,
            (&s1.position, &s1.velocity),
            (s2.epoch - s1.epoch).as_seconds_f64(),
            (&s2.position, &s2.velocity),
            (epoch - s1.epoch).as_seconds_f64(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circle(epoch: Epoch) -> Result<(Vector3<f64>, Vector3<f64>)> {
        // unit circle, one radian per day
        let w = 1.0 / 86_400.0;
        let t = epoch.seconds() * w;
        Ok((
            Vector3::new(t.cos(), t.sin(), 0.0),
            Vector3::new(-t.sin() * w, t.cos() * w, 0.0),
        ))
    }

    #[test]
    fn window_bounds() {
        let w = EphemerisWindow::forward(Epoch::J2000, 10, Duration::hours(1));
        assert_eq!(w.end, Epoch::J2000 + Duration::hours(10));
        assert_eq!(w.sample_epochs().count(), 11);
        assert_eq!(w.sample_epochs().last(), Some(w.end));
        assert!(w.contains(w.end));
        assert!(!w.contains(w.end + Duration::nanoseconds(1)));

        let next = w.advanced_to(w.end + Duration::minutes(1));
        assert_eq!(next.start, w.end + Duration::minutes(1));
        assert_eq!(next.span(), w.span());

        let back = w.advanced_to(Epoch::J2000 - Duration::hours(2));
        assert_eq!(back.end, Epoch::J2000 - Duration::hours(2));
        assert_eq!(back.span(), w.span());
    }

    #[test]
    fn interpolates_between_samples() {
        let w = EphemerisWindow::forward(Epoch::J2000, 48, Duration::hours(1));
        let eph = Ephemeris::sample(&w, circle).unwrap();
        assert_eq!(eph.len(), 49);

        let at = Epoch::J2000 + Duration::minutes(17 * 60 + 23);
        let (p, v) = eph.evaluate(at).unwrap();
        let (pe, ve) = circle(at).unwrap();
        assert!((p - pe).norm() < 1e-7);
        assert!((v - ve).norm() < 1e-10);

        let (p, _) = eph.evaluate(w.end).unwrap();
        assert!((p - circle(w.end).unwrap().0).norm() < 1e-15);
    }

    #[test]
    fn outside_window_is_an_error() {
        let w = EphemerisWindow::forward(Epoch::J2000, 4, Duration::hours(1));
        let eph = Ephemeris::sample(&w, circle).unwrap();
        assert!(matches!(
            eph.evaluate(w.end + Duration::seconds(1)),
            Err(Error::EphemerisOutOfRange { .. })
        ));
        assert!(Ephemeris::default().evaluate(Epoch::J2000).is_err());
    }
}
