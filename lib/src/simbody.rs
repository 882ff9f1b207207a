//! A single simulated body.

use std::sync::Arc;

use nalgebra::{Rotation3, Vector3};
use serde::{Deserialize, Serialize};
use time::Duration;
use tracing::{debug, trace};

use crate::{
    bodies::{BodyRecord, BodyType, Orientation, Plane, Radii},
    config::MAX_WINDOW_SPAN,
    ephemeris::{Ephemeris, EphemerisWindow},
    error::{Error, Result},
    kepler::orbits::{
        ConvergenceError, Orbit, StateVector, ELEMENTS_TOL, PROPAGATE_MAXITER, PROPAGATE_TOL,
    },
    time::{Epoch, SECONDS_PER_DAY},
};

/// Resolved link to a body's parent inside a [`SimSystem`].
///
/// [`SimSystem`]: crate::system::SimSystem
#[derive(Clone, Debug, PartialEq)]
pub struct ParentLink {
    /// Index of the parent in the owning system's body list.
    pub index: usize,
    pub name: Arc<str>,
    /// Gravitational parameter of the parent (`km^3/s^2`)
    pub mu: f64,
    /// Parent's equator tilt against the ecliptic (`rad`)
    pub obliquity: f64,
}

/// Window sizing shared by every body of a system.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct WindowParams {
    pub periods: u32,
    /// Overrides the per-body default of `orbital_period / periods`.
    pub spacing: Option<Duration>,
    pub track_points: usize,
}

impl Default for WindowParams {
    fn default() -> Self {
        Self {
            periods: 365,
            spacing: None,
            track_points: 360,
        }
    }
}

impl WindowParams {
    /// Sample spacing for `record`: the override if set, else the orbital
    /// period split into `periods` samples, else one day.
    ///
    /// Fails when the whole window would be longer than
    /// [`MAX_WINDOW_SPAN`].
    pub fn spacing_for(&self, record: &BodyRecord) -> Result<Duration> {
        let periods = f64::from(self.periods.max(1));
        let spacing = match (self.spacing, record.orbital_period) {
            (Some(spacing), _) => spacing.as_seconds_f64(),
            (None, Some(period)) if period > 0.0 => period / periods,
            (None, _) => SECONDS_PER_DAY,
        };
        let out_of_range = || {
            Error::InvalidConfig(format!(
                "{}: sample spacing of {spacing} s is out of range",
                record.name
            ))
        };
        if !(spacing > 0.0 && spacing * periods <= MAX_WINDOW_SPAN) {
            return Err(out_of_range());
        }
        Duration::checked_seconds_f64(spacing).ok_or_else(out_of_range)
    }
}

/// Everything a window crossing replaces.
#[derive(Clone, Debug)]
struct Fit {
    window: EphemerisWindow,
    ephemeris: Ephemeris,
    orbit: Option<StateVector>,
    track: Option<Vec<Vector3<f64>>>,
    resample: bool,
}

/// Position and velocity relative to the parent, in the body's plane,
/// plus the body's orientation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BodyState {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub orientation: Orientation,
}

#[derive(Clone, Debug)]
pub struct SimBody {
    record: Arc<BodyRecord>,
    parent: Option<ParentLink>,
    body_type: BodyType,
    plane: Plane,
    to_ecliptic: Rotation3<f64>,
    radii: Radii,
    epoch: Epoch,
    state: BodyState,
    /// Two-body orbit about the parent. Replaced by its propagated self on
    /// every update.
    orbit: Option<StateVector>,
    window: EphemerisWindow,
    ephemeris: Ephemeris,
    /// Orbit track in the parent-centered ecliptic frame.
    track: Option<Vec<Vector3<f64>>>,
    resample: bool,
    track_points: usize,
}

impl SimBody {
    /// Build a body at `epoch`: radii, initial ephemeris window and, for
    /// bodies with a parent, the initial two-body orbit.
    pub fn new(
        record: Arc<BodyRecord>,
        parent: Option<ParentLink>,
        body_type: BodyType,
        plane: Plane,
        epoch: Epoch,
        params: WindowParams,
    ) -> Result<Self> {
        let radii = if record.is_primary() || record.radii.is_degenerate() {
            record.radii.collapsed()
        } else {
            record.radii
        };
        let to_ecliptic = plane.to_ecliptic(parent.as_ref().map_or(0.0, |p| p.obliquity));
        let spacing = params.spacing_for(&record)?;
        let window = EphemerisWindow::forward(epoch, params.periods, spacing);

        let mut body = Self {
            record,
            parent,
            body_type,
            plane,
            to_ecliptic,
            radii,
            epoch,
            state: BodyState::default(),
            orbit: None,
            window,
            ephemeris: Ephemeris::default(),
            track: None,
            resample: true,
            track_points: params.track_points,
        };
        body.set_ephemeris(epoch, Some(window))?;
        body.set_orbit()?;
        let (position, velocity) = body.ephemeris.evaluate(epoch)?;
        body.state = BodyState {
            position,
            velocity,
            orientation: body.record.rotation.at(epoch),
        };
        debug!(
            "{}: initialized at {} with window [{}, {}]",
            body.record.name, epoch, body.window.start, body.window.end
        );
        Ok(body)
    }

    /// Resample the ephemeris table over `window`, or over a fresh window
    /// anchored at `epoch` when `window` is `None`.
    ///
    /// Without an orbit the table comes from the catalog model; once an
    /// orbit exists it is sampled from that orbit instead.
    pub fn set_ephemeris(&mut self, epoch: Epoch, window: Option<EphemerisWindow>) -> Result<()> {
        let window = window.unwrap_or_else(|| self.window.advanced_to(epoch));
        let ephemeris = match &self.orbit {
            None => {
                let parent_mu = self.parent.as_ref().map_or(0.0, |p| p.mu);
                let from_ecliptic = self.to_ecliptic.inverse();
                Ephemeris::sample(&window, |t| {
                    let (r, v) = self
                        .record
                        .model_state(parent_mu, t)
                        .map_err(|e| self.propagation_failed(t, e))?;
                    Ok::<_, Error>((from_ecliptic * r, from_ecliptic * v))
                })?
            }
            Some(orbit) => Ephemeris::sample(&window, |t| {
                let sv = orbit
                    .propagate_to(t, PROPAGATE_TOL, PROPAGATE_MAXITER)
                    .map_err(|e| self.propagation_failed(t, e))?;
                Ok::<_, Error>((sv.position, sv.velocity))
            })?,
        };

        debug!(
            "{}: resampled {} ephemeris points over [{}, {}]",
            self.record.name,
            ephemeris.len(),
            window.start,
            window.end
        );
        self.window = window;
        self.ephemeris = ephemeris;
        self.resample = true;
        Ok(())
    }

    /// Fit the two-body orbit to the ephemeris at the current epoch.
    ///
    /// Bodies without a parent have no orbit. The track polyline is
    /// resampled when flagged or missing.
    pub fn set_orbit(&mut self) -> Result<()> {
        let Some(parent) = &self.parent else {
            self.orbit = None;
            return Ok(());
        };
        let (position, velocity) = self.ephemeris.evaluate(self.epoch)?;
        let finite = position.iter().chain(velocity.iter()).all(|x| x.is_finite());
        if !finite || position.norm() == 0.0 || velocity.norm() == 0.0 {
            return Err(Error::DegenerateOrbit(self.record.name.clone()));
        }
        let orbit = StateVector {
            mu: parent.mu,
            position,
            velocity,
            time: self.epoch,
        };
        if self.resample || self.track.is_none() {
            let track = orbit
                .into_orbit(ELEMENTS_TOL)
                .track(self.track_points)
                .into_iter()
                .map(|p| self.to_ecliptic * p)
                .collect();
            self.track = Some(track);
            self.resample = false;
        }
        self.orbit = Some(orbit);
        Ok(())
    }

    /// Advance to `epoch` and recompute position, velocity and
    /// orientation.
    ///
    /// On error the body keeps its previous epoch and state.
    pub fn update_state(&mut self, epoch: Epoch) -> Result<()> {
        let previous = self.epoch;
        // only a window crossing touches the fit before it can fail
        let fit = (!self.window.contains(epoch)).then(|| self.fit());
        self.epoch = epoch;
        match self.advance() {
            Ok(()) => {
                trace!("{}: updated to {}", self.record.name, epoch);
                Ok(())
            }
            Err(e) => {
                self.epoch = previous;
                if let Some(fit) = fit {
                    self.restore(fit);
                }
                Err(e)
            }
        }
    }

    fn fit(&self) -> Fit {
        Fit {
            window: self.window,
            ephemeris: self.ephemeris.clone(),
            orbit: self.orbit,
            track: self.track.clone(),
            resample: self.resample,
        }
    }

    fn restore(&mut self, fit: Fit) {
        self.window = fit.window;
        self.ephemeris = fit.ephemeris;
        self.orbit = fit.orbit;
        self.track = fit.track;
        self.resample = fit.resample;
    }

    fn advance(&mut self) -> Result<()> {
        if !self.window.contains(self.epoch) {
            debug!(
                "{}: {} left window [{}, {}]",
                self.record.name, self.epoch, self.window.start, self.window.end
            );
            self.set_ephemeris(self.epoch, None)?;
            self.set_orbit()?;
        }

        let (position, velocity, orbit) = match &self.orbit {
            Some(orbit) => {
                let next = orbit
                    .propagate_to(self.epoch, PROPAGATE_TOL, PROPAGATE_MAXITER)
                    .map_err(|e| self.propagation_failed(self.epoch, e))?;
                (next.position, next.velocity, Some(next))
            }
            None => {
                let (position, velocity) = self.ephemeris.evaluate(self.epoch)?;
                (position, velocity, None)
            }
        };

        self.state = BodyState {
            position,
            velocity,
            orientation: self.record.rotation.at(self.epoch),
        };
        if orbit.is_some() {
            self.orbit = orbit;
        }
        Ok(())
    }

    fn propagation_failed(&self, epoch: Epoch, e: ConvergenceError) -> Error {
        Error::PropagationFailed {
            body: self.record.name.clone(),
            epoch,
            iter: e.iter,
        }
    }

    /// Position in the primary's frame: this body's parent-relative
    /// position plus that of every ancestor. Recomputed on every call.
    pub fn position_in_primary(&self, bodies: &[SimBody]) -> Vector3<f64> {
        match &self.parent {
            Some(parent) => self.rel_position() + bodies[parent.index].position_in_primary(bodies),
            None => self.rel_position(),
        }
    }

    /// Velocity in the primary's frame, composed like
    /// [`Self::position_in_primary`].
    pub fn velocity_in_primary(&self, bodies: &[SimBody]) -> Vector3<f64> {
        match &self.parent {
            Some(parent) => self.rel_velocity() + bodies[parent.index].velocity_in_primary(bodies),
            None => self.rel_velocity(),
        }
    }

    /// Parent-relative position in the ecliptic frame.
    pub fn rel_position(&self) -> Vector3<f64> {
        self.to_ecliptic * self.state.position
    }

    /// Parent-relative velocity in the ecliptic frame.
    pub fn rel_velocity(&self) -> Vector3<f64> {
        self.to_ecliptic * self.state.velocity
    }

    pub fn name(&self) -> &Arc<str> {
        &self.record.name
    }

    pub fn record(&self) -> &Arc<BodyRecord> {
        &self.record
    }

    pub fn parent(&self) -> Option<&ParentLink> {
        self.parent.as_ref()
    }

    pub fn is_primary(&self) -> bool {
        self.parent.is_none()
    }

    pub fn body_type(&self) -> BodyType {
        self.body_type
    }

    pub fn plane(&self) -> Plane {
        self.plane
    }

    pub fn radii(&self) -> Radii {
        self.radii
    }

    pub fn mu(&self) -> f64 {
        self.record.mu
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// State relative to the parent in the body's own plane.
    pub fn state(&self) -> &BodyState {
        &self.state
    }

    pub fn orientation(&self) -> Orientation {
        self.state.orientation
    }

    pub fn orbit(&self) -> Option<&StateVector> {
        self.orbit.as_ref()
    }

    /// Classical elements of the current orbit, in the body's plane.
    pub fn elements(&self) -> Option<Orbit> {
        self.orbit.map(|sv| sv.into_orbit(ELEMENTS_TOL))
    }

    pub fn window(&self) -> &EphemerisWindow {
        &self.window
    }

    pub fn ephemeris(&self) -> &Ephemeris {
        &self.ephemeris
    }

    pub fn track(&self) -> Option<&[Vector3<f64>]> {
        self.track.as_deref()
    }

    /// Strip the catalog elements and the held orbit, so the next window
    /// crossing samples a zero trajectory and fails to fit.
    #[cfg(test)]
    pub(crate) fn break_model(&mut self) {
        self.record = Arc::new(BodyRecord {
            elements: None,
            ..(*self.record).clone()
        });
        self.orbit = None;
    }
}
