//! Keplerian orbits.

use std::f64::consts;

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::Duration;

use crate::{math::wrap_angle, time::Epoch};

/// Recommended tolerance for [`StateVector::propagate`].
pub const PROPAGATE_TOL: f64 = 1e-10;
/// Recommended iteration cap for [`StateVector::propagate`].
pub const PROPAGATE_MAXITER: u64 = 50;
/// Recommended tolerance for [`StateVector::into_orbit`].
pub const ELEMENTS_TOL: f64 = 1e-8;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
#[error("failed to converge after {iter} iterations")]
pub struct ConvergenceError {
    pub iter: u64,
}

/// A Keplerian orbit.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Orbit {
    /// Semi-latus rectum (km).
    pub p: f64,
    /// Eccentricity (dimensionless).
    pub e: f64,
    /// Inclination (radians).
    pub i: f64,
    /// Longitude of ascending node (radians).
    pub lan: f64,
    /// Argument of periapsis (radians).
    pub argpe: f64,
    /// The epoch at true anomaly.
    pub epoch: Epoch,
    /// True anomaly (radians).
    pub ta: f64,
}

impl Orbit {
    pub fn periapsis_radius(&self) -> f64 {
        self.p / (1.0 + self.e)
    }

    pub fn apoapsis_radius(&self) -> f64 {
        self.p / (1.0 - self.e)
    }

    pub fn semi_major_axis(&self) -> f64 {
        self.p / (1.0 - self.e.powi(2))
    }

    /// Orbital period (`sec`) about a parent with gravitational
    /// parameter `mu`. `None` for open orbits.
    pub fn period(&self, mu: f64) -> Option<f64> {
        if self.e < 1.0 {
            Some(2.0 * consts::PI * libm::sqrt(self.semi_major_axis().powi(3) / mu))
        } else {
            None
        }
    }

    /// Calculate the position and velocity in the perifocal
    /// coordinate system PQW at an orbit's current true anomaly.
    pub fn sv_pqw(&self, mu: f64) -> (Vector3<f64>, Vector3<f64>) {
        let r = self.p / (1.0 + self.e * libm::cos(self.ta));
        let rv = r * libm::cos(self.ta) * Vector3::new(1.0, 0.0, 0.0)
            + r * libm::sin(self.ta) * Vector3::new(0.0, 1.0, 0.0);
        let vv = libm::sqrt(mu / self.p)
            * (-libm::sin(self.ta) * Vector3::new(1.0, 0.0, 0.0)
                + (self.e + libm::cos(self.ta)) * Vector3::new(0.0, 1.0, 0.0));
        (rv, vv)
    }

    fn pqw_ijk_matrix(&self) -> Matrix3<f64> {
        let m11 = libm::cos(self.lan) * libm::cos(self.argpe)
            - libm::sin(self.lan) * libm::sin(self.argpe) * libm::cos(self.i);
        let m12 = -libm::cos(self.lan) * libm::sin(self.argpe)
            - libm::sin(self.lan) * libm::cos(self.argpe) * libm::cos(self.i);
        let m13 = libm::sin(self.lan) * libm::sin(self.i);
        let m21 = libm::sin(self.lan) * libm::cos(self.argpe)
            + libm::cos(self.lan) * libm::sin(self.argpe) * libm::cos(self.i);
        let m22 = -libm::sin(self.lan) * libm::sin(self.argpe)
            + libm::cos(self.lan) * libm::cos(self.argpe) * libm::cos(self.i);
        let m23 = -libm::cos(self.lan) * libm::sin(self.i);
        let m31 = libm::sin(self.argpe) * libm::sin(self.i);
        let m32 = libm::cos(self.argpe) * libm::sin(self.i);
        let m33 = libm::cos(self.i);

        Matrix3::new(m11, m12, m13, m21, m22, m23, m31, m32, m33)
    }

    /// Calculate the parent-centered position and velocity at an
    /// orbit's current true anomaly.
    pub fn sv(&self, mu: f64) -> StateVector {
        let (rv, vv) = self.sv_pqw(mu);
        let mat = self.pqw_ijk_matrix();
        StateVector {
            mu,
            position: mat * rv,
            velocity: mat * vv,
            time: self.epoch,
        }
    }

    /// Sample the orbit track at `points` true anomalies.
    ///
    /// Closed orbits are sampled over a full revolution starting at
    /// periapsis. Open orbits are sampled symmetrically between the
    /// asymptotes, stopping just short of them.
    pub fn track(&self, points: usize) -> Vec<Vector3<f64>> {
        let mat = self.pqw_ijk_matrix();
        let (ta0, span) = if self.e < 1.0 {
            (0.0, 2.0 * consts::PI)
        } else {
            let ta_max = 0.98 * libm::acos(-1.0 / self.e);
            (-ta_max, 2.0 * ta_max)
        };
        let step = if self.e < 1.0 || points < 2 {
            span / points.max(1) as f64
        } else {
            span / (points - 1) as f64
        };
        (0..points)
            .map(|k| {
                let ta = ta0 + step * k as f64;
                let r = self.p / (1.0 + self.e * libm::cos(ta));
                mat * Vector3::new(r * libm::cos(ta), r * libm::sin(ta), 0.0)
            })
            .collect()
    }
}

/// Position and velocity relative to a parent body with gravitational
/// parameter `mu` (`km^3/s^2`).
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateVector {
    pub mu: f64,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub time: Epoch,
}

impl StateVector {
    /// Convert this state vector into an [`Orbit`].
    ///
    /// Recommended tolerance (`tol`): [`ELEMENTS_TOL`].
    pub fn into_orbit(self, tol: f64) -> Orbit {
        let rv = self.position;
        let r = rv.norm();
        let vv = self.velocity;
        let v = vv.norm();
        let hv = rv.cross(&vv);
        let h = hv.norm();
        let nv = Vector3::new(0.0, 0.0, 1.0).cross(&hv);
        let ev = 1.0 / self.mu * ((v.powi(2) - self.mu / r) * rv - rv.dot(&vv) * vv);
        let p = h.powi(2) / self.mu;
        let e = ev.norm();
        let i = libm::acos(hv[2] / h);

        let circular = e < tol;
        let equatorial = i.abs() < tol;

        let (lan, argpe, ta) = if equatorial && !circular {
            (
                0.0,
                // Longitude of periapsis
                libm::atan2(ev[1], ev[0]) % (2.0 * consts::PI),
                libm::atan2(hv.dot(&ev.cross(&rv)) / h, rv.dot(&ev)),
            )
        } else if !equatorial && circular {
            (
                libm::atan2(nv[1], nv[0]) % (2.0 * consts::PI),
                0.0,
                // Argument of latitude
                libm::atan2(rv.dot(&hv.cross(&nv)) / h, rv.dot(&nv)),
            )
        } else if equatorial && circular {
            (
                0.0,
                0.0,
                // True longitude
                libm::atan2(rv[1], rv[0]) % (2.0 * consts::PI),
            )
        } else {
            let a = p / (1.0 - e.powi(2));
            let mua = self.mu * a;

            let ta = if a > 0.0 {
                let e_se = rv.dot(&vv) / libm::sqrt(mua);
                let e_ce = r * vv.dot(&vv) / self.mu - 1.0;
                e_to_ta(libm::atan2(e_se, e_ce), e)
            } else {
                let e_sh = rv.dot(&vv) / libm::sqrt(-mua);
                let e_ch = r * vv.norm_squared() / self.mu - 1.0;
                f_to_ta(libm::log((e_ch + e_sh) / (e_ch - e_sh)) / 2.0, e)
            };

            let lan = libm::atan2(nv[1], nv[0]) % (2.0 * consts::PI);
            let px = rv.dot(&nv);
            let py = (rv.dot(&hv.cross(&nv))) / h;
            let argpe = (libm::atan2(py, px) - ta) % (2.0 * consts::PI);

            (lan, argpe, ta)
        };

        Orbit {
            p,
            e,
            i,
            lan,
            argpe,
            epoch: self.time,
            ta: wrap_angle(ta),
        }
    }

    /// Propagate this state `delta_t` along its two-body orbit using the
    /// universal variable formulation.
    ///
    /// Recommended tolerance: `tol = PROPAGATE_TOL`, `maxiter =
    /// PROPAGATE_MAXITER`. The tolerance is relative to the magnitude of
    /// the universal anomaly, so it holds for planetary as well as
    /// lunar distances.
    pub fn propagate(
        &self,
        delta_t: Duration,
        tol: f64,
        maxiter: u64,
    ) -> Result<StateVector, ConvergenceError> {
        if delta_t.is_zero() {
            return Ok(*self);
        }
        let mut dt = delta_t.as_seconds_f64();
        let norm_r0 = self.position.norm();
        let sqrt_mu = libm::sqrt(self.mu);
        let dot_r0v0 = self.position.dot(&self.velocity);
        let alpha = -self.velocity.norm_squared() / self.mu + 2.0 / norm_r0;
        // alpha has units of 1/km; scaled by r0 it is dimensionless.
        let shape = alpha * norm_r0;

        let mut xn_new = if shape > 1e-6 {
            // Whole revolutions leave the state unchanged.
            let period = 2.0 * consts::PI / (sqrt_mu * alpha.powf(1.5));
            dt %= period;
            sqrt_mu * dt * alpha
        } else if shape.abs() <= 1e-6 {
            let h = self.position.cross(&self.velocity);
            let p = h.norm_squared() / self.mu;
            let s = libm::atan2(1.0, 3.0 * dt * libm::sqrt(self.mu / p.powi(3)));
            let w = libm::atan(libm::cbrt(libm::tan(s)));
            libm::sqrt(p) * 2.0 / libm::tan(2.0 * w)
        } else {
            let a = 1.0 / alpha;
            dt.signum()
                * libm::sqrt(-a)
                * libm::log(
                    (-2.0 * self.mu * alpha * dt)
                        / (dot_r0v0
                            + dt.signum() * libm::sqrt(-self.mu * a) * (1.0 - norm_r0 * alpha)),
                )
        };

        let mut xn = f64::NAN;
        let mut c2 = f64::NAN;
        let mut c3 = f64::NAN;
        let mut r = f64::NAN;
        let mut psi = f64::NAN;
        let mut iter = 0;
        while iter < maxiter {
            xn = xn_new;
            psi = xn.powi(2) * alpha;
            (c2, c3) = calc_c2c3(psi);
            r = xn * xn * c2
                + dot_r0v0 / sqrt_mu * xn * (1.0 - psi * c3)
                + norm_r0 * (1.0 - psi * c2);
            xn_new = xn
                + (sqrt_mu * dt
                    - xn * xn * xn * c3
                    - dot_r0v0 / sqrt_mu * xn * xn * c2
                    - norm_r0 * xn * (1.0 - psi * c3))
                    / r;

            if (xn_new - xn).abs() < tol * xn_new.abs().max(1.0) {
                break;
            }

            iter += 1;
        }
        if iter == maxiter || !xn_new.is_finite() {
            return Err(ConvergenceError { iter });
        }

        let f = 1.0 - xn.powi(2) / norm_r0 * c2;
        let g = dt - xn.powi(3) / sqrt_mu * c3;

        let gdot = 1.0 - xn.powi(2) / r * c2;
        let fdot = sqrt_mu / (r * norm_r0) * xn * (psi * c3 - 1.0);

        Ok(StateVector {
            mu: self.mu,
            position: f * self.position + g * self.velocity,
            velocity: fdot * self.position + gdot * self.velocity,
            time: self.time + delta_t,
        })
    }

    pub fn propagate_to(
        &self,
        epoch: Epoch,
        tol: f64,
        maxiter: u64,
    ) -> Result<StateVector, ConvergenceError> {
        self.propagate(epoch - self.time, tol, maxiter)
    }
}

/// Mean orbital elements at J2000 with linear rates per Julian century,
/// in the form of JPL's "Keplerian elements for approximate positions of
/// the major planets". Distances in km, angles in degrees.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MeanElements {
    pub a: f64,
    pub a_rate: f64,
    pub e: f64,
    pub e_rate: f64,
    pub i: f64,
    pub i_rate: f64,
    /// Mean longitude.
    pub mean_lon: f64,
    pub mean_lon_rate: f64,
    /// Longitude of periapsis.
    pub lon_peri: f64,
    pub lon_peri_rate: f64,
    /// Longitude of the ascending node.
    pub lan: f64,
    pub lan_rate: f64,
}

impl MeanElements {
    /// Osculating orbit at `epoch`.
    pub fn orbit_at(
        &self,
        epoch: Epoch,
        tol: f64,
        maxiter: u64,
    ) -> Result<Orbit, ConvergenceError> {
        let t = epoch.julian_centuries();
        let a = self.a + self.a_rate * t;
        let e = (self.e + self.e_rate * t).clamp(0.0, 0.999_999);
        let i = (self.i + self.i_rate * t).to_radians();
        let mean_lon = (self.mean_lon + self.mean_lon_rate * t).to_radians();
        let lon_peri = (self.lon_peri + self.lon_peri_rate * t).to_radians();
        let lan = (self.lan + self.lan_rate * t).to_radians();

        let ma = wrap_angle(mean_lon - lon_peri);
        let ta = ma_to_ta(ma, e, tol, maxiter)?;
        Ok(Orbit {
            p: a * (1.0 - e.powi(2)),
            e,
            i,
            lan: wrap_angle(lan),
            argpe: wrap_angle(lon_peri - lan),
            epoch,
            ta,
        })
    }
}

fn e_to_ta(e: f64, ecc: f64) -> f64 {
    2.0 * libm::atan(libm::sqrt((1.0 + ecc) / (1.0 - ecc)) * libm::tan(e / 2.0))
}

fn f_to_ta(f: f64, ecc: f64) -> f64 {
    2.0 * libm::atan(libm::sqrt((ecc + 1.0) / (ecc - 1.0)) * libm::tanh(f / 2.0))
}

fn calc_c2c3(psi: f64) -> (f64, f64) {
    if psi > 1e-6 {
        let c2 = (1.0 - libm::cos(libm::sqrt(psi))) / psi;
        let c3 = (libm::sqrt(psi) - libm::sin(libm::sqrt(psi))) / (psi * libm::sqrt(psi));
        (c2, c3)
    } else if psi < -1e-6 {
        let c2 = (1.0 - libm::cosh(libm::sqrt(-psi))) / psi;
        let c3 = (libm::sinh(libm::sqrt(-psi)) - libm::sqrt(-psi)) / libm::sqrt((-psi).powi(3));
        (c2, c3)
    } else {
        (1.0 / 2.0, 1.0 / 6.0)
    }
}

/// Mean anomaly to true anomaly for closed orbits (`0 <= e < 1`).
pub fn ma_to_ta(ma: f64, e: f64, tol: f64, maxiter: u64) -> Result<f64, ConvergenceError> {
    let ea = ma_to_ea(ma, e, tol, maxiter)?;
    Ok(ea_to_ta(ea, e))
}

pub fn ea_to_ta(ea: f64, e: f64) -> f64 {
    let beta = e / (1.0 + libm::sqrt(1.0 - e.powi(2)));
    ea + 2.0 * libm::atan2(beta * libm::sin(ea), 1.0 - beta * libm::cos(ea))
}

/// Solve Kepler's equation for the eccentric anomaly by Newton's method.
pub fn ma_to_ea(ma: f64, e: f64, tol: f64, maxiter: u64) -> Result<f64, ConvergenceError> {
    let mut ea_new = if -consts::PI < ma && ma < 0.0 || ma > consts::PI {
        ma - e
    } else {
        ma + e
    };

    let mut ea;
    let mut iter = 0;
    while iter < maxiter {
        ea = ea_new;
        ea_new = ea + (ma - ea + e * libm::sin(ea)) / (1.0 - e * libm::cos(ea));

        if (ea_new - ea).abs() < tol {
            return Ok(ea_new);
        }

        iter += 1;
    }
    Err(ConvergenceError { iter })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MU_EARTH: f64 = 398_600.4418;

    fn leo() -> StateVector {
        let r = 7000.0;
        StateVector {
            mu: MU_EARTH,
            position: Vector3::new(r, 0.0, 0.0),
            velocity: Vector3::new(0.0, libm::sqrt(MU_EARTH / r), 0.0),
            time: Epoch::J2000,
        }
    }

    #[test]
    fn circular_half_period_lands_opposite() {
        let sv = leo();
        let period = sv.into_orbit(ELEMENTS_TOL).period(MU_EARTH).unwrap();
        let half = sv
            .propagate(Duration::seconds_f64(period / 2.0), PROPAGATE_TOL, PROPAGATE_MAXITER)
            .unwrap();
        assert!((half.position + sv.position).norm() < 1e-3);
        assert!((half.velocity + sv.velocity).norm() < 1e-6);
        assert_eq!(half.time, sv.time + Duration::seconds_f64(period / 2.0));
    }

    #[test]
    fn propagation_over_many_revolutions_is_periodic() {
        let sv = leo();
        let period = sv.into_orbit(ELEMENTS_TOL).period(MU_EARTH).unwrap();
        let later = sv
            .propagate(
                Duration::seconds_f64(250.0 * period + 60.0),
                PROPAGATE_TOL,
                PROPAGATE_MAXITER,
            )
            .unwrap();
        let direct = sv
            .propagate(Duration::seconds_f64(60.0), PROPAGATE_TOL, PROPAGATE_MAXITER)
            .unwrap();
        assert!((later.position - direct.position).norm() < 1e-2);
    }

    #[test]
    fn backward_propagation_inverts_forward() {
        let sv = Orbit {
            p: 10_000.0 * (1.0 - 0.3f64.powi(2)),
            e: 0.3,
            i: 0.4,
            lan: 1.0,
            argpe: 0.5,
            epoch: Epoch::J2000,
            ta: 0.2,
        }
        .sv(MU_EARTH);
        let fwd = sv
            .propagate(Duration::seconds(3_600), PROPAGATE_TOL, PROPAGATE_MAXITER)
            .unwrap();
        let back = fwd
            .propagate(Duration::seconds(-3_600), PROPAGATE_TOL, PROPAGATE_MAXITER)
            .unwrap();
        assert!((back.position - sv.position).norm() < 1e-5);
        assert_eq!(back.time, sv.time);
    }

    #[test]
    fn elements_recovered_from_state() {
        let orbit = Orbit {
            p: 12_000.0,
            e: 0.2,
            i: 0.7,
            lan: 2.0,
            argpe: 1.1,
            epoch: Epoch::J2000,
            ta: 0.9,
        };
        let back = orbit.sv(MU_EARTH).into_orbit(ELEMENTS_TOL);
        assert!((back.p - orbit.p).abs() < 1e-6);
        assert!((back.e - orbit.e).abs() < 1e-9);
        assert!((back.i - orbit.i).abs() < 1e-9);
        assert!((back.lan - orbit.lan).abs() < 1e-9);
        assert!((back.argpe - orbit.argpe).abs() < 1e-9);
        assert!((back.ta - orbit.ta).abs() < 1e-9);
    }

    #[test]
    fn kepler_solver_handles_circular_and_eccentric() {
        assert!((ma_to_ta(1.0, 0.0, 1e-12, 50).unwrap() - 1.0).abs() < 1e-12);
        let ea = ma_to_ea(2.0, 0.6, 1e-12, 50).unwrap();
        assert!((ea - 0.6 * ea.sin() - 2.0).abs() < 1e-10);
    }

    #[test]
    fn track_is_closed_ellipse() {
        let orbit = Orbit {
            p: 8_000.0,
            e: 0.1,
            i: 0.0,
            lan: 0.0,
            argpe: 0.0,
            epoch: Epoch::J2000,
            ta: 0.0,
        };
        let track = orbit.track(360);
        assert_eq!(track.len(), 360);
        assert!((track[0].norm() - orbit.periapsis_radius()).abs() < 1e-9);
        assert!((track[180].norm() - orbit.apoapsis_radius()).abs() < 1e-6);
    }
}
