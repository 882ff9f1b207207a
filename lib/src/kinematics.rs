//! Pairwise relative kinematics.

use nalgebra::{DMatrix, Vector3};

/// Separations below this (`km`) are treated as coincident.
pub const DISTANCE_FLOOR: f64 = 1e-9;
/// Field of view reported for coincident positions (`rad`, one arcsecond).
pub const MIN_FOV: f64 = 4.848_136_811_095_36e-6;

/// Where a target sits as seen from an observer.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RelativePosition {
    /// Target minus observer.
    pub offset: Vector3<f64>,
    pub dist: f64,
    /// Full angle subtended by a sphere of the target's radius (`rad`).
    pub fov: f64,
}

/// Relative position of a sphere of `radius` at `target` seen from
/// `observer`. Coincident positions give `dist = 0` and [`MIN_FOV`].
pub fn relative_position(
    observer: &Vector3<f64>,
    target: &Vector3<f64>,
    radius: f64,
) -> RelativePosition {
    let offset = target - observer;
    let dist = offset.norm();
    if dist < DISTANCE_FLOOR {
        return RelativePosition {
            offset: Vector3::zeros(),
            dist: 0.0,
            fov: MIN_FOV,
        };
    }
    RelativePosition {
        offset,
        dist,
        fov: (2.0 * libm::atan(radius / dist)).max(MIN_FOV),
    }
}

/// Relative position/velocity of every ordered pair of bodies and the total
/// gravitational acceleration on each, indexed in the owning system's
/// sorted body order.
#[derive(Clone, Debug, PartialEq)]
pub struct RelativeKinematics {
    rel_pos: DMatrix<Vector3<f64>>,
    rel_vel: DMatrix<Vector3<f64>>,
    accel: Vec<Vector3<f64>>,
}

impl Default for RelativeKinematics {
    fn default() -> Self {
        Self::new(0)
    }
}

impl RelativeKinematics {
    pub fn new(n: usize) -> Self {
        Self {
            rel_pos: DMatrix::from_element(n, n, Vector3::zeros()),
            rel_vel: DMatrix::from_element(n, n, Vector3::zeros()),
            accel: vec![Vector3::zeros(); n],
        }
    }

    pub fn len(&self) -> usize {
        self.accel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accel.is_empty()
    }

    /// Position of `j` relative to `i`.
    pub fn rel_pos(&self, i: usize, j: usize) -> Vector3<f64> {
        self.rel_pos[(i, j)]
    }

    /// Velocity of `j` relative to `i`.
    pub fn rel_vel(&self, i: usize, j: usize) -> Vector3<f64> {
        self.rel_vel[(i, j)]
    }

    /// Total acceleration on `i` (`km/s^2`).
    pub fn accel(&self, i: usize) -> Vector3<f64> {
        self.accel[i]
    }

    pub fn accelerations(&self) -> &[Vector3<f64>] {
        &self.accel
    }

    /// Recompute everything from primary-frame positions, velocities and
    /// gravitational parameters.
    ///
    /// Pairs touching a `faulted` body keep their previous values, and a
    /// faulted body neither receives a new acceleration nor contributes to
    /// the others'.
    pub fn recompute(
        &mut self,
        pos: &[Vector3<f64>],
        vel: &[Vector3<f64>],
        mu: &[f64],
        faulted: &[bool],
    ) {
        let n = pos.len();
        assert!(vel.len() == n && mu.len() == n && faulted.len() == n);
        if self.len() != n {
            *self = Self::new(n);
        }

        for i in 0..n {
            if faulted[i] {
                continue;
            }
            let mut accel = Vector3::zeros();
            for j in 0..n {
                if faulted[j] {
                    continue;
                }
                let r = pos[j] - pos[i];
                self.rel_pos[(i, j)] = r;
                self.rel_vel[(i, j)] = vel[j] - vel[i];
                if i == j {
                    continue;
                }
                let d = r.norm();
                if d < DISTANCE_FLOOR {
                    continue;
                }
                accel += mu[j] / d.powi(3) * r;
            }
            self.accel[i] = accel;
        }
    }
}
