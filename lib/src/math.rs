//! Math utilities.
use std::f64::consts;

use nalgebra::Vector3;

/// Wrap an angle into `(-π, π]`.
pub fn wrap_angle(x: f64) -> f64 {
    let y = (x + consts::PI).rem_euclid(2.0 * consts::PI) - consts::PI;
    if y == -consts::PI {
        consts::PI
    } else {
        y
    }
}

/// One segment of a cubic Hermite spline between `(x1, y1)` and `(x2, y2)`
/// with end tangents `yp1`, `yp2`, evaluated at `x`.
///
/// Returns the value and its derivative.
#[allow(clippy::too_many_arguments)]
pub fn hermite(x1: f64, y1: f64, yp1: f64, x2: f64, y2: f64, yp2: f64, x: f64) -> (f64, f64) {
    let dx = x2 - x1;
    let t = (x - x1) / dx;
    let t2 = t * t;
    let t3 = t2 * t;
    let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
    let h10 = t3 - 2.0 * t2 + t;
    let h01 = -2.0 * t3 + 3.0 * t2;
    let h11 = t3 - t2;
    let value = h00 * y1 + h10 * dx * yp1 + h01 * y2 + h11 * dx * yp2;

    let d00 = 6.0 * t2 - 6.0 * t;
    let d10 = 3.0 * t2 - 4.0 * t + 1.0;
    let d01 = -6.0 * t2 + 6.0 * t;
    let d11 = 3.0 * t2 - 2.0 * t;
    let slope = (d00 * y1 + d01 * y2) / dx + d10 * yp1 + d11 * yp2;

    (value, slope)
}

/// Componentwise [`hermite`] for position samples whose tangents are the
/// sampled velocities. Returns interpolated position and velocity.
pub fn hermite3(
    t1: f64,
    (p1, v1): (&Vector3<f64>, &Vector3<f64>),
    t2: f64,
    (p2, v2): (&Vector3<f64>, &Vector3<f64>),
    t: f64,
) -> (Vector3<f64>, Vector3<f64>) {
    let mut pos = Vector3::zeros();
    let mut vel = Vector3::zeros();
    for k in 0..3 {
        (pos[k], vel[k]) = hermite(t1, p1[k], v1[k], t2, p2[k], v2[k], t);
    }
    (pos, vel)
}
