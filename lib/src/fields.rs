//! Per-body data groups exposed to consumers.
//!
//! Every field a consumer can ask a [`SimSystem`] for is a [`FieldKind`];
//! [`field`] is the single place that maps a kind to its value.
//!
//! [`SimSystem`]: crate::system::SimSystem

use std::{fmt, str::FromStr, sync::Arc};

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::{
    bodies::{BodyType, Orientation, Plane, Radii},
    error::{Error, Result},
    kepler::orbits::Orbit,
    simbody::SimBody,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    /// Static and hierarchy attributes.
    Attributes,
    /// Position in the primary's frame.
    Position,
    /// Velocity in the primary's frame.
    Velocity,
    Orientation,
    /// Orbit track in the primary's frame.
    Track,
    /// Classical orbital elements.
    Classical,
    /// Perifocal position and velocity.
    Pqw,
    /// Parent-relative position and velocity.
    Rv,
}

impl FieldKind {
    pub const ALL: [FieldKind; 8] = [
        FieldKind::Attributes,
        FieldKind::Position,
        FieldKind::Velocity,
        FieldKind::Orientation,
        FieldKind::Track,
        FieldKind::Classical,
        FieldKind::Pqw,
        FieldKind::Rv,
    ];

    pub fn key(self) -> &'static str {
        match self {
            FieldKind::Attributes => "attr",
            FieldKind::Position => "pos",
            FieldKind::Velocity => "vel",
            FieldKind::Orientation => "rot",
            FieldKind::Track => "track",
            FieldKind::Classical => "elem_coe",
            FieldKind::Pqw => "elem_pqw",
            FieldKind::Rv => "elem_rv",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for FieldKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        FieldKind::ALL
            .into_iter()
            .find(|kind| kind.key() == s)
            .ok_or_else(|| Error::UnknownField(s.to_owned()))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Attributes {
    pub name: Arc<str>,
    pub parent: Option<Arc<str>>,
    pub body_type: BodyType,
    pub plane: Plane,
    pub is_primary: bool,
    pub radii: Radii,
    pub mu: f64,
    pub orbital_period: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Attributes(Attributes),
    Position(Vector3<f64>),
    Velocity(Vector3<f64>),
    Orientation(Orientation),
    Track(Vec<Vector3<f64>>),
    Classical(Orbit),
    Pqw {
        position: Vector3<f64>,
        velocity: Vector3<f64>,
    },
    Rv {
        position: Vector3<f64>,
        velocity: Vector3<f64>,
    },
}

/// Look up `kind` for `bodies[index]`.
///
/// Orbital groups of a body without an orbit are [`Error::NoOrbit`]; the
/// track of such a body is empty.
pub fn field(bodies: &[SimBody], index: usize, kind: FieldKind) -> Result<FieldValue> {
    let body = &bodies[index];
    let no_orbit = || Error::NoOrbit(body.name().clone());
    Ok(match kind {
        FieldKind::Attributes => {
            let record = body.record();
            FieldValue::Attributes(Attributes {
                name: record.name.clone(),
                parent: body.parent().map(|p| p.name.clone()),
                body_type: body.body_type(),
                plane: body.plane(),
                is_primary: body.is_primary(),
                radii: body.radii(),
                mu: record.mu,
                orbital_period: record.orbital_period,
            })
        }
        FieldKind::Position => FieldValue::Position(body.position_in_primary(bodies)),
        FieldKind::Velocity => FieldValue::Velocity(body.velocity_in_primary(bodies)),
        FieldKind::Orientation => FieldValue::Orientation(body.orientation()),
        FieldKind::Track => FieldValue::Track(track_in_primary(bodies, index)),
        FieldKind::Classical => FieldValue::Classical(body.elements().ok_or_else(no_orbit)?),
        FieldKind::Pqw => {
            let sv = body.orbit().ok_or_else(no_orbit)?;
            let (position, velocity) = body.elements().ok_or_else(no_orbit)?.sv_pqw(sv.mu);
            FieldValue::Pqw { position, velocity }
        }
        FieldKind::Rv => {
            let sv = body.orbit().ok_or_else(no_orbit)?;
            FieldValue::Rv {
                position: sv.position,
                velocity: sv.velocity,
            }
        }
    })
}

/// The body's track offset by its parent's current position.
pub fn track_in_primary(bodies: &[SimBody], index: usize) -> Vec<Vector3<f64>> {
    let body = &bodies[index];
    let origin = body
        .parent()
        .map_or_else(Vector3::zeros, |p| bodies[p.index].position_in_primary(bodies));
    body.track()
        .map(|track| track.iter().map(|p| p + origin).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_parse_back() {
        for kind in FieldKind::ALL {
            assert_eq!(kind.key().parse::<FieldKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_key() {
        assert!(matches!(
            "colour".parse::<FieldKind>(),
            Err(Error::UnknownField(k)) if k == "colour"
        ));
    }
}
