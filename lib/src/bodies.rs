//! Definitions of celestial bodies.

use std::{collections::BTreeMap, sync::Arc};

use nalgebra::{Rotation3, Vector3};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    kepler::orbits::{ConvergenceError, MeanElements},
    time::Epoch,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BodyType {
    Star,
    Planet,
    Moon,
    Ship,
}

/// The plane a body's parent-relative state is expressed in.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Plane {
    #[default]
    Ecliptic,
    /// The equator of the parent body, i.e. the ecliptic tilted about the
    /// vernal equinox direction by the parent's obliquity.
    ParentEquatorial,
}

impl Plane {
    /// Rotation taking vectors in this plane into the ecliptic frame.
    ///
    /// `parent_obliquity` is in radians.
    pub fn to_ecliptic(self, parent_obliquity: f64) -> Rotation3<f64> {
        match self {
            Plane::Ecliptic => Rotation3::identity(),
            Plane::ParentEquatorial => {
                Rotation3::from_axis_angle(&Vector3::x_axis(), -parent_obliquity)
            }
        }
    }
}

/// Body radii (`km`).
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Radii {
    pub mean: f64,
    pub equatorial: f64,
    pub polar: f64,
}

impl Radii {
    pub fn sphere(r: f64) -> Self {
        Self {
            mean: r,
            equatorial: r,
            polar: r,
        }
    }

    /// Missing mean or polar radius data.
    pub fn is_degenerate(&self) -> bool {
        self.mean == 0.0 || self.polar == 0.0
    }

    /// Collapse to a sphere of the largest known radius.
    #[must_use]
    pub fn collapsed(&self) -> Self {
        Self::sphere(self.mean.max(self.equatorial).max(self.polar))
    }
}

/// Right ascension and declination of the north pole and the prime
/// meridian angle (radians).
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub ra: f64,
    pub dec: f64,
    pub pm: f64,
}

/// Linear IAU rotation model. Pole angles in degrees with rates per Julian
/// century, prime meridian in degrees with rate per day.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RotationModel {
    pub ra0: f64,
    pub ra_rate: f64,
    pub dec0: f64,
    pub dec_rate: f64,
    pub pm0: f64,
    pub pm_rate: f64,
}

impl RotationModel {
    /// Orientation `days` (equivalently `centuries`) after J2000.
    pub fn orientation(&self, days: f64, centuries: f64) -> Orientation {
        Orientation {
            ra: (self.ra0 + self.ra_rate * centuries).to_radians(),
            dec: (self.dec0 + self.dec_rate * centuries).to_radians(),
            pm: (self.pm0 + self.pm_rate * days).rem_euclid(360.0).to_radians(),
        }
    }

    pub fn at(&self, epoch: Epoch) -> Orientation {
        self.orientation(epoch.julian_days(), epoch.julian_centuries())
    }
}

/// Static reference data for one celestial body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BodyRecord {
    pub name: Arc<str>,
    /// The name of the parent body of this body, if any.
    pub parent: Option<Arc<str>>,
    pub body_type: BodyType,
    #[serde(default)]
    pub plane: Plane,
    /// Standard gravitational parameter (`km^3/s^2`)
    pub mu: f64,
    pub radii: Radii,
    /// Sidereal orbital period (`sec`)
    #[serde(default)]
    pub orbital_period: Option<f64>,
    /// Tilt of the equator against the ecliptic (`deg`)
    #[serde(default)]
    pub obliquity: f64,
    pub rotation: RotationModel,
    /// Mean elements relative to the parent, ecliptic frame.
    #[serde(default)]
    pub elements: Option<MeanElements>,
}

impl BodyRecord {
    pub fn is_primary(&self) -> bool {
        self.parent.is_none()
    }

    /// Parent-relative position and velocity in the ecliptic frame from the
    /// catalog's mean-element model. Zero for bodies without elements.
    pub fn model_state(
        &self,
        parent_mu: f64,
        epoch: Epoch,
    ) -> Result<(Vector3<f64>, Vector3<f64>), ConvergenceError> {
        match &self.elements {
            Some(elements) => {
                let sv = elements.orbit_at(epoch, 1e-12, 50)?.sv(parent_mu);
                Ok((sv.position, sv.velocity))
            }
            None => Ok((Vector3::zeros(), Vector3::zeros())),
        }
    }
}

/// Read-only set of body records with a validated hierarchy: exactly one
/// primary, every parent known, every chain ending at the primary.
#[derive(Clone, Debug, PartialEq)]
pub struct BodyCatalog {
    bodies: BTreeMap<Arc<str>, Arc<BodyRecord>>,
    primary: Arc<str>,
}

impl BodyCatalog {
    pub fn new(records: impl IntoIterator<Item = BodyRecord>) -> Result<Self> {
        let mut bodies = BTreeMap::new();
        let mut primary: Option<Arc<str>> = None;
        for record in records {
            if record.is_primary() {
                if let Some(first) = &primary {
                    return Err(Error::MultiplePrimaries(first.clone(), record.name.clone()));
                }
                primary = Some(record.name.clone());
            }
            let name = record.name.clone();
            if bodies.insert(name.clone(), Arc::new(record)).is_some() {
                return Err(Error::DuplicateBody(name));
            }
        }
        let primary = primary.ok_or(Error::NoPrimary)?;

        for (name, record) in &bodies {
            let mut cur = record;
            let mut steps = 0;
            while let Some(parent) = &cur.parent {
                cur = bodies.get(parent).ok_or_else(|| Error::UnknownParent {
                    body: cur.name.clone(),
                    parent: parent.clone(),
                })?;
                steps += 1;
                if steps > bodies.len() {
                    return Err(Error::CyclicHierarchy(name.clone()));
                }
            }
        }

        Ok(Self { bodies, primary })
    }

    /// The built-in solar system.
    pub fn sol() -> Self {
        sol::catalog()
    }

    /// Load a catalog from a RON list of [`BodyRecord`]s.
    pub fn from_ron(s: &str) -> Result<Self> {
        let records: Vec<BodyRecord> = ron::from_str(s)?;
        Self::new(records)
    }

    /// Body names in sorted order.
    pub fn list_names(&self) -> Vec<Arc<str>> {
        self.bodies.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Result<&Arc<BodyRecord>> {
        self.bodies
            .get(name)
            .ok_or_else(|| Error::UnknownBody(name.into()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bodies.contains_key(name)
    }

    pub fn primary(&self) -> &Arc<BodyRecord> {
        &self.bodies[&self.primary]
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<BodyRecord>> {
        self.bodies.values()
    }

    /// Parent, grandparent, ... up to and including the primary.
    pub fn ancestors<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Arc<BodyRecord>> + 'a {
        let mut next = self.bodies.get(name).and_then(|b| b.parent.clone());
        std::iter::from_fn(move || {
            let record = self.bodies.get(next.as_deref()?)?;
            next = record.parent.clone();
            Some(record)
        })
    }

    /// Length of the longest parent chain.
    pub fn depth(&self) -> usize {
        self.bodies
            .keys()
            .map(|name| self.ancestors(name).count())
            .max()
            .unwrap_or(0)
    }
}

/// The Sun, the eight planets, the Moon and Pluto.
///
/// Planetary elements are JPL's approximate mean elements (valid
/// 1800-2050), the Earth entry standing in for the Earth-Moon barycenter.
/// Radii, GM and rotation models follow the IAU WGCCRE 2015 report with
/// periodic terms dropped.
pub mod sol {
    use std::sync::Arc;

    use super::{BodyCatalog, BodyRecord, BodyType, Plane, Radii, RotationModel};
    use crate::{kepler::orbits::MeanElements, time::SECONDS_PER_DAY};

    /// Astronomical unit (`km`)
    pub const AU: f64 = 149_597_870.7;

    pub const SUN: &str = "Sun";
    pub const EARTH: &str = "Earth";
    pub const MOON: &str = "Moon";

    #[allow(clippy::too_many_arguments)]
    fn elements(
        a: (f64, f64),
        e: (f64, f64),
        i: (f64, f64),
        mean_lon: (f64, f64),
        lon_peri: (f64, f64),
        lan: (f64, f64),
    ) -> MeanElements {
        MeanElements {
            a: a.0 * AU,
            a_rate: a.1 * AU,
            e: e.0,
            e_rate: e.1,
            i: i.0,
            i_rate: i.1,
            mean_lon: mean_lon.0,
            mean_lon_rate: mean_lon.1,
            lon_peri: lon_peri.0,
            lon_peri_rate: lon_peri.1,
            lan: lan.0,
            lan_rate: lan.1,
        }
    }

    fn rotation(ra: (f64, f64), dec: (f64, f64), pm: (f64, f64)) -> RotationModel {
        RotationModel {
            ra0: ra.0,
            ra_rate: ra.1,
            dec0: dec.0,
            dec_rate: dec.1,
            pm0: pm.0,
            pm_rate: pm.1,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn body(
        name: &str,
        parent: Option<&str>,
        body_type: BodyType,
        mu: f64,
        (mean, equatorial, polar): (f64, f64, f64),
        period_days: Option<f64>,
        obliquity: f64,
        rotation: RotationModel,
        elements: Option<MeanElements>,
    ) -> BodyRecord {
        BodyRecord {
            name: Arc::from(name),
            parent: parent.map(Arc::from),
            body_type,
            plane: Plane::Ecliptic,
            mu,
            radii: Radii {
                mean,
                equatorial,
                polar,
            },
            orbital_period: period_days.map(|d| d * SECONDS_PER_DAY),
            obliquity,
            rotation,
            elements,
        }
    }

    pub fn records() -> Vec<BodyRecord> {
        use BodyType::{Moon, Planet, Star};
        vec![
            body(
                SUN,
                None,
                Star,
                1.327_124_400_18e11,
                (695_700.0, 695_700.0, 695_700.0),
                None,
                7.25,
                rotation((286.13, 0.0), (63.87, 0.0), (84.176, 14.184_400_0)),
                None,
            ),
            body(
                "Mercury",
                Some(SUN),
                Planet,
                22_031.78,
                (2_439.4, 2_440.53, 2_438.26),
                Some(87.9691),
                0.034,
                rotation((281.0103, -0.0328), (61.4155, -0.0049), (329.5988, 6.138_510_8)),
                Some(elements(
                    (0.387_099_27, 0.000_000_37),
                    (0.205_635_93, 0.000_019_06),
                    (7.004_979_02, -0.005_947_49),
                    (252.250_323_50, 149_472.674_111_75),
                    (77.457_796_28, 0.160_476_89),
                    (48.330_765_93, -0.125_340_81),
                )),
            ),
            body(
                "Venus",
                Some(SUN),
                Planet,
                324_858.59,
                (6_051.8, 6_051.8, 6_051.8),
                Some(224.701),
                177.36,
                rotation((272.76, 0.0), (67.16, 0.0), (160.20, -1.481_368_8)),
                Some(elements(
                    (0.723_335_66, 0.000_003_90),
                    (0.006_776_72, -0.000_041_07),
                    (3.394_676_05, -0.000_788_90),
                    (181.979_099_50, 58_517.815_387_29),
                    (131.602_467_18, 0.002_683_29),
                    (76.679_842_55, -0.277_694_18),
                )),
            ),
            body(
                EARTH,
                Some(SUN),
                Planet,
                398_600.4418,
                (6_371.0084, 6_378.1366, 6_356.7519),
                Some(365.256_363_004),
                23.439_281_1,
                rotation((0.0, -0.641), (90.0, -0.557), (190.147, 360.985_623_5)),
                Some(elements(
                    (1.000_002_61, 0.000_005_62),
                    (0.016_711_23, -0.000_043_92),
                    (-0.000_015_31, -0.012_946_68),
                    (100.464_571_66, 35_999.372_449_81),
                    (102.937_681_93, 0.323_273_64),
                    (0.0, 0.0),
                )),
            ),
            body(
                MOON,
                Some(EARTH),
                Moon,
                4_902.800_066,
                (1_737.4, 1_738.1, 1_736.0),
                Some(27.321_661),
                6.687,
                rotation((269.9949, 0.0031), (66.5392, 0.0130), (38.3213, 13.176_358_15)),
                Some(MeanElements {
                    a: 384_400.0,
                    a_rate: 0.0,
                    e: 0.0549,
                    e_rate: 0.0,
                    i: 5.145,
                    i_rate: 0.0,
                    mean_lon: 218.316_447_7,
                    mean_lon_rate: 481_267.881_234_21,
                    lon_peri: 83.353_246_5,
                    lon_peri_rate: 4_069.013_728_7,
                    lan: 125.044_547_9,
                    lan_rate: -1_934.136_289_1,
                }),
            ),
            body(
                "Mars",
                Some(SUN),
                Planet,
                42_828.37,
                (3_389.5, 3_396.19, 3_376.2),
                Some(686.980),
                25.19,
                rotation((317.681_43, -0.1061), (52.886_50, -0.0609), (176.630, 350.891_982_26)),
                Some(elements(
                    (1.523_710_34, 0.000_018_47),
                    (0.093_394_10, 0.000_078_82),
                    (1.849_691_42, -0.008_131_31),
                    (-4.553_432_05, 19_140.302_684_99),
                    (-23.943_629_59, 0.444_410_88),
                    (49.559_538_91, -0.292_573_43),
                )),
            ),
            body(
                "Jupiter",
                Some(SUN),
                Planet,
                126_686_534.0,
                (69_911.0, 71_492.0, 66_854.0),
                Some(4_332.589),
                3.13,
                rotation((268.056_595, -0.006_499), (64.495_303, 0.002_413), (284.95, 870.536)),
                Some(elements(
                    (5.202_887_00, -0.000_116_07),
                    (0.048_386_24, -0.000_132_53),
                    (1.304_396_95, -0.001_837_14),
                    (34.396_440_51, 3_034.746_127_75),
                    (14.728_479_83, 0.212_526_68),
                    (100.473_909_09, 0.204_691_06),
                )),
            ),
            body(
                "Saturn",
                Some(SUN),
                Planet,
                37_931_187.0,
                (58_232.0, 60_268.0, 54_364.0),
                Some(10_759.22),
                26.73,
                rotation((40.589, -0.036), (83.537, -0.004), (38.90, 810.793_902_4)),
                Some(elements(
                    (9.536_675_94, -0.001_250_60),
                    (0.053_861_79, -0.000_509_91),
                    (2.485_991_87, 0.001_936_09),
                    (49.954_244_23, 1_222.493_622_01),
                    (92.598_878_31, -0.418_972_16),
                    (113.662_424_48, -0.288_677_94),
                )),
            ),
            body(
                "Uranus",
                Some(SUN),
                Planet,
                5_793_939.0,
                (25_362.0, 25_559.0, 24_973.0),
                Some(30_685.4),
                97.77,
                rotation((257.311, 0.0), (-15.175, 0.0), (203.81, -501.160_092_8)),
                Some(elements(
                    (19.189_164_64, -0.001_961_76),
                    (0.047_257_44, -0.000_043_97),
                    (0.772_637_83, -0.002_429_39),
                    (313.238_104_51, 428.482_027_85),
                    (170.954_276_30, 0.408_052_81),
                    (74.016_925_03, 0.042_405_89),
                )),
            ),
            body(
                "Neptune",
                Some(SUN),
                Planet,
                6_836_529.0,
                (24_622.0, 24_764.0, 24_341.0),
                Some(60_189.0),
                28.32,
                rotation((299.36, 0.0), (43.46, 0.0), (249.978, 541.139_775_7)),
                Some(elements(
                    (30.069_922_76, 0.000_262_91),
                    (0.008_590_48, 0.000_051_05),
                    (1.770_043_47, 0.000_353_72),
                    (-55.120_029_69, 218.459_453_25),
                    (44.964_762_27, -0.322_414_64),
                    (131.784_225_74, -0.005_086_64),
                )),
            ),
            body(
                "Pluto",
                Some(SUN),
                Planet,
                869.6,
                (1_188.3, 1_188.3, 1_188.3),
                Some(90_560.0),
                122.53,
                rotation((132.993, 0.0), (-6.163, 0.0), (302.695, 56.362_522_5)),
                Some(elements(
                    (39.482_116_75, -0.000_315_96),
                    (0.248_827_30, 0.000_051_70),
                    (17.140_012_06, 0.000_048_18),
                    (238.929_038_33, 145.207_805_15),
                    (224.068_916_29, -0.040_629_42),
                    (110.303_936_84, -0.011_834_82),
                )),
            ),
        ]
    }

    pub fn catalog() -> BodyCatalog {
        let records = records();
        let mut bodies = std::collections::BTreeMap::new();
        for record in records {
            bodies.insert(record.name.clone(), Arc::new(record));
        }
        BodyCatalog {
            bodies,
            primary: Arc::from(SUN),
        }
    }
}
