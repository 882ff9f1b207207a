//! The set of simulated bodies and the per-epoch update cycle.

use std::{
    collections::{BTreeSet, HashMap},
    str::FromStr,
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc,
    },
    time::{Duration as StdDuration, Instant},
};

use itertools::Itertools;
use nalgebra::Vector3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::{
    bodies::{sol, BodyCatalog, BodyRecord, BodyType, Orientation, Plane, Radii},
    clock::{SimulationClock, TimeWarp},
    config::SimConfig,
    error::{Error, Result},
    fields::{self, FieldKind, FieldValue},
    kinematics::RelativeKinematics,
    simbody::{ParentLink, SimBody, WindowParams},
    time::Epoch,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionMode {
    Sequential,
    /// One rayon task per body, joined before aggregation.
    Parallel,
}

/// A body whose update failed during a cycle. The body keeps its last
/// good state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BodyFault {
    pub body: Arc<str>,
    pub epoch: Epoch,
    pub error: String,
}

/// Published to observers after every completed update cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct UpdateReport {
    pub epoch: Epoch,
    pub duration: StdDuration,
    pub faults: Vec<BodyFault>,
}

/// What a renderer needs to draw one body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BodyView {
    pub name: Arc<str>,
    pub parent: Option<Arc<str>>,
    pub is_primary: bool,
    pub position: Vector3<f64>,
    pub orientation: Orientation,
    pub track: Vec<Vector3<f64>>,
    pub radii: Radii,
}

/// Owns every [`SimBody`], keyed by name and kept in sorted-name order;
/// that order indexes the relative kinematics.
#[derive(Debug)]
pub struct SimSystem {
    catalog: Arc<BodyCatalog>,
    params: WindowParams,
    mode: ExecutionMode,
    pool: Option<rayon::ThreadPool>,
    epoch: Epoch,
    bodies: Vec<SimBody>,
    index: HashMap<Arc<str>, usize>,
    primary: usize,
    kinematics: RelativeKinematics,
    faults: Vec<BodyFault>,
    observers: Vec<Sender<UpdateReport>>,
}

impl SimSystem {
    /// Build a system from `config` and load its bodies.
    pub fn new(catalog: Arc<BodyCatalog>, config: &SimConfig) -> Result<Self> {
        config.validate()?;
        let mode = if config.use_multiprocessing {
            ExecutionMode::Parallel
        } else {
            ExecutionMode::Sequential
        };
        let pool = match (mode, config.worker_threads) {
            (ExecutionMode::Parallel, Some(n)) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .thread_name(|i| format!("solsys-body-{i}"))
                    .build()
                    .map_err(|e| Error::InvalidConfig(e.to_string()))?,
            ),
            _ => None,
        };

        let mut system = Self {
            params: WindowParams {
                periods: config.periods_per_window,
                spacing: config.window_spacing()?,
                track_points: config.track_points,
            },
            mode,
            pool,
            epoch: config.epoch0()?,
            bodies: Vec::new(),
            index: HashMap::new(),
            primary: 0,
            kinematics: RelativeKinematics::default(),
            faults: Vec::new(),
            observers: Vec::new(),
            catalog,
        };
        match &config.body_names {
            Some(names) => system.load_from_names(names)?,
            None => {
                let names = system.catalog.list_names();
                system.load_from_names(&names)?;
            }
        }
        Ok(system)
    }

    /// Replace every body with fresh ones for `names` at the current epoch.
    ///
    /// Names missing from the catalog are dropped. Ancestors of requested
    /// bodies are loaded too, so every parent chain reaches the primary.
    pub fn load_from_names<S: AsRef<str>>(&mut self, names: &[S]) -> Result<()> {
        let catalog = Arc::clone(&self.catalog);

        let mut wanted = BTreeSet::new();
        for name in names {
            let name = name.as_ref();
            let Ok(record) = catalog.get(name) else {
                debug!("dropping {name}: not in the catalog");
                continue;
            };
            wanted.insert(record.name.clone());
            for ancestor in catalog.ancestors(name) {
                if wanted.insert(ancestor.name.clone()) {
                    debug!("loading {} as an ancestor of {name}", ancestor.name);
                }
            }
        }
        if wanted.is_empty() {
            return Err(Error::EmptyBodySet);
        }

        let records: Vec<&Arc<BodyRecord>> = wanted
            .iter()
            .map(|name| catalog.get(name))
            .collect::<Result<_>>()?;
        let index: HashMap<Arc<str>, usize> = wanted
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        let primary = records
            .iter()
            .position(|r| r.is_primary())
            .ok_or(Error::NoPrimary)?;

        let bodies = records
            .iter()
            .map(|record| {
                let body_type = classify(&catalog, record);
                let plane = reference_plane(record, body_type);
                let parent = record.parent.as_ref().map(|name| {
                    let i = index[name];
                    ParentLink {
                        index: i,
                        name: name.clone(),
                        mu: records[i].mu,
                        obliquity: records[i].obliquity.to_radians(),
                    }
                });
                SimBody::new(
                    Arc::clone(record),
                    parent,
                    body_type,
                    plane,
                    self.epoch,
                    self.params,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            "loaded {} bodies at {}: {}",
            bodies.len(),
            self.epoch,
            wanted.iter().join(", ")
        );
        self.kinematics = RelativeKinematics::new(bodies.len());
        self.bodies = bodies;
        self.index = index;
        self.primary = primary;
        self.faults.clear();
        self.update_state(None);
        Ok(())
    }

    /// Advance every body to `epoch` (or re-evaluate at the current epoch
    /// when `None`), then recompute the relative kinematics and notify
    /// observers.
    ///
    /// A body that fails to update is reported as a fault and keeps its
    /// previous state; the rest of the system still advances.
    pub fn update_state(&mut self, epoch: Option<Epoch>) -> UpdateReport {
        let start = Instant::now();
        if let Some(epoch) = epoch {
            self.epoch = epoch;
        }
        let epoch = self.epoch;

        let results: Vec<Result<()>> = match self.mode {
            ExecutionMode::Sequential => self
                .bodies
                .iter_mut()
                .map(|body| body.update_state(epoch))
                .collect(),
            ExecutionMode::Parallel => {
                let bodies = &mut self.bodies;
                let mut run = || -> Vec<Result<()>> {
                    bodies
                        .par_iter_mut()
                        .map(|body| body.update_state(epoch))
                        .collect()
                };
                match &self.pool {
                    Some(pool) => pool.install(run),
                    None => run(),
                }
            }
        };

        self.faults.clear();
        let mut faulted = vec![false; self.bodies.len()];
        for (i, result) in results.into_iter().enumerate() {
            if let Err(e) = result {
                warn!("{} failed to update to {}: {}", self.bodies[i].name(), epoch, e);
                faulted[i] = true;
                self.faults.push(BodyFault {
                    body: self.bodies[i].name().clone(),
                    epoch,
                    error: e.to_string(),
                });
            }
        }

        let pos: Vec<_> = self
            .bodies
            .iter()
            .map(|b| b.position_in_primary(&self.bodies))
            .collect();
        let vel: Vec<_> = self
            .bodies
            .iter()
            .map(|b| b.velocity_in_primary(&self.bodies))
            .collect();
        let mu: Vec<_> = self.bodies.iter().map(SimBody::mu).collect();
        self.kinematics.recompute(&pos, &vel, &mu, &faulted);

        let report = UpdateReport {
            epoch,
            duration: start.elapsed(),
            faults: self.faults.clone(),
        };
        trace!(
            "updated {} bodies to {} in {:?}",
            self.bodies.len(),
            epoch,
            report.duration
        );
        self.observers.retain(|tx| tx.send(report.clone()).is_ok());
        report
    }

    /// One clock tick: advance the epoch by the warped wall time.
    pub fn advance<C: SimulationClock>(
        &mut self,
        warp: &mut TimeWarp<C>,
    ) -> Result<UpdateReport> {
        let epoch = warp.next_epoch(self.epoch)?;
        Ok(self.update_state(Some(epoch)))
    }

    /// Receive an [`UpdateReport`] after every update cycle. Dropping the
    /// receiver unsubscribes.
    pub fn subscribe(&mut self) -> Receiver<UpdateReport> {
        let (tx, rx) = mpsc::channel();
        self.observers.push(tx);
        rx
    }

    /// Look up one data group of a loaded body.
    pub fn data_group(&self, name: &str, kind: FieldKind) -> Result<FieldValue> {
        fields::field(&self.bodies, self.index_of(name)?, kind)
    }

    /// [`Self::data_group`] with a textual field key such as `"pos"`.
    pub fn data_group_by_key(&self, name: &str, key: &str) -> Result<FieldValue> {
        let index = self.index_of(name)?;
        fields::field(&self.bodies, index, FieldKind::from_str(key)?)
    }

    /// Per-body render data for the current epoch.
    pub fn frame(&self) -> Vec<BodyView> {
        self.bodies
            .iter()
            .enumerate()
            .map(|(i, body)| BodyView {
                name: body.name().clone(),
                parent: body.parent().map(|p| p.name.clone()),
                is_primary: body.is_primary(),
                position: body.position_in_primary(&self.bodies),
                orientation: body.orientation(),
                track: fields::track_in_primary(&self.bodies, i),
                radii: body.radii(),
            })
            .collect()
    }

    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownBody(name.into()))
    }

    pub fn body(&self, name: &str) -> Result<&SimBody> {
        Ok(&self.bodies[self.index_of(name)?])
    }

    /// Position of `name` in the primary's frame.
    pub fn position(&self, name: &str) -> Result<Vector3<f64>> {
        Ok(self.body(name)?.position_in_primary(&self.bodies))
    }

    /// Velocity of `name` in the primary's frame.
    pub fn velocity(&self, name: &str) -> Result<Vector3<f64>> {
        Ok(self.body(name)?.velocity_in_primary(&self.bodies))
    }

    pub fn bodies(&self) -> &[SimBody] {
        &self.bodies
    }

    /// Loaded body names in index order.
    pub fn names(&self) -> impl Iterator<Item = &Arc<str>> {
        self.bodies.iter().map(SimBody::name)
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn primary(&self) -> &SimBody {
        &self.bodies[self.primary]
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn catalog(&self) -> &Arc<BodyCatalog> {
        &self.catalog
    }

    /// Valid after a completed [`Self::update_state`].
    pub fn kinematics(&self) -> &RelativeKinematics {
        &self.kinematics
    }

    /// Faults recorded by the most recent update.
    pub fn faults(&self) -> &[BodyFault] {
        &self.faults
    }
}

/// Type from the parent chain: no parent is a star, a star's satellite a
/// planet, a planet's satellite a moon. Ships stay ships.
fn classify(catalog: &BodyCatalog, record: &BodyRecord) -> BodyType {
    if record.body_type == BodyType::Ship {
        return BodyType::Ship;
    }
    let Some(parent) = &record.parent else {
        return BodyType::Star;
    };
    match catalog.get(parent).map(|p| classify(catalog, p)) {
        Ok(BodyType::Star) => BodyType::Planet,
        Ok(BodyType::Planet) => BodyType::Moon,
        _ => record.body_type,
    }
}

/// The Moon of Earth is tracked in Earth's equatorial plane; everything
/// else uses its catalog plane.
fn reference_plane(record: &BodyRecord, body_type: BodyType) -> Plane {
    if body_type == BodyType::Moon && record.parent.as_deref() == Some(sol::EARTH) {
        Plane::ParentEquatorial
    } else {
        record.plane
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(names: &[&str]) -> SimConfig {
        SimConfig {
            body_names: Some(names.iter().map(|s| (*s).to_owned()).collect()),
            ..SimConfig::default()
        }
    }

    fn system(names: &[&str]) -> SimSystem {
        SimSystem::new(Arc::new(BodyCatalog::sol()), &config(names)).unwrap()
    }

    #[test]
    fn sun_earth_moon_hierarchy() {
        let sys = system(&["Sun", "Earth", "Moon"]);
        let sun = sys.body("Sun").unwrap();
        assert!(sun.parent().is_none());
        assert_eq!(sun.body_type(), BodyType::Star);
        assert_eq!(sys.primary().name(), sun.name());

        let earth = sys.body("Earth").unwrap();
        assert_eq!(earth.parent().map(|p| &*p.name), Some("Sun"));
        assert_eq!(earth.body_type(), BodyType::Planet);
        assert_eq!(earth.plane(), Plane::Ecliptic);

        let moon = sys.body("Moon").unwrap();
        assert_eq!(moon.parent().map(|p| &*p.name), Some("Earth"));
        assert_eq!(moon.body_type(), BodyType::Moon);
        assert_eq!(moon.plane(), Plane::ParentEquatorial);
    }

    #[test]
    fn unknown_names_are_dropped() {
        let sys = system(&["Sun", "Bogus"]);
        assert_eq!(sys.names().map(|n| &**n).collect::<Vec<_>>(), vec!["Sun"]);
        assert_eq!(sys.kinematics().len(), 1);
    }

    #[test]
    fn nothing_known_is_fatal() {
        let res = SimSystem::new(Arc::new(BodyCatalog::sol()), &config(&["Bogus"]));
        assert!(matches!(res, Err(Error::EmptyBodySet)));
    }

    #[test]
    fn ancestors_are_pulled_in() {
        let sys = system(&["Moon"]);
        assert_eq!(
            sys.names().map(|n| &**n).collect::<Vec<_>>(),
            vec!["Earth", "Moon", "Sun"]
        );
    }

    #[test]
    fn every_chain_ends_at_the_single_primary() {
        let sys = system(&[
            "Sun", "Mercury", "Venus", "Earth", "Moon", "Mars", "Jupiter", "Saturn", "Uranus",
            "Neptune", "Pluto",
        ]);
        let max_depth = sys.catalog().depth();
        assert_eq!(sys.bodies().iter().filter(|b| b.is_primary()).count(), 1);
        for body in sys.bodies() {
            let mut cur = body;
            let mut steps = 0;
            while let Some(parent) = cur.parent() {
                cur = &sys.bodies()[parent.index];
                steps += 1;
                assert!(steps <= max_depth);
            }
            assert!(cur.is_primary());
        }
    }

    #[test]
    fn positions_compose_through_parents() {
        let sys = system(&["Sun", "Earth", "Moon"]);
        let sun = sys.position("Sun").unwrap();
        let earth = sys.position("Earth").unwrap();
        let moon = sys.position("Moon").unwrap();
        assert_eq!(sun, sys.primary().rel_position());
        assert!((earth - (sys.body("Earth").unwrap().rel_position() + sun)).norm() < 1e-6);
        assert!((moon - (sys.body("Moon").unwrap().rel_position() + earth)).norm() < 1e-6);
        let d = (moon - earth).norm();
        assert!((356_000.0..407_000.0).contains(&d), "{d}");
    }

    #[test]
    fn reload_is_idempotent() {
        let mut sys = system(&["Sun", "Earth", "Moon", "Mars"]);
        let first = sys.frame();
        sys.load_from_names(&["Sun", "Earth", "Moon", "Mars"]).unwrap();
        assert_eq!(sys.frame(), first);
        assert_eq!(sys.len(), 4);
    }

    #[test]
    fn data_groups() {
        let sys = system(&["Sun", "Earth"]);
        assert!(matches!(
            sys.data_group("Moon", FieldKind::Position),
            Err(Error::UnknownBody(_))
        ));
        assert!(matches!(
            sys.data_group_by_key("Earth", "colour"),
            Err(Error::UnknownField(_))
        ));
        assert!(matches!(
            sys.data_group("Sun", FieldKind::Classical),
            Err(Error::NoOrbit(_))
        ));
        let Ok(FieldValue::Attributes(attr)) = sys.data_group_by_key("Earth", "attr") else {
            panic!("expected attributes");
        };
        assert_eq!(attr.parent.as_deref(), Some("Sun"));
        assert!(!attr.is_primary);
        let Ok(FieldValue::Rv { position, .. }) = sys.data_group("Earth", FieldKind::Rv) else {
            panic!("expected state vector");
        };
        assert!((position - sys.position("Earth").unwrap()).norm() < 1e-6);
        let Ok(FieldValue::Track(track)) = sys.data_group("Sun", FieldKind::Track) else {
            panic!("expected track");
        };
        assert!(track.is_empty());
    }

    #[test]
    fn observers_get_reports() {
        let mut sys = system(&["Sun", "Earth"]);
        let rx = sys.subscribe();
        let epoch = sys.epoch() + time::Duration::days(1);
        let report = sys.update_state(Some(epoch));
        assert_eq!(rx.try_recv().unwrap(), report);
        assert_eq!(report.epoch, epoch);
        assert!(report.faults.is_empty());

        drop(rx);
        sys.update_state(None);
        assert!(sys.observers.is_empty());
    }

    #[test]
    fn a_faulted_body_keeps_its_state_while_the_rest_advance() {
        let mut sys = SimSystem::new(
            Arc::new(BodyCatalog::sol()),
            &SimConfig {
                periods_per_window: 10,
                window_spacing: Some(86_400.0),
                ..config(&["Sun", "Earth", "Mars"])
            },
        )
        .unwrap();
        let rx = sys.subscribe();
        let earth = sys.index_of("Earth").unwrap();
        let earth_before = sys.position("Earth").unwrap();
        let mars_before = sys.position("Mars").unwrap();
        sys.bodies[earth].break_model();

        let epoch = Epoch::J2000 + time::Duration::days(11);
        let report = sys.update_state(Some(epoch));
        assert_eq!(report.faults.len(), 1);
        assert_eq!(&*report.faults[0].body, "Earth");
        assert_eq!(report.faults[0].epoch, epoch);
        assert_eq!(sys.faults(), &report.faults[..]);
        assert_eq!(rx.try_recv().unwrap(), report);

        let body = sys.body("Earth").unwrap();
        assert_eq!(body.epoch(), Epoch::J2000);
        assert!(body.window().contains(body.epoch()));
        assert_eq!(sys.position("Earth").unwrap(), earth_before);

        let mars = sys.body("Mars").unwrap();
        assert_eq!(mars.epoch(), epoch);
        assert!(mars.window().contains(epoch));
        assert!((sys.position("Mars").unwrap() - mars_before).norm() > 1.0e5);
        assert_eq!(sys.epoch(), epoch);

        // the next cycle inside the old window clears the fault
        let report = sys.update_state(Some(Epoch::J2000 + time::Duration::days(3)));
        assert!(report.faults.is_empty());
    }

    #[test]
    fn global_pool_matches_sequential() {
        let names = ["Sun", "Earth", "Moon", "Mars"];
        let mut seq = system(&names);
        let mut par = SimSystem::new(
            Arc::new(BodyCatalog::sol()),
            &SimConfig {
                use_multiprocessing: true,
                ..config(&names)
            },
        )
        .unwrap();
        assert_eq!(par.mode(), ExecutionMode::Parallel);
        assert!(par.pool.is_none());

        let epoch = Epoch::J2000 + time::Duration::days(400);
        seq.update_state(Some(epoch));
        par.update_state(Some(epoch));
        assert_eq!(par.frame(), seq.frame());
        assert_eq!(par.kinematics(), seq.kinematics());
    }

    #[test]
    fn clock_ticks_advance_the_system() {
        let mut sys = system(&["Sun", "Earth"]);
        let mut warp = TimeWarp::new(crate::clock::ManualClock::default(), 86_400.0);
        warp.clock_mut().advance(std::time::Duration::from_secs(2));
        let report = sys.advance(&mut warp).unwrap();
        assert_eq!(report.epoch, Epoch::from_days(2.0));
        assert_eq!(sys.epoch(), Epoch::from_days(2.0));

        warp.set_warp(1e300);
        warp.clock_mut().advance(std::time::Duration::from_secs(1));
        assert!(matches!(sys.advance(&mut warp), Err(Error::TimeOverflow)));
        assert_eq!(sys.epoch(), Epoch::from_days(2.0));
    }

    #[test]
    fn oversized_window_spacing_is_rejected() {
        let res = SimSystem::new(
            Arc::new(BodyCatalog::sol()),
            &SimConfig {
                window_spacing: Some(1e20),
                ..config(&["Sun", "Earth"])
            },
        );
        assert!(matches!(res, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn missing_epoch_reuses_the_current_one() {
        let mut sys = system(&["Sun", "Earth"]);
        let before = sys.position("Earth").unwrap();
        let report = sys.update_state(None);
        assert_eq!(report.epoch, Epoch::J2000);
        assert_eq!(sys.position("Earth").unwrap(), before);
    }
}
