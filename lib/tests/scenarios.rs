use std::sync::Arc;

use nalgebra::Vector3;
use solsys::{
    bodies::{BodyCatalog, BodyType, Plane},
    config::SimConfig,
    kinematics::{relative_position, MIN_FOV},
    system::SimSystem,
    time::Epoch,
};
use time::Duration;

fn config(names: &[&str]) -> SimConfig {
    SimConfig {
        body_names: Some(names.iter().map(|s| (*s).to_owned()).collect()),
        ..SimConfig::default()
    }
}

fn system(config: &SimConfig) -> SimSystem {
    SimSystem::new(Arc::new(BodyCatalog::sol()), config).unwrap()
}

#[test]
fn sun_earth_moon() {
    let sys = system(&config(&["Sun", "Earth", "Moon"]));
    assert_eq!(sys.len(), 3);
    assert_eq!(sys.body("Sun").unwrap().body_type(), BodyType::Star);
    assert_eq!(sys.body("Earth").unwrap().body_type(), BodyType::Planet);
    assert_eq!(sys.body("Moon").unwrap().body_type(), BodyType::Moon);
    assert_eq!(sys.body("Moon").unwrap().plane(), Plane::ParentEquatorial);
    assert!(sys.faults().is_empty());
}

#[test]
fn earth_returns_after_one_period() {
    let mut sys = system(&config(&["Sun", "Earth"]));
    let period = sys.body("Earth").unwrap().record().orbital_period.unwrap();
    let start = sys.position("Earth").unwrap();
    let step = Duration::seconds_f64(period / 10.0);
    let mut epoch = sys.epoch();
    for _ in 0..10 {
        epoch += step;
        let report = sys.update_state(Some(epoch));
        assert!(report.faults.is_empty());
    }
    let end = sys.position("Earth").unwrap();
    let err = (end - start).norm() / start.norm();
    assert!(err < 1e-4, "{err}");
}

#[test]
fn unknown_names_are_skipped() {
    let sys = system(&config(&["Sun", "Bogus"]));
    assert_eq!(sys.names().map(|n| &**n).collect::<Vec<_>>(), vec!["Sun"]);
    assert!(sys.body("Bogus").is_err());
}

#[test]
fn coincident_bodies() {
    let p = Vector3::new(7.0e7, 1.2e8, -4.0e3);
    let rel = relative_position(&p, &p, 1_737.4);
    assert_eq!(rel.dist, 0.0);
    assert_eq!(rel.fov, MIN_FOV);

    let sys = system(&config(&["Sun", "Earth", "Moon"]));
    let k = sys.kinematics();
    for i in 0..k.len() {
        assert_eq!(k.rel_pos(i, i), Vector3::zeros());
        assert!(k.accel(i).iter().all(|a| a.is_finite()));
    }
}

#[test]
fn parallel_matches_sequential() {
    let names = ["Sun", "Earth", "Moon", "Mars", "Jupiter"];
    let mut seq = system(&config(&names));
    let mut par = system(&SimConfig {
        use_multiprocessing: true,
        worker_threads: Some(4),
        ..config(&names)
    });

    let mut epoch = seq.epoch();
    for _ in 0..10 {
        epoch += Duration::days(1);
        seq.update_state(Some(epoch));
        par.update_state(Some(epoch));
    }

    let (ks, kp) = (seq.kinematics(), par.kinematics());
    assert_eq!(ks.len(), 5);
    for i in 0..ks.len() {
        let a = ks.accel(i);
        assert!((a - kp.accel(i)).norm() <= 1e-12 * a.norm().max(f64::MIN_POSITIVE));
        for j in 0..ks.len() {
            assert!((ks.rel_pos(i, j) - kp.rel_pos(i, j)).norm() <= 1e-6);
        }
    }
}

#[test]
fn positions_compose_along_the_chain() {
    let mut sys = system(&config(&["Sun", "Earth", "Moon"]));
    sys.update_state(Some(Epoch::J2000 + Duration::days(40)));
    for body in sys.bodies() {
        let mut expected = body.rel_position();
        let mut cur = body;
        while let Some(parent) = cur.parent() {
            cur = &sys.bodies()[parent.index];
            expected += cur.rel_position();
        }
        assert!((sys.position(body.name()).unwrap() - expected).norm() < 1e-6);
    }
}

#[test]
fn windows_follow_the_epoch() {
    let config = SimConfig {
        periods_per_window: 4,
        window_spacing: Some(86_400.0),
        ..config(&["Sun", "Earth", "Moon"])
    };
    let mut sys = system(&config);

    let mut epoch = sys.epoch();
    let mut last_start = sys.body("Moon").unwrap().window().start;
    for _ in 0..20 {
        epoch += Duration::days(1);
        sys.update_state(Some(epoch));
        let window = *sys.body("Moon").unwrap().window();
        assert!(window.contains(epoch));
        assert!(window.start >= last_start);
        last_start = window.start;
    }

    let mut last_end = sys.body("Moon").unwrap().window().end;
    for _ in 0..40 {
        epoch -= Duration::days(1);
        sys.update_state(Some(epoch));
        let window = *sys.body("Moon").unwrap().window();
        assert!(window.contains(epoch));
        assert!(window.end <= last_end);
        last_end = window.end;
    }
    assert!(sys.faults().is_empty());
}

#[test]
fn reload_matches_first_load() {
    let names = ["Sun", "Earth", "Moon", "Saturn"];
    let mut sys = system(&config(&names));
    let first = sys.frame();
    sys.load_from_names(&names).unwrap();
    sys.load_from_names(&names).unwrap();
    assert_eq!(sys.frame(), first);
}
