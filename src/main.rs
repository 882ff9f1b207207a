#![warn(clippy::unwrap_used, clippy::pedantic)]
#![allow(
    clippy::cast_lossless,
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::doc_markdown
)]
use std::{
    fs,
    path::PathBuf,
    sync::{mpsc::RecvTimeoutError, Arc},
    thread,
    time::Duration,
};

use clap::Parser;
use color_eyre::eyre::{self, eyre, WrapErr};
use itertools::Itertools;
use parking_lot::RwLock;
use solsys::{bodies::BodyCatalog, config::SimConfig, system::SimSystem};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod backend;

/// How long the main thread waits for a report before checking on the clock thread.
const RECV_POLL: Duration = Duration::from_millis(250);

/// Run the solar system simulation and log every frame.
///
/// CLI values override settings loaded from `--config`.
#[derive(Parser, Debug)]
#[command(name = "solsys", about = "Solar system ephemeris simulator")]
struct Args {
    /// Simulation config (TOML).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Body catalog (RON). The built-in solar system when omitted.
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Comma-separated body names to load.
    #[arg(long, value_delimiter = ',')]
    bodies: Option<Vec<String>>,

    /// Initial epoch (RFC 3339).
    #[arg(long)]
    epoch: Option<String>,

    /// Simulated seconds per wall-clock second.
    #[arg(long, allow_negative_numbers = true)]
    warp: Option<f64>,

    /// Update bodies on a thread pool.
    #[arg(long)]
    parallel: Option<bool>,

    /// Update cycles to run before exiting.
    #[arg(long, default_value_t = 10)]
    frames: u32,

    /// Wall-clock milliseconds between update cycles.
    #[arg(long, default_value_t = 100)]
    interval_ms: u64,
}

impl Args {
    fn load_config(&self) -> eyre::Result<SimConfig> {
        let mut config: SimConfig = match &self.config {
            Some(path) => {
                let s = fs::read_to_string(path)
                    .wrap_err_with(|| format!("reading {}", path.display()))?;
                toml::from_str(&s).wrap_err_with(|| format!("parsing {}", path.display()))?
            }
            None => SimConfig::default(),
        };
        if let Some(bodies) = &self.bodies {
            config.body_names = Some(bodies.clone());
        }
        if let Some(epoch) = &self.epoch {
            config.epoch0 = Some(epoch.clone());
        }
        if let Some(warp) = self.warp {
            config.time_warp = warp;
        }
        if let Some(parallel) = self.parallel {
            config.use_multiprocessing = parallel;
        }
        Ok(config)
    }

    fn load_catalog(&self) -> eyre::Result<BodyCatalog> {
        Ok(match &self.catalog {
            Some(path) => {
                let s = fs::read_to_string(path)
                    .wrap_err_with(|| format!("reading {}", path.display()))?;
                BodyCatalog::from_ron(&s)?
            }
            None => BodyCatalog::sol(),
        })
    }
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = args.load_config()?;
    let catalog = args.load_catalog()?;
    info!("catalog: {}", catalog.list_names().iter().join(", "));

    let system = Arc::new(RwLock::new(SimSystem::new(Arc::new(catalog), &config)?));
    let reports = system.write().subscribe();

    let clock = thread::spawn({
        let system = Arc::clone(&system);
        let interval = Duration::from_millis(args.interval_ms);
        let (warp, frames) = (config.time_warp, args.frames);
        move || backend::clock_thread(&system, warp, interval, frames)
    });

    let mut received = 0;
    while received < args.frames {
        let report = match reports.recv_timeout(RECV_POLL) {
            Ok(report) => report,
            Err(RecvTimeoutError::Timeout) if !clock.is_finished() => continue,
            Err(RecvTimeoutError::Timeout) => break,
            Err(e) => return Err(e.into()),
        };
        received += 1;
        info!(
            "{} updated in {:?} with {} fault(s)",
            report.epoch,
            report.duration,
            report.faults.len()
        );
        for fault in &report.faults {
            warn!("{}: {}", fault.body, fault.error);
        }
        let system = system.read();
        for view in system.frame() {
            let r = view.position;
            debug!(
                "{:>10} [{:>16.1} {:>16.1} {:>16.1}] km, pm {:.4} rad",
                view.name, r.x, r.y, r.z, view.orientation.pm
            );
        }
    }

    clock
        .join()
        .map_err(|_| eyre!("clock thread panicked"))?
        .wrap_err("clock thread stopped")?;
    Ok(())
}
