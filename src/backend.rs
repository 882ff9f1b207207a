use std::{sync::Arc, thread, time::Duration};

use parking_lot::RwLock;
use solsys::{
    clock::{TimeWarp, WallClock},
    system::SimSystem,
};
use tracing::{debug, trace};

/// Drive `system` from the wall clock: every `interval`, advance it by the
/// warped elapsed time. Observers are notified by the system itself.
pub fn clock_thread(
    system: &Arc<RwLock<SimSystem>>,
    warp: f64,
    interval: Duration,
    frames: u32,
) -> solsys::Result<()> {
    let mut warp = TimeWarp::new(WallClock::start(), warp);
    debug!("clock thread started, warp {}", warp.warp());
    for frame in 0..frames {
        thread::sleep(interval);
        let report = system.write().advance(&mut warp)?;
        trace!("frame {frame} at {}", report.epoch);
    }
    debug!("clock thread finished after {frames} frames");
    Ok(())
}
