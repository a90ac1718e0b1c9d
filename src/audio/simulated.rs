// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! A render cycle without audio hardware, paced by the wall clock.

use std::{
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use tracing::{debug, info, span, warn, Level};

use super::{
    thread_priority::{configure_render_thread, render_thread_priority, rt_audio_enabled},
    Runner, SIMULATED_DEVICE,
};
use crate::engine::Engine;

/// Number of periods the loop may fall behind before it gives up catching up.
const MAX_BEHIND_PERIODS: u32 = 8;

#[derive(Debug, Default)]
pub struct Device {}

impl Device {
    pub fn new() -> Device {
        Device {}
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (wall clock)", SIMULATED_DEVICE)
    }
}

impl super::Device for Device {
    fn name(&self) -> String {
        SIMULATED_DEVICE.to_string()
    }

    fn run(&self, mut engine: Engine) -> Result<Runner, Box<dyn Error>> {
        let frames = engine.buffer_size();
        let period = Duration::from_secs_f64(frames as f64 / f64::from(engine.sample_rate()));
        let stop = Arc::new(AtomicBool::new(false));

        let thread = {
            let stop = stop.clone();
            thread::Builder::new()
                .name("beatsync-sim".to_string())
                .spawn(move || {
                    let span = span!(Level::INFO, "simulated render");
                    let _enter = span.enter();
                    info!(frames, period = ?period, "Simulated render cycle started.");

                    let mut priority_set = false;
                    configure_render_thread(
                        render_thread_priority(),
                        rt_audio_enabled(),
                        &mut priority_set,
                    );

                    let mut deadline = Instant::now();
                    while !stop.load(Ordering::Relaxed) {
                        engine.process(frames);

                        deadline += period;
                        let now = Instant::now();
                        if deadline > now {
                            spin_sleep::sleep(deadline - now);
                        } else if now - deadline > period * MAX_BEHIND_PERIODS {
                            warn!(behind = ?(now - deadline), "Render cycle fell behind, resyncing.");
                            deadline = now;
                        }
                    }
                    debug!("Simulated render cycle stopped.");
                })?
        };

        Ok(Runner::new(stop, thread))
    }
}

#[cfg(test)]
mod test {
    use std::{error::Error, sync::Arc};

    use crate::{
        audio::Device as _,
        engine::{self, Settings},
        feed::DEFAULT_POLL_INTERVAL,
        hosttime::MonotonicClock,
        testutil::eventually,
    };

    #[test]
    fn test_drives_engine_in_real_time() -> Result<(), Box<dyn Error>> {
        let settings = Settings {
            tempo: 240.0,
            ..Settings::default()
        };
        let (engine, handle, feed) = engine::new(&settings, Arc::new(MonotonicClock::new()));
        let feed = feed.spawn(DEFAULT_POLL_INTERVAL, |_| {})?;
        handle.start()?;

        let device = super::Device::new();
        assert_eq!(device.name(), "simulated");
        let runner = device.run(engine)?;
        assert!(runner.is_running());

        let status = feed.status_handle();
        eventually(
            || {
                let status = status.read();
                status.playing && status.beat >= 2
            },
            "Simulated device never reached beat 2",
        );
        runner.stop();

        let status = feed.stop()?.status();
        assert!(status.fired >= 3);
        assert_eq!(status.rejected, 0);
        Ok(())
    }
}
