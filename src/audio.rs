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

//! Real-time drivers. A device owns an [`Engine`] and calls
//! [`Engine::process`] once per hardware buffer. No audio is produced.

use std::{
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

use crate::{config, engine::Engine};

pub mod cpal;
pub mod simulated;
mod thread_priority;

/// The device name that selects [`simulated::Device`].
pub const SIMULATED_DEVICE: &str = "simulated";

pub trait Device: fmt::Display + Send + Sync {
    fn name(&self) -> String;

    /// Starts driving `engine` from this device's render cycle. Uses the
    /// engine's sample rate and buffer size.
    fn run(&self, engine: Engine) -> Result<Runner, Box<dyn Error>>;
}

/// A device that is currently driving an engine. Stops it when dropped.
pub struct Runner {
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Runner {
    pub(crate) fn new(stop: Arc<AtomicBool>, thread: thread::JoinHandle<()>) -> Runner {
        Runner {
            stop,
            thread: Some(thread),
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }

    /// Stops the render cycle and waits for the driver thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Lists output devices known to cpal.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, Box<dyn Error>> {
    cpal::Device::list()
}

/// Gets the device named in the configuration.
pub fn get_device(config: &config::Audio) -> Result<Arc<dyn Device>, Box<dyn Error>> {
    let device = config.device();
    if device == SIMULATED_DEVICE {
        return Ok(Arc::new(simulated::Device::new()));
    }

    Ok(Arc::new(cpal::Device::get(device)?))
}
