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
use std::{
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info, span, Level};

use super::{
    thread_priority::{configure_render_thread, render_thread_priority, rt_audio_enabled},
    Runner,
};
use crate::engine::Engine;

/// A cpal output device. The stream writes silence; its callback exists to
/// drive the engine at the hardware's pace.
pub struct Device {
    name: String,
    channels: u16,
    host_id: cpal::HostId,
    device: cpal::Device,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.channels,
            self.host_id.name()
        )
    }
}

impl Device {
    /// Lists cpal devices and produces the Device trait.
    pub fn list() -> Result<Vec<Box<dyn super::Device>>, Box<dyn Error>> {
        Ok(Device::list_cpal_devices()?
            .into_iter()
            .map(|device| {
                let device: Box<dyn super::Device> = Box::new(device);
                device
            })
            .collect())
    }

    fn list_cpal_devices() -> Result<Vec<Device>, Box<dyn Error>> {
        let mut devices: Vec<Device> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.output_devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let Ok(output_configs) = device.supported_output_configs() else {
                    continue;
                };
                let channels = output_configs
                    .map(|output_config| output_config.channels())
                    .max()
                    .unwrap_or(0);
                if channels == 0 {
                    continue;
                }

                devices.push(Device {
                    name: device.name()?,
                    channels,
                    host_id,
                    device,
                });
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    /// Gets the cpal device with the given name. "default" picks the default
    /// host's default output.
    pub fn get(name: &str) -> Result<Device, Box<dyn Error>> {
        if name == "default" {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or("no default output device")?;
            let channels = device.default_output_config()?.channels();
            return Ok(Device {
                name: device.name()?,
                channels,
                host_id: host.id(),
                device,
            });
        }

        Device::list_cpal_devices()?
            .into_iter()
            .find(|device| device.name.trim() == name)
            .ok_or_else(|| format!("no device found with name {}", name).into())
    }
}

impl super::Device for Device {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn run(&self, mut engine: Engine) -> Result<Runner, Box<dyn Error>> {
        let span = span!(Level::INFO, "cpal render", device = self.name);
        let _enter = span.enter();

        let device = self.device.clone();
        let channels = usize::from(self.channels.max(1));
        let config = cpal::StreamConfig {
            channels: self.channels.max(1),
            sample_rate: cpal::SampleRate(engine.sample_rate()),
            buffer_size: cpal::BufferSize::Fixed(
                u32::try_from(engine.buffer_size()).map_err(|_| "buffer size too large")?,
            ),
        };
        info!(
            sample_rate = engine.sample_rate(),
            buffer_size = engine.buffer_size(),
            channels,
            "Opening output stream."
        );

        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);

        // The stream is not Send, so it lives and dies on this thread.
        let thread = {
            let stop = stop.clone();
            thread::Builder::new()
                .name("beatsync-cpal".to_string())
                .spawn(move || {
                    let priority = render_thread_priority();
                    let rt_audio = rt_audio_enabled();
                    let mut priority_set = false;

                    let stream = device.build_output_stream(
                        &config,
                        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                            configure_render_thread(priority, rt_audio, &mut priority_set);
                            data.fill(0.0);
                            engine.process(data.len() / channels);
                        },
                        |err| error!(err = err.to_string(), "Output stream error."),
                        None,
                    );
                    let stream = match stream {
                        Ok(stream) => stream,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e.to_string()));
                            return;
                        }
                    };
                    if let Err(e) = stream.play() {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                    let _ = ready_tx.send(Ok(()));

                    while !stop.load(Ordering::Relaxed) {
                        thread::sleep(Duration::from_millis(100));
                    }
                    drop(stream);
                })?
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!("Output stream started.");
                Ok(Runner::new(stop, thread))
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(format!("unable to start output stream: {}", e).into())
            }
            Err(_) => {
                let _ = thread.join();
                Err("output thread exited before the stream started".into())
            }
        }
    }
}
