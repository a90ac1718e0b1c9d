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
use std::{error::Error, sync::Arc};

use super::{keyboard, midi, multi, Driver};
use crate::config;

/// Creates a controller driver from the config. MIDI drivers need
/// `midi_device`.
pub fn driver(
    config: &config::Controller,
    triggers: &[config::Trigger],
    midi_device: Option<Arc<dyn crate::midi::Device>>,
) -> Result<Arc<dyn Driver>, Box<dyn Error>> {
    match config {
        config::Controller::Keyboard => Ok(Arc::new(keyboard::Driver::new())),
        config::Controller::Midi(midi_config) => match midi_device {
            Some(midi_device) => Ok(Arc::new(midi::Driver::from_config(
                midi_config,
                triggers,
                midi_device,
            )?)),
            None => Err("No MIDI device found for MIDI controller.".into()),
        },
        config::Controller::Multi(sub_configs) => {
            let mut names: Vec<&String> = sub_configs.keys().collect();
            names.sort();

            let mut drivers = Vec::with_capacity(names.len());
            for name in names {
                let sub_driver = match &sub_configs[name] {
                    config::Controller::Multi(_) => {
                        return Err(format!(
                            "controller {}: nested multi controllers are not supported",
                            name
                        )
                        .into())
                    }
                    sub_config => driver(sub_config, triggers, midi_device.clone())
                        .map_err(|e| format!("controller {}: {}", name, e))?,
                };
                drivers.push(sub_driver);
            }
            Ok(Arc::new(multi::Driver::new(drivers)))
        }
    }
}
