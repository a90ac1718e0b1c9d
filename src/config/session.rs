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
use std::{error::Error, path::Path};

use config::{Config, File};
use serde::Deserialize;

use super::{
    audio::Audio, controller::Controller, error::ConfigError, midi::Midi, trigger::Trigger,
};
use crate::{
    clock::{clamp_tempo, TimeSignature, DEFAULT_TEMPO},
    engine::{
        Settings, DEFAULT_BUFFER_SIZE, DEFAULT_COMMAND_CAPACITY, DEFAULT_EVENT_CAPACITY,
        DEFAULT_QUEUE_CAPACITY, DEFAULT_SAMPLE_RATE,
    },
    handle,
    scheduler::DEFAULT_LOOKAHEAD_BEATS,
};

/// A YAML representation of a session: engine settings, the device that
/// drives it, and the controls.
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Session {
    sample_rate: Option<u32>,
    buffer_size: Option<usize>,
    tempo: Option<f64>,
    time_signature: Option<String>,
    lookahead_beats: Option<u32>,
    queue_capacity: Option<usize>,
    event_capacity: Option<usize>,
    command_capacity: Option<usize>,
    audio: Option<Audio>,
    midi: Option<Midi>,
    controller: Option<Controller>,
    #[serde(default)]
    triggers: Vec<Trigger>,
}

impl Session {
    /// Parses a session from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Session, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Session>()?)
    }

    /// Engine settings with defaults applied. Zero sizes, a malformed time
    /// signature or a non-finite tempo are rejected; finite tempos are
    /// clamped.
    pub fn settings(&self) -> Result<Settings, ConfigError> {
        let tempo = self.tempo.unwrap_or(DEFAULT_TEMPO);
        if !tempo.is_finite() {
            return Err(ConfigError::invalid("tempo", tempo));
        }
        let time_signature = match &self.time_signature {
            Some(time_signature) => time_signature
                .parse::<TimeSignature>()
                .map_err(|e| ConfigError::invalid("time_signature", e))?,
            None => TimeSignature::default(),
        };

        Ok(Settings {
            sample_rate: non_zero("sample_rate", self.sample_rate, DEFAULT_SAMPLE_RATE)?,
            buffer_size: non_zero("buffer_size", self.buffer_size, DEFAULT_BUFFER_SIZE)?,
            tempo: clamp_tempo(tempo),
            time_signature,
            lookahead_beats: non_zero(
                "lookahead_beats",
                self.lookahead_beats,
                DEFAULT_LOOKAHEAD_BEATS,
            )?,
            queue_capacity: non_zero("queue_capacity", self.queue_capacity, DEFAULT_QUEUE_CAPACITY)?,
            event_capacity: non_zero("event_capacity", self.event_capacity, DEFAULT_EVENT_CAPACITY)?,
            command_capacity: non_zero(
                "command_capacity",
                self.command_capacity,
                DEFAULT_COMMAND_CAPACITY,
            )?,
        })
    }

    pub fn audio(&self) -> Audio {
        self.audio.clone().unwrap_or_default()
    }

    /// The MIDI input for controllers, if any.
    pub fn midi(&self) -> Option<&Midi> {
        self.midi.as_ref()
    }

    /// Defaults to the keyboard.
    pub fn controller(&self) -> Controller {
        self.controller.clone().unwrap_or_default()
    }

    /// The raw trigger configurations.
    pub fn trigger_configs(&self) -> &[Trigger] {
        &self.triggers
    }

    /// Triggers ready to register on a handle. Names must be unique.
    pub fn triggers(&self) -> Result<Vec<handle::Trigger>, Box<dyn Error>> {
        let mut triggers: Vec<handle::Trigger> = Vec::with_capacity(self.triggers.len());
        for config in self.triggers.iter() {
            if triggers.iter().any(|trigger| trigger.name == config.name()) {
                return Err(format!("duplicate trigger name {}", config.name()).into());
            }
            triggers.push(config.to_trigger()?);
        }
        Ok(triggers)
    }
}

fn non_zero<T>(field: &'static str, value: Option<T>, default: T) -> Result<T, ConfigError>
where
    T: Default + PartialEq,
{
    match value {
        Some(value) if value == T::default() => Err(ConfigError::invalid(field, "must be non-zero")),
        Some(value) => Ok(value),
        None => Ok(default),
    }
}
