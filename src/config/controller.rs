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
use std::{collections::HashMap, error::Error};

use midly::live::LiveEvent;
use serde::Deserialize;

use super::midi::{self, ToMidiEvent};

/// Which drivers feed the controller.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Controller {
    Keyboard,
    Midi(MidiController),
    Multi(HashMap<String, Controller>),
}

impl Default for Controller {
    fn default() -> Self {
        Controller::Keyboard
    }
}

/// MIDI messages mapped to transport commands. Unset commands have no
/// binding. Triggers carry their own bindings.
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
pub struct MidiController {
    play: Option<midi::Event>,
    resume: Option<midi::Event>,
    stop: Option<midi::Event>,
    reset: Option<midi::Event>,
    faster: Option<midi::Event>,
    slower: Option<midi::Event>,
}

fn to_live(event: &Option<midi::Event>) -> Result<Option<LiveEvent<'static>>, Box<dyn Error>> {
    event.as_ref().map(|event| event.to_midi_event()).transpose()
}

impl MidiController {
    #[cfg(test)]
    pub fn new(play: midi::Event, stop: midi::Event) -> MidiController {
        MidiController {
            play: Some(play),
            stop: Some(stop),
            ..MidiController::default()
        }
    }

    pub fn play(&self) -> Result<Option<LiveEvent<'static>>, Box<dyn Error>> {
        to_live(&self.play)
    }

    pub fn resume(&self) -> Result<Option<LiveEvent<'static>>, Box<dyn Error>> {
        to_live(&self.resume)
    }

    pub fn stop(&self) -> Result<Option<LiveEvent<'static>>, Box<dyn Error>> {
        to_live(&self.stop)
    }

    pub fn reset(&self) -> Result<Option<LiveEvent<'static>>, Box<dyn Error>> {
        to_live(&self.reset)
    }

    /// Nudges the tempo up.
    pub fn faster(&self) -> Result<Option<LiveEvent<'static>>, Box<dyn Error>> {
        to_live(&self.faster)
    }

    /// Nudges the tempo down.
    pub fn slower(&self) -> Result<Option<LiveEvent<'static>>, Box<dyn Error>> {
        to_live(&self.slower)
    }
}
