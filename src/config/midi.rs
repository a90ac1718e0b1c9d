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
use std::error::Error;

use midly::{
    live::LiveEvent,
    num::{u4, u7},
    MidiMessage,
};
use serde::Deserialize;

/// The MIDI input that controllers listen on.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct Midi {
    device: String,
}

impl Midi {
    pub fn new(device: &str) -> Midi {
        Midi {
            device: device.to_string(),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }
}

/// Implementers must convert to a MIDI live event.
pub trait ToMidiEvent {
    fn to_midi_event(&self) -> Result<LiveEvent<'static>, Box<dyn Error>>;
}

/// A MIDI message to match incoming input against. Channels are 1-16.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    NoteOff {
        channel: u8,
        key: u8,
        #[serde(default)]
        velocity: u8,
    },
    NoteOn {
        channel: u8,
        key: u8,
        /// Pads usually send a fixed velocity; match it exactly.
        #[serde(default = "full_velocity")]
        velocity: u8,
    },
    ControlChange {
        channel: u8,
        controller: u8,
        value: u8,
    },
    ProgramChange {
        channel: u8,
        program: u8,
    },
}

fn full_velocity() -> u8 {
    127
}

/// Creates a note on event.
#[cfg(test)]
pub fn note_on(channel: u8, key: u8, velocity: u8) -> Event {
    Event::NoteOn {
        channel,
        key,
        velocity,
    }
}

impl ToMidiEvent for Event {
    fn to_midi_event(&self) -> Result<LiveEvent<'static>, Box<dyn Error>> {
        let (channel, message) = match *self {
            Event::NoteOff {
                channel,
                key,
                velocity,
            } => (
                channel,
                MidiMessage::NoteOff {
                    key: parse_u7(key)?,
                    vel: parse_u7(velocity)?,
                },
            ),
            Event::NoteOn {
                channel,
                key,
                velocity,
            } => (
                channel,
                MidiMessage::NoteOn {
                    key: parse_u7(key)?,
                    vel: parse_u7(velocity)?,
                },
            ),
            Event::ControlChange {
                channel,
                controller,
                value,
            } => (
                channel,
                MidiMessage::Controller {
                    controller: parse_u7(controller)?,
                    value: parse_u7(value)?,
                },
            ),
            Event::ProgramChange { channel, program } => (
                channel,
                MidiMessage::ProgramChange {
                    program: parse_u7(program)?,
                },
            ),
        };

        Ok(LiveEvent::Midi {
            channel: parse_channel(channel)?,
            message,
        })
    }
}

/// Parses a channel from the config. Input is expected to be [1, 16].
fn parse_channel(channel: u8) -> Result<u4, Box<dyn Error>> {
    channel
        .checked_sub(1)
        .and_then(u4::try_from)
        .ok_or_else(|| format!("error parsing channel: {} is invalid", channel).into())
}

fn parse_u7(raw: u8) -> Result<u7, Box<dyn Error>> {
    u7::try_from(raw).ok_or_else(|| format!("error parsing u7 value: {} is invalid", raw).into())
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use config::{Config, File, FileFormat};
    use midly::{
        live::LiveEvent,
        num::{u4, u7},
        MidiMessage,
    };

    use super::{Event, ToMidiEvent};

    fn parse(yaml: &str) -> Result<LiveEvent<'static>, Box<dyn Error>> {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize::<Event>()?
            .to_midi_event()
    }

    #[test]
    fn note_on_defaults_to_full_velocity() -> Result<(), Box<dyn Error>> {
        let event = parse(
            r#"
            type: note_on
            channel: 10
            key: 36
        "#,
        )?;
        assert_eq!(
            event,
            LiveEvent::Midi {
                channel: u4::from(9),
                message: MidiMessage::NoteOn {
                    key: u7::from(36),
                    vel: u7::from(127),
                },
            }
        );
        Ok(())
    }

    #[test]
    fn note_off() -> Result<(), Box<dyn Error>> {
        let event = parse(
            r#"
            type: note_off
            channel: 1
            key: 60
        "#,
        )?;
        assert_eq!(
            event,
            LiveEvent::Midi {
                channel: u4::from(0),
                message: MidiMessage::NoteOff {
                    key: u7::from(60),
                    vel: u7::from(0),
                },
            }
        );
        Ok(())
    }

    #[test]
    fn control_change() -> Result<(), Box<dyn Error>> {
        let event = parse(
            r#"
            type: control_change
            channel: 16
            controller: 64
            value: 127
        "#,
        )?;
        assert_eq!(
            event,
            LiveEvent::Midi {
                channel: u4::from(15),
                message: MidiMessage::Controller {
                    controller: u7::from(64),
                    value: u7::from(127),
                },
            }
        );
        Ok(())
    }

    #[test]
    fn program_change() -> Result<(), Box<dyn Error>> {
        let event = parse(
            r#"
            type: program_change
            channel: 3
            program: 12
        "#,
        )?;
        assert_eq!(
            event,
            LiveEvent::Midi {
                channel: u4::from(2),
                message: MidiMessage::ProgramChange {
                    program: u7::from(12),
                },
            }
        );
        Ok(())
    }

    #[test]
    fn out_of_range_values() {
        assert!(super::note_on(0, 36, 127).to_midi_event().is_err());
        assert!(super::note_on(17, 36, 127).to_midi_event().is_err());
        assert!(super::note_on(10, 128, 127).to_midi_event().is_err());
        assert!(super::note_on(10, 36, 200).to_midi_event().is_err());
    }
}
