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
use std::{error::Error, time::Duration};

use duration_string::DurationString;
use midly::live::LiveEvent;
use serde::Deserialize;

use super::midi::{self, ToMidiEvent};
use crate::{handle, quantize::Grid, scheduler::EventKind};

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Cue,
    Chord,
}

/// A named quantized request, optionally bound to a MIDI message.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct Trigger {
    name: String,
    kind: TriggerKind,
    /// Cue number or chord index carried by the fired event.
    #[serde(default)]
    id: u16,
    grid: Option<String>,
    lookahead: Option<String>,
    midi: Option<midi::Event>,
}

impl Trigger {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EventKind {
        match self.kind {
            TriggerKind::Cue => EventKind::Cue(self.id),
            TriggerKind::Chord => EventKind::ChordChange(self.id),
        }
    }

    /// The grid to snap to. Defaults to a quarter note.
    pub fn grid(&self) -> Result<Grid, Box<dyn Error>> {
        match &self.grid {
            Some(grid) => grid.parse(),
            None => Ok(Grid::default()),
        }
    }

    /// The minimum distance from now to the fired event. Defaults to zero.
    pub fn lookahead(&self) -> Result<Duration, Box<dyn Error>> {
        match &self.lookahead {
            Some(lookahead) => Ok(DurationString::from_string(lookahead.clone())?.into()),
            None => Ok(Duration::ZERO),
        }
    }

    /// The MIDI message that fires this trigger, if it has one.
    pub fn midi_event(&self) -> Result<Option<LiveEvent<'static>>, Box<dyn Error>> {
        self.midi
            .as_ref()
            .map(|event| event.to_midi_event())
            .transpose()
    }

    pub fn to_trigger(&self) -> Result<handle::Trigger, Box<dyn Error>> {
        Ok(handle::Trigger {
            name: self.name.clone(),
            kind: self.kind(),
            grid: self.grid()?,
            lookahead: self.lookahead()?,
        })
    }
}

#[cfg(test)]
mod test {
    use std::{error::Error, time::Duration};

    use config::{Config, File, FileFormat};

    use super::Trigger;
    use crate::{quantize::Grid, scheduler::EventKind};

    fn parse(yaml: &str) -> Result<Trigger, Box<dyn Error>> {
        Ok(Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize::<Trigger>()?)
    }

    #[test]
    fn test_full_trigger() -> Result<(), Box<dyn Error>> {
        let trigger = parse(
            r#"
            name: chorus
            kind: cue
            id: 3
            grid: bar
            lookahead: 50ms
            midi:
              type: note_on
              channel: 10
              key: 36
        "#,
        )?
        .to_trigger()?;
        assert_eq!(trigger.name, "chorus");
        assert_eq!(trigger.kind, EventKind::Cue(3));
        assert_eq!(trigger.grid, Grid::Bar);
        assert_eq!(trigger.lookahead, Duration::from_millis(50));
        Ok(())
    }

    #[test]
    fn test_defaults() -> Result<(), Box<dyn Error>> {
        let trigger = parse(
            r#"
            name: change
            kind: chord
        "#,
        )?;
        assert_eq!(trigger.kind(), EventKind::ChordChange(0));
        assert_eq!(trigger.grid()?, Grid::Quarter);
        assert_eq!(trigger.lookahead()?, Duration::ZERO);
        assert!(trigger.midi_event()?.is_none());
        Ok(())
    }

    #[test]
    fn test_invalid_grid() -> Result<(), Box<dyn Error>> {
        let trigger = parse(
            r#"
            name: broken
            kind: cue
            grid: sideways
        "#,
        )?;
        assert!(trigger.to_trigger().is_err());
        Ok(())
    }
}
