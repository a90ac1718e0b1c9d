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
use std::fmt;

use crate::hosttime::HostTime;

/// What happens when an event fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A metronome click.
    Click,
    /// Switch to the chord with the given index.
    ChordChange(u16),
    /// Fire the cue with the given index.
    Cue(u16),
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Click => write!(f, "click"),
            EventKind::ChordChange(chord) => write!(f, "chord {}", chord),
            EventKind::Cue(cue) => write!(f, "cue {}", cue),
        }
    }
}

/// Who asked for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    /// Generated by the scheduler's lookahead window.
    Metronome,
    /// Requested through `schedule`.
    User,
}

/// An event registered against the host clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledEvent {
    /// Absolute host time the event is due.
    pub target: HostTime,
    /// The beat the target was computed from.
    pub beat: f64,
    pub kind: EventKind,
    pub accent: bool,
    /// Monotonic per scheduler. Breaks ties between equal targets.
    pub id: u64,
    pub(crate) origin: Origin,
}

/// Messages from the real-time thread to the observer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Notification {
    /// A metronome click landed on a new beat. `bar` is 0-indexed and
    /// `beat_in_bar` 1-indexed.
    BeatChanged {
        beat: i64,
        bar: i64,
        beat_in_bar: u32,
    },
    StateChanged {
        playing: bool,
    },
    EventFired {
        beat: f64,
        kind: EventKind,
        accent: bool,
        /// Absolute sample the event lands on, counted in render-cycle
        /// frames: the cycle's start position plus the frame offset within
        /// the buffer. The position is pulled back onto host time when cycles
        /// go missing, so after a dropout this is the sample the event
        /// should have landed on only for events that fire on time.
        sample: i64,
    },
    TempoChanged {
        bpm: f64,
    },
}
