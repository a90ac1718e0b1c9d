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

//! Snapping asynchronous commands to the next reachable grid point.

use std::{error::Error, fmt, str::FromStr, time::Duration};

use crate::clock::{MusicalClock, TimeSignature};

/// Errors for quantization requests the engine refuses to answer.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum QuantizeError {
    #[error("grid unit must be a positive number of beats, got {0}")]
    InvalidGrid(f64),
    #[error("lookahead must be a non-negative number of beats, got {0}")]
    InvalidLookahead(f64),
}

/// Returns the first grid multiple that is at least `lookahead_beats` after
/// `current_beat`.
///
/// With a non-zero lookahead a beat sitting exactly on a grid line never
/// yields itself: the result always lies in the future.
pub fn next_grid_point(
    current_beat: f64,
    grid_unit: f64,
    lookahead_beats: f64,
) -> Result<f64, QuantizeError> {
    if !grid_unit.is_finite() || grid_unit <= 0.0 {
        return Err(QuantizeError::InvalidGrid(grid_unit));
    }
    if !lookahead_beats.is_finite() || lookahead_beats < 0.0 {
        return Err(QuantizeError::InvalidLookahead(lookahead_beats));
    }

    let earliest = current_beat + lookahead_beats;
    let mut candidate = (current_beat / grid_unit).ceil() * grid_unit;
    if candidate < earliest {
        // Jump straight to the right cell rather than stepping one unit at a
        // time for lookaheads spanning several grid units.
        candidate = (earliest / grid_unit).ceil() * grid_unit;
        if candidate < earliest {
            candidate += grid_unit;
        }
    }
    // Only reachable when `current_beat + lookahead_beats` rounds back to
    // `current_beat`, i.e. a lookahead below the float resolution at this
    // beat.
    if lookahead_beats > 0.0 && candidate <= current_beat {
        candidate += grid_unit;
    }

    Ok(candidate)
}

/// A musical subdivision to snap to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Grid {
    Sixteenth,
    Eighth,
    Quarter,
    Half,
    /// One full bar of the current time signature.
    Bar,
    /// An arbitrary number of beats.
    Beats(f64),
}

impl Grid {
    /// The grid size in beats.
    pub fn unit(&self, time_signature: &TimeSignature) -> f64 {
        match self {
            Grid::Sixteenth => 0.25,
            Grid::Eighth => 0.5,
            Grid::Quarter => 1.0,
            Grid::Half => 2.0,
            Grid::Bar => time_signature.beats_per_bar(),
            Grid::Beats(beats) => *beats,
        }
    }
}

impl Default for Grid {
    fn default() -> Self {
        Grid::Quarter
    }
}

impl FromStr for Grid {
    type Err = Box<dyn Error>;

    fn from_str(s: &str) -> Result<Self, Box<dyn Error>> {
        match s.trim().to_lowercase().as_str() {
            "sixteenth" | "1/16" => Ok(Grid::Sixteenth),
            "eighth" | "1/8" => Ok(Grid::Eighth),
            "quarter" | "beat" | "1/4" => Ok(Grid::Quarter),
            "half" | "1/2" => Ok(Grid::Half),
            "bar" | "measure" => Ok(Grid::Bar),
            other => {
                let beats: f64 = other
                    .parse()
                    .map_err(|_| format!("unsupported grid: {}", s))?;
                if !beats.is_finite() || beats <= 0.0 {
                    return Err(format!("grid must be a positive number of beats: {}", s).into());
                }
                Ok(Grid::Beats(beats))
            }
        }
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grid::Sixteenth => write!(f, "sixteenth"),
            Grid::Eighth => write!(f, "eighth"),
            Grid::Quarter => write!(f, "quarter"),
            Grid::Half => write!(f, "half"),
            Grid::Bar => write!(f, "bar"),
            Grid::Beats(beats) => write!(f, "{} beats", beats),
        }
    }
}

/// Applies a grid and a time-based lookahead against a clock.
pub struct Quantizer<'a> {
    clock: &'a MusicalClock,
}

impl<'a> Quantizer<'a> {
    pub fn new(clock: &'a MusicalClock) -> Self {
        Quantizer { clock }
    }

    /// The next grid point after the clock's current beat that is at least
    /// `lookahead` away at the clock's tempo.
    pub fn next_target(&self, grid: Grid, lookahead: Duration) -> Result<f64, QuantizeError> {
        self.next_target_from(self.clock.current_beat(), grid, lookahead)
    }

    pub fn next_target_from(
        &self,
        current_beat: f64,
        grid: Grid,
        lookahead: Duration,
    ) -> Result<f64, QuantizeError> {
        let lookahead_beats = self.clock.seconds_to_beats(lookahead.as_secs_f64());
        next_grid_point(
            current_beat,
            grid.unit(&self.clock.time_signature()),
            lookahead_beats,
        )
    }
}
