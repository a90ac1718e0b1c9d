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

//! A sample-accurate musical event scheduler. Metronome clicks and
//! quantized cue and chord events are fired from inside a real-time render
//! cycle, on a timeline anchored to hardware time so tempo changes never
//! drift.

pub mod audio;
pub mod clock;
pub mod config;
pub mod controller;
pub mod engine;
pub mod feed;
pub mod handle;
pub mod hosttime;
pub mod midi;
pub mod quantize;
pub mod queue;
pub mod scheduler;
pub mod session;
#[cfg(test)]
mod testutil;
