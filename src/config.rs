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

mod audio;
mod controller;
mod error;
pub mod midi;
mod session;
mod trigger;

pub use self::audio::Audio;
pub use self::controller::{Controller, MidiController};
pub use self::error::ConfigError;
pub use self::midi::Midi;
pub use self::session::Session;
pub use self::trigger::Trigger;

/// Loads the session file at `path` and starts it. Must be called from
/// within a tokio runtime.
pub fn init_session(path: &Path) -> Result<crate::session::Session, Box<dyn Error>> {
    let config = Session::deserialize(path)?;
    crate::session::Session::start(&config)
}
