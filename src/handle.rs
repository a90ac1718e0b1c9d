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
use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use crossbeam_channel::{Sender, TrySendError};

use crate::{
    engine::Command,
    quantize::Grid,
    scheduler::{EventKind, StartFrom},
};

/// Why a command never reached the engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HandleError {
    #[error("engine command queue is full")]
    Busy,
    #[error("engine is no longer running")]
    Disconnected,
    #[error("no trigger named {0}")]
    UnknownTrigger(String),
}

/// A named, pre-configured quantized request.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub name: String,
    pub kind: EventKind,
    pub grid: Grid,
    pub lookahead: Duration,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} on the next {}, {:?} ahead)",
            self.name, self.kind, self.grid, self.lookahead
        )
    }
}

/// Sends commands to the engine. Cheap to clone; never blocks.
///
/// Every call only queues the command. It takes effect at the start of the
/// next render cycle, and refusals from the scheduler are counted rather
/// than returned here.
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: Sender<Command>,
    triggers: Arc<HashMap<String, Trigger>>,
}

impl SchedulerHandle {
    pub(crate) fn new(commands: Sender<Command>) -> SchedulerHandle {
        SchedulerHandle {
            commands,
            triggers: Arc::new(HashMap::new()),
        }
    }

    /// Registers the named triggers [`SchedulerHandle::trigger`] can fire.
    pub fn with_triggers(mut self, triggers: Vec<Trigger>) -> SchedulerHandle {
        self.triggers = Arc::new(
            triggers
                .into_iter()
                .map(|trigger| (trigger.name.clone(), trigger))
                .collect(),
        );
        self
    }

    pub fn triggers(&self) -> impl Iterator<Item = &Trigger> {
        self.triggers.values()
    }

    /// Starts from beat 0.
    pub fn start(&self) -> Result<(), HandleError> {
        self.send(Command::Start(StartFrom::Beginning))
    }

    /// Starts from where playback last stopped.
    pub fn resume(&self) -> Result<(), HandleError> {
        self.send(Command::Start(StartFrom::Resume))
    }

    /// Starts from `beat`. A beat that is not finite, or too large to ever
    /// reach, is refused by the scheduler and counted.
    pub fn start_at(&self, beat: f64) -> Result<(), HandleError> {
        self.send(Command::Start(StartFrom::Beat(beat)))
    }

    pub fn stop(&self) -> Result<(), HandleError> {
        self.send(Command::Stop)
    }

    pub fn reset(&self) -> Result<(), HandleError> {
        self.send(Command::Reset)
    }

    pub fn set_tempo(&self, bpm: f64) -> Result<(), HandleError> {
        self.send(Command::SetTempo(bpm))
    }

    pub fn nudge_tempo(&self, delta: f64) -> Result<(), HandleError> {
        self.send(Command::NudgeTempo(delta))
    }

    pub fn schedule(&self, kind: EventKind, beat: f64) -> Result<(), HandleError> {
        self.send(Command::Schedule { kind, beat })
    }

    /// Schedules `kind` on the next grid point at least `lookahead` away.
    pub fn request_quantized(
        &self,
        kind: EventKind,
        grid: Grid,
        lookahead: Duration,
    ) -> Result<(), HandleError> {
        self.send(Command::Quantized {
            kind,
            grid,
            lookahead,
        })
    }

    /// Fires a configured trigger by name.
    pub fn trigger(&self, name: &str) -> Result<(), HandleError> {
        let trigger = self
            .triggers
            .get(name)
            .ok_or_else(|| HandleError::UnknownTrigger(name.to_string()))?;
        self.request_quantized(trigger.kind, trigger.grid, trigger.lookahead)
    }

    fn send(&self, command: Command) -> Result<(), HandleError> {
        self.commands.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => HandleError::Busy,
            TrySendError::Disconnected(_) => HandleError::Disconnected,
        })
    }
}
