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

//! The render-cycle side of playback.
//!
//! [`new`] splits playback into three parts that live on different threads:
//! the [`Engine`] (driven by the audio callback), the [`SchedulerHandle`]
//! (cloned into controllers) and the [`Feed`] (drained by an observer).

use std::{sync::Arc, time::Duration};

use crossbeam_channel::Receiver;

use crate::{
    clock::{MusicalClock, TimeSignature, DEFAULT_TEMPO},
    feed::Feed,
    handle::SchedulerHandle,
    hosttime::HostClock,
    quantize::Grid,
    queue,
    scheduler::{EventKind, Rejected, Scheduler, StartFrom, DEFAULT_LOOKAHEAD_BEATS},
};

pub const DEFAULT_SAMPLE_RATE: u32 = 44100;
pub const DEFAULT_BUFFER_SIZE: usize = 256;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
pub const DEFAULT_EVENT_CAPACITY: usize = 256;
pub const DEFAULT_COMMAND_CAPACITY: usize = 64;

/// Commands from non-real-time threads. Applied at the start of a render
/// cycle, before anything fires.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Start(StartFrom),
    Stop,
    Reset,
    SetTempo(f64),
    /// Changes the tempo relative to the current one.
    NudgeTempo(f64),
    Schedule {
        kind: EventKind,
        beat: f64,
    },
    Quantized {
        kind: EventKind,
        grid: Grid,
        lookahead: Duration,
    },
}

/// Everything needed to build an engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub sample_rate: u32,
    /// Frames per render cycle.
    pub buffer_size: usize,
    pub tempo: f64,
    pub time_signature: TimeSignature,
    pub lookahead_beats: u32,
    /// Notification slots between the engine and the feed.
    pub queue_capacity: usize,
    /// User events the scheduler can hold.
    pub event_capacity: usize,
    /// Commands that can wait for the next render cycle.
    pub command_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            sample_rate: DEFAULT_SAMPLE_RATE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            tempo: DEFAULT_TEMPO,
            time_signature: TimeSignature::default(),
            lookahead_beats: DEFAULT_LOOKAHEAD_BEATS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            command_capacity: DEFAULT_COMMAND_CAPACITY,
        }
    }
}

/// Owns the scheduler. Lives on the real-time thread.
pub struct Engine {
    scheduler: Scheduler,
    commands: Receiver<Command>,
    buffer_size: usize,
}

/// Builds an engine and the handle and feed that talk to it.
pub fn new(settings: &Settings, host: Arc<dyn HostClock>) -> (Engine, SchedulerHandle, Feed) {
    let clock = MusicalClock::new(
        settings.sample_rate as f64,
        settings.tempo,
        settings.time_signature,
    );
    let tempo = clock.tempo();
    let (producer, consumer) = queue::channel(settings.queue_capacity);
    let (commands_tx, commands_rx) = crossbeam_channel::bounded(settings.command_capacity);

    let scheduler = Scheduler::new(
        clock,
        host,
        settings.lookahead_beats,
        settings.event_capacity,
        producer,
    );
    let feed = Feed::new(consumer, scheduler.counters(), tempo);

    (
        Engine {
            scheduler,
            commands: commands_rx,
            buffer_size: settings.buffer_size,
        },
        SchedulerHandle::new(commands_tx),
        feed,
    )
}

impl Engine {
    /// One render cycle. Applies queued commands, then lets the scheduler
    /// fire what is due within `frames`.
    #[inline]
    pub fn process(&mut self, frames: usize) {
        while let Ok(command) = self.commands.try_recv() {
            // Rejections are counted by the scheduler.
            let _ = self.apply(command);
        }
        self.scheduler.process(frames);
    }

    /// The configured frames per cycle.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.scheduler.clock().sample_rate() as u32
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    fn apply(&mut self, command: Command) -> Result<(), Rejected> {
        match command {
            Command::Start(from) => self.scheduler.start(from),
            Command::Stop => self.scheduler.stop(),
            Command::Reset => self.scheduler.reset(),
            Command::SetTempo(bpm) => self.scheduler.set_tempo(bpm),
            Command::NudgeTempo(delta) => {
                let bpm = self.scheduler.tempo() + delta;
                self.scheduler.set_tempo(bpm)
            }
            Command::Schedule { kind, beat } => self.scheduler.schedule(kind, beat).map(|_| ()),
            Command::Quantized {
                kind,
                grid,
                lookahead,
            } => self
                .scheduler
                .schedule_quantized(kind, grid, lookahead)
                .map(|_| ()),
        }
    }
}

/// A driver that goes away stops playback, so observers never see a
/// transport that is stuck playing.
impl Drop for Engine {
    fn drop(&mut self) {
        let _ = self.scheduler.stop();
    }
}

#[cfg(test)]
mod test {
    use std::{error::Error, sync::Arc};

    use crate::{
        hosttime::ManualClock,
        scheduler::{Notification, State},
    };

    use super::*;

    fn rig() -> (Engine, SchedulerHandle, Feed, ManualClock) {
        let host = ManualClock::new(DEFAULT_SAMPLE_RATE as u64);
        let (engine, handle, feed) = new(&Settings::default(), Arc::new(host.clone()));
        (engine, handle, feed, host)
    }

    fn cycle(engine: &mut Engine, host: &ManualClock) {
        engine.process(DEFAULT_BUFFER_SIZE);
        host.advance(DEFAULT_BUFFER_SIZE as u64);
    }

    #[test]
    fn test_commands_apply_before_firing() -> Result<(), Box<dyn Error>> {
        let (mut engine, handle, mut feed, host) = rig();
        handle.start()?;
        assert_eq!(engine.scheduler().state(), State::Idle);

        cycle(&mut engine, &host);
        assert_eq!(engine.scheduler().state(), State::Running);

        // Beat 0 fired in the same cycle the start was applied.
        let notifications = feed.poll().to_vec();
        assert!(notifications.contains(&Notification::EventFired {
            beat: 0.0,
            kind: EventKind::Click,
            accent: true,
            sample: 0,
        }));
        Ok(())
    }

    #[test]
    fn test_stop_applies_before_due_events() -> Result<(), Box<dyn Error>> {
        let (mut engine, handle, mut feed, host) = rig();
        handle.start()?;
        // Up to just before beat 1 (sample 22050).
        for _ in 0..86 {
            cycle(&mut engine, &host);
        }
        feed.poll();

        // Beat 1 is due in this cycle, but the stop lands first.
        handle.stop()?;
        cycle(&mut engine, &host);
        let fired = feed
            .poll()
            .iter()
            .filter(|n| matches!(n, Notification::EventFired { .. }))
            .count();
        assert_eq!(fired, 0);
        assert_eq!(engine.scheduler().registered(), 0);
        Ok(())
    }

    #[test]
    fn test_nudge_tempo() -> Result<(), Box<dyn Error>> {
        let (mut engine, handle, _feed, host) = rig();
        handle.nudge_tempo(5.0)?;
        cycle(&mut engine, &host);
        assert_eq!(engine.scheduler().tempo(), 125.0);

        handle.nudge_tempo(-200.0)?;
        cycle(&mut engine, &host);
        assert_eq!(engine.scheduler().tempo(), 40.0);
        Ok(())
    }

    #[test]
    fn test_rejections_are_counted_not_propagated() -> Result<(), Box<dyn Error>> {
        let (mut engine, handle, feed, host) = rig();
        handle.start()?;
        handle.start()?;
        handle.reset()?;
        cycle(&mut engine, &host);

        assert!(engine.scheduler().is_running());
        assert_eq!(feed.counters().rejected(), 2);
        Ok(())
    }

    #[test]
    fn test_start_at_unreachable_beat() -> Result<(), Box<dyn Error>> {
        let (mut engine, handle, feed, host) = rig();
        handle.start_at(f64::INFINITY)?;
        cycle(&mut engine, &host);
        cycle(&mut engine, &host);

        assert_eq!(engine.scheduler().state(), State::Idle);
        assert_eq!(engine.scheduler().clock().position(), 0);
        assert_eq!(feed.counters().rejected(), 1);
        Ok(())
    }

    #[test]
    fn test_quantized_command() -> Result<(), Box<dyn Error>> {
        let (mut engine, handle, mut feed, host) = rig();
        handle.start()?;
        for _ in 0..10 {
            cycle(&mut engine, &host);
        }
        handle.request_quantized(EventKind::Cue(2), Grid::Bar, Duration::ZERO)?;
        // Just past beat 4 (sample 88200).
        for _ in 0..340 {
            cycle(&mut engine, &host);
        }

        let cues: Vec<_> = feed
            .poll()
            .iter()
            .filter_map(|n| match n {
                Notification::EventFired {
                    kind: EventKind::Cue(2),
                    beat,
                    sample,
                    ..
                } => Some((*beat, *sample)),
                _ => None,
            })
            .collect();
        assert_eq!(cues, vec![(4.0, 88200)]);
        Ok(())
    }

    #[test]
    fn test_dropping_engine_stops_playback() -> Result<(), Box<dyn Error>> {
        let (mut engine, handle, mut feed, host) = rig();
        handle.start()?;
        cycle(&mut engine, &host);
        feed.poll();
        assert!(feed.status().playing);

        drop(engine);
        assert!(feed
            .poll()
            .contains(&Notification::StateChanged { playing: false }));
        assert!(!feed.status().playing);
        assert!(handle.stop().is_err());
        Ok(())
    }
}
